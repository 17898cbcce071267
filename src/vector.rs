//! The Vector Core: owns the bucket array and node pool, and implements the
//! descriptor-swap protocol for the tail operations.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::bucket::BucketArray;
use crate::config::Config;
use crate::error::Error;
use crate::pool::{Node, NodePool, NodeRef};

static NEXT_VECTOR_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    // Maps a Vector's identity to the id this thread registered for it.
    // Keyed by vector id (not a shared global slot) so a single thread can
    // legitimately drive more than one Vector with different thread-id
    // assignments, as the test suite's concurrent scenarios do.
    static THREAD_IDS: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
}

/// A lock-free, dynamically-resizable, random-access sequence.
///
/// See the crate-level docs for the full protocol description. In short:
/// tail operations (`push_back`/`pop_back`) publish a fresh
/// [`crate::descriptor::Descriptor`] via a single compare-and-swap on an
/// internal `current` pointer, helping complete any write left pending by
/// whichever thread published last. `read_at`/`write_at` bypass that
/// protocol entirely and touch the bucket array directly.
pub struct Vector<T> {
    vector_id: usize,
    buckets: BucketArray<T>,
    pool: NodePool<T>,
    current: AtomicU64,
    config: Config,
}

impl<T> Vector<T>
where
    T: Copy + Default + Send + Sync + Eq + 'static,
{
    /// Constructs a vector sized for up to `max_threads` concurrent
    /// tail-modifying callers, using the reference defaults for the bucket
    /// geometry and a single pool shard.
    pub fn new(max_threads: usize) -> Result<Self, Error> {
        Self::with_config(Config::for_max_threads(max_threads))
    }

    /// Constructs a vector from a fully specified [`Config`].
    pub fn with_config(config: Config) -> Result<Self, Error> {
        config.validate()?;

        log::debug!(
            "constructing Vector: first_bucket_size={}, max_l1_buckets={}, max_threads={}, max_pools={}",
            config.first_bucket_size_raw(),
            config.max_l1_buckets_raw(),
            config.max_threads_raw(),
            config.max_pools_raw(),
        );

        let default = T::default();
        let buckets = BucketArray::new(
            config.max_l1_buckets_raw(),
            config.first_bucket_size_raw(),
            config.k(),
            default,
        );
        let pool = NodePool::new(config.node_pool_capacity(), config.max_pools_raw(), default);

        // Single-threaded at construction: no CAS needed to publish the
        // initial empty descriptor, just a direct acquire + store.
        let init_ref = pool.acquire_free(0);
        pool.get(init_ref).publish_pop(0);

        let vector_id = NEXT_VECTOR_ID.fetch_add(1, Ordering::Relaxed);

        Ok(Vector {
            vector_id,
            buckets,
            pool,
            current: AtomicU64::new(init_ref),
            config,
        })
    }

    /// Binds the calling thread to pool shard `id % max_pools` for this
    /// vector. Must be called once per thread before that thread's first
    /// `push_back`/`pop_back` on this vector.
    pub fn set_thread_id(&self, id: usize) -> Result<(), Error> {
        let max_threads = self.config.max_threads_raw();
        if id >= max_threads {
            return Err(Error::ThreadIdOutOfRange { id, max_threads });
        }
        log::trace!(
            "vector {}: thread {:?} registered as id {id}",
            self.vector_id,
            std::thread::current().id(),
        );
        THREAD_IDS.with(|ids| ids.borrow_mut().insert(self.vector_id, id));
        Ok(())
    }

    fn registered_thread_id(&self) -> usize {
        THREAD_IDS.with(|ids| {
            *ids.borrow().get(&self.vector_id).unwrap_or_else(|| {
                panic!(
                    "thread {:?} called a tail operation without calling Vector::set_thread_id first",
                    std::thread::current().id()
                )
            })
        })
    }

    fn shard_for_current_thread(&self) -> usize {
        self.registered_thread_id() % self.pool.shard_count()
    }

    /// Observes the current published node, taking a live reference to it.
    fn load_current(&self) -> NodeRef {
        loop {
            let r1 = self.current.load(Ordering::Acquire);
            self.pool.acquire_by_id(r1);
            let r2 = self.current.load(Ordering::Acquire);
            if r1 == r2 {
                return r1;
            }
            self.pool.release(r1);
        }
    }

    /// Completes a node's pending write, if any. Idempotent: a second call
    /// on an already-completed write is a harmless no-op.
    fn help(&self, node: &Node<T>) {
        let desc = node.descriptor();
        if !desc.has_write {
            return;
        }
        let write = node.write_descriptor();
        if write.is_completed() {
            return;
        }
        log::trace!(
            "vector {}: helping pending write at position {}",
            self.vector_id,
            write.position,
        );
        let slot = self.buckets.address_of(write.position);
        let _ = slot.compare_exchange(write.old_val, write.new_val);
        write.mark_completed();
    }

    /// Appends `value` at the end of the sequence.
    pub fn push_back(&self, value: T) {
        let shard = self.shard_for_current_thread();
        let local_ref = self.pool.acquire_free(shard);

        loop {
            let current_ref = self.load_current();
            let current_node = self.pool.get(current_ref);
            self.help(current_node);

            let desc = current_node.descriptor();
            let new_size = desc.size + 1;

            let bucket = self.buckets.bucket_for(desc.size);
            self.buckets.ensure_bucket(bucket);
            let old_val = self.buckets.address_of(desc.size).load();

            self.pool
                .get(local_ref)
                .publish_push(old_val, value, desc.size, new_size);

            match self.current.compare_exchange(
                current_ref,
                local_ref,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // Two drops: the container no longer references the old
                    // node, and this thread's step-2 observation is done.
                    self.pool.release(current_ref);
                    self.pool.release(current_ref);

                    // Help our own write complete before returning.
                    let published = self.load_current();
                    self.help(self.pool.get(published));
                    self.pool.release(published);
                    return;
                }
                Err(_) => {
                    self.pool.release(current_ref);
                    continue;
                }
            }
        }
    }

    /// Removes and returns the last element. If the sequence is empty,
    /// returns the (defensive, unspecified) contents of slot 0 and leaves
    /// the size unchanged rather than erroring.
    pub fn pop_back(&self) -> T {
        let shard = self.shard_for_current_thread();
        let local_ref = self.pool.acquire_free(shard);

        loop {
            let current_ref = self.load_current();
            let current_node = self.pool.get(current_ref);
            self.help(current_node);

            let desc = current_node.descriptor();
            if desc.size == 0 {
                let value = self.buckets.address_of(0).load();
                self.pool.release(current_ref);
                self.pool.release(local_ref);
                return value;
            }

            let new_size = desc.size - 1;
            self.pool.get(local_ref).publish_pop(new_size);

            match self.current.compare_exchange(
                current_ref,
                local_ref,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let value = self.buckets.address_of(new_size).load();
                    self.pool.release(current_ref);
                    self.pool.release(current_ref);
                    return value;
                }
                Err(_) => {
                    self.pool.release(current_ref);
                    continue;
                }
            }
        }
    }

    /// Reads slot `index` directly, bypassing the descriptor protocol.
    ///
    /// # Panics (debug builds)
    /// Panics if the bucket covering `index` has never been allocated.
    pub fn read_at(&self, index: usize) -> T {
        self.buckets.address_of(index).load()
    }

    /// Writes `value` into slot `index` directly, bypassing the descriptor
    /// protocol.
    ///
    /// # Panics (debug builds)
    /// Panics if the bucket covering `index` has never been allocated.
    pub fn write_at(&self, index: usize, value: T) {
        self.buckets.address_of(index).store(value);
    }

    /// Returns the current size. If a push is in flight and not yet
    /// helped to completion, under-reports by one so no caller can observe
    /// an index whose value hasn't conceptually landed yet.
    pub fn size(&self) -> usize {
        let current_ref = self.load_current();
        let node = self.pool.get(current_ref);
        let desc = node.descriptor();
        let size = if desc.has_write && !node.write_descriptor().is_completed() {
            desc.size - 1
        } else {
            desc.size
        };
        self.pool.release(current_ref);
        size
    }
}
