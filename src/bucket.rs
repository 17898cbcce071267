//! The two-level bucketed storage array.
//!
//! A fixed array of up to `max_l1_buckets` atomic pointers, each lazily
//! pointing at a contiguous slab of `2^(b+k)` slots. Once set, a bucket
//! pointer is never moved or freed until the `BucketArray` itself drops.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::atomic::AtomicCell;

pub(crate) struct BucketArray<T> {
    buckets: Box<[AtomicPtr<AtomicCell<T>>]>,
    first_bucket_size: usize,
    k: u32,
    default: T,
}

impl<T: Copy> BucketArray<T> {
    /// Constructs the bucket array and eagerly allocates bucket 0, so an
    /// empty container always has a valid slot 0 to report reads against
    /// (see the pop-on-empty semantics in the error handling design).
    pub(crate) fn new(max_l1_buckets: usize, first_bucket_size: usize, k: u32, default: T) -> Self {
        let buckets = (0..max_l1_buckets)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let this = BucketArray {
            buckets,
            first_bucket_size,
            k,
            default,
        };
        this.ensure_bucket(0);
        this
    }

    fn bucket_len(&self, b: usize) -> usize {
        self.first_bucket_size << b
    }

    /// Maps a logical index to `(bucket, offset)` per the `p = i + 2^k`,
    /// `h = floor(log2 p)`, `b = h - k`, `o = p xor 2^h` formula.
    pub(crate) fn locate(&self, index: usize) -> (usize, usize) {
        let p = index + self.first_bucket_size;
        let h = usize::BITS - 1 - p.leading_zeros();
        let b = (h - self.k) as usize;
        let o = p ^ (1usize << h);
        (b, o)
    }

    /// Index of the bucket that will need to exist for `index` to be
    /// writable — i.e. `locate(index).0`. Exposed separately from `locate`
    /// so callers that only need to ensure allocation (push_back) don't
    /// need to destructure the offset too.
    pub(crate) fn bucket_for(&self, index: usize) -> usize {
        self.locate(index).0
    }

    /// Atomically allocates bucket `b` if it isn't already allocated. Safe
    /// and idempotent under concurrent callers: the loser of the CAS frees
    /// its speculative allocation and moves on.
    pub(crate) fn ensure_bucket(&self, b: usize) {
        if !self.buckets[b].load(Ordering::Acquire).is_null() {
            return;
        }

        let len = self.bucket_len(b);
        let slab: Box<[AtomicCell<T>]> = (0..len).map(|_| AtomicCell::new(self.default)).collect();
        let ptr = Box::into_raw(slab) as *mut AtomicCell<T>;

        if self.buckets[b]
            .compare_exchange(ptr::null_mut(), ptr, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another thread won the race; free our speculative allocation.
            unsafe {
                drop(Box::from_raw(std::slice::from_raw_parts_mut(ptr, len)));
            }
        }
    }

    /// Returns the slot for `index`. Precondition: the covering bucket is
    /// already allocated (checked with `debug_assert!` — violating it is a
    /// programmer error, not a recoverable condition).
    pub(crate) fn address_of(&self, index: usize) -> &AtomicCell<T> {
        let (b, o) = self.locate(index);
        let ptr = self.buckets[b].load(Ordering::Acquire);
        debug_assert!(
            !ptr.is_null(),
            "bucket {b} not allocated for index {index}; call ensure_bucket first"
        );
        unsafe { &*ptr.add(o) }
    }
}

impl<T> Drop for BucketArray<T> {
    fn drop(&mut self) {
        for (b, bucket) in self.buckets.iter_mut().enumerate() {
            let ptr = *bucket.get_mut();
            if !ptr.is_null() {
                let len = self.first_bucket_size << b;
                unsafe {
                    drop(Box::from_raw(std::slice::from_raw_parts_mut(ptr, len)));
                }
            }
        }
    }
}
