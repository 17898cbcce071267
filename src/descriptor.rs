//! Descriptor and write-descriptor records published at a linearization point.

use std::sync::atomic::{AtomicBool, Ordering};

/// Describes a single pending slot mutation.
///
/// Immutable after publication except [`WriteDescriptor::completed`], which
/// transitions `false` -> `true` exactly once (idempotent to re-set).
pub(crate) struct WriteDescriptor<T> {
    pub(crate) old_val: T,
    pub(crate) new_val: T,
    pub(crate) position: usize,
    completed: AtomicBool,
}

impl<T: Copy> WriteDescriptor<T> {
    pub(crate) fn new(old_val: T, new_val: T, position: usize) -> Self {
        WriteDescriptor {
            old_val,
            new_val,
            position,
            completed: AtomicBool::new(false),
        }
    }

    /// A blank descriptor used to fill never-published pool slots.
    pub(crate) fn blank(default: T) -> Self {
        WriteDescriptor::new(default, default, 0)
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Marks the write as done. See the design notes on why this is a
    /// `Release` store rather than the `Relaxed` store the source uses: it
    /// avoids depending on every reader's `current` acquire happening to
    /// piggy-back visibility of this particular flag.
    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

/// A snapshot of container size, with an optional pending write.
///
/// A Node's Descriptor only ever refers to that same Node's own
/// [`WriteDescriptor`] slot, so "optional reference to a write descriptor" is
/// realized as a plain `has_write` flag rather than a pointer.
#[derive(Clone, Copy)]
pub(crate) struct Descriptor {
    pub(crate) size: usize,
    pub(crate) has_write: bool,
}

impl Descriptor {
    pub(crate) fn empty() -> Self {
        Descriptor {
            size: 0,
            has_write: false,
        }
    }
}
