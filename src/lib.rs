//! A lock-free, dynamically-resizable, random-access sequence container.
//!
//! [`Vector<T>`] supports concurrent `push_back`, `pop_back`, `read_at`,
//! `write_at`, and `size` from an arbitrary number of threads without mutual
//! exclusion. It behaves as an indexed array whose logical length grows and
//! shrinks only at its high end.
//!
//! Three subsystems compose the container:
//!
//! - [`bucket`] — a two-level bucketed storage array giving `O(1)`
//!   index-to-slot translation without ever recopying existing elements.
//! - [`pool`] — a bounded, reference-counted node pool supplying the
//!   descriptor nodes published at each operation's linearization point.
//! - [`vector`] — the descriptor-swap protocol tying the two together:
//!   `push_back`/`pop_back` publish a new descriptor via a single CAS on an
//!   internal `current` pointer, helping complete whatever write the
//!   previous publisher left pending.
//!
//! # Example
//!
//! ```
//! use lfvec::Vector;
//!
//! let v: Vector<i32> = Vector::new(/* max_threads = */ 4).unwrap();
//! v.set_thread_id(0).unwrap();
//!
//! for i in 10..20 {
//!     v.push_back(i);
//! }
//!
//! assert_eq!(v.read_at(0), 10);
//! assert_eq!(v.size(), 10);
//! assert_eq!(v.pop_back(), 19);
//! assert_eq!(v.size(), 9);
//! ```
//!
//! # Element type
//!
//! `T` is assumed to be word-sized and trivially copyable
//! (`Copy + Default + Send + Sync + Eq + 'static`); atomicity is guaranteed
//! only per slot, never across slots. There is no iterator protocol,
//! no arbitrary-position insert/erase, and no element destructor hook — see
//! the design notes in `SPEC_FULL.md` for the full non-goals list.
#![deny(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

mod bucket;
mod config;
mod descriptor;
mod pool;
mod vector;

pub mod error;

pub use crate::config::{Config, DEFAULT_FIRST_BUCKET_SIZE, DEFAULT_MAX_L1_BUCKETS};
pub use crate::error::Error;
pub use crate::vector::Vector;
