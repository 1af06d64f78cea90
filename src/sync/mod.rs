//! Atomicity wrappers and the observer-side field access protocols
//!
//! Four modes guard field payloads between the single producer and any
//! number of observer processes:
//!
//! - **None**: direct reads and writes; multi-word values may tear
//! - **Atomic**: lock-free load/store for payloads of 1/2/4/8 bytes
//! - **Seqlock** ([`Guarded`]): odd/even sequence word around a payload of
//!   any trivially-copyable size; readers retry, the writer never blocks
//! - **Locked** ([`Locked`]): spin-flag guarded exclusive access
//!
//! Layout contract: the control word (when present) occupies the first
//! bytes of the wrapper; the payload follows at its natural alignment. A
//! reader computes the payload offset from the wrapper kind and the payload
//! alignment alone, via [`payload_offset`].

pub mod atomic_cell;
pub mod seqlock;
pub mod spin;

pub use atomic_cell::{atomic_load_raw, atomic_store_raw, Atomic, AtomicPrimitive};
pub use seqlock::{seqlock_read_raw, seqlock_try_read_raw, seqlock_write_raw, Guarded};
pub use spin::{locked_read_raw, locked_write_raw, Locked};

use crate::layout::{align_up, Atomicity};

/// Size in bytes of the control word in front of seqlock and locked
/// payloads
pub const CONTROL_WORD_SIZE: usize = 4;

/// Byte offset of the payload within a wrapper of the given atomicity,
/// for a payload of the given natural alignment
pub fn payload_offset(atomicity: Atomicity, payload_align: usize) -> usize {
    match atomicity {
        Atomicity::None | Atomicity::Atomic => 0,
        Atomicity::Seqlock | Atomicity::Locked => {
            align_up(CONTROL_WORD_SIZE, payload_align.max(1))
        }
    }
}
