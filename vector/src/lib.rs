//! This crate provides immutable, indexed sequences with structural sharing.
//!
//! [`Vector`] is a persistent vector (also known as a "bitmapped vector
//! trie") with a tail buffer: random access and point update walk a
//! fixed-fanout trie, and appends land in a small buffer that is folded into
//! the trie once it fills up.
//!
//! [`RrbVector`] is a relaxed radix-balanced tree. Its nodes may be
//! partially filled on either side, so it can grow at both ends in
//! logarithmic time. It addresses its elements through a window
//! `[start, end]` of positions within the root's capacity.
//!
//! Every modification produces a new version; old versions stay valid and
//! share all untouched subtrees with the new one. Batches of modifications
//! can go through an edit session ([`TransientVector`],
//! [`TransientRrbVector`]), which mutates the nodes it has already copied in
//! place instead of copying them again on every step.

// Not yet implemented:
// - insertion at an arbitrary index
// - removal
// - slicing (should reuse the window of `RrbVector`)
// - concatenation (should reuse the branch grafting of `RrbVector::append`)

mod edit;
mod node;
pub mod rrb;
#[cfg(feature = "serde")]
mod serialize;
pub mod vector;

/// Number of index bits consumed per tree level.
pub const BITS: u32 = 5;
/// Number of slots in every node.
pub const BRANCHING: usize = 1 << BITS;
/// Mask selecting the slot index within a node.
pub const MASK: usize = BRANCHING - 1;

/// Errors returned by the vector operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub use node::Iter;
pub use rrb::{RrbVector, TransientRrbVector};
pub use vector::{TransientVector, Vector};
