//! Error types for tree construction and mutation.
//!
//! Only conditions a caller can act on are reported here. A key that is absent is a normal
//! outcome (an empty lookup or a `NotFound` event), and a broken structural invariant in the
//! middle of a mutation is a logic defect that panics instead of being returned.

use alloc::string::String;

use thiserror::Error;

use crate::payload::ValueMode;

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The capacity parameters cannot form a valid tree.
    ///
    /// Internal nodes need room for at least three children and leaves for at least one
    /// entry. Unrecoverable for the given configuration: rebuild with valid orders.
    #[error("invalid tree order: order_internal={order_internal} (minimum 3), order_leaf={order_leaf} (minimum 1)")]
    InvalidOrder { order_internal: usize, order_leaf: usize },

    /// The tree is in unique mode and already holds the key. Nothing was changed.
    #[error("duplicate key rejected in unique mode")]
    DuplicateKey,

    /// The payload variant does not match the tree's value mode. Nothing was changed.
    #[error("payload mode mismatch: tree stores {expected}, got {found}")]
    PayloadMode { expected: ValueMode, found: ValueMode },

    /// Reported by `check_invariants`; one violation per line.
    #[error("tree invariant violated:\n{0}")]
    Invariant(String),
}

pub type Result<T> = core::result::Result<T, Error>;
