//! What a leaf slot carries next to its key.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Storage mode of the leaf level, fixed at construction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueMode {
    /// Leaves hold keys only.
    #[default]
    KeyOnly,
    /// Leaves hold an opaque `(block, offset)` location of the record.
    BlockPtr,
    /// Leaves hold the full record.
    Record,
}

impl fmt::Display for ValueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueMode::KeyOnly => "key-only",
            ValueMode::BlockPtr => "block-pointer",
            ValueMode::Record => "record",
        })
    }
}

/// Location of a record inside block storage.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockPtr {
    pub block_id: u32,
    pub offset: u32,
}

impl BlockPtr {
    #[must_use]
    pub const fn new(block_id: u32, offset: u32) -> Self {
        Self { block_id, offset }
    }
}

/// The value half of a leaf entry.
///
/// The variant must agree with the tree's [`ValueMode`]; `insert` rejects a mismatch.
///
/// # Examples
///
/// ```
/// use bplus_index::{BlockPtr, Payload, ValueMode};
///
/// let payload: Payload<()> = Payload::Location(BlockPtr::new(4, 128));
/// assert_eq!(payload.mode(), ValueMode::BlockPtr);
/// assert_eq!(payload.location(), Some(BlockPtr::new(4, 128)));
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Payload<V> {
    Empty,
    Location(BlockPtr),
    Record(V),
}

impl<V> Payload<V> {
    /// Returns the storage mode this payload belongs to.
    #[must_use]
    pub const fn mode(&self) -> ValueMode {
        match self {
            Payload::Empty => ValueMode::KeyOnly,
            Payload::Location(_) => ValueMode::BlockPtr,
            Payload::Record(_) => ValueMode::Record,
        }
    }

    #[must_use]
    pub const fn location(&self) -> Option<BlockPtr> {
        match self {
            Payload::Location(ptr) => Some(*ptr),
            _ => None,
        }
    }

    #[must_use]
    pub const fn record(&self) -> Option<&V> {
        match self {
            Payload::Record(record) => Some(record),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_record(self) -> Option<V> {
        match self {
            Payload::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl<V> From<BlockPtr> for Payload<V> {
    fn from(ptr: BlockPtr) -> Self {
        Payload::Location(ptr)
    }
}
