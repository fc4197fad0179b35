//! Construction parameters of a [`BPlusTree`](crate::BPlusTree).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payload::ValueMode;

/// Smallest legal `order_internal`: fewer than three children cannot split into two
/// nodes that each keep a separator key.
pub const MIN_ORDER_INTERNAL: usize = 3;

/// Smallest legal `order_leaf`.
pub const MIN_ORDER_LEAF: usize = 1;

/// Capacity parameters, duplicate policy and value mode of a tree.
///
/// The default is the classic teaching configuration: internal order 3, leaf order 2,
/// unique keys, no payload.
///
/// # Examples
///
/// ```
/// use bplus_index::{TreeConfig, ValueMode};
///
/// let config = TreeConfig::new(4, 3).with_unique(false).with_value_mode(ValueMode::BlockPtr);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.min_leaf_keys(), 2);
/// assert_eq!(config.min_internal_children(), 2);
///
/// assert!(TreeConfig::new(2, 3).validate().is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeConfig {
    order_internal: usize,
    order_leaf: usize,
    unique: bool,
    value_mode: ValueMode,
}

impl TreeConfig {
    /// Creates a unique-key, key-only configuration with the given orders.
    ///
    /// The orders are checked by [`validate`](Self::validate) (and by tree construction),
    /// not here.
    #[must_use]
    pub const fn new(order_internal: usize, order_leaf: usize) -> Self {
        Self {
            order_internal,
            order_leaf,
            unique: true,
            value_mode: ValueMode::KeyOnly,
        }
    }

    #[must_use]
    pub const fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    #[must_use]
    pub const fn with_value_mode(mut self, value_mode: ValueMode) -> Self {
        self.value_mode = value_mode;
        self
    }

    /// Maximum children of an internal node before it splits.
    #[must_use]
    pub const fn order_internal(&self) -> usize {
        self.order_internal
    }

    /// Maximum entries of a leaf before it splits.
    #[must_use]
    pub const fn order_leaf(&self) -> usize {
        self.order_leaf
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub const fn value_mode(&self) -> ValueMode {
        self.value_mode
    }

    /// Fewest entries a non-root leaf may hold.
    ///
    /// Equal to the smaller half of an overflowing leaf, so a fresh split never underflows.
    #[must_use]
    pub const fn min_leaf_keys(&self) -> usize {
        self.order_leaf.div_ceil(2)
    }

    /// Fewest children a non-root internal node may hold.
    #[must_use]
    pub const fn min_internal_children(&self) -> usize {
        self.order_internal.div_ceil(2)
    }

    /// Checks the orders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order_internal < 3` or `order_leaf < 1`.
    pub fn validate(&self) -> Result<()> {
        if self.order_internal < MIN_ORDER_INTERNAL || self.order_leaf < MIN_ORDER_LEAF {
            return Err(Error::InvalidOrder {
                order_internal: self.order_internal,
                order_leaf: self.order_leaf,
            });
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new(3, 2)
    }
}
