//! An instrumented, order-parameterized B+ tree index.
//!
//! This crate provides [`BPlusTree`], an in-memory B+ tree whose internal and leaf node
//! capacities are chosen at construction time. Every mutation reports the structural steps it
//! took as a list of [`Event`]s, and [`BPlusTree::traverse`] exposes a level-by-level snapshot
//! of the nodes, so the tree can drive a visualizer or a teaching tool as well as serve as an
//! ordinary ordered index.
//!
//! # Example
//!
//! ```
//! use bplus_index::{BPlusTree, EventKind, TreeConfig};
//! use bplus_index::event::kinds;
//!
//! let mut tree = BPlusTree::<u32>::new(TreeConfig::new(3, 2))?;
//! tree.insert_key(10)?;
//! tree.insert_key(20)?;
//!
//! // The third key overflows the only leaf: it splits and a new root grows above it.
//! let events = tree.insert_key(30)?;
//! assert_eq!(kinds(&events), [EventKind::InsertLeaf, EventKind::SplitLeaf, EventKind::NewRoot]);
//!
//! let levels = tree.traverse();
//! assert_eq!(levels[0][0].keys, [20]);
//! assert_eq!(levels[1].len(), 2);
//!
//! // Removing a key can borrow from a sibling, merge leaves and collapse the root.
//! tree.delete(&30);
//! let events = tree.delete(&10);
//! assert_eq!(kinds(&events), [EventKind::DeleteLeaf, EventKind::Merge, EventKind::NewRoot]);
//! assert_eq!(tree.height(), 1);
//! # Ok::<(), bplus_index::Error>(())
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`
//! - **`serde`** - Serialize configurations, events and snapshots
//! - **`tracing`** - Emit `debug` records for splits, borrows, merges and root changes
//!
//! # Implementation
//!
//! Nodes live in an arena and refer to each other by handle, so parent links and the leaf
//! chain need no reference counting. Handles are recycled after merges; the [`NodeId`]s seen
//! in events and snapshots never are.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod raw;

pub mod bplus_tree;
pub mod config;
pub mod error;
pub mod event;
pub mod payload;
pub mod snapshot;

pub use bplus_tree::{BPlusTree, Iter, Lookup, Range};
pub use config::TreeConfig;
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use payload::{BlockPtr, Payload, ValueMode};
pub use snapshot::{Levels, NodeId, NodeKind, NodeSnapshot};
