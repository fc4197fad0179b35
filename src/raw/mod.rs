mod arena;
mod handle;
mod insert;
mod node;
mod remove;
mod tree;

pub(crate) use tree::{Cursor, RawBPlusTree};
