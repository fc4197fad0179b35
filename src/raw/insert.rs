use super::handle::Handle;
use super::node::Node;
use super::tree::RawBPlusTree;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::payload::Payload;

impl<K: Ord + Clone, V> RawBPlusTree<K, V> {
    /// Inserts an entry, splitting upward as needed.
    ///
    /// Equal keys are placed after the existing ones, so duplicates keep insertion order.
    /// On error the tree and the (cleared) event log are left untouched.
    pub(crate) fn insert(&mut self, key: K, payload: Payload<V>) -> Result<()> {
        self.log.clear();

        let expected = self.config.value_mode();
        if payload.mode() != expected {
            return Err(Error::PayloadMode {
                expected,
                found: payload.mode(),
            });
        }

        let leaf = self.find_leaf(&key);
        let node = self.nodes.get(leaf);
        if self.config.is_unique() && node.position_of(&key).is_some() {
            #[cfg(feature = "tracing")]
            tracing::trace!(leaf = node.id().get(), "insert: duplicate key rejected");
            return Err(Error::DuplicateKey);
        }

        let index = node.upper_bound(&key);
        let before = node.keys().to_vec();
        let value = self.values.alloc(payload);

        let node = self.nodes.get_mut(leaf);
        node.insert_entry(index, key.clone(), value);
        self.len += 1;

        let overflow = node.key_count() > self.config.order_leaf();
        let event = Event::InsertLeaf {
            leaf: node.id(),
            key,
            index,
            before,
            after: node.keys().to_vec(),
        };
        self.log.push(event);

        if overflow {
            self.split_leaf(leaf);
        }
        Ok(())
    }

    /// Splits an overflowing leaf and links the new right half into the leaf chain and the
    /// parent. The right half receives the extra entry when the count is odd.
    fn split_leaf(&mut self, leaf: Handle) {
        let id = self.allocate_id();
        let node = self.nodes.get_mut(leaf);
        let before = node.keys().to_vec();
        let right = node.split_leaf(id);

        let old_next = node.next();
        let left_id = node.id();
        let left_keys = node.keys().to_vec();
        let promoted = right.key(0).clone();
        let right_keys = right.keys().to_vec();

        let right_handle = self.nodes.alloc(right);
        self.nodes.get_mut(right_handle).set_prev(Some(leaf));
        self.nodes.get_mut(leaf).set_next(Some(right_handle));
        match old_next {
            Some(next) => self.nodes.get_mut(next).set_prev(Some(right_handle)),
            None => self.last_leaf = right_handle,
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            left = left_id.get(),
            right = id.get(),
            left_len = left_keys.len(),
            right_len = right_keys.len(),
            "split leaf"
        );

        self.log.push(Event::SplitLeaf {
            left: left_id,
            right: id,
            promoted: promoted.clone(),
            before,
            left_keys,
            right_keys,
        });

        self.attach_sibling(leaf, promoted, right_handle);
    }

    /// Splits an overflowing internal node and hands the middle separator to the parent.
    fn split_internal(&mut self, handle: Handle) {
        let id = self.allocate_id();
        let node = self.nodes.get_mut(handle);
        let before = node.keys().to_vec();
        let (promoted, right) = node.split_internal(id);
        let left_id = node.id();
        let left_keys = node.keys().to_vec();
        let right_keys = right.keys().to_vec();

        let right_handle = self.nodes.alloc(right);
        let moved = self.nodes.get(right_handle).children().to_vec();
        for child in moved {
            self.nodes.get_mut(child).set_parent(Some(right_handle));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            left = left_id.get(),
            right = id.get(),
            left_children = left_keys.len() + 1,
            right_children = right_keys.len() + 1,
            "split internal"
        );

        self.log.push(Event::SplitInternal {
            left: left_id,
            right: id,
            promoted: promoted.clone(),
            before,
            left_keys,
            right_keys,
        });

        self.attach_sibling(handle, promoted, right_handle);
    }

    /// Links `right` into the parent of `left`, directly after it, or grows a new root when
    /// `left` was the root. Recurses while parents overflow.
    fn attach_sibling(&mut self, left: Handle, separator: K, right: Handle) {
        let Some(parent) = self.nodes.get(left).parent() else {
            self.grow_root(left, separator, right);
            return;
        };

        let node = self.nodes.get_mut(parent);
        let index = node.index_of_child(left);
        node.insert_child_after(index, separator, right);
        let overflow = node.child_count() > self.config.order_internal();
        self.nodes.get_mut(right).set_parent(Some(parent));

        if overflow {
            self.split_internal(parent);
        }
    }

    fn grow_root(&mut self, left: Handle, separator: K, right: Handle) {
        let id = self.allocate_id();
        let old_root = self.id_of(left);
        let keys = alloc::vec![separator.clone()];
        let root = self.nodes.alloc(Node::new_root(id, left, separator, right));
        self.nodes.get_mut(left).set_parent(Some(root));
        self.nodes.get_mut(right).set_parent(Some(root));
        self.root = root;

        #[cfg(feature = "tracing")]
        tracing::debug!(old_root = old_root.get(), new_root = id.get(), "grew new root");

        self.log.push(Event::NewRoot {
            old_root,
            new_root: id,
            keys,
        });
    }
}
