use log::debug;
use crate::storage::btree::BPlusTree;
use crate::storage::node::{Key, NodeId};

impl BPlusTree {
    /// Offset stored for `raw_key`, after padding/truncating it to the key length.
    pub fn lookup(&self, raw_key: &[u8]) -> Option<u64> {
        let key = self.key(raw_key);
        let leaf = self.find_leaf(&key)?;
        let node = self.node(leaf);
        let pos = node.keys.iter().position(|k| *k == key);
        debug!("lookup('{}') → leaf {}, slot {:?}", key, leaf, pos);
        pos.map(|i| node.offsets()[i])
    }

    pub fn contains(&self, raw_key: &[u8]) -> bool {
        self.lookup(raw_key).is_some()
    }

    /// Up to `limit` entries in key order, starting at the first key not less
    /// than `raw_key` and following the leaf sibling chain.
    pub fn scan(&self, raw_key: &[u8], limit: usize) -> ScanCursor<'_> {
        let key = self.key(raw_key);
        let leaf = self.find_leaf(&key);
        let slot = leaf
            .map(|id| {
                let keys = &self.node(id).keys;
                keys.iter().position(|k| *k >= key).unwrap_or(keys.len())
            })
            .unwrap_or(0);
        debug!("scan('{}', {}) → starting at leaf {:?}, slot {}", key, limit, leaf, slot);
        ScanCursor { tree: self, leaf, slot, remaining: limit }
    }

    /// Every entry in key order, from the leftmost leaf.
    pub fn iter(&self) -> ScanCursor<'_> {
        ScanCursor { tree: self, leaf: self.leftmost_leaf(), slot: 0, remaining: usize::MAX }
    }
}

/// Forward cursor over the leaf chain. One pass only; a new scan re-descends
/// from the root.
pub struct ScanCursor<'a> {
    tree: &'a BPlusTree,
    leaf: Option<NodeId>,
    slot: usize,
    remaining: usize,
}

impl<'a> Iterator for ScanCursor<'a> {
    type Item = (&'a Key, u64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            let node = self.tree.node(self.leaf?);
            if self.slot < node.keys.len() {
                let item = (&node.keys[self.slot], node.offsets()[self.slot]);
                self.slot += 1;
                self.remaining -= 1;
                return Some(item);
            }
            self.leaf = node.right();
            self.slot = 0;
        }
        None
    }
}
