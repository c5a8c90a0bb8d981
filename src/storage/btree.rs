use log::debug;
use crate::error::{IndexError, IndexResult};
use crate::storage::node::{Key, Node, NodeId, NodeKind};
use crate::storage::page::MAX_KEY_LENGTH;

/// Target on-disk size of one node; fan-out is derived from it.
pub const PAGE_BYTE_BUDGET: usize = 1024;

/// Width of the SDT_NAME field of a sensor record, the usual key for paged heaps.
pub const DEFAULT_KEY_LENGTH: usize = 24;

/// Smallest fan-out that still leaves both halves of a split non-empty.
pub const MIN_BLOCK_SIZE: usize = 3;

/// Fan-out and key width for one tree.
///
///   max_block_size = (PAGE_BYTE_BUDGET - key_length) / key_length + 8
///   split_index    = max_block_size / 2 - 1   (even)
///                    max_block_size / 2       (odd)
///
/// A node is split the moment it holds `max_block_size` keys, so at rest every
/// node holds fewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    pub key_length: usize,
    pub max_block_size: usize,
    pub split_index: usize,
}

impl TreeConfig {
    /// Derive fan-out from the 1 KiB block budget.
    pub fn new(key_length: usize) -> IndexResult<TreeConfig> {
        Self::check_key_length(key_length)?;
        let max_block_size = (PAGE_BYTE_BUDGET - key_length) / key_length + 8;
        Self::with_block_size(key_length, max_block_size)
    }

    /// Use an explicit fan-out instead of the derived one.
    pub fn with_block_size(key_length: usize, max_block_size: usize) -> IndexResult<TreeConfig> {
        Self::check_key_length(key_length)?;
        if !(MIN_BLOCK_SIZE..=u16::MAX as usize).contains(&max_block_size) {
            return Err(IndexError::InvalidConfig(format!(
                "max block size {} outside {}..={}",
                max_block_size,
                MIN_BLOCK_SIZE,
                u16::MAX
            )));
        }
        let split_index = if max_block_size % 2 == 0 {
            max_block_size / 2 - 1
        } else {
            max_block_size / 2
        };
        Ok(TreeConfig { key_length, max_block_size, split_index })
    }

    fn check_key_length(key_length: usize) -> IndexResult<()> {
        if key_length == 0 || key_length > MAX_KEY_LENGTH {
            return Err(IndexError::InvalidConfig(format!(
                "key length {} outside 1..={}",
                key_length, MAX_KEY_LENGTH
            )));
        }
        Ok(())
    }
}

/// Insert-only B+ tree over an arena of nodes.
///
/// Every link (`children`, `parent`, `left`, `right`) is an index into `nodes`.
/// The tree owns the arena; parent and sibling links are navigation only.
///
///—————————————————————————————————————————————————————————————————————————————
/// On insert:
///   1. Descend from the root, taking the child left of the first key strictly
///      greater than the new key (or the last child).
///   2. In the leaf, reject an equal key, otherwise insert in order.
///   3. If the leaf now holds max_block_size keys, split it:
///        • keys[..=split_index] stay, the rest move to a new right sibling,
///        • the new leaf is spliced into the sibling chain,
///        • the right half's first key is promoted.
///   4. Promotion inserts (separator, right) next to the split node in its
///      parent. A full parent splits too, promoting keys[split_index] itself.
///   5. Splitting the root creates a new internal root with two children;
///      this is the only place the tree grows taller.
///—————————————————————————————————————————————————————————————————————————————
#[derive(Debug, Clone)]
pub struct BPlusTree {
    config: TreeConfig,
    nodes: Vec<Node>,
    root: Option<NodeId>,
    len: usize,
}

impl BPlusTree {
    pub fn new(config: TreeConfig) -> BPlusTree {
        BPlusTree { config, nodes: Vec::new(), root: None, len: 0 }
    }

    /// Reassemble a tree from decoded parts. Callers must `verify` the result.
    pub(crate) fn from_parts(
        config: TreeConfig,
        nodes: Vec<Node>,
        root: Option<NodeId>,
        len: usize,
    ) -> BPlusTree {
        BPlusTree { config, nodes, root, len }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Panics if `id` did not come from this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Levels from root to leaf; 0 for an empty tree.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(id) = current {
            height += 1;
            current = self.nodes[id].children().first().copied();
        }
        height
    }

    /// Head of the leaf sibling chain.
    pub fn leftmost_leaf(&self) -> Option<NodeId> {
        let mut id = self.root?;
        while let Some(&first) = self.nodes[id].children().first() {
            id = first;
        }
        Some(id)
    }

    /// Pad or truncate raw bytes into this tree's key space.
    pub fn key(&self, raw: &[u8]) -> Key {
        Key::normalize(raw, self.config.key_length)
    }

    /// Leaf that holds, or would receive, `key`.
    pub(crate) fn find_leaf(&self, key: &Key) -> Option<NodeId> {
        let mut id = self.root?;
        loop {
            let node = self.nodes.get(id)?;
            if node.is_leaf() {
                return Some(id);
            }
            id = node.child_for(key)?;
        }
    }

    /// Insert `(key, offset)`. An existing key is left untouched and reported
    /// as `IndexError::DuplicateKey`.
    pub fn insert(&mut self, key: Key, offset: u64) -> IndexResult<()> {
        if key.len() != self.config.key_length {
            return Err(IndexError::InvalidConfig(format!(
                "key '{}' is {} bytes, tree expects {}",
                key,
                key.len(),
                self.config.key_length
            )));
        }

        let Some(root) = self.root else {
            debug!("insert() → empty tree, creating leaf root for key='{}'", key);
            self.nodes.push(Node::new_leaf(vec![key], vec![offset]));
            self.root = Some(self.nodes.len() - 1);
            self.len = 1;
            return Ok(());
        };

        let leaf = self.find_leaf(&key).ok_or_else(|| {
            IndexError::InvariantViolation(format!("descent from root {} found no leaf", root))
        })?;

        let Node { keys, kind, .. } = &mut self.nodes[leaf];
        let NodeKind::Leaf { offsets, .. } = kind else {
            return Err(IndexError::InvariantViolation(format!(
                "descent ended at internal node {}",
                leaf
            )));
        };

        let mut pos = 0;
        while pos < keys.len() && key > keys[pos] {
            pos += 1;
        }
        if pos < keys.len() && keys[pos] == key {
            debug!("insert() → key='{}' already in leaf {}", key, leaf);
            return Err(IndexError::DuplicateKey(key.to_string()));
        }

        keys.insert(pos, key);
        offsets.insert(pos, offset);
        self.len += 1;

        if keys.len() == self.config.max_block_size {
            debug!("  → Leaf {} reached {} keys, splitting.", leaf, keys.len());
            self.split(leaf)?;
        }
        Ok(())
    }

    /// Split a full node and push separators upward until an ancestor has room
    /// or a new root is created.
    fn split(&mut self, id: NodeId) -> IndexResult<()> {
        let mut current = id;
        loop {
            let count = self.nodes[current].keys.len();
            if count < self.config.max_block_size {
                return Err(IndexError::InvariantViolation(format!(
                    "split of node {} holding {} keys (capacity {})",
                    current, count, self.config.max_block_size
                )));
            }

            let (separator, right) = if self.nodes[current].is_leaf() {
                self.split_leaf(current)?
            } else {
                self.split_internal(current)?
            };

            let Some(parent) = self.nodes[current].parent else {
                let new_root = self.nodes.len();
                debug!(
                    "  → Node {} was root. New internal root {} with separator '{}'.",
                    current, new_root, separator
                );
                self.nodes.push(Node::new_internal(vec![separator], vec![current, right]));
                self.nodes[current].parent = Some(new_root);
                self.nodes[right].parent = Some(new_root);
                self.root = Some(new_root);
                return Ok(());
            };

            self.insert_in_parent(parent, current, separator, right)?;
            if self.nodes[parent].keys.len() < self.config.max_block_size {
                return Ok(());
            }
            debug!("  → Parent {} overflowed, splitting internal node.", parent);
            current = parent;
        }
    }

    /// Keep keys[..=split_index] in place, move the rest to a new right leaf,
    /// and splice it into the sibling chain. Returns (separator, new leaf).
    fn split_leaf(&mut self, id: NodeId) -> IndexResult<(Key, NodeId)> {
        let at = self.config.split_index + 1;
        let new_id = self.nodes.len();

        let Node { keys, parent, kind } = &mut self.nodes[id];
        let NodeKind::Leaf { offsets, right, .. } = kind else {
            return Err(IndexError::InvariantViolation(format!("node {} is not a leaf", id)));
        };
        let right_keys = keys.split_off(at);
        let right_offsets = offsets.split_off(at);
        let old_right = right.replace(new_id);
        let parent = *parent;

        let separator = right_keys[0].clone();
        let sibling = Node {
            keys: right_keys,
            parent,
            kind: NodeKind::Leaf { offsets: right_offsets, left: Some(id), right: old_right },
        };
        self.nodes.push(sibling);

        if let Some(next) = old_right {
            if let NodeKind::Leaf { left, .. } = &mut self.nodes[next].kind {
                *left = Some(new_id);
            }
        }

        debug!(
            "split_leaf: leaf {} keeps {} keys, new leaf {} takes {}; separator '{}'.",
            id,
            self.nodes[id].keys.len(),
            new_id,
            self.nodes[new_id].keys.len(),
            separator
        );
        Ok((separator, new_id))
    }

    /// Keep keys[..split_index] and their children, move keys after the
    /// separator to a new right node, and reparent the moved children.
    /// The separator itself goes up and stays in neither half.
    fn split_internal(&mut self, id: NodeId) -> IndexResult<(Key, NodeId)> {
        let at = self.config.split_index;
        let new_id = self.nodes.len();

        let Node { keys, parent, kind } = &mut self.nodes[id];
        let NodeKind::Internal { children } = kind else {
            return Err(IndexError::InvariantViolation(format!("node {} is not internal", id)));
        };
        let mut right_keys = keys.split_off(at);
        let separator = right_keys.remove(0);
        let right_children = children.split_off(at + 1);
        let parent = *parent;

        for &child in &right_children {
            self.nodes[child].parent = Some(new_id);
        }
        let mut sibling = Node::new_internal(right_keys, right_children);
        sibling.parent = parent;
        self.nodes.push(sibling);

        debug!(
            "split_internal: node {} keeps {} keys, new node {} takes {}; separator '{}'.",
            id,
            self.nodes[id].keys.len(),
            new_id,
            self.nodes[new_id].keys.len(),
            separator
        );
        Ok((separator, new_id))
    }

    /// Place `separator` and `right` directly after `left` in `parent`.
    fn insert_in_parent(
        &mut self,
        parent: NodeId,
        left: NodeId,
        separator: Key,
        right: NodeId,
    ) -> IndexResult<()> {
        let Node { keys, kind, .. } = &mut self.nodes[parent];
        let NodeKind::Internal { children } = kind else {
            return Err(IndexError::InvariantViolation(format!(
                "parent {} of node {} is not internal",
                parent, left
            )));
        };
        let pos = children.iter().position(|&c| c == left).ok_or_else(|| {
            IndexError::InvariantViolation(format!(
                "node {} missing from its parent {}",
                left, parent
            ))
        })?;

        keys.insert(pos, separator);
        children.insert(pos + 1, right);
        debug!(
            "insert_in_parent: parent {} now has {} keys and {} children.",
            parent,
            keys.len(),
            children.len()
        );
        Ok(())
    }

    /// Check ordering, fan-out, back-links and the leaf chain.
    pub fn verify(&self) -> IndexResult<()> {
        self.check_structure().map_err(IndexError::InvariantViolation)
    }

    pub(crate) fn check_structure(&self) -> Result<(), String> {
        let Some(root) = self.root else {
            if !self.nodes.is_empty() || self.len != 0 {
                return Err(format!(
                    "empty tree holds {} nodes and {} entries",
                    self.nodes.len(),
                    self.len
                ));
            }
            return Ok(());
        };
        let root_node = self.nodes.get(root).ok_or_else(|| format!("root {} out of range", root))?;
        if root_node.parent.is_some() {
            return Err(format!("root {} has a parent", root));
        }

        let leaves = self.check_nodes(root)?;

        // The sibling chain must visit the leaves in tree order.
        let mut expected = leaves.iter();
        let mut current = leaves.first().copied();
        let mut previous: Option<NodeId> = None;
        let mut entries = 0;
        let mut last_key: Option<&Key> = None;
        while let Some(id) = current {
            if expected.next() != Some(&id) {
                return Err(format!("leaf chain reaches {} out of order", id));
            }
            let node = &self.nodes[id];
            if node.left() != previous {
                return Err(format!("leaf {} has left link {:?}, expected {:?}", id, node.left(), previous));
            }
            for key in &node.keys {
                if last_key.is_some_and(|last| last >= key) {
                    return Err(format!("leaf chain not ascending at '{}'", key));
                }
                last_key = Some(key);
            }
            entries += node.keys.len();
            previous = Some(id);
            current = node.right();
        }
        if expected.next().is_some() {
            return Err("leaf chain ends before the last leaf".into());
        }
        if entries != self.len {
            return Err(format!("leaves hold {} entries, tree records {}", entries, self.len));
        }
        Ok(())
    }

    /// Depth-first walk with an explicit stack, so a corrupt graph of any
    /// depth is reported rather than exhausting the call stack.
    fn check_nodes(&self, root: NodeId) -> Result<Vec<NodeId>, String> {
        let mut visited = vec![false; self.nodes.len()];
        let mut leaves = Vec::new();
        let mut leaf_depth: Option<usize> = None;
        let mut stack: Vec<(NodeId, usize, Option<&Key>, Option<&Key>)> = vec![(root, 1, None, None)];

        while let Some((id, depth, lower, upper)) = stack.pop() {
            let node = self.nodes.get(id).ok_or_else(|| format!("node {} out of range", id))?;
            if std::mem::replace(&mut visited[id], true) {
                return Err(format!("node {} reachable twice", id));
            }
            if leaf_depth.is_some_and(|d| depth > d) {
                return Err(format!("node {} at depth {}, leaves at {}", id, depth, leaf_depth.unwrap_or(0)));
            }
            if node.keys.is_empty() {
                return Err(format!("node {} has no keys", id));
            }
            if node.keys.len() >= self.config.max_block_size {
                return Err(format!(
                    "node {} holds {} keys (capacity {})",
                    id,
                    node.keys.len(),
                    self.config.max_block_size
                ));
            }
            for pair in node.keys.windows(2) {
                if pair[0] >= pair[1] {
                    return Err(format!("node {} keys not strictly ascending", id));
                }
            }
            for key in &node.keys {
                if key.len() != self.config.key_length {
                    return Err(format!("node {} key '{}' has length {}", id, key, key.len()));
                }
                if lower.is_some_and(|l| key < l) || upper.is_some_and(|u| key >= u) {
                    return Err(format!("node {} key '{}' outside its parent's range", id, key));
                }
            }

            match &node.kind {
                NodeKind::Leaf { offsets, .. } => {
                    if offsets.len() != node.keys.len() {
                        return Err(format!(
                            "leaf {} has {} keys and {} offsets",
                            id,
                            node.keys.len(),
                            offsets.len()
                        ));
                    }
                    match leaf_depth {
                        Some(d) if d != depth => {
                            return Err(format!("leaf {} at depth {}, others at {}", id, depth, d));
                        }
                        _ => leaf_depth = Some(depth),
                    }
                    leaves.push(id);
                }
                NodeKind::Internal { children } => {
                    if children.len() != node.keys.len() + 1 {
                        return Err(format!(
                            "internal {} has {} keys and {} children",
                            id,
                            node.keys.len(),
                            children.len()
                        ));
                    }
                    // Reversed so the leftmost child is popped first.
                    for (i, &child) in children.iter().enumerate().rev() {
                        let child_parent = self.nodes.get(child).and_then(|c| c.parent);
                        if child_parent != Some(id) {
                            return Err(format!("child {} of {} points to parent {:?}", child, id, child_parent));
                        }
                        let lo = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
                        let hi = node.keys.get(i).or(upper);
                        stack.push((child, depth + 1, lo, hi));
                    }
                }
            }
        }

        if visited.iter().any(|seen| !seen) {
            return Err("arena holds nodes unreachable from the root".into());
        }
        Ok(leaves)
    }
}
