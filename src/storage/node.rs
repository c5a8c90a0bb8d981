use std::fmt;

/// Index of a node inside the tree's arena.
pub type NodeId = usize;

/// A fixed-length search key. Ordering is bytewise, so ASCII keys sort the
/// same way they would as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// Pad `raw` with trailing spaces, or truncate it, to exactly `key_length` bytes.
    pub fn normalize(raw: &[u8], key_length: usize) -> Key {
        let mut bytes = raw[..raw.len().min(key_length)].to_vec();
        bytes.resize(key_length, b' ');
        Key(bytes)
    }

    /// Wrap bytes that are already `key_length` long (decoded keys, tests).
    pub fn from_bytes(bytes: Vec<u8>) -> Key {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Leaf or internal payload of a node.
///
/// Leaves carry one heap offset per key plus the sibling links that form the
/// scan chain. Internal nodes carry `keys.len() + 1` children.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf {
        offsets: Vec<u64>,
        left: Option<NodeId>,
        right: Option<NodeId>,
    },
    Internal {
        children: Vec<NodeId>,
    },
}

/// A single arena slot. `parent`, `left` and `right` are lookup-only
/// back-references; the arena owns every node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub keys: Vec<Key>,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new_leaf(keys: Vec<Key>, offsets: Vec<u64>) -> Node {
        Node {
            keys,
            parent: None,
            kind: NodeKind::Leaf { offsets, left: None, right: None },
        }
    }

    pub fn new_internal(keys: Vec<Key>, children: Vec<NodeId>) -> Node {
        Node {
            keys,
            parent: None,
            kind: NodeKind::Internal { children },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Internal { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn offsets(&self) -> &[u64] {
        match &self.kind {
            NodeKind::Leaf { offsets, .. } => offsets,
            NodeKind::Internal { .. } => &[],
        }
    }

    /// Right sibling in the leaf chain (always `None` for internal nodes).
    pub fn right(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Leaf { right, .. } => right,
            NodeKind::Internal { .. } => None,
        }
    }

    pub fn left(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Leaf { left, .. } => left,
            NodeKind::Internal { .. } => None,
        }
    }

    /// Child to descend into for `key`: the child left of the first stored
    /// key strictly greater than `key`, or the last child.
    pub fn child_for(&self, key: &Key) -> Option<NodeId> {
        let children = self.children();
        let idx = self.keys.iter().position(|k| key < k).unwrap_or(self.keys.len());
        children.get(idx).copied()
    }
}
