// ┌────────┬────────┬─────────────────────────────────────────────────────────┐
// │ Offset │ Length │ Body at BODY_OFFSET, little-endian                      │
// │────────┼────────┼─────────────────────────────────────────────────────────│
// │    0   │    4   │ MAGIC: b"BPTI"                                          │
// │    4   │    1   │ VERSION                                                 │
// │    5   │    1   │ FORMAT: 0 = text, 1 = paged                             │
// │    6   │    4   │ PAGE_SIZE: u32, 0 for text heaps                        │
// │   10   │    4   │ BLOCK_SIZE: u32, max_block_size of the tree             │
// │   14   │    4   │ NODE_COUNT: u32                                         │
// │   18   │    4   │ ROOT: u32, NO_NODE when empty                           │
// │   22   │    8   │ ENTRIES: u64                                            │
// │────────┼────────┼─────────────────────────────────────────────────────────│
// │   30   │    …   │ NODE × NODE_COUNT, in arena order:                      │
// │   +0   │    1   │   KIND: 0 = internal, 1 = leaf                          │
// │   +1   │    4   │   PARENT: u32, NO_NODE for the root                     │
// │   +5   │    2   │   KEY_COUNT: u16                                        │
// │   +7   │  k·n   │   KEYS: KEY_COUNT × key_length bytes                    │
// │        │  8·n   │   leaf: offsets, u64 each                               │
// │        │  4+4   │   leaf: LEFT and RIGHT siblings, u32                    │
// │        │4·(n+1) │   internal: children, u32 each                          │
// └────────┴────────┴─────────────────────────────────────────────────────────┘
//
// Links are indices into the node sequence, so loading needs no pointer
// fix-up. Writes go straight to the destination; a crash mid-save leaves a
// file that fails to load.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use log::{debug, info};
use nom::bytes::complete::{tag, take};
use nom::multi::count;
use nom::number::complete::{le_u8, le_u16, le_u32, le_u64};
use nom::{IResult, Parser};
use crate::error::{IndexError, IndexResult};
use crate::storage::btree::{BPlusTree, TreeConfig};
use crate::storage::heap::HeapFormat;
use crate::storage::node::{Key, Node, NodeId, NodeKind};
use crate::storage::page::{
    get_heap_path, get_key_length, get_root_key, set_heap_path, set_key_length, set_root_key,
    Header, BODY_OFFSET, HEADER_REGION_SIZE,
};

pub const BODY_MAGIC: &[u8; 4] = b"BPTI";
pub const BODY_VERSION: u8 = 1;
pub const NO_NODE: u32 = u32::MAX;

const FORMAT_TEXT: u8 = 0;
const FORMAT_PAGED: u8 = 1;
const KIND_INTERNAL: u8 = 0;
const KIND_LEAF: u8 = 1;

/// A loaded index: header metadata plus the reconstructed tree.
#[derive(Debug, Clone)]
pub struct IndexFile {
    pub heap_path: String,
    pub format: HeapFormat,
    /// Root key echo from the header; informational only.
    pub root_key: Vec<u8>,
    pub tree: BPlusTree,
}

/// Write the header and the whole node graph to `index_path`, replacing any
/// existing file.
pub fn save(
    tree: &BPlusTree,
    heap_path: &str,
    format: HeapFormat,
    index_path: impl AsRef<Path>,
) -> IndexResult<()> {
    let index_path = index_path.as_ref();
    let mut header: Header = [0; HEADER_REGION_SIZE];
    set_heap_path(&mut header, heap_path)?;
    set_key_length(&mut header, tree.config().key_length);
    if let Some(root) = tree.root() {
        if let Some(first) = tree.node(root).keys.first() {
            set_root_key(&mut header, first.as_bytes());
        }
    }

    let body = encode_body(tree, format)?;

    let mut out = BufWriter::new(File::create(index_path)?);
    out.write_all(&header)?;
    out.write_all(&body)?;
    out.flush()?;

    info!(
        "Saved index {} ({} nodes, {} entries, {} body bytes)",
        index_path.display(),
        tree.node_count(),
        tree.len(),
        body.len()
    );
    Ok(())
}

/// Read an index file back into an equivalent tree.
pub fn load(index_path: impl AsRef<Path>) -> IndexResult<IndexFile> {
    let index_path = index_path.as_ref();
    let display = index_path.display().to_string();
    let mut file = File::open(index_path).map_err(|e| IndexError::open_failed(&display, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    if bytes.len() < BODY_OFFSET {
        return Err(IndexError::Format(format!(
            "{} is {} bytes, shorter than the {}-byte header",
            display,
            bytes.len(),
            HEADER_REGION_SIZE
        )));
    }
    let mut header: Header = [0; HEADER_REGION_SIZE];
    header.copy_from_slice(&bytes[..HEADER_REGION_SIZE]);

    let heap_path = get_heap_path(&header);
    let key_length = get_key_length(&header)?;
    let root_key = get_root_key(&header, key_length);
    debug!("load: heap='{}', key_length={}", heap_path, key_length);

    let (format, tree) = decode_body(&bytes[BODY_OFFSET..], key_length)?;
    info!(
        "Loaded index {} ({} nodes, {} entries, height {})",
        display,
        tree.node_count(),
        tree.len(),
        tree.height()
    );
    Ok(IndexFile { heap_path, format, root_key, tree })
}

pub fn encode_body(tree: &BPlusTree, format: HeapFormat) -> IndexResult<Vec<u8>> {
    let (format_tag, page_size) = match format {
        HeapFormat::Text => (FORMAT_TEXT, 0),
        HeapFormat::Paged { page_size } => (FORMAT_PAGED, to_u32(page_size, "page size")?),
    };

    let mut buf = Vec::new();
    buf.extend_from_slice(BODY_MAGIC);
    buf.push(BODY_VERSION);
    buf.push(format_tag);
    buf.extend(&page_size.to_le_bytes());
    buf.extend(&to_u32(tree.config().max_block_size, "block size")?.to_le_bytes());
    buf.extend(&to_u32(tree.node_count(), "node count")?.to_le_bytes());
    buf.extend(&link(tree.root())?.to_le_bytes());
    buf.extend(&(tree.len() as u64).to_le_bytes());

    for node in tree.nodes() {
        buf.push(if node.is_leaf() { KIND_LEAF } else { KIND_INTERNAL });
        buf.extend(&link(node.parent)?.to_le_bytes());
        buf.extend(&(node.keys.len() as u16).to_le_bytes());
        for key in &node.keys {
            buf.extend_from_slice(key.as_bytes());
        }
        match &node.kind {
            NodeKind::Leaf { offsets, left, right } => {
                for offset in offsets {
                    buf.extend(&offset.to_le_bytes());
                }
                buf.extend(&link(*left)?.to_le_bytes());
                buf.extend(&link(*right)?.to_le_bytes());
            }
            NodeKind::Internal { children } => {
                for &child in children {
                    buf.extend(&link(Some(child))?.to_le_bytes());
                }
            }
        }
    }
    Ok(buf)
}

/// Decode a body and verify the resulting graph. Any failure is a format error.
pub fn decode_body(body: &[u8], key_length: usize) -> IndexResult<(HeapFormat, BPlusTree)> {
    let (rest, prelude) = prelude(body).map_err(|e| parse_error(body, e))?;

    let format = match prelude.format {
        FORMAT_TEXT => HeapFormat::Text,
        FORMAT_PAGED => HeapFormat::paged(prelude.page_size as usize)
            .map_err(|e| IndexError::Format(e.to_string()))?,
        other => return Err(IndexError::Format(format!("unknown heap format tag {}", other))),
    };
    let config = TreeConfig::with_block_size(key_length, prelude.block_size as usize)
        .map_err(|e| IndexError::Format(e.to_string()))?;

    let (rest, nodes) = count(|input| node(input, key_length), prelude.node_count as usize)
        .parse(rest)
        .map_err(|e| parse_error(body, e))?;
    if !rest.is_empty() {
        return Err(IndexError::Format(format!("{} trailing bytes after node graph", rest.len())));
    }

    let root = unlink(prelude.root);
    let tree = BPlusTree::from_parts(config, nodes, root, prelude.entries as usize);
    tree.check_structure()
        .map_err(|reason| IndexError::Format(format!("inconsistent node graph: {}", reason)))?;
    Ok((format, tree))
}

struct Prelude {
    format: u8,
    page_size: u32,
    block_size: u32,
    node_count: u32,
    root: u32,
    entries: u64,
}

type ParseResult<'a, T> = IResult<&'a [u8], T>;

fn byte(input: &[u8]) -> ParseResult<'_, u8> {
    le_u8(input)
}

fn word(input: &[u8]) -> ParseResult<'_, u16> {
    le_u16(input)
}

fn dword(input: &[u8]) -> ParseResult<'_, u32> {
    le_u32(input)
}

fn qword(input: &[u8]) -> ParseResult<'_, u64> {
    le_u64(input)
}

fn bytes(input: &[u8], len: usize) -> ParseResult<'_, &[u8]> {
    take(len).parse(input)
}

fn literal<'a>(input: &'a [u8], expected: &'static [u8]) -> ParseResult<'a, &'a [u8]> {
    tag(expected).parse(input)
}

fn prelude(input: &[u8]) -> ParseResult<'_, Prelude> {
    let (input, _) = literal(input, BODY_MAGIC)?;
    let (input, _) = literal(input, &[BODY_VERSION])?;
    let (input, format) = byte(input)?;
    let (input, page_size) = dword(input)?;
    let (input, block_size) = dword(input)?;
    let (input, node_count) = dword(input)?;
    let (input, root) = dword(input)?;
    let (input, entries) = qword(input)?;
    Ok((input, Prelude { format, page_size, block_size, node_count, root, entries }))
}

fn key(input: &[u8], key_length: usize) -> ParseResult<'_, Key> {
    let (input, raw) = bytes(input, key_length)?;
    Ok((input, Key::from_bytes(raw.to_vec())))
}

fn node(input: &[u8], key_length: usize) -> ParseResult<'_, Node> {
    let (input, kind) = byte(input)?;
    let (input, parent) = dword(input)?;
    let (input, key_count) = word(input)?;
    let key_count = key_count as usize;
    let (input, keys) = count(|i| key(i, key_length), key_count).parse(input)?;

    match kind {
        KIND_LEAF => {
            let (input, offsets) = count(qword, key_count).parse(input)?;
            let (input, left) = dword(input)?;
            let (input, right) = dword(input)?;
            let node = Node {
                keys,
                parent: unlink(parent),
                kind: NodeKind::Leaf { offsets, left: unlink(left), right: unlink(right) },
            };
            Ok((input, node))
        }
        KIND_INTERNAL => {
            let (input, children) = count(dword, key_count + 1).parse(input)?;
            let node = Node {
                keys,
                parent: unlink(parent),
                kind: NodeKind::Internal { children: children.into_iter().map(|c| c as NodeId).collect() },
            };
            Ok((input, node))
        }
        _ => Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

fn parse_error(body: &[u8], err: nom::Err<nom::error::Error<&[u8]>>) -> IndexError {
    match err {
        nom::Err::Incomplete(_) => IndexError::Format("node graph is truncated".into()),
        nom::Err::Error(e) | nom::Err::Failure(e) => IndexError::Format(format!(
            "malformed node graph at body byte {} ({:?})",
            body.len() - e.input.len(),
            e.code
        )),
    }
}

fn link(id: Option<NodeId>) -> IndexResult<u32> {
    match id {
        Some(id) => to_u32(id, "node index"),
        None => Ok(NO_NODE),
    }
}

fn unlink(raw: u32) -> Option<NodeId> {
    (raw != NO_NODE).then_some(raw as NodeId)
}

fn to_u32(value: usize, what: &str) -> IndexResult<u32> {
    u32::try_from(value)
        .map_err(|_| IndexError::InvalidConfig(format!("{} {} does not fit in 32 bits", what, value)))
}
