use log::{debug, info, warn};
use crate::error::{IndexError, IndexResult};
use crate::storage::btree::{BPlusTree, TreeConfig};
use crate::storage::heap::{HeapFile, HeapFormat, RawRecord, RecordSource};
use crate::storage::index_file;

/// Counters from one bulk load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub records_read: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub nodes: usize,
    pub height: usize,
}

/// One matched entry resolved against the heap file.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub key: String,
    pub offset: u64,
    pub record: RawRecord,
}

/// Outcome of one query. `found` reports whether `key` itself is indexed;
/// a range query still lists the entries that follow an absent key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub found: bool,
    pub hits: Vec<QueryHit>,
}

/// Stream every record of `heap_path` into a fresh tree and save it to
/// `index_path`. Duplicate keys are logged and skipped; the index file is
/// only written once the heap has been fully read.
pub fn build(
    heap_path: &str,
    index_path: &str,
    key_length: usize,
    format: HeapFormat,
) -> IndexResult<BuildStats> {
    build_with_config(heap_path, index_path, TreeConfig::new(key_length)?, format)
}

pub fn build_with_config(
    heap_path: &str,
    index_path: &str,
    config: TreeConfig,
    format: HeapFormat,
) -> IndexResult<BuildStats> {
    debug!("build: heap='{}' index='{}' {:?} {:?}", heap_path, index_path, config, format);
    let source = RecordSource::open(heap_path, format, config.key_length)?;
    let mut tree = BPlusTree::new(config);
    let mut stats = BuildStats::default();

    for record in source {
        let record = record?;
        stats.records_read += 1;
        match tree.insert(record.key, record.offset) {
            Ok(()) => stats.inserted += 1,
            Err(e) if e.is_duplicate() => {
                warn!("{} (offset {} skipped)", e, record.offset);
                stats.duplicates += 1;
            }
            Err(e) => return Err(e),
        }
    }

    index_file::save(&tree, heap_path, format, index_path)?;
    stats.nodes = tree.node_count();
    stats.height = tree.height();
    info!(
        "Indexed {} records ({} duplicates) into {} nodes, height {}",
        stats.inserted, stats.duplicates, stats.nodes, stats.height
    );
    Ok(stats)
}

/// Load `index_path` and resolve matches for `key` against the heap file the
/// index was built from. `limit = None` is a point lookup; `Some(n)` lists up
/// to `n` entries from the first key not less than `key`.
pub fn query(index_path: &str, key: &str, limit: Option<usize>) -> IndexResult<QueryResult> {
    let index = index_file::load(index_path)?;
    let tree = &index.tree;
    let found = tree.contains(key.as_bytes());

    let matches: Vec<(String, u64)> = match limit {
        None => tree
            .lookup(key.as_bytes())
            .map(|offset| vec![(tree.key(key.as_bytes()).to_string(), offset)])
            .unwrap_or_default(),
        Some(n) => tree.scan(key.as_bytes(), n).map(|(k, offset)| (k.to_string(), offset)).collect(),
    };
    if matches.is_empty() {
        debug!("query: no entries for '{}'", key);
        return Ok(QueryResult { found, hits: Vec::new() });
    }

    let mut heap = HeapFile::open(&index.heap_path, index.format)?;
    let mut hits = Vec::with_capacity(matches.len());
    for (key, offset) in matches {
        let record = heap.read_at(offset)?;
        hits.push(QueryHit { key, offset, record });
    }
    Ok(QueryResult { found, hits })
}

/// Parse a numeric CLI argument, reporting a usage error on failure.
pub fn parse_count(name: &str, value: &str) -> IndexResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| IndexError::Usage(format!("{} must be a non-negative integer, got '{}'", name, value)))
}
