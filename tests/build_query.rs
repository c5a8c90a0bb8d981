use std::fs;
use std::path::Path;
use heaptree::engine::{self, parse_count};
use heaptree::error::IndexError;
use heaptree::storage::btree::TreeConfig;
use heaptree::storage::heap::{HeapFormat, RawRecord};
use heaptree::storage::index_file;
use heaptree::storage::row::{SensorRecord, RECORD_SIZE};

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn write_text_heap(path: &Path, n: usize) {
    let mut text = String::new();
    for i in (0..n).map(|i| (i * 7919) % n) {
        text.push_str(&format!("key{:05},payload for record {}\n", i, i));
    }
    fs::write(path, text).unwrap();
}

#[test]
fn build_then_point_query_text_heap() {
    let dir = tempfile::tempdir().unwrap();
    let heap = dir.path().join("heap.txt");
    let index = dir.path().join("tree.idx");
    write_text_heap(&heap, 2000);

    let stats = engine::build(path_str(&heap), path_str(&index), 8, HeapFormat::Text).unwrap();
    assert_eq!(stats.records_read, 2000);
    assert_eq!(stats.inserted, 2000);
    assert_eq!(stats.duplicates, 0);
    assert!(stats.height >= 2);

    let result = engine::query(path_str(&index), "key01234", None).unwrap();
    assert!(result.found);
    let hits = result.hits;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, "key01234");
    assert_eq!(
        hits[0].record,
        RawRecord::Line(b"key01234,payload for record 1234".to_vec())
    );

    let miss = engine::query(path_str(&index), "nothere", None).unwrap();
    assert!(!miss.found);
    assert!(miss.hits.is_empty());
}

#[test]
fn range_query_walks_in_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let heap = dir.path().join("heap.txt");
    let index = dir.path().join("tree.idx");
    write_text_heap(&heap, 500);
    engine::build(path_str(&heap), path_str(&index), 8, HeapFormat::Text).unwrap();

    let hits = engine::query(path_str(&index), "key00100", Some(5)).unwrap().hits;
    let keys: Vec<&str> = hits.iter().map(|h| h.key.as_str()).collect();
    assert_eq!(keys, vec!["key00100", "key00101", "key00102", "key00103", "key00104"]);
    for hit in &hits {
        assert!(hit.record.to_string().starts_with(&hit.key));
    }

    let tail = engine::query(path_str(&index), "key00498", Some(10)).unwrap().hits;
    assert_eq!(tail.len(), 2);
}

#[test]
fn range_query_from_absent_key_reports_miss_and_lists_successors() {
    let dir = tempfile::tempdir().unwrap();
    let heap = dir.path().join("heap.txt");
    let index = dir.path().join("tree.idx");
    write_text_heap(&heap, 50);
    engine::build(path_str(&heap), path_str(&index), 8, HeapFormat::Text).unwrap();

    // "key00010a" truncates to "key00010", which is present.
    let present = engine::query(path_str(&index), "key00010a", Some(2)).unwrap();
    assert!(present.found);
    assert_eq!(present.hits[0].key, "key00010");

    // "key0001" pads to "key0001 ", which sorts before "key00010".
    let absent = engine::query(path_str(&index), "key0001", Some(3)).unwrap();
    assert!(!absent.found);
    let keys: Vec<&str> = absent.hits.iter().map(|h| h.key.as_str()).collect();
    assert_eq!(keys, vec!["key00010", "key00011", "key00012"]);

    let point = engine::query(path_str(&index), "key0001", None).unwrap();
    assert!(!point.found);
    assert!(point.hits.is_empty());
}

#[test]
fn duplicates_are_skipped_and_first_wins() {
    let dir = tempfile::tempdir().unwrap();
    let heap = dir.path().join("heap.txt");
    let index = dir.path().join("tree.idx");
    fs::write(&heap, "M first\nA other\nM second\n").unwrap();

    let stats = engine::build(path_str(&heap), path_str(&index), 1, HeapFormat::Text).unwrap();
    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.duplicates, 1);

    let hits = engine::query(path_str(&index), "M", None).unwrap().hits;
    assert_eq!(hits[0].offset, 0);
    assert_eq!(hits[0].record.to_string(), "M first");
}

#[test]
fn missing_heap_writes_no_index() {
    let dir = tempfile::tempdir().unwrap();
    let heap = dir.path().join("absent.txt");
    let index = dir.path().join("tree.idx");

    let err = engine::build(path_str(&heap), path_str(&index), 8, HeapFormat::Text).unwrap_err();
    assert!(matches!(err, IndexError::NotFound { .. }));
    assert!(!index.exists());

    let err = engine::query(path_str(&index), "x", None).unwrap_err();
    assert!(matches!(err, IndexError::NotFound { .. }));
}

#[test]
fn paged_heap_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let heap = dir.path().join("heap.1024");
    let index = dir.path().join("tree.1024");

    let per_page = 1024 / RECORD_SIZE;
    let records: Vec<SensorRecord> = (0..60)
        .map(|i| SensorRecord {
            sdt_name: format!("34{:03}", 59 - i),
            id: i,
            date_time: 1_546_300_800_000 + i as i64 * 3_600_000,
            year: 2019,
            month: "January".into(),
            mdate: 1,
            day: "Tuesday".into(),
            time: i % 24,
            sensor_id: 34,
            sensor_name: "Flinders St-Spark La".into(),
            hourly_counts: i * 10,
        })
        .collect();
    let mut bytes = Vec::new();
    for chunk in records.chunks(per_page) {
        let mut page = vec![0u8; 1024];
        for (slot, r) in chunk.iter().enumerate() {
            page[slot * RECORD_SIZE..(slot + 1) * RECORD_SIZE].copy_from_slice(&r.encode());
        }
        bytes.extend(page);
    }
    fs::write(&heap, bytes).unwrap();

    let config = TreeConfig::with_block_size(24, 4).unwrap();
    let format = HeapFormat::paged(1024).unwrap();
    let stats = engine::build_with_config(path_str(&heap), path_str(&index), config, format).unwrap();
    assert_eq!(stats.inserted, 60);

    let loaded = index_file::load(&index).unwrap();
    assert_eq!(loaded.format, format);
    assert_eq!(loaded.tree.config().max_block_size, 4);

    let hits = engine::query(path_str(&index), "34010", Some(3)).unwrap().hits;
    let counts: Vec<i32> = hits
        .iter()
        .map(|h| match &h.record {
            RawRecord::Fixed(bytes) => SensorRecord::decode(bytes).hourly_counts,
            other => panic!("unexpected record {:?}", other),
        })
        .collect();
    // sdt_name 34010 belongs to i = 49, then 48 and 47.
    assert_eq!(counts, vec![490, 480, 470]);
}

#[test]
fn numeric_arguments_report_usage_errors() {
    assert_eq!(parse_count("limit", "12").unwrap(), 12);
    assert!(matches!(parse_count("limit", "-1"), Err(IndexError::Usage(_))));
    assert!(matches!(parse_count("key-length", "abc"), Err(IndexError::Usage(_))));
}
