use std::fs;
use heaptree::error::IndexError;
use heaptree::storage::heap::{HeapFile, HeapFormat, RawRecord, RecordSource};
use heaptree::storage::row::{SensorRecord, RECORD_SIZE};

fn sensor(name: &str, counts: i32) -> SensorRecord {
    SensorRecord {
        sdt_name: name.into(),
        id: counts,
        date_time: 1_556_712_000_000,
        year: 2019,
        month: "May".into(),
        mdate: 1,
        day: "Wednesday".into(),
        time: 12,
        sensor_id: 7,
        sensor_name: "Bourke St Mall (North)".into(),
        hourly_counts: counts,
    }
}

/// Pages of `page_size` bytes, `per_page` records each, zero padded.
fn paged_heap(records: &[SensorRecord], page_size: usize, per_page: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in records.chunks(per_page) {
        let mut page = vec![0u8; page_size];
        for (slot, record) in chunk.iter().enumerate() {
            page[slot * RECORD_SIZE..(slot + 1) * RECORD_SIZE].copy_from_slice(&record.encode());
        }
        out.extend(page);
    }
    out
}

#[test]
fn text_source_yields_byte_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heap.txt");
    fs::write(&path, "alpha,1\r\nbeta,2\n\ngamma-is-long,3").unwrap();
    let path = path.to_str().unwrap();

    let records: Vec<_> = RecordSource::open(path, HeapFormat::Text, 5)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    let seen: Vec<(String, u64)> = records.iter().map(|r| (r.key.to_string(), r.offset)).collect();
    assert_eq!(
        seen,
        vec![("alpha".into(), 0), ("beta,".into(), 9), ("gamma".into(), 17)]
    );

    let mut heap = HeapFile::open(path, HeapFormat::Text).unwrap();
    assert_eq!(heap.read_at(9).unwrap(), RawRecord::Line(b"beta,2".to_vec()));
    assert_eq!(heap.read_at(0).unwrap().to_string(), "alpha,1");
    assert_eq!(heap.read_at(17).unwrap().to_string(), "gamma-is-long,3");
}

#[test]
fn short_lines_are_space_padded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heap.txt");
    fs::write(&path, "ab\n").unwrap();

    let first = RecordSource::open(path.to_str().unwrap(), HeapFormat::Text, 4)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(first.key.as_bytes(), b"ab  ");
}

#[test]
fn paged_source_walks_packed_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heap.512");
    // 512-byte pages hold 4 records; the last page is only half full.
    let records: Vec<_> = (0..10).map(|i| sensor(&format!("sensor-{:02}", i), i)).collect();
    fs::write(&path, paged_heap(&records, 512, 4)).unwrap();
    let path = path.to_str().unwrap();

    let format = HeapFormat::paged(512).unwrap();
    let found: Vec<_> = RecordSource::open(path, format, 24).unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(found.len(), 10);
    assert_eq!(found[0].offset, 0);
    assert_eq!(found[3].offset, 3 * RECORD_SIZE as u64);
    assert_eq!(found[4].offset, 512);
    assert_eq!(found[9].offset, 2 * 512 + RECORD_SIZE as u64);
    assert_eq!(found[9].key.to_string().trim_end(), "sensor-09");

    let mut heap = HeapFile::open(path, format).unwrap();
    match heap.read_at(found[6].offset).unwrap() {
        RawRecord::Fixed(bytes) => assert_eq!(SensorRecord::decode(&bytes), records[6]),
        other => panic!("expected fixed record, got {:?}", other),
    }
}

#[test]
fn page_that_starts_empty_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heap.256");
    let mut bytes = paged_heap(&[sensor("first", 1)], 256, 2);
    bytes.extend(vec![0u8; 256]);
    bytes.extend(paged_heap(&[sensor("third-page", 3)], 256, 2));
    fs::write(&path, bytes).unwrap();

    let found: Vec<_> = RecordSource::open(path.to_str().unwrap(), HeapFormat::Paged { page_size: 256 }, 10)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    let offsets: Vec<u64> = found.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0, 512]);
}

#[test]
fn reads_past_end_are_format_errors() {
    let dir = tempfile::tempdir().unwrap();
    let text = dir.path().join("heap.txt");
    fs::write(&text, "one\n").unwrap();
    let mut heap = HeapFile::open(text.to_str().unwrap(), HeapFormat::Text).unwrap();
    assert!(matches!(heap.read_at(100), Err(IndexError::Format(_))));

    let paged = dir.path().join("heap.bin");
    fs::write(&paged, vec![1u8; RECORD_SIZE - 1]).unwrap();
    let mut heap = HeapFile::open(paged.to_str().unwrap(), HeapFormat::Paged { page_size: 4096 }).unwrap();
    assert!(matches!(heap.read_at(0), Err(IndexError::Format(_))));
}

#[test]
fn missing_heap_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.txt");
    let err = RecordSource::open(path.to_str().unwrap(), HeapFormat::Text, 4).err().unwrap();
    assert!(matches!(err, IndexError::NotFound { .. }));
    assert!(matches!(HeapFormat::paged(64), Err(IndexError::InvalidConfig(_))));
}

#[test]
fn fixed_record_displays_decoded_fields() {
    let record = RawRecord::Fixed(Box::new(sensor("05/01/2019 12:00:00 PM", 42).encode()));
    let shown = record.to_string();
    assert!(shown.starts_with("05/01/2019 12:00:00 PM | id=42"));
    assert!(shown.contains("Bourke St Mall (North)"));
    assert!(shown.ends_with("counts=42"));
}
