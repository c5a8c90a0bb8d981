use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use log::debug;
use crate::error::{IndexError, IndexResult};
use crate::storage::node::Key;
use crate::storage::row::{SensorRecord, RECORD_SIZE, SDT_NAME_OFFSET, SDT_NAME_SIZE};

/// How records are laid out in a heap file.
///
/// Offsets are byte positions from the start of the heap file for both
/// formats: the first byte of a line, or the first byte of a fixed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapFormat {
    /// One record per line, `\n` or `\r\n` terminated.
    Text,
    /// Fixed-size pages of packed 112-byte records. A record starting with a
    /// zero byte marks the end of its page.
    Paged { page_size: usize },
}

impl HeapFormat {
    pub fn paged(page_size: usize) -> IndexResult<HeapFormat> {
        if page_size < RECORD_SIZE {
            return Err(IndexError::InvalidConfig(format!(
                "page size {} is smaller than one {}-byte record",
                page_size, RECORD_SIZE
            )));
        }
        Ok(HeapFormat::Paged { page_size })
    }
}

/// One `(key, offset)` pair produced while streaming a heap file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub key: Key,
    pub offset: u64,
}

/// Streams `(key, offset)` pairs out of a heap file in file order.
pub enum RecordSource {
    Text(TextRecordSource),
    Paged(PageRecordSource),
}

impl RecordSource {
    pub fn open(path: &str, format: HeapFormat, key_length: usize) -> IndexResult<RecordSource> {
        let file = File::open(path).map_err(|e| IndexError::open_failed(path, e))?;
        Ok(match format {
            HeapFormat::Text => RecordSource::Text(TextRecordSource::new(file, key_length)),
            HeapFormat::Paged { page_size } => {
                RecordSource::Paged(PageRecordSource::new(file, page_size, key_length))
            }
        })
    }
}

impl Iterator for RecordSource {
    type Item = IndexResult<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RecordSource::Text(source) => source.next(),
            RecordSource::Paged(source) => source.next(),
        }
    }
}

/// Line-oriented heap. The key is the first `key_length` bytes of each line.
pub struct TextRecordSource {
    reader: BufReader<File>,
    key_length: usize,
    offset: u64,
    line: Vec<u8>,
}

impl TextRecordSource {
    pub fn new(file: File, key_length: usize) -> Self {
        TextRecordSource { reader: BufReader::new(file), key_length, offset: 0, line: Vec::new() }
    }
}

impl Iterator for TextRecordSource {
    type Item = IndexResult<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            let read = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => return Some(Err(e.into())),
            };
            let start = self.offset;
            self.offset += read as u64;

            let content = strip_line_terminator(&self.line);
            if content.is_empty() {
                continue;
            }
            return Some(Ok(SourceRecord { key: Key::normalize(content, self.key_length), offset: start }));
        }
    }
}

/// Paged binary heap. The key is the record's SDT_NAME field.
pub struct PageRecordSource {
    reader: BufReader<File>,
    key_length: usize,
    page_size: usize,
    page: Vec<u8>,
    page_index: u64,
    slot: usize,
    loaded: bool,
}

impl PageRecordSource {
    pub fn new(file: File, page_size: usize, key_length: usize) -> Self {
        PageRecordSource {
            reader: BufReader::new(file),
            key_length,
            page_size,
            page: vec![0; page_size],
            page_index: 0,
            slot: 0,
            loaded: false,
        }
    }

    fn slots_per_page(&self) -> usize {
        self.page_size / RECORD_SIZE
    }

    /// Load the next page. Returns false at end of file.
    fn load_page(&mut self) -> io::Result<bool> {
        if self.loaded {
            self.page_index += 1;
        }
        let read = read_full(&mut self.reader, &mut self.page)?;
        if read == 0 {
            return Ok(false);
        }
        // A short final page reads as if zero padded.
        self.page[read..].fill(0);
        self.slot = 0;
        self.loaded = true;
        debug!("PageRecordSource: loaded page {} ({} bytes)", self.page_index, read);
        Ok(true)
    }
}

impl Iterator for PageRecordSource {
    type Item = IndexResult<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let exhausted = !self.loaded
                || self.slot >= self.slots_per_page()
                || self.page[self.slot * RECORD_SIZE] == 0;
            if exhausted {
                match self.load_page() {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e.into())),
                }
                if self.page[0] == 0 {
                    continue;
                }
            }

            let start = self.slot * RECORD_SIZE;
            let field = &self.page[start + SDT_NAME_OFFSET..start + SDT_NAME_OFFSET + SDT_NAME_SIZE];
            let key = Key::normalize(field, self.key_length);
            let offset = self.page_index * self.page_size as u64 + start as u64;
            self.slot += 1;
            return Some(Ok(SourceRecord { key, offset }));
        }
    }
}

/// Raw bytes of one heap record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// Line contents without the terminator.
    Line(Vec<u8>),
    Fixed(Box<[u8; RECORD_SIZE]>),
}

impl fmt::Display for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawRecord::Line(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            RawRecord::Fixed(bytes) => write!(f, "{}", SensorRecord::decode(bytes)),
        }
    }
}

/// Random access to heap records by byte offset. Every read is an
/// independent seek; nothing is cached.
pub struct HeapFile {
    file: File,
    format: HeapFormat,
}

impl HeapFile {
    pub fn open(path: &str, format: HeapFormat) -> IndexResult<HeapFile> {
        let file = File::open(path).map_err(|e| IndexError::open_failed(path, e))?;
        Ok(HeapFile { file, format })
    }

    pub fn read_at(&mut self, offset: u64) -> IndexResult<RawRecord> {
        self.file.seek(SeekFrom::Start(offset))?;
        match self.format {
            HeapFormat::Text => {
                let mut line = Vec::new();
                if BufReader::new(&mut self.file).read_until(b'\n', &mut line)? == 0 {
                    return Err(IndexError::Format(format!("offset {} is past the end of the heap", offset)));
                }
                let len = strip_line_terminator(&line).len();
                line.truncate(len);
                Ok(RawRecord::Line(line))
            }
            HeapFormat::Paged { .. } => {
                let mut record = Box::new([0u8; RECORD_SIZE]);
                match self.file.read_exact(&mut record[..]) {
                    Ok(()) => Ok(RawRecord::Fixed(record)),
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(IndexError::Format(
                        format!("offset {} does not hold a full record", offset),
                    )),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

fn strip_line_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Read until `buf` is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
