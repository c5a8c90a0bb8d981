// ┌─────────────────────────────────────────────────────────────────────────┐
// │ Offset │ Length │ Description                                           │
// │────────┼────────┼───────────────────────────────────────────────────────│
// │    0   │  256   │ HEAP_PATH: heap file path, ASCII, null padded         │
// │  256   │    4   │ KEY_LENGTH: ASCII decimal, space padded               │
// │  260   │  ≤764  │ ROOT_KEY: first key of the root node (echo only)      │
// │────────┼────────┼───────────────────────────────────────────────────────│
// │ 1024   │   …    │ Serialized node graph (see index_file.rs)             │
// └─────────────────────────────────────────────────────────────────────────┘

use crate::error::{IndexError, IndexResult};

pub const HEADER_REGION_SIZE: usize = 1024;

pub const HEAP_PATH_OFFSET: usize  = 0;           // 256 bytes
pub const HEAP_PATH_SIZE: usize    = 256;
pub const KEY_LENGTH_OFFSET: usize = 256;         // 4 bytes
pub const KEY_LENGTH_SIZE: usize   = 4;
pub const ROOT_KEY_OFFSET: usize   = 260;         // up to the body
pub const BODY_OFFSET: usize       = HEADER_REGION_SIZE;

/// Longest key whose root echo still fits in the header region.
pub const MAX_KEY_LENGTH: usize = HEADER_REGION_SIZE - ROOT_KEY_OFFSET;

pub type Header = [u8; HEADER_REGION_SIZE];

/// Read the heap file path, dropping null and space padding.
pub fn get_heap_path(header: &Header) -> String {
    let raw = &header[HEAP_PATH_OFFSET..HEAP_PATH_OFFSET + HEAP_PATH_SIZE];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}

/// Write the heap file path. Fails if it does not fit in 256 bytes.
pub fn set_heap_path(header: &mut Header, path: &str) -> IndexResult<()> {
    let bytes = path.as_bytes();
    if bytes.len() > HEAP_PATH_SIZE {
        return Err(IndexError::InvalidConfig(format!(
            "heap path is {} bytes, header holds {}",
            bytes.len(),
            HEAP_PATH_SIZE
        )));
    }
    let field = &mut header[HEAP_PATH_OFFSET..HEAP_PATH_OFFSET + HEAP_PATH_SIZE];
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Parse the ASCII key length field.
pub fn get_key_length(header: &Header) -> IndexResult<usize> {
    let raw = &header[KEY_LENGTH_OFFSET..KEY_LENGTH_OFFSET + KEY_LENGTH_SIZE];
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
    text.parse::<usize>()
        .map_err(|_| IndexError::Format(format!("key length field '{}' is not a number", text)))
}

/// Write the key length as space-padded ASCII decimal.
pub fn set_key_length(header: &mut Header, key_length: usize) {
    let text = format!("{:<width$}", key_length, width = KEY_LENGTH_SIZE);
    header[KEY_LENGTH_OFFSET..KEY_LENGTH_OFFSET + KEY_LENGTH_SIZE]
        .copy_from_slice(&text.as_bytes()[..KEY_LENGTH_SIZE]);
}

/// Read `key_length` bytes of root key echo.
pub fn get_root_key(header: &Header, key_length: usize) -> Vec<u8> {
    let end = (ROOT_KEY_OFFSET + key_length).min(HEADER_REGION_SIZE);
    header[ROOT_KEY_OFFSET..end].to_vec()
}

/// Write the root key echo, truncated to the header region.
pub fn set_root_key(header: &mut Header, key: &[u8]) {
    let len = key.len().min(MAX_KEY_LENGTH);
    header[ROOT_KEY_OFFSET..ROOT_KEY_OFFSET + len].copy_from_slice(&key[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_path_round_trips_without_padding() {
        let mut header = [0u8; HEADER_REGION_SIZE];
        set_heap_path(&mut header, "data/heap.4096").unwrap();
        assert_eq!(get_heap_path(&header), "data/heap.4096");
    }

    #[test]
    fn heap_path_too_long() {
        let mut header = [0u8; HEADER_REGION_SIZE];
        let path = "x".repeat(HEAP_PATH_SIZE + 1);
        assert!(set_heap_path(&mut header, &path).is_err());
    }

    #[test]
    fn key_length_is_ascii() {
        let mut header = [0u8; HEADER_REGION_SIZE];
        set_key_length(&mut header, 24);
        assert_eq!(&header[KEY_LENGTH_OFFSET..KEY_LENGTH_OFFSET + 4], b"24  ");
        assert_eq!(get_key_length(&header).unwrap(), 24);
    }

    #[test]
    fn garbage_key_length_is_format_error() {
        let mut header = [0u8; HEADER_REGION_SIZE];
        header[KEY_LENGTH_OFFSET..KEY_LENGTH_OFFSET + 4].copy_from_slice(b"ab12");
        assert!(matches!(get_key_length(&header), Err(IndexError::Format(_))));
    }
}
