//! #US (User Strings) heap - length-prefixed UTF-16LE strings.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::token::MetadataToken;
use crate::writer::Writer;

/// The #US heap containing user strings (UTF-16LE with length prefix).
///
/// Offsets in this heap are addressed by `ldstr` through 0x70-tagged
/// metadata tokens rather than by table columns.
#[derive(Debug, Clone)]
pub struct UserStringsHeap {
    /// Raw heap data.
    data: Vec<u8>,
    /// String to offset mapping for O(1) deduplication.
    index_map: HashMap<String, u32>,
}

impl Default for UserStringsHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStringsHeap {
    /// Create a new empty user strings heap.
    #[must_use]
    pub fn new() -> Self {
        // Heap always starts with a null byte
        Self {
            data: vec![0],
            index_map: HashMap::new(),
        }
    }

    /// Get a user string at the given offset.
    pub fn get(&self, offset: u32) -> Result<String> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(Error::InvalidUserString(offset));
        }

        let mut reader = Reader::new(&self.data[offset..]);
        let blob_len = reader.read_compressed_uint()? as usize;

        if blob_len == 0 {
            return Ok(String::new());
        }

        // The blob length includes a trailing byte indicating if any chars are > 0x7F
        let str_len = blob_len.saturating_sub(1);

        if !str_len.is_multiple_of(2) {
            return Err(Error::InvalidUserString(offset));
        }

        let bytes = reader.read_bytes(str_len)?;

        // Convert UTF-16LE to String
        let utf16: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();

        String::from_utf16(&utf16).map_err(|_| Error::InvalidUserString(offset))
    }

    /// Intern a user string and return its offset.
    pub fn get_index(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.index_map.get(s) {
            return offset;
        }

        let offset = self.data.len() as u32;

        // Convert to UTF-16LE
        let utf16: Vec<u16> = s.encode_utf16().collect();
        let byte_len = utf16.len() * 2;

        // ECMA II.24.2.4: the trailing byte is 1 if any UTF-16 unit has a
        // nonzero high byte or is one of a small set of control characters.
        let has_special = utf16.iter().any(|&c| {
            c > 0x7F
                || (0x01..=0x08).contains(&c)
                || (0x0E..=0x1F).contains(&c)
                || c == 0x27
                || c == 0x2D
                || c == 0x7F
        });

        // Blob length = string bytes + 1 (trailing flag byte)
        let blob_len = byte_len + 1;

        // Write compressed length
        let mut writer = Writer::new();
        writer.write_compressed_uint(blob_len as u32);
        self.data.extend_from_slice(writer.as_slice());

        // Write UTF-16LE bytes
        for &c in &utf16 {
            self.data.extend_from_slice(&c.to_le_bytes());
        }

        // Write trailing flag byte
        self.data.push(if has_special { 1 } else { 0 });

        self.index_map.insert(s.to_string(), offset);
        offset
    }

    /// Intern a user string and return its `ldstr` token (tag 0x70).
    pub fn get_token(&mut self, s: &str) -> MetadataToken {
        MetadataToken::user_string(self.get_index(s))
    }

    /// Get the raw heap data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the live size of the heap (before flush padding).
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Emit the heap bytes padded to a 4-byte boundary.
    pub fn flush(&self, writer: &mut Writer) {
        writer.write_bytes(&self.data);
        writer.align(4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_heap_starts_with_null() {
        let heap = UserStringsHeap::new();
        assert_eq!(heap.size(), 1);
        assert_eq!(heap.data()[0], 0);
    }

    #[test]
    fn test_intern_and_get_string() {
        let mut heap = UserStringsHeap::new();
        let offset = heap.get_index("Hello");
        assert_eq!(heap.get(offset).unwrap(), "Hello");
    }

    #[test]
    fn test_deduplication() {
        let mut heap = UserStringsHeap::new();
        assert_eq!(heap.get_index("Hi"), heap.get_index("Hi"));
    }

    #[test]
    fn test_first_string_token() {
        let mut heap = UserStringsHeap::new();
        assert_eq!(heap.get_token("Hello").as_u32(), 0x7000_0001);
    }

    #[test]
    fn test_unicode_string() {
        let mut heap = UserStringsHeap::new();
        let offset = heap.get_index("日本語");
        assert_eq!(heap.get(offset).unwrap(), "日本語");
        // Non-ASCII forces the trailing flag byte to 1.
        assert_eq!(*heap.data().last().unwrap(), 1);
    }

    #[test]
    fn test_ascii_flag_byte() {
        let mut heap = UserStringsHeap::new();
        heap.get_index("A");
        // null byte + length (3) + 'A' UTF-16LE (0x41, 0x00) + flag (0)
        assert_eq!(heap.data(), &[0x00, 0x03, 0x41, 0x00, 0x00]);
    }

    #[test]
    fn test_apostrophe_sets_flag() {
        let mut heap = UserStringsHeap::new();
        let offset = heap.get_index("'");
        let end = offset as usize + 1 + 2 + 1;
        assert_eq!(heap.data()[end - 1], 1);
    }
}
