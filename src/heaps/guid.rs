//! #GUID heap - 16-byte GUIDs with 1-based indexing.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::writer::Writer;

/// The #GUID heap containing GUIDs (16-byte entries, 1-based indexing).
#[derive(Debug, Clone, Default)]
pub struct GuidHeap {
    /// Raw heap data (multiple of 16 bytes), in GUID byte order.
    data: Vec<u8>,
    /// GUID to index mapping for O(1) deduplication.
    index_map: HashMap<Uuid, u32>,
}

impl GuidHeap {
    /// Create a new empty GUID heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            index_map: HashMap::new(),
        }
    }

    /// Get a GUID by 1-based index.
    pub fn get(&self, index: u32) -> Result<Uuid> {
        if index == 0 {
            // Index 0 means "no GUID"
            return Ok(Uuid::nil());
        }

        let offset = ((index - 1) as usize) * 16;
        if offset + 16 > self.data.len() {
            return Err(Error::InvalidGuidIndex(index));
        }

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.data[offset..offset + 16]);
        Ok(Uuid::from_bytes_le(bytes))
    }

    /// Intern a GUID and return its 1-based index.
    /// Equal GUIDs always map to the same index; index 0 means absent.
    pub fn get_index(&mut self, guid: &Uuid) -> u32 {
        if let Some(&index) = self.index_map.get(guid) {
            return index;
        }

        let index = (self.data.len() / 16) as u32 + 1;
        self.data.extend_from_slice(&guid.to_bytes_le());
        self.index_map.insert(*guid, index);
        index
    }

    /// Get the number of GUIDs in the heap.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }

    /// Get the raw heap data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the size of the heap in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if the heap uses 4-byte indices (size > 65535 bytes).
    #[must_use]
    pub fn uses_wide_indices(&self) -> bool {
        self.data.len() > 0xFFFF
    }

    /// Emit the heap bytes (16-byte entries are already 4-aligned).
    pub fn flush(&self, writer: &mut Writer) {
        writer.write_bytes(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_heap_is_empty() {
        let heap = GuidHeap::new();
        assert_eq!(heap.count(), 0);
        assert_eq!(heap.size(), 0);
    }

    #[test]
    fn test_null_guid_index() {
        let heap = GuidHeap::new();
        assert_eq!(heap.get(0).unwrap(), Uuid::nil());
    }

    #[test]
    fn test_intern_and_get_guid() {
        let mut heap = GuidHeap::new();
        let guid = Uuid::new_v4();
        let index = heap.get_index(&guid);
        assert_eq!(index, 1); // 1-based indexing
        assert_eq!(heap.get(index).unwrap(), guid);
    }

    #[test]
    fn test_guid_deduplication() {
        let mut heap = GuidHeap::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(heap.get_index(&a), heap.get_index(&a));
        assert_eq!(heap.get_index(&b), 2);
        assert_eq!(heap.count(), 2);
    }

    #[test]
    fn test_guid_byte_order() {
        // {550e8400-e29b-41d4-a716-446655440000} stored little-endian in the
        // first three fields, as the CLR lays GUIDs out.
        let guid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let mut heap = GuidHeap::new();
        heap.get_index(&guid);
        assert_eq!(
            heap.data(),
            &[
                0x00, 0x84, 0x0e, 0x55, // Data1 (LE)
                0x9b, 0xe2, // Data2 (LE)
                0xd4, 0x41, // Data3 (LE)
                0xa7, 0x16, 0x44, 0x66, 0x55, 0x44, 0x00, 0x00, // Data4
            ]
        );
    }
}
