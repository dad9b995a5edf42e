//! #Blob heap - length-prefixed binary data.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// The #Blob heap containing length-prefixed binary blobs.
#[derive(Debug, Clone)]
pub struct BlobHeap {
    /// Raw heap data.
    data: Vec<u8>,
    /// Blob value to offset mapping for O(1) deduplication.
    /// Keyed by the raw bytes, before the length prefix.
    index_map: HashMap<Vec<u8>, u32>,
}

impl Default for BlobHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobHeap {
    /// Create a new empty blob heap.
    #[must_use]
    pub fn new() -> Self {
        // Heap always starts with a null byte (empty blob at index 0)
        let mut index_map = HashMap::new();
        index_map.insert(Vec::new(), 0);
        Self {
            data: vec![0],
            index_map,
        }
    }

    /// Get a blob at the given offset.
    pub fn get(&self, offset: u32) -> Result<&[u8]> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(Error::InvalidBlob(offset));
        }

        let mut reader = Reader::new(&self.data[offset..]);
        let len = reader.read_compressed_uint()? as usize;

        let header_size = reader.position();
        let blob_start = offset + header_size;
        let blob_end = blob_start + len;

        if blob_end > self.data.len() {
            return Err(Error::InvalidBlob(offset));
        }

        Ok(&self.data[blob_start..blob_end])
    }

    /// Intern a blob and return its offset.
    /// Byte-equal blobs always map to the same offset.
    pub fn get_index(&mut self, blob: &[u8]) -> u32 {
        if let Some(&offset) = self.index_map.get(blob) {
            return offset;
        }

        let offset = self.data.len() as u32;

        // Write compressed length followed by the blob bytes
        let mut writer = Writer::new();
        writer.write_compressed_uint(blob.len() as u32);
        self.data.extend_from_slice(writer.as_slice());
        self.data.extend_from_slice(blob);

        self.index_map.insert(blob.to_vec(), offset);
        offset
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

    /// Check if the heap uses 4-byte indices (size > 65535).
    #[must_use]
    pub fn uses_wide_indices(&self) -> bool {
        self.data.len() > 0xFFFF
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
    fn test_intern_and_get_blob() {
        let mut heap = BlobHeap::new();
        let offset = heap.get_index(&[1, 2, 3]);
        assert_eq!(heap.get(offset).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_blob_deduplication() {
        let mut heap = BlobHeap::new();
        let offset1 = heap.get_index(&[0x20, 0x01]);
        let offset2 = heap.get_index(&[0x20, 0x01]);
        let offset3 = heap.get_index(&[0x20, 0x02]);
        assert_eq!(offset1, offset2);
        assert_ne!(offset1, offset3);
        assert_eq!(heap.get_index(&[]), 0);
    }

    #[test]
    fn test_length_prefix() {
        let mut heap = BlobHeap::new();
        let offset = heap.get_index(&[0xAA; 0x90]);
        // 0x90 bytes needs a 2-byte compressed length (0x80 | 0x00, 0x90).
        assert_eq!(&heap.data()[offset as usize..offset as usize + 2], &[0x80, 0x90]);
    }

    #[test]
    fn test_flush_pads_to_four() {
        let mut heap = BlobHeap::new();
        heap.get_index(&[1, 2]);
        assert_eq!(heap.size(), 4);
        let mut writer = Writer::new();
        heap.flush(&mut writer);
        assert_eq!(writer.len(), 4);

        heap.get_index(&[3]);
        let mut writer = Writer::new();
        heap.flush(&mut writer);
        assert_eq!(writer.len(), 8);
    }
}
