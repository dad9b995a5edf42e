//! Managed resources blob.

/// Concatenation buffer for embedded manifest resource payloads.
///
/// Each resource is stored as a little-endian length prefix followed by its
/// bytes; ManifestResource rows carry the returned offsets.
#[derive(Debug, Clone, Default)]
pub struct ResourcesBuffer {
    data: Vec<u8>,
}

impl ResourcesBuffer {
    /// Create an empty resources buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Append a resource payload and return its offset.
    pub fn add(&mut self, payload: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.data.extend_from_slice(payload);
        offset
    }

    /// Total size of the buffer.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if no resources were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the serialized blob, or `None` if no resources were added.
    #[must_use]
    pub fn into_inner(self) -> Option<Vec<u8>> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_and_length_prefixes() {
        let mut buffer = ResourcesBuffer::new();
        assert_eq!(buffer.add(b"abc"), 0);
        assert_eq!(buffer.add(b"defg"), 7);

        let data = buffer.into_inner().unwrap();
        assert_eq!(&data[0..4], &3u32.to_le_bytes());
        assert_eq!(&data[4..7], b"abc");
        assert_eq!(&data[7..11], &4u32.to_le_bytes());
    }

    #[test]
    fn test_empty_buffer_yields_none() {
        assert!(ResourcesBuffer::new().into_inner().is_none());
    }
}
