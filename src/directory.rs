//! The produced .NET directory value.

use crate::root::MetadataRoot;
use crate::stream::StreamHeader;
use crate::writer::Writer;

/// The serialized .NET metadata directory.
///
/// `metadata` is the BSJB root with its five streams. `method_bodies` and
/// `field_data` are raw segments referenced by MethodDef RVA and FieldRVA
/// columns respectively; the PE emitter places them in the image and
/// rebases the offsets. The builder that produced this value is spent.
#[derive(Debug, Clone)]
pub struct DotNetDirectory {
    /// BSJB metadata: root header, `#~`, `#Strings`, `#US`, `#GUID`, `#Blob`.
    pub metadata: Vec<u8>,
    /// Serialized method bodies; MethodDef RVAs are offsets into this.
    pub method_bodies: Vec<u8>,
    /// Mapped field initial data; FieldRVA rows are offsets into this.
    pub field_data: Vec<u8>,
    /// Resources blob, present only when at least one embedded resource
    /// was written.
    pub resources: Option<Vec<u8>>,
    /// Managed entry-point token, or 0 when the module has none.
    pub entry_point: u32,
    /// CLI header flags, copied from the module's runtime flags.
    pub flags: u32,
}

/// Lay out the metadata root and its streams.
///
/// Each stream is padded to a 4-byte boundary; headers carry the padded
/// sizes. Stream order follows the conventional `#~`, `#Strings`, `#US`,
/// `#GUID`, `#Blob`.
pub(crate) fn assemble_metadata(
    version: &str,
    tables: Vec<u8>,
    strings: Vec<u8>,
    user_strings: Vec<u8>,
    guids: Vec<u8>,
    blobs: Vec<u8>,
) -> Vec<u8> {
    let padded = |data: &[u8]| data.len().next_multiple_of(4) as u32;

    let streams: [(&str, &[u8]); 5] = [
        (StreamHeader::TABLES, &tables),
        (StreamHeader::STRINGS, &strings),
        (StreamHeader::USER_STRINGS, &user_strings),
        (StreamHeader::GUID, &guids),
        (StreamHeader::BLOB, &blobs),
    ];

    let mut root = MetadataRoot::new(version);
    for (name, data) in &streams {
        root.streams.push(StreamHeader {
            offset: 0,
            size: padded(data),
            name: (*name).to_string(),
        });
    }

    // Offsets are relative to the metadata root; the header size is stable
    // now that every stream name is in place.
    let mut offset = root.header_size() as u32;
    for header in &mut root.streams {
        header.offset = offset;
        offset += header.size;
    }

    let mut writer = Writer::with_capacity(offset as usize);
    root.write_to(&mut writer);
    for (_, data) in &streams {
        writer.write_bytes(data);
        writer.align(4);
    }
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_layout() {
        let metadata = assemble_metadata(
            "v4.0.30319",
            vec![1, 2, 3, 4],
            vec![0, b'A', 0],
            vec![0],
            vec![0xAA; 16],
            vec![0],
        );

        let root = MetadataRoot::parse(&metadata).unwrap();
        assert_eq!(root.streams.len(), 5);
        assert_eq!(root.streams[0].name, "#~");
        assert_eq!(root.streams[0].offset as usize, root.header_size());
        assert_eq!(root.streams[1].name, "#Strings");
        assert_eq!(root.streams[1].size, 4); // padded from 3

        // Streams are contiguous and padded.
        for pair in root.streams.windows(2) {
            assert_eq!(pair[0].offset + pair[0].size, pair[1].offset);
            assert_eq!(pair[1].offset % 4, 0);
        }
        assert_eq!(
            metadata.len(),
            (root.streams[4].offset + root.streams[4].size) as usize
        );
    }
}
