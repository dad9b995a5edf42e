//! Error types for clremit.

use thiserror::Error;

/// Result type alias for clremit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or verifying a metadata directory.
#[derive(Debug, Error)]
pub enum Error {
    /// An `add_*` operation received a member owned by a different module.
    #[error("{kind} `{name}` is not owned by the module being built")]
    MemberNotImported {
        /// Kind of member (e.g. "type reference").
        kind: &'static str,
        /// Display name of the offending member.
        name: String,
    },

    /// A preferred RID collided with an already-occupied slot.
    #[error("{table} row {rid} is already occupied")]
    DuplicateRid {
        /// Table name.
        table: &'static str,
        /// The conflicting RID.
        rid: u32,
    },

    /// A reserved row was never filled before serialization.
    #[error("{table} row {rid} was reserved but never filled")]
    UnfilledRow {
        /// Table name.
        table: &'static str,
        /// The unfilled RID.
        rid: u32,
    },

    /// A heap outgrew its 32-bit index space or a table its 24-bit RID space.
    #[error("{what} exceeds its index space (size {size})")]
    IndexOverflow {
        /// The overflowing buffer.
        what: &'static str,
        /// Observed size.
        size: u64,
    },

    /// A signature contained an element outside ECMA-335 II.23.1.16.
    #[error("invalid signature: {context}")]
    InvalidSignature {
        /// Short description of the malformed element.
        context: String,
    },

    /// A method body carried an operand that cannot be encoded.
    #[error("invalid CIL in `{method}`: {context}")]
    InvalidCil {
        /// Name of the offending method.
        method: String,
        /// Short description of the malformed instruction.
        context: String,
    },

    /// Invalid BSJB signature (expected 0x424A5342).
    #[error("invalid metadata signature: expected 0x424A5342, got 0x{0:08X}")]
    InvalidSignatureMagic(u32),

    /// Unexpected end of data while reading.
    #[error("unexpected end of data at offset {offset}, needed {needed} bytes")]
    UnexpectedEof {
        /// Offset where the read was attempted.
        offset: usize,
        /// Number of bytes needed.
        needed: usize,
    },

    /// Invalid UTF-8 string in #Strings heap.
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidString(usize),

    /// Invalid UTF-16 string in #US heap.
    #[error("invalid UTF-16 string at offset {0}")]
    InvalidUserString(usize),

    /// Invalid table ID.
    #[error("invalid table ID: {0}")]
    InvalidTableId(u8),

    /// Invalid compressed integer encoding.
    #[error("invalid compressed integer at offset {0}")]
    InvalidCompressedInt(usize),

    /// Invalid GUID index (out of bounds).
    #[error("invalid GUID index: {0}")]
    InvalidGuidIndex(u32),

    /// Invalid blob data.
    #[error("invalid blob at offset {0}")]
    InvalidBlob(usize),
}
