//! Metadata heaps: #Strings, #US, #GUID, #Blob.
//!
//! All four heaps intern: handing the same value in twice returns the same
//! index. Heaps are append-only; entries are never removed or renumbered.

mod blob;
mod guid;
mod strings;
mod us;

pub use blob::BlobHeap;
pub use guid::GuidHeap;
pub use strings::StringsHeap;
pub use us::UserStringsHeap;
