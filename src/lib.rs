//! # clremit
//!
//! ECMA-335 CLI/.NET metadata directory builder.
//!
//! This crate takes an in-memory object graph describing a .NET module
//! (types, methods, fields, signatures, custom attributes, resources) and
//! emits a byte-exact metadata directory: the `#~` tables stream, the four
//! heaps, and the optional resources blob, ready to be placed in a PE
//! image by an external emitter.
//!
//! ## Example
//!
//! ```
//! use clremit::builder::MetadataBuilder;
//! use clremit::model::{AssemblyDef, Module};
//!
//! let mut module = Module::new("Empty.dll");
//! module.assembly = Some(AssemblyDef::new("Empty", (1, 0, 0, 0)));
//!
//! let builder = MetadataBuilder::new(&module)?;
//! let directory = builder.create_directory()?;
//! assert_eq!(directory.entry_point, 0);
//! # Ok::<(), clremit::Error>(())
//! ```

pub mod attributes;
pub mod builder;
pub mod cil;
pub mod directory;
pub mod error;
pub mod heaps;
pub mod model;
pub mod reader;
pub mod resources;
pub mod root;
pub mod stream;
pub mod tables;
pub mod token;
pub mod writer;

// Re-export main types
pub use builder::MetadataBuilder;
pub use directory::DotNetDirectory;
pub use error::{Error, Result};
pub use root::MetadataRoot;
pub use stream::StreamHeader;
pub use token::MetadataToken;

// Re-export heaps
pub use heaps::{BlobHeap, GuidHeap, StringsHeap, UserStringsHeap};

// Re-export tables
pub use tables::{CodedIndex, CodedIndexKind, TableId, TablesBuffer, TablesHeader};
