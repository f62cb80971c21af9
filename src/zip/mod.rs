//! ZIP archive reading and writing.
//!
//! The archive form of a sketch container is a standard ZIP prefixed by a
//! 16-byte header; this module only ever sees the ZIP part, through a
//! [`SubReader`](crate::io::SubReader) based just past that header.
//!
//! ## Reading
//!
//! ZIP files are designed to be read from the end: find the End of
//! Central Directory (EOCD), then the Central Directory, which lists
//! every member without touching member data. That access pattern maps
//! directly onto [`ReadAt`](crate::io::ReadAt), so the same parser works
//! over a local file or HTTP Range requests - listing a remote archive
//! or pulling one member out of it only fetches the bytes involved.
//!
//! ## Writing
//!
//! [`ZipWriter`] emits members as STORED (no compression) for maximal
//! compatibility with third-party unzip tools, then a Central Directory
//! and EOCD. Offsets are relative to the start of the ZIP payload, so the
//! result is a well-formed archive once the container header is skipped.
//!
//! ## Supported features
//!
//! - Standard ZIP format, plus ZIP64 extensions on the read side
//! - STORED members read and written
//! - DEFLATE members read (containers produced by other tools)
//! - No encryption, no multi-disk archives

mod parser;
mod structures;
mod writer;

pub use parser::ZipParser;
pub use structures::*;
pub use writer::ZipWriter;
