//! # tiltvault
//!
//! Persistence and cataloging for Tilt Brush sketch containers, with
//! HTTP URL support using Range requests.
//!
//! A sketch container is a binary header followed by a standard ZIP
//! archive (or, equivalently, a plain directory of member files). This
//! library reads both forms through one interface, writes archives
//! atomically with crash-safe rename semantics, upgrades the embedded
//! metadata document across schema versions, and materializes paged
//! catalogs over local folders and remote feeds. Remote containers are
//! accessed through HTTP Range requests, so peeking at one member of a
//! large archive only transfers the bytes involved.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tiltvault::HttpRangeReader;
//! use tiltvault::tilt::TiltFile;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Open a remote sketch without downloading it
//!     let reader = Arc::new(HttpRangeReader::new("https://example.com/a.tilt".to_string()).await?);
//!     let tilt = TiltFile::from_reader(reader).await?;
//!
//!     for name in tilt.member_names() {
//!         println!("{}", name);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cli;
pub mod error;
pub mod io;
pub mod meta;
pub mod resource;
pub mod tilt;
pub mod zip;

pub use catalog::SketchCatalog;
pub use cli::Cli;
pub use error::{CommitError, HeaderError, SchemaError};
pub use io::{HttpRangeReader, LocalFileReader, ReadAt, SubReader};
pub use resource::{
    CollectionRegistry, ContainerCollection, FeedCollection, FileCollection, FileResource,
};
pub use tilt::{SaveFormat, TiltFile, TiltWriter};
