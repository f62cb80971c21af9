//! The `.tilt` sketch container.
//!
//! A container is either a single archive file (16-byte header followed
//! by a standard ZIP) or a plain directory holding the same members as
//! sibling files. Exactly one of the two, never both. The members are:
//!
//! | member           | contents                                   |
//! |------------------|--------------------------------------------|
//! | `metadata.json`  | versioned sketch metadata document         |
//! | `data.sketch`    | opaque binary stroke stream                |
//! | `thumbnail.png`  | preview image                              |
//! | `hires.png`      | optional high-resolution preview           |
//!
//! `main.json` is the pre-release name for `metadata.json`; it stays
//! readable forever but is never written.

mod header;
mod reader;
mod writer;

pub use header::{HEADER_SIZE, HEADER_VERSION, PKZIP_SENTINEL, TILT_SENTINEL, TiltHeader};
pub use reader::TiltFile;
pub use writer::{MemberWriter, SaveFormat, TiltWriter, destroy};

/// Current metadata member name.
pub const FN_METADATA: &str = "metadata.json";
/// Pre-release metadata member name; read-supported only.
pub const FN_METADATA_LEGACY: &str = "main.json";
/// Binary stroke stream member.
pub const FN_SKETCH: &str = "data.sketch";
/// Preview image member.
pub const FN_THUMBNAIL: &str = "thumbnail.png";
/// Optional high-resolution preview member.
pub const FN_HI_RES: &str = "hires.png";

pub const TILT_MIME_TYPE: &str = "application/vnd.google-tiltbrush.tilt";
pub const THUMBNAIL_MIME_TYPE: &str = "image/png";
