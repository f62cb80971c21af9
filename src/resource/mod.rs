//! Uniform handles over local, remote and in-container content sources.
//!
//! A [`Resource`] is cheap to construct; anything that needs the network
//! happens in `init`, `load_preview` or `open`. A
//! [`ResourceCollection`] produces resources lazily through a
//! [`ResourceCursor`], a forward-only, non-restartable traversal: each
//! `contents()` call starts an independent traversal, but one cursor
//! must never be driven by more than one consumer at a time. The catalog
//! owns exactly one.

mod container;
mod file;
mod registry;
mod remote;

pub use container::{ContainerCollection, ContainerResource};
pub use file::{FileCollection, FileResource};
pub use registry::CollectionRegistry;
pub use remote::{FeedCollection, RemoteResource};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::io::ReadAt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub name: String,
    pub url: Option<String>,
}

/// One piece of content: a sketch container, wherever it lives.
///
/// Immutable once constructed and owned by whichever collection
/// materialized it.
#[async_trait]
pub trait Resource: Send + Sync {
    fn name(&self) -> &str;
    fn uri(&self) -> &str;
    fn preview_uri(&self) -> Option<&str> {
        None
    }
    fn description(&self) -> Option<&str> {
        None
    }
    fn authors(&self) -> &[Author] {
        &[]
    }
    fn license(&self) -> Option<&str> {
        None
    }

    /// Populate metadata that needs a remote round trip. Constructors
    /// stay cheap; call this before trusting the accessors above.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch the preview image bytes, if the source has a preview
    /// that is separate from the content itself.
    async fn load_preview(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Open the primary content for random access reading. Opened on
    /// demand and never cached here.
    async fn open(&self) -> Result<Arc<dyn ReadAt>>;
}

/// What a traversal yields: sketches, and nested collections for
/// sources (like directory trees) that have structure.
pub enum CollectionItem {
    Sketch(Arc<dyn Resource>),
    Folder(Arc<dyn ResourceCollection>),
}

/// A single-consumer traversal over a collection.
#[async_trait]
pub trait ResourceCursor: Send {
    /// Advance and return the next item, or `None` when the source is
    /// exhausted or failed. Failures are recorded on the owning
    /// collection's `last_error`, never raised past the consumer; items
    /// yielded before the failure remain valid.
    async fn next(&mut self) -> Option<CollectionItem>;
}

/// An ordered, lazily-produced sequence of resources.
#[async_trait]
pub trait ResourceCollection: Send + Sync {
    fn name(&self) -> &str;
    fn uri(&self) -> &str;

    /// Total count, where the source knows it without being exhausted.
    fn num_resources(&self) -> Option<usize> {
        None
    }

    /// Populate anything that needs a remote round trip.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Start a new independent traversal.
    fn contents(&self) -> Box<dyn ResourceCursor>;

    /// The error that terminated the most recent traversal early, if
    /// any.
    fn last_error(&self) -> Option<String> {
        None
    }

    /// Discard cached state; the next traversal re-reads the source.
    fn refresh(&self) {}

    /// Change notification: the value ticks whenever the collection's
    /// contents may have changed.
    fn changed(&self) -> watch::Receiver<u64>;
}
