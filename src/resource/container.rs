//! Resources nested inside one archive.
//!
//! An archive can bundle several complete sketch containers as `.tilt`
//! members. Each member is itself a full container (header + ZIP), so a
//! window over its bytes feeds straight back into
//! [`TiltFile::from_reader`].

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::watch;

use super::{CollectionItem, Resource, ResourceCollection, ResourceCursor};
use crate::io::ReadAt;
use crate::tilt::{FN_THUMBNAIL, TiltFile};

/// One sketch container stored as a member of a bundle archive.
pub struct ContainerResource {
    bundle: Arc<TiltFile>,
    member: String,
    name: String,
    uri: String,
}

impl ContainerResource {
    pub fn new(bundle: Arc<TiltFile>, member: impl Into<String>, bundle_uri: &str) -> Self {
        let member = member.into();
        let leaf = member.rsplit('/').next().unwrap_or(&member);
        let name = leaf.strip_suffix(".tilt").unwrap_or(leaf).to_string();
        let uri = format!("{}#{}", bundle_uri, member);
        Self {
            bundle,
            member,
            name,
            uri,
        }
    }
}

#[async_trait]
impl Resource for ContainerResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    async fn load_preview(&self) -> Result<Option<Vec<u8>>> {
        let Some(window) = self.bundle.member_reader(&self.member).await else {
            return Ok(None);
        };
        let tilt = TiltFile::from_reader(Arc::new(window)).await?;
        Ok(tilt.read_member(FN_THUMBNAIL).await)
    }

    async fn open(&self) -> Result<Arc<dyn ReadAt>> {
        match self.bundle.member_reader(&self.member).await {
            Some(window) => Ok(Arc::new(window)),
            None => bail!("bundle has no member {}", self.member),
        }
    }
}

/// The `.tilt` members of a bundle archive, as a collection.
///
/// Unlike most collections the total is known up front: one central
/// directory scan already listed every member.
pub struct ContainerCollection {
    bundle: Arc<TiltFile>,
    name: String,
    uri: String,
    changed: watch::Sender<u64>,
}

impl ContainerCollection {
    pub fn new(bundle: Arc<TiltFile>, name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            bundle,
            name: name.into(),
            uri: uri.into(),
            changed: watch::Sender::new(0),
        }
    }

    fn sketch_members(&self) -> Vec<String> {
        self.bundle
            .member_names()
            .into_iter()
            .filter(|name| {
                name.rsplit('.')
                    .next()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("tilt"))
            })
            .collect()
    }
}

#[async_trait]
impl ResourceCollection for ContainerCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn num_resources(&self) -> Option<usize> {
        Some(self.sketch_members().len())
    }

    fn contents(&self) -> Box<dyn ResourceCursor> {
        Box::new(ContainerCursor {
            bundle: self.bundle.clone(),
            uri: self.uri.clone(),
            members: self.sketch_members().into_iter(),
        })
    }

    fn changed(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }
}

struct ContainerCursor {
    bundle: Arc<TiltFile>,
    uri: String,
    members: std::vec::IntoIter<String>,
}

#[async_trait]
impl ResourceCursor for ContainerCursor {
    async fn next(&mut self) -> Option<CollectionItem> {
        let member = self.members.next()?;
        Some(CollectionItem::Sketch(Arc::new(ContainerResource::new(
            self.bundle.clone(),
            member,
            &self.uri,
        ))))
    }
}
