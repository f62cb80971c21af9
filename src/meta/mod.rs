//! The versioned sketch metadata document.
//!
//! Only the fields the schema upgrade chain touches are modeled; the
//! rest of the document (environment, camera paths, brush lists, and
//! whatever future versions add) rides along untouched through a
//! flattened map. Transform payloads are likewise carried opaquely -
//! geometry is someone else's job.

mod upgrade;

pub use upgrade::{SCHEMA_VERSION, upgrade};

use std::sync::Mutex;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::tilt::TiltFile;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SketchMetadata {
    #[serde(rename = "SchemaVersion")]
    pub schema_version: i32,

    #[serde(rename = "GuideIndex", skip_serializing_if = "Option::is_none")]
    pub guide_index: Option<Vec<Guide>>,

    #[serde(rename = "ImageIndex", skip_serializing_if = "Option::is_none")]
    pub image_index: Option<Vec<TiltImage>>,

    #[serde(rename = "ModelIndex", skip_serializing_if = "Option::is_none")]
    pub model_index: Option<Vec<TiltModel>>,

    /// Pre-schema list of model paths belonging to the immovable "set".
    /// Folded into `ModelIndex` before the numbered upgrade steps run.
    #[serde(rename = "Set", skip_serializing_if = "Option::is_none")]
    pub set_deprecated: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Guide {
    #[serde(rename = "Type")]
    pub guide_type: String,

    #[serde(rename = "States")]
    pub states: Vec<GuideState>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuideState {
    #[serde(rename = "Pinned")]
    pub pinned: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TiltImage {
    #[serde(rename = "FileName")]
    pub file_name: String,

    #[serde(rename = "Transforms")]
    pub transforms: Vec<Value>,

    #[serde(rename = "PinStates", skip_serializing_if = "Option::is_none")]
    pub pin_states: Option<Vec<bool>>,

    #[serde(rename = "TintStates", skip_serializing_if = "Option::is_none")]
    pub tint_states: Option<Vec<bool>>,

    #[serde(rename = "GroupIds", skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<u32>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TiltModel {
    /// Local file reference; mutually exclusive with `asset_id`.
    #[serde(rename = "FilePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Remote catalog asset reference.
    #[serde(rename = "AssetId", skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,

    /// Grouped transforms. Only one of `transforms` / `raw_transforms`
    /// may be non-null.
    #[serde(rename = "Transforms", skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<Value>>,

    #[serde(rename = "RawTransforms", skip_serializing_if = "Option::is_none")]
    pub raw_transforms: Option<Vec<Value>>,

    #[serde(rename = "PinStates", skip_serializing_if = "Option::is_none")]
    pub pin_states: Option<Vec<bool>>,

    /// Membership in the long-removed immovable "set" feature. Read
    /// only so the v1 to v2 step can migrate it away.
    #[serde(rename = "InSet", skip_serializing_if = "std::ops::Not::not")]
    pub in_set_deprecated: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TiltModel {
    /// Whether this model references a remote catalog asset rather than
    /// a local file.
    pub fn is_remote(&self) -> bool {
        self.asset_id.is_some()
    }
}

/// Loads metadata documents out of containers, keeping the most recent
/// schema problem in a sticky slot so the caller can decide between
/// warn-and-proceed and abort.
#[derive(Default)]
pub struct MetadataReader {
    last_error: Mutex<Option<SchemaError>>,
}

impl MetadataReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read, parse and upgrade the metadata document of a container.
    ///
    /// Unparseable metadata yields `None`. A document from a newer
    /// schema than this build knows is returned as-is, un-upgraded,
    /// with the incompatibility recorded - never silently downgraded.
    /// Check `last_error()` either way.
    pub async fn read(&self, tilt: &TiltFile) -> Option<SketchMetadata> {
        let bytes = tilt.metadata_bytes().await?;
        self.parse(&bytes)
    }

    /// Same as [`read`](Self::read), from raw bytes.
    pub fn parse(&self, bytes: &[u8]) -> Option<SketchMetadata> {
        *self.last_error.lock().unwrap() = None;
        let mut doc: SketchMetadata = match serde_json::from_slice(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("metadata parse failed: {}", e);
                *self.last_error.lock().unwrap() = Some(SchemaError::Parse(e));
                return None;
            }
        };
        if let Err(e) = upgrade(&mut doc) {
            warn!("{}", e);
            *self.last_error.lock().unwrap() = Some(e);
        }
        Some(doc)
    }

    /// The schema problem from the most recent read, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().as_ref().map(|e| e.to_string())
    }
}
