//! Ordered schema migration chain.
//!
//! Append-only: steps are never removed or renumbered. Each step `N`
//! runs only when `schema_version < N`, may assume every invariant the
//! prior steps established, and leaves `schema_version == N`. Running
//! the chain against an already-current document changes nothing.

use log::error;
use serde_json::{Value, json};

use super::SketchMetadata;
use crate::error::SchemaError;

/// Latest schema this build reads and writes.
pub const SCHEMA_VERSION: i32 = 2;

/// Bring a document up to [`SCHEMA_VERSION`].
///
/// A document claiming a newer schema than this build knows is left
/// untouched and reported; downgrading it would silently drop data.
pub fn upgrade(doc: &mut SketchMetadata) -> Result<(), SchemaError> {
    if doc.schema_version > SCHEMA_VERSION {
        return Err(SchemaError::FutureVersion {
            found: doc.schema_version,
            latest: SCHEMA_VERSION,
        });
    }

    fold_deprecated_set(doc);

    if doc.schema_version < 1 {
        upgrade_0_to_1(doc);
    }
    if doc.schema_version < 2 {
        upgrade_1_to_2(doc);
    }
    Ok(())
}

/// Identity transform in the on-disk `[[px,py,pz],[qx,qy,qz,qw],scale]`
/// shape.
fn identity_transform() -> Value {
    json!([[0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], 1.0])
}

/// Pre-schema cleanup: the standalone `Set` path list predates model
/// entries knowing their own set membership. Fold it into
/// `ModelIndex[].InSet` so the numbered steps see one shape.
fn fold_deprecated_set(doc: &mut SketchMetadata) {
    let Some(set) = doc.set_deprecated.take() else {
        return;
    };

    let models = doc.model_index.get_or_insert_with(Vec::new);
    let mut set_only: Vec<String> = set.clone();
    for model in models.iter_mut() {
        if let Some(path) = &model.file_path {
            if set.contains(path) {
                model.in_set_deprecated = true;
                set_only.retain(|p| p != path);
            }
        }
    }
    // Paths that appeared only in the set list become their own entries.
    for path in set_only {
        models.push(super::TiltModel {
            file_path: Some(path),
            in_set_deprecated: true,
            ..Default::default()
        });
    }
}

/// v0 to v1: introduces per-entry pin and tint state arrays.
///
/// Pin flags were not written out before v1, so guides default to
/// pinned, images to pinned and tinted, and models to pinned when they
/// reference a local file. Remote catalog assets default unpinned.
fn upgrade_0_to_1(doc: &mut SketchMetadata) {
    if let Some(guides) = &mut doc.guide_index {
        for guide in guides.iter_mut() {
            for state in guide.states.iter_mut() {
                state.pinned = true;
            }
        }
    }

    if let Some(images) = &mut doc.image_index {
        for image in images.iter_mut() {
            let n = image.transforms.len();
            image.pin_states = Some(vec![true; n]);
            image.tint_states = Some(vec![true; n]);
            image.group_ids = Some(vec![0; n]);
        }
    }

    if let Some(models) = &mut doc.model_index {
        for model in models.iter_mut() {
            let n = model
                .transforms
                .as_ref()
                .or(model.raw_transforms.as_ref())
                .map_or(0, Vec::len);
            model.pin_states = Some(vec![!model.is_remote(); n]);
        }
    }

    doc.schema_version = 1;
}

/// v1 to v2: removes the experimental immovable-set feature.
///
/// Each set member gains an explicit identity raw transform, pinned.
/// Slight behavior change and deliberate: sets were immovable, raw
/// transforms can be unpinned later. Structural no-op for documents
/// that never used sets.
fn upgrade_1_to_2(doc: &mut SketchMetadata) {
    if let Some(models) = &mut doc.model_index {
        for model in models.iter_mut() {
            if !model.in_set_deprecated {
                continue;
            }
            // Only one of Transforms / RawTransforms may be non-null, so
            // the extra entry can only go into RawTransforms.
            if model.transforms.is_some() {
                error!("cannot upgrade InSet while Transforms is non-null");
                continue;
            }
            model.in_set_deprecated = false;
            model
                .raw_transforms
                .get_or_insert_with(Vec::new)
                .push(identity_transform());
            model
                .pin_states
                .get_or_insert_with(Vec::new)
                .push(true);
        }
    }
    doc.schema_version = 2;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Guide, GuideState, SketchMetadata, TiltImage, TiltModel};

    fn v0_doc() -> SketchMetadata {
        SketchMetadata {
            schema_version: 0,
            guide_index: Some(vec![Guide {
                guide_type: "cube".to_string(),
                states: vec![GuideState::default(), GuideState::default()],
                ..Default::default()
            }]),
            image_index: Some(vec![TiltImage {
                file_name: "photo.png".to_string(),
                transforms: vec![identity_transform(), identity_transform()],
                ..Default::default()
            }]),
            model_index: Some(vec![
                TiltModel {
                    file_path: Some("Models/chair.obj".to_string()),
                    raw_transforms: Some(vec![identity_transform()]),
                    ..Default::default()
                },
                TiltModel {
                    asset_id: Some("aBcDeF12345".to_string()),
                    raw_transforms: Some(vec![identity_transform()]),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn v0_guides_default_to_pinned() {
        let mut doc = v0_doc();
        upgrade(&mut doc).unwrap();

        assert_eq!(doc.schema_version, 2);
        let guides = doc.guide_index.unwrap();
        assert!(guides[0].states.iter().all(|s| s.pinned));
    }

    #[test]
    fn v0_images_default_pinned_tinted_ungrouped() {
        let mut doc = v0_doc();
        upgrade(&mut doc).unwrap();

        let image = &doc.image_index.unwrap()[0];
        assert_eq!(image.pin_states, Some(vec![true, true]));
        assert_eq!(image.tint_states, Some(vec![true, true]));
        assert_eq!(image.group_ids, Some(vec![0, 0]));
    }

    #[test]
    fn v0_model_pin_depends_on_location() {
        let mut doc = v0_doc();
        upgrade(&mut doc).unwrap();

        let models = doc.model_index.unwrap();
        assert_eq!(models[0].pin_states, Some(vec![true]), "local file pinned");
        assert_eq!(models[1].pin_states, Some(vec![false]), "remote asset unpinned");
    }

    #[test]
    fn in_set_becomes_extra_raw_transform() {
        let mut doc = SketchMetadata {
            schema_version: 1,
            model_index: Some(vec![TiltModel {
                file_path: Some("Models/house.obj".to_string()),
                raw_transforms: Some(vec![identity_transform()]),
                pin_states: Some(vec![false]),
                in_set_deprecated: true,
                ..Default::default()
            }]),
            ..Default::default()
        };
        upgrade(&mut doc).unwrap();

        let model = &doc.model_index.unwrap()[0];
        assert!(!model.in_set_deprecated);
        assert_eq!(model.raw_transforms.as_ref().unwrap().len(), 2);
        assert_eq!(model.pin_states, Some(vec![false, true]));
    }

    #[test]
    fn set_list_is_folded_before_numbered_steps() {
        let mut doc = SketchMetadata {
            schema_version: 0,
            set_deprecated: Some(vec![
                "Models/chair.obj".to_string(),
                "Models/orphan.obj".to_string(),
            ]),
            model_index: Some(vec![TiltModel {
                file_path: Some("Models/chair.obj".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        upgrade(&mut doc).unwrap();

        assert!(doc.set_deprecated.is_none());
        let models = doc.model_index.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].file_path.as_deref(), Some("Models/orphan.obj"));
        // Both came through the 1->2 step, so neither is still InSet.
        assert!(models.iter().all(|m| !m.in_set_deprecated));
        assert!(models.iter().all(|m| m.raw_transforms.is_some()));
    }

    #[test]
    fn upgrade_is_idempotent() {
        let mut once = v0_doc();
        upgrade(&mut once).unwrap();
        let mut twice = once.clone();
        upgrade(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn current_document_is_untouched() {
        let mut doc = v0_doc();
        upgrade(&mut doc).unwrap();
        let before = doc.clone();
        upgrade(&mut doc).unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn future_version_is_rejected_not_downgraded() {
        let mut doc = SketchMetadata {
            schema_version: 3,
            ..Default::default()
        };
        let err = upgrade(&mut doc).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::FutureVersion { found: 3, latest: 2 }
        ));
        assert_eq!(doc.schema_version, 3);
    }

    #[test]
    fn unknown_fields_ride_along() {
        let json = r#"{
            "SchemaVersion": 0,
            "EnvironmentPreset": "Night Sky",
            "GuideIndex": [{"Type": "sphere", "States": [{"Extents": [1,1,1]}]}]
        }"#;
        let reader = crate::meta::MetadataReader::new();
        let doc = reader.parse(json.as_bytes()).unwrap();
        assert!(reader.last_error().is_none());
        assert_eq!(doc.schema_version, 2);
        assert_eq!(
            doc.extra.get("EnvironmentPreset"),
            Some(&serde_json::Value::String("Night Sky".to_string()))
        );
        let state = &doc.guide_index.unwrap()[0].states[0];
        assert!(state.pinned);
        assert!(state.extra.contains_key("Extents"));
    }

    #[test]
    fn versionless_guides_gain_pinned_flag() {
        let json = r#"{
            "GuideIndex": [
                {"Type": "cube", "States": [{}, {}]},
                {"Type": "sphere", "States": [{}]}
            ]
        }"#;
        let reader = crate::meta::MetadataReader::new();
        let doc = reader.parse(json.as_bytes()).unwrap();
        assert_eq!(doc.schema_version, 2);
        for guide in doc.guide_index.unwrap() {
            assert!(guide.states.iter().all(|s| s.pinned));
        }
    }
}
