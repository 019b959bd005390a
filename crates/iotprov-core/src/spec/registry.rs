//! Device spec registry
//!
//! Holds the device table used for every lookup after startup: the built-in
//! models, optionally overridden from a JSON file.

use std::collections::BTreeMap;
use std::path::Path;

use super::builtin;
use super::file::{self, ModelOverride, SpecFileError};
use super::types::{DeviceModel, ModelId, Segment};
use crate::error::{Error, Result};

/// Read-only table of device models keyed by model id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    models: BTreeMap<ModelId, DeviceModel>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in models
    pub fn builtin() -> Self {
        Self::from_models(builtin::models())
    }

    pub fn from_models(models: impl IntoIterator<Item = DeviceModel>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    /// Build the registry from `base` plus an optional override file
    ///
    /// A missing or malformed override file is logged and ignored; the base
    /// table is returned unchanged in that case.
    pub fn load(base: Vec<DeviceModel>, overrides: Option<&Path>) -> Self {
        let mut registry = Self::from_models(base);

        if let Some(path) = overrides {
            match file::load_file(path) {
                Ok(entries) => {
                    let count = registry.apply(entries);
                    log::debug!(
                        "Applied {} device spec overrides from {}",
                        count,
                        path.display()
                    );
                }
                Err(e) => {
                    log::warn!(
                        "Ignoring device spec overrides in {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        registry
    }

    /// Apply overrides from a JSON string, leaving the registry untouched on error
    pub fn apply_overrides_str(
        &mut self,
        json: &str,
    ) -> std::result::Result<usize, SpecFileError> {
        let entries = file::parse_overrides(json)?;
        Ok(self.apply(entries))
    }

    /// Merge overrides at model granularity
    ///
    /// An override replaces the model's whole segment list. Metadata the
    /// override leaves unset keeps the existing value.
    fn apply(&mut self, entries: Vec<ModelOverride>) -> usize {
        let count = entries.len();
        for entry in entries {
            let model = self.models.entry(entry.id).or_insert_with(|| {
                log::debug!("Adding model {} from overrides", entry.id);
                DeviceModel::new(entry.id, entry.id.to_string())
            });

            if let Some(name) = entry.product_name {
                model.product_name = name;
            }
            if entry.product_id.is_some() {
                model.product_id = entry.product_id;
            }
            if entry.serial.is_some() {
                model.serial = entry.serial;
            }
            if let Some(protocol) = entry.default_protocol {
                model.default_protocol = protocol;
            }
            if entry.alternative_protocol.is_some() {
                model.alternative_protocol = entry.alternative_protocol;
            }
            model.segments = entry.segments;
        }
        count
    }

    pub fn lookup(&self, id: ModelId) -> Result<&DeviceModel> {
        self.models.get(&id).ok_or(Error::UnknownModel(id))
    }

    pub fn lookup_segment(&self, id: ModelId, segment: &str) -> Result<&Segment> {
        self.lookup(id)?
            .segment(segment)
            .ok_or_else(|| Error::SegmentUndefined {
                model: id,
                segment: segment.to_string(),
            })
    }

    /// Find the model whose serial-port USB ids match
    pub fn find_by_serial(&self, vendor: u16, product: u16) -> Option<&DeviceModel> {
        let serial = ModelId::new(vendor, product);
        self.models.values().find(|m| m.serial == Some(serial))
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ModelId> + '_ {
        self.models.keys().copied()
    }

    pub fn models(&self) -> impl Iterator<Item = &DeviceModel> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::spec::builtin::{ELECTRON, PHOTON, SERVER_KEY};
    use std::io::Write;

    #[test]
    fn test_every_builtin_segment_resolves() {
        let registry = DeviceRegistry::builtin();
        assert_eq!(registry.len(), 5);

        for model in registry.models() {
            for segment in &model.segments {
                let found = registry.lookup_segment(model.id, &segment.name).unwrap();
                assert!(!found.transport_address().is_empty());
                assert_eq!(found, segment);
            }
        }
    }

    #[test]
    fn test_unknown_segment() {
        let registry = DeviceRegistry::builtin();
        let err = registry.lookup_segment(PHOTON, "bootloader").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SegmentUndefined);
    }

    #[test]
    fn test_unknown_model() {
        let registry = DeviceRegistry::builtin();
        let err = registry.lookup(ModelId::new(0x1234, 0x5678)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDeviceSpec);
    }

    #[test]
    fn test_override_replaces_segment_map() {
        let base = DeviceRegistry::builtin();
        let mut registry = base.clone();

        let json = r#"{ "2b04:d006": { "userFirmware": { "address": "0x080C0000", "alt": 0 } } }"#;
        assert_eq!(registry.apply_overrides_str(json).unwrap(), 1);

        let photon = registry.lookup(PHOTON).unwrap();
        assert_eq!(photon.segments.len(), 1);
        assert_eq!(photon.segments[0].address, 0x080C_0000);
        // No deep merge: the built-in key slots are gone
        assert!(registry.lookup_segment(PHOTON, SERVER_KEY).is_err());
        // Metadata not in the override is kept
        assert_eq!(photon.product_name, "Photon");
        assert_eq!(photon.product_id, Some(6));

        for model in base.models().filter(|m| m.id != PHOTON) {
            assert_eq!(registry.lookup(model.id).unwrap(), model);
        }
    }

    #[test]
    fn test_override_adds_model() {
        let mut registry = DeviceRegistry::builtin();
        let json = r#"{ "1234:abcd": {
            "productName": "Custom",
            "userFirmware": { "address": 4096 }
        } }"#;
        registry.apply_overrides_str(json).unwrap();

        let custom = registry.lookup(ModelId::new(0x1234, 0xabcd)).unwrap();
        assert_eq!(custom.product_name, "Custom");
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_load_ignores_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ \"2b04:d006\": [").unwrap();

        let registry = DeviceRegistry::load(builtin::models(), Some(file.path()));
        assert_eq!(registry, DeviceRegistry::builtin());
    }

    #[test]
    fn test_load_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            DeviceRegistry::load(builtin::models(), Some(&dir.path().join("specs.json")));
        assert_eq!(registry, DeviceRegistry::builtin());
    }

    #[test]
    fn test_load_applies_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{ "2b04:d00a": { "defaultProtocol": "tcp", "transport": { "address": 2977, "size": 1, "alt": 1 } } }"#,
        )
        .unwrap();

        let registry = DeviceRegistry::load(builtin::models(), Some(file.path()));
        let electron = registry.lookup(ELECTRON).unwrap();
        assert_eq!(electron.segments.len(), 1);
        assert_eq!(electron.default_protocol, crate::spec::Protocol::Tcp);
    }

    #[test]
    fn test_find_by_serial() {
        let registry = DeviceRegistry::builtin();
        let model = registry.find_by_serial(0x2b04, 0xc00a).unwrap();
        assert_eq!(model.id, ELECTRON);
        assert!(registry.find_by_serial(0x2b04, 0xffff).is_none());
    }
}
