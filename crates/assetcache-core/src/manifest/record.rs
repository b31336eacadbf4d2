//! Manifest records and snapshots.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Prefix of an asset name: everything before the first `_`, or the whole
/// name when it has none.
pub fn name_prefix(name: &str) -> &str {
    name.split_once('_').map_or(name, |(prefix, _)| prefix)
}

/// One asset entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Unique identifier of the asset within one snapshot.
    pub name: String,
    /// Primary display name (first entry of the record's asset list).
    #[serde(rename = "fullname")]
    pub full_name: String,
    /// Opaque per-record version token, compared for equality only.
    pub version: String,
    /// Name prefix used for filtered diffing.
    pub prefix: String,
}

impl ManifestRecord {
    /// Build a record, deriving `prefix` from `name`.
    pub fn new(
        name: impl Into<String>,
        full_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let prefix = name_prefix(&name).to_owned();
        Self {
            name,
            full_name: full_name.into(),
            version: version.into(),
            prefix,
        }
    }
}

/// The ordered record list of one manifest version.
///
/// Decode order is preserved. Names are unique within a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestSnapshot {
    records: Vec<ManifestRecord>,
}

impl ManifestSnapshot {
    pub fn new(records: Vec<ManifestRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record names in snapshot order.
    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn name_set(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    /// A copy restricted to records whose prefix equals `prefix`.
    pub fn filtered_by_prefix(&self, prefix: &str) -> ManifestSnapshot {
        ManifestSnapshot {
            records: self
                .records
                .iter()
                .filter(|r| r.prefix == prefix)
                .cloned()
                .collect(),
        }
    }
}

impl FromIterator<ManifestRecord> for ManifestSnapshot {
    fn from_iter<I: IntoIterator<Item = ManifestRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
