//! Manifest encoding.
//!
//! Two representations are handled here:
//!
//! - the upstream binary payload (`manifest.data`), a protobuf message
//!   decoded with `prost`
//! - the cache file, a pretty-printed JSON array of [`ManifestRecord`]s

use prost::Message;
use thiserror::Error;
use tracing::trace;

use super::record::{ManifestRecord, ManifestSnapshot};

/// Upstream manifest message.
#[derive(Clone, PartialEq, Message)]
pub struct RawAssetManifest {
    #[prost(message, repeated, tag = "1")]
    pub records: Vec<RawAssetRecord>,
}

/// One record of the upstream manifest.
#[derive(Clone, PartialEq, Message)]
pub struct RawAssetRecord {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(message, repeated, tag = "3")]
    pub entries: Vec<RawAssetEntry>,
}

/// An asset file listed under a record.
#[derive(Clone, PartialEq, Message)]
pub struct RawAssetEntry {
    #[prost(string, tag = "1")]
    pub asset_name: String,
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to decode manifest payload: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Manifest record '{name}' has no asset entries")]
    EmptyRecord { name: String },

    #[error("Cached manifest is corrupt: {reason}")]
    CacheCorruption { reason: String },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Decode an upstream manifest payload.
///
/// Each record's display name is its first asset entry. An empty payload
/// decodes to an empty snapshot.
pub fn decode(raw: &[u8]) -> Result<ManifestSnapshot, CodecError> {
    let manifest = RawAssetManifest::decode(raw)?;
    trace!(records = manifest.records.len(), "Decoded manifest payload");

    manifest
        .records
        .into_iter()
        .map(|record| {
            let full_name = record
                .entries
                .into_iter()
                .next()
                .map(|entry| entry.asset_name)
                .ok_or_else(|| CodecError::EmptyRecord {
                    name: record.name.clone(),
                })?;
            Ok(ManifestRecord::new(record.name, full_name, record.version))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ManifestSnapshot::new)
}

/// Serialize a snapshot to its cache file form.
pub fn serialize(snapshot: &ManifestSnapshot) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec_pretty(snapshot).map_err(CodecError::Serialize)
}

/// Parse a cache file back into a snapshot.
///
/// Empty or malformed content is reported as [`CodecError::CacheCorruption`].
pub fn parse(bytes: &[u8]) -> Result<ManifestSnapshot, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::CacheCorruption {
            reason: "file is empty".to_string(),
        });
    }
    serde_json::from_slice(bytes).map_err(|e| CodecError::CacheCorruption {
        reason: e.to_string(),
    })
}
