//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetcache_core::fetch::{FetchError, MANIFEST_ASSET_NAME, UpstreamFailure};
use assetcache_core::manifest::codec::{RawAssetEntry, RawAssetManifest, RawAssetRecord};
use assetcache_core::service::{DecodedImage, DecodedSprite, DecoderError};
use assetcache_core::{
    AssetService, AssetSource, BundleDecoder, CacheLayout, KeyedLockRegistry, Platform,
    VersionResolver,
};
use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Encode `(name, version)` pairs as an upstream manifest payload.
///
/// Each record gets a single entry, `"<name> display"`.
pub fn encode_manifest(records: &[(&str, &str)]) -> Bytes {
    let manifest = RawAssetManifest {
        records: records
            .iter()
            .map(|(name, version)| RawAssetRecord {
                name: (*name).to_string(),
                version: (*version).to_string(),
                entries: vec![RawAssetEntry {
                    asset_name: format!("{name} display"),
                }],
            })
            .collect(),
    };
    Bytes::from(manifest.encode_to_vec())
}

/// In-memory upstream that counts every request.
#[derive(Default)]
pub struct FakeSource {
    manifests: Mutex<HashMap<u64, Bytes>>,
    bundles: Mutex<HashMap<String, Bytes>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    fetches: AtomicUsize,
    requested: Mutex<Vec<(String, u64)>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_manifest(self: Arc<Self>, version: u64, records: &[(&str, &str)]) -> Arc<Self> {
        self.manifests
            .lock()
            .unwrap()
            .insert(version, encode_manifest(records));
        self
    }

    /// Serve `content` for an upstream file name such as `charui_a.bundle`.
    pub fn with_bundle(self: Arc<Self>, file_name: &str, content: &[u8]) -> Arc<Self> {
        self.bundles
            .lock()
            .unwrap()
            .insert(file_name.to_string(), Bytes::copy_from_slice(content));
        self
    }

    /// Answer requests for `file_name` with a 500.
    pub fn with_failure(self: Arc<Self>, file_name: &str) -> Arc<Self> {
        self.failing.lock().unwrap().insert(file_name.to_string());
        self
    }

    /// Stop failing requests for `file_name`.
    pub fn recover(&self, file_name: &str) {
        self.failing.lock().unwrap().remove(file_name);
    }

    /// Delay every response, widening race windows.
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of requests for one upstream file name.
    pub fn fetches_of(&self, file_name: &str) -> usize {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == file_name)
            .count()
    }

    pub fn requested(&self) -> Vec<(String, u64)> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetSource for FakeSource {
    async fn fetch_bytes(
        &self,
        asset_name: &str,
        version: u64,
        _platform: Platform,
    ) -> Result<Bytes, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap()
            .push((asset_name.to_string(), version));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let not_found = || FetchError::Upstream {
            asset: asset_name.to_string(),
            kind: UpstreamFailure::Status(404),
        };

        if asset_name == MANIFEST_ASSET_NAME {
            return self
                .manifests
                .lock()
                .unwrap()
                .get(&version)
                .cloned()
                .ok_or_else(not_found);
        }
        if self.failing.lock().unwrap().contains(asset_name) {
            return Err(FetchError::Upstream {
                asset: asset_name.to_string(),
                kind: UpstreamFailure::Status(500),
            });
        }
        Ok(self
            .bundles
            .lock()
            .unwrap()
            .get(asset_name)
            .cloned()
            .unwrap_or_else(|| Bytes::from(format!("bundle:{asset_name}@{version}"))))
    }
}

/// Decoder that reports the file it was given.
///
/// Files whose content starts with `broken` fail to decode.
pub struct FakeDecoder;

impl FakeDecoder {
    async fn load(path: &Path) -> Result<(String, Vec<u8>), DecoderError> {
        let content = tokio::fs::read(path).await?;
        if content.starts_with(b"broken") {
            return Err("unreadable bundle".into());
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Ok((stem, content))
    }
}

#[async_trait]
impl BundleDecoder for FakeDecoder {
    async fn decode_single(&self, path: &Path) -> Result<DecodedImage, DecoderError> {
        let (stem, content) = Self::load(path).await?;
        Ok(DecodedImage {
            image_bytes: content,
            display_name: format!("{stem}_tex"),
        })
    }

    async fn decode_many(&self, path: &Path) -> Result<Vec<DecodedSprite>, DecoderError> {
        let (stem, _) = Self::load(path).await?;
        Ok(vec![DecodedSprite {
            name: format!("{stem}_tex"),
            image_data: "data:image/png;base64,".to_string(),
            valid: true,
        }])
    }
}

/// Resolver returning a fixed version.
pub struct FixedVersion(pub u64);

#[async_trait]
impl VersionResolver for FixedVersion {
    async fn resolve_current_version(&self) -> Result<u64, FetchError> {
        Ok(self.0)
    }
}

/// A service over a fresh temporary cache root, with [`FakeDecoder`].
pub fn service_with(source: Arc<FakeSource>) -> (TempDir, Arc<AssetService>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let layout = CacheLayout::new(dir.path()).expect("layout");
    let service = AssetService::new(source, layout, Arc::new(KeyedLockRegistry::new()))
        .with_decoder(Arc::new(FakeDecoder));
    (dir, Arc::new(service))
}

/// One request received by [`TestServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

type Responder = dyn Fn(&RecordedRequest) -> (u16, Vec<u8>) + Send + Sync;

/// Minimal HTTP/1.1 server answering each connection once.
pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, Vec<u8>) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                let responder = responder.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    let (status, body) = responder(&request);
                    recorded.lock().unwrap().push(request);
                    let head = format!(
                        "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        reason(status),
                        body.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
