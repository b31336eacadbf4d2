//! Tests of the reqwest-backed fetcher against an in-process HTTP server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assetcache_core::fetch::{FetchError, UpstreamFailure};
use assetcache_core::service::MetadataVersionResolver;
use assetcache_core::{
    AssetSource, FetcherOptions, KeyedLockRegistry, Platform, RemoteFetcher, RequestSigner,
    VersionResolver,
};
use common::TestServer;
use secrecy::SecretString;
use tokio::net::TcpListener;

fn fetcher_for(base_url: &str) -> RemoteFetcher {
    fetcher_with_timeout(base_url, Duration::from_secs(5))
}

fn fetcher_with_timeout(base_url: &str, timeout: Duration) -> RemoteFetcher {
    let options = FetcherOptions {
        cdn_base_url: base_url.to_string(),
        timeout,
        ..FetcherOptions::default()
    };
    RemoteFetcher::new(&options, Arc::new(KeyedLockRegistry::new())).expect("client")
}

#[tokio::test]
async fn test_fetch_bytes_success() {
    let server = TestServer::start(|_| (200, b"bundle-bytes".to_vec())).await;
    let fetcher = fetcher_for(&server.base_url);

    let bytes = fetcher
        .fetch_bytes("charui_a.bundle", 5, Platform::Android)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"bundle-bytes");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/5/Android/ETC/charui_a.bundle");
}

#[tokio::test]
async fn test_fetch_manifest_uses_fixed_name() {
    let server = TestServer::start(|_| (200, vec![])).await;
    let fetcher = fetcher_for(&server.base_url);

    fetcher.fetch_manifest(77, Platform::Ios).await.unwrap();
    assert_eq!(server.requests()[0].path, "/77/iOS/PVRTC/manifest.data");
}

#[tokio::test]
async fn test_non_200_status_is_upstream_error() {
    let server = TestServer::start(|_| (404, b"missing".to_vec())).await;
    let fetcher = fetcher_for(&server.base_url);

    let err = fetcher
        .fetch_bytes("charui_gone.bundle", 1, Platform::Windows)
        .await
        .unwrap_err();
    match err {
        FetchError::Upstream { asset, kind } => {
            assert_eq!(asset, "charui_gone.bundle");
            assert_eq!(kind, UpstreamFailure::Status(404));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_refused_is_connect_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = fetcher_for(&format!("http://{addr}"));
    let err = fetcher
        .fetch_bytes("charui_a.bundle", 1, Platform::Windows)
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::Upstream { kind: UpstreamFailure::Connect, .. }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_stalled_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let fetcher = fetcher_with_timeout(&format!("http://{addr}"), Duration::from_millis(200));
    let err = fetcher
        .fetch_bytes("charui_a.bundle", 1, Platform::Windows)
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::Upstream { kind: UpstreamFailure::Timeout, .. }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_fetch_and_store_writes_destination() {
    let server = TestServer::start(|_| (200, b"stored".to_vec())).await;
    let fetcher = fetcher_for(&server.base_url);
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bundles/windows/charui_a.bundle");

    fetcher
        .fetch_and_store("charui_a.bundle", 2, Platform::Windows, &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"stored");
}

#[tokio::test]
async fn test_fetch_and_store_rejects_empty_payload() {
    let server = TestServer::start(|_| (200, Vec::new())).await;
    let fetcher = fetcher_for(&server.base_url);
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("charui_a.bundle");

    let err = fetcher
        .fetch_and_store("charui_a.bundle", 2, Platform::Windows, &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidPayload { .. }));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_asset_version_unsigned() {
    let server = TestServer::start(|_| (200, br#"{"assetVersion": 3512}"#.to_vec())).await;
    let fetcher = fetcher_for("http://unused.invalid");

    let version = fetcher
        .fetch_asset_version(&server.base_url, None)
        .await
        .unwrap();
    assert_eq!(version, 3512);

    let request = &server.requests()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/metadata");
    assert_eq!(request.body, b"{}");
    assert!(!request.headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_asset_version_signed_headers_verify() {
    let server = TestServer::start(|_| (200, br#"{"assetVersion": 9}"#.to_vec())).await;
    let fetcher = fetcher_for("http://unused.invalid");
    let signer = RequestSigner::new("pub", SecretString::from("shh".to_string()));

    let version = fetcher
        .fetch_asset_version(&server.base_url, Some(&signer))
        .await
        .unwrap();
    assert_eq!(version, 9);

    let request = &server.requests()[0];
    let date = request.headers.get("x-date").expect("X-Date header");
    let authorization = request.headers.get("authorization").expect("Authorization header");
    let expected = signer.sign_with_timestamp(date, "POST", "/metadata", &request.body);
    assert_eq!(authorization, &expected.authorization);
    assert!(authorization.starts_with("HMAC-SHA256 Credential=pub,Signature="));
}

#[tokio::test]
async fn test_asset_version_malformed_responses() {
    let bodies: [&'static [u8]; 3] = [
        br#"{"version": 1}"#,
        br#"{"assetVersion": "12"}"#,
        b"not json",
    ];
    for body in bodies {
        let server = TestServer::start(move |_| (200, body.to_vec())).await;
        let fetcher = fetcher_for("http://unused.invalid");

        let err = fetcher
            .fetch_asset_version(&server.base_url, None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::MalformedResponse { .. }),
            "body {:?} gave {err:?}",
            String::from_utf8_lossy(body)
        );
    }
}

#[tokio::test]
async fn test_asset_version_error_status() {
    let server = TestServer::start(|_| (503, Vec::new())).await;
    let fetcher = fetcher_for("http://unused.invalid");

    let err = fetcher
        .fetch_asset_version(&server.base_url, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Upstream {
            kind: UpstreamFailure::Status(503),
            ..
        }
    ));
}

#[tokio::test]
async fn test_metadata_resolver() {
    let server = TestServer::start(|_| (200, br#"{"assetVersion": 4100}"#.to_vec())).await;
    let fetcher = Arc::new(fetcher_for("http://unused.invalid"));
    let resolver = MetadataVersionResolver::new(fetcher, server.base_url.clone(), None);

    assert_eq!(resolver.resolve_current_version().await.unwrap(), 4100);
}
