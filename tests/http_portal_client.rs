//! Exercises the default `HttpPortalClient`/`HttpRemoteStream` pair against a
//! mocked HTTP portal, since every other integration test swaps in
//! `common::FakePortalClient` and never touches the real transport.

use std::sync::Arc;

use bufferedskystream::remote::BYTES;
use bufferedskystream::{HttpPortalClient, HttpRemoteStream, PoolConfig, PortalConfig, PortalPool, RemoteStream, TransferKind};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn http_remote_stream_round_trips_against_a_mock_portal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/skynet/skyfile"))
        .and(query_param("filename", "segment-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "skylink": "mock-skylink-0",
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/mock-skylink-0"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello portal".to_vec()))
        .mount(&server)
        .await;

    let pool_config = PoolConfig {
        download_workers: 1,
        upload_workers: 1,
        ..PoolConfig::default()
    };
    let portal_config = PortalConfig {
        portals: vec![server.uri()],
        ..PortalConfig::default()
    };
    let pool = Arc::new(PortalPool::new(pool_config, portal_config, Arc::new(HttpPortalClient::new())));
    let remote = HttpRemoteStream::open_or_create(pool.clone(), None).unwrap();

    remote.write(b"hello portal", BYTES, 0).await.unwrap();

    let mut worker = pool.take_worker(TransferKind::Download, true).await.unwrap();
    let data = remote.read(BYTES, 0, "", &mut worker).await.unwrap();
    pool.put_worker_back(worker).await;

    assert_eq!(data, b"hello portal");
}
