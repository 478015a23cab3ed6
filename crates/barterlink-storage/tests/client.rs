//! Integration tests for `StorageClient` using wiremock HTTP mocks.

use barterlink_storage::{StorageClient, StorageError};
use bytes::Bytes;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OBJECT_PATH: &str = "storage/v1/object/videos/c1/u1/clip.mp4";

fn test_client(base_url: &str, max_retries: u32) -> StorageClient {
    StorageClient::with_base_url(base_url, "test-key", "videos", 5, max_retries)
        .expect("client construction should not fail")
        .with_backoff_base_ms(0)
}

#[tokio::test]
async fn upload_sends_bearer_and_upsert_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/{OBJECT_PATH}")))
        .and(header("authorization", "Bearer test-key"))
        .and(header("content-type", "video/mp4"))
        .and(header("x-upsert", "true"))
        .and(body_bytes(b"fake-video".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Key": "videos/c1/u1/clip.mp4"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 0);
    let stored = client
        .upload("c1/u1/clip.mp4", "video/mp4", Bytes::from_static(b"fake-video"))
        .await
        .expect("upload should succeed");

    assert_eq!(stored.path, "c1/u1/clip.mp4");
    assert_eq!(stored.size_bytes, 10);
    assert_eq!(
        stored.public_url,
        format!(
            "{}/storage/v1/object/public/videos/c1/u1/clip.mp4",
            server.uri()
        )
    );
}

#[tokio::test]
async fn server_error_is_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/{OBJECT_PATH}")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{OBJECT_PATH}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 3);
    let stored = client
        .upload("c1/u1/clip.mp4", "video/mp4", Bytes::from_static(b"abc"))
        .await
        .expect("third attempt should succeed");
    assert_eq!(stored.size_bytes, 3);
}

#[tokio::test]
async fn server_error_surfaces_after_retries_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 2);
    let err = client
        .upload("c1/u1/clip.mp4", "video/mp4", Bytes::from_static(b"abc"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, StorageError::ServerError { status: 500 }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "statusCode": "403",
            "error": "Unauthorized",
            "message": "invalid signature"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 3);
    let err = client
        .upload("c1/u1/clip.mp4", "video/mp4", Bytes::from_static(b"abc"))
        .await
        .expect_err("should fail");

    match err {
        StorageError::Rejected { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "invalid signature");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_path_never_reaches_the_server() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 3);
    let err = client
        .upload("../escape.mp4", "video/mp4", Bytes::from_static(b"abc"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, StorageError::InvalidPath(_)));
}
