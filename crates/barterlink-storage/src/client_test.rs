use super::*;

fn client(base: &str) -> StorageClient {
    StorageClient::with_base_url(base, "service-key", "content-videos", 5, 0)
        .expect("client construction should not fail")
}

#[test]
fn public_url_joins_bucket_and_path() {
    let client = client("https://storage.example.com");
    let url = client
        .public_url("collab/upload/clip.mp4")
        .expect("valid path");
    assert_eq!(
        url,
        "https://storage.example.com/storage/v1/object/public/content-videos/collab/upload/clip.mp4"
    );
}

#[test]
fn base_url_with_path_prefix_is_preserved() {
    let client = client("https://example.com/proxy///");
    let url = client.public_url("a/b.mp4").expect("valid path");
    assert_eq!(
        url,
        "https://example.com/proxy/storage/v1/object/public/content-videos/a/b.mp4"
    );
}

#[test]
fn path_segments_are_percent_encoded() {
    let client = client("http://localhost:9000");
    let url = client
        .public_url("c1/u1/my clip#1?.mp4")
        .expect("valid path");
    assert!(
        url.ends_with("/content-videos/c1/u1/my%20clip%231%3F.mp4"),
        "unexpected url {url}"
    );
}

#[test]
fn traversal_and_empty_segments_are_rejected() {
    let client = client("http://localhost:9000");
    for bad in ["", "a//b.mp4", "../secret", "a/./b.mp4", "a/"] {
        assert!(
            matches!(client.public_url(bad), Err(StorageError::InvalidPath(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn non_http_base_url_is_rejected() {
    let err = StorageClient::with_base_url("ftp://files.example.com", "k", "b", 5, 0)
        .expect_err("ftp must be rejected");
    assert!(matches!(err, StorageError::InvalidBaseUrl { .. }));

    let err = StorageClient::with_base_url("not a url", "k", "b", 5, 0)
        .expect_err("garbage must be rejected");
    assert!(matches!(err, StorageError::InvalidBaseUrl { .. }));
}

#[test]
fn debug_output_redacts_service_key() {
    let rendered = format!("{:?}", client("http://localhost:9000"));
    assert!(!rendered.contains("service-key"), "{rendered}");
    assert!(rendered.contains("content-videos"));
}

#[test]
fn rejection_message_prefers_json_fields() {
    assert_eq!(
        rejection_message(r#"{"statusCode":"403","error":"Unauthorized","message":"invalid signature"}"#),
        "invalid signature"
    );
    assert_eq!(
        rejection_message(r#"{"error":"Bucket not found"}"#),
        "Bucket not found"
    );
    assert_eq!(rejection_message("  payload too large \n"), "payload too large");
}
