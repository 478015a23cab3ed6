//! HTTP client for a Supabase-compatible object storage API.
//!
//! Uploads go to `POST {base}/storage/v1/object/{bucket}/{path}` with the
//! service key as a bearer token; stored objects are served from
//! `{base}/storage/v1/object/public/{bucket}/{path}`.

use std::time::Duration;

use barterlink_core::StorageConfig;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Serialize;

use crate::error::StorageError;
use crate::retry::retry_with_backoff;

const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Unreserved characters stay literal inside a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

/// An object written by [`StorageClient::upload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub path: String,
    pub public_url: String,
    pub size_bytes: usize,
}

/// Client for one storage bucket.
///
/// Use [`StorageClient::from_config`] in the server, or
/// [`StorageClient::with_base_url`] to point at a mock server in tests.
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    base_url: Url,
    service_key: String,
    bucket: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("base_url", &self.base_url.as_str())
            .field("bucket", &self.bucket)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl StorageClient {
    /// # Errors
    ///
    /// Returns [`StorageError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`StorageError::InvalidBaseUrl`] for a malformed base URL.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        Self::with_base_url(
            &config.base_url,
            &config.service_key,
            &config.bucket,
            config.timeout_secs,
            config.max_retries,
        )
    }

    /// # Errors
    ///
    /// Returns [`StorageError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`StorageError::InvalidBaseUrl`] for a malformed base URL.
    pub fn with_base_url(
        base_url: &str,
        service_key: &str,
        bucket: &str,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("barterlink/0.1 (content-proof)")
            .build()?;

        // Exactly one trailing slash so `join` appends instead of replacing the
        // last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| StorageError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StorageError::InvalidBaseUrl {
                url: base_url.to_owned(),
                reason: "scheme must be http or https".to_owned(),
            });
        }

        Ok(Self {
            client,
            base_url: parsed,
            service_key: service_key.to_owned(),
            bucket: bucket.to_owned(),
            max_retries,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        })
    }

    /// Override the base back-off delay; tests use `0`.
    #[must_use]
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Public download URL for an object path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] for an empty path or one with
    /// `.`/`..` segments.
    pub fn public_url(&self, path: &str) -> Result<String, StorageError> {
        Ok(self.object_url("storage/v1/object/public", path)?.to_string())
    }

    /// Upload `body` to `path`, overwriting any existing object, retrying
    /// transient failures with back-off.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] for a bad path,
    /// [`StorageError::Rejected`] when the service answers 4xx, or
    /// [`StorageError::Http`] / [`StorageError::ServerError`] once retries
    /// are exhausted.
    pub async fn upload(
        &self,
        path: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<StoredObject, StorageError> {
        let url = self.object_url("storage/v1/object", path)?;
        let size_bytes = body.len();

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.send_upload(url.clone(), content_type, body.clone())
        })
        .await?;

        let public_url = self.public_url(path)?;
        tracing::info!(
            bucket = %self.bucket,
            path,
            size_bytes,
            "object uploaded"
        );
        Ok(StoredObject {
            path: path.to_owned(),
            public_url,
            size_bytes,
        })
    }

    async fn send_upload(
        &self,
        url: Url,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(StorageError::ServerError {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&message),
            });
        }
        Ok(())
    }

    /// Builds `{base}/{prefix}/{bucket}/{path}` with every path segment
    /// percent-encoded.
    fn object_url(&self, prefix: &str, path: &str) -> Result<Url, StorageError> {
        let segments: Vec<&str> = path.split('/').collect();
        if path.is_empty()
            || segments
                .iter()
                .any(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Err(StorageError::InvalidPath(path.to_owned()));
        }

        let encoded: Vec<String> = std::iter::once(self.bucket.as_str())
            .chain(segments)
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
            .collect();
        let relative = format!("{prefix}/{}", encoded.join("/"));
        self.base_url
            .join(&relative)
            .map_err(|e| StorageError::InvalidPath(format!("{path}: {e}")))
    }
}

/// Pull `message` (or `error`) out of a JSON error body, falling back to the
/// raw text.
fn rejection_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| body.trim().to_owned(), ToOwned::to_owned)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
