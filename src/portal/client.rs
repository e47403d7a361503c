//! Low-level single-portal HTTP operations.
//!
//! [`PortalClient`] is the swappable transport layer a [`super::pool::PortalPool`]
//! drives through its retry loop. Swapping in a fake implementation (see the
//! crate's integration tests) is how the scheduler itself is tested without a
//! real portal network.

use crate::error::PortalError;
use std::time::Duration;

/// One file to be uploaded, mirroring a Skynet `skyfile` multipart part.
#[derive(Clone, Debug)]
pub struct UploadFile {
    /// The field name under which this file is attached to the upload.
    pub filename: String,
    /// MIME content type advertised for this file.
    pub content_type: String,
    /// The file's raw bytes.
    pub data: Vec<u8>,
}

/// The bytes and metadata returned by a download request.
#[derive(Clone, Debug, Default)]
pub struct PortalResponse {
    /// The bytes contained in the requested byte range(s).
    pub data: Vec<u8>,
    /// The filename the portal associates with the skylink, if reported.
    pub filename: String,
}

/// Abstraction over a single HTTP portal endpoint.
///
/// Implementations perform exactly one request attempt; all retry policy
/// lives in [`super::pool::PortalPool`], which is the only caller of this
/// trait's methods.
#[async_trait::async_trait]
pub trait PortalClient: Send + Sync {
    /// Fetch the given byte ranges of `skylink` from `portal`, bounded to
    /// `max_size` total bytes, aborting the request after `timeout`.
    async fn download(
        &self,
        portal: &str,
        skylink: &str,
        ranges: &[(u64, u64)],
        max_size: u64,
        timeout: Duration,
    ) -> Result<PortalResponse, PortalError>;

    /// Upload `files` under `filename` to `portal`, aborting after `timeout`.
    /// Returns the resulting skylink.
    async fn upload(
        &self,
        portal: &str,
        filename: &str,
        files: &[UploadFile],
        timeout: Duration,
    ) -> Result<String, PortalError>;
}

/// Default [`PortalClient`] backed by `reqwest`, speaking the Sia Skynet
/// portal HTTP API: `GET /<skylink>` with a `Range` header for downloads,
/// `POST /skynet/skyfile` multipart for uploads.
pub struct HttpPortalClient {
    http: reqwest::Client,
}

impl HttpPortalClient {
    /// Build a client with default `reqwest` settings.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpPortalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PortalClient for HttpPortalClient {
    async fn download(
        &self,
        portal: &str,
        skylink: &str,
        ranges: &[(u64, u64)],
        max_size: u64,
        timeout: Duration,
    ) -> Result<PortalResponse, PortalError> {
        let url = format!("{}/{}", portal.trim_end_matches('/'), skylink);
        let mut request = self.http.get(&url).timeout(timeout);
        if let Some((first, last)) = ranges.first() {
            let end = (*last).min(first + max_size).saturating_sub(1);
            request = request.header("Range", format!("bytes={}-{}", first, end));
        }

        let response = request.send().await.map_err(|source| {
            if source.is_timeout() {
                PortalError::Timeout(timeout)
            } else {
                PortalError::Request { url: url.clone(), source }
            }
        })?;

        if !response.status().is_success() && response.status().as_u16() != 206 {
            return Err(PortalError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let filename = response
            .headers()
            .get("skynet-filename")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    PortalError::Timeout(timeout)
                } else {
                    PortalError::Request { url, source }
                }
            })?
            .to_vec();

        Ok(PortalResponse { data, filename })
    }

    async fn upload(
        &self,
        portal: &str,
        filename: &str,
        files: &[UploadFile],
        timeout: Duration,
    ) -> Result<String, PortalError> {
        let url = format!("{}/skynet/skyfile?filename={}", portal.trim_end_matches('/'), filename);

        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let part = reqwest::multipart::Part::bytes(file.data.clone())
                .file_name(file.filename.clone())
                .mime_str(&file.content_type)
                .unwrap_or_else(|_| reqwest::multipart::Part::bytes(file.data.clone()));
            form = form.part(file.filename.clone(), part);
        }

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    PortalError::Timeout(timeout)
                } else {
                    PortalError::Request { url: url.clone(), source }
                }
            })?;

        if !response.status().is_success() {
            return Err(PortalError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        #[derive(serde::Deserialize)]
        struct UploadResponse {
            skylink: String,
        }

        let parsed: UploadResponse = response.json().await.map_err(|source| {
            if source.is_timeout() {
                PortalError::Timeout(timeout)
            } else {
                PortalError::Request { url, source }
            }
        })?;

        Ok(parsed.skylink)
    }
}
