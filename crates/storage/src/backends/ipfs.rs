//! IPFS content store reached through the Kubo HTTP RPC API.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ContentStore, StoredObject, check_range};
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::ContentAddress;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::instrument;

/// Connect timeout for all API calls.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest error body kept for logging.
const MAX_ERROR_BODY: usize = 512;

/// Reply to `/api/v0/add`.
#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Error reply from any API command.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(rename = "Version")]
    version: String,
}

/// IPFS-backed content store.
///
/// Content is added with CIDv1 raw leaves and pinned, so the CID returned by
/// the node is the content address.
pub struct IpfsBackend {
    client: Client,
    endpoint: String,
    request_timeout: Duration,
}

impl IpfsBackend {
    /// Create a client for the node at `endpoint` (e.g. "http://127.0.0.1:5001").
    pub fn new(endpoint: &str, request_timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    fn api_url(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.endpoint, command)
    }
}

/// Classify a transport failure.
fn send_error(e: reqwest::Error) -> StorageError {
    if e.is_connect() || e.is_timeout() {
        StorageError::Unavailable(e.to_string())
    } else {
        StorageError::Backend(e.to_string())
    }
}

/// Extract the node's error message from a non-success reply.
async fn error_message(response: reqwest::Response) -> (StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.chars().take(MAX_ERROR_BODY).collect());
    (status, message)
}

/// Map a failed `cat` reply onto the storage taxonomy.
fn read_error(status: StatusCode, message: &str, address: &ContentAddress) -> StorageError {
    let lower = message.to_ascii_lowercase();
    if status == StatusCode::NOT_FOUND || lower.contains("not found") || lower.contains("no link named") {
        StorageError::NotFound(address.to_string())
    } else if lower.contains("invalid cid") || lower.contains("invalid path") {
        StorageError::InvalidAddress(format!("{address}: {message}"))
    } else if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::GATEWAY_TIMEOUT {
        StorageError::Unavailable(format!("{status}: {message}"))
    } else {
        StorageError::Backend(format!("{status}: {message}"))
    }
}

#[async_trait]
impl ContentStore for IpfsBackend {
    #[instrument(skip(self, data), fields(backend = "ipfs"))]
    async fn put(&self, data: ByteStream) -> StorageResult<StoredObject> {
        let observed = Arc::new(AtomicU64::new(0));
        let stream_failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let counter = observed.clone();
        let failure = stream_failure.clone();
        let body = data
            .inspect_ok(move |chunk| {
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            })
            .inspect_err(move |e| {
                if let Ok(mut slot) = failure.lock() {
                    slot.get_or_insert_with(|| e.to_string());
                }
            });

        let part = Part::stream(reqwest::Body::wrap_stream(body)).file_name("file");
        let form = Form::new().part("file", part);

        let sent = self
            .client
            .post(self.api_url("add"))
            .query(&[
                ("pin", "true"),
                ("cid-version", "1"),
                ("raw-leaves", "true"),
                ("quieter", "true"),
            ])
            .multipart(form)
            .send()
            .await;

        let stream_failure = stream_failure.lock().ok().and_then(|mut slot| slot.take());
        if let Some(message) = stream_failure {
            return Err(StorageError::UploadStream(message));
        }

        let response = sent.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                StorageError::Unavailable(e.to_string())
            } else {
                StorageError::WriteFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let (status, message) = error_message(response).await;
            return Err(StorageError::WriteFailed(format!("{status}: {message}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        // The reply is newline-delimited JSON; the last object describes the root.
        let last = body
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| StorageError::WriteFailed("empty add response".to_string()))?;
        let added: AddResponse = serde_json::from_str(last)
            .map_err(|e| StorageError::WriteFailed(format!("malformed add response: {e}")))?;

        let address = ContentAddress::new(added.hash)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        let size = observed.load(Ordering::Relaxed);
        tracing::debug!(address = %address, size, "content added");

        Ok(StoredObject { address, size })
    }

    #[instrument(skip(self), fields(backend = "ipfs"))]
    async fn get_range(
        &self,
        address: &ContentAddress,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes> {
        check_range(offset, length)?;
        if length == 0 {
            return Ok(Bytes::new());
        }

        let offset = offset.to_string();
        let length_param = length.to_string();
        let response = self
            .client
            .post(self.api_url("cat"))
            .query(&[
                ("arg", address.as_str()),
                ("offset", offset.as_str()),
                ("length", length_param.as_str()),
            ])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            let (status, message) = error_message(response).await;
            return Err(read_error(status, &message, address));
        }

        response.bytes().await.map_err(send_error)
    }

    fn backend_name(&self) -> &'static str {
        "ipfs"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let response = self
            .client
            .post(self.api_url("version"))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            let (status, message) = error_message(response).await;
            return Err(StorageError::Unavailable(format!("{status}: {message}")));
        }

        let version: VersionResponse = response.json().await.map_err(send_error)?;
        tracing::info!(endpoint = %self.endpoint, version = %version.version, "IPFS node reachable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ContentAddress {
        ContentAddress::new("bafkreidon73zkcrwdb5iafqtijxildoonbwnpv7dyd6ef3qdgads2jc4su").unwrap()
    }

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let backend = IpfsBackend::new("http://127.0.0.1:5001/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.api_url("cat"), "http://127.0.0.1:5001/api/v0/cat");
    }

    #[test]
    fn test_read_error_classification() {
        let addr = address();
        assert!(matches!(
            read_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "block was not found locally (offline)",
                &addr
            ),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            read_error(StatusCode::BAD_REQUEST, "invalid path \"x\": invalid cid", &addr),
            StorageError::InvalidAddress(_)
        ));
        assert!(matches!(
            read_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded", &addr),
            StorageError::Unavailable(_)
        ));
        assert!(matches!(
            read_error(StatusCode::INTERNAL_SERVER_ERROR, "boom", &addr),
            StorageError::Backend(_)
        ));
    }
}
