use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{config::IndexConfig, model::RegisterFile};

const ENDPOINT_PATH: &str = "/api/videos/files";

#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("error contacting index service: {0}")]
    Request(#[from] reqwest::Error),
    #[error("index service returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not parse index service response: {body}")]
    MalformedResponse { body: String },
    #[error("index service reported failure: {0}")]
    Rejected(String),
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum IndexRequest<'a> {
    Add { file: &'a RegisterFile },
    Sync,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    success: bool,
    count: Option<u64>,
    error: Option<String>,
}

/// The index service's view of the store is eventually consistent; callers
/// never assume it already matches and can always request a full rebuild.
#[async_trait]
pub trait IndexApi: Send + Sync {
    /// Register or update a single asset's index entry.
    async fn register(&self, file: &RegisterFile) -> Result<(), IndexError>;
    /// Rebuild the whole index from current remote-store contents. Returns
    /// the number of indexed entries.
    async fn sync(&self) -> Result<u64, IndexError>;
}

pub struct IndexClient {
    http: reqwest::Client,
    endpoint: String,
    register_timeout: Duration,
    sync_timeout: Duration,
}

impl IndexClient {
    pub fn new(api_base_url: &str, config: &IndexConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("wordbank/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}{}", api_base_url.trim_end_matches('/'), ENDPOINT_PATH),
            register_timeout: config.register_timeout,
            sync_timeout: config.sync_timeout,
        })
    }

    /// Failures are reported once and left for manual re-trigger; there
    /// are no automatic retries.
    async fn post(
        &self,
        request: &IndexRequest<'_>,
        timeout: Duration,
    ) -> Result<IndexResponse, IndexError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(timeout)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(IndexError::Http { status, body });
        }
        let parsed: IndexResponse = serde_json::from_str(&body)
            .map_err(|_| IndexError::MalformedResponse { body: body.clone() })?;
        if !parsed.success {
            return Err(IndexError::Rejected(
                parsed
                    .error
                    .unwrap_or_else(|| "no error detail given".to_owned()),
            ));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl IndexApi for IndexClient {
    #[instrument(skip(self), fields(path = %file.path))]
    async fn register(&self, file: &RegisterFile) -> Result<(), IndexError> {
        self.post(&IndexRequest::Add { file }, self.register_timeout)
            .await?;
        debug!("registered file with index service");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sync(&self) -> Result<u64, IndexError> {
        let response = self.post(&IndexRequest::Sync, self.sync_timeout).await?;
        Ok(response.count.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn add_request_serialized_to_wire_shape() {
        let file = RegisterFile {
            path: "sermons/2024/easter.mp4".to_owned(),
            name: "easter.mp4".to_owned(),
            size: 123_456_789,
            category: "sermons".to_owned(),
            hls: Some("sermons/2024/hls/easter/index.m3u8".to_owned()),
        };
        let value = assert_ok!(serde_json::to_value(IndexRequest::Add { file: &file }));
        assert_eq!(
            value,
            json!({
                "action": "add",
                "file": {
                    "path": "sermons/2024/easter.mp4",
                    "name": "easter.mp4",
                    "size": 123_456_789,
                    "category": "sermons",
                    "hls": "sermons/2024/hls/easter/index.m3u8",
                }
            })
        );
    }

    #[test]
    fn hls_field_omitted_when_absent() {
        let file = RegisterFile {
            path: "sermons/plain.mp4".to_owned(),
            name: "plain.mp4".to_owned(),
            size: 1,
            category: "sermons".to_owned(),
            hls: None,
        };
        let value = assert_ok!(serde_json::to_value(IndexRequest::Add { file: &file }));
        assert!(value["file"].get("hls").is_none());
    }

    #[test]
    fn sync_request_serialized_to_wire_shape() {
        let value = assert_ok!(serde_json::to_value(IndexRequest::Sync));
        assert_eq!(value, json!({ "action": "sync" }));
    }

    #[test]
    fn response_shapes_parsed_correctly() {
        let ok: IndexResponse =
            assert_ok!(serde_json::from_str(r#"{"success": true, "count": 42}"#));
        assert!(ok.success);
        assert_eq!(ok.count, Some(42));

        let failed: IndexResponse =
            assert_ok!(serde_json::from_str(r#"{"success": false, "error": "KV not available"}"#));
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("KV not available"));
    }
}
