use super::{ChannelFault, ChannelOutcome, IndexChannel};
use crate::types::{ActionResult, PendingAction};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::env;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_API_VERSION: &str = "2023-11-01";

/// [`IndexChannel`] that posts batches to `{endpoint}/indexes/{index}/docs/index`.
///
/// Documents must serialize to JSON objects; the action kind is added to each as
/// the `@search.action` field.
pub struct HttpIndexChannel<T> {
    client: reqwest::Client,
    url: Url,
    api_key: Option<String>,
    _document: PhantomData<fn(&T)>,
}

impl<T> HttpIndexChannel<T> {
    /// Create a channel for `index_name` under `endpoint`.
    ///
    /// The API key defaults to `DOC_SENDER_API_KEY`; the request timeout to
    /// `DOC_SENDER_HTTP_TIMEOUT_SECS` (30s when unset).
    pub fn new(endpoint: &str, index_name: &str) -> Result<Self> {
        let base = Url::parse(endpoint).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid endpoint: {}", e),
                ErrorContext::new()
                    .with_field_path("endpoint")
                    .with_details(endpoint.to_string())
                    .with_source("http_index_channel"),
            )
        })?;
        let mut url = base
            .join(&format!("indexes/{}/docs/index", index_name))
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid index name: {}", e),
                    ErrorContext::new()
                        .with_field_path("index_name")
                        .with_source("http_index_channel"),
                )
            })?;
        url.query_pairs_mut()
            .append_pair("api-version", DEFAULT_API_VERSION);

        let timeout_secs = env::var("DOC_SENDER_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        Ok(Self {
            client,
            url,
            api_key: env::var("DOC_SENDER_API_KEY").ok(),
            _document: PhantomData,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn headers(&self) -> std::result::Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| TransportError::Other("api key is not a valid header value".into()))?;
            headers.insert("api-key", value);
        }
        Ok(headers)
    }
}

/// Status reported for a document the channel could not encode.
pub const UNENCODABLE_DOCUMENT_STATUS: u16 = 400;

impl<T: Serialize> HttpIndexChannel<T> {
    /// Wire body: `{"value": [{"@search.action": "...", ...document}]}`.
    ///
    /// Fails on the first document that does not encode; [`IndexChannel::send`]
    /// instead reports such documents individually.
    pub fn request_body(batch: &[PendingAction<T>]) -> Result<serde_json::Value> {
        let value = batch
            .iter()
            .map(encode_action)
            .collect::<Result<Vec<_>>>()?;
        Ok(serde_json::json!({ "value": value }))
    }

    /// Encode each action, splitting the batch into wire documents and terminal
    /// results for the actions that cannot be encoded.
    pub fn partition_batch(batch: &[PendingAction<T>]) -> (Vec<serde_json::Value>, Vec<ActionResult>) {
        let mut encoded = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();
        for action in batch {
            match encode_action(action) {
                Ok(doc) => encoded.push(doc),
                Err(e) => rejected.push(
                    ActionResult::new(action.key(), UNENCODABLE_DOCUMENT_STATUS)
                        .with_error_message(e.to_string()),
                ),
            }
        }
        (encoded, rejected)
    }
}

fn encode_action<T: Serialize>(action: &PendingAction<T>) -> Result<serde_json::Value> {
    let mut doc = match serde_json::to_value(action.document())? {
        serde_json::Value::Object(map) => map,
        other => {
            return Err(Error::runtime_with_context(
                "document must serialize to a JSON object",
                ErrorContext::new()
                    .with_field_path(action.key().to_string())
                    .with_details(format!("got {}", json_kind(&other)))
                    .with_source("http_index_channel"),
            ))
        }
    };
    doc.insert(
        "@search.action".to_string(),
        serde_json::Value::String(action.action_type().as_str().to_string()),
    );
    Ok(serde_json::Value::Object(doc))
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Debug, Deserialize)]
struct IndexDocumentsResponse {
    #[serde(default)]
    value: Vec<WireResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    key: String,
    #[serde(default)]
    error_message: Option<String>,
    status_code: u16,
}

/// Map an HTTP status and body to a channel outcome.
pub fn parse_response(status: u16, body: &str) -> ChannelOutcome {
    match status {
        413 => ChannelOutcome::Oversize,
        200 | 207 => match serde_json::from_str::<IndexDocumentsResponse>(body) {
            Ok(resp) => ChannelOutcome::Results(
                resp.value
                    .into_iter()
                    .map(|r| ActionResult {
                        key: r.key,
                        status_code: r.status_code,
                        error_message: r.error_message,
                    })
                    .collect(),
            ),
            Err(e) => ChannelOutcome::Fault(
                ChannelFault::new(format!("malformed index response: {}", e)).with_status(status),
            ),
        },
        _ => {
            let mut message = body.trim().to_string();
            if message.is_empty() {
                message = "unexpected batch status".to_string();
            }
            ChannelOutcome::Fault(ChannelFault::new(message).with_status(status))
        }
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync> IndexChannel<T> for HttpIndexChannel<T> {
    async fn send(&self, batch: &[PendingAction<T>]) -> ChannelOutcome {
        let (documents, rejected) = Self::partition_batch(batch);
        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "documents could not be encoded");
        }
        if documents.is_empty() {
            return ChannelOutcome::Results(rejected);
        }
        let headers = match self.headers() {
            Ok(h) => h,
            Err(e) => return ChannelOutcome::Fault(e.into()),
        };

        debug!(url = %self.url, actions = documents.len(), "posting index batch");

        let response = match self
            .client
            .post(self.url.clone())
            .headers(headers)
            .json(&serde_json::json!({ "value": documents }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ChannelOutcome::Fault(TransportError::Http(e).into()),
        };

        let status = response.status().as_u16();
        let outcome = match response.text().await {
            Ok(text) => parse_response(status, &text),
            Err(e) => ChannelOutcome::Fault(ChannelFault::from(TransportError::Http(e)).with_status(status)),
        };
        // Rejected documents resolve now; a fault or oversize re-encodes them on resend.
        match outcome {
            ChannelOutcome::Results(mut results) => {
                results.extend(rejected);
                ChannelOutcome::Results(results)
            }
            other => other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            TransportError::Other(_) => None,
        }
    }
}
