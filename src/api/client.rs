//! HTTP client for the answering service.

use crate::api::decoder::{StreamEventStream, decode_stream};
use crate::config::ApiConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::{StreamEvent, StreamFailure};
use crate::session::SessionId;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

/// Answers questions, either in one piece or as a stream of deltas.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Ask a question and wait for the complete answer.
    ///
    /// `Ok(None)` means the service answered with no text.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::TransportFailure`] on network failure or a
    /// non-success response.
    async fn query(&self, query: &str, session: &SessionId) -> Result<Option<String>>;

    /// Ask a question and receive the answer as it is produced.
    ///
    /// Failures are delivered in-band as a single [`StreamEvent::Error`].
    async fn query_stream(&self, query: &str, session: &SessionId) -> StreamEventStream;
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    session_id: &'a str,
    show_timing: bool,
}

/// [`QueryBackend`] over HTTP.
pub struct QueryClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.config.token.is_some())
            .finish()
    }
}

impl QueryClient {
    /// Create a client for the configured service.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AssistantError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn post(&self, path: &str, query: &str, session: &SessionId) -> reqwest::RequestBuilder {
        let url = self.config.endpoint(path);
        debug!("POST {url}");
        let mut request = self.client.post(url).json(&QueryRequest {
            query,
            session_id: session.as_str(),
            show_timing: false,
        });
        if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }
        request
    }
}

/// Pick the answer out of a batch response: `text`, or `full_response` when
/// `text` is missing or empty.
fn extract_answer(body: &serde_json::Value) -> Option<String> {
    ["text", "full_response"]
        .iter()
        .filter_map(|field| body.get(field).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

fn single_error(failure: StreamFailure) -> StreamEventStream {
    Box::pin(futures_util::stream::iter([StreamEvent::Error(failure)]))
}

#[async_trait]
impl QueryBackend for QueryClient {
    async fn query(&self, query: &str, session: &SessionId) -> Result<Option<String>> {
        let response = self
            .post(&self.config.query_path, query, session)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("query failed with HTTP {}: {}", status.as_u16(), body.trim());
            return Err(AssistantError::TransportFailure(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(extract_answer(&body))
    }

    async fn query_stream(&self, query: &str, session: &SessionId) -> StreamEventStream {
        let response = match self
            .post(&self.config.stream_path, query, session)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("stream request failed: {e}");
                return single_error(StreamFailure::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("stream request failed with HTTP {}", status.as_u16());
            return single_error(StreamFailure::Transport(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        decode_stream(response.bytes_stream())
    }
}
