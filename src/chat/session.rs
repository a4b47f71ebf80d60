//! Streaming chat session against the gateway's OpenAI-compatible API.
//!
//! A session owns one conversation history, seeded with the configured
//! system prompt. `send` appends the user turn and posts the full history,
//! then either streams fragments through a callback as they arrive or waits
//! for the complete reply; the assistant turn is committed to history only
//! when the exchange finishes. At most one exchange is in flight per session;
//! cancellation is cooperative through a token checked before every read
//! and every emitted fragment.

use tokio_util::sync::CancellationToken;

use futures_util::StreamExt;
use tracing::debug;

use crate::chat::sse::{DONE_SENTINEL, SseParser};
use crate::chat::wire::{self, ChatMessage};
use crate::config::{ChatConfig, Config};
use crate::error::{GatewayError, Result};

/// One chat conversation against the gateway.
pub struct ChatSession {
    client: reqwest::Client,
    base_url: String,
    config: ChatConfig,
    history: Vec<ChatMessage>,
    inflight: Option<CancellationToken>,
}

impl ChatSession {
    /// Create a session from configuration. History starts as the single
    /// configured system message.
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.chat.connect_timeout())
            .build()
            .unwrap_or_default();
        let chat = config.chat.clone();
        let history = vec![ChatMessage::system(&chat.system_prompt)];
        Self {
            client,
            base_url: config.gateway.effective_base_url(),
            config: chat,
            history,
            inflight: None,
        }
    }

    /// The conversation so far, system message first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send one user message and return the full assistant reply.
    ///
    /// The user turn is appended to history immediately; the assistant turn
    /// is appended only when the exchange completes. In streaming mode each
    /// fragment reaches `on_fragment` as it arrives; in non-streaming mode
    /// the reply comes back only as the return value.
    ///
    /// `cancel` aborts the exchange: the call returns
    /// [`GatewayError::Cancelled`] with no further fragments emitted and no
    /// assistant turn committed. A previous exchange still marked in flight
    /// is cancelled before this one starts.
    ///
    /// # Errors
    ///
    /// `StreamHttp` for a non-success response status, `RequestTimeout`
    /// when the configured deadline passes, `ChatTransport` for other
    /// network failures, `Cancelled` on cancellation. History keeps the
    /// user turn in every error case.
    pub async fn send<F>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut on_fragment: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        if let Some(prev) = self.inflight.take() {
            prev.cancel();
        }
        let token = cancel.child_token();
        self.inflight = Some(token.clone());

        self.history.push(ChatMessage::user(text));
        debug!(
            model = %self.config.model,
            stream = self.config.stream,
            turns = self.history.len(),
            "sending chat request"
        );

        let result = if self.config.stream {
            self.stream_exchange(&token, &mut on_fragment).await
        } else {
            self.oneshot_exchange(&token).await
        };
        self.inflight = None;

        let full = result?;
        self.history.push(ChatMessage::assistant(&full));
        Ok(full)
    }

    /// Abort the in-flight exchange, if any. Cancelling an idle session
    /// does nothing.
    pub fn cancel(&mut self) {
        if let Some(token) = self.inflight.take() {
            token.cancel();
        }
    }

    /// Reset history to the single system message, re-read from the
    /// session's configuration.
    pub fn clear(&mut self) {
        self.history.clear();
        self.history.push(ChatMessage::system(&self.config.system_prompt));
    }

    /// List model ids advertised by the gateway.
    ///
    /// # Errors
    ///
    /// `StreamHttp` for a non-success status, `RequestTimeout` or
    /// `ChatTransport` for network failures.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/v1/models");
        let resp = self
            .authorized(self.client.get(&url))
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(map_request_error)?;
        if !resp.status().is_success() {
            return Err(GatewayError::StreamHttp(resp.status().as_u16()));
        }
        let value: serde_json::Value = resp.json().await.map_err(map_request_error)?;
        Ok(wire::model_ids(&value))
    }

    async fn stream_exchange<F>(
        &self,
        token: &CancellationToken,
        on_fragment: &mut F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let url = self.endpoint("/v1/chat/completions");
        let request = self
            .authorized(self.client.post(&url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(self.config.request_timeout())
            .json(&self.request_body(true));

        let resp = tokio::select! {
            biased;
            () = token.cancelled() => return Err(GatewayError::Cancelled),
            resp = request.send() => resp.map_err(map_request_error)?,
        };
        if !resp.status().is_success() {
            return Err(GatewayError::StreamHttp(resp.status().as_u16()));
        }

        let mut parser = SseParser::new();
        let mut accumulated = String::new();
        let mut stream = resp.bytes_stream();

        'read: loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return Err(GatewayError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(map_request_error)?;

            for data in parser.feed(&chunk) {
                if token.is_cancelled() {
                    return Err(GatewayError::Cancelled);
                }
                if data == DONE_SENTINEL {
                    break 'read;
                }
                if let Some(fragment) = wire::stream_fragment(&data) {
                    on_fragment(&fragment);
                    accumulated.push_str(&fragment);
                }
            }
        }

        if let Some(data) = parser.finish()
            && data != DONE_SENTINEL
            && !token.is_cancelled()
            && let Some(fragment) = wire::stream_fragment(&data)
        {
            on_fragment(&fragment);
            accumulated.push_str(&fragment);
        }

        Ok(accumulated)
    }

    async fn oneshot_exchange(&self, token: &CancellationToken) -> Result<String> {
        let url = self.endpoint("/v1/chat/completions");
        let request = self
            .authorized(self.client.post(&url))
            .timeout(self.config.request_timeout())
            .json(&self.request_body(false));

        let resp = tokio::select! {
            biased;
            () = token.cancelled() => return Err(GatewayError::Cancelled),
            resp = request.send() => resp.map_err(map_request_error)?,
        };
        if !resp.status().is_success() {
            return Err(GatewayError::StreamHttp(resp.status().as_u16()));
        }

        let body = tokio::select! {
            biased;
            () = token.cancelled() => return Err(GatewayError::Cancelled),
            body = resp.text() => body.map_err(map_request_error)?,
        };
        Ok(wire::completion_text(&body))
    }

    fn request_body(&self, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": self.history,
            "stream": stream,
        })
    }

    /// Attach bearer auth when an API key is configured.
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_key)
        }
    }

    /// Join the base URL with an API path, tolerating a base that already
    /// ends in `/v1`.
    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{base}{path}")
    }
}

/// Map a reqwest failure on the chat path to the session taxonomy.
fn map_request_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::RequestTimeout(err.to_string())
    } else {
        GatewayError::ChatTransport(err.to_string())
    }
}
