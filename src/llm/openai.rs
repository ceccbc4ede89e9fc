//! OpenAI-compatible backend implementation.
//!
//! Streams replies from any `/chat/completions` endpoint that speaks the
//! OpenAI server-sent-events format (DeepSeek, Baseten, OpenAI itself).

use super::{ChatModel, FragmentStream, TransportError};
use crate::config::Settings;
use crate::conversation::Message;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Connection and sampling parameters taken from the settings.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl From<&Settings> for BackendOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Streaming client for an OpenAI-compatible chat API.
pub struct OpenAICompatibleBackend {
    options: BackendOptions,
    client: Client,
}

impl OpenAICompatibleBackend {
    /// Create a new backend.
    pub fn new(options: BackendOptions) -> Result<Self, TransportError> {
        // No overall timeout: replies stream for as long as the model writes.
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { options, client })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.options.base_url.trim_end_matches('/')
        )
    }

    fn request<'a>(&'a self, messages: &'a [Message]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.options.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_wire(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            stream: true,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAICompatibleBackend {
    async fn stream_chat(&self, messages: &[Message]) -> Result<FragmentStream, TransportError> {
        if self.options.api_key.trim().is_empty() {
            return Err(TransportError::MissingApiKey);
        }

        let url = self.completions_url();
        debug!(
            "Sending {} messages to {} ({})",
            messages.len(),
            url,
            self.options.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.options.api_key))
            .header("Accept", "text/event-stream")
            .json(&self.request(messages))
            .send()
            .await
            .map_err(|source| TransportError::Connect {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| {
                    if body.trim().is_empty() {
                        "Unknown error".to_string()
                    } else {
                        body.trim().to_string()
                    }
                });
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(fragments(body))
    }

    fn model(&self) -> &str {
        &self.options.model
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    done: bool,
}

/// Turn a raw SSE byte stream into reply fragments.
fn fragments(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> FragmentStream {
    let state = StreamState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    FragmentStream::new(stream::unfold(state, |mut state| async move {
        loop {
            match state.pending.pop_front() {
                Some(SseEvent::Fragment(text)) => return Some((Ok(text), state)),
                Some(SseEvent::Done) => return None,
                Some(SseEvent::Error(message)) => {
                    state.pending.clear();
                    state.done = true;
                    return Some((Err(TransportError::Api(message)), state));
                }
                None if state.done => return None,
                None => {}
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(&bytes);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(TransportError::Stream(e)), state));
                }
                None => {
                    state.done = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    }))
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
    Error(String),
}

/// Incremental decoder for `data: {json}` event lines.
///
/// Bytes are buffered until a full line arrives so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = decode_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the body ends.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn decode_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();

    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    if let Ok(error) = serde_json::from_str::<ApiErrorBody>(data) {
        return Some(SseEvent::Error(error.error.message));
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseEvent::Fragment),
        Err(e) => {
            warn!("Skipping unparseable stream chunk: {}", e);
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
    top_p: f64,
    presence_penalty: f64,
    frequency_penalty: f64,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    fn options() -> BackendOptions {
        BackendOptions::from(&Settings {
            api_key: "sk-test".to_string(),
            base_url: "https://api.example.com/v1/".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.5,
            max_tokens: 256,
            ..Settings::default()
        })
    }

    #[test]
    fn test_decode_fragments_and_done() {
        let mut decoder = SseDecoder::default();
        let input = format!("{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));

        let events = decoder.push(input.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Fragment("Hel".to_string()),
                SseEvent::Fragment("lo".to_string()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_decode_across_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        let input = chunk("héllo wörld");
        let bytes = input.as_bytes();
        // Split inside the multi-byte 'é'.
        let split = input.find('é').unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(
            decoder.push(&bytes[split..]),
            vec![SseEvent::Fragment("héllo wörld".to_string())]
        );
    }

    #[test]
    fn test_decode_skips_noise() {
        let mut decoder = SseDecoder::default();
        let input = concat!(
            ": keep-alive\n",
            "event: message\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: {\"choices\":[],\"usage\":{\"total_tokens\":3}}\n",
            "data: not json\n",
            "\r\n",
        );
        assert!(decoder.push(input.as_bytes()).is_empty());
    }

    #[test]
    fn test_decode_error_event() {
        let mut decoder = SseDecoder::default();
        let events =
            decoder.push(b"data: {\"error\":{\"message\":\"rate limited\",\"type\":\"x\"}}\n");
        assert_eq!(events, vec![SseEvent::Error("rate limited".to_string())]);
    }

    #[test]
    fn test_finish_flushes_last_line() {
        let mut decoder = SseDecoder::default();
        let input = chunk("tail");
        let trimmed = input.trim_end();
        assert!(decoder.push(trimmed.as_bytes()).is_empty());
        assert_eq!(
            decoder.finish(),
            vec![SseEvent::Fragment("tail".to_string())]
        );
        assert!(decoder.finish().is_empty());
    }

    #[tokio::test]
    async fn test_fragments_stop_at_done() {
        let body = stream::iter(vec![
            Ok(chunk("Hi").into_bytes()),
            Ok(format!("{}data: [DONE]\n\n{}", chunk(" there"), chunk("ignored")).into_bytes()),
        ])
        .boxed();

        let mut fragments = fragments(body);
        assert_eq!(fragments.next_fragment().await.unwrap().unwrap(), "Hi");
        assert_eq!(fragments.next_fragment().await.unwrap().unwrap(), " there");
        assert!(fragments.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_fragments_end_on_error_event() {
        let body = stream::iter(vec![Ok(format!(
            "{}data: {{\"error\":{{\"message\":\"overloaded\"}}}}\n{}",
            chunk("partial"),
            chunk("never")
        )
        .into_bytes())])
        .boxed();

        let mut fragments = fragments(body);
        assert_eq!(fragments.next_fragment().await.unwrap().unwrap(), "partial");
        assert!(matches!(
            fragments.next_fragment().await,
            Some(Err(TransportError::Api(ref m))) if m == "overloaded"
        ));
        assert!(fragments.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_fragments_without_done_end_at_eof() {
        let body = stream::iter(vec![Ok(chunk("only").into_bytes())]).boxed();
        let mut fragments = fragments(body);
        assert_eq!(fragments.next_fragment().await.unwrap().unwrap(), "only");
        assert!(fragments.next_fragment().await.is_none());
    }

    #[test]
    fn test_request_serialization() {
        let backend = OpenAICompatibleBackend::new(options()).unwrap();
        let messages = vec![Message::user("hello"), Message::assistant("hi")];

        let json = serde_json::to_value(backend.request(&messages)).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_completions_url() {
        let backend = OpenAICompatibleBackend::new(options()).unwrap();
        assert_eq!(
            backend.completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let backend = OpenAICompatibleBackend::new(BackendOptions {
            api_key: String::new(),
            ..options()
        })
        .unwrap();
        let result = backend.stream_chat(&[Message::user("hi")]).await;
        assert!(matches!(result, Err(TransportError::MissingApiKey)));
    }
}
