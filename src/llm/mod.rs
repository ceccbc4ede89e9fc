//! Remote chat model clients.
//!
//! A model turns the message history into a [`FragmentStream`]: a finite,
//! non-restartable sequence of text fragments that ends either cleanly or
//! with one [`TransportError`].

pub mod openai;

use crate::config::Settings;
use crate::conversation::Message;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use thiserror::Error;

/// Failures talking to the remote model.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no API key configured (set DEEPSEEK_API_KEY or add it in Settings)")]
    MissingApiKey,
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("API request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("response stream interrupted: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
}

/// A chat model that streams its replies.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the full history and start streaming the reply.
    async fn stream_chat(&self, messages: &[Message]) -> Result<FragmentStream, TransportError>;

    /// Model name, for logs.
    fn model(&self) -> &str;
}

/// Incremental reply text from a model.
///
/// Yields `Ok(fragment)` items until the reply is complete. A failure is
/// delivered once as `Err` and ends the stream; after the end every call
/// returns `None`.
pub struct FragmentStream {
    inner: BoxStream<'static, Result<String, TransportError>>,
    finished: bool,
}

impl FragmentStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<String, TransportError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            finished: false,
        }
    }

    pub async fn next_fragment(&mut self) -> Option<Result<String, TransportError>> {
        if self.finished {
            return None;
        }
        match self.inner.next().await {
            Some(Ok(fragment)) => Some(Ok(fragment)),
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Create the model client for the current settings.
pub fn create_model(settings: &Settings) -> Result<Box<dyn ChatModel>, TransportError> {
    Ok(Box::new(openai::OpenAICompatibleBackend::new(
        openai::BackendOptions::from(settings),
    )?))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_is_fused_after_error() {
        let mut stream = FragmentStream::new(futures::stream::iter(vec![
            Ok("Hel".to_string()),
            Err(TransportError::Api("connection reset".to_string())),
            Ok("lo".to_string()),
        ]));

        assert_eq!(stream.next_fragment().await.unwrap().unwrap(), "Hel");
        assert!(stream.next_fragment().await.unwrap().is_err());
        assert!(stream.next_fragment().await.is_none());
        assert!(stream.next_fragment().await.is_none());
    }

    #[test]
    fn test_create_model_uses_settings() {
        let settings = Settings {
            model: "deepseek-chat".to_string(),
            ..Settings::default()
        };
        let model = create_model(&settings).unwrap();
        assert_eq!(model.model(), "deepseek-chat");
    }
}
