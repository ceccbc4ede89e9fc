//! Interactive chat session.
//!
//! Reads user lines, streams the model's reply to the terminal and commits
//! each finished turn to the conversation. A turn that fails part-way leaves
//! the conversation exactly as it was before the turn.

use super::console::{Console, Tone};
use crate::config::Settings;
use crate::conversation::{Conversation, Message};
use crate::history::HistoryStore;
use crate::llm::{ChatModel, TransportError};
use crate::locale::Locale;
use chrono::Local;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingInput,
    StreamingResponse,
    Ended,
}

/// What a line typed in the chat means.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Exit,
    Dashboard,
    Blank,
    Say(&'a str),
}

impl<'a> ChatCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => ChatCommand::Blank,
            "exit" | "quit" | "bye" => ChatCommand::Exit,
            "dashboard" => ChatCommand::Dashboard,
            _ => ChatCommand::Say(line),
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub struct SessionSummary {
    pub conversation: Conversation,
    pub saved_to: Option<PathBuf>,
}

pub struct ChatSession<'a> {
    model: &'a dyn ChatModel,
    settings: &'a Settings,
    locale: &'a Locale,
    history: &'a HistoryStore,
    conversation: Conversation,
    state: SessionState,
    saved_to: Option<PathBuf>,
}

enum TurnError {
    Transport(TransportError),
    Io(io::Error),
}

impl From<io::Error> for TurnError {
    fn from(e: io::Error) -> Self {
        TurnError::Io(e)
    }
}

impl<'a> ChatSession<'a> {
    pub fn new(
        model: &'a dyn ChatModel,
        settings: &'a Settings,
        locale: &'a Locale,
        history: &'a HistoryStore,
    ) -> Self {
        Self {
            model,
            settings,
            locale,
            history,
            conversation: Conversation::new(),
            state: SessionState::Idle,
            saved_to: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until the user leaves. Terminal I/O errors end the session early.
    pub async fn run<R: BufRead, W: Write>(
        mut self,
        console: &mut Console<R, W>,
    ) -> io::Result<SessionSummary> {
        info!(
            "Chat session {} started with model {}",
            self.conversation.id(),
            self.model.model()
        );
        console.blank()?;
        console.say(Tone::Title, self.locale.text("chat.started"))?;
        console.say(Tone::Notice, self.locale.text("chat.instructions"))?;
        console.blank()?;

        self.state = SessionState::AwaitingInput;
        while self.state == SessionState::AwaitingInput {
            let prompt = console.paint(Tone::User, &self.label("chat.you"));
            let Some(line) = console.prompt(&prompt)? else {
                self.state = SessionState::Ended;
                break;
            };

            match ChatCommand::parse(&line) {
                ChatCommand::Blank => {}
                ChatCommand::Exit | ChatCommand::Dashboard => self.state = SessionState::Ended,
                ChatCommand::Say(text) => self.take_turn(console, text).await?,
            }
        }

        self.finish(console)?;
        Ok(SessionSummary {
            conversation: self.conversation,
            saved_to: self.saved_to,
        })
    }

    /// Send one user message and stream the reply. Transport failures are
    /// reported and leave the conversation untouched.
    async fn take_turn<R: BufRead, W: Write>(
        &mut self,
        console: &mut Console<R, W>,
        text: &str,
    ) -> io::Result<()> {
        let user = Message::user(text);
        let mut request = self.conversation.messages().to_vec();
        request.push(user.clone());

        self.state = SessionState::StreamingResponse;
        let outcome = self.stream_reply(console, &request).await;
        self.state = SessionState::AwaitingInput;

        match outcome {
            Ok(reply) => {
                self.conversation.push(user);
                self.conversation.push(Message::assistant(reply));
                debug!(
                    "Turn committed; conversation has {} messages",
                    self.conversation.len()
                );
                if self.settings.save_history {
                    self.save(console, false)?;
                }
                Ok(())
            }
            Err(TurnError::Transport(e)) => {
                warn!("Chat turn failed: {}", e);
                console.blank()?;
                let message = format!("{} {}", self.locale.text("chat.error"), e);
                console.say(Tone::Error, &message)?;
                console.blank()?;
                Ok(())
            }
            Err(TurnError::Io(e)) => Err(e),
        }
    }

    async fn stream_reply<R: BufRead, W: Write>(
        &self,
        console: &mut Console<R, W>,
        request: &[Message],
    ) -> Result<String, TurnError> {
        let mut stream = self
            .model
            .stream_chat(request)
            .await
            .map_err(TurnError::Transport)?;

        console.blank()?;
        let label = console.paint(Tone::Assistant, &self.label("chat.ai"));
        console.write(&format!("{} ", label))?;

        let mut reply = String::new();
        while let Some(fragment) = stream.next_fragment().await {
            let fragment = fragment.map_err(TurnError::Transport)?;
            let painted = console.paint(Tone::Assistant, &fragment);
            console.write(&painted)?;
            reply.push_str(&fragment);
        }
        console.blank()?;
        console.blank()?;

        Ok(reply.trim().to_string())
    }

    fn finish<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> io::Result<()> {
        if self.settings.save_history && !self.conversation.is_empty() {
            self.save(console, true)?;
        }
        info!(
            "Chat session {} ended with {} messages",
            self.conversation.id(),
            self.conversation.len()
        );
        Ok(())
    }

    fn save<R: BufRead, W: Write>(
        &mut self,
        console: &mut Console<R, W>,
        announce: bool,
    ) -> io::Result<()> {
        match self.history.save(&self.conversation) {
            Ok(path) => {
                if announce {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let message = format!("{} {}", self.locale.text("chat.saved"), name);
                    console.blank()?;
                    console.say(Tone::Success, &message)?;
                }
                self.saved_to = Some(path);
            }
            Err(e) => {
                warn!("{}", e);
                let message = format!("{} {}", self.locale.text("chat.save_failed"), e);
                console.say(Tone::Error, &message)?;
            }
        }
        Ok(())
    }

    /// `You:` / `DeepSeek AI:`, with the time of day when enabled.
    fn label(&self, key: &str) -> String {
        let name = self.locale.text(key);
        if self.settings.show_timestamps {
            format!("[{}] {}:", Local::now().format("%H:%M:%S"), name)
        } else {
            format!("{}:", name)
        }
    }
}
