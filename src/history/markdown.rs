//! Markdown conversation documents.
//!
//! Grammar:
//!
//! ```text
//! document := header separator section*
//! header   := "# " title field{3}          (fields in any order)
//! field    := "**Created:** " ts | "**Last Updated:** " ts | "**Conversation ID:** " id
//! section  := "### " role " (" ts ")" body separator
//! ```
//!
//! Blank lines between productions are ignored. A body runs until a
//! separator line that is followed by another section header or by the end
//! of the document, so bodies may themselves contain `---` lines. Body lines
//! that would read as a section header are written with an extra leading
//! backslash, which markdown renders as a literal `#`.

use crate::conversation::{Conversation, Message, Role};
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fmt::Write;
use thiserror::Error;

pub const USER_LABEL: &str = "You";
pub const ASSISTANT_LABEL: &str = "DeepSeek AI";

const SEPARATOR: &str = "---";
const CREATED: &str = "**Created:**";
const UPDATED: &str = "**Last Updated:**";
const CONVERSATION_ID: &str = "**Conversation ID:**";

/// A document that does not follow the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

/// Header fields of a conversation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub id: String,
}

/// Render a conversation as a markdown document.
pub fn render(conversation: &Conversation) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write!(
        out,
        "# {}\n\n{} {}\n{} {}\n{} {}\n\n{}\n\n",
        conversation.title(),
        CREATED,
        format_timestamp(conversation.created_at()),
        UPDATED,
        format_timestamp(conversation.updated_at()),
        CONVERSATION_ID,
        conversation.id(),
        SEPARATOR,
    );

    for message in conversation.messages() {
        let _ = write!(
            out,
            "### {} ({})\n\n{}\n\n{}\n\n",
            role_label(message.role),
            format_timestamp(message.timestamp),
            escape_body(&message.content),
            SEPARATOR,
        );
    }
    out
}

/// Parse a complete document.
pub fn parse(text: &str) -> Result<Conversation, ParseError> {
    Parser::new(text).document()
}

/// Parse only the header block. `text` may stop right after the first
/// separator.
pub fn parse_header(text: &str) -> Result<Header, ParseError> {
    Parser::new(text).header()
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
    }
}

fn role_from_label(label: &str) -> Option<Role> {
    match label {
        USER_LABEL => Some(Role::User),
        ASSISTANT_LABEL => Some(Role::Assistant),
        _ => None,
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// RFC 3339, or a naive ISO timestamp in local time as older files contain.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

fn is_separator(line: &str) -> bool {
    line.trim() == SEPARATOR
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Split `### <label> (<timestamp>)` into label and timestamp text.
fn split_section_header(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_end().strip_prefix("### ")?;
    let open = rest.rfind(" (")?;
    let timestamp = rest[open + 2..].strip_suffix(')')?;
    Some((&rest[..open], timestamp))
}

fn is_section_header(line: &str) -> bool {
    split_section_header(line).is_some_and(|(label, _)| role_from_label(label).is_some())
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            line: self.pos + 1,
            reason: reason.into(),
        }
    }

    fn skip_blank(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
    }

    fn document(&mut self) -> Result<Conversation, ParseError> {
        let header = self.header()?;

        let mut messages = Vec::new();
        loop {
            self.skip_blank();
            if self.peek().is_none() {
                break;
            }
            messages.push(self.section()?);
        }

        Ok(Conversation::restore(
            header.id,
            header.title,
            header.created_at,
            header.updated_at,
            messages,
        ))
    }

    fn header(&mut self) -> Result<Header, ParseError> {
        self.skip_blank();
        let title = self.title()?;

        let mut created_at = None;
        let mut updated_at = None;
        let mut id = None;

        loop {
            self.skip_blank();
            let Some(line) = self.peek() else {
                return Err(self.error("unexpected end of file in header"));
            };
            if is_separator(line) {
                self.pos += 1;
                break;
            }

            let line = line.trim();
            if let Some(value) = line.strip_prefix(CREATED) {
                let ts = self.timestamp(value)?;
                self.assign(&mut created_at, ts, CREATED)?;
            } else if let Some(value) = line.strip_prefix(UPDATED) {
                let ts = self.timestamp(value)?;
                self.assign(&mut updated_at, ts, UPDATED)?;
            } else if let Some(value) = line.strip_prefix(CONVERSATION_ID) {
                let value = value.trim();
                if value.is_empty() {
                    return Err(self.error("empty conversation id"));
                }
                self.assign(&mut id, value.to_string(), CONVERSATION_ID)?;
            } else if !line.starts_with("**") {
                return Err(self.error(format!("unexpected line in header: {line:?}")));
            }
            self.pos += 1;
        }

        let missing = |label: &str| self.error(format!("missing {label} field"));
        Ok(Header {
            title,
            created_at: created_at.ok_or_else(|| missing(CREATED))?,
            updated_at: updated_at.ok_or_else(|| missing(UPDATED))?,
            id: id.ok_or_else(|| missing(CONVERSATION_ID))?,
        })
    }

    fn title(&mut self) -> Result<String, ParseError> {
        let line = self
            .peek()
            .map(str::trim_end)
            .ok_or_else(|| self.error("empty document"))?;
        let title = if line == "#" {
            ""
        } else {
            line.strip_prefix("# ")
                .ok_or_else(|| self.error("missing title line"))?
        };
        self.pos += 1;
        Ok(title.trim().to_string())
    }

    fn timestamp(&self, text: &str) -> Result<DateTime<Utc>, ParseError> {
        parse_timestamp(text).ok_or_else(|| self.error(format!("invalid timestamp {:?}", text.trim())))
    }

    fn assign<T>(&self, slot: &mut Option<T>, value: T, label: &str) -> Result<(), ParseError> {
        if slot.is_some() {
            return Err(self.error(format!("duplicate {label} field")));
        }
        *slot = Some(value);
        Ok(())
    }

    fn section(&mut self) -> Result<Message, ParseError> {
        let line = self.peek().unwrap_or_default();
        let (label, timestamp) = split_section_header(line)
            .ok_or_else(|| self.error(format!("expected a message header, found {line:?}")))?;
        let role = role_from_label(label)
            .ok_or_else(|| self.error(format!("unknown role {label:?}")))?;
        let timestamp = self.timestamp(timestamp)?;
        self.pos += 1;

        let start = self.pos;
        let end = loop {
            match self.peek() {
                None => break self.pos,
                Some(line) if is_separator(line) && self.closes_section(self.pos + 1) => {
                    let end = self.pos;
                    self.pos += 1;
                    break end;
                }
                Some(_) => self.pos += 1,
            }
        };

        Ok(Message::at(role, body(&self.lines[start..end]), timestamp))
    }

    /// Whether the lines from `from` on are blank up to a section header or
    /// the end of the document.
    fn closes_section(&self, from: usize) -> bool {
        self.lines[from.min(self.lines.len())..]
            .iter()
            .find(|line| !is_blank(line))
            .map_or(true, |line| is_section_header(line))
    }
}

/// Whether a body line, ignoring escapes, reads as a section header.
fn needs_escape(line: &str) -> bool {
    is_section_header(line.trim_start_matches('\\'))
}

fn escape_body(content: &str) -> String {
    content
        .split('\n')
        .map(|line| {
            if needs_escape(line) {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn body(lines: &[&str]) -> String {
    let first = lines.iter().position(|l| !is_blank(l)).unwrap_or(lines.len());
    lines[first..]
        .iter()
        .map(|line| match line.strip_prefix('\\') {
            Some(rest) if needs_escape(line) => rest,
            _ => *line,
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}
