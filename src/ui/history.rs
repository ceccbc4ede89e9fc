//! History browser.

use super::console::{Console, Tone};
use crate::conversation::{Conversation, Role};
use crate::history::{HistoryEntry, HistoryStore};
use crate::locale::Locale;
use chrono::{DateTime, Local, Utc};
use std::io::{self, BufRead, Write};
use tracing::warn;

fn local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// List saved conversations and show the one the user picks.
pub fn run<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    history: &HistoryStore,
    locale: &Locale,
) -> io::Result<()> {
    loop {
        let entries = match history.list_all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{}", e);
                console.say(Tone::Error, &e.to_string())?;
                return Ok(());
            }
        };

        console.blank()?;
        console.say(Tone::Title, locale.text("history.title"))?;
        console.rule(Tone::Title, '=', 40)?;
        if entries.is_empty() {
            console.say(Tone::Notice, locale.text("history.empty"))?;
            return Ok(());
        }
        for (i, entry) in entries.iter().enumerate() {
            console.line(&list_line(i + 1, entry, locale))?;
        }
        console.blank()?;

        let Some(choice) = console.prompt(locale.text("history.view_prompt"))? else {
            return Ok(());
        };
        if choice.eq_ignore_ascii_case("b") {
            return Ok(());
        }

        match choice.parse::<usize>() {
            Ok(n) if (1..=entries.len()).contains(&n) => {
                let entry = &entries[n - 1];
                match history.load(&entry.path) {
                    Ok(conversation) => show(console, &conversation, locale)?,
                    Err(e) => {
                        warn!("{}", e);
                        let message =
                            format!("{} ({})", locale.text("history.unreadable"), e);
                        console.say(Tone::Error, &message)?;
                    }
                }
            }
            Ok(_) => console.say(Tone::Error, locale.text("history.invalid_selection"))?,
            Err(_) => console.say(Tone::Error, locale.text("history.enter_valid"))?,
        }
    }
}

fn list_line(number: usize, entry: &HistoryEntry, locale: &Locale) -> String {
    match &entry.header {
        Ok(header) => format!("{}. [{}] {}", number, local(header.created_at), header.title),
        Err(_) => format!(
            "{}. {} ({})",
            number,
            entry.file_name(),
            locale.text("history.unreadable")
        ),
    }
}

/// Print a whole conversation.
pub fn show<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    conversation: &Conversation,
    locale: &Locale,
) -> io::Result<()> {
    console.blank()?;
    console.say(Tone::Title, conversation.title())?;
    console.say(
        Tone::Info,
        &format!(
            "{}: {}",
            locale.text("history.created"),
            local(conversation.created_at())
        ),
    )?;
    console.say(
        Tone::Info,
        &format!(
            "{}: {}",
            locale.text("history.updated"),
            local(conversation.updated_at())
        ),
    )?;
    console.rule(Tone::Info, '-', 40)?;

    for message in conversation.messages() {
        let (tone, label) = match message.role {
            Role::User => (Tone::User, locale.text("chat.you")),
            Role::Assistant => (Tone::Assistant, locale.text("chat.ai")),
        };
        let stamp = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
        console.say(tone, &format!("[{}] {}:", stamp, label))?;
        console.line(&message.content)?;
        console.blank()?;
    }
    console.rule(Tone::Info, '-', 40)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::locale::{Language, LocaleSource};
    use crate::ui::console::testing::{scripted, transcript};

    fn english() -> Locale {
        Locale::load(&LocaleSource::Embedded, Language::En).unwrap()
    }

    fn saved(store: &HistoryStore, title: &str) {
        let mut conv = Conversation::new();
        conv.set_title(title);
        conv.push(Message::user("What is Rust?"));
        conv.push(Message::assistant("A systems programming language."));
        store.save(&conv).unwrap();
    }

    #[test]
    fn test_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let mut console = scripted("");

        run(&mut console, &store, &english()).unwrap();
        assert!(transcript(&console).contains("No saved conversations yet."));
    }

    #[test]
    fn test_view_conversation_then_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        saved(&store, "Rust questions");
        let mut console = scripted("1\nb\n");

        run(&mut console, &store, &english()).unwrap();

        let out = transcript(&console);
        assert!(out.contains("] Rust questions"));
        assert!(out.contains("You:\nWhat is Rust?"));
        assert!(out.contains("DeepSeek AI:\nA systems programming language."));
        assert_eq!(out.matches("Chat History").count(), 2);
    }

    #[test]
    fn test_invalid_selections() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        saved(&store, "Only one");
        let mut console = scripted("7\nabc\nB\n");

        run(&mut console, &store, &english()).unwrap();

        let out = transcript(&console);
        assert!(out.contains("Invalid selection."));
        assert!(out.contains("Please enter a valid number or 'b'."));
    }

    #[test]
    fn test_unreadable_file_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        std::fs::write(dir.path().join("00000000-junk.md"), "not a conversation\n").unwrap();
        saved(&store, "Good one");
        let mut console = scripted("1\nb\n");

        run(&mut console, &store, &english()).unwrap();

        let out = transcript(&console);
        assert!(out.contains("1. 00000000-junk.md (unreadable file)"));
        assert!(out.contains("] Good one"));
        assert!(out.contains("unreadable file (malformed history file"));
    }
}
