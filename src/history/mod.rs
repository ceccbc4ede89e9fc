//! Conversation history on disk.
//!
//! One markdown document per conversation, named
//! `<created %Y%m%d-%H%M%S UTC>-<short id>.md` so that file names sort by
//! creation time. Writes go through a temp file and a rename.

pub mod markdown;

use crate::config::write_atomic;
use crate::conversation::{short_id, Conversation};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub use markdown::{Header, ParseError};

/// Errors from saving, loading or listing conversations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed history file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

impl HistoryError {
    fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        HistoryError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A history file as shown in the history list.
#[derive(Debug)]
pub struct HistoryEntry {
    pub path: PathBuf,
    /// Header fields, or why the file could not be read.
    pub header: Result<Header, HistoryError>,
}

impl HistoryEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Directory of saved conversations.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the conversation is saved to. Stable for a conversation's lifetime.
    pub fn path_for(&self, conversation: &Conversation) -> PathBuf {
        let stamp = conversation.created_at().format("%Y%m%d-%H%M%S");
        let id: String = short_id(conversation.id())
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        self.dir.join(format!("{}-{}.md", stamp, id))
    }

    /// Write the conversation, replacing any earlier save of it.
    pub fn save(&self, conversation: &Conversation) -> Result<PathBuf, HistoryError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| HistoryError::io("create history directory", &self.dir, e))?;

        let path = self.path_for(conversation);
        let document = markdown::render(conversation);
        write_atomic(&path, document.as_bytes())
            .map_err(|e| HistoryError::io("write", &path, e))?;

        debug!(
            "Saved conversation {} ({} messages) to {}",
            conversation.id(),
            conversation.len(),
            path.display()
        );
        Ok(path)
    }

    /// Read a conversation back. Malformed files are rejected whole.
    pub fn load(&self, path: &Path) -> Result<Conversation, HistoryError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| HistoryError::io("read", path, e))?;
        markdown::parse(&text).map_err(|source| HistoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// All `*.md` files in the history directory, sorted by file name, with
    /// only their headers parsed.
    pub fn list_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HistoryError::io("list", &self.dir, e)),
        };

        let mut paths = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| HistoryError::io("list", &self.dir, e))?;
            let path = entry.path();
            let hidden = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            if !hidden && path.extension().is_some_and(|ext| ext == "md") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(paths
            .into_iter()
            .map(|path| {
                let header = read_header(&path);
                HistoryEntry { path, header }
            })
            .collect())
    }
}

/// Read lines up to and including the header separator and parse them.
fn read_header(path: &Path) -> Result<Header, HistoryError> {
    let file = File::open(path).map_err(|e| HistoryError::io("open", path, e))?;

    let mut head = String::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| HistoryError::io("read", path, e))?;
        let done = line.trim() == "---";
        head.push_str(&line);
        head.push('\n');
        if done {
            break;
        }
    }

    markdown::parse_header(&head).map_err(|source| HistoryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Message, Role};

    fn conversation() -> Conversation {
        let mut conv = Conversation::new();
        conv.set_title("Test Conversation");
        conv.push(Message::user("Hello, this is a test message"));
        conv.push(Message::assistant("Hello! I'm responding to your test message."));
        conv.push(Message::user("Can you tell me about DeepSeek?"));
        conv.push(Message::assistant("DeepSeek is an AI model..."));
        conv
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("a").join("chat_history"));

        let path = store.save(&conversation()).unwrap();
        assert!(path.exists());
        assert!(path.starts_with(store.dir()));
        assert_eq!(path.extension().unwrap(), "md");
    }

    #[test]
    fn test_save_into_unwritable_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("chat_history");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = HistoryStore::new(&blocker);

        let err = store.save(&conversation()).unwrap_err();
        assert!(matches!(err, HistoryError::Io { .. }), "{err}");
        assert_eq!(std::fs::read_to_string(&blocker).unwrap(), "not a directory");
    }

    #[test]
    fn test_file_name_embeds_creation_time() {
        let store = HistoryStore::new("/tmp/history");
        let conv = conversation();
        let name = store.path_for(&conv).file_name().unwrap().to_string_lossy().into_owned();

        let expected = format!(
            "{}-{}.md",
            conv.created_at().format("%Y%m%d-%H%M%S"),
            &conv.id()[..8]
        );
        assert_eq!(name, expected);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let conv = conversation();

        let loaded = store.load(&store.save(&conv).unwrap()).unwrap();
        assert_eq!(loaded.id(), conv.id());
        assert_eq!(loaded.title(), "Test Conversation");
        assert_eq!(loaded.messages(), conv.messages());
    }

    #[test]
    fn test_save_then_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let conv = Conversation::new();

        let loaded = store.load(&store.save(&conv).unwrap()).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.id(), conv.id());
    }

    #[test]
    fn test_repeated_saves_overwrite_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let mut conv = conversation();

        let first = store.save(&conv).unwrap();
        conv.push(Message::user("one more"));
        let second = store.save(&conv).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.load(&second).unwrap().len(), 5);
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_list_all_sorted_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        let mut second = Conversation::new();
        second.set_title("Second");
        let mut first = Conversation::new();
        first.set_title("First");
        std::fs::write(dir.path().join("20230102-bbbb.md"), markdown::render(&second)).unwrap();
        std::fs::write(dir.path().join("20230101-aaaa.md"), markdown::render(&first)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let entries = store.list_all().unwrap();
        let names: Vec<_> = entries.iter().map(HistoryEntry::file_name).collect();
        assert_eq!(names, vec!["20230101-aaaa.md", "20230102-bbbb.md"]);
        assert_eq!(entries[0].header.as_ref().unwrap().title, "First");
        assert_eq!(entries[1].header.as_ref().unwrap().title, "Second");
    }

    #[test]
    fn test_list_all_reports_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        std::fs::write(dir.path().join("20230101-bad.md"), "just some notes\n").unwrap();
        store.save(&conversation()).unwrap();

        let entries = store.list_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].header, Err(HistoryError::Parse { .. })));
        assert!(entries[1].header.is_ok());
    }

    #[test]
    fn test_list_all_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nope"));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let path = dir.path().join("broken.md");
        std::fs::write(&path, "# Title only\n\n---\n").unwrap();

        assert!(matches!(store.load(&path), Err(HistoryError::Parse { .. })));
        assert!(matches!(
            store.load(&dir.path().join("missing.md")),
            Err(HistoryError::Io { .. })
        ));
    }

    #[test]
    fn test_roles_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let loaded = store.load(&store.save(&conversation()).unwrap()).unwrap();
        let roles: Vec<_> = loaded.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }
}
