//! Localized UI strings.
//!
//! Bundles are JSON documents of nested objects, flattened into dotted keys
//! (`chat.you`, `settings.title`). English is the fallback for every other
//! language. The English, French and Arabic bundles are compiled into the
//! binary; `--locales-dir` points the loader at a directory of `<code>.json`
//! files instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

const EMBEDDED_EN: &str = include_str!("../locales/en.json");
const EMBEDDED_FR: &str = include_str!("../locales/fr.json");
const EMBEDDED_AR: &str = include_str!("../locales/ar.json");

/// Errors raised while loading bundles or resolving keys.
#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("missing translation for `{0}`")]
    MissingKey(String),
    #[error("failed to read locale file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {language} locale bundle: {reason}")]
    Parse { language: Language, reason: String },
}

/// Supported UI languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
    Ar,
}

impl Language {
    /// All languages in menu order.
    pub const ALL: [Language; 3] = [Language::En, Language::Fr, Language::Ar];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::Ar => "ar",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.code().eq_ignore_ascii_case(code.trim()))
    }

    /// The language's name written in that language.
    pub fn native_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Fr => "Français",
            Language::Ar => "العربية",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// All strings for one language, keyed by dotted path.
#[derive(Debug, Clone)]
pub struct Bundle {
    language: Language,
    strings: HashMap<String, String>,
}

impl Bundle {
    /// Parse a bundle from its JSON document.
    pub fn from_json(language: Language, json: &str) -> Result<Self, LocaleError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| LocaleError::Parse {
                language,
                reason: e.to_string(),
            })?;

        let mut strings = HashMap::new();
        flatten(language, "", &value, &mut strings)?;
        Ok(Self { language, strings })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.strings.keys().map(String::as_str)
    }
}

fn flatten(
    language: Language,
    prefix: &str,
    value: &serde_json::Value,
    out: &mut HashMap<String, String>,
) -> Result<(), LocaleError> {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            for (name, child) in map {
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten(language, &key, child, out)?;
            }
        }
        Value::String(text) => {
            out.insert(prefix.to_string(), text.clone());
        }
        Value::Number(number) => {
            out.insert(prefix.to_string(), number.to_string());
        }
        Value::Bool(_) | Value::Null | Value::Array(_) => {
            return Err(LocaleError::Parse {
                language,
                reason: format!("`{prefix}` must be a string or an object"),
            });
        }
    }
    Ok(())
}

/// Where bundles are read from.
#[derive(Debug, Clone, Default)]
pub enum LocaleSource {
    /// Bundles compiled into the binary.
    #[default]
    Embedded,
    /// A directory holding `<code>.json` files.
    Directory(PathBuf),
}

impl LocaleSource {
    /// Read the raw bundle document. `Ok(None)` means the bundle does not exist.
    fn read(&self, language: Language) -> Result<Option<String>, LocaleError> {
        match self {
            LocaleSource::Embedded => Ok(Some(
                match language {
                    Language::En => EMBEDDED_EN,
                    Language::Fr => EMBEDDED_FR,
                    Language::Ar => EMBEDDED_AR,
                }
                .to_string(),
            )),
            LocaleSource::Directory(dir) => read_bundle_file(dir, language),
        }
    }
}

fn read_bundle_file(dir: &Path, language: Language) -> Result<Option<String>, LocaleError> {
    let path = dir.join(format!("{}.json", language.code()));
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LocaleError::Read { path, source }),
    }
}

/// The strings used to render the UI in one language.
///
/// Immutable once loaded; changing language means loading a new `Locale`.
#[derive(Debug, Clone)]
pub struct Locale {
    language: Language,
    primary: Option<Bundle>,
    fallback: Bundle,
}

impl Locale {
    /// Load the bundle for `language`, with English as fallback.
    ///
    /// A missing or malformed bundle for a non-English language is logged and
    /// the English bundle is used alone. A missing English bundle is an error.
    pub fn load(source: &LocaleSource, language: Language) -> Result<Self, LocaleError> {
        let fallback_json = match source.read(Language::En)? {
            Some(json) => json,
            None => {
                let path = match source {
                    LocaleSource::Directory(dir) => dir.join("en.json"),
                    LocaleSource::Embedded => PathBuf::from("en.json"),
                };
                return Err(LocaleError::Read {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "the English bundle is required",
                    ),
                });
            }
        };
        let fallback = Bundle::from_json(Language::En, &fallback_json)?;

        if language == Language::En {
            return Ok(Self::from_bundles(language, None, fallback));
        }

        let primary = match source.read(language) {
            Ok(Some(json)) => match Bundle::from_json(language, &json) {
                Ok(bundle) => {
                    debug!(
                        "Loaded {} bundle with {} strings",
                        bundle.language(),
                        bundle.keys().count()
                    );
                    Some(bundle)
                }
                Err(e) => {
                    warn!("{}; falling back to English", e);
                    None
                }
            },
            Ok(None) => {
                warn!("No {} locale bundle found; falling back to English", language);
                None
            }
            Err(e) => {
                warn!("{}; falling back to English", e);
                None
            }
        };

        Ok(Self::from_bundles(language, primary, fallback))
    }

    /// Build a locale from already-parsed bundles.
    pub fn from_bundles(language: Language, primary: Option<Bundle>, fallback: Bundle) -> Self {
        Self {
            language,
            primary,
            fallback,
        }
    }

    /// The language that was requested, even if it fell back to English.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Look a key up in the requested bundle, then in the English bundle.
    pub fn resolve(&self, key: &str) -> Result<&str, LocaleError> {
        self.primary
            .as_ref()
            .and_then(|bundle| bundle.get(key))
            .or_else(|| self.fallback.get(key))
            .ok_or_else(|| LocaleError::MissingKey(key.to_string()))
    }

    /// Text for rendering. A missing key is a bug; it is logged and the key
    /// itself is shown instead.
    pub fn text<'a>(&'a self, key: &'a str) -> &'a str {
        match self.resolve(key) {
            Ok(text) => text,
            Err(e) => {
                error!("{}", e);
                key
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(language: Language, json: &str) -> Bundle {
        Bundle::from_json(language, json).unwrap()
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("fr"), Some(Language::Fr));
        assert_eq!(Language::from_code(" AR "), Some(Language::Ar));
        assert_eq!(Language::from_code("de"), None);
        assert_eq!(Language::default(), Language::En);
    }

    #[test]
    fn test_flatten_nested_keys() {
        let b = bundle(
            Language::En,
            r#"{"chat": {"you": "You", "nested": {"deep": "x"}}, "count": 3}"#,
        );
        assert_eq!(b.get("chat.you"), Some("You"));
        assert_eq!(b.get("chat.nested.deep"), Some("x"));
        assert_eq!(b.get("count"), Some("3"));
        assert_eq!(b.get("chat"), None);
    }

    #[test]
    fn test_arrays_are_rejected() {
        let err = Bundle::from_json(Language::Fr, r#"{"list": ["a"]}"#).unwrap_err();
        assert!(matches!(err, LocaleError::Parse { language: Language::Fr, .. }));
    }

    #[test]
    fn test_fallback_to_english() {
        let en = bundle(
            Language::En,
            r#"{"chat": {"you": "You", "ai": "DeepSeek AI"}, "only_en": "English only"}"#,
        );
        let fr = bundle(Language::Fr, r#"{"chat": {"you": "Vous"}}"#);
        let locale = Locale::from_bundles(Language::Fr, Some(fr), en);

        assert_eq!(locale.resolve("chat.you").unwrap(), "Vous");
        assert_eq!(locale.resolve("only_en").unwrap(), "English only");
        assert_eq!(locale.resolve("chat.ai").unwrap(), "DeepSeek AI");
    }

    #[test]
    fn test_missing_key() {
        let en = bundle(Language::En, r#"{"chat": {"you": "You"}}"#);
        let locale = Locale::from_bundles(Language::En, None, en);

        let err = locale.resolve("chat.nope").unwrap_err();
        assert!(matches!(err, LocaleError::MissingKey(ref k) if k == "chat.nope"));
        assert_eq!(locale.text("chat.nope"), "chat.nope");
    }

    #[test]
    fn test_embedded_bundles_share_keys() {
        let en = bundle(Language::En, EMBEDDED_EN);
        for (language, json) in [(Language::Fr, EMBEDDED_FR), (Language::Ar, EMBEDDED_AR)] {
            let other = bundle(language, json);
            let mut missing: Vec<_> = en.keys().filter(|k| other.get(k).is_none()).collect();
            missing.sort();
            assert!(missing.is_empty(), "{} is missing {:?}", language, missing);
        }
    }

    #[test]
    fn test_load_embedded_french() {
        let locale = Locale::load(&LocaleSource::Embedded, Language::Fr).unwrap();
        assert_eq!(locale.language(), Language::Fr);
        assert_eq!(locale.resolve("chat.you").unwrap(), "Vous");
    }

    #[test]
    fn test_directory_missing_language_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.json"), r#"{"chat": {"you": "You"}}"#).unwrap();

        let source = LocaleSource::Directory(dir.path().to_path_buf());
        let locale = Locale::load(&source, Language::Ar).unwrap();
        assert_eq!(locale.language(), Language::Ar);
        assert_eq!(locale.resolve("chat.you").unwrap(), "You");
    }

    #[test]
    fn test_directory_malformed_language_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.json"), r#"{"chat": {"you": "You"}}"#).unwrap();
        std::fs::write(dir.path().join("fr.json"), "{ not json").unwrap();

        let source = LocaleSource::Directory(dir.path().to_path_buf());
        let locale = Locale::load(&source, Language::Fr).unwrap();
        assert_eq!(locale.resolve("chat.you").unwrap(), "You");
    }

    #[test]
    fn test_directory_without_english_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocaleSource::Directory(dir.path().to_path_buf());
        assert!(matches!(
            Locale::load(&source, Language::En),
            Err(LocaleError::Read { .. })
        ));
    }
}
