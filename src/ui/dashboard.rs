//! Top-level menu.

use super::console::{Console, Tone};
use super::session::ChatSession;
use super::settings::pick_language;
use crate::config::{ConfigStore, Settings};
use crate::history::HistoryStore;
use crate::llm::{ChatModel, TransportError};
use crate::locale::{Language, Locale, LocaleSource};
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

/// Shown in every language so the user can always find their way back.
const LANGUAGE_PROMPT: &str = "Select language / Choisissez la langue / اختر اللغة:";

/// Builds a model client from the current settings.
pub type ModelFactory =
    Box<dyn Fn(&Settings) -> Result<Box<dyn ChatModel>, TransportError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    NewChat,
    ViewHistory,
    Settings,
    Language,
    Exit,
}

impl MenuChoice {
    fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::NewChat),
            "2" => Some(MenuChoice::ViewHistory),
            "3" => Some(MenuChoice::Settings),
            "4" => Some(MenuChoice::Language),
            "5" => Some(MenuChoice::Exit),
            _ => None,
        }
    }
}

pub struct Dashboard {
    config: ConfigStore,
    locale: Locale,
    locale_source: LocaleSource,
    history: HistoryStore,
    connect: ModelFactory,
}

impl Dashboard {
    pub fn new(
        config: ConfigStore,
        locale: Locale,
        locale_source: LocaleSource,
        history: HistoryStore,
        connect: ModelFactory,
    ) -> Self {
        Self {
            config,
            locale,
            locale_source,
            history,
            connect,
        }
    }

    #[cfg(test)]
    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    #[cfg(test)]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Print the welcome banner.
    pub fn welcome<R: BufRead, W: Write>(&self, console: &mut Console<R, W>) -> io::Result<()> {
        let locale = &self.locale;
        console.rule(Tone::Title, '=', 60)?;
        console.say(Tone::Title, locale.text("welcome.header"))?;
        console.rule(Tone::Title, '=', 60)?;
        console.line(locale.text("welcome.description"))?;
        console.say(Tone::Info, locale.text("welcome.history_info"))?;
        console.say(Tone::Info, &self.history.dir().display().to_string())?;

        if self.config.settings().api_key.is_empty() {
            console.blank()?;
            console.say(Tone::Notice, locale.text("warnings.no_api_key"))?;
            console.say(Tone::Notice, locale.text("warnings.no_api_key_hint"))?;
        }
        Ok(())
    }

    /// Show the menu until the user exits or input ends.
    pub async fn run<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> io::Result<()> {
        loop {
            self.show_menu(console)?;
            let Some(input) = console.prompt(self.locale.text("dashboard.prompt"))? else {
                break;
            };

            match MenuChoice::parse(&input) {
                Some(MenuChoice::NewChat) => self.new_chat(console).await?,
                Some(MenuChoice::ViewHistory) => {
                    super::history::run(console, &self.history, &self.locale)?
                }
                Some(MenuChoice::Settings) => {
                    let before = self.config.settings().language;
                    super::settings::run(console, &mut self.config, &self.locale)?;
                    if self.config.settings().language != before {
                        self.reload_locale();
                    }
                }
                Some(MenuChoice::Language) => self.change_language(console)?,
                Some(MenuChoice::Exit) => break,
                None => console.say(Tone::Error, self.locale.text("dashboard.invalid_choice"))?,
            }
        }

        console.blank()?;
        console.say(Tone::Title, self.locale.text("exit_message"))
    }

    fn show_menu<R: BufRead, W: Write>(&self, console: &mut Console<R, W>) -> io::Result<()> {
        let locale = &self.locale;
        console.blank()?;
        console.say(Tone::Title, locale.text("dashboard.title"))?;
        console.rule(Tone::Title, '=', 40)?;
        let options = [
            "dashboard.options.new_chat",
            "dashboard.options.view_history",
            "dashboard.options.settings",
            "dashboard.options.language",
            "dashboard.options.exit",
        ];
        for (i, key) in options.iter().enumerate() {
            console.line(&format!("{}. {}", i + 1, locale.text(key)))?;
        }
        console.blank()
    }

    async fn new_chat<R: BufRead, W: Write>(&self, console: &mut Console<R, W>) -> io::Result<()> {
        let settings = self.config.settings();
        if settings.api_key.is_empty() {
            console.say(Tone::Notice, self.locale.text("warnings.no_api_key"))?;
            console.say(Tone::Notice, self.locale.text("warnings.no_api_key_hint"))?;
        }

        let model = match (self.connect)(settings) {
            Ok(model) => model,
            Err(e) => {
                warn!("Could not create model client: {}", e);
                let message = format!("{} {}", self.locale.text("chat.error"), e);
                return console.say(Tone::Error, &message);
            }
        };

        let summary = ChatSession::new(model.as_ref(), settings, &self.locale, &self.history)
            .run(console)
            .await?;
        if let Some(path) = &summary.saved_to {
            debug!(
                "Conversation {} kept at {}",
                summary.conversation.id(),
                path.display()
            );
        }
        Ok(())
    }

    fn change_language<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> io::Result<()> {
        console.blank()?;
        for (i, language) in Language::ALL.iter().enumerate() {
            let key = format!("languages.{}", language.code());
            console.line(&format!(
                "{}. {} ({})",
                i + 1,
                language.native_name(),
                self.locale.text(&key)
            ))?;
        }
        let Some(choice) = console.prompt(LANGUAGE_PROMPT)? else {
            return Ok(());
        };

        let Some(language) = pick_language(&choice) else {
            return console.say(Tone::Error, self.locale.text("warnings.invalid_value"));
        };
        if let Err(e) = self.config.set("language", language.code()) {
            warn!("{}", e);
            return console.say(Tone::Error, self.locale.text("warnings.invalid_value"));
        }
        if let Err(e) = self.config.save() {
            warn!("{}", e);
            let message = format!("{} {}", self.locale.text("settings.save_failed"), e);
            console.say(Tone::Error, &message)?;
        }
        self.reload_locale();
        Ok(())
    }

    /// Swap in the bundle for the configured language. On failure the current
    /// locale stays.
    fn reload_locale(&mut self) {
        let language = self.config.settings().language;
        match Locale::load(&self.locale_source, language) {
            Ok(locale) => {
                info!("UI language set to {}", locale.language());
                self.locale = locale;
            }
            Err(e) => warn!("Could not load {} locale: {}", language, e),
        }
    }
}
