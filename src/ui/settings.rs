//! Settings menu.

use super::console::{Console, Tone};
use crate::config::{ConfigStore, Settings};
use crate::locale::{Language, Locale};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

/// Menu entries that take free text, in menu order: (settings key, label key).
const TEXT_OPTIONS: [(&str, &str); 5] = [
    ("api_key", "settings.api_key"),
    ("base_url", "settings.base_url"),
    ("model", "settings.model"),
    ("temperature", "settings.temperature"),
    ("max_tokens", "settings.max_tokens"),
];

const FLAG_OPTIONS: [(&str, &str); 2] = [
    ("save_history", "settings.save_history"),
    ("show_timestamps", "settings.show_timestamps"),
];

/// Show and edit settings until the user saves or input ends.
pub fn run<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    config: &mut ConfigStore,
    locale: &Locale,
) -> io::Result<()> {
    loop {
        show(console, config, locale)?;
        let Some(choice) = console.prompt(locale.text("settings.select_prompt"))? else {
            return Ok(());
        };

        match choice.parse::<usize>() {
            Ok(n @ 1..=5) => edit_text(console, config, locale, TEXT_OPTIONS[n - 1])?,
            Ok(n @ 6..=7) => edit_flag(console, config, locale, FLAG_OPTIONS[n - 6])?,
            Ok(8) => edit_language(console, config, locale)?,
            Ok(9) => {
                match config.save() {
                    Ok(()) => {
                        info!("Settings saved to {}", config.path().display());
                        console.say(Tone::Success, locale.text("settings.saved"))?;
                    }
                    Err(e) => {
                        warn!("{}", e);
                        let message = format!("{} {}", locale.text("settings.save_failed"), e);
                        console.say(Tone::Error, &message)?;
                    }
                }
                return Ok(());
            }
            _ => console.say(Tone::Error, locale.text("settings.invalid_choice"))?,
        }
    }
}

fn show<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    config: &ConfigStore,
    locale: &Locale,
) -> io::Result<()> {
    let settings = config.settings();

    console.blank()?;
    console.say(Tone::Title, locale.text("settings.title"))?;
    console.rule(Tone::Title, '=', 40)?;

    let mut number = 1;
    for (key, label) in TEXT_OPTIONS.iter().chain(FLAG_OPTIONS.iter()) {
        let mut entry = format!(
            "{}. {}: {}",
            number,
            locale.text(label),
            display_value(settings, key, locale)
        );
        if let Some(env) = config.env_override(key) {
            entry.push_str(&format!(" [{}]", env));
        }
        console.line(&entry)?;
        number += 1;
    }
    console.line(&format!(
        "8. {}: {} ({})",
        locale.text("settings.language"),
        settings.language.native_name(),
        settings.language.code()
    ))?;
    console.line(&format!("9. {}", locale.text("settings.save_return")))?;
    console.blank()
}

fn display_value(settings: &Settings, key: &str, locale: &Locale) -> String {
    let flag = |on: bool| {
        locale
            .text(if on { "settings.yes" } else { "settings.no" })
            .to_string()
    };
    match key {
        "api_key" => settings
            .masked_api_key()
            .unwrap_or_else(|| locale.text("settings.not_set").to_string()),
        "base_url" => settings.base_url.clone(),
        "model" => settings.model.clone(),
        "temperature" => settings.temperature.to_string(),
        "max_tokens" => settings.max_tokens.to_string(),
        "save_history" => flag(settings.save_history),
        "show_timestamps" => flag(settings.show_timestamps),
        _ => String::new(),
    }
}

fn edit_text<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    config: &mut ConfigStore,
    locale: &Locale,
    (key, label): (&str, &str),
) -> io::Result<()> {
    let prompt = format!(
        "{} {}:",
        locale.text("settings.enter_new"),
        locale.text(label).to_lowercase()
    );
    let Some(value) = console.prompt(&prompt)? else {
        return Ok(());
    };
    if value.is_empty() {
        return Ok(());
    }

    apply(console, config, locale, key, &value)?;
    if key == "api_key" {
        console.say(Tone::Notice, locale.text("settings.note_config_only"))?;
    }
    Ok(())
}

fn edit_flag<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    config: &mut ConfigStore,
    locale: &Locale,
    (key, label): (&str, &str),
) -> io::Result<()> {
    let yes_no = locale.text("settings.yes_no");
    let prompt = format!("{} ({}):", locale.text(label), yes_no);
    let Some(answer) = console.prompt(&prompt)? else {
        return Ok(());
    };

    match parse_yes_no(&answer, yes_no) {
        Some(on) => apply(console, config, locale, key, if on { "true" } else { "false" }),
        None => console.say(Tone::Error, locale.text("warnings.invalid_value")),
    }
}

fn edit_language<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    config: &mut ConfigStore,
    locale: &Locale,
) -> io::Result<()> {
    for (i, language) in Language::ALL.iter().enumerate() {
        console.line(&format!(
            "{}. {} ({})",
            i + 1,
            language.native_name(),
            language.code()
        ))?;
    }
    let prompt = format!("{}:", locale.text("settings.language"));
    let Some(choice) = console.prompt(&prompt)? else {
        return Ok(());
    };

    match pick_language(&choice) {
        Some(language) => apply(console, config, locale, "language", language.code()),
        None => console.say(Tone::Error, locale.text("warnings.invalid_value")),
    }
}

/// Set one option, reporting rejected values and env overrides.
fn apply<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    config: &mut ConfigStore,
    locale: &Locale,
    key: &str,
    value: &str,
) -> io::Result<()> {
    let env = config.env_override(key);
    if let Err(e) = config.set(key, value) {
        warn!("{}", e);
        return console.say(Tone::Error, locale.text("warnings.invalid_value"));
    }
    if let Some(env) = env {
        let note = format!("{} {}", locale.text("settings.note_env_persist"), env);
        console.say(Tone::Notice, &note)?;
    }
    Ok(())
}

/// Interpret an answer against a localized `yes/no` pair such as `o/n`.
/// English `y`/`n` are always understood.
pub fn parse_yes_no(answer: &str, yes_no: &str) -> Option<bool> {
    let first = answer.trim().chars().next()?.to_lowercase().next()?;
    let mut letters = yes_no.split('/').filter_map(|s| s.trim().chars().next());
    let yes = letters.next();
    let no = letters.next();

    if Some(first) == yes || first == 'y' {
        Some(true)
    } else if Some(first) == no || first == 'n' {
        Some(false)
    } else {
        None
    }
}

/// A language by menu number or code.
pub fn pick_language(choice: &str) -> Option<Language> {
    let choice = choice.trim();
    match choice.parse::<usize>() {
        Ok(n) => Language::ALL.get(n.checked_sub(1)?).copied(),
        Err(_) => Language::from_code(choice),
    }
}
