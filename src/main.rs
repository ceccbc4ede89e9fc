//! deepseek-chat - a terminal chat client for DeepSeek models.
//!
//! Streams replies from an OpenAI-compatible endpoint, keeps each
//! conversation as a markdown file and offers a small menu for settings,
//! history and the UI language (English, French, Arabic).

mod config;
mod conversation;
mod history;
mod llm;
mod locale;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use config::ConfigStore;
use history::HistoryStore;
use locale::{Locale, LocaleSource};
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::console::Console;
use ui::dashboard::Dashboard;

#[derive(Parser)]
#[command(name = "deepseek-chat")]
#[command(author, version, about = "Chat with DeepSeek models from your terminal")]
#[command(long_about = "Chat with DeepSeek models from your terminal.\n\nSettings can be overridden with DEEPSEEK_* environment variables or a .env file.")]
struct Cli {
    /// Settings file (default: ~/.config/deepseek-chat/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory conversations are saved to
    #[arg(long, value_name = "DIR")]
    history_dir: Option<PathBuf>,

    /// Load locale bundles from a directory instead of the built-in ones
    #[arg(long, value_name = "DIR")]
    locales_dir: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Log debug information to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is normal.
    dotenvy::dotenv().ok();
    init_logging(cli.verbose)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let mut config = ConfigStore::load(&config_path).context("Failed to load configuration")?;
    if !config.exists() {
        match config.save() {
            Ok(()) => info!("Created default settings at {}", config_path.display()),
            Err(e) => warn!("Could not write default settings: {}", e),
        }
    }

    let locale_source = match cli.locales_dir {
        Some(dir) => LocaleSource::Directory(dir),
        None => LocaleSource::Embedded,
    };
    let language = config.settings().language;
    let locale = Locale::load(&locale_source, language).context("Failed to load locale bundles")?;

    let history_dir = match cli.history_dir {
        Some(dir) => dir,
        None => config::default_history_dir()?,
    };
    info!(
        "Using model {} at {}, history in {}",
        config.settings().model,
        config.settings().base_url,
        history_dir.display()
    );

    let color = !cli.no_color && atty::is(atty::Stream::Stdout);
    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout(), color);

    let mut dashboard = Dashboard::new(
        config,
        locale,
        locale_source,
        HistoryStore::new(history_dir),
        Box::new(llm::create_model),
    );
    dashboard.welcome(&mut console)?;
    dashboard.run(&mut console).await?;

    Ok(())
}

/// Log to stderr so chat output on stdout stays clean. `RUST_LOG` adds to
/// the defaults.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("deepseek_chat={}", level).parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();
    Ok(())
}
