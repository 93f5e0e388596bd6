//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use studycards_core::{Assistant, AssistantContext, AssistantProgress, AssistantRequest, ContextRef};
use studycards_server::AppState;
use studycards_shared::{AppConfig, init_config, load_config, load_config_from, resolve_api_key};
use studycards_storage::Storage;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// StudyCards: flashcards with an AI study assistant.
#[derive(Parser)]
#[command(
    name = "studycards",
    version,
    about = "Serve the StudyCards API or ask the study assistant from the terminal.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.studycards/studycards.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP API server.
    Serve {
        /// Interface to bind.
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on.
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Origin allowed by CORS.
        #[arg(long, env = "CORS_ORIGIN")]
        cors_origin: Option<String>,

        /// Database file (in-memory when neither this nor the config sets one).
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Ask the study assistant a question as a stored user.
    Ask {
        /// The question.
        prompt: String,

        /// ID of the user asking.
        #[arg(short, long)]
        user: String,

        /// Card currently being studied.
        #[arg(long)]
        card: Option<String>,

        /// Deck currently being studied.
        #[arg(long)]
        deck: Option<String>,

        /// Database file holding the user's cards and decks.
        #[arg(long)]
        database: Option<PathBuf>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "studycards=info",
        1 => "studycards=debug",
        _ => "studycards=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve {
            host,
            port,
            cors_origin,
            database,
        } => {
            let mut config = resolve_config(config_path)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(origin) = cors_origin {
                config.cors.origin = origin;
            }
            if database.is_some() {
                config.storage.database_path = database;
            }
            cmd_serve(&config).await
        }
        Command::Ask {
            prompt,
            user,
            card,
            deck,
            database,
            json,
        } => {
            let mut config = resolve_config(config_path)?;
            if database.is_some() {
                config.storage.database_path = database;
            }
            let request = AssistantRequest {
                prompt,
                context: Some(AssistantContext {
                    current_card: card.map(|id| ContextRef { id }),
                    current_deck: deck.map(|id| ContextRef { id }),
                }),
            };
            cmd_ask(&config, &user, &request, json).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let storage = Storage::open_configured(config.storage.database_path.as_deref()).await?;
    Ok(Arc::new(storage))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config: &AppConfig) -> Result<()> {
    config.validate()?;

    // The server still comes up without a key; assistant calls then fail
    // with 500 while the CRUD routes keep working.
    let api_key = match resolve_api_key(&config.openai) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "assistant disabled until an API key is configured");
            String::new()
        }
    };

    let storage = open_storage(config).await?;
    let assistant = Assistant::new(Arc::clone(&storage), &config.openai, api_key)?;
    info!(model = assistant.model(), "assistant ready");

    let state = AppState::new(storage, assistant, &config.rate_limit);
    studycards_server::serve(config, state).await?;
    Ok(())
}

async fn cmd_ask(config: &AppConfig, user_id: &str, request: &AssistantRequest, json: bool) -> Result<()> {
    config.validate()?;
    let api_key = resolve_api_key(&config.openai)?;

    if config.storage.database_path.is_none() {
        return Err(eyre!(
            "ask needs a database with your user in it: pass --database or set storage.database_path"
        ));
    }

    let storage = open_storage(config).await?;
    let assistant = Assistant::new(storage, &config.openai, api_key)?;

    info!(user_id, model = assistant.model(), "asking the assistant");
    let progress = CliProgress::new();
    let result = assistant.ask(user_id, request, &progress).await;
    progress.finish();
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!();
    println!("{}", response.answer);
    println!();
    println!("  Confidence: {:.0}%", response.confidence * 100.0);
    if !response.suggestions.is_empty() {
        println!("  Suggestions:");
        for suggestion in &response.suggestions {
            println!("    - {suggestion}");
        }
    }
    if !response.related_cards.is_empty() {
        println!("  Related cards: {}", response.related_cards.join(", "));
    }
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the assistant's current phase.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl AssistantProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }
}
