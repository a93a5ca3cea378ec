mod config;
mod run;
mod transcripts;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use qbot_db::Database;
use qbot_logging::LogFormat;

use config::QbotConfig;

#[derive(Parser, Debug)]
#[command(
    name = "qbot",
    about = "Guided supplier questionnaire driven by a language model",
    version,
    author
)]
struct Cli {
    /// Path to a config file (default: ./qbot.toml, then the global config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Diagnostic log level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Diagnostic log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatChoice>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the questionnaire interactively
    Run {
        /// Resume (or start) a specific session
        #[arg(short, long)]
        session: Option<String>,

        /// Maximum number of questions to ask
        #[arg(short = 'n', long)]
        max_questions: Option<usize>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Print questionnaire events (questions, rejections, fallbacks) to stderr
        #[arg(long)]
        show_events: bool,
    },

    /// Show a stored session transcript
    Show {
        /// Session ID
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored sessions
    List {
        /// Only completed sessions
        #[arg(long)]
        complete: bool,

        /// Maximum number of sessions to show
        #[arg(long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = QbotConfig::load(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let format = match cli.log_format {
        Some(choice) => choice.into(),
        None => config
            .logging
            .format
            .parse::<LogFormat>()
            .map_err(anyhow::Error::msg)?,
    };
    if let Some(dir) = &config.logging.dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let _guard = qbot_logging::init_tracing(&level, format, config.logging.dir.as_deref());

    match cli.command {
        Commands::Run {
            session,
            max_questions,
            model,
            show_events,
        } => {
            if let Some(max) = max_questions {
                config.questionnaire.max_questions = max;
            }
            if let Some(model) = model {
                config.model.model = model;
            }
            let options = run::RunOptions {
                session,
                show_events,
                event_format: format,
            };
            run::handle_run(&config, options).await
        }
        Commands::Show { id, json } => {
            let db = open_database(&config)?;
            transcripts::handle_show(&db, &id, json)
        }
        Commands::List {
            complete,
            limit,
            json,
        } => {
            let db = open_database(&config)?;
            transcripts::handle_list(&db, complete, limit, json)
        }
    }
}

fn open_database(config: &QbotConfig) -> Result<Database> {
    let path = config.database_path();
    Database::open_at(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))
}
