//! Interactive questionnaire loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{Confirm, Input};
use tracing::info;

use qbot_archive::{DocumentWriter, GitArchive};
use qbot_core::{
    ArchiveQueue, ProgressionController, QuestionnaireService, Reply, TranscriptSink, TurnResponse,
};
use qbot_db::Database;
use qbot_llm::OpenAiClient;
use qbot_logging::{LogFormat, Logger};

use crate::config::QbotConfig;
use crate::transcripts::print_transcript;

/// Event log file written next to the rolling diagnostics
const EVENT_LOG_FILE: &str = "events.jsonl";

/// Options for one interactive run
pub struct RunOptions {
    pub session: Option<String>,
    /// Echo questionnaire events to stderr as well as the event log
    pub show_events: bool,
    pub event_format: LogFormat,
}

pub async fn handle_run(config: &QbotConfig, options: RunOptions) -> Result<()> {
    let model_config = config.model_config(|key| std::env::var(key).ok())?;
    let client = OpenAiClient::from_config(&model_config)
        .context("Failed to configure the language model client")?;

    let logger = Arc::new(event_logger(config, &options)?);
    let controller =
        ProgressionController::new(Arc::new(client), config.questionnaire_config(), logger.clone());

    let db_path = config.database_path();
    let db = Database::open_at(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let mut service = QuestionnaireService::new(controller, Arc::new(db), logger.clone())
        .with_session_ttl(config.session.ttl);
    if let Some(archive) = archive_queue(config, logger) {
        service = service.with_archive(Arc::new(archive));
    }

    let session_id = options
        .session
        .unwrap_or_else(QuestionnaireService::new_session_id);
    info!(session_id = %session_id, model = %model_config.model, "Starting questionnaire");

    eprintln!("{}", "Supplier questionnaire".bold());
    eprintln!("  {} {}", "Session:".dimmed(), session_id);
    eprintln!(
        "  {} resume later with {}",
        "->".dimmed(),
        format!("qbot run --session {}", session_id).bold()
    );
    eprintln!();

    let result = drive(&service, &session_id).await;
    service.shutdown().await;
    result
}

async fn drive(service: &QuestionnaireService, session_id: &str) -> Result<()> {
    let mut answer: Option<String> = None;

    loop {
        let response = match service.turn(session_id, answer.as_deref()).await {
            Ok(response) => response,
            Err(e) if e.is_retryable() => {
                eprintln!("{} {}", "Could not reach the model:".bright_red(), e);
                let retry = Confirm::new()
                    .with_prompt("Try again?")
                    .default(true)
                    .interact()?;
                if retry {
                    continue;
                }
                eprintln!("{}", "Progress saved. Your last answer was not recorded.".dimmed());
                return Ok(());
            }
            Err(e) if e.is_model_failure() => {
                return Err(e).context("The language model rejected the request; check the [model] settings")
            }
            Err(e) => return Err(e).context("Questionnaire turn failed"),
        };

        match &response.reply {
            Reply::Question(question) => {
                let number = pending_number(&response);
                println!("{} {}", format!("[{}]", number).bright_blue(), question);
                answer = Some(read_answer()?);
            }
            Reply::Complete(closing) => {
                println!();
                if let Some(closing) = closing {
                    println!("{}", closing.bright_green());
                } else {
                    println!("{}", "Thank you, the questionnaire is complete.".bright_green());
                }
                println!();
                print_transcript(&response.transcript);
                return Ok(());
            }
        }
    }
}

/// Number shown beside the question awaiting an answer
fn pending_number(response: &TurnResponse) -> usize {
    response
        .transcript
        .items
        .iter()
        .find(|pair| pair.answer.is_none())
        .map(|pair| pair.number)
        .unwrap_or(response.transcript.question_count)
}

fn read_answer() -> Result<String> {
    loop {
        let input: String = Input::new()
            .with_prompt(">")
            .allow_empty(true)
            .interact_text()?;
        if !input.trim().is_empty() {
            return Ok(input);
        }
        eprintln!("{}", "Please enter an answer.".dimmed());
    }
}

fn event_logger(config: &QbotConfig, options: &RunOptions) -> Result<Logger> {
    let Some(dir) = &config.logging.dir else {
        return Ok(if options.show_events {
            Logger::new(options.event_format)
        } else {
            Logger::silent()
        });
    };

    let path = dir.join(EVENT_LOG_FILE);
    let logger = if options.show_events {
        Logger::with_file(options.event_format, &path)
    } else {
        Logger::file_only(&path)
    };
    logger.with_context(|| format!("Failed to open event log {}", path.display()))
}

fn archive_queue(config: &QbotConfig, logger: Arc<Logger>) -> Option<ArchiveQueue> {
    let mut sinks: Vec<Arc<dyn TranscriptSink>> = Vec::new();

    if let Some(dir) = &config.archive.dir {
        sinks.push(Arc::new(DocumentWriter::new(dir)));
    }

    if let Some(repo) = &config.archive.git_repo {
        let mut git = GitArchive::new(repo);
        if let Some(remote) = &config.archive.git_remote {
            git = git.with_remote(remote);
        }
        if let Some(branch) = &config.archive.git_branch {
            git = git.with_branch(branch);
        }
        if let Some(token) = config.archive_token(|key| std::env::var(key).ok()) {
            git = git.with_token(token);
        }
        sinks.push(Arc::new(git));
    }

    if sinks.is_empty() {
        return None;
    }
    Some(ArchiveQueue::start(sinks, logger))
}
