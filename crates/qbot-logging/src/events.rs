use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for a questionnaire session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    SessionStarted {
        session_id: String,
        max_questions: usize,
    },
    QuestionAsked {
        number: usize,
        question: String,
        /// False for the fixed opening question
        generated: bool,
    },
    AnswerRecorded {
        number: usize,
    },
    CandidateRejected {
        attempt: u32,
        reason: String,
        candidate: String,
    },
    FallbackUsed {
        number: usize,
    },
    /// The final question is next and mandatory topics are still open
    TopicsUncovered {
        number: usize,
        missing: Vec<String>,
    },
    SessionCompleted {
        session_id: String,
        questions: usize,
        answers: usize,
    },
    ModelFailed {
        error: String,
    },
    ArchiveFailed {
        session_id: String,
        sink: String,
        error: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for questionnaire events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    console: bool,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            console: true,
            file_writer: None,
        }
    }

    /// A logger that writes nothing to the console
    pub fn silent() -> Self {
        Self {
            format: LogFormat::Json,
            console: false,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            format,
            console: true,
            file_writer: Some(Mutex::new(open_append(log_path)?)),
        })
    }

    /// Create a logger that only appends JSON lines to a file
    pub fn file_only(log_path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            format: LogFormat::Json,
            console: false,
            file_writer: Some(Mutex::new(open_append(log_path)?)),
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if !self.console {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::SessionStarted {
                session_id,
                max_questions,
            } => {
                let _ = writeln!(
                    stderr,
                    "{} {} {}",
                    "▶".bright_blue(),
                    "Session".bright_blue().bold(),
                    format!("{} (up to {} questions)", session_id, max_questions).dimmed()
                );
            }
            LogEvent::QuestionAsked {
                number, generated, ..
            } => {
                let source = if *generated { "generated" } else { "opening" };
                let _ = writeln!(
                    stderr,
                    "  {} Question {} {}",
                    "?".bright_cyan(),
                    number,
                    format!("({})", source).dimmed()
                );
            }
            LogEvent::AnswerRecorded { number } => {
                let _ = writeln!(stderr, "  {} Answer {}", "✓".bright_green(), number);
            }
            LogEvent::CandidateRejected {
                attempt, reason, ..
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} Candidate rejected on attempt {}: {}",
                    "→".bright_yellow(),
                    attempt,
                    reason
                );
            }
            LogEvent::FallbackUsed { number } => {
                let _ = writeln!(
                    stderr,
                    "  {} Closing with fallback at question {}",
                    "⚠".bright_yellow(),
                    number
                );
            }
            LogEvent::TopicsUncovered { number, missing } => {
                let _ = writeln!(
                    stderr,
                    "  {} Question {} is the last; still missing: {}",
                    "⚠".bright_yellow(),
                    number,
                    missing.join(", ").dimmed()
                );
            }
            LogEvent::SessionCompleted {
                questions, answers, ..
            } => {
                let _ = writeln!(
                    stderr,
                    "{} Completed: {} questions, {} answers",
                    "✓".bright_green().bold(),
                    questions,
                    answers
                );
            }
            LogEvent::ModelFailed { error } => {
                let _ = writeln!(
                    stderr,
                    "{} Model call failed: {}",
                    "✗".bright_red(),
                    error.bright_red()
                );
            }
            LogEvent::ArchiveFailed { sink, error, .. } => {
                let _ = writeln!(
                    stderr,
                    "{} Archive via {} failed: {}",
                    "✗".bright_red(),
                    sink,
                    error.dimmed()
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::SessionStarted { session_id, .. } => {
                format!("[{}] session:start {}", timestamp, session_id)
            }
            LogEvent::QuestionAsked { number, .. } => {
                format!("[{}] question:{}", timestamp, number)
            }
            LogEvent::AnswerRecorded { number } => format!("[{}] answer:{}", timestamp, number),
            LogEvent::CandidateRejected {
                attempt, reason, ..
            } => format!("[{}] reject:{} {}", timestamp, attempt, reason),
            LogEvent::FallbackUsed { number } => format!("[{}] fallback:{}", timestamp, number),
            LogEvent::TopicsUncovered { number, missing } => {
                format!("[{}] uncovered:{} {}", timestamp, number, missing.join(","))
            }
            LogEvent::SessionCompleted {
                session_id,
                questions,
                answers,
            } => format!(
                "[{}] session:done {} q={} a={}",
                timestamp, session_id, questions, answers
            ),
            LogEvent::ModelFailed { error } => format!("[{}] model:error {}", timestamp, error),
            LogEvent::ArchiveFailed { sink, error, .. } => {
                format!("[{}] archive:error:{} {}", timestamp, sink, error)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }
}

fn open_append(log_path: &Path) -> std::io::Result<File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
}
