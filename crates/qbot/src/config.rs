//! Configuration file support for qbot.
//!
//! Loads `qbot.toml` from an explicit path, the working directory, or the
//! global config directory, then applies environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use qbot_core::{QuestionnaireConfig, DEFAULT_DUPLICATE_THRESHOLD, DEFAULT_MAX_QUESTIONS};
use qbot_db::Database;
use qbot_llm::{ModelConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// The project config file name
pub const CONFIG_FILE_NAME: &str = "qbot.toml";

/// Global config directory name (under the platform config dir)
pub const GLOBAL_CONFIG_DIR: &str = "qbot";

/// Global config file name
pub const GLOBAL_CONFIG_FILE: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct QbotConfig {
    pub model: ModelSection,
    pub questionnaire: QuestionnaireSection,
    pub session: SessionSection,
    pub storage: StorageSection,
    pub archive: ArchiveSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ModelSection {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QuestionnaireSection {
    pub max_questions: usize,
    pub duplicate_threshold: u8,
    /// Replaces the fixed opening question
    pub first_question: Option<String>,
    /// Replaces the closing sentence used when generation falls back
    pub fallback_sentence: Option<String>,
}

impl Default for QuestionnaireSection {
    fn default() -> Self {
        Self {
            max_questions: DEFAULT_MAX_QUESTIONS,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            first_question: None,
            fallback_sentence: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionSection {
    /// Idle in-progress sessions older than this start fresh
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct StorageSection {
    /// SQLite file (default: the platform data dir)
    pub database: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct ArchiveSection {
    /// Directory for JSON transcript documents
    pub dir: Option<PathBuf>,
    /// Git checkout that receives a commit per completed transcript
    pub git_repo: Option<PathBuf>,
    pub git_remote: Option<String>,
    pub git_branch: Option<String>,
    /// Name of the environment variable holding the push token
    pub token_env: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSection {
    pub level: String,
    pub format: String,
    /// Rolling log directory; diagnostics go to stderr when unset
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            dir: dirs::data_local_dir().map(|d| d.join("qbot").join("logs")),
        }
    }
}

impl QbotConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `./qbot.toml` is tried, then
    /// the global config file; with neither present the defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::load_file(&local);
        }

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                return Self::load_file(&global);
            }
        }

        Ok(Self::default())
    }

    /// Parse a single config file (hard error if unreadable or invalid)
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// `<config_dir>/qbot/config.toml`
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
    }

    /// Apply `QBOT_*` environment overrides.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("QBOT_MODEL") {
            self.model.model = model;
        }
        if let Some(base_url) = lookup("QBOT_BASE_URL") {
            self.model.base_url = base_url;
        }
        if let Some(max) = lookup("QBOT_MAX_QUESTIONS") {
            self.questionnaire.max_questions = max
                .trim()
                .parse()
                .with_context(|| format!("Invalid QBOT_MAX_QUESTIONS: {}", max))?;
        }
        if let Some(path) = lookup("QBOT_DB_PATH") {
            self.storage.database = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Model connection settings, reading the key from `api_key_env`
    pub fn model_config<F>(&self, lookup: F) -> Result<ModelConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&self.model.api_key_env)
            .filter(|key| !key.trim().is_empty())
            .with_context(|| {
                format!(
                    "No API key found. Set {} to your model provider key.",
                    self.model.api_key_env
                )
            })?;

        Ok(ModelConfig::new(api_key)
            .with_model(&self.model.model)
            .with_base_url(&self.model.base_url)
            .with_timeout(self.model.timeout))
    }

    pub fn questionnaire_config(&self) -> QuestionnaireConfig {
        let section = &self.questionnaire;
        let mut config = QuestionnaireConfig::default()
            .with_max_questions(section.max_questions)
            .with_duplicate_threshold(section.duplicate_threshold);
        if let Some(question) = section.first_question.as_deref().filter(|q| !q.trim().is_empty()) {
            config = config.with_first_question(question.trim());
        }
        if let Some(sentence) = section.fallback_sentence.as_deref().filter(|s| !s.trim().is_empty()) {
            config = config.with_fallback_sentence(sentence.trim());
        }
        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database
            .clone()
            .unwrap_or_else(Database::default_path)
    }

    /// Push token for the git archive, if one is configured and set
    pub fn archive_token<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.archive
            .token_env
            .as_deref()
            .and_then(lookup)
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[model]
model = "gpt-4o-mini"
base_url = "http://localhost:8080/v1"
api_key_env = "LOCAL_KEY"
timeout = "30s"

[questionnaire]
max_questions = 6
duplicate_threshold = 75

[session]
ttl = "2h"

[storage]
database = "/tmp/qbot.db"

[archive]
dir = "/tmp/transcripts"
git_repo = "/tmp/archive"
git_remote = "origin"
git_branch = "main"
token_env = "ARCHIVE_TOKEN"

[logging]
level = "debug"
format = "json"
"#;
        let config: QbotConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.api_key_env, "LOCAL_KEY");
        assert_eq!(config.model.timeout, Duration::from_secs(30));
        assert_eq!(config.questionnaire.max_questions, 6);
        assert_eq!(config.questionnaire.duplicate_threshold, 75);
        assert_eq!(config.session.ttl, Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/qbot.db"));
        assert_eq!(config.archive.git_remote.as_deref(), Some("origin"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: QbotConfig = toml::from_str("").unwrap();
        assert_eq!(config.model.model, DEFAULT_MODEL);
        assert_eq!(config.model.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.questionnaire.max_questions, 10);
        assert_eq!(config.questionnaire.duplicate_threshold, 80);
        assert_eq!(config.session.ttl, Duration::from_secs(3600));
        assert!(config.archive.dir.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_custom_questionnaire_wording() {
        let config: QbotConfig = toml::from_str(
            r#"
[questionnaire]
first_question = "What do you manufacture?"
fallback_sentence = "  Thanks, we have what we need.  "
"#,
        )
        .unwrap();
        let questionnaire = config.questionnaire_config();
        assert_eq!(questionnaire.first_question, "What do you manufacture?");
        assert_eq!(questionnaire.fallback_sentence, "Thanks, we have what we need.");

        let blank: QbotConfig = toml::from_str("[questionnaire]\nfirst_question = \"  \"\n").unwrap();
        assert_eq!(
            blank.questionnaire_config().first_question,
            qbot_core::DEFAULT_FIRST_QUESTION
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(toml::from_str::<QbotConfig>("[model]\nprovider = \"x\"\n").is_err());
        assert!(toml::from_str::<QbotConfig>("[server]\nport = 80\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = QbotConfig::default();
        config
            .apply_env(env(&[
                ("QBOT_MODEL", "gpt-4o-mini"),
                ("QBOT_MAX_QUESTIONS", "4"),
                ("QBOT_DB_PATH", "/var/lib/qbot.db"),
            ]))
            .unwrap();

        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.questionnaire_config().max_questions, 4);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/qbot.db"));

        let err = config
            .apply_env(env(&[("QBOT_MAX_QUESTIONS", "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains("QBOT_MAX_QUESTIONS"));
    }

    #[test]
    fn test_api_key_from_named_variable() {
        let config: QbotConfig = toml::from_str("[model]\napi_key_env = \"MY_KEY\"\n").unwrap();

        let model = config.model_config(env(&[("MY_KEY", "sk-test")])).unwrap();
        assert_eq!(model.api_key, "sk-test");
        assert_eq!(model.timeout, Some(Duration::from_secs(60)));
        assert!(!format!("{:?}", model).contains("sk-test"));

        let err = config
            .model_config(env(&[("OPENAI_API_KEY", "sk-other")]))
            .unwrap_err();
        assert!(err.to_string().contains("MY_KEY"));
    }

    #[test]
    fn test_archive_token() {
        let mut config = QbotConfig::default();
        assert!(config.archive_token(env(&[("TOKEN", "abc")])).is_none());

        config.archive.token_env = Some("TOKEN".to_string());
        assert_eq!(
            config.archive_token(env(&[("TOKEN", "abc")])).as_deref(),
            Some("abc")
        );
        assert!(config.archive_token(env(&[])).is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[questionnaire]\nmax_questions = 3\n").unwrap();

        let config = QbotConfig::load(Some(&path)).unwrap();
        assert_eq!(config.questionnaire.max_questions, 3);

        let missing = dir.path().join("missing.toml");
        assert!(QbotConfig::load(Some(&missing)).is_err());

        std::fs::write(&path, "[questionnaire]\nmax_questions = \"many\"\n").unwrap();
        let err = QbotConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
