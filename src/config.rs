//! Application configuration.
//!
//! Everything is an explicit value on `Config`, threaded into every
//! collaborator call; there is no ambient/global lookup. Values come from
//! environment variables with documented defaults; file paths default to
//! subpaths of the data directory so a single `MAILBRIEF_DATA_DIR` override
//! relocates the whole installation.

use std::env;
use std::path::PathBuf;

/// Fallback chat-completions endpoint (any OpenAI-compatible API works).
const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_MAX_EMAILS: u32 = 50;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root for all record files. Default: `~/.mailbrief`.
    pub data_dir: PathBuf,
    pub known_senders_path: PathBuf,
    pub tasks_path: PathBuf,
    pub state_path: PathBuf,
    pub instructions_path: PathBuf,
    /// Where the daily-run digest lands. Rescan digests are written next to
    /// it, one file per day.
    pub summary_output_path: PathBuf,

    /// Google OAuth client secret (Desktop App type) and persisted token.
    pub google_credentials_path: PathBuf,
    pub google_token_path: PathBuf,

    pub llm_api_key: String,
    pub llm_base_url: String,
    pub model_name: String,
    /// Upper bound on messages pulled per window.
    pub max_emails_per_run: u32,
    /// Opt-in: on malformed model JSON, spend one extra completion asking
    /// the model to re-emit it as valid JSON.
    pub llm_repair: bool,
}

impl Config {
    /// Build a config rooted at `data_dir` with all defaults.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Config {
            known_senders_path: data_dir.join("known_senders.json"),
            tasks_path: data_dir.join("tasks.json"),
            state_path: data_dir.join("state.json"),
            instructions_path: data_dir.join("instructions.txt"),
            summary_output_path: data_dir.join("daily_summary.md"),
            google_credentials_path: data_dir.join("credentials.json"),
            google_token_path: data_dir.join("token.json"),
            llm_api_key: String::new(),
            llm_base_url: DEFAULT_LLM_URL.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            max_emails_per_run: DEFAULT_MAX_EMAILS,
            llm_repair: false,
            data_dir,
        }
    }

    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let data_dir = env::var("MAILBRIEF_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".mailbrief")
            });

        let mut config = Config::with_data_dir(data_dir);

        if let Ok(path) = env::var("MAILBRIEF_CREDENTIALS_PATH") {
            config.google_credentials_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MAILBRIEF_TOKEN_PATH") {
            config.google_token_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MAILBRIEF_SUMMARY_PATH") {
            config.summary_output_path = PathBuf::from(path);
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config.llm_api_key = key;
        }
        if let Ok(url) = env::var("MAILBRIEF_LLM_URL") {
            config.llm_base_url = url;
        }
        if let Ok(model) = env::var("MAILBRIEF_MODEL") {
            config.model_name = model;
        }
        if let Ok(raw) = env::var("MAILBRIEF_MAX_EMAILS") {
            match raw.parse() {
                Ok(n) => config.max_emails_per_run = n,
                Err(_) => log::warn!("MAILBRIEF_MAX_EMAILS={:?} is not a number; keeping {}", raw, config.max_emails_per_run),
            }
        }
        if let Ok(flag) = env::var("MAILBRIEF_LLM_REPAIR") {
            config.llm_repair = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        config
    }
}
