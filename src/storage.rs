//! JSON record store: load/save for tasks, known senders, run state, and
//! the free-text instructions file.
//!
//! Loading a missing file returns the empty default, so first runs need no
//! setup beyond `ensure_data_files`. Saving is a whole-file overwrite.
// TODO: write-then-rename so a crash mid-save can't truncate a record file.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::Config;
use crate::types::{KnownSendersFile, StateFile, TasksFile};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bad JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_err(path: &Path, source: serde_json::Error) -> StorageError {
    StorageError::Json {
        path: path.display().to_string(),
        source,
    }
}

fn load_or_default<T: Default + serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, StorageError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&text).map_err(|e| json_err(path, e))
}

fn save_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|e| json_err(path, e))?;
    fs::write(path, text).map_err(|e| io_err(path, e))
}

// ============================================================================
// Record accessors
// ============================================================================

pub fn load_known_senders(config: &Config) -> Result<KnownSendersFile, StorageError> {
    load_or_default(&config.known_senders_path)
}

pub fn save_known_senders(
    config: &Config,
    senders: &KnownSendersFile,
) -> Result<(), StorageError> {
    save_json(&config.known_senders_path, senders)
}

pub fn load_tasks(config: &Config) -> Result<TasksFile, StorageError> {
    load_or_default(&config.tasks_path)
}

pub fn save_tasks(config: &Config, tasks: &TasksFile) -> Result<(), StorageError> {
    save_json(&config.tasks_path, tasks)
}

pub fn load_state(config: &Config) -> Result<StateFile, StorageError> {
    load_or_default(&config.state_path)
}

pub fn save_state(config: &Config, state: &StateFile) -> Result<(), StorageError> {
    save_json(&config.state_path, state)
}

pub fn load_instructions(config: &Config) -> Result<String, StorageError> {
    let path = &config.instructions_path;
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path).map_err(|e| io_err(path, e))
}

pub fn save_instructions(config: &Config, text: &str) -> Result<(), StorageError> {
    let path = &config.instructions_path;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(path, text).map_err(|e| io_err(path, e))
}

// ============================================================================
// Bootstrap
// ============================================================================

const DEFAULT_INSTRUCTIONS: &str = "\
Email triage instructions
=========================

- Prioritize emails from pinned or high-importance senders.
- Students, collaborators, and family are generally high priority.
- Bulk notifications, newsletters, and automated alerts are lower priority
  unless they mention deadlines or urgent actions.
- For each important email, create or update tasks that clearly state
  what I need to do and by when.
- Summaries should be concise but must include:
    * who is writing,
    * what they want,
    * any deadlines, and
    * whether I owe a reply.
- Avoid suggesting replies to emails that are obviously spam or purely
  informational.
";

/// One explicit bootstrap step: create the data directory and seed any
/// record file that doesn't exist yet. Existing files are left alone.
pub fn ensure_data_files(config: &Config) -> Result<(), StorageError> {
    fs::create_dir_all(&config.data_dir).map_err(|e| io_err(&config.data_dir, e))?;

    if !config.known_senders_path.exists() {
        save_known_senders(config, &KnownSendersFile::default())?;
    }
    if !config.tasks_path.exists() {
        save_tasks(config, &TasksFile::default())?;
    }
    if !config.state_path.exists() {
        save_state(config, &StateFile::default())?;
    }
    if !config.instructions_path.exists() {
        save_instructions(config, DEFAULT_INSTRUCTIONS)?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SenderProfile, Task};
    use chrono::Utc;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path().to_path_buf());
        (dir, config)
    }

    #[test]
    fn test_missing_files_load_as_defaults() {
        let (_dir, config) = temp_config();
        assert!(load_tasks(&config).unwrap().tasks.is_empty());
        assert!(load_known_senders(&config).unwrap().senders.is_empty());
        assert!(load_state(&config).unwrap().last_run_at.is_none());
        assert_eq!(load_instructions(&config).unwrap(), "");
    }

    #[test]
    fn test_tasks_roundtrip() {
        let (_dir, config) = temp_config();
        let mut file = TasksFile::default();
        let mut task = Task::new("Send grades to registrar");
        task.id = "task-0001".to_string();
        file.tasks.push(task);

        save_tasks(&config, &file).unwrap();
        let loaded = load_tasks(&config).unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].id, "task-0001");
        assert_eq!(loaded.tasks[0].description, "Send grades to registrar");
    }

    #[test]
    fn test_senders_roundtrip() {
        let (_dir, config) = temp_config();
        let mut file = KnownSendersFile::default();
        let mut profile = SenderProfile::new("dean@university.edu");
        profile.pinned = true;
        file.senders.push(profile);

        save_known_senders(&config, &file).unwrap();
        let loaded = load_known_senders(&config).unwrap();
        assert_eq!(loaded.senders.len(), 1);
        assert!(loaded.senders[0].pinned);
    }

    #[test]
    fn test_state_roundtrip() {
        let (_dir, config) = temp_config();
        let now = Utc::now();
        save_state(
            &config,
            &StateFile {
                last_run_at: Some(now),
            },
        )
        .unwrap();
        let loaded = load_state(&config).unwrap();
        assert_eq!(loaded.last_run_at, Some(now));
    }

    #[test]
    fn test_ensure_data_files_seeds_once() {
        let (_dir, config) = temp_config();
        ensure_data_files(&config).unwrap();
        assert!(config.tasks_path.exists());
        assert!(config.instructions_path.exists());

        // A second bootstrap must not clobber user edits.
        save_instructions(&config, "mine now").unwrap();
        ensure_data_files(&config).unwrap();
        assert_eq!(load_instructions(&config).unwrap(), "mine now");
    }

    #[test]
    fn test_corrupt_json_is_an_error_not_a_default() {
        let (_dir, config) = temp_config();
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::write(&config.tasks_path, "{not json").unwrap();
        assert!(matches!(
            load_tasks(&config),
            Err(StorageError::Json { .. })
        ));
    }
}
