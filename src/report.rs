//! Markdown rendering of a daily summary and the report sink.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::Config;
use crate::storage::StorageError;
use crate::types::DailySummary;

/// Render a summary to human-readable markdown.
pub fn render_daily_summary(summary: &DailySummary) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("# Daily Email Triage — {}", summary.summary_date));
    lines.push(String::new());

    lines.push("## Critical Emails".to_string());
    if summary.critical_emails.is_empty() {
        lines.push(String::new());
        lines.push("_No critical emails identified today._".to_string());
    } else {
        lines.push(String::new());
        for (idx, entry) in summary.critical_emails.iter().enumerate() {
            lines.push(format!(
                "{}. **Thread:** `{}` — **Email ID:** `{}`",
                idx + 1,
                entry.thread_id,
                entry.email_id
            ));
            lines.push(format!("   - **Summary:** {}", entry.summary));
            lines.push(format!("   - **Reason:** {}", entry.reason_critical));
            lines.push(format!(
                "   - **Recommended action:** {}",
                entry.recommended_action
            ));
            if !entry.linked_task_ids.is_empty() {
                lines.push(format!(
                    "   - **Linked tasks:** {}",
                    entry.linked_task_ids.join(", ")
                ));
            }
            lines.push(String::new());
        }
    }

    lines.push("## Suggested Responses".to_string());
    if summary.suggested_responses.is_empty() {
        lines.push(String::new());
        lines.push("_No suggested responses for today._".to_string());
    } else {
        lines.push(String::new());
        for (idx, response) in summary.suggested_responses.iter().enumerate() {
            lines.push(format!("{}. **Email ID:** `{}`", idx + 1, response.email_id));
            if !response.draft_outline.is_empty() {
                lines.push("   - **Outline:**".to_string());
                for bullet in &response.draft_outline {
                    lines.push(format!("     - {}", bullet));
                }
            }
            if let Some(draft) = &response.full_draft {
                lines.push(format!("   - **Draft:** {}", draft));
            }
            lines.push(String::new());
        }
    }

    lines.push("## Other Notes".to_string());
    lines.push(String::new());
    match &summary.other_notes {
        Some(notes) if !notes.is_empty() => lines.push(notes.clone()),
        _ => lines.push("_No additional notes._".to_string()),
    }
    lines.push(String::new());

    lines.join("\n")
}

fn write_report(path: &Path, text: &str) -> Result<PathBuf, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    std::fs::write(path, text).map_err(|e| StorageError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(path.to_path_buf())
}

/// Write the daily-run digest to the configured output path.
pub fn write_daily_summary(config: &Config, text: &str) -> Result<PathBuf, StorageError> {
    write_report(&config.summary_output_path, text)
}

/// Write one rescan digest per day, next to the daily output:
/// `daily_summary-YYYY-MM-DD.md`.
pub fn write_rescan_summary(
    config: &Config,
    date: NaiveDate,
    text: &str,
) -> Result<PathBuf, StorageError> {
    let dir = config
        .summary_output_path
        .parent()
        .unwrap_or(Path::new("."));
    write_report(&dir.join(format!("daily_summary-{}.md", date)), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CriticalEmailEntry, SuggestedResponse};

    fn populated_summary() -> DailySummary {
        DailySummary {
            summary_date: NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            critical_emails: vec![CriticalEmailEntry {
                email_id: "msg-1".to_string(),
                thread_id: "thr-1".to_string(),
                summary: "Dean needs the budget by Friday".to_string(),
                reason_critical: "Hard deadline".to_string(),
                recommended_action: "Reply with the draft today".to_string(),
                linked_task_ids: vec!["task-0003".to_string()],
            }],
            suggested_responses: vec![SuggestedResponse {
                email_id: "msg-1".to_string(),
                draft_outline: vec!["Acknowledge deadline".to_string()],
                full_draft: None,
            }],
            other_notes: Some("Two newsletters skipped.".to_string()),
        }
    }

    #[test]
    fn test_render_populated() {
        let md = render_daily_summary(&populated_summary());
        assert!(md.starts_with("# Daily Email Triage — 2026-08-06"));
        assert!(md.contains("**Thread:** `thr-1`"));
        assert!(md.contains("**Linked tasks:** task-0003"));
        assert!(md.contains("- Acknowledge deadline"));
        assert!(md.contains("Two newsletters skipped."));
    }

    #[test]
    fn test_render_empty_sections() {
        let summary = DailySummary::empty(
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            "No unread emails since the selected time window.",
        );
        let md = render_daily_summary(&summary);
        assert!(md.contains("_No critical emails identified today._"));
        assert!(md.contains("_No suggested responses for today._"));
        assert!(md.contains("No unread emails since the selected time window."));
    }

    #[test]
    fn test_write_reports_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path().to_path_buf());

        let path = write_daily_summary(&config, "# digest").unwrap();
        assert_eq!(path, config.summary_output_path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# digest");

        let date = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let rescan_path = write_rescan_summary(&config, date, "# day").unwrap();
        assert!(rescan_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("2026-08-05"));
    }
}
