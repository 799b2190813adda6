//! Analysis orchestration: the two-pass mailbox + LLM workflow.
//!
//! Pass 1 sees metadata only and decides which bodies are worth fetching;
//! pass 2 sees those bodies and produces the final task operations, sender
//! updates, and the daily summary. Both passes treat the model as an
//! untrusted producer: replies go through the lenient decoder and
//! per-element validation, and a transport or decode failure becomes a
//! fallback summary for the window, never a crash.
//!
//! Two entry points share the per-window step:
//! - `run_daily_analysis`: one window bounded by the persisted watermark
//!   (or an override), unread mail only, may advance the watermark.
//! - `run_rescan_days`: N consecutive day windows, read + unread, folded
//!   oldest to newest so later days see earlier days' reconciled state.
//!   Never touches the watermark; persists once after all windows.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::decode::{
    decode_daily_summary, decode_sender_profiles, decode_task_operations, keep_valid,
};
use crate::llm_client::{call_llm_json, LlmTransport};
use crate::mailbox::Mailbox;
use crate::prompts::{build_pass1_messages, build_pass2_messages};
use crate::reconcile::apply_task_operations;
use crate::senders::merge_sender_updates;
use crate::storage::{self, StorageError};
use crate::types::{
    CriticalEmailEntry, DailySummary, EmailSummary, KnownSendersFile, TasksFile,
};

const PASS1_MAX_TOKENS: u32 = 2000;
const PASS2_MAX_TOKENS: u32 = 2500;
const LLM_TEMPERATURE: f32 = 0.2;

// ============================================================================
// Fallback summary
// ============================================================================

/// The digest produced when a window fails at the LLM stage: one synthetic
/// critical entry carrying the error, and an explicit note that nothing
/// was applied. The run stays readable instead of crashing.
fn fallback_summary(error: &str) -> DailySummary {
    log::error!("LLM failure, returning fallback summary: {}", error);
    DailySummary {
        summary_date: Utc::now().date_naive(),
        critical_emails: vec![CriticalEmailEntry {
            email_id: "(none)".to_string(),
            thread_id: "(none)".to_string(),
            summary: "LLM call failed during analysis.".to_string(),
            reason_critical: error.to_string(),
            recommended_action: "Check logs, API key, and model configuration.".to_string(),
            linked_task_ids: Vec::new(),
        }],
        suggested_responses: Vec::new(),
        other_notes: Some(
            "Analysis failed due to an LLM error; no changes were applied.".to_string(),
        ),
    }
}

// ============================================================================
// Per-window step
// ============================================================================

enum WindowOutcome {
    /// Both passes completed; carries the reconciled state.
    Analyzed {
        tasks: TasksFile,
        senders: KnownSendersFile,
        summary: DailySummary,
    },
    /// LLM or transport failure; the caller's state is untouched.
    Failed(DailySummary),
}

fn string_array(map: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn value_array(map: &serde_json::Map<String, Value>, key: &str) -> Vec<Value> {
    map.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// One pure analysis step over a non-empty set of summaries:
/// `(tasks_in, senders_in, window) -> (tasks_out, senders_out, summary)`.
/// Inputs are borrowed; on failure the caller keeps them as-is.
async fn analyze_window(
    llm: &dyn LlmTransport,
    mailbox: &dyn Mailbox,
    summaries: &[EmailSummary],
    tasks: &TasksFile,
    senders: &KnownSendersFile,
    instructions: &str,
    allow_repair: bool,
) -> WindowOutcome {
    // Pass 1: metadata only.
    let messages1 = build_pass1_messages(summaries, senders, tasks, instructions);
    let raw1 = match call_llm_json(llm, &messages1, PASS1_MAX_TOKENS, LLM_TEMPERATURE, allow_repair)
        .await
    {
        Ok(map) => map,
        Err(e) => return WindowOutcome::Failed(fallback_summary(&e.to_string())),
    };

    let emails_to_expand = string_array(&raw1, "emails_to_expand");
    let preliminary_ops = keep_valid(
        decode_task_operations(value_array(&raw1, "task_ops")),
        "pass-1 task operation",
    );
    log::info!(
        "Pass 1: {} emails to expand, {} preliminary task ops",
        emails_to_expand.len(),
        preliminary_ops.len()
    );

    // Fetch exactly the bodies the model asked for.
    let expanded_bodies = if emails_to_expand.is_empty() {
        Vec::new()
    } else {
        match mailbox.fetch_bodies(&emails_to_expand).await {
            Ok(bodies) => {
                log::info!("Fetched {} email bodies for expansion", bodies.len());
                bodies
            }
            Err(e) => return WindowOutcome::Failed(fallback_summary(&e.to_string())),
        }
    };

    // Pass 2: full bodies; output supersedes the preliminary ops.
    let messages2 = build_pass2_messages(
        &expanded_bodies,
        senders,
        tasks,
        &preliminary_ops,
        instructions,
    );
    let raw2 = match call_llm_json(llm, &messages2, PASS2_MAX_TOKENS, LLM_TEMPERATURE, allow_repair)
        .await
    {
        Ok(map) => map,
        Err(e) => return WindowOutcome::Failed(fallback_summary(&e.to_string())),
    };

    let updated_senders = keep_valid(
        decode_sender_profiles(value_array(&raw2, "updated_senders")),
        "sender profile",
    );
    let final_ops = keep_valid(
        decode_task_operations(value_array(&raw2, "final_task_ops")),
        "pass-2 task operation",
    );

    let raw_summary = raw2
        .get("daily_summary")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let summary = match decode_daily_summary(raw_summary) {
        Ok(summary) => summary,
        Err(e) => {
            return WindowOutcome::Failed(fallback_summary(&format!(
                "daily summary failed validation: {}",
                e
            )))
        }
    };

    let mut tasks_out = tasks.clone();
    let mut senders_out = senders.clone();
    apply_task_operations(&mut tasks_out, &final_ops);
    merge_sender_updates(&mut senders_out, updated_senders);

    WindowOutcome::Analyzed {
        tasks: tasks_out,
        senders: senders_out,
        summary,
    }
}

// ============================================================================
// Daily run
// ============================================================================

/// Full daily pipeline: determine the window, list unread mail, run both
/// passes, reconcile, persist. `update_state` gates the watermark advance;
/// an LLM failure leaves every record file untouched.
pub async fn run_daily_analysis(
    config: &Config,
    mailbox: &dyn Mailbox,
    llm: &dyn LlmTransport,
    since_override: Option<DateTime<Utc>>,
    update_state: bool,
) -> Result<DailySummary, StorageError> {
    log::info!("Starting daily analysis");

    let mut state = storage::load_state(config)?;
    let senders = storage::load_known_senders(config)?;
    let tasks = storage::load_tasks(config)?;
    let instructions = storage::load_instructions(config)?;

    let since = if let Some(since) = since_override {
        log::info!("Using override since-timestamp: {}", since);
        since
    } else if let Some(last_run) = state.last_run_at {
        log::info!("Using last_run_at from state: {}", last_run);
        last_run
    } else {
        let since = Utc::now() - Duration::days(1);
        log::info!("No last_run_at in state; defaulting to last 24 hours");
        since
    };

    let summaries = match mailbox
        .list_summaries_since(since, config.max_emails_per_run)
        .await
    {
        Ok(summaries) => summaries,
        Err(e) => return Ok(fallback_summary(&e.to_string())),
    };
    log::info!("Found {} unread summaries", summaries.len());

    if summaries.is_empty() {
        if update_state {
            state.last_run_at = Some(Utc::now());
            storage::save_state(config, &state)?;
        }
        return Ok(DailySummary::empty(
            Utc::now().date_naive(),
            "No unread emails since the selected time window.",
        ));
    }

    match analyze_window(
        llm,
        mailbox,
        &summaries,
        &tasks,
        &senders,
        &instructions,
        config.llm_repair,
    )
    .await
    {
        WindowOutcome::Failed(fallback) => Ok(fallback),
        WindowOutcome::Analyzed {
            tasks,
            senders,
            summary,
        } => {
            storage::save_tasks(config, &tasks)?;
            storage::save_known_senders(config, &senders)?;
            if update_state {
                state.last_run_at = Some(Utc::now());
                storage::save_state(config, &state)?;
            }
            log::info!(
                "Daily analysis complete: {} critical emails, {} suggested responses, {} tasks total",
                summary.critical_emails.len(),
                summary.suggested_responses.len(),
                tasks.tasks.len()
            );
            Ok(summary)
        }
    }
}

// ============================================================================
// Multi-day rescan
// ============================================================================

/// Day windows from oldest to newest, ending at `today`. Each is
/// `[midnight, next midnight)` in UTC.
fn day_windows(days: u32, today: NaiveDate) -> Vec<(NaiveDate, DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::with_capacity(days as usize);
    for offset in (1..=i64::from(days)).rev() {
        let day = today - Duration::days(offset - 1);
        let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1);
        windows.push((day, start, end));
    }
    windows
}

/// Rescan the past `days` calendar days (read + unread mail), one
/// independent sub-run per day, threading task/sender state forward as an
/// explicit fold. Returns one summary per day that had mail (fallbacks
/// included); days without mail are skipped. The watermark is never
/// touched; tasks and senders are persisted once, at the end.
pub async fn run_rescan_days(
    config: &Config,
    mailbox: &dyn Mailbox,
    llm: &dyn LlmTransport,
    days: u32,
) -> Result<Vec<DailySummary>, StorageError> {
    log::info!("Starting multi-day rescan over the last {} days", days);

    let mut senders = storage::load_known_senders(config)?;
    let mut tasks = storage::load_tasks(config)?;
    let instructions = storage::load_instructions(config)?;

    let mut all_summaries = Vec::new();

    for (day, start, end) in day_windows(days, Utc::now().date_naive()) {
        log::info!("Rescan: processing window {} ({} to {})", day, start, end);

        let summaries = match mailbox
            .list_summaries_between(start, end, config.max_emails_per_run)
            .await
        {
            Ok(summaries) => summaries,
            Err(e) => {
                let mut fallback = fallback_summary(&e.to_string());
                fallback.summary_date = day;
                all_summaries.push(fallback);
                continue;
            }
        };
        log::info!("Rescan: found {} summaries for {}", summaries.len(), day);

        if summaries.is_empty() {
            continue;
        }

        match analyze_window(
            llm,
            mailbox,
            &summaries,
            &tasks,
            &senders,
            &instructions,
            config.llm_repair,
        )
        .await
        {
            WindowOutcome::Failed(mut fallback) => {
                fallback.summary_date = day;
                all_summaries.push(fallback);
            }
            WindowOutcome::Analyzed {
                tasks: tasks_out,
                senders: senders_out,
                mut summary,
            } => {
                // The model's date is not trusted here: the window defines it.
                summary.summary_date = day;
                tasks = tasks_out;
                senders = senders_out;
                all_summaries.push(summary);
            }
        }
    }

    storage::save_tasks(config, &tasks)?;
    storage::save_known_senders(config, &senders)?;

    log::info!(
        "Rescan complete: {} daily summaries, {} tasks total",
        all_summaries.len(),
        tasks.tasks.len()
    );
    Ok(all_summaries)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_windows_oldest_to_newest() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let windows = day_windows(3, today);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].0, NaiveDate::from_ymd_opt(2026, 8, 4).unwrap());
        assert_eq!(windows[1].0, NaiveDate::from_ymd_opt(2026, 8, 5).unwrap());
        assert_eq!(windows[2].0, today);
    }

    #[test]
    fn test_day_windows_are_contiguous_midnight_bounds() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let windows = day_windows(2, today);
        let (_, start0, end0) = windows[0];
        let (_, start1, _) = windows[1];
        assert_eq!(end0, start1);
        assert_eq!(end0 - start0, Duration::days(1));
        assert_eq!(start0.time(), chrono::NaiveTime::MIN);
    }

    #[test]
    fn test_fallback_summary_shape() {
        let fallback = fallback_summary("connection refused");
        assert_eq!(fallback.critical_emails.len(), 1);
        let entry = &fallback.critical_emails[0];
        assert_eq!(entry.email_id, "(none)");
        assert_eq!(entry.reason_critical, "connection refused");
        assert!(fallback.suggested_responses.is_empty());
        assert!(fallback
            .other_notes
            .as_deref()
            .unwrap()
            .contains("no changes were applied"));
    }
}
