//! Core data model: email summaries/bodies, sender profiles, tasks,
//! task operations, and the daily summary.
//!
//! Field names here are the wire contract for the JSON record files
//! (`tasks.json`, `known_senders.json`, `state.json`) and for the JSON the
//! model is asked to emit. Unknown fields are ignored on read so a newer
//! file never breaks an older binary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderImportance {
    High,
    #[default]
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Student,
    Collaborator,
    Admin,
    Family,
    Notification,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Active,
    Cold,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    #[default]
    Email,
    Manual,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOpKind {
    Add,
    Update,
    Close,
}

// ============================================================================
// Email views
// ============================================================================

/// Minimal message metadata fed to the first analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub sender_email: String,
    pub received_at: DateTime<Utc>,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Full body for a message the model asked to expand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailBody {
    pub id: String,
    pub thread_id: String,
    pub body_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
}

// ============================================================================
// Senders and thread policies
// ============================================================================

/// Persistent per-address sender memory. Keyed and deduplicated by `email`;
/// automated merges replace the whole record (never a field patch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub importance: SenderImportance,
    #[serde(default)]
    pub role: SenderRole,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    /// VIP marker. Set from the CLI; a model batch that omits it will reset
    /// it, because merge is whole-record replace.
    #[serde(default)]
    pub pinned: bool,
}

impl SenderProfile {
    pub fn new(email: impl Into<String>) -> Self {
        SenderProfile {
            email: email.into(),
            name: None,
            importance: SenderImportance::default(),
            role: SenderRole::default(),
            notes: String::new(),
            last_seen_at: None,
            pinned: false,
        }
    }
}

/// Per-thread metadata, usually tied to a project or deadline. Persisted
/// alongside senders and given to the model as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPolicy {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// "ME", "THEM", or "NONE": who owes the next move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_next_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ============================================================================
// Tasks and operations
// ============================================================================

fn default_priority() -> u8 {
    5
}

/// A unit of follow-up work, usually born from an email.
///
/// `id` and `created_at` are immutable once assigned; `updated_at` moves
/// forward on every successful mutation. Tasks are never deleted; closing
/// one only flips its status to done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: TaskSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_thread_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// 1–10, higher is more urgent. Range-checked at the decode boundary.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_email_id: Option<String>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Task {
            id: String::new(),
            source: TaskSource::default(),
            email_thread_id: None,
            description: description.into(),
            status: TaskStatus::default(),
            priority: default_priority(),
            due_date: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            origin_email_id: None,
        }
    }
}

/// Sparse patch applied by an UPDATE operation. One optional slot per
/// patchable attribute; absent fields must not overwrite existing values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }
}

/// One instruction mutating the task collection.
///
/// - add:    carries `task`
/// - update: carries `task_id` and `fields`
/// - close:  carries `task_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOperation {
    pub op: TaskOpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<TaskPatch>,
}

impl TaskOperation {
    pub fn add(task: Task) -> Self {
        TaskOperation {
            op: TaskOpKind::Add,
            task_id: None,
            task: Some(task),
            fields: None,
        }
    }

    pub fn update(task_id: impl Into<String>, fields: TaskPatch) -> Self {
        TaskOperation {
            op: TaskOpKind::Update,
            task_id: Some(task_id.into()),
            task: None,
            fields: Some(fields),
        }
    }

    pub fn close(task_id: impl Into<String>) -> Self {
        TaskOperation {
            op: TaskOpKind::Close,
            task_id: Some(task_id.into()),
            task: None,
            fields: None,
        }
    }
}

// ============================================================================
// Daily summary
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalEmailEntry {
    pub email_id: String,
    pub thread_id: String,
    pub summary: String,
    pub reason_critical: String,
    pub recommended_action: String,
    #[serde(default)]
    pub linked_task_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedResponse {
    pub email_id: String,
    #[serde(default)]
    pub draft_outline: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_draft: Option<String>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// The per-window digest handed to the human. Rendered to markdown and
/// discarded, never persisted as structured data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    #[serde(default = "today")]
    pub summary_date: NaiveDate,
    #[serde(default)]
    pub critical_emails: Vec<CriticalEmailEntry>,
    #[serde(default)]
    pub suggested_responses: Vec<SuggestedResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_notes: Option<String>,
}

impl DailySummary {
    pub fn empty(date: NaiveDate, note: impl Into<String>) -> Self {
        DailySummary {
            summary_date: date,
            critical_emails: Vec::new(),
            suggested_responses: Vec::new(),
            other_notes: Some(note.into()),
        }
    }
}

// ============================================================================
// File containers
// ============================================================================

/// Container for `known_senders.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnownSendersFile {
    #[serde(default)]
    pub senders: Vec<SenderProfile>,
    #[serde(default)]
    pub thread_policies: Vec<ThreadPolicy>,
}

/// Container for `tasks.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksFile {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Container for `state.json`, the "since" watermark for the next run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Tests
// ============================================================================
