//! Per-element validation of model output.
//!
//! The lenient layer (`lenient_json`) turns a reply into one JSON object;
//! this layer turns the arrays inside it into typed values. Each element is
//! decoded independently into `Decoded::Ok` or `Decoded::Dropped`; one
//! malformed entry never invalidates the batch, and partial success is the
//! normal case, not an error path.
//!
//! Task operations get a normalization pass first, because models are
//! inconsistent about shape: `operation` for `op`, mixed-case op values,
//! null timestamps inside task payloads, and updates expressed as a full
//! embedded task instead of `task_id` + `fields`.

use serde_json::{Map, Value};

use crate::types::{DailySummary, SenderProfile, TaskOperation};

/// Outcome of decoding one array element.
#[derive(Debug)]
pub enum Decoded<T> {
    Ok(T),
    Dropped(String),
}

/// Collect the valid elements, logging one warning per drop.
pub fn keep_valid<T>(decoded: Vec<Decoded<T>>, what: &str) -> Vec<T> {
    let mut kept = Vec::with_capacity(decoded.len());
    for item in decoded {
        match item {
            Decoded::Ok(value) => kept.push(value),
            Decoded::Dropped(reason) => {
                log::warn!("Dropping invalid {}: {}", what, reason);
            }
        }
    }
    kept
}

// ============================================================================
// Task operations
// ============================================================================

const PATCHABLE_KEYS: [&str; 4] = ["description", "status", "priority", "due_date"];

/// Rewrite a raw task-operation mapping into the canonical shape.
///
/// - `operation` is accepted as a synonym for `op`; op values lowercase.
/// - Null timestamps inside the task payload are removed so defaults apply.
/// - An update carrying only an embedded task derives `task_id` from the
///   task's `id` and synthesizes `fields` from its patchable keys.
fn normalize_task_op(raw: Value) -> Value {
    let mut op_map = match raw {
        Value::Object(map) => map,
        other => return other,
    };

    if !op_map.contains_key("op") {
        if let Some(synonym) = op_map.remove("operation") {
            op_map.insert("op".to_string(), synonym);
        }
    }

    if let Some(Value::String(op)) = op_map.get("op") {
        let lowered = op.to_lowercase();
        op_map.insert("op".to_string(), Value::String(lowered));
    }

    let is_update = matches!(op_map.get("op"), Some(Value::String(op)) if op == "update");

    if let Some(Value::Object(task)) = op_map.get_mut("task") {
        for ts_key in ["created_at", "updated_at"] {
            if matches!(task.get(ts_key), Some(Value::Null)) {
                task.remove(ts_key);
            }
        }
    }

    if is_update {
        let (derived_id, derived_fields) = match op_map.get("task") {
            Some(Value::Object(task)) => {
                let id = task.get("id").cloned();
                let mut fields = Map::new();
                for key in PATCHABLE_KEYS {
                    if let Some(value) = task.get(key) {
                        fields.insert(key.to_string(), value.clone());
                    }
                }
                (id, fields)
            }
            _ => (None, Map::new()),
        };

        if !op_map.contains_key("task_id") {
            if let Some(id) = derived_id {
                op_map.insert("task_id".to_string(), id);
            }
        }
        if !op_map.contains_key("fields") && !derived_fields.is_empty() {
            op_map.insert("fields".to_string(), Value::Object(derived_fields));
        }
    }

    Value::Object(op_map)
}

fn priority_in_range(priority: u8) -> bool {
    (1..=10).contains(&priority)
}

/// Decode one raw task operation: normalize, deserialize, range-check.
pub fn decode_task_operation(raw: Value) -> Decoded<TaskOperation> {
    let normalized = normalize_task_op(raw);
    let op: TaskOperation = match serde_json::from_value(normalized) {
        Ok(op) => op,
        Err(e) => return Decoded::Dropped(e.to_string()),
    };

    if let Some(task) = &op.task {
        if !priority_in_range(task.priority) {
            return Decoded::Dropped(format!(
                "task priority {} outside 1-10",
                task.priority
            ));
        }
    }
    if let Some(fields) = &op.fields {
        if let Some(priority) = fields.priority {
            if !priority_in_range(priority) {
                return Decoded::Dropped(format!("patch priority {} outside 1-10", priority));
            }
        }
    }

    Decoded::Ok(op)
}

/// Decode every element of a `task_ops` array.
pub fn decode_task_operations(raw: Vec<Value>) -> Vec<Decoded<TaskOperation>> {
    raw.into_iter().map(decode_task_operation).collect()
}

// ============================================================================
// Sender profiles
// ============================================================================

pub fn decode_sender_profiles(raw: Vec<Value>) -> Vec<Decoded<SenderProfile>> {
    raw.into_iter()
        .map(|value| match serde_json::from_value(value) {
            Ok(profile) => Decoded::Ok(profile),
            Err(e) => Decoded::Dropped(e.to_string()),
        })
        .collect()
}

// ============================================================================
// Daily summary
// ============================================================================

/// The daily summary is all-or-nothing: a reply whose summary doesn't
/// validate fails the window (the orchestrator falls back).
pub fn decode_daily_summary(raw: Value) -> Result<DailySummary, String> {
    serde_json::from_value(raw).map_err(|e| e.to_string())
}

// ============================================================================
// Tests
// ============================================================================
