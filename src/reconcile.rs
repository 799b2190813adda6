//! Task reconciliation: applying add/update/close operations to the task
//! collection.
//!
//! `apply_task_operations` is total and non-throwing per operation: a bad
//! operation is logged and skipped, and the rest of the batch proceeds.
//! Operations come from the model (untrusted) and from CLI commands
//! (trusted); both go through this same path.

use std::collections::HashMap;

use chrono::Utc;

use crate::types::{Task, TaskOpKind, TaskOperation, TaskStatus, TasksFile};

/// Next unused id of the form `task-XXXX`.
///
/// Scans existing ids for the highest numeric suffix and increments. Ids
/// that don't match the pattern (imports, hand-edits) are ignored for the
/// scan but still collision-checked by linear probing.
fn next_task_id(tasks_file: &TasksFile) -> String {
    let max_suffix = tasks_file
        .tasks
        .iter()
        .filter_map(|t| t.id.strip_prefix("task-"))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);

    let mut n = max_suffix + 1;
    loop {
        let candidate = format!("task-{:04}", n);
        if !tasks_file.tasks.iter().any(|t| t.id == candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Apply operations in input order. Each operation either mutates the
/// collection or is skipped with a warning; the collection is never left
/// half-applied by a single bad operation.
pub fn apply_task_operations(tasks_file: &mut TasksFile, ops: &[TaskOperation]) {
    // id → position index, kept in sync as adds land
    let mut index: HashMap<String, usize> = tasks_file
        .tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.id.is_empty())
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    for op in ops {
        match op.op {
            TaskOpKind::Add => {
                let Some(task) = &op.task else {
                    log::warn!("add operation without a task payload; skipping");
                    continue;
                };

                let mut task = task.clone();
                if task.id.is_empty() {
                    task.id = next_task_id(tasks_file);
                } else if index.contains_key(&task.id) {
                    log::warn!(
                        "add operation reuses existing task id {}; skipping",
                        task.id
                    );
                    continue;
                }

                let now = Utc::now();
                task.created_at = now;
                task.updated_at = now;

                log::debug!("adding task {}: {}", task.id, task.description);
                index.insert(task.id.clone(), tasks_file.tasks.len());
                tasks_file.tasks.push(task);
            }

            TaskOpKind::Update => {
                let Some(task_id) = op.task_id.as_deref() else {
                    log::warn!("update operation without task_id; skipping");
                    continue;
                };
                let Some(&pos) = index.get(task_id) else {
                    log::warn!("update operation for unknown task_id={}; skipping", task_id);
                    continue;
                };
                let fields = match &op.fields {
                    Some(fields) if !fields.is_empty() => fields,
                    _ => {
                        log::warn!(
                            "update operation for task_id={} has no fields; skipping",
                            task_id
                        );
                        continue;
                    }
                };

                let task = &mut tasks_file.tasks[pos];
                if let Some(description) = &fields.description {
                    task.description = description.clone();
                }
                if let Some(status) = fields.status {
                    task.status = status;
                }
                if let Some(priority) = fields.priority {
                    task.priority = priority;
                }
                if let Some(due_date) = fields.due_date {
                    task.due_date = Some(due_date);
                }
                task.updated_at = Utc::now();
            }

            TaskOpKind::Close => {
                let Some(task_id) = op.task_id.as_deref() else {
                    log::warn!("close operation without task_id; skipping");
                    continue;
                };
                let Some(&pos) = index.get(task_id) else {
                    log::warn!("close operation for unknown task_id={}; skipping", task_id);
                    continue;
                };

                let task = &mut tasks_file.tasks[pos];
                task.status = TaskStatus::Done;
                task.updated_at = Utc::now();
            }
        }
    }
}

/// Presentation order: open work first, most urgent first, oldest first.
/// Stable for a fixed input.
pub fn sort_tasks_for_display(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        let a_done = a.status == TaskStatus::Done;
        let b_done = b.status == TaskStatus::Done;
        a_done
            .cmp(&b_done)
            .then(b.priority.cmp(&a.priority))
            .then(a.created_at.cmp(&b.created_at))
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskPatch;
    use chrono::{Duration, NaiveDate};

    fn task_with_id(id: &str, description: &str) -> Task {
        let mut task = Task::new(description);
        task.id = id.to_string();
        task
    }

    fn file_with(tasks: Vec<Task>) -> TasksFile {
        TasksFile { tasks }
    }

    #[test]
    fn test_add_assigns_next_id() {
        let mut file = file_with(vec![
            task_with_id("task-0001", "a"),
            task_with_id("task-0007", "b"),
        ]);
        apply_task_operations(&mut file, &[TaskOperation::add(Task::new("new"))]);
        assert_eq!(file.tasks.len(), 3);
        assert_eq!(file.tasks[2].id, "task-0008");
    }

    #[test]
    fn test_add_id_unique_among_foreign_ids() {
        let mut file = file_with(vec![
            task_with_id("JIRA-42", "imported"),
            task_with_id("task-0002", "b"),
        ]);
        apply_task_operations(&mut file, &[TaskOperation::add(Task::new("new"))]);
        let ids: Vec<&str> = file.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.iter().filter(|id| **id == "task-0003").count(), 1);
        assert_eq!(file.tasks.len(), 3);
    }

    #[test]
    fn test_add_without_payload_is_skipped() {
        let mut file = file_with(vec![]);
        let op = TaskOperation {
            op: TaskOpKind::Add,
            task_id: None,
            task: None,
            fields: None,
        };
        apply_task_operations(&mut file, &[op]);
        assert!(file.tasks.is_empty());
    }

    #[test]
    fn test_add_stamps_timestamps() {
        let mut file = file_with(vec![]);
        let mut stale = Task::new("model-supplied timestamps");
        stale.created_at = Utc::now() - Duration::days(400);
        stale.updated_at = stale.created_at;
        apply_task_operations(&mut file, &[TaskOperation::add(stale)]);
        let added = &file.tasks[0];
        assert!(Utc::now() - added.created_at < Duration::seconds(5));
        assert_eq!(added.created_at, added.updated_at);
    }

    #[test]
    fn test_add_duplicate_explicit_id_skipped() {
        let mut file = file_with(vec![task_with_id("task-0001", "original")]);
        apply_task_operations(
            &mut file,
            &[TaskOperation::add(task_with_id("task-0001", "impostor"))],
        );
        assert_eq!(file.tasks.len(), 1);
        assert_eq!(file.tasks[0].description, "original");
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut original = task_with_id("task-0001", "write syllabus");
        original.priority = 4;
        original.due_date = Some(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
        let mut file = file_with(vec![original]);

        let patch = TaskPatch {
            priority: Some(9),
            ..TaskPatch::default()
        };
        apply_task_operations(&mut file, &[TaskOperation::update("task-0001", patch)]);

        let task = &file.tasks[0];
        assert_eq!(task.priority, 9);
        // Untouched fields are byte-identical.
        assert_eq!(task.description, "write syllabus");
        assert_eq!(
            task.due_date,
            Some(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
        );
        assert_eq!(task.status, TaskStatus::Open);
    }

    #[test]
    fn test_update_unknown_id_is_a_noop() {
        let mut file = file_with(vec![task_with_id("task-0001", "a")]);
        let before = file.tasks.clone();
        let patch = TaskPatch {
            description: Some("hijacked".to_string()),
            ..TaskPatch::default()
        };
        apply_task_operations(&mut file, &[TaskOperation::update("task-9999", patch)]);
        assert_eq!(file.tasks, before);
    }

    #[test]
    fn test_update_never_creates() {
        let mut file = file_with(vec![]);
        let patch = TaskPatch {
            description: Some("ghost".to_string()),
            ..TaskPatch::default()
        };
        apply_task_operations(&mut file, &[TaskOperation::update("task-0001", patch)]);
        assert!(file.tasks.is_empty());
    }

    #[test]
    fn test_update_empty_patch_skipped() {
        let mut file = file_with(vec![task_with_id("task-0001", "a")]);
        let updated_before = file.tasks[0].updated_at;
        apply_task_operations(
            &mut file,
            &[TaskOperation::update("task-0001", TaskPatch::default())],
        );
        assert_eq!(file.tasks[0].updated_at, updated_before);
    }

    #[test]
    fn test_close_marks_done_and_keeps_record() {
        let mut file = file_with(vec![task_with_id("task-0001", "a")]);
        apply_task_operations(&mut file, &[TaskOperation::close("task-0001")]);
        assert_eq!(file.tasks.len(), 1);
        assert_eq!(file.tasks[0].status, TaskStatus::Done);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut file = file_with(vec![task_with_id("task-0001", "a")]);
        apply_task_operations(&mut file, &[TaskOperation::close("task-0001")]);
        let once = file.tasks[0].clone();
        apply_task_operations(&mut file, &[TaskOperation::close("task-0001")]);
        let twice = &file.tasks[0];
        // Same status and content; only updated_at moves.
        assert_eq!(twice.status, once.status);
        assert_eq!(twice.description, once.description);
        assert_eq!(twice.created_at, once.created_at);
        assert_eq!(file.tasks.len(), 1);
    }

    #[test]
    fn test_close_unknown_id_is_a_noop() {
        let mut file = file_with(vec![task_with_id("task-0001", "a")]);
        let before = file.tasks.clone();
        apply_task_operations(&mut file, &[TaskOperation::close("task-0404")]);
        assert_eq!(file.tasks, before);
    }

    #[test]
    fn test_one_bad_operation_does_not_block_the_rest() {
        let mut file = file_with(vec![task_with_id("task-0001", "a")]);
        let ops = vec![
            TaskOperation::close("task-9999"), // unknown: skipped
            TaskOperation::add(Task::new("still lands")),
            TaskOperation::close("task-0001"),
        ];
        apply_task_operations(&mut file, &ops);
        assert_eq!(file.tasks.len(), 2);
        assert_eq!(file.tasks[0].status, TaskStatus::Done);
        assert_eq!(file.tasks[1].description, "still lands");
    }

    #[test]
    fn test_add_then_update_in_same_batch() {
        let mut file = file_with(vec![]);
        let ops = vec![
            TaskOperation::add(Task::new("first")),
            TaskOperation::update(
                "task-0001",
                TaskPatch {
                    priority: Some(10),
                    ..TaskPatch::default()
                },
            ),
        ];
        apply_task_operations(&mut file, &ops);
        assert_eq!(file.tasks[0].priority, 10);
    }

    #[test]
    fn test_display_order() {
        let mut done = task_with_id("task-0001", "done");
        done.status = TaskStatus::Done;
        done.priority = 10;

        let mut low = task_with_id("task-0002", "low");
        low.priority = 2;
        low.created_at = Utc::now() - Duration::days(2);

        let mut high = task_with_id("task-0003", "high");
        high.priority = 8;

        let mut tied = task_with_id("task-0004", "tied-but-older");
        tied.priority = 2;
        tied.created_at = Utc::now() - Duration::days(5);

        let mut tasks = vec![done.clone(), low.clone(), high.clone(), tied.clone()];
        sort_tasks_for_display(&mut tasks);

        let order: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["task-0003", "task-0004", "task-0002", "task-0001"]);

        // Reproducible: sorting again changes nothing.
        let snapshot = tasks.clone();
        sort_tasks_for_display(&mut tasks);
        assert_eq!(tasks, snapshot);
    }
}
