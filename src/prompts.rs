//! Prompt builders for the two analysis passes, the instructions
//! refinement flow, and the JSON repair fallback.
//!
//! Every prompt demands a single JSON object back and spells out the exact
//! keys; the decode layer still treats the reply as untrusted.

use serde_json::json;

use crate::llm_client::ChatMessage;
use crate::types::{EmailBody, EmailSummary, KnownSendersFile, TaskOperation, TasksFile};

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

// ============================================================================
// Pass 1: metadata only
// ============================================================================

pub fn build_pass1_messages(
    unread_summaries: &[EmailSummary],
    known_senders: &KnownSendersFile,
    tasks: &TasksFile,
    instructions_text: &str,
) -> Vec<ChatMessage> {
    let system = "\
You are an email triage assistant. You are given summaries of unread emails, \
metadata about known senders, and the current task list. Decide which emails \
matter and which tasks should be added, updated, or closed.\n\n\
A block of user instructions describes the user's preferences and \
priorities. Always follow those instructions when judging importance and \
proposing tasks.\n\n\
CRITICAL RULES:\n\
1. Output a single JSON object and nothing else.\n\
2. The object has exactly these keys:\n\
   - \"emails_to_expand\": array of message IDs (strings) whose full text you need\n\
   - \"task_ops\": array of task operation objects\n\
3. Task operations:\n\
   - op: one of \"add\", \"update\", \"close\" (lowercase)\n\
   - op=\"add\": include a 'task' object with the relevant fields.\n\
   - op=\"update\": include 'task_id' and 'fields' (partial update).\n\
   - op=\"close\": include 'task_id'.\n\
4. No comments or explanations inside the JSON.";

    let payload = json!({
        "instructions_text": instructions_text,
        "unread_summaries": unread_summaries,
        "known_senders": known_senders,
        "tasks": tasks,
    });

    let user = format!(
        "Here is the current state, today's unread email summaries, and my \
instructions/preferences.\n\nInput JSON:\n{}\n\n\
Decide which message IDs need their full text to reason about accurately \
today, and propose initial task operations.\n\
Remember: respond with ONLY the JSON object.",
        pretty(&payload)
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(user),
    ]
}

// ============================================================================
// Pass 2: full bodies
// ============================================================================

pub fn build_pass2_messages(
    expanded_emails: &[EmailBody],
    known_senders: &KnownSendersFile,
    tasks: &TasksFile,
    preliminary_task_ops: &[TaskOperation],
    instructions_text: &str,
) -> Vec<ChatMessage> {
    let system = "\
You are an email triage assistant performing a second, deeper analysis. You \
now have the full bodies of selected emails. Using these plus the task list, \
known senders, and the user's instructions, you must:\n\
1. Refine the task operations from the first pass.\n\
2. Update sender profiles where needed (importance, role, notes, ...).\n\
3. Produce a daily summary of critical emails and suggested responses.\n\n\
Always follow the user's instructions/preferences when deciding what is \
important or which tasks to create or prioritize.\n\n\
CRITICAL RULES:\n\
1. Output a single JSON object and nothing else.\n\
2. The object has exactly these keys:\n\
   - \"updated_senders\": array of sender profile objects\n\
   - \"final_task_ops\": array of task operation objects\n\
   - \"daily_summary\": a daily summary object\n\
3. Do not invent task_ids; for new tasks in add operations leave 'id' empty \
or null and the system will assign one.\n\
4. The daily summary must include:\n\
   - summary_date: ISO date string (YYYY-MM-DD)\n\
   - critical_emails: array of objects with keys email_id, thread_id, \
summary, reason_critical, recommended_action, linked_task_ids\n\
   - suggested_responses: array of objects with keys email_id, draft_outline \
(array of strings), full_draft (optional)\n\
   - other_notes: optional string\n\
5. Never put raw newline characters inside a string value. Encode line \
breaks as '\\n', or use an array of strings (like draft_outline) for \
multi-paragraph text.\n\
6. No comments or explanations inside the JSON.";

    let payload = json!({
        "instructions_text": instructions_text,
        "expanded_emails": expanded_emails,
        "known_senders": known_senders,
        "tasks": tasks,
        "preliminary_task_ops": preliminary_task_ops,
    });

    let user = format!(
        "Here are the full bodies of selected emails, my instructions, the \
current state, and the preliminary task operations from the first pass.\n\n\
Input JSON:\n{}\n\n\
Refine the task operations, update sender profiles, and produce the daily \
summary as specified.\n\
Remember: respond with ONLY the JSON object.",
        pretty(&payload)
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(user),
    ]
}

// ============================================================================
// Instructions refinement
// ============================================================================

pub fn build_instructions_update_messages(
    current_instructions: &str,
    feedback: &str,
) -> Vec<ChatMessage> {
    let system = "\
You are helping a user refine the standing instructions for an email triage \
assistant. The assistant reads email summaries and bodies, uses metadata \
about known senders, and maintains a task list.\n\n\
You will be given:\n\
  1) The current instructions text.\n\
  2) The user's free-form feedback after a run.\n\n\
Produce a better instructions text that incorporates the feedback while \
staying clear and concise, written as plain English suitable for a text \
file injected into future runs.\n\n\
CRITICAL RULES:\n\
1. Output a single JSON object of the form: { \"instructions\": \"...\" }\n\
2. The value must be one string containing the full new instructions.\n\
3. No commentary or additional keys.";

    let user = format!(
        "Here are the current instructions and my feedback.\n\n\
CURRENT INSTRUCTIONS:\n---------------------\n{}\n\n\
USER FEEDBACK:\n--------------\n{}\n\n\
Please produce improved instructions as described.",
        current_instructions, feedback
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(user),
    ]
}

// ============================================================================
// JSON repair
// ============================================================================

/// One-shot repair prompt used when a reply failed strict parsing and the
/// repair capability is enabled.
pub fn build_json_repair_messages(broken: &str) -> Vec<ChatMessage> {
    let system = "\
You fix malformed JSON. You will be given text that was supposed to be a \
single JSON object but does not parse. Re-emit the same data as one valid \
JSON object. Do not add, remove, or reinterpret content; do not add \
commentary or code fences.";

    let user = format!("Fix this so it parses as a single JSON object:\n\n{}", broken);

    vec![
        ChatMessage::system(system),
        ChatMessage::user(user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SenderProfile, Task};
    use chrono::Utc;

    fn sample_summary() -> EmailSummary {
        EmailSummary {
            id: "msg-1".to_string(),
            thread_id: "thr-1".to_string(),
            sender_name: Some("Alice".to_string()),
            sender_email: "alice@example.org".to_string(),
            received_at: Utc::now(),
            subject: "Thesis draft".to_string(),
            snippet: Some("Attached is my latest...".to_string()),
        }
    }

    #[test]
    fn test_pass1_carries_state_and_instructions() {
        let senders = KnownSendersFile {
            senders: vec![SenderProfile::new("alice@example.org")],
            thread_policies: Vec::new(),
        };
        let tasks = TasksFile {
            tasks: vec![{
                let mut t = Task::new("Review thesis chapter 2");
                t.id = "task-0001".to_string();
                t
            }],
        };

        let messages =
            build_pass1_messages(&[sample_summary()], &senders, &tasks, "students first");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("emails_to_expand"));
        assert!(messages[1].content.contains("students first"));
        assert!(messages[1].content.contains("alice@example.org"));
        assert!(messages[1].content.contains("task-0001"));
    }

    #[test]
    fn test_pass2_carries_preliminary_ops() {
        let ops = vec![TaskOperation::close("task-0002")];
        let bodies = vec![EmailBody {
            id: "msg-1".to_string(),
            thread_id: "thr-1".to_string(),
            body_text: "Please review by Friday".to_string(),
            body_html: None,
        }];
        let messages = build_pass2_messages(
            &bodies,
            &KnownSendersFile::default(),
            &TasksFile::default(),
            &ops,
            "",
        );
        assert!(messages[0].content.contains("final_task_ops"));
        assert!(messages[1].content.contains("task-0002"));
        assert!(messages[1].content.contains("Please review by Friday"));
    }

    #[test]
    fn test_instructions_update_includes_both_texts() {
        let messages = build_instructions_update_messages("old rules", "more newsletters");
        assert!(messages[1].content.contains("old rules"));
        assert!(messages[1].content.contains("more newsletters"));
    }
}
