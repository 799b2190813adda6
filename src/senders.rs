//! Sender profile merging.
//!
//! Model-proposed profiles replace the stored record wholesale, keyed by
//! email. This is deliberately not a field patch: the model re-emits the
//! complete profile it believes in, and a batch that omits a field resets
//! that field to its default, `pinned` included. The CLI `set-sender`
//! command is the field-level path for trusted edits.

use std::collections::HashMap;

use crate::types::{KnownSendersFile, SenderImportance, SenderProfile};

/// Merge updates into the known-sender set. Updates without an email are
/// dropped with a warning; within one batch the last write per email wins.
/// Existing profiles keep their position; new senders append in update
/// order, so the result is deterministic for a fixed input.
pub fn merge_sender_updates(known: &mut KnownSendersFile, updates: Vec<SenderProfile>) {
    let mut index: HashMap<String, usize> = known
        .senders
        .iter()
        .enumerate()
        .map(|(i, s)| (s.email.clone(), i))
        .collect();

    for update in updates {
        if update.email.is_empty() {
            log::warn!("sender profile without an email address; skipping");
            continue;
        }

        match index.get(&update.email) {
            Some(&pos) => {
                known.senders[pos] = update;
            }
            None => {
                index.insert(update.email.clone(), known.senders.len());
                known.senders.push(update);
            }
        }
    }
}

/// Presentation order for the senders table: high importance first, then
/// pinned, then email.
pub fn sort_senders_for_display(senders: &mut [SenderProfile]) {
    senders.sort_by(|a, b| {
        let a_key = (a.importance != SenderImportance::High, !a.pinned);
        let b_key = (b.importance != SenderImportance::High, !b.pinned);
        a_key
            .cmp(&b_key)
            .then_with(|| a.email.to_lowercase().cmp(&b.email.to_lowercase()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SenderRole;

    fn known_with(senders: Vec<SenderProfile>) -> KnownSendersFile {
        KnownSendersFile {
            senders,
            thread_policies: Vec::new(),
        }
    }

    #[test]
    fn test_insert_new_sender() {
        let mut known = known_with(vec![]);
        merge_sender_updates(&mut known, vec![SenderProfile::new("alice@example.org")]);
        assert_eq!(known.senders.len(), 1);
        assert_eq!(known.senders[0].email, "alice@example.org");
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut pinned = SenderProfile::new("dean@university.edu");
        pinned.pinned = true;
        pinned.notes = "never miss these".to_string();
        let mut known = known_with(vec![pinned]);

        // Model batch re-emits the profile without `pinned` or notes;
        // whole-record replace means both reset to their defaults.
        let mut update = SenderProfile::new("dean@university.edu");
        update.importance = SenderImportance::High;
        merge_sender_updates(&mut known, vec![update]);

        assert_eq!(known.senders.len(), 1);
        let merged = &known.senders[0];
        assert_eq!(merged.importance, SenderImportance::High);
        assert!(!merged.pinned);
        assert!(merged.notes.is_empty());
    }

    #[test]
    fn test_last_write_wins_within_batch() {
        let mut known = known_with(vec![]);
        let mut first = SenderProfile::new("bob@example.org");
        first.role = SenderRole::Student;
        let mut second = SenderProfile::new("bob@example.org");
        second.role = SenderRole::Admin;

        merge_sender_updates(&mut known, vec![first, second]);
        assert_eq!(known.senders.len(), 1);
        assert_eq!(known.senders[0].role, SenderRole::Admin);
    }

    #[test]
    fn test_empty_email_dropped() {
        let mut known = known_with(vec![SenderProfile::new("keep@example.org")]);
        merge_sender_updates(&mut known, vec![SenderProfile::new("")]);
        assert_eq!(known.senders.len(), 1);
        assert_eq!(known.senders[0].email, "keep@example.org");
    }

    #[test]
    fn test_existing_keep_position_new_append() {
        let mut known = known_with(vec![
            SenderProfile::new("a@x.org"),
            SenderProfile::new("b@x.org"),
        ]);
        let mut replacement = SenderProfile::new("a@x.org");
        replacement.name = Some("Aye".to_string());
        merge_sender_updates(
            &mut known,
            vec![replacement, SenderProfile::new("c@x.org")],
        );

        let emails: Vec<&str> = known.senders.iter().map(|s| s.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.org", "b@x.org", "c@x.org"]);
        assert_eq!(known.senders[0].name.as_deref(), Some("Aye"));
    }

    #[test]
    fn test_display_sort() {
        let mut normal = SenderProfile::new("zed@x.org");
        normal.importance = SenderImportance::Normal;

        let mut high = SenderProfile::new("mid@x.org");
        high.importance = SenderImportance::High;

        let mut pinned = SenderProfile::new("anne@x.org");
        pinned.pinned = true;

        let mut senders = vec![normal, high, pinned];
        sort_senders_for_display(&mut senders);

        let emails: Vec<&str> = senders.iter().map(|s| s.email.as_str()).collect();
        assert_eq!(emails, vec!["mid@x.org", "anne@x.org", "zed@x.org"]);
    }
}
