//! Near-identical message detection.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::info;

use crate::models::Message;

/// Default window, in seconds, within which repeated messages are duplicates.
pub const DEFAULT_DUPLICATE_WINDOW: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DuplicateKey {
    content_hash: String,
    from: String,
    to: String,
    task: String,
    kind: String,
}

impl DuplicateKey {
    fn of(message: &Message) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(message.message.as_bytes());
        Self {
            content_hash: format!("{:x}", hasher.finalize()),
            from: message.from_agent_id.clone(),
            to: message.to_agent_id.clone(),
            task: message.task_id.clone().unwrap_or_default(),
            kind: message.message_type.as_str().to_string(),
        }
    }
}

/// Flag repeated messages.
///
/// Messages sharing content, sender, recipient, task and type are grouped.
/// Within a group, a cluster starts at the earliest unclaimed message and takes
/// every later message at most `window_secs` after it. Clusters of two or more
/// share a `dup_group_{n}` id and a member count; all members but the first are
/// flagged as duplicates. Message order is preserved.
pub fn mark_duplicates(mut messages: Vec<Message>, window_secs: f64) -> Vec<Message> {
    let mut order: Vec<DuplicateKey> = Vec::new();
    let mut groups: HashMap<DuplicateKey, Vec<usize>> = HashMap::new();
    for (idx, message) in messages.iter().enumerate() {
        let key = DuplicateKey::of(message);
        let members = groups.entry(key.clone()).or_default();
        if members.is_empty() {
            order.push(key);
        }
        members.push(idx);
    }

    let window_ms = (window_secs * 1000.0).round() as i64;
    let mut clusters = 0usize;
    for key in &order {
        let Some(members) = groups.get_mut(key) else {
            continue;
        };
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(|&idx| messages[idx].timestamp);

        let mut start = 0;
        while start < members.len() {
            let anchor = messages[members[start]].timestamp;
            let mut end = start + 1;
            while end < members.len()
                && (messages[members[end]].timestamp - anchor).num_milliseconds() <= window_ms
            {
                end += 1;
            }

            let cluster = &members[start..end];
            if cluster.len() > 1 {
                clusters += 1;
                let group_id = format!("dup_group_{}", clusters);
                for (pos, &idx) in cluster.iter().enumerate() {
                    let message = &mut messages[idx];
                    message.is_duplicate = pos > 0;
                    message.duplicate_group_id = Some(group_id.clone());
                    message.duplicate_count = cluster.len();
                }
            }
            start = end;
        }
    }

    info!(groups = clusters, "detected duplicate message groups");
    messages
}
