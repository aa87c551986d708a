//! Derives the dedup'd `PresenceSnapshot` of spec §4.5 from a session's raw
//! membership, plus the idle/evict threshold checks the hub applies on each
//! `HeartbeatTick`.

use tokio::time::{Duration, Instant};

use crate::protocol::PresenceUser;

/// One connection's contribution to a session's presence snapshot, before
/// dedup-by-user.
#[derive(Debug, Clone)]
pub struct PresenceMember {
    /// Opaque user id.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Optional avatar hint.
    pub avatar: Option<String>,
    /// Whether this particular connection is idle.
    pub idle: bool,
}

/// Build the ordered, deduplicated-by-`user_id` snapshot spec §4.5
/// describes: a user with several live connections appears once, `idle`
/// only if every one of their connections is idle.
#[must_use]
pub fn build_snapshot(members: &[PresenceMember]) -> Vec<PresenceUser> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: std::collections::HashMap<String, PresenceUser> = std::collections::HashMap::new();

    for member in members {
        merged
            .entry(member.user_id.clone())
            .and_modify(|existing| {
                existing.idle = existing.idle && member.idle;
                if existing.avatar.is_none() {
                    existing.avatar.clone_from(&member.avatar);
                }
            })
            .or_insert_with(|| {
                order.push(member.user_id.clone());
                PresenceUser {
                    id: member.user_id.clone(),
                    name: member.name.clone(),
                    avatar: member.avatar.clone(),
                    idle: member.idle,
                }
            });
    }

    order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect()
}

/// Whether a subscriber silent since `last_activity` should flip to idle.
#[must_use]
pub fn should_flip_idle(last_activity: Instant, idle_after: Duration) -> bool {
    last_activity.elapsed() >= idle_after
}

/// Whether a subscriber silent since `last_activity` should be evicted.
#[must_use]
pub fn should_evict(last_activity: Instant, evict_after: Duration) -> bool {
    last_activity.elapsed() >= evict_after
}
