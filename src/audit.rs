//! Audit trail for claim transitions, per spec §4.6.
//!
//! Plain (non-async) trait, mirroring the teacher's `Logger` seam: the hub
//! calls straight through on its own task, so nothing here may block or
//! fail — a real deployment that needs a durable audit store wraps the
//! actual write in its own background task and treats this call as a
//! fire-and-forget enqueue.

use crate::protocol::ClaimedReason;

/// Receives one notification per claim-state transition a session hub
/// makes. Implementations must not block the calling hub task.
pub trait AuditSink: Send + Sync {
    /// A claim was acquired or renewed.
    fn claim_acquired(&self, session_name: &str, user_id: &str, reason: Option<ClaimedReason>);

    /// A claim was voluntarily released, or released because its holder's
    /// last connection disconnected. `cause` is a short, fixed label
    /// (`"released"` or `"holder_gone"`), not user-facing text.
    fn claim_released(&self, session_name: &str, user_id: &str, cause: &str);

    /// An admin+ forcibly released someone else's claim.
    fn forced_release(&self, session_name: &str, actor_user_id: &str);

    /// A claim lease expired (hard lease or idle watchdog) without renewal.
    fn claim_expired(&self, session_name: &str);

    /// The hub's multiplexer attachment failed and the session tore down.
    fn session_lost(&self, session_name: &str);
}

/// Writes every audit event to the process log at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAuditSink;

impl AuditSink for LoggingAuditSink {
    fn claim_acquired(&self, session_name: &str, user_id: &str, reason: Option<ClaimedReason>) {
        match reason {
            None => log::info!("claim acquired: session={session_name} user={user_id}"),
            Some(ClaimedReason::Renewed) => {
                log::info!("claim renewed: session={session_name} user={user_id}");
            }
            Some(ClaimedReason::Preempted) => {
                log::info!("claim preempted: session={session_name} user={user_id}");
            }
        }
    }

    fn claim_released(&self, session_name: &str, user_id: &str, cause: &str) {
        log::info!("claim released: session={session_name} user={user_id} cause={cause}");
    }

    fn forced_release(&self, session_name: &str, actor_user_id: &str) {
        log::info!("claim force-released: session={session_name} actor={actor_user_id}");
    }

    fn claim_expired(&self, session_name: &str) {
        log::info!("claim expired: session={session_name}");
    }

    fn session_lost(&self, session_name: &str) {
        log::warn!("session lost: session={session_name}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAuditSink {
        events: Mutex<Vec<String>>,
    }

    impl AuditSink for RecordingAuditSink {
        fn claim_acquired(&self, session_name: &str, user_id: &str, reason: Option<ClaimedReason>) {
            self.events.lock().unwrap().push(format!("acquired:{session_name}:{user_id}:{reason:?}"));
        }

        fn claim_released(&self, session_name: &str, user_id: &str, cause: &str) {
            self.events.lock().unwrap().push(format!("released:{session_name}:{user_id}:{cause}"));
        }

        fn forced_release(&self, session_name: &str, actor_user_id: &str) {
            self.events.lock().unwrap().push(format!("forced:{session_name}:{actor_user_id}"));
        }

        fn claim_expired(&self, session_name: &str) {
            self.events.lock().unwrap().push(format!("expired:{session_name}"));
        }

        fn session_lost(&self, session_name: &str) {
            self.events.lock().unwrap().push(format!("lost:{session_name}"));
        }
    }

    #[test]
    fn recording_sink_captures_each_event_kind() {
        let sink = RecordingAuditSink::default();
        sink.claim_acquired("s1", "alice", None);
        sink.claim_released("s1", "alice", "released");
        sink.forced_release("s1", "carol");
        sink.claim_expired("s1");
        sink.session_lost("s1");
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], "acquired:s1:alice:None");
    }

    #[test]
    fn logging_sink_does_not_panic() {
        let sink = LoggingAuditSink;
        sink.claim_acquired("s1", "alice", Some(ClaimedReason::Renewed));
        sink.claim_released("s1", "alice", "released");
        sink.forced_release("s1", "carol");
        sink.claim_expired("s1");
        sink.session_lost("s1");
    }
}
