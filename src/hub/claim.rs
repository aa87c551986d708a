//! The claim state machine of spec §4.4, embedded in the session hub and
//! driven single-threaded through its inbox — no locks needed here.

use tokio::time::{Duration, Instant};

use crate::authority::{self, Action, Role};
use crate::error::WireError;
use crate::protocol::ClaimedReason;

/// A granted claim: who holds it, and since/until when.
#[derive(Debug, Clone)]
pub struct Held {
    /// Opaque id of the current holder.
    pub holder_user_id: String,
    /// Display name of the current holder.
    pub holder_name: String,
    /// When this lease (including renewals) was first acquired.
    pub acquired_at: Instant,
    /// Hard lease expiry; exceeding this fires `ClaimExpired` regardless of
    /// activity.
    pub expires_at: Instant,
    /// Last time input or an explicit renewal refreshed this claim; checked
    /// against `ClaimIdleMax` on every heartbeat.
    pub last_activity: Instant,
    /// Number of renewals since first acquisition (reset on preemption).
    pub renewals: u32,
}

/// Tagged variant of spec §3: exactly one `Held` per session at any instant.
#[derive(Debug, Clone)]
pub enum ClaimState {
    /// No one currently holds the claim.
    Unclaimed,
    /// Exactly one holder, with a live lease.
    Held(Held),
}

/// Outcome of a `claim` attempt, driving which frames the hub broadcasts.
#[derive(Debug)]
pub enum ClaimAttempt {
    /// Granted — first acquisition, a renewal, or a preemption.
    Granted {
        /// `None` for a first-time acquisition.
        reason: Option<ClaimedReason>,
        /// Set only on preemption: the `userId` just displaced.
        preempted_holder: Option<String>,
    },
    /// Denied; the wire error to reply to the requester with.
    Denied(WireError),
}

/// Embedded per-session claim arbiter.
#[derive(Debug)]
pub struct ClaimArbiter {
    state: ClaimState,
}

impl Default for ClaimArbiter {
    fn default() -> Self {
        Self { state: ClaimState::Unclaimed }
    }
}

impl ClaimArbiter {
    /// Construct an arbiter with no claim held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &ClaimState {
        &self.state
    }

    /// Attempt to acquire, renew, or preempt the claim on behalf of
    /// `actor_user_id`, per the transition table in spec §4.4.
    pub fn claim(
        &mut self,
        actor_user_id: &str,
        actor_name: &str,
        actor_role: Role,
        lease_max: Duration,
    ) -> ClaimAttempt {
        match &self.state {
            ClaimState::Unclaimed => {
                if !authority::allowed(actor_role, Action::Claim) {
                    return ClaimAttempt::Denied(WireError::Forbidden);
                }
                let now = Instant::now();
                self.state = ClaimState::Held(Held {
                    holder_user_id: actor_user_id.to_owned(),
                    holder_name: actor_name.to_owned(),
                    acquired_at: now,
                    expires_at: now + lease_max,
                    last_activity: now,
                    renewals: 0,
                });
                ClaimAttempt::Granted { reason: None, preempted_holder: None }
            }
            ClaimState::Held(held) if held.holder_user_id == actor_user_id => {
                let now = Instant::now();
                let renewals = held.renewals + 1;
                let acquired_at = held.acquired_at;
                self.state = ClaimState::Held(Held {
                    holder_user_id: actor_user_id.to_owned(),
                    holder_name: actor_name.to_owned(),
                    acquired_at,
                    expires_at: now + lease_max,
                    last_activity: now,
                    renewals,
                });
                ClaimAttempt::Granted { reason: Some(ClaimedReason::Renewed), preempted_holder: None }
            }
            ClaimState::Held(held) => {
                if authority::allowed(actor_role, Action::Preempt) {
                    let preempted_holder = held.holder_user_id.clone();
                    let now = Instant::now();
                    self.state = ClaimState::Held(Held {
                        holder_user_id: actor_user_id.to_owned(),
                        holder_name: actor_name.to_owned(),
                        acquired_at: now,
                        expires_at: now + lease_max,
                        last_activity: now,
                        renewals: 0,
                    });
                    ClaimAttempt::Granted {
                        reason: Some(ClaimedReason::Preempted),
                        preempted_holder: Some(preempted_holder),
                    }
                } else {
                    ClaimAttempt::Denied(WireError::Locked { held_by: held.holder_user_id.clone() })
                }
            }
        }
    }

    /// Voluntary release by the current holder. `false` if `actor_user_id`
    /// isn't the holder (the caller should reply `NOT_HOLDER`).
    pub fn release(&mut self, actor_user_id: &str) -> bool {
        if matches!(&self.state, ClaimState::Held(h) if h.holder_user_id == actor_user_id) {
            self.state = ClaimState::Unclaimed;
            true
        } else {
            false
        }
    }

    /// Admin+ force release. `false` if nothing was held, or `actor_role`
    /// lacks authority.
    pub fn force_release(&mut self, actor_role: Role) -> bool {
        if !authority::allowed(actor_role, Action::ForceRelease) {
            return false;
        }
        if matches!(self.state, ClaimState::Held(_)) {
            self.state = ClaimState::Unclaimed;
            true
        } else {
            false
        }
    }

    /// Timer-driven expiry (hard lease or idle). `false` if nothing was held.
    pub fn expire(&mut self) -> bool {
        if matches!(self.state, ClaimState::Held(_)) {
            self.state = ClaimState::Unclaimed;
            true
        } else {
            false
        }
    }

    /// Called when a subscriber disconnects. Releases the claim only if
    /// `departing_user_id` was the holder and has no other live connections.
    /// Per spec §9's Open Question resolution, a later resubscribe never
    /// regains this claim — `holder_gone` is terminal.
    pub fn on_holder_unsubscribe(&mut self, departing_user_id: &str, has_other_connections: bool) -> bool {
        if has_other_connections {
            return false;
        }
        if matches!(&self.state, ClaimState::Held(h) if h.holder_user_id == departing_user_id) {
            self.state = ClaimState::Unclaimed;
            true
        } else {
            false
        }
    }

    /// Record that the holder just sent input or an explicit renewal,
    /// resetting the idle watchdog window.
    pub fn record_activity(&mut self) {
        if let ClaimState::Held(held) = &mut self.state {
            held.last_activity = Instant::now();
        }
    }

    /// Hard lease expiry instant, if held — used to schedule the hub's
    /// `ClaimExpired` timer.
    #[must_use]
    pub fn hard_expires_at(&self) -> Option<Instant> {
        match &self.state {
            ClaimState::Held(held) => Some(held.expires_at),
            ClaimState::Unclaimed => None,
        }
    }

    /// Whether the held claim has gone `ClaimIdleMax` without input/renewal.
    #[must_use]
    pub fn is_idle_expired(&self, idle_max: Duration) -> bool {
        matches!(&self.state, ClaimState::Held(held) if held.last_activity.elapsed() >= idle_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(120);

    #[test]
    fn first_claim_by_operator_succeeds() {
        let mut arbiter = ClaimArbiter::new();
        let outcome = arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        assert!(matches!(outcome, ClaimAttempt::Granted { reason: None, preempted_holder: None }));
        assert!(matches!(arbiter.state(), ClaimState::Held(h) if h.holder_user_id == "alice"));
    }

    #[test]
    fn viewer_cannot_claim() {
        let mut arbiter = ClaimArbiter::new();
        let outcome = arbiter.claim("alice", "Alice", Role::Viewer, LEASE);
        assert!(matches!(outcome, ClaimAttempt::Denied(WireError::Forbidden)));
    }

    #[test]
    fn holder_renewing_increments_renewals() {
        let mut arbiter = ClaimArbiter::new();
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        let outcome = arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        assert!(matches!(
            outcome,
            ClaimAttempt::Granted { reason: Some(ClaimedReason::Renewed), preempted_holder: None }
        ));
        assert!(matches!(arbiter.state(), ClaimState::Held(h) if h.renewals == 1));
    }

    #[test]
    fn lower_role_cannot_preempt() {
        let mut arbiter = ClaimArbiter::new();
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        let outcome = arbiter.claim("bob", "Bob", Role::Operator, LEASE);
        assert!(matches!(outcome, ClaimAttempt::Denied(WireError::Locked { held_by }) if held_by == "alice"));
    }

    #[test]
    fn admin_preempts_operator() {
        let mut arbiter = ClaimArbiter::new();
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        let outcome = arbiter.claim("carol", "Carol", Role::Admin, LEASE);
        assert!(matches!(
            outcome,
            ClaimAttempt::Granted { reason: Some(ClaimedReason::Preempted), preempted_holder: Some(ref h) } if h == "alice"
        ));
        assert!(matches!(arbiter.state(), ClaimState::Held(h) if h.holder_user_id == "carol" && h.renewals == 0));
    }

    #[test]
    fn release_requires_holder_identity() {
        let mut arbiter = ClaimArbiter::new();
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        assert!(!arbiter.release("bob"));
        assert!(arbiter.release("alice"));
        assert!(matches!(arbiter.state(), ClaimState::Unclaimed));
    }

    #[test]
    fn force_release_requires_admin_and_a_live_claim() {
        let mut arbiter = ClaimArbiter::new();
        assert!(!arbiter.force_release(Role::Admin));
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        assert!(!arbiter.force_release(Role::Operator));
        assert!(arbiter.force_release(Role::Admin));
        assert!(matches!(arbiter.state(), ClaimState::Unclaimed));
    }

    #[test]
    fn holder_gone_is_terminal() {
        let mut arbiter = ClaimArbiter::new();
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        assert!(arbiter.on_holder_unsubscribe("alice", false));
        assert!(matches!(arbiter.state(), ClaimState::Unclaimed));
    }

    #[test]
    fn holder_gone_no_op_when_another_connection_remains() {
        let mut arbiter = ClaimArbiter::new();
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        assert!(!arbiter.on_holder_unsubscribe("alice", true));
        assert!(matches!(arbiter.state(), ClaimState::Held(_)));
    }

    #[test]
    fn idle_expiry_checks_last_activity_not_hard_lease() {
        let mut arbiter = ClaimArbiter::new();
        arbiter.claim("alice", "Alice", Role::Operator, LEASE);
        assert!(!arbiter.is_idle_expired(Duration::from_secs(60)));
        assert!(arbiter.is_idle_expired(Duration::from_secs(0)));
    }

    #[test]
    fn expire_is_a_no_op_on_unclaimed() {
        let mut arbiter = ClaimArbiter::new();
        assert!(!arbiter.expire());
    }
}
