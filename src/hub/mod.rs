//! The per-session hub: a single-task event loop owning one session's
//! membership, claim state, and output fan-out, per spec §4.2.
//!
//! Grounded on the teacher's `hub::mod` "unified event bus" shape (an
//! `UnboundedSender<HubEvent>`/`UnboundedReceiver<HubEvent>` pair driving a
//! single consumer task) but narrowed to one hub per *session* rather than
//! one hub for the whole process — spec §4.2 spawns a hub per session name,
//! lazily, via [`crate::registry::SessionRegistry`].

pub mod broadcast;
pub mod claim;
pub mod presence;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{interval, sleep_until, Duration, Instant, MissedTickBehavior};

use crate::audit::AuditSink;
use crate::authority::{self, Action};
use crate::config::Config;
use crate::error::WireError;
use crate::multiplexer::{MuxError, Multiplexer, OutputHandle};
use crate::principal::Principal;
use crate::protocol::{ClaimHolder, ClaimedReason, PresenceUser, ReleasedReason, ServerFrame};

use claim::{ClaimArbiter, ClaimState};

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-wide unique subscriber id. Called once per
/// (connection, session) subscription, by whoever is about to post
/// [`HubEvent::Subscribe`].
#[must_use]
pub fn next_subscriber_id() -> u64 {
    NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed)
}

/// The acting identity behind a hub event — the connection's principal plus
/// the subscriber id assigned at `Subscribe` time. Cheap to clone: the
/// principal is shared, not copied.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    /// This (connection, session) subscription's id.
    pub id: u64,
    /// The connection's authenticated principal.
    pub principal: Arc<Principal>,
}

/// A point-in-time read of one session's claim, for the `GET
/// /api/terminal/locks` boundary handler.
#[derive(Debug, Clone)]
pub struct ClaimSnapshot {
    /// Session this snapshot describes.
    pub session_name: String,
    /// `None` if unclaimed.
    pub held: Option<HeldSnapshot>,
}

/// The `Held` half of a [`ClaimSnapshot`], with the lease expiry already
/// converted to wall-clock time for the HTTP boundary.
#[derive(Debug, Clone)]
pub struct HeldSnapshot {
    /// Current holder's user id.
    pub holder_user_id: String,
    /// Current holder's display name.
    pub holder_name: String,
    /// ISO-8601 lease expiry.
    pub expires_at: String,
}

/// Design-level inbox events of spec §4.2. `RenewClaim` isn't a separate
/// variant: the transition table treats a holder's own `claim` as a
/// renewal, so `Claim` already covers it.
pub enum HubEvent {
    /// Join a session's membership set.
    Subscribe {
        /// Acting identity.
        sub: SubscriberHandle,
        /// This subscription's outbound queues, created by the connection.
        queues: Arc<broadcast::SubscriberQueues>,
        /// `Ok(())` on success; `Err(Forbidden)` if the role can't view.
        reply: oneshot::Sender<Result<(), WireError>>,
    },
    /// Leave a session's membership set.
    Unsubscribe {
        /// The departing subscription's id.
        sub_id: u64,
    },
    /// Raw input bytes from the claim holder.
    Input {
        /// Acting identity.
        sub: SubscriberHandle,
        /// Raw key bytes.
        bytes: Vec<u8>,
    },
    /// A resize request from the claim holder.
    Resize {
        /// Acting identity.
        sub: SubscriberHandle,
        /// New column count.
        cols: u16,
        /// New row count.
        rows: u16,
    },
    /// Acquire or renew the claim.
    Claim {
        /// Acting identity.
        sub: SubscriberHandle,
        /// Set by the REST boundary (`POST .../lock`) to get a synchronous
        /// result; `None` for the wire path, which instead learns the
        /// outcome from the broadcast `claimed`/`error` frames.
        http_reply: Option<oneshot::Sender<Result<(), WireError>>>,
    },
    /// Release a held claim.
    Release {
        /// Acting identity.
        sub: SubscriberHandle,
        /// See [`HubEvent::Claim`].
        http_reply: Option<oneshot::Sender<Result<(), WireError>>>,
    },
    /// Forcibly release someone else's claim (admin+).
    ForceRelease {
        /// Acting identity.
        sub: SubscriberHandle,
        /// See [`HubEvent::Claim`].
        http_reply: Option<oneshot::Sender<Result<(), WireError>>>,
    },
    /// Point-in-time claim read for the HTTP boundary.
    QueryClaim {
        /// Where to send the snapshot.
        reply: oneshot::Sender<ClaimSnapshot>,
    },
    /// A chunk of raw multiplexer output, from the hub's own reader task.
    OutputChunk(Vec<u8>),
    /// The multiplexer reader hit EOF or a read error.
    MuxReadFailed(Option<MuxError>),
    /// Hard lease or idle-lease expiry fired.
    ClaimExpired,
    /// Periodic presence/idle-watchdog tick (every 15s).
    HeartbeatTick,
    /// Process-wide shutdown in progress: broadcast `SERVER_SHUTDOWN` to
    /// every member and tear this hub down, per spec §5's shutdown order.
    Shutdown,
}

/// A cheap, cloneable reference to a running session hub's inbox.
#[derive(Clone)]
pub struct HubHandle {
    /// The session name this hub owns.
    pub session_name: Arc<str>,
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle").field("session_name", &self.session_name).finish()
    }
}

impl HubHandle {
    /// Post an event to this hub's inbox. Silently dropped if the hub has
    /// already torn down — callers never block on a dead hub.
    pub fn post(&self, event: HubEvent) {
        let _ = self.tx.send(event);
    }

    /// Whether this hub's event loop has exited (reaped or torn down).
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Member {
    principal: Arc<Principal>,
    queues: Arc<broadcast::SubscriberQueues>,
    last_activity: Instant,
    idle: bool,
}

/// Owns one session's mutable state; every mutation happens on this task.
struct SessionHub {
    name: Arc<str>,
    config: Arc<Config>,
    mux: Arc<dyn Multiplexer>,
    audit: Arc<dyn AuditSink>,
    inbox: mpsc::UnboundedReceiver<HubEvent>,
    self_tx: mpsc::UnboundedSender<HubEvent>,
    members: HashMap<u64, Member>,
    arbiter: ClaimArbiter,
    next_seq: u64,
    reader_cancel: Option<oneshot::Sender<()>>,
    pending_resize: Option<(u16, u16)>,
    last_resize_applied: Instant,
    empty_since: Option<Instant>,
}

/// Resize requests are coalesced to at most this rate, per spec §4.2.
const RESIZE_COALESCE_WINDOW: Duration = Duration::from_millis(100);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Spawn a hub task for `name` and return a handle to its inbox. The caller
/// (the registry) is responsible for having already confirmed `name` is
/// known to the multiplexer.
pub fn spawn(
    name: impl Into<Arc<str>>,
    config: Arc<Config>,
    mux: Arc<dyn Multiplexer>,
    audit: Arc<dyn AuditSink>,
) -> HubHandle {
    let name = name.into();
    let (tx, rx) = mpsc::unbounded_channel();
    let hub = SessionHub {
        name: name.clone(),
        config,
        mux,
        audit,
        inbox: rx,
        self_tx: tx.clone(),
        members: HashMap::new(),
        arbiter: ClaimArbiter::new(),
        next_seq: 0,
        reader_cancel: None,
        pending_resize: None,
        last_resize_applied: Instant::now() - RESIZE_COALESCE_WINDOW,
        empty_since: Some(Instant::now()),
    };
    tokio::spawn(hub.run());
    HubHandle { session_name: name, tx }
}

/// Spawns the hub's single output reader per spec §4.2: one task, owning
/// the multiplexer handle exclusively, forwarding chunks back into the
/// hub's own inbox so all state mutation still happens on the hub task.
fn spawn_reader(
    mut handle: Box<dyn OutputHandle>,
    tx: mpsc::UnboundedSender<HubEvent>,
    mut cancel: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut cancel => {
                    handle.detach().await;
                    break;
                }
                chunk = handle.read_chunk() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            if tx.send(HubEvent::OutputChunk(bytes)).is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            let _ = tx.send(HubEvent::MuxReadFailed(Some(err)));
                            break;
                        }
                        None => {
                            let _ = tx.send(HubEvent::MuxReadFailed(None));
                            break;
                        }
                    }
                }
            }
        }
    });
}

enum Outcome {
    Continue,
    Terminate,
}

impl SessionHub {
    async fn run(mut self) {
        match self.mux.attach(&self.name).await {
            Ok(handle) => {
                let (cancel_tx, cancel_rx) = oneshot::channel();
                spawn_reader(handle, self.self_tx.clone(), cancel_rx);
                self.reader_cancel = Some(cancel_tx);
            }
            Err(err) => {
                log::warn!("hub {}: attach failed: {err}", self.name);
            }
        }

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let claim_expiry = self.arbiter.hard_expires_at();
            let resize_flush_at = self.pending_resize.is_some().then(|| self.last_resize_applied + RESIZE_COALESCE_WINDOW);
            let reap_at = (self.members.is_empty() && matches!(self.arbiter.state(), ClaimState::Unclaimed))
                .then_some(self.empty_since)
                .flatten()
                .map(|since| since + self.config.hub_reap_grace());

            let outcome = tokio::select! {
                event = self.inbox.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => Outcome::Terminate,
                    }
                }
                _ = heartbeat.tick() => self.handle_event(HubEvent::HeartbeatTick).await,
                _ = sleep_until(claim_expiry.unwrap_or_else(Instant::now)), if claim_expiry.is_some() => {
                    self.handle_event(HubEvent::ClaimExpired).await
                }
                _ = sleep_until(resize_flush_at.unwrap_or_else(Instant::now)), if resize_flush_at.is_some() => {
                    self.flush_pending_resize().await;
                    Outcome::Continue
                }
                _ = sleep_until(reap_at.unwrap_or_else(Instant::now)), if reap_at.is_some() => Outcome::Terminate,
            };

            if matches!(outcome, Outcome::Terminate) {
                break;
            }
        }

        if let Some(cancel) = self.reader_cancel.take() {
            let _ = cancel.send(());
        }
        log::debug!("hub {} terminated", self.name);
    }

    async fn handle_event(&mut self, event: HubEvent) -> Outcome {
        match event {
            HubEvent::Subscribe { sub, queues, reply } => {
                self.on_subscribe(sub, queues, reply);
                Outcome::Continue
            }
            HubEvent::Unsubscribe { sub_id } => {
                self.on_unsubscribe(sub_id);
                Outcome::Continue
            }
            HubEvent::Input { sub, bytes } => {
                self.on_input(sub, bytes).await;
                Outcome::Continue
            }
            HubEvent::Resize { sub, cols, rows } => {
                self.on_resize(sub, cols, rows).await;
                Outcome::Continue
            }
            HubEvent::Claim { sub, http_reply } => {
                self.on_claim(sub, http_reply);
                Outcome::Continue
            }
            HubEvent::Release { sub, http_reply } => {
                self.on_release(sub, http_reply);
                Outcome::Continue
            }
            HubEvent::ForceRelease { sub, http_reply } => {
                self.on_force_release(sub, http_reply);
                Outcome::Continue
            }
            HubEvent::QueryClaim { reply } => {
                let _ = reply.send(self.claim_snapshot());
                Outcome::Continue
            }
            HubEvent::OutputChunk(bytes) => {
                self.on_output_chunk(bytes);
                Outcome::Continue
            }
            HubEvent::MuxReadFailed(err) => {
                self.on_mux_read_failed(err);
                Outcome::Terminate
            }
            HubEvent::ClaimExpired => {
                self.on_claim_expired();
                Outcome::Continue
            }
            HubEvent::HeartbeatTick => {
                self.on_heartbeat_tick();
                Outcome::Continue
            }
            HubEvent::Shutdown => {
                self.on_shutdown();
                Outcome::Terminate
            }
        }
    }

    fn on_subscribe(&mut self, sub: SubscriberHandle, queues: Arc<broadcast::SubscriberQueues>, reply: oneshot::Sender<Result<(), WireError>>) {
        if !authority::allowed(sub.principal.role, Action::View) {
            let _ = reply.send(Err(WireError::Forbidden));
            return;
        }

        self.empty_since = None;
        self.members.insert(
            sub.id,
            Member { principal: sub.principal.clone(), queues: queues.clone(), last_activity: Instant::now(), idle: false },
        );
        let _ = reply.send(Ok(()));

        if let ClaimState::Held(held) = self.arbiter.state() {
            let frame = self.claimed_frame(held, None);
            queues.enqueue_priority(frame);
        }
        self.broadcast_presence();
    }

    fn on_unsubscribe(&mut self, sub_id: u64) {
        let Some(member) = self.members.remove(&sub_id) else { return };
        let user_id = member.principal.user_id.clone();
        let has_other_connections = self.members.values().any(|m| m.principal.user_id == user_id);

        if self.arbiter.on_holder_unsubscribe(&user_id, has_other_connections) {
            self.audit.claim_released(&self.name, &user_id, "holder_gone");
            self.broadcast_priority_all(ServerFrame::Released {
                session_name: self.name.to_string(),
                reason: Some(ReleasedReason::HolderGone),
            });
        }

        if self.members.is_empty() {
            self.empty_since = Some(Instant::now());
        }
        self.broadcast_presence();
    }

    async fn on_input(&mut self, sub: SubscriberHandle, bytes: Vec<u8>) {
        if !authority::allowed(sub.principal.role, Action::SendKeys) {
            self.reply_error_to(sub.id, WireError::Forbidden);
            return;
        }
        if !self.is_holder(&sub.principal.user_id) {
            self.reply_error_to(sub.id, WireError::NotHolder);
            return;
        }

        self.arbiter.record_activity();
        self.touch(sub.id);

        if let Err(err) = self.mux.write(&self.name, &bytes).await {
            log::warn!("hub {}: write failed: {err}", self.name);
            self.reply_error_to(sub.id, WireError::Io);
        }
    }

    async fn on_resize(&mut self, sub: SubscriberHandle, cols: u16, rows: u16) {
        if !authority::allowed(sub.principal.role, Action::SendKeys) {
            self.reply_error_to(sub.id, WireError::Forbidden);
            return;
        }
        if !self.is_holder(&sub.principal.user_id) {
            self.reply_error_to(sub.id, WireError::NotHolder);
            return;
        }

        if self.last_resize_applied.elapsed() >= RESIZE_COALESCE_WINDOW {
            self.apply_resize(cols, rows).await;
        } else {
            self.pending_resize = Some((cols, rows));
        }
    }

    async fn flush_pending_resize(&mut self) {
        if let Some((cols, rows)) = self.pending_resize.take() {
            self.apply_resize(cols, rows).await;
        }
    }

    async fn apply_resize(&mut self, cols: u16, rows: u16) {
        self.last_resize_applied = Instant::now();
        if let Err(err) = self.mux.resize(&self.name, cols, rows).await {
            log::warn!("hub {}: resize failed: {err}", self.name);
        }
    }

    fn on_claim(&mut self, sub: SubscriberHandle, http_reply: Option<oneshot::Sender<Result<(), WireError>>>) {
        let lease_max = self.config.claim_lease_max();
        match self.arbiter.claim(&sub.principal.user_id, &sub.principal.display_name, sub.principal.role, lease_max) {
            claim::ClaimAttempt::Granted { reason, preempted_holder } => {
                self.audit.claim_acquired(&self.name, &sub.principal.user_id, reason);
                let held = match self.arbiter.state() {
                    ClaimState::Held(held) => held.clone(),
                    ClaimState::Unclaimed => unreachable!("arbiter just granted a claim"),
                };
                let frame = self.claimed_frame(&held, reason);
                self.broadcast_priority_all(frame);

                if let Some(prior) = preempted_holder {
                    let targets: Vec<u64> =
                        self.members.iter().filter(|(_, m)| m.principal.user_id == prior).map(|(id, _)| *id).collect();
                    for id in targets {
                        self.reply_error_to(id, WireError::Preempted);
                    }
                }
                if let Some(reply) = http_reply {
                    let _ = reply.send(Ok(()));
                }
            }
            claim::ClaimAttempt::Denied(err) => {
                self.reply_error_to(sub.id, err.clone());
                if let Some(reply) = http_reply {
                    let _ = reply.send(Err(err));
                }
            }
        }
    }

    fn on_release(&mut self, sub: SubscriberHandle, http_reply: Option<oneshot::Sender<Result<(), WireError>>>) {
        if self.arbiter.release(&sub.principal.user_id) {
            self.audit.claim_released(&self.name, &sub.principal.user_id, "released");
            self.broadcast_priority_all(ServerFrame::Released { session_name: self.name.to_string(), reason: None });
            if let Some(reply) = http_reply {
                let _ = reply.send(Ok(()));
            }
        } else {
            self.reply_error_to(sub.id, WireError::NotHolder);
            if let Some(reply) = http_reply {
                let _ = reply.send(Err(WireError::NotHolder));
            }
        }
    }

    fn on_force_release(&mut self, sub: SubscriberHandle, http_reply: Option<oneshot::Sender<Result<(), WireError>>>) {
        // Per spec §9's Open Question resolution: forceRelease requires the
        // actor to already be a subscriber of this session.
        if !self.members.contains_key(&sub.id) {
            if let Some(reply) = http_reply {
                let _ = reply.send(Err(WireError::Forbidden));
            }
            return;
        }
        if !authority::allowed(sub.principal.role, Action::ForceRelease) {
            self.reply_error_to(sub.id, WireError::Forbidden);
            if let Some(reply) = http_reply {
                let _ = reply.send(Err(WireError::Forbidden));
            }
            return;
        }
        if self.arbiter.force_release(sub.principal.role) {
            self.audit.forced_release(&self.name, &sub.principal.user_id);
            self.broadcast_priority_all(ServerFrame::Released {
                session_name: self.name.to_string(),
                reason: Some(ReleasedReason::Forced),
            });
            if let Some(reply) = http_reply {
                let _ = reply.send(Ok(()));
            }
        } else if let Some(reply) = http_reply {
            let _ = reply.send(Err(WireError::NotFound));
        }
    }

    fn on_output_chunk(&mut self, bytes: Vec<u8>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let data = String::from_utf8_lossy(&bytes).into_owned();
        let ids: Vec<u64> = self.members.keys().copied().collect();
        for id in ids {
            let frame = ServerFrame::Output { session_name: self.name.to_string(), seq, data: data.clone() };
            self.send_output_checked(id, frame);
        }
    }

    fn on_mux_read_failed(&mut self, err: Option<MuxError>) {
        log::warn!("hub {}: multiplexer read failed: {:?}", self.name, err);
        self.audit.session_lost(&self.name);
        let frame = ServerFrame::from_wire_error(&WireError::SessionLost, Some(self.name.to_string()));
        self.broadcast_priority_all(frame);
        let ids: Vec<u64> = self.members.keys().copied().collect();
        for id in ids {
            if let Some(member) = self.members.remove(&id) {
                member.queues.close();
            }
        }
    }

    fn on_shutdown(&mut self) {
        let frame = ServerFrame::from_wire_error(&WireError::ServerShutdown, Some(self.name.to_string()));
        self.broadcast_priority_all(frame);
        let ids: Vec<u64> = self.members.keys().copied().collect();
        for id in ids {
            if let Some(member) = self.members.remove(&id) {
                member.queues.close();
            }
        }
    }

    fn on_claim_expired(&mut self) {
        if self.arbiter.expire() {
            self.audit.claim_expired(&self.name);
            self.broadcast_priority_all(ServerFrame::Released {
                session_name: self.name.to_string(),
                reason: Some(ReleasedReason::Expired),
            });
        }
    }

    fn on_heartbeat_tick(&mut self) {
        if self.arbiter.is_idle_expired(self.config.claim_idle_max()) {
            self.on_claim_expired();
        }

        let idle_after = self.config.presence_idle();
        let evict_after = self.config.presence_evict();
        let mut flipped = false;
        let mut evictions = Vec::new();

        for (&id, member) in &mut self.members {
            if presence::should_evict(member.last_activity, evict_after) {
                evictions.push(id);
            } else if presence::should_flip_idle(member.last_activity, idle_after) && !member.idle {
                member.idle = true;
                flipped = true;
            }
        }

        for id in evictions {
            self.evict_member(id, WireError::IdleTimeout);
        }
        if flipped {
            self.broadcast_presence();
        }
    }

    fn is_holder(&self, user_id: &str) -> bool {
        matches!(self.arbiter.state(), ClaimState::Held(h) if h.holder_user_id == user_id)
    }

    fn touch(&mut self, sub_id: u64) {
        if let Some(member) = self.members.get_mut(&sub_id) {
            member.last_activity = Instant::now();
            member.idle = false;
        }
    }

    fn reply_error_to(&mut self, sub_id: u64, err: WireError) {
        let frame = ServerFrame::from_wire_error(&err, Some(self.name.to_string()));
        self.send_priority_checked(sub_id, frame);
    }

    fn send_priority_checked(&mut self, sub_id: u64, frame: ServerFrame) {
        let should_evict = self
            .members
            .get(&sub_id)
            .is_some_and(|member| member.queues.enqueue_priority(frame) == broadcast::EnqueueOutcome::Evict);
        if should_evict {
            self.evict_member(sub_id, WireError::SlowConsumer);
        }
    }

    fn send_output_checked(&mut self, sub_id: u64, frame: ServerFrame) {
        let should_evict = self.members.get(&sub_id).is_some_and(|member| {
            member.queues.enqueue_output(&self.name, frame) == broadcast::EnqueueOutcome::Evict
        });
        if should_evict {
            self.evict_member(sub_id, WireError::SlowConsumer);
        }
    }

    fn evict_member(&mut self, sub_id: u64, reason: WireError) {
        let Some(member) = self.members.remove(&sub_id) else { return };
        member.queues.force_priority(ServerFrame::from_wire_error(&reason, Some(self.name.to_string())));
        member.queues.close();
        if self.members.is_empty() {
            self.empty_since = Some(Instant::now());
        }
        self.broadcast_presence();
    }

    fn broadcast_priority_all(&mut self, frame: ServerFrame) {
        let ids: Vec<u64> = self.members.keys().copied().collect();
        for id in ids {
            self.send_priority_checked(id, frame.clone());
        }
    }

    fn broadcast_presence(&mut self) {
        let entries: Vec<presence::PresenceMember> = self
            .members
            .values()
            .map(|m| presence::PresenceMember {
                user_id: m.principal.user_id.clone(),
                name: m.principal.display_name.clone(),
                avatar: None,
                idle: m.idle,
            })
            .collect();
        let users: Vec<PresenceUser> = presence::build_snapshot(&entries);
        self.broadcast_priority_all(ServerFrame::Presence { session_name: self.name.to_string(), users });
    }

    fn claimed_frame(&self, held: &claim::Held, reason: Option<ClaimedReason>) -> ServerFrame {
        let remaining = held.expires_at.saturating_duration_since(Instant::now());
        let remaining = chrono::Duration::from_std(remaining).unwrap_or(chrono::Duration::zero());
        let expires_at = (chrono::Utc::now() + remaining).to_rfc3339();
        ServerFrame::Claimed {
            session_name: self.name.to_string(),
            by: ClaimHolder { id: held.holder_user_id.clone(), name: held.holder_name.clone() },
            expires_at,
            reason,
        }
    }

    fn claim_snapshot(&self) -> ClaimSnapshot {
        let held = match self.arbiter.state() {
            ClaimState::Held(held) => {
                let remaining = held.expires_at.saturating_duration_since(Instant::now());
                let remaining = chrono::Duration::from_std(remaining).unwrap_or(chrono::Duration::zero());
                let expires_at = (chrono::Utc::now() + remaining).to_rfc3339();
                Some(HeldSnapshot {
                    holder_user_id: held.holder_user_id.clone(),
                    holder_name: held.holder_name.clone(),
                    expires_at,
                })
            }
            ClaimState::Unclaimed => None,
        };
        ClaimSnapshot { session_name: self.name.to_string(), held }
    }
}

/// Re-exported so [`crate::connection`]/[`crate::server`] can build one
/// `Notify` per connection and pass it to every [`broadcast::SubscriberQueues`]
/// that connection's subscriptions create.
pub type SharedWaker = Arc<Notify>;
