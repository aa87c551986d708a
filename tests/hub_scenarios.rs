//! End-to-end scenarios from spec §8, driven directly against the hub's
//! public inbox with a [`FakeMultiplexer`] standing in for `tmux` — the
//! same harness shape `registry.rs`'s own unit tests use, just exercising
//! full multi-subscriber sequences instead of registry bookkeeping alone.

use std::sync::Arc;
use std::time::Duration;

use termhub::audit::LoggingAuditSink;
use termhub::authority::Role;
use termhub::config::Config;
use termhub::hub::broadcast::SubscriberQueues;
use termhub::hub::{self, HubEvent, HubHandle, SubscriberHandle};
use termhub::multiplexer::FakeMultiplexer;
use termhub::principal::Principal;
use termhub::protocol::{ClaimedReason, ReleasedReason, ServerFrame};
use tokio::sync::{oneshot, Notify};

fn sub(id: u64, user_id: &str, role: Role) -> SubscriberHandle {
    SubscriberHandle { id, principal: Arc::new(Principal::new(user_id, user_id, role)) }
}

fn spawn_hub(mux: &Arc<FakeMultiplexer>, config: Arc<Config>) -> HubHandle {
    hub::spawn("s1", config, mux.clone(), Arc::new(LoggingAuditSink))
}

async fn subscribe(hub: &HubHandle, handle: SubscriberHandle) -> Arc<SubscriberQueues> {
    let queues = SubscriberQueues::new(256, 64, Arc::new(Notify::new()));
    let (reply, rx) = oneshot::channel();
    hub.post(HubEvent::Subscribe { sub: handle, queues: queues.clone(), reply });
    rx.await.expect("hub alive").expect("subscribe allowed");
    queues
}

/// Polls `queues` until `predicate` is satisfied or `timeout` elapses,
/// accumulating every frame drained along the way.
async fn wait_for(queues: &Arc<SubscriberQueues>, timeout: Duration, predicate: impl Fn(&[ServerFrame]) -> bool) -> Vec<ServerFrame> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut collected = Vec::new();
    loop {
        collected.extend(queues.drain_ready());
        if predicate(&collected) || tokio::time::Instant::now() >= deadline {
            return collected;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn has_output(frames: &[ServerFrame], want_seq: u64, want_data: &str) -> bool {
    frames.iter().any(|f| matches!(f, ServerFrame::Output { seq, data, .. } if *seq == want_seq && data == want_data))
}

fn has_claimed_by(frames: &[ServerFrame], holder_id: &str) -> bool {
    frames.iter().any(|f| matches!(f, ServerFrame::Claimed { by, .. } if by.id == holder_id))
}

fn has_error_code(frames: &[ServerFrame], code: &str) -> bool {
    frames.iter().any(|f| matches!(f, ServerFrame::Error { code: c, .. } if *c == code))
}

fn has_released(frames: &[ServerFrame], reason: Option<ReleasedReason>) -> bool {
    frames.iter().any(|f| matches!(f, ServerFrame::Released { reason: r, .. } if *r == reason))
}

/// S1 — solo viewer, no claim: subscribe, then see the multiplexer's first
/// output chunk as `output{seq:1}`.
#[tokio::test]
async fn s1_solo_viewer_receives_output() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let hub = spawn_hub(&mux, Arc::new(Config::default()));

    let a = subscribe(&hub, sub(1, "A", Role::Viewer)).await;
    // Presence frame lands on subscribe.
    let presence = wait_for(&a, Duration::from_secs(1), |f| !f.is_empty()).await;
    assert!(matches!(&presence[0], ServerFrame::Presence { users, .. } if users.len() == 1 && users[0].id == "A"));

    mux.push_output("s1", b"hello\r\n");
    let frames = wait_for(&a, Duration::from_secs(1), |f| has_output(f, 1, "hello\r\n")).await;
    assert!(has_output(&frames, 1, "hello\r\n"));
}

/// S2 — claim + input: the holder's `sendKeys` reaches the multiplexer; a
/// non-holder's `sendKeys` is rejected with `NOT_HOLDER` and never reaches it.
#[tokio::test]
async fn s2_claim_and_input() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let hub = spawn_hub(&mux, Arc::new(Config::default()));

    let a = subscribe(&hub, sub(1, "A", Role::Operator)).await;
    let b = subscribe(&hub, sub(2, "B", Role::Viewer)).await;
    a.drain_ready();
    b.drain_ready();

    hub.post(HubEvent::Claim { sub: sub(1, "A", Role::Operator), http_reply: None });
    let a_frames = wait_for(&a, Duration::from_secs(1), |f| has_claimed_by(f, "A")).await;
    let b_frames = wait_for(&b, Duration::from_secs(1), |f| has_claimed_by(f, "A")).await;
    assert!(has_claimed_by(&a_frames, "A"));
    assert!(has_claimed_by(&b_frames, "A"));

    hub.post(HubEvent::Input { sub: sub(1, "A", Role::Operator), bytes: b"ls\n".to_vec() });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mux.writes("s1"), vec![b"ls\n".to_vec()]);

    hub.post(HubEvent::Input { sub: sub(2, "B", Role::Viewer), bytes: b"ls\n".to_vec() });
    let b_frames = wait_for(&b, Duration::from_secs(1), |f| has_error_code(f, "NOT_HOLDER")).await;
    assert!(has_error_code(&b_frames, "NOT_HOLDER"));
    // Still exactly one write — B's rejected sendKeys never reached the mux.
    assert_eq!(mux.writes("s1").len(), 1);
}

/// S3 — preemption: an admin's `claim` displaces an operator's; the
/// displaced holder gets `PREEMPTED`, every member (including onlookers)
/// sees the new `claimed{reason:"preempted"}`.
#[tokio::test]
async fn s3_preemption() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let hub = spawn_hub(&mux, Arc::new(Config::default()));

    let a = subscribe(&hub, sub(1, "A", Role::Operator)).await;
    let b = subscribe(&hub, sub(2, "B", Role::Viewer)).await;
    hub.post(HubEvent::Claim { sub: sub(1, "A", Role::Operator), http_reply: None });
    wait_for(&a, Duration::from_secs(1), |f| has_claimed_by(f, "A")).await;
    a.drain_ready();
    b.drain_ready();

    let c = subscribe(&hub, sub(3, "C", Role::Admin)).await;
    c.drain_ready();
    hub.post(HubEvent::Claim { sub: sub(3, "C", Role::Admin), http_reply: None });

    let a_frames = wait_for(&a, Duration::from_secs(1), |f| has_error_code(f, "PREEMPTED")).await;
    assert!(has_error_code(&a_frames, "PREEMPTED"));

    let b_frames = wait_for(&b, Duration::from_secs(1), |f| has_claimed_by(f, "C")).await;
    assert!(b_frames.iter().any(|f| matches!(f, ServerFrame::Claimed { by, reason: Some(ClaimedReason::Preempted), .. } if by.id == "C")));
}

/// S4 (hard-lease variant) — a claim with a near-zero lease expires on its
/// own without any `release`, and every member sees `released{reason:"expired"}`.
#[tokio::test]
async fn s4_hard_lease_expiry_broadcasts_released() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let mut config = Config::default();
    config.claim_lease_max_secs = 1;
    let hub = spawn_hub(&mux, Arc::new(config));

    let a = subscribe(&hub, sub(1, "A", Role::Operator)).await;
    hub.post(HubEvent::Claim { sub: sub(1, "A", Role::Operator), http_reply: None });
    wait_for(&a, Duration::from_secs(1), |f| has_claimed_by(f, "A")).await;
    a.drain_ready();

    let frames = wait_for(&a, Duration::from_secs(3), |f| has_released(f, Some(ReleasedReason::Expired))).await;
    assert!(has_released(&frames, Some(ReleasedReason::Expired)));
}

/// S5 — slow consumer: a subscriber whose queue is never drained gets
/// coalesced against, then evicted with `SLOW_CONSUMER` on the priority
/// lane, without disturbing the multiplexer or other members.
#[tokio::test]
async fn s5_slow_consumer_is_evicted() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let hub = spawn_hub(&mux, Arc::new(Config::default()));

    // B's queues are deliberately tiny and never drained, standing in for a
    // writer task that has stalled.
    let b_queues = SubscriberQueues::new(4, 4, Arc::new(Notify::new()));
    let (reply, rx) = oneshot::channel();
    hub.post(HubEvent::Subscribe { sub: sub(2, "B", Role::Viewer), queues: b_queues.clone(), reply });
    rx.await.unwrap().unwrap();

    let a = subscribe(&hub, sub(1, "A", Role::Operator)).await;
    a.drain_ready();

    for i in 0..64 {
        mux.push_output("s1", format!("line {i}\n").as_bytes());
    }

    // A keeps draining normally and sees output uninterrupted.
    let a_frames = wait_for(&a, Duration::from_secs(2), |f| f.len() >= 10).await;
    assert!(a_frames.len() >= 10);

    // B was never drained; it should have been evicted and closed.
    let closed = {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if b_queues.is_closed() || tokio::time::Instant::now() >= deadline {
                break b_queues.is_closed();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    assert!(closed, "slow consumer should have been evicted");
}

/// S6 — holder disconnect: when the holder's only connection unsubscribes,
/// the remaining members see `released{reason:"holder_gone"}`.
#[tokio::test]
async fn s6_holder_disconnect_releases_claim() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let hub = spawn_hub(&mux, Arc::new(Config::default()));

    let a = subscribe(&hub, sub(1, "A", Role::Operator)).await;
    let b = subscribe(&hub, sub(2, "B", Role::Viewer)).await;
    hub.post(HubEvent::Claim { sub: sub(1, "A", Role::Operator), http_reply: None });
    wait_for(&a, Duration::from_secs(1), |f| has_claimed_by(f, "A")).await;
    b.drain_ready();

    hub.post(HubEvent::Unsubscribe { sub_id: 1 });

    let b_frames = wait_for(&b, Duration::from_secs(1), |f| has_released(f, Some(ReleasedReason::HolderGone))).await;
    assert!(has_released(&b_frames, Some(ReleasedReason::HolderGone)));

    let presence = b_frames
        .iter()
        .filter_map(|f| match f {
            ServerFrame::Presence { users, .. } => Some(users),
            _ => None,
        })
        .next_back();
    if let Some(users) = presence {
        assert!(!users.iter().any(|u| u.id == "A"));
    }
}

/// A subscribed admin can force-release another operator's claim; every
/// member sees `released{reason:"forced"}`.
#[tokio::test]
async fn subscribed_admin_can_force_release() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let hub = spawn_hub(&mux, Arc::new(Config::default()));

    let a = subscribe(&hub, sub(1, "A", Role::Operator)).await;
    let c = subscribe(&hub, sub(3, "C", Role::Admin)).await;
    hub.post(HubEvent::Claim { sub: sub(1, "A", Role::Operator), http_reply: None });
    wait_for(&a, Duration::from_secs(1), |f| has_claimed_by(f, "A")).await;
    c.drain_ready();

    hub.post(HubEvent::ForceRelease { sub: sub(3, "C", Role::Admin), http_reply: None });

    let c_frames = wait_for(&c, Duration::from_secs(1), |f| has_released(f, Some(ReleasedReason::Forced))).await;
    assert!(has_released(&c_frames, Some(ReleasedReason::Forced)));
}

/// Per spec §9's Open Question resolution, an admin who isn't a subscriber
/// of the session cannot force-release its claim: the event is a no-op and
/// the claim stays held.
#[tokio::test]
async fn non_subscriber_admin_cannot_force_release() {
    let mux = Arc::new(FakeMultiplexer::new());
    mux.create_session("s1");
    let hub = spawn_hub(&mux, Arc::new(Config::default()));

    let a = subscribe(&hub, sub(1, "A", Role::Operator)).await;
    hub.post(HubEvent::Claim { sub: sub(1, "A", Role::Operator), http_reply: None });
    wait_for(&a, Duration::from_secs(1), |f| has_claimed_by(f, "A")).await;
    a.drain_ready();

    // "Z" never subscribed: id 99 is absent from the hub's membership set.
    let (reply, rx) = oneshot::channel();
    hub.post(HubEvent::ForceRelease { sub: sub(99, "Z", Role::Admin), http_reply: Some(reply) });
    assert_eq!(rx.await.unwrap(), Err(termhub::error::WireError::Forbidden));

    // A never saw a `released` frame; the claim is still held.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let a_frames = a.drain_ready();
    assert!(!has_released(&a_frames, Some(ReleasedReason::Forced)));
}
