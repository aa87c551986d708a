//! Drives one `/ws` connection: decodes [`ClientFrame`]s from the socket,
//! dispatches them to the relevant session hub, and relays whatever the
//! hub enqueues back out as [`ServerFrame`]s.
//!
//! Three tasks cooperate per connection, the same split the teacher uses
//! for its terminal-attach socket (a dedicated reader loop plus a writer
//! task that alone owns the socket's send half):
//!   - the calling task runs the **reader** loop directly;
//!   - a **pump** task wakes on the connection's shared [`Notify`] and
//!     drains every subscribed session's [`SubscriberQueues`] into a single
//!     outbound channel;
//!   - a **writer** task owns the socket's write half exclusively,
//!     enforcing `write_deadline` on every send and ticking the
//!     application-level ping.
//!
//! A malformed frame (binary, or text that doesn't decode as a
//! [`ClientFrame`]) gets a `BAD_FRAME` error reply and then ends the
//! connection: the reader breaks its loop and the writer sends a close
//! frame with code 1003 before tearing down.
//!
//! Per spec §9's resolution of the `Connected`-timing question: this task
//! sends `connected` unconditionally at the top, before the reader loop
//! ever sees a `subscribe` — `HubEvent::Subscribe`'s own reply only adds a
//! `claimed` snapshot (if the session is held) and a `presence` frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{interval, timeout};

use crate::config::Config;
use crate::error::WireError;
use crate::hub::broadcast::SubscriberQueues;
use crate::hub::{self, HubEvent, HubHandle, SubscriberHandle};
use crate::multiplexer::MuxError;
use crate::principal::Principal;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::registry::SessionRegistry;

struct Subscription {
    sub_id: u64,
    hub: HubHandle,
    queues: Arc<SubscriberQueues>,
}

struct ConnectionState {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    notify: Arc<Notify>,
}

/// Tracks the application-level ping/pong liveness check of spec §4.6: an
/// outstanding ping with no pong by the next tick counts as one miss; two
/// consecutive misses drop the connection.
#[derive(Default)]
struct PongTracker {
    awaiting: std::sync::atomic::AtomicBool,
    consecutive_misses: AtomicU32,
}

impl PongTracker {
    /// Called by the writer on each ping tick. Returns `true` if the
    /// connection should be dropped (two consecutive misses).
    fn note_tick(&self) -> bool {
        if self.awaiting.swap(true, Ordering::SeqCst) {
            self.consecutive_misses.fetch_add(1, Ordering::SeqCst) + 1 >= 2
        } else {
            false
        }
    }

    /// Called by the reader whenever a `pong` arrives from the client.
    fn note_pong(&self) {
        self.awaiting.store(false, Ordering::SeqCst);
        self.consecutive_misses.store(0, Ordering::SeqCst);
    }
}

/// Drive `socket` to completion: authenticate is assumed already done (the
/// caller hands us `principal`), runs until the client disconnects or a
/// fatal error tears the connection down, then unsubscribes from every
/// session it had joined.
pub async fn run(socket: WebSocket, principal: Arc<Principal>, registry: Arc<SessionRegistry>, config: Arc<Config>) {
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let notify = Arc::new(Notify::new());
    let shutdown = Arc::new(Notify::new());
    let close_code = Arc::new(AtomicU16::new(1000));
    let state = Arc::new(ConnectionState { subscriptions: Mutex::new(HashMap::new()), notify: notify.clone() });

    let _ = outbound_tx.send(ServerFrame::Connected { user_id: principal.user_id.clone(), role: principal.role });

    let pong_tracker = Arc::new(PongTracker::default());
    let pump_handle = tokio::spawn(run_pump(state.clone(), outbound_tx.clone(), shutdown.clone()));
    let writer_handle = tokio::spawn(run_writer(
        sink,
        outbound_rx,
        config.clone(),
        shutdown.clone(),
        pong_tracker.clone(),
        close_code.clone(),
    ));

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if !handle_text(&text, &principal, &registry, &config, &state, &outbound_tx).await {
                    close_code.store(1003, Ordering::SeqCst);
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                let _ = outbound_tx.send(ServerFrame::from_wire_error(&WireError::BadFrame, None));
                close_code.store(1003, Ordering::SeqCst);
                break;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => pong_tracker.note_pong(),
            Ok(Message::Ping(_)) => {}
            Err(_) => break,
        }
    }

    let subs: Vec<Subscription> = {
        let mut subs = state.subscriptions.lock().expect("connection subscriptions lock poisoned");
        subs.drain().map(|(_, sub)| sub).collect()
    };
    for sub in subs {
        sub.hub.post(HubEvent::Unsubscribe { sub_id: sub.sub_id });
    }

    shutdown.notify_waiters();
    notify.notify_waiters();
    let _ = pump_handle.await;
    let _ = writer_handle.await;
}

async fn run_pump(state: Arc<ConnectionState>, outbound_tx: mpsc::UnboundedSender<ServerFrame>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            () = state.notify.notified() => {}
            () = shutdown.notified() => break,
        }

        let snapshot: Vec<Arc<SubscriberQueues>> = {
            let subs = state.subscriptions.lock().expect("connection subscriptions lock poisoned");
            subs.values().map(|sub| sub.queues.clone()).collect()
        };

        let mut any_closed = false;
        for queues in snapshot {
            for frame in queues.drain_ready() {
                if outbound_tx.send(frame).is_err() {
                    return;
                }
            }
            if queues.is_closed() {
                any_closed = true;
            }
        }

        if any_closed {
            shutdown.notify_waiters();
            break;
        }
    }
}

async fn run_writer<S>(
    mut sink: S,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerFrame>,
    config: Arc<Config>,
    shutdown: Arc<Notify>,
    pong_tracker: Arc<PongTracker>,
    close_code: Arc<AtomicU16>,
) where
    S: futures_util::Sink<Message> + Unpin,
{
    let mut ticker = interval(config.ping_interval());
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let text = serde_json::to_string(&frame).expect("ServerFrame always serializes");
                if !matches!(timeout(config.write_deadline(), sink.send(Message::Text(text.into()))).await, Ok(Ok(()))) {
                    break;
                }
            }
            _ = ticker.tick() => {
                if pong_tracker.note_tick() {
                    log::warn!("connection dropped: two consecutive missed pongs");
                    break;
                }
                if !matches!(timeout(config.write_deadline(), sink.send(Message::Ping(bytes::Bytes::new()))).await, Ok(Ok(()))) {
                    break;
                }
            }
            () = shutdown.notified() => break,
        }
    }

    let code = close_code.load(Ordering::SeqCst);
    let _ = sink.send(Message::Close(Some(CloseFrame { code, reason: "".into() }))).await;
}

/// Decodes and dispatches one client frame. Returns `false` on a decode
/// failure — the caller must then close the connection with code 1003
/// rather than keep reading from a peer sending malformed frames.
async fn handle_text(
    text: &str,
    principal: &Arc<Principal>,
    registry: &Arc<SessionRegistry>,
    config: &Arc<Config>,
    state: &Arc<ConnectionState>,
    outbound_tx: &mpsc::UnboundedSender<ServerFrame>,
) -> bool {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            let _ = outbound_tx.send(ServerFrame::from_wire_error(&WireError::BadFrame, None));
            return false;
        }
    };

    match frame {
        ClientFrame::Subscribe { session_name } => {
            subscribe(session_name, principal, registry, config, state, outbound_tx).await;
        }
        ClientFrame::Unsubscribe { session_name } => {
            let removed = state.subscriptions.lock().expect("connection subscriptions lock poisoned").remove(&session_name);
            if let Some(sub) = removed {
                sub.hub.post(HubEvent::Unsubscribe { sub_id: sub.sub_id });
            }
        }
        ClientFrame::SendKeys { session_name, keys } => {
            dispatch_member_event(&session_name, principal, state, outbound_tx, |sub| HubEvent::Input {
                sub,
                bytes: keys.into_bytes(),
            });
        }
        ClientFrame::Resize { session_name, cols, rows } => {
            dispatch_member_event(&session_name, principal, state, outbound_tx, |sub| HubEvent::Resize { sub, cols, rows });
        }
        ClientFrame::Claim { session_name } => {
            dispatch_member_event(&session_name, principal, state, outbound_tx, |sub| HubEvent::Claim {
                sub,
                http_reply: None,
            });
        }
        ClientFrame::Release { session_name } => {
            dispatch_member_event(&session_name, principal, state, outbound_tx, |sub| HubEvent::Release {
                sub,
                http_reply: None,
            });
        }
        ClientFrame::ForceRelease { session_name } => {
            dispatch_member_event(&session_name, principal, state, outbound_tx, |sub| HubEvent::ForceRelease {
                sub,
                http_reply: None,
            });
        }
        ClientFrame::Ping { nonce } => {
            let _ = outbound_tx.send(ServerFrame::Pong { nonce });
        }
    }
    true
}

async fn subscribe(
    session_name: String,
    principal: &Arc<Principal>,
    registry: &Arc<SessionRegistry>,
    config: &Arc<Config>,
    state: &Arc<ConnectionState>,
    outbound_tx: &mpsc::UnboundedSender<ServerFrame>,
) {
    if state.subscriptions.lock().expect("connection subscriptions lock poisoned").contains_key(&session_name) {
        return;
    }

    let hub = match registry.resolve(&session_name).await {
        Ok(hub) => hub,
        Err(MuxError::NotFound) => {
            let _ = outbound_tx.send(ServerFrame::from_wire_error(&WireError::NotFound, Some(session_name)));
            return;
        }
        Err(_) => {
            let _ = outbound_tx.send(ServerFrame::from_wire_error(&WireError::Io, Some(session_name)));
            return;
        }
    };

    let sub_id = hub::next_subscriber_id();
    let queues = SubscriberQueues::new(config.subscriber_queue_output, config.subscriber_queue_priority, state.notify.clone());
    let (reply_tx, reply_rx) = oneshot::channel();
    hub.post(HubEvent::Subscribe {
        sub: SubscriberHandle { id: sub_id, principal: principal.clone() },
        queues: queues.clone(),
        reply: reply_tx,
    });

    match reply_rx.await {
        Ok(Ok(())) => {
            state
                .subscriptions
                .lock()
                .expect("connection subscriptions lock poisoned")
                .insert(session_name, Subscription { sub_id, hub, queues });
            // The hub may have already enqueued a `claimed`/`presence` frame
            // before this reply arrived; wake the pump so it isn't stranded
            // until the next independent notification.
            state.notify.notify_one();
        }
        Ok(Err(err)) => {
            let _ = outbound_tx.send(ServerFrame::from_wire_error(&err, Some(session_name)));
        }
        Err(_) => {
            let _ = outbound_tx.send(ServerFrame::from_wire_error(&WireError::SessionLost, Some(session_name)));
        }
    }
}

fn dispatch_member_event(
    session_name: &str,
    principal: &Arc<Principal>,
    state: &Arc<ConnectionState>,
    outbound_tx: &mpsc::UnboundedSender<ServerFrame>,
    make_event: impl FnOnce(SubscriberHandle) -> HubEvent,
) {
    let hub = {
        let subs = state.subscriptions.lock().expect("connection subscriptions lock poisoned");
        subs.get(session_name).map(|sub| (sub.sub_id, sub.hub.clone()))
    };
    match hub {
        Some((sub_id, hub)) => {
            hub.post(make_event(SubscriberHandle { id: sub_id, principal: principal.clone() }));
        }
        None => {
            let _ = outbound_tx.send(ServerFrame::from_wire_error(&WireError::NotFound, Some(session_name.to_owned())));
        }
    }
}
