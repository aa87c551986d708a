//! Process-wide table of live session hubs, keyed by session name.
//!
//! Grounded on the teacher's registry pattern: a `DashMap` keyed by name,
//! with `entry()` used to atomically compare-and-insert so two concurrent
//! `resolve` calls for a never-before-seen session race to create exactly
//! one hub, not two.

use std::sync::Arc;

use dashmap::DashMap;

use crate::audit::AuditSink;
use crate::config::Config;
use crate::hub::{self, HubHandle};
use crate::multiplexer::{MuxError, Multiplexer, SessionDescriptor};

/// Owns every live [`HubHandle`] and lazily spawns new ones on first
/// subscribe, per spec §4.2.
pub struct SessionRegistry {
    hubs: DashMap<String, HubHandle>,
    config: Arc<Config>,
    mux: Arc<dyn Multiplexer>,
    audit: Arc<dyn AuditSink>,
}

impl SessionRegistry {
    /// Construct an empty registry over `mux`.
    #[must_use]
    pub fn new(config: Arc<Config>, mux: Arc<dyn Multiplexer>, audit: Arc<dyn AuditSink>) -> Self {
        Self { hubs: DashMap::new(), config, mux, audit }
    }

    /// Resolve `session_name` to a live hub, spawning one if this is the
    /// first resolve for that name or the previous hub already terminated.
    /// Fails with [`MuxError::NotFound`] if the multiplexer doesn't know the
    /// session at all.
    pub async fn resolve(&self, session_name: &str) -> Result<HubHandle, MuxError> {
        if let Some(existing) = self.hubs.get(session_name) {
            if !existing.is_terminated() {
                return Ok(existing.clone());
            }
        }

        let known = self.mux.list().await?;
        if !known.iter().any(|d| d.name == session_name) {
            return Err(MuxError::NotFound);
        }

        match self.hubs.entry(session_name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().is_terminated() {
                    let handle = hub::spawn(session_name.to_owned(), self.config.clone(), self.mux.clone(), self.audit.clone());
                    entry.insert(handle.clone());
                    Ok(handle)
                } else {
                    Ok(entry.get().clone())
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let handle = hub::spawn(session_name.to_owned(), self.config.clone(), self.mux.clone(), self.audit.clone());
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Look up a hub handle without spawning one. Used by the `QueryClaim`
    /// HTTP boundary, which should report "unclaimed" for a session with no
    /// live hub rather than spawn one just to answer a read.
    #[must_use]
    pub fn lookup(&self, session_name: &str) -> Option<HubHandle> {
        self.hubs.get(session_name).map(|h| h.clone()).filter(|h| !h.is_terminated())
    }

    /// Drop every terminated hub entry. Intended to run on a periodic
    /// timer from `main`, so the map doesn't grow unboundedly with
    /// long-dead session names.
    pub fn gc(&self) {
        self.hubs.retain(|_, handle| !handle.is_terminated());
    }

    /// Pass through the multiplexer's session listing, for the `GET
    /// /api/terminal/sessions` boundary handler.
    pub async fn list_multiplexer_sessions(&self) -> Result<Vec<SessionDescriptor>, MuxError> {
        self.mux.list().await
    }

    /// Broadcast `SERVER_SHUTDOWN` to every member of every live hub and
    /// tear each hub down. Posting is fire-and-forget: the caller is
    /// responsible for waiting out the drain deadline afterward (spec §5's
    /// shutdown order) before the process exits.
    pub fn shutdown_all(&self) {
        for hub in &self.hubs {
            hub.post(hub::HubEvent::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LoggingAuditSink;
    use crate::multiplexer::FakeMultiplexer;

    fn registry() -> (SessionRegistry, Arc<FakeMultiplexer>) {
        let mux = Arc::new(FakeMultiplexer::new());
        let registry = SessionRegistry::new(Arc::new(Config::default()), mux.clone(), Arc::new(LoggingAuditSink));
        (registry, mux)
    }

    #[tokio::test]
    async fn resolve_fails_for_unknown_session() {
        let (registry, _mux) = registry();
        let result = registry.resolve("ghost").await;
        assert_eq!(result.unwrap_err(), MuxError::NotFound);
    }

    #[tokio::test]
    async fn resolve_spawns_once_and_reuses_the_handle() {
        let (registry, mux) = registry();
        mux.create_session("work");
        let first = registry.resolve("work").await.unwrap();
        let second = registry.resolve("work").await.unwrap();
        assert_eq!(first.session_name, second.session_name);
    }

    #[tokio::test]
    async fn lookup_returns_none_without_spawning() {
        let (registry, mux) = registry();
        mux.create_session("work");
        assert!(registry.lookup("work").is_none());
        registry.resolve("work").await.unwrap();
        assert!(registry.lookup("work").is_some());
    }

    #[tokio::test]
    async fn gc_drops_terminated_hubs() {
        let (registry, mux) = registry();
        mux.create_session("work");
        registry.resolve("work").await.unwrap();
        mux.kill_session("work");
        // Give the hub's reader task a moment to observe EOF and terminate.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        registry.gc();
        assert!(registry.lookup("work").is_none());
    }
}
