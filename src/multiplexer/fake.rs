//! In-memory stand-in for the multiplexer adapter, used by unit and
//! integration tests so the hub/claim/broadcast machinery can be exercised
//! without shelling out to a real `tmux`.

use super::{MuxError, Multiplexer, OutputHandle, SessionDescriptor, validate_resize};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

struct FakeSession {
    output_tx: broadcast::Sender<Vec<u8>>,
    input_log: Vec<Vec<u8>>,
    size: (u16, u16),
    window_count: u32,
}

/// A fake multiplexer holding named in-memory sessions.
///
/// Tests create one, register sessions via [`FakeMultiplexer::create_session`],
/// then feed bytes to a session with [`FakeMultiplexer::push_output`] to
/// simulate the external process producing PTY output.
#[derive(Default)]
pub struct FakeMultiplexer {
    sessions: Mutex<HashMap<String, FakeSession>>,
}

impl FakeMultiplexer {
    /// Construct an empty fake multiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session so `attach`/`write`/`resize`/`list` can see it.
    pub fn create_session(&self, name: &str) {
        let mut sessions = self.sessions.lock().expect("fake mux lock poisoned");
        sessions.entry(name.to_owned()).or_insert_with(|| FakeSession {
            output_tx: broadcast::channel(256).0,
            input_log: Vec::new(),
            size: (80, 24),
            window_count: 1,
        });
    }

    /// Remove a session, simulating the external process exiting. Any
    /// attached [`OutputHandle`]s observe EOF on their next read.
    pub fn kill_session(&self, name: &str) {
        self.sessions.lock().expect("fake mux lock poisoned").remove(name);
    }

    /// Push a chunk of output to every current attachment of `name`.
    pub fn push_output(&self, name: &str, bytes: &[u8]) {
        let sessions = self.sessions.lock().expect("fake mux lock poisoned");
        if let Some(session) = sessions.get(name) {
            let _ = session.output_tx.send(bytes.to_vec());
        }
    }

    /// Every byte slice written to `name` via [`Multiplexer::write`], in order.
    #[must_use]
    pub fn writes(&self, name: &str) -> Vec<Vec<u8>> {
        self.sessions
            .lock()
            .expect("fake mux lock poisoned")
            .get(name)
            .map(|s| s.input_log.clone())
            .unwrap_or_default()
    }
}

struct FakeOutputHandle {
    rx: broadcast::Receiver<Vec<u8>>,
    closed_rx: mpsc::Receiver<()>,
}

#[async_trait]
impl OutputHandle for FakeOutputHandle {
    async fn read_chunk(&mut self) -> Option<Result<Vec<u8>, MuxError>> {
        tokio::select! {
            msg = self.rx.recv() => match msg {
                Ok(bytes) => Some(Ok(bytes)),
                Err(broadcast::error::RecvError::Closed) => None,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    Some(Err(MuxError::IoError("output lagged".into())))
                }
            },
            _ = self.closed_rx.recv() => None,
        }
    }

    async fn detach(&mut self) {
        self.closed_rx.close();
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn attach(&self, session_name: &str) -> Result<Box<dyn OutputHandle>, MuxError> {
        let sessions = self.sessions.lock().expect("fake mux lock poisoned");
        let session = sessions.get(session_name).ok_or(MuxError::NotFound)?;
        let rx = session.output_tx.subscribe();
        let (_closed_tx, closed_rx) = mpsc::channel(1);
        Ok(Box::new(FakeOutputHandle { rx, closed_rx }))
    }

    async fn write(&self, session_name: &str, bytes: &[u8]) -> Result<(), MuxError> {
        let mut sessions = self.sessions.lock().expect("fake mux lock poisoned");
        let session = sessions.get_mut(session_name).ok_or(MuxError::NotFound)?;
        session.input_log.push(bytes.to_vec());
        Ok(())
    }

    async fn resize(&self, session_name: &str, cols: u16, rows: u16) -> Result<(), MuxError> {
        validate_resize(cols, rows)?;
        let mut sessions = self.sessions.lock().expect("fake mux lock poisoned");
        let session = sessions.get_mut(session_name).ok_or(MuxError::NotFound)?;
        session.size = (cols, rows);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionDescriptor>, MuxError> {
        let sessions = self.sessions.lock().expect("fake mux lock poisoned");
        Ok(sessions
            .iter()
            .map(|(name, session)| SessionDescriptor {
                name: name.clone(),
                window_count: session.window_count,
                attached: session.output_tx.receiver_count() > 0,
                created: "1970-01-01T00:00:00Z".to_owned(),
                width: Some(session.size.0),
                height: Some(session.size.1),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_unknown_session_is_not_found() {
        let mux = FakeMultiplexer::new();
        let result = mux.attach("nope").await;
        assert_eq!(result.err(), Some(MuxError::NotFound));
    }

    #[tokio::test]
    async fn attach_and_receive_output() {
        let mux = FakeMultiplexer::new();
        mux.create_session("s1");
        let mut handle = mux.attach("s1").await.unwrap();
        mux.push_output("s1", b"hello\r\n");
        let chunk = handle.read_chunk().await.unwrap().unwrap();
        assert_eq!(chunk, b"hello\r\n");
    }

    #[tokio::test]
    async fn write_is_recorded_and_resize_validates() {
        let mux = FakeMultiplexer::new();
        mux.create_session("s1");
        mux.write("s1", b"ls\n").await.unwrap();
        assert_eq!(mux.writes("s1"), vec![b"ls\n".to_vec()]);

        assert!(mux.resize("s1", 100, 40).await.is_ok());
        assert_eq!(mux.resize("s1", 0, 40).await, Err(MuxError::InvalidArgs));
        assert_eq!(mux.write("missing", b"x").await, Err(MuxError::NotFound));
    }

    #[tokio::test]
    async fn list_reports_registered_sessions() {
        let mux = FakeMultiplexer::new();
        mux.create_session("s1");
        mux.create_session("s2");
        let mut names: Vec<String> = mux.list().await.unwrap().into_iter().map(|d| d.name).collect();
        names.sort();
        assert_eq!(names, vec!["s1".to_owned(), "s2".to_owned()]);
    }
}
