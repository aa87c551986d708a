//! `tmux`-backed [`Multiplexer`] implementation.
//!
//! Attaches to a named tmux session through a PTY (`tmux attach-session -t
//! <name>`), exactly mirroring the teacher's `PtySession`: a background
//! reader thread owns the PTY's read half and forwards raw bytes (ANSI
//! sequences included, no line framing) over a channel; the write half and
//! resize go through `portable_pty`'s `MasterPty`. `tmux`'s own
//! `resize-window`/`list-sessions` are shelled out to directly since they
//! don't go through the attached PTY.

use super::{MuxError, Multiplexer, OutputHandle, SessionDescriptor, validate_resize};
use async_trait::async_trait;
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use std::io::Read;
use std::process::Command;
use tokio::sync::mpsc;

/// Drives `tmux` as the external terminal multiplexer.
pub struct TmuxMultiplexer {
    /// Path to the `tmux` binary, overridable for tests against a fake PATH.
    tmux_bin: String,
}

impl TmuxMultiplexer {
    /// Construct a multiplexer that shells out to `tmux` on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self { tmux_bin: "tmux".to_owned() }
    }

    /// Construct a multiplexer that shells out to an explicit `tmux` binary
    /// path (used by tests to point at a stub).
    #[must_use]
    pub fn with_binary(tmux_bin: impl Into<String>) -> Self {
        Self { tmux_bin: tmux_bin.into() }
    }
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

struct TmuxOutputHandle {
    rx: mpsc::Receiver<Result<Vec<u8>, MuxError>>,
    master: Box<dyn MasterPty + Send>,
}

#[async_trait]
impl OutputHandle for TmuxOutputHandle {
    async fn read_chunk(&mut self) -> Option<Result<Vec<u8>, MuxError>> {
        self.rx.recv().await
    }

    async fn detach(&mut self) {
        self.rx.close();
        // Dropping the master PTY's file descriptor detaches tmux's client
        // without killing the session — tmux sessions survive client exit.
        drop(std::mem::replace(&mut self.master, dummy_master()));
    }
}

fn dummy_master() -> Box<dyn MasterPty + Send> {
    native_pty_system()
        .openpty(PtySize { rows: 1, cols: 1, pixel_width: 0, pixel_height: 0 })
        .expect("opening a throwaway 1x1 pty cannot fail")
        .master
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    async fn attach(&self, session_name: &str) -> Result<Box<dyn OutputHandle>, MuxError> {
        let known = self.list().await?;
        if !known.iter().any(|d| d.name == session_name) {
            return Err(MuxError::NotFound);
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| MuxError::IoError(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&self.tmux_bin);
        cmd.args(["attach-session", "-t", session_name]);

        let _child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| MuxError::IoError(e.to_string()))?;

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| MuxError::IoError(e.to_string()))?;

        let (tx, rx) = mpsc::channel(256);
        std::thread::Builder::new()
            .name(format!("tmux-reader-{session_name}"))
            .spawn(move || {
                let mut buf = [0u8; 16 * 1024];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.blocking_send(Err(MuxError::IoError(e.to_string())));
                            break;
                        }
                    }
                }
            })
            .map_err(|e| MuxError::IoError(e.to_string()))?;

        Ok(Box::new(TmuxOutputHandle { rx, master: pair.master }))
    }

    async fn write(&self, session_name: &str, bytes: &[u8]) -> Result<(), MuxError> {
        let session_name = session_name.to_owned();
        let bytes = bytes.to_vec();
        let tmux_bin = self.tmux_bin.clone();
        tokio::task::spawn_blocking(move || write_via_send_keys(&tmux_bin, &session_name, &bytes))
            .await
            .map_err(|e| MuxError::IoError(e.to_string()))?
    }

    async fn resize(&self, session_name: &str, cols: u16, rows: u16) -> Result<(), MuxError> {
        validate_resize(cols, rows)?;
        let session_name = session_name.to_owned();
        let tmux_bin = self.tmux_bin.clone();
        tokio::task::spawn_blocking(move || {
            run_tmux(
                &tmux_bin,
                &[
                    "resize-window",
                    "-t",
                    &session_name,
                    "-x",
                    &cols.to_string(),
                    "-y",
                    &rows.to_string(),
                ],
            )
        })
        .await
        .map_err(|e| MuxError::IoError(e.to_string()))?
    }

    async fn list(&self) -> Result<Vec<SessionDescriptor>, MuxError> {
        let tmux_bin = self.tmux_bin.clone();
        tokio::task::spawn_blocking(move || list_sessions(&tmux_bin))
            .await
            .map_err(|e| MuxError::IoError(e.to_string()))?
    }
}

// Writes input through tmux's own `send-keys -l` (literal) rather than the
// attached PTY's master writer, so input can be delivered even from a
// `write` call that races an independent `attach` — tmux itself serializes
// concurrent `send-keys` invocations against the same session.
fn write_via_send_keys(tmux_bin: &str, session_name: &str, bytes: &[u8]) -> Result<(), MuxError> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let mut child = Command::new(tmux_bin)
        .args(["send-keys", "-t", session_name, "-l", "--"])
        .arg(&text)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| MuxError::IoError(e.to_string()))?;
    let status = child.wait().map_err(|e| MuxError::IoError(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(classify_tmux_failure(&mut child))
    }
}

fn run_tmux(tmux_bin: &str, args: &[&str]) -> Result<(), MuxError> {
    let mut child = Command::new(tmux_bin)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| MuxError::IoError(e.to_string()))?;
    let status = child.wait().map_err(|e| MuxError::IoError(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(classify_tmux_failure(&mut child))
    }
}

fn classify_tmux_failure(child: &mut std::process::Child) -> MuxError {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }
    if stderr.contains("can't find session") || stderr.contains("session not found") {
        MuxError::NotFound
    } else {
        MuxError::IoError(stderr.trim().to_owned())
    }
}

fn list_sessions(tmux_bin: &str) -> Result<Vec<SessionDescriptor>, MuxError> {
    let format = "#{session_name}\t#{session_windows}\t#{session_attached}\t#{session_created}\t#{session_width}\t#{session_height}";
    let output = Command::new(tmux_bin)
        .args(["list-sessions", "-F", format])
        .output()
        .map_err(|e| MuxError::IoError(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // tmux exits non-zero with "no server running" when nothing is up —
        // that's an empty list, not an error.
        if stderr.contains("no server running") || stderr.contains("No such file or directory") {
            return Ok(Vec::new());
        }
        return Err(MuxError::IoError(stderr.trim().to_owned()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().filter_map(parse_session_line).collect())
}

fn parse_session_line(line: &str) -> Option<SessionDescriptor> {
    let mut fields = line.splitn(6, '\t');
    let name = fields.next()?.to_owned();
    let window_count = fields.next()?.parse().ok()?;
    let attached = fields.next()? != "0";
    let created = fields.next()?.to_owned();
    let width = fields.next().and_then(|v| v.parse().ok());
    let height = fields.next().and_then(|v| v.parse().ok());
    Some(SessionDescriptor { name, window_count, attached, created, width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_session_line_reads_all_fields() {
        let line = "work\t3\t1\t1700000000\t80\t24";
        let descriptor = parse_session_line(line).unwrap();
        assert_eq!(descriptor.name, "work");
        assert_eq!(descriptor.window_count, 3);
        assert!(descriptor.attached);
        assert_eq!(descriptor.width, Some(80));
        assert_eq!(descriptor.height, Some(24));
    }

    #[test]
    fn parse_session_line_handles_unattached() {
        let line = "idle\t1\t0\t1700000000\t\t";
        let descriptor = parse_session_line(line).unwrap();
        assert!(!descriptor.attached);
        assert_eq!(descriptor.width, None);
        assert_eq!(descriptor.height, None);
    }

    #[test]
    fn parse_session_line_rejects_truncated_input() {
        assert!(parse_session_line("only-a-name").is_none());
    }
}
