//! Exercises [`TmuxMultiplexer`]'s `list`/`write`/`resize` against a stub
//! `tmux` binary instead of a real one, the way `TmuxMultiplexer::with_binary`'s
//! doc comment says it's meant to be tested.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use termhub::multiplexer::{Multiplexer, MuxError, TmuxMultiplexer};

/// Writes an executable shell script standing in for `tmux`: it recognizes
/// `list-sessions`, `send-keys`, and `resize-window`, and fails with a
/// "can't find session" stderr message for the session name `ghost` so the
/// adapter's [`MuxError::NotFound`] classification can be exercised without
/// a real tmux server.
fn stub_tmux() -> tempfile::TempPath {
    let script = r#"#!/usr/bin/env bash
set -euo pipefail
case "$1" in
  list-sessions)
    printf 'work\t2\t1\t1700000000\t80\t24\n'
    exit 0
    ;;
  send-keys)
    name="$3"
    if [ "$name" = "ghost" ]; then
      echo "can't find session: ghost" >&2
      exit 1
    fi
    exit 0
    ;;
  resize-window)
    name="$3"
    if [ "$name" = "ghost" ]; then
      echo "can't find session: ghost" >&2
      exit 1
    fi
    exit 0
    ;;
  *)
    echo "unsupported stub command: $1" >&2
    exit 2
    ;;
esac
"#;
    let mut file = tempfile::NamedTempFile::new().expect("create temp stub");
    file.write_all(script.as_bytes()).expect("write stub script");
    let path = file.into_temp_path();
    let mut perms = std::fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub executable");
    path
}

#[tokio::test]
async fn list_parses_stub_output() {
    let stub = stub_tmux();
    let mux = TmuxMultiplexer::with_binary(stub.to_string_lossy().into_owned());

    let sessions = mux.list().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "work");
    assert_eq!(sessions[0].window_count, 2);
    assert!(sessions[0].attached);
    assert_eq!(sessions[0].width, Some(80));
    assert_eq!(sessions[0].height, Some(24));
}

#[tokio::test]
async fn write_succeeds_for_a_known_session() {
    let stub = stub_tmux();
    let mux = TmuxMultiplexer::with_binary(stub.to_string_lossy().into_owned());
    mux.write("work", b"ls\n").await.unwrap();
}

#[tokio::test]
async fn write_classifies_missing_session_as_not_found() {
    let stub = stub_tmux();
    let mux = TmuxMultiplexer::with_binary(stub.to_string_lossy().into_owned());
    assert_eq!(mux.write("ghost", b"ls\n").await, Err(MuxError::NotFound));
}

#[tokio::test]
async fn resize_validates_bounds_before_shelling_out() {
    let stub = stub_tmux();
    let mux = TmuxMultiplexer::with_binary(stub.to_string_lossy().into_owned());
    assert_eq!(mux.resize("work", 0, 24).await, Err(MuxError::InvalidArgs));
    assert!(mux.resize("work", 120, 40).await.is_ok());
    assert_eq!(mux.resize("ghost", 80, 24).await, Err(MuxError::NotFound));
}
