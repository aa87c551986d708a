//! `termhub` binary entry point: parses CLI flags, wires the multiplexer
//! adapter, session registry, and HTTP/WebSocket router together, then
//! drives the accept loop until a shutdown signal arrives.
//!
//! Mirrors the teacher's `main.rs` split: a `#[global_allocator]` set to
//! `mimalloc` (M-MIMALLOC-APPS), `clap`-derived CLI parsing, `env_logger`
//! initialized from the environment, and a `signal-hook` `AtomicBool` flag
//! polled from an async loop in place of the teacher's blocking
//! `while !SHUTDOWN_FLAG.load(...) { sleep(100ms) }` headless loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

use termhub::audit::LoggingAuditSink;
use termhub::auth::HeaderAuthenticator;
use termhub::config::Config;
use termhub::multiplexer::TmuxMultiplexer;
use termhub::registry::SessionRegistry;
use termhub::server::{self, AppState};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Collaborative terminal-multiplexing server: shared `tmux` sessions,
/// exclusive claims, and live presence over a single `/ws` connection.
#[derive(Parser, Debug)]
#[command(name = "termhub")]
#[command(version)]
#[command(about = "Session hub and claim arbiter for shared tmux sessions")]
struct Cli {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, default_value = "0.0.0.0:7040")]
    bind: SocketAddr,

    /// Path to the `tmux` binary, overridable for deployments where it
    /// isn't on `PATH`.
    #[arg(long, default_value = "tmux")]
    tmux_bin: String,

    /// Periodic sweep interval, in seconds, for dropping terminated hub
    /// entries out of the session registry.
    #[arg(long, default_value_t = 30)]
    gc_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {panic_info}");
        default_hook(panic_info);
    }));

    let cli = Cli::parse();
    let config = Arc::new(Config::load());
    let mux = Arc::new(TmuxMultiplexer::with_binary(cli.tmux_bin.clone()));
    let audit = Arc::new(LoggingAuditSink);
    let registry = Arc::new(SessionRegistry::new(config.clone(), mux, audit));

    let shutdown_flag = register_shutdown_flag()?;
    let gc_handle = tokio::spawn(run_gc_loop(registry.clone(), Duration::from_secs(cli.gc_interval_secs)));

    let state = Arc::new(AppState { registry: registry.clone(), config, authenticator: Arc::new(HeaderAuthenticator) });
    let router = server::router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding listener on {}", cli.bind))?;
    log::info!("termhub listening on {}", cli.bind);

    tokio::select! {
        result = axum::serve(listener, router) => {
            result.context("server accept loop failed")?;
        }
        () = wait_for_shutdown(shutdown_flag) => {
            log::info!("shutdown signal received, no longer accepting new connections");
        }
    }

    log::info!("broadcasting SERVER_SHUTDOWN to every session and draining");
    registry.shutdown_all();
    tokio::time::sleep(Duration::from_secs(3)).await;

    gc_handle.abort();
    log::info!("shutdown complete");
    Ok(())
}

/// Registers `SIGINT`/`SIGTERM`/`SIGHUP` to flip a shared flag, the same
/// signal-hook idiom the teacher's headless mode uses.
fn register_shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&flag)).context("registering SIGINT handler")?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&flag)).context("registering SIGTERM handler")?;
    signal_hook::flag::register(SIGHUP, Arc::clone(&flag)).context("registering SIGHUP handler")?;
    Ok(flag)
}

async fn wait_for_shutdown(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Periodic sweep dropping terminated hub entries out of the registry, per
/// spec §4.7's `Gc()` operation.
async fn run_gc_loop(registry: Arc<SessionRegistry>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        registry.gc();
    }
}
