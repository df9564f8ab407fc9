//! `TaskMirror` — terminal task list mirrored against a remote document store.
//!
//! Launches the TUI and connects to a store gateway when one is configured.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskmirror/config.toml`).
//!
//! ```bash
//! # Offline (frozen empty list)
//! cargo run --bin taskmirror
//!
//! # Mirror a store
//! cargo run --bin taskmirror -- --gateway-url ws://127.0.0.1:9100/ws
//!
//! # Or via environment variable
//! GATEWAY_URL=ws://127.0.0.1:9100/ws cargo run --bin taskmirror
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use taskmirror::app::App;
use taskmirror::config::{CliArgs, ClientConfig};
use taskmirror::gateway::remote::RemoteGateway;
use taskmirror::runtime::{self, SyncCommand, SyncEvent};
use taskmirror::ui;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Initialize logging before terminal setup (logs go to file, not stdout).
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("taskmirror starting");

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app.
    let result = run_app(&mut terminal, &config).await;

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("taskmirror exiting");
    result
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, since ratatui owns the
/// terminal). Returns a [`WorkerGuard`] that must be held until shutdown to
/// ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskmirror.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main application loop with optional live mirroring.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &ClientConfig,
) -> io::Result<()> {
    let mut app = App::new(config.timestamp_format.clone());

    // Connect to the gateway and start the sync session, if configured.
    let (cmd_tx, mut evt_rx) = match config.gateway_url.as_deref() {
        Some(url) => match connect_sync(url, config.channel_capacity).await {
            Ok((tx, rx)) => {
                app.connected = true;
                app.set_status("mirroring live");
                (Some(tx), Some(rx))
            }
            Err(reason) => {
                app.set_status(format!("could not reach the store — offline ({reason})"));
                (None, None)
            }
        },
        None => {
            app.set_status("no gateway configured — offline");
            (None, None)
        }
    };

    loop {
        // Step 1: Draw the UI frame.
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Step 2: Drain all pending sync events (non-blocking).
        if let Some(ref mut rx) = evt_rx {
            drain_sync_events(&mut app, rx);
        }

        // Step 3: Poll for terminal input events.
        if event::poll(config.poll_timeout)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            if let Some(cmd) = app.handle_key_event(key)
                && let Some(ref tx) = cmd_tx
            {
                match tx.try_send(cmd) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        app.set_status("sync busy — try again");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        app.connected = false;
                        app.set_status("sync session ended");
                    }
                }
            }
        }

        if app.should_quit {
            if let Some(ref tx) = cmd_tx {
                let _ = tx.try_send(SyncCommand::Shutdown);
            }
            return Ok(());
        }
    }
}

/// Connect the gateway and spawn the sync driver.
async fn connect_sync(
    url: &str,
    capacity: usize,
) -> Result<(mpsc::Sender<SyncCommand>, mpsc::Receiver<SyncEvent>), String> {
    let gateway = RemoteGateway::connect(url)
        .await
        .map_err(|e| e.to_string())?;
    runtime::spawn_sync(Arc::new(gateway), capacity)
        .await
        .map_err(|e| e.to_string())
}

/// Drain all pending sync events from the receiver and apply them to the app.
fn drain_sync_events(app: &mut App, rx: &mut mpsc::Receiver<SyncEvent>) {
    while let Ok(event) = rx.try_recv() {
        match event {
            SyncEvent::ListChanged { tasks } => {
                app.set_tasks(tasks);
            }
            SyncEvent::InputAccepted => {
                app.clear_input();
                app.set_status("");
            }
            SyncEvent::SubmitFailed { reason } => {
                // Input stays in the box for manual retry.
                app.set_status(format!("add failed: {reason}"));
            }
            SyncEvent::DeleteFailed { reason } => {
                app.set_status(format!("delete failed: {reason}"));
            }
            SyncEvent::SubscriptionLost { reason } => {
                app.connected = false;
                app.set_status(format!("subscription lost: {reason} — list frozen"));
            }
            SyncEvent::Closed => {
                app.connected = false;
                app.set_status("sync session ended");
            }
        }
    }
}
