//! Murmur application binary - composition root.
//!
//! Ties together the Murmur crates into a single executable:
//! 1. Load configuration from TOML (CLI flags and env vars override)
//! 2. Wire the transport, session controller, and event channels
//! 3. Start connecting to the transcription server
//! 4. Pump transport, connection, and session events until shutdown
//!
//! Recording is driven interactively from stdin: `start`, `stop`,
//! `status`, and `quit`. A desktop shell would drive the same controller
//! from a global hotkey instead.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use murmur_core::config::MurmurConfig;
use murmur_core::events::SessionEvent;
use murmur_core::MurmurError;
use murmur_session::{LoopbackTransport, SessionController, SessionState, TransportClient};

use cli::CliArgs;

/// Render a session event for the user. The overlay UI would draw these;
/// the CLI logs them, and prints the transcript itself to stdout.
fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connecting { .. } => tracing::info!("Connecting to server"),
        SessionEvent::Connected { .. } => tracing::info!("Connected - ready to record"),
        SessionEvent::Disconnected { .. } => tracing::info!("Disconnected"),
        SessionEvent::RecordingStarted { .. } => tracing::info!("Recording"),
        SessionEvent::RecordingStopped { .. } => tracing::info!("Waiting for transcript"),
        SessionEvent::TranscriptReceived { text, .. } => {
            tracing::info!(chars = text.len(), "Transcript received");
            println!("{text}");
        }
        SessionEvent::RetryScheduled {
            attempt, delay_ms, ..
        } => {
            tracing::info!(attempt, delay_ms, "Reconnect scheduled");
        }
        SessionEvent::RetryFailed {
            attempt, reason, ..
        } => {
            tracing::warn!(attempt, reason = %reason, "Connect attempt failed");
        }
        SessionEvent::ResponseTimedOut { .. } => {
            tracing::warn!("Server did not respond in time");
        }
        SessionEvent::SessionInterrupted { .. } => {
            tracing::warn!("Recording session interrupted");
        }
        _ => tracing::debug!(event = event.event_name(), "Session event"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = MurmurConfig::load_or_default(&config_file);
    if let Some(url) = args.resolve_server_url() {
        config.connection.server_url = url;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Murmur v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    config.validate()?;

    // Transport and event channels. The loopback transport echoes a canned
    // transcript; swap in a real server transport behind the same trait.
    let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(LoopbackTransport::new(transport_tx));
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel();

    let controller = SessionController::from_config(
        &config,
        Arc::clone(&transport) as Arc<dyn TransportClient>,
        session_tx,
        conn_tx,
    );

    if !controller.start_connecting() {
        tracing::error!("No server URL configured. Set [connection] server_url or pass --server-url");
        return Err(MurmurError::Config("server URL is required".to_string()).into());
    }

    println!("Commands: start | stop | status | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(event) = conn_rx.recv() => {
                controller.handle_connection_event(event);
            }
            Some(event) = transport_rx.recv() => {
                controller.handle_transport_event(event);
            }
            Some(event) = session_rx.recv() => {
                render_event(&event);
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match line.trim() {
                    "start" => {
                        if !controller.start_recording().await {
                            tracing::warn!(state = %controller.state(), "Cannot start recording");
                        }
                    }
                    "stop" => {
                        if !controller.stop_recording().await {
                            tracing::warn!(state = %controller.state(), "Not recording");
                        }
                    }
                    "status" => {
                        match controller.retry_status() {
                            Some(status) => println!(
                                "{} (retry attempt {}, next in {:?})",
                                controller.state(),
                                status.attempt,
                                status.next_delay
                            ),
                            None => println!("{}", controller.state()),
                        }
                    }
                    "quit" | "exit" => break,
                    "" => {}
                    other => println!("Unknown command: {other}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }

        // The controller never reconnects on its own; kicking off a fresh
        // connect after a forced disconnect is this layer's call.
        if controller.state() == SessionState::Disconnected {
            controller.start_connecting();
        }
    }

    // Teardown: cancel pending retries and the watchdog, then close.
    controller.stop();
    match transport.disconnect().await {
        Ok(()) | Err(MurmurError::NotConnected) => {}
        Err(e) => tracing::warn!(error = %e, "Disconnect failed during shutdown"),
    }

    Ok(())
}
