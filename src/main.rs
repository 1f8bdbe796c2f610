//! callmgr - AMI event monitor
//!
//! Connects to an Asterisk manager, logs every pushed event as JSON and keeps
//! the session alive across connection loss.

use callmgr_client::{Config, Session, SessionStreams};
use callmgr_events::EventRegistry;
use callmgr_protocol::Event;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pause between connection attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if CALLMGR_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Ok(path) = std::env::var("CALLMGR_CONFIG") {
        tracing::info!("Loaded config from {}", path);
    }

    let session_config = config.to_session_config();
    tracing::info!("Starting callmgr monitor");
    tracing::info!("  Manager: {}", session_config.addr);
    match session_config.tls {
        Some(ref tls) if tls.insecure => {
            tracing::warn!("  TLS: enabled, certificate verification disabled")
        }
        Some(_) => tracing::info!("  TLS: enabled"),
        None => tracing::info!("  TLS: disabled"),
    }
    match session_config.login_credentials() {
        Some(creds) => tracing::info!("  User: {}", creds.username),
        None => tracing::info!("  User: none, skipping login"),
    }

    let registry = EventRegistry::builtin();

    let (mut session, mut streams) = loop {
        match Session::connect(session_config.clone()).await {
            Ok(connected) => break connected,
            Err(e) if e.is_retryable() => {
                tracing::warn!("Connect failed: {}, retrying in {:?}", e, RECONNECT_DELAY);
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
            Err(e) => {
                tracing::error!("Cannot start session: {}", e);
                return Err(e.into());
            }
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
            Some(event) = streams.events.recv() => log_event(&registry, &event),
            Some(err) = streams.errors.recv() => tracing::warn!("Manager error: {}", err),
            Some(err) = streams.fatal.recv() => {
                tracing::warn!("Connection lost: {}", err);
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received shutdown signal");
                        break;
                    }
                    fresh = reconnect(&mut session) => streams = fresh,
                }
            }
        }
    }

    if let Err(e) = session.close().await {
        tracing::warn!("Close failed: {}", e);
    }
    tracing::info!("Monitor stopped");
    Ok(())
}

async fn reconnect(session: &mut Session) -> SessionStreams {
    loop {
        tokio::time::sleep(RECONNECT_DELAY).await;
        match session.reconnect().await {
            Ok(streams) => {
                tracing::info!("Reconnected to {}", session.config().addr);
                return streams;
            }
            Err(e) => tracing::warn!("Reconnect failed: {}, retrying in {:?}", e, RECONNECT_DELAY),
        }
    }
}

fn log_event(registry: &EventRegistry, event: &Event) {
    let typed = registry.decode(event);
    match serde_json::to_string(&typed) {
        Ok(json) => tracing::info!(event = typed.name(), "{}", json),
        Err(e) => tracing::warn!("Cannot render {} event: {}", event.name, e),
    }
}
