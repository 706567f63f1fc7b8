//! ledgerkv - An In-Memory Key-Value Server with an Append-Only Log
//!
//! This is the main entry point for the ledgerkv server.
//! It reads configuration, replays the append-only file, sets up the TCP
//! listener and handles incoming connections until a shutdown signal.

use anyhow::{bail, Context};
use ledgerkv::commands::CommandHandler;
use ledgerkv::config::{usage, Config, Invocation};
use ledgerkv::connection::{handle_connection, ConnectionStats};
use ledgerkv::persistence::{replay, Aof};
use ledgerkv::storage::Store;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long open connections get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn print_banner(config: &Config) {
    println!(
        r#"
ledgerkv v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Server started on {}
Append-only file: {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        ledgerkv::VERSION,
        config.bind_address(),
        if config.aof_enabled {
            config.aof_path.display().to_string()
        } else {
            "disabled".to_string()
        }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments and environment
    let config = match Config::load().context("Invalid configuration")? {
        Invocation::Serve(config) => config,
        Invocation::Help => {
            print!("{}", usage());
            return Ok(());
        }
        Invocation::Version => {
            println!("ledgerkv version {}", ledgerkv::VERSION);
            return Ok(());
        }
    };

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Rebuild the store from the log before accepting anyone
    let aof = Arc::new(Aof::new(config.aof_path.clone(), config.aof_enabled));
    let records = aof
        .load()
        .await
        .context("Failed to load the append-only file")?;
    let mut store = Store::new();
    replay(&mut store, &records);

    let handler = CommandHandler::new(Arc::new(Mutex::new(store)), aof);
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    print_banner(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    // Main accept loop
    tokio::select! {
        _ = accept_loop(&listener, &handler, &stats, &shutdown_rx, &mut connections) => {}
        result = shutdown_signal() => result?,
    }

    info!(
        active = stats.active_connections.load(Ordering::Relaxed),
        "Shutdown signal received, stopping server..."
    );
    drop(listener);
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        error!(
            remaining = connections.len(),
            "Connections did not close within the grace period"
        );
        connections.abort_all();
        bail!(
            "shutdown timed out after {}s with {} open connections",
            SHUTDOWN_GRACE.as_secs(),
            connections.len()
        );
    }

    info!(
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: &TcpListener,
    handler: &CommandHandler,
    stats: &Arc<ConnectionStats>,
    shutdown: &watch::Receiver<bool>,
    connections: &mut JoinSet<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    connections.spawn(handle_connection(
                        stream,
                        addr,
                        handler.clone(),
                        Arc::clone(stats),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    warn!(error = %e, "Connection task failed");
                }
            }
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => result.context("Failed to install Ctrl+C handler")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}
