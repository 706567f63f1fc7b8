//! Connection Module
//!
//! This module manages individual client connections. Each client
//! connection is handled by its own async task.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use ledgerkv::connection::{handle_connection, ConnectionStats};
//! use ledgerkv::commands::CommandHandler;
//! use ledgerkv::persistence::Aof;
//! use ledgerkv::storage::Store;
//! use std::sync::{Arc, Mutex};
//! use tokio::sync::watch;
//!
//! let handler = CommandHandler::new(Arc::new(Mutex::new(Store::new())), Arc::new(Aof::disabled()));
//! let stats = Arc::new(ConnectionStats::new());
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler.clone(), stats, shutdown_rx.clone()));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
