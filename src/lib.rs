//! # ledgerkv - An In-Memory Key-Value Server with an Append-Only Log
//!
//! ledgerkv speaks the Redis serialization protocol (RESP) over TCP, keeps
//! its data in memory and records every successful write in an append-only
//! file. On startup the file is replayed so the data set survives restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              ledgerkv                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                           ┌───────────────────┼───────────────┐         │
//! │                           ▼                                   ▼         │
//! │  ┌─────────────┐    ┌─────────────┐                    ┌─────────────┐  │
//! │  │   RESP      │    │   Store     │<──── replay ───────│  Aof        │  │
//! │  │   Codec     │    │ (one Mutex) │     at startup     │ (log file)  │  │
//! │  └─────────────┘    └─────────────┘                    └─────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use ledgerkv::commands::CommandHandler;
//! use ledgerkv::connection::{handle_connection, ConnectionStats};
//! use ledgerkv::persistence::{replay, Aof};
//! use ledgerkv::storage::Store;
//! use std::sync::{Arc, Mutex};
//! use tokio::net::TcpListener;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let aof = Arc::new(Aof::new("appendonly.aof", true));
//!
//!     let mut store = Store::new();
//!     replay(&mut store, &aof.load().await?);
//!
//!     let handler = CommandHandler::new(Arc::new(Mutex::new(store)), aof);
//!     let stats = Arc::new(ConnectionStats::new());
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             handler.clone(),
//!             Arc::clone(&stats),
//!             shutdown_rx.clone(),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value`, `GET key`, `GETDEL key`
//! - `DEL key [key ...]`, `EXISTS key [key ...]`
//! - `INCR key` / `INCRBY key increment`
//! - `DECR key` / `DECRBY key decrement`
//! - `FLUSHALL`
//! - `PING [message]`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value type, decoder and encoder
//! - [`storage`]: The key-value store and its value type
//! - [`commands`]: Command engine and the session-facing handler
//! - [`persistence`]: Append-only file and startup replay
//! - [`connection`]: Client connection management
//! - [`config`]: Flag and environment configuration
//!
//! ## Durability
//!
//! A write is applied in memory first and appended to the log afterwards.
//! Only writes that succeeded are logged, so replaying the log is
//! deterministic: every prefix of the file rebuilds exactly the state the
//! server had after those commands. `GETDEL` removes keys but is not
//! logged; a key it removed comes back after a restart.

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, ConfigError, Invocation};
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{replay, Aof, AofError, AofRecord};
pub use protocol::{ProtocolError, RespParser, RespValue};
pub use storage::{Store, StoredValue};

/// The default port ledgerkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host ledgerkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of ledgerkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
