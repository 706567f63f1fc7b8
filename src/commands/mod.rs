//! Command Module
//!
//! Receives decoded requests, executes them against the store, logs the
//! writes and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  request → operation + args, log writes
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ engine::execute │  validate, then mutate
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET`, `GET`, `GETDEL`, `DEL`, `EXISTS`
//! - `INCR`, `DECR`, `INCRBY`, `DECRBY`
//! - `FLUSHALL`, `PING`

pub mod engine;
pub mod handler;

pub use engine::{execute, is_write_command, CommandError, CommandResult, WRITE_COMMANDS};
pub use handler::CommandHandler;
