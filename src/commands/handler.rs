//! Command Handler
//!
//! Session-facing glue between a decoded request and the command engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  request    │───>│  execute()  │───>│ Aof::append │     │
//! │  │  → op/args  │    │ (Store lock)│    │ (writes)    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store lock is held for the synchronous engine call and for reserving
//! the record's place in the log. It is released before the file write is
//! awaited, so other connections can see a mutation before it reaches the
//! file, but the log always replays writes in the order they were applied.

use crate::commands::engine::{execute, is_write_command};
use crate::persistence::Aof;
use crate::protocol::RespValue;
use crate::storage::Store;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// Reply sent when a write was applied in memory but could not be logged.
pub const PERSISTENCE_FAILED: &str = "persistence write failed";

/// A decoded client request, classified.
#[derive(Debug, PartialEq, Eq)]
enum Request {
    Command { operation: String, args: Vec<String> },
    /// Well-formed but unusable; answered with this error
    Rejected(RespValue),
    /// Not a command at all; no reply is sent
    Ignored,
}

impl Request {
    fn classify(value: RespValue) -> Self {
        let elements = match value {
            RespValue::Array(elements) if !elements.is_empty() => elements,
            _ => return Request::Ignored,
        };

        let mut parts = Vec::with_capacity(elements.len());
        for element in elements {
            let part = match element {
                RespValue::BulkString(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(s) => s,
                    Err(_) => {
                        return Request::Rejected(RespValue::error(
                            "invalid UTF-8 in command arguments",
                        ))
                    }
                },
                RespValue::SimpleString(s) => s,
                _ => return Request::Ignored,
            };
            parts.push(part);
        }

        let mut parts = parts.into_iter();
        let operation = parts.next().unwrap_or_default().to_uppercase();
        Request::Command {
            operation,
            args: parts.collect(),
        }
    }
}

/// Executes client requests against the shared store and log.
#[derive(Clone)]
pub struct CommandHandler {
    /// The one store of the process
    store: Arc<Mutex<Store>>,
    /// The append-only log
    aof: Arc<Aof>,
}

impl CommandHandler {
    /// Creates a handler over an already-built store.
    pub fn new(store: Arc<Mutex<Store>>, aof: Arc<Aof>) -> Self {
        Self { store, aof }
    }

    /// Returns the shared store handle.
    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    /// Executes a decoded request.
    ///
    /// Returns `None` when the request is not an array of strings; such
    /// input gets no reply.
    pub async fn execute(&self, request: RespValue) -> Option<RespValue> {
        match Request::classify(request) {
            Request::Command { operation, args } => Some(self.run(&operation, &args).await),
            Request::Rejected(reply) => Some(reply),
            Request::Ignored => None,
        }
    }

    /// Runs one command: apply to the store, then log it if it is a write.
    ///
    /// `operation` must already be upper-cased. A write takes its place in
    /// the log before the store lock is released.
    pub async fn run(&self, operation: &str, args: &[String]) -> RespValue {
        let (result, pending) = {
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            let result = execute(&mut store, operation, args);
            let pending = match &result {
                Ok(_) if is_write_command(operation) => Some(self.aof.enqueue(operation, args)),
                _ => None,
            };
            (result, pending)
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return RespValue::error(e.to_string()),
        };

        if let Some(pending) = pending {
            let logged = match pending {
                Ok(pending) => self.aof.commit(pending).await,
                Err(e) => Err(e),
            };
            if let Err(e) = logged {
                error!(operation, error = %e, "Write applied but not logged");
                return RespValue::error(PERSISTENCE_FAILED);
            }
        }

        reply
    }
}
