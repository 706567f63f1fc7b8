//! Persistence Module
//!
//! Durability through an append-only file of write commands.
//!
//! ## Ordering
//!
//! ```text
//! live write:  [Store lock: engine mutates Store ──> Aof::enqueue]
//!                  ──> Aof::commit ──> reply
//! startup:     Aof::load ──> replay (no appends) ──> accept connections
//! ```
//!
//! A live command is applied before it is logged, and its log position is
//! taken under the same lock, so the log replays writes in the order they
//! were applied. If the append fails the mutation stays in memory and the
//! client is told the write failed.

pub mod aof;
pub mod replay;

pub use aof::{parse_records, Aof, AofError, AofRecord, PendingAppend};
pub use replay::{replay, ReplayStats};
