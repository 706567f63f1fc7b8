//! Storage Module
//!
//! The in-memory key space. One [`Store`] is built at startup (empty, then
//! filled by log replay) and handed to the command engine; nothing else
//! mutates it.
//!
//! ## Example
//!
//! ```
//! use ledgerkv::storage::{Store, StoredValue};
//!
//! let mut store = Store::new();
//! store.set("counter".to_string(), StoredValue::from_text("10"));
//! assert_eq!(store.get("counter").and_then(StoredValue::as_int), Some(10));
//! ```

pub mod store;

pub use store::{Store, StoredValue};
