//! RESP Protocol Implementation
//!
//! This module provides the Redis Serialization Protocol (RESP) codec used
//! both for client traffic and for the append-only log.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and its encoder
//! - `parser`: Strict and incremental decoders
//!
//! ## Example
//!
//! ```
//! use ledgerkv::protocol::{decode, RespValue};
//! use bytes::Bytes;
//!
//! let value = decode(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(
//!     value,
//!     RespValue::array(vec![
//!         RespValue::bulk_string(Bytes::from("GET")),
//!         RespValue::bulk_string(Bytes::from("name")),
//!     ])
//! );
//!
//! let bytes = RespValue::ok().encode().unwrap();
//! assert_eq!(bytes, b"+OK\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{decode, decode_one, parse_message, ProtocolError, ProtocolResult, RespParser};
pub use types::RespValue;
