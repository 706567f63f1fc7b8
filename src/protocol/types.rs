//! RESP (Redis Serialization Protocol) Data Types
//!
//! Each RESP value starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! All lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR value is not an integer or out of range\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Null: `$-1\r\n`
//!
//! The encoder and decoder are deliberately not mirror images: an
//! [`RespValue::Error`] is always written with an `ERR ` prefix but a `-` line
//! decodes back into a [`RespValue::SimpleString`], and [`RespValue::Boolean`]
//! is written as an integer and never produced by decoding.

use crate::protocol::parser::{ProtocolError, ProtocolResult};
use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// Prefix written in front of every error message.
pub const ERROR_PREFIX: &str = "ERR ";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A value in the RESP protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status line. Cannot contain CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Failure message, without the `ERR ` prefix.
    /// Format: `-ERR <message>\r\n`
    Error(String),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe strings.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Absent bulk string: `$-1\r\n`
    Null,

    /// Arrays can contain any RESP type, including nested arrays.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),

    /// Absent array. Decoded from `*-1\r\n` but written as `$-1\r\n`,
    /// the same bytes as [`RespValue::Null`].
    NullArray,

    /// Encode-only; written as the integer 1 or 0.
    Boolean(bool),
}

impl RespValue {
    /// Creates a new simple string response.
    ///
    /// # Example
    /// ```
    /// use ledgerkv::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error response. The `ERR ` prefix is added on encode.
    ///
    /// # Example
    /// ```
    /// use ledgerkv::protocol::types::RespValue;
    /// let err = RespValue::error("value is not an integer or out of range");
    /// assert_eq!(
    ///     err.encode().unwrap(),
    ///     b"-ERR value is not an integer or out of range\r\n"
    /// );
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string response.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Encodes the value into its wire format.
    ///
    /// Fails with [`ProtocolError::UnsupportedValue`] when a simple string
    /// or error message contains CR or LF, which the line-based forms
    /// cannot carry.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encodes the value into an existing buffer.
    ///
    /// On failure `buf` may hold a partial encoding and should be discarded.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> ProtocolResult<()> {
        match self {
            RespValue::SimpleString(s) => {
                ensure_single_line(s, "simple string")?;
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                ensure_single_line(s, "error message")?;
                buf.push(prefix::ERROR);
                buf.extend_from_slice(ERROR_PREFIX.as_bytes());
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => encode_integer(*n, buf),
            RespValue::Boolean(b) => encode_integer(i64::from(*b), buf),
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null | RespValue::NullArray => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.encode_into(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

fn encode_integer(n: i64, buf: &mut Vec<u8>) {
    buf.push(prefix::INTEGER);
    buf.extend_from_slice(n.to_string().as_bytes());
    buf.extend_from_slice(CRLF);
}

fn ensure_single_line(s: &str, what: &'static str) -> ProtocolResult<()> {
    if s.contains(['\r', '\n']) {
        return Err(ProtocolError::UnsupportedValue(what));
    }
    Ok(())
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) ERR {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::Boolean(b) => write!(f, "(integer) {}", i64::from(*b)),
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::Null | RespValue::NullArray => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
