//! RESP Protocol Decoder
//!
//! The decoder walks a byte buffer from a given offset and returns the
//! decoded value together with the offset just past it. Two entry points
//! sit on top of the same recursive walk:
//!
//! - [`decode_one`] is strict: a value cut off by the end of the buffer is
//!   an error. The append-only log uses it to walk a file of concatenated
//!   records.
//! - [`RespParser::parse`] is incremental: a value that is merely incomplete
//!   yields `Ok(None)` so a connection can wait for more bytes.
//!
//! ## How the Parser Works
//!
//! `RespParser::parse` returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the message is incomplete
//! - `Err(ProtocolError)` - Invalid protocol data
//!
//! This lets the caller append incoming network data to a buffer, try to
//! parse, advance the buffer by `consumed` bytes on success and wait for
//! more data otherwise.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors raised while decoding or encoding RESP values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// A line has no CRLF before the end of the buffer
    #[error("missing CRLF terminator")]
    MissingTerminator,

    /// A bulk string length or array count that is not a valid size
    #[error("malformed length: {0}")]
    MalformedLength(String),

    /// A bulk string whose payload or trailing CRLF is not where its length says
    #[error("truncated value: expected {expected} bytes followed by CRLF, {available} available")]
    TruncatedValue { expected: usize, available: usize },

    /// Unknown type prefix byte
    #[error("unknown type tag: {0:#04x}")]
    UnknownTypeTag(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Arrays nested deeper than [`MAX_NESTING_DEPTH`]
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// The bulk string exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A value the wire format cannot represent
    #[error("unsupported value: {0} contains CR or LF")]
    UnsupportedValue(&'static str),
}

impl ProtocolError {
    /// Returns true when the error only means the buffer ended early, so the
    /// same bytes followed by more data could still decode.
    pub fn is_incomplete(&self) -> bool {
        match self {
            ProtocolError::MissingTerminator => true,
            ProtocolError::TruncatedValue {
                expected,
                available,
            } => *available < expected + CRLF.len(),
            _ => false,
        }
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on the capacity reserved up front for a declared array count.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

/// A RESP decoder that tracks array nesting depth.
///
/// # Example
///
/// ```
/// use ledgerkv::protocol::parser::RespParser;
/// use ledgerkv::protocol::RespValue;
///
/// let mut parser = RespParser::new();
/// let buf = b"*1\r\n$4\r\nPING\r\n*1\r\n$4";
///
/// let (value, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(consumed, 14);
/// assert!(matches!(value, RespValue::Array(_)));
///
/// // The second command has not fully arrived yet.
/// assert!(parser.parse(&buf[consumed..]).unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Decodes exactly one value starting at `offset`.
    ///
    /// Returns the value and the offset just past it. Running out of input
    /// is an error here; see [`RespParser::parse`] for the incremental form.
    pub fn decode_one(&mut self, buf: &[u8], offset: usize) -> ProtocolResult<(RespValue, usize)> {
        self.depth = 0;
        self.parse_value(buf, offset)
    }

    /// Attempts to parse a RESP value from the start of the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&mut self, buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
        match self.decode_one(buf, 0) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Internal recursive parsing function.
    fn parse_value(&mut self, buf: &[u8], pos: usize) -> ProtocolResult<(RespValue, usize)> {
        let tag = *buf.get(pos).ok_or(ProtocolError::MissingTerminator)?;

        match tag {
            prefix::SIMPLE_STRING | prefix::ERROR => self.parse_line(buf, pos),
            prefix::INTEGER => self.parse_integer(buf, pos),
            prefix::BULK_STRING => self.parse_bulk_string(buf, pos),
            prefix::ARRAY => self.parse_array(buf, pos),
            other => Err(ProtocolError::UnknownTypeTag(other)),
        }
    }

    /// Parses `+<string>\r\n` and `-<message>\r\n`.
    ///
    /// Both come back as a simple string holding the literal line; an error
    /// line is not turned into [`RespValue::Error`].
    fn parse_line(&mut self, buf: &[u8], pos: usize) -> ProtocolResult<(RespValue, usize)> {
        let (line, next) = read_line(buf, pos + 1)?;
        let s = std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?;
        Ok((RespValue::SimpleString(s.to_string()), next))
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8], pos: usize) -> ProtocolResult<(RespValue, usize)> {
        let (line, next) = read_line(buf, pos + 1)?;
        let n = std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))?;
        Ok((RespValue::Integer(n), next))
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8], pos: usize) -> ProtocolResult<(RespValue, usize)> {
        let (line, data_start) = read_line(buf, pos + 1)?;
        let length = parse_length(line)?;

        if length == -1 {
            return Ok((RespValue::Null, data_start));
        }
        if length < 0 {
            return Err(ProtocolError::MalformedLength(length.to_string()));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let available = buf.len() - data_start;
        let data_end = data_start + length;
        if available < length + CRLF.len() || &buf[data_end..data_end + CRLF.len()] != CRLF {
            return Err(ProtocolError::TruncatedValue {
                expected: length,
                available,
            });
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok((RespValue::BulkString(data), data_end + CRLF.len()))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8], pos: usize) -> ProtocolResult<(RespValue, usize)> {
        let (line, mut next) = read_line(buf, pos + 1)?;
        let count = parse_length(line)?;

        if count == -1 {
            return Ok((RespValue::NullArray, next));
        }
        if count < 0 {
            return Err(ProtocolError::MalformedLength(count.to_string()));
        }

        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
        for _ in 0..count {
            let (value, after) = self.parse_value(buf, next)?;
            elements.push(value);
            next = after;
        }

        self.depth -= 1;

        Ok((RespValue::Array(elements), next))
    }
}

/// Reads the line starting at `start` up to the next CRLF.
///
/// Returns the line without its terminator and the offset after the CRLF.
fn read_line(buf: &[u8], start: usize) -> ProtocolResult<(&[u8], usize)> {
    let rest = buf.get(start..).ok_or(ProtocolError::MissingTerminator)?;
    let end = find_crlf(rest).ok_or(ProtocolError::MissingTerminator)?;
    Ok((&rest[..end], start + end + CRLF.len()))
}

/// Parses a bulk string length or array count line.
fn parse_length(line: &[u8]) -> ProtocolResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ProtocolError::MalformedLength(String::from_utf8_lossy(line).into_owned()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes one value starting at `offset`, returning it with the next offset.
pub fn decode_one(buf: &[u8], offset: usize) -> ProtocolResult<(RespValue, usize)> {
    RespParser::new().decode_one(buf, offset)
}

/// Decodes the first value in the buffer and discards the trailing offset.
pub fn decode(buf: &[u8]) -> ProtocolResult<RespValue> {
    decode_one(buf, 0).map(|(value, _)| value)
}

/// Helper function to parse a single RESP message from bytes.
///
/// This is the incremental form: `Ok(None)` means more bytes are needed.
pub fn parse_message(buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RespValue {
        RespValue::BulkString(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_decode_simple_string() {
        let (value, next) = decode_one(b"+OK\r\n", 0).unwrap();
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
        assert_eq!(next, 5);
    }

    #[test]
    fn test_decode_error_line_as_literal_text() {
        let value = decode(b"-ERR unknown command\r\n").unwrap();
        assert_eq!(
            value,
            RespValue::SimpleString("ERR unknown command".to_string())
        );
    }

    #[test]
    fn test_decode_integer() {
        assert_eq!(decode(b":1000\r\n").unwrap(), RespValue::Integer(1000));
        assert_eq!(decode(b":-42\r\n").unwrap(), RespValue::Integer(-42));
    }

    #[test]
    fn test_decode_invalid_integer() {
        let result = decode(b":not_a_number\r\n");
        assert!(matches!(result, Err(ProtocolError::InvalidInteger(_))));
    }

    #[test]
    fn test_decode_bulk_string() {
        let (value, next) = decode_one(b"$5\r\nhello\r\n", 0).unwrap();
        assert_eq!(value, bulk("hello"));
        assert_eq!(next, 11);
    }

    #[test]
    fn test_decode_null_bulk_string() {
        let (value, next) = decode_one(b"$-1\r\n", 0).unwrap();
        assert_eq!(value, RespValue::Null);
        assert_eq!(next, 5);
    }

    #[test]
    fn test_decode_empty_bulk_string() {
        let (value, next) = decode_one(b"$0\r\n\r\n", 0).unwrap();
        assert_eq!(value, bulk(""));
        assert_eq!(next, 6);
    }

    #[test]
    fn test_decode_bulk_string_below_minus_one() {
        let result = decode(b"$-2\r\n");
        assert_eq!(result, Err(ProtocolError::MalformedLength("-2".to_string())));
    }

    #[test]
    fn test_decode_non_numeric_length() {
        let result = decode(b"$abc\r\nabc\r\n");
        assert!(matches!(result, Err(ProtocolError::MalformedLength(_))));
    }

    #[test]
    fn test_decode_truncated_bulk_string() {
        let result = decode(b"$10\r\nhello\r\n");
        assert_eq!(
            result,
            Err(ProtocolError::TruncatedValue {
                expected: 10,
                available: 7
            })
        );
        assert!(result.unwrap_err().is_incomplete());
    }

    #[test]
    fn test_decode_bulk_string_wrong_terminator() {
        let result = decode(b"$5\r\nhelloXY");
        let err = result.unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedValue { expected: 5, .. }));
        assert!(!err.is_incomplete());
    }

    #[test]
    fn test_decode_missing_terminator() {
        let result = decode(b"+OK");
        assert_eq!(result, Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn test_decode_at_end_of_buffer() {
        assert_eq!(decode_one(b"+OK\r\n", 5), Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn test_decode_unknown_type_tag() {
        assert_eq!(decode(b"@invalid\r\n"), Err(ProtocolError::UnknownTypeTag(b'@')));
    }

    #[test]
    fn test_decode_array() {
        let (value, next) = decode_one(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n", 0).unwrap();
        assert_eq!(value, RespValue::Array(vec![bulk("GET"), bulk("name")]));
        assert_eq!(next, 23);
    }

    #[test]
    fn test_decode_null_and_empty_array() {
        assert_eq!(decode(b"*-1\r\n").unwrap(), RespValue::NullArray);
        assert_eq!(decode(b"*0\r\n").unwrap(), RespValue::Array(vec![]));
        assert!(matches!(
            decode(b"*-3\r\n"),
            Err(ProtocolError::MalformedLength(_))
        ));
    }

    #[test]
    fn test_decode_nested_array() {
        let value = decode(b"*2\r\n*2\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n").unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Array(vec![bulk("SET"), bulk("key")]),
                bulk("value"),
            ])
        );
    }

    #[test]
    fn test_decode_mixed_array() {
        let value = decode(b"*3\r\n+OK\r\n:100\r\n$5\r\nhello\r\n").unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::SimpleString("OK".to_string()),
                RespValue::Integer(100),
                bulk("hello"),
            ])
        );
    }

    #[test]
    fn test_decode_one_walks_concatenated_values() {
        let buf = b"+OK\r\n:7\r\n$2\r\nhi\r\n";
        let (first, next) = decode_one(buf, 0).unwrap();
        let (second, next) = decode_one(buf, next).unwrap();
        let (third, next) = decode_one(buf, next).unwrap();

        assert_eq!(first, RespValue::SimpleString("OK".to_string()));
        assert_eq!(second, RespValue::Integer(7));
        assert_eq!(third, bulk("hi"));
        assert_eq!(next, buf.len());
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        let mut input = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");

        assert_eq!(
            decode(&input),
            Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }

    #[test]
    fn test_nesting_at_limit_is_accepted() {
        let mut input = Vec::new();
        for _ in 0..MAX_NESTING_DEPTH {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");

        assert!(decode(&input).is_ok());
    }

    #[test]
    fn test_roundtrip() {
        let values = vec![
            RespValue::simple_string("OK"),
            RespValue::integer(123),
            bulk("hello"),
            RespValue::Null,
            RespValue::array(vec![bulk("SET"), bulk("mykey"), bulk("myvalue")]),
            RespValue::array(vec![
                RespValue::integer(-1),
                RespValue::array(vec![bulk(""), RespValue::Null]),
            ]),
        ];

        for original in values {
            let encoded = original.encode().unwrap();
            assert_eq!(decode(&encoded).unwrap(), original);
        }
    }

    #[test]
    fn test_parse_incomplete_returns_none() {
        assert!(parse_message(b"+OK").unwrap().is_none());
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_message(b"$5\r\nhello\r").unwrap().is_none());
        assert!(parse_message(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
        assert!(parse_message(b"").unwrap().is_none());
    }

    #[test]
    fn test_parse_reports_consumed_bytes_only() {
        let input = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::Array(vec![bulk("PING")]));
        assert_eq!(consumed, 14);
    }

    #[test]
    fn test_parse_invalid_data_is_error() {
        assert!(parse_message(b"?\r\n").is_err());
        assert!(parse_message(b"$5\r\nhelloXY").is_err());
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let value = decode(b"$5\r\nhel\x00o\r\n").unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from(&b"hel\x00o"[..])));
    }
}
