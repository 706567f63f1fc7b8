//! Command Engine
//!
//! Pure dispatch and validation over a [`Store`]. Every command validates
//! its arguments before touching the store, so a command that fails leaves
//! the store exactly as it was.
//!
//! ## Supported Commands
//!
//! - `SET key value` - Set a key (integer-looking text is stored as an integer)
//! - `GET key` - Get a key's value
//! - `GETDEL key` - Get a key's value and delete it
//! - `DEL key [key ...]` - Delete keys
//! - `EXISTS key [key ...]` - Count existing keys
//! - `FLUSHALL` - Remove every key
//! - `PING [message ...]` - Test connection
//! - `INCR key` / `DECR key` - Add or subtract one
//! - `INCRBY key increment` / `DECRBY key decrement` - Add or subtract an amount

use crate::protocol::RespValue;
use crate::storage::{Store, StoredValue};
use thiserror::Error;

/// Commands that change the store and are written to the append-only log.
pub const WRITE_COMMANDS: &[&str] = &["SET", "DEL", "FLUSHALL", "INCR", "DECR", "INCRBY", "DECRBY"];

/// Validation failures raised by commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("increment or decrement would overflow")]
    Overflow,
}

pub type CommandResult = Result<RespValue, CommandError>;

/// Returns true if `operation` (upper-cased) must be appended to the log.
///
/// GETDEL deletes its key but is not logged, so its deletion is not
/// replayed after a restart.
pub fn is_write_command(operation: &str) -> bool {
    WRITE_COMMANDS.contains(&operation)
}

/// Executes one command against the store.
///
/// `operation` must already be upper-cased. An unrecognised operation is
/// not an error: it yields the simple string `Unknown command: <OPERATION>`.
///
/// # Example
///
/// ```
/// use ledgerkv::commands::execute;
/// use ledgerkv::protocol::RespValue;
/// use ledgerkv::storage::Store;
///
/// let mut store = Store::new();
/// let args = vec!["counter".to_string()];
/// assert_eq!(execute(&mut store, "INCR", &args), Ok(RespValue::integer(1)));
/// ```
pub fn execute(store: &mut Store, operation: &str, args: &[String]) -> CommandResult {
    match operation {
        "SET" => cmd_set(store, args),
        "GET" => cmd_get(store, args),
        "GETDEL" => cmd_getdel(store, args),
        "DEL" => cmd_del(store, args),
        "EXISTS" => cmd_exists(store, args),
        "FLUSHALL" => cmd_flushall(store),
        "PING" => cmd_ping(args),
        "INCR" => cmd_incr_by(store, "INCR", args, 1),
        "DECR" => cmd_incr_by(store, "DECR", args, -1),
        "INCRBY" => cmd_incrby(store, "INCRBY", args, false),
        "DECRBY" => cmd_incrby(store, "DECRBY", args, true),
        _ => Ok(RespValue::simple_string(format!("Unknown command: {}", operation))),
    }
}

// ========================================================================
// Helper functions
// ========================================================================

fn expect_at_least<'a>(
    name: &'static str,
    args: &'a [String],
    min: usize,
) -> Result<&'a [String], CommandError> {
    if args.len() < min {
        return Err(CommandError::WrongArity(name));
    }
    Ok(args)
}

/// Returns exactly the first `count` arguments. Extra arguments are ignored.
fn leading_args<'a>(
    name: &'static str,
    args: &'a [String],
    count: usize,
) -> Result<&'a [String], CommandError> {
    expect_at_least(name, args, count).map(|args| &args[..count])
}

fn bulk_value(value: &StoredValue) -> RespValue {
    RespValue::bulk_string(value.to_string())
}

// ========================================================================
// Commands
// ========================================================================

/// SET key value
fn cmd_set(store: &mut Store, args: &[String]) -> CommandResult {
    let args = leading_args("SET", args, 2)?;
    store.set(args[0].clone(), StoredValue::from_text(&args[1]));
    Ok(RespValue::ok())
}

/// GET key
fn cmd_get(store: &Store, args: &[String]) -> CommandResult {
    let args = leading_args("GET", args, 1)?;
    Ok(store.get(&args[0]).map_or(RespValue::null(), bulk_value))
}

/// GETDEL key
fn cmd_getdel(store: &mut Store, args: &[String]) -> CommandResult {
    let args = leading_args("GETDEL", args, 1)?;
    Ok(store
        .remove(&args[0])
        .map_or(RespValue::null(), |value| bulk_value(&value)))
}

/// DEL key [key ...]
fn cmd_del(store: &mut Store, args: &[String]) -> CommandResult {
    let keys = expect_at_least("DEL", args, 1)?;
    let deleted = keys.iter().filter(|key| store.delete(key)).count();
    Ok(RespValue::integer(deleted as i64))
}

/// EXISTS key [key ...]
///
/// A key named more than once is counted each time.
fn cmd_exists(store: &Store, args: &[String]) -> CommandResult {
    let keys = expect_at_least("EXISTS", args, 1)?;
    let count = keys.iter().filter(|key| store.contains(key)).count();
    Ok(RespValue::integer(count as i64))
}

/// FLUSHALL
fn cmd_flushall(store: &mut Store) -> CommandResult {
    store.clear();
    Ok(RespValue::ok())
}

/// PING [message ...]
fn cmd_ping(args: &[String]) -> CommandResult {
    if args.is_empty() {
        return Ok(RespValue::pong());
    }
    Ok(RespValue::bulk_string(args.join(" ")))
}

/// INCRBY key increment / DECRBY key decrement
fn cmd_incrby(store: &mut Store, name: &'static str, args: &[String], negate: bool) -> CommandResult {
    let args = leading_args(name, args, 2)?;
    let amount: i64 = args[1].parse().map_err(|_| CommandError::NotAnInteger)?;
    let delta = if negate {
        amount.checked_neg().ok_or(CommandError::Overflow)?
    } else {
        amount
    };
    cmd_incr_by(store, name, &args[..1], delta)
}

/// Shared body of INCR, DECR, INCRBY and DECRBY.
///
/// A missing key counts as zero; a key holding non-integer text is rejected.
fn cmd_incr_by(store: &mut Store, name: &'static str, args: &[String], delta: i64) -> CommandResult {
    let args = leading_args(name, args, 1)?;
    let key = &args[0];

    let current = match store.get(key) {
        None => 0,
        Some(value) => value.as_int().ok_or(CommandError::NotAnInteger)?,
    };
    let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;

    store.set(key.clone(), StoredValue::Int(next));
    Ok(RespValue::integer(next))
}
