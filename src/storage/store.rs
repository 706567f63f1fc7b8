//! In-Memory Key-Value Store
//!
//! A plain mapping from string keys to [`StoredValue`]s. The store has no
//! locking and no persistence of its own: the command engine is its only
//! writer, and the caller decides how it is shared.

use std::collections::HashMap;
use std::fmt;

/// A value held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Arbitrary text
    Str(String),
    /// Text that parsed as a 64-bit signed integer when it was written
    Int(i64),
}

impl StoredValue {
    /// Builds a value from client text, keeping integer-looking text as
    /// [`StoredValue::Int`].
    ///
    /// # Example
    ///
    /// ```
    /// use ledgerkv::storage::StoredValue;
    ///
    /// assert_eq!(StoredValue::from_text("007"), StoredValue::Int(7));
    /// assert_eq!(StoredValue::from_text("1.5"), StoredValue::Str("1.5".into()));
    /// ```
    pub fn from_text(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(n) => StoredValue::Int(n),
            Err(_) => StoredValue::Str(text.to_string()),
        }
    }

    /// Returns the integer, if this value holds one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StoredValue::Int(n) => Some(*n),
            StoredValue::Str(_) => None,
        }
    }
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredValue::Str(s) => f.write_str(s),
            StoredValue::Int(n) => write!(f, "{}", n),
        }
    }
}

/// The key space.
///
/// # Example
///
/// ```
/// use ledgerkv::storage::{Store, StoredValue};
///
/// let mut store = Store::new();
/// store.set("name".to_string(), StoredValue::Str("Ariz".to_string()));
/// assert_eq!(store.get("name"), Some(&StoredValue::Str("Ariz".to_string())));
/// assert!(store.delete("name"));
/// assert!(store.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<String, StoredValue>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        self.data.get(key)
    }

    /// Sets a key, overwriting any previous value.
    ///
    /// Returns `true` if a new key was created.
    pub fn set(&mut self, key: String, value: StoredValue) -> bool {
        self.data.insert(key, value).is_none()
    }

    /// Removes a key and returns its value, if it was present.
    pub fn remove(&mut self, key: &str) -> Option<StoredValue> {
        self.data.remove(key)
    }

    /// Removes a key. Returns `true` if it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
