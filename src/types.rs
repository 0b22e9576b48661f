use std::collections::BTreeMap;

use rusqlite::types::{Value, ValueRef};
use serde::Serialize;

/// Values that can be bound as statement parameters or decoded from a result column.
///
/// The set is closed: every kind maps onto one SQLite storage class, so binding never meets
/// an unsupported value at runtime.
/// ```rust
/// use sqlite_pool_exec::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::from(Some(true)),
///     RowValues::from(None::<i64>),
/// ];
/// assert!(params[3].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value, stored as 0/1
    Bool(bool),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Convert to the owned `rusqlite` value used for binding.
    #[must_use]
    pub fn to_sqlite_value(&self) -> Value {
        match self {
            RowValues::Int(i) => Value::Integer(*i),
            RowValues::Float(f) => Value::Real(*f),
            RowValues::Text(s) => Value::Text(s.clone()),
            RowValues::Bool(b) => Value::Integer(i64::from(*b)),
            RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
            RowValues::Null => Value::Null,
        }
    }

    /// Decode a borrowed column value. Text that is not valid UTF-8 is replaced lossily.
    #[must_use]
    pub fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => RowValues::Null,
            ValueRef::Integer(i) => RowValues::Int(i),
            ValueRef::Real(f) => RowValues::Float(f),
            ValueRef::Text(bytes) => RowValues::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => RowValues::Blob(bytes.to_vec()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<u32> for RowValues {
    fn from(value: u32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<f32> for RowValues {
    fn from(value: f32) -> Self {
        RowValues::Float(f64::from(value))
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl From<&[u8]> for RowValues {
    fn from(value: &[u8]) -> Self {
        RowValues::Blob(value.to_vec())
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Prefix characters SQLite accepts in front of a named parameter.
const PARAM_PREFIXES: [char; 3] = [':', '$', '@'];

/// Named parameter set for one statement.
///
/// Keys normally include the prefix used in the SQL (`$name`, `:name`, `@name`), but a
/// lookup falls back to the bare name and to the other prefixes, so a set written for
/// `:name` also serves `$name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams(BTreeMap<String, RowValues>);

impl NamedParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RowValues>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve the value for a parameter name as declared by the prepared statement.
    #[must_use]
    pub fn lookup(&self, declared: &str) -> Option<&RowValues> {
        if let Some(value) = self.0.get(declared) {
            return Some(value);
        }
        let bare = declared.trim_start_matches(PARAM_PREFIXES);
        if bare.is_empty() {
            return None;
        }
        if let Some(value) = self.0.get(bare) {
            return Some(value);
        }
        PARAM_PREFIXES
            .iter()
            .find_map(|prefix| self.0.get(&format!("{prefix}{bare}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K, V> FromIterator<(K, V)> for NamedParams
where
    K: Into<String>,
    V: Into<RowValues>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        NamedParams(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for NamedParams
where
    K: Into<String>,
    V: Into<RowValues>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Additional column values written alongside a new blob row, keyed by column name.
pub type ExtraColumns = BTreeMap<String, RowValues>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_exact_name() {
        let params = NamedParams::new().with("$name", "dollar").with(":name", "colon");
        assert_eq!(params.lookup("$name"), Some(&RowValues::Text("dollar".into())));
        assert_eq!(params.lookup(":name"), Some(&RowValues::Text("colon".into())));
    }

    #[test]
    fn lookup_translates_prefixes() {
        let params = NamedParams::from([(":email", "a@example.com")]);
        assert_eq!(
            params.lookup("$email").and_then(RowValues::as_text),
            Some("a@example.com")
        );
        assert_eq!(
            params.lookup("@email").and_then(RowValues::as_text),
            Some("a@example.com")
        );

        let bare = NamedParams::from([("id", 7_i64)]);
        assert_eq!(bare.lookup(":id"), Some(&RowValues::Int(7)));
        assert_eq!(bare.lookup("$missing"), None);
    }

    #[test]
    fn positional_markers_never_match() {
        let params = NamedParams::from([("", 1_i64)]);
        assert_eq!(params.lookup("?"), None);
    }

    #[test]
    fn option_maps_to_null() {
        assert!(RowValues::from(None::<String>).is_null());
        assert_eq!(RowValues::from(Some(3_i32)), RowValues::Int(3));
        assert_eq!(RowValues::from(true).to_sqlite_value(), Value::Integer(1));
    }
}
