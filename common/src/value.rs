//! The dynamically shaped values that cross the script boundary.
//!
//! Tables keep their entries in insertion order and may hold explicit `Nil` values. The
//! interpreter itself drops nil entries, but a host that marshals `{ ["User-Agent"] = nil }`
//! on purpose keeps them so that header removal can be expressed.

use std::slice;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScriptValue {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// A string that is not known to be valid UTF-8.
    Bytes(Vec<u8>),
    Table(ScriptTable),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Boolean(_) => "boolean",
            ScriptValue::Integer(_) | ScriptValue::Number(_) => "number",
            ScriptValue::String(_) | ScriptValue::Bytes(_) => "string",
            ScriptValue::Table(_) => "table",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    #[inline]
    pub fn is_string_or_number(&self) -> bool {
        matches!(
            self,
            ScriptValue::String(_)
                | ScriptValue::Bytes(_)
                | ScriptValue::Integer(_)
                | ScriptValue::Number(_)
        )
    }

    /// Strings and numbers as text. Byte strings only convert when they are valid UTF-8.
    pub fn coerce_string(&self) -> Option<String> {
        match self {
            ScriptValue::String(s) => Some(s.clone()),
            ScriptValue::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
            ScriptValue::Integer(i) => Some(i.to_string()),
            ScriptValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Strings and numbers as a raw buffer.
    pub fn coerce_bytes(&self) -> Option<Vec<u8>> {
        match self {
            ScriptValue::Bytes(bytes) => Some(bytes.clone()),
            other => other.coerce_string().map(String::into_bytes),
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_table(&self) -> Option<&ScriptTable> {
        match self {
            ScriptValue::Table(table) => Some(table),
            _ => None,
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_owned())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Boolean(b)
    }
}

impl From<i64> for ScriptValue {
    fn from(i: i64) -> Self {
        ScriptValue::Integer(i)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<Vec<u8>> for ScriptValue {
    fn from(bytes: Vec<u8>) -> Self {
        ScriptValue::Bytes(bytes)
    }
}

impl From<ScriptTable> for ScriptValue {
    fn from(table: ScriptTable) -> Self {
        ScriptValue::Table(table)
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ScriptValue::Nil)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptTable {
    entries: Vec<(ScriptValue, ScriptValue)>,
}

impl ScriptTable {
    pub fn new() -> ScriptTable {
        ScriptTable::default()
    }

    /// A sequence table with keys `1..=n`.
    pub fn array<I, V>(values: I) -> ScriptTable
    where
        I: IntoIterator<Item = V>,
        V: Into<ScriptValue>,
    {
        values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| (ScriptValue::Integer(idx as i64 + 1), value.into()))
            .collect()
    }

    /// Replaces the value of an existing key, otherwise appends the entry. `Nil` values are kept.
    pub fn set(&mut self, key: impl Into<ScriptValue>, value: impl Into<ScriptValue>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    #[inline]
    pub fn with(mut self, key: impl Into<ScriptValue>, value: impl Into<ScriptValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ScriptValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn get_index(&self, index: i64) -> Option<&ScriptValue> {
        self.entries
            .iter()
            .find(|(k, _)| *k == ScriptValue::Integer(index))
            .map(|(_, v)| v)
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, (ScriptValue, ScriptValue)> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<ScriptValue>, V: Into<ScriptValue>> FromIterator<(K, V)> for ScriptTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = ScriptTable::new();
        for (key, value) in iter {
            table.set(key, value);
        }
        table
    }
}

impl<'a> IntoIterator for &'a ScriptTable {
    type Item = &'a (ScriptValue, ScriptValue);
    type IntoIter = slice::Iter<'a, (ScriptValue, ScriptValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
