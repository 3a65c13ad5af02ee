//! Bind values and result rows.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value bound to a statement placeholder.
///
/// Bound values are typed by inspection: integral values bind as integers,
/// binary values as large objects, everything else as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BindValue {
    Int(i64),
    Blob(Vec<u8>),
    Text(String),
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        BindValue::Int(value as i64)
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(value: Vec<u8>) -> Self {
        BindValue::Blob(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

/// A bind target: a 1-based `?` position or a `:name` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindKey {
    Position(usize),
    Name(String),
}

impl fmt::Display for BindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindKey::Position(n) => write!(f, "?{n}"),
            BindKey::Name(name) => write!(f, ":{name}"),
        }
    }
}

/// Bindings for one statement, keyed by position or name.
///
/// Iteration order follows insertion order, matching the order the caller
/// supplied the values in.
pub type BindMap = IndexMap<BindKey, BindValue>;

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One decoded result row: column name to value, in column order.
pub type Row = IndexMap<String, SqlValue>;
