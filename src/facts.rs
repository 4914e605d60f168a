//! The hierarchical fact tree plugins write their collected data into.
//!
//! Facts are addressed by `/`-delimited paths, e.g. `network/interfaces/eth0`.
//! The tree itself never drives resolution; the runner hands each executing
//! plugin a mutable reference to it and otherwise treats it as an opaque sink.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single collected fact value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the string contents, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the nested map, if this is a map value.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

/// The shared fact tree for one collection session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facts {
    root: BTreeMap<String, Value>,
}

impl Facts {
    /// Creates an empty fact tree.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Reads the value at a `/`-delimited path. Returns `None` when any
    /// intermediate segment is missing or is not a map.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut map = &self.root;
        let mut rest = path;

        while let Some((head, tail)) = rest.split_once('/') {
            match map.get(head)? {
                Value::Map(inner) => {
                    map = inner;
                    rest = tail;
                }
                _ => return None,
            }
        }

        map.get(rest)
    }

    /// Writes a value at a `/`-delimited path, creating intermediate maps as
    /// needed. An intermediate that holds a non-map value is replaced by a
    /// map, so the last write wins.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let mut map = &mut self.root;
        let mut rest = path;

        while let Some((head, tail)) = rest.split_once('/') {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));

            if !matches!(entry, Value::Map(_)) {
                *entry = Value::Map(BTreeMap::new());
            }

            let Value::Map(inner) = entry else {
                unreachable!()
            };

            map = inner;
            rest = tail;
        }

        map.insert(rest.to_string(), value.into());
    }

    /// Serializes the whole tree to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serializes the whole tree to an indented JSON string.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
