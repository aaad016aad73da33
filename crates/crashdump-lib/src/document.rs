//! Crash-dump document tree
//!
//! The dump is an ordered tree of named objects with string, number and
//! boolean leaves. Keys keep insertion order so the serialized output reads
//! in collection order. Child objects are created on first access.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::time::Duration;

/// Node of the dump tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Object(Vec<(String, Node)>),
    String(String),
    Number(u64),
    Bool(bool),
}

impl Default for Node {
    fn default() -> Self {
        Node::object()
    }
}

impl Node {
    /// Empty object
    pub fn object() -> Self {
        Node::Object(Vec::new())
    }

    /// True for an object without children
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Object(entries) if entries.is_empty())
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Object(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        match self {
            Node::Object(entries) => entries
                .iter_mut()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follow a path of keys
    pub fn path(&self, keys: &[&str]) -> Option<&Node> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Child object under `key`, created if absent.
    ///
    /// A leaf node is turned into an empty object first.
    pub fn child(&mut self, key: &str) -> &mut Node {
        match self {
            Node::Object(entries) => {
                let idx = match entries.iter().position(|(k, _)| k == key) {
                    Some(idx) => idx,
                    None => {
                        entries.push((key.to_string(), Node::object()));
                        entries.len() - 1
                    }
                };
                &mut entries[idx].1
            }
            other => {
                *other = Node::object();
                other.child(key)
            }
        }
    }

    /// Set `key` to `value`, replacing an existing entry in place
    pub fn insert(&mut self, key: &str, value: impl Into<Node>) {
        let value = value.into();
        match self.get_mut(key) {
            Some(existing) => *existing = value,
            None => {
                if let Node::Object(entries) = self {
                    entries.push((key.to_string(), value));
                } else {
                    *self = Node::Object(vec![(key.to_string(), value)]);
                }
            }
        }
    }

    /// Set `key` only when it is not already present
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<Node>) {
        if self.get(key).is_none() {
            self.insert(key, value);
        }
    }

    /// Detach and return the entry under `key`
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        match self {
            Node::Object(entries) => entries
                .iter()
                .position(|(k, _)| k == key)
                .map(|idx| entries.remove(idx).1),
            _ => None,
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        match self {
            Node::Object(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Node::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Node::String(s) => serializer.serialize_str(s),
            Node::Number(n) => serializer.serialize_u64(*n),
            Node::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<u64> for Node {
    fn from(n: u64) -> Self {
        Node::Number(n)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

/// Key names used across the document
pub mod keys {
    pub const ROOT: &str = "crash_data";
    pub const METADATA: &str = "METADATA";
    pub const PROCESSORS: &str = "PROCESSORS";
    pub const OEM_ROOT: &str = "oemdata";
    pub const VERSION: &str = "_version";
    pub const TIME: &str = "_time";
    pub const RECORD_ENABLE: &str = "_record_enable";
    pub const STATUS: &str = "status";
    pub const FAILED: &str = "N/A";
    pub const TIMEOUT: &str = "_timeout";
    pub const RESET_DETECTED: &str = "_reset_detected";
    pub const TOTAL_TIME: &str = "_total_time";
}

pub fn cpu_key(index: usize) -> String {
    format!("cpu{}", index)
}

/// Duration as recorded in `_time` fields
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

/// Schema version stamp for a section
pub fn version_stamp(record_type: u32, product_type: u32, revision: u32) -> String {
    format!(
        "0x{:x}",
        (record_type << 24) | (product_type << 12) | revision
    )
}

/// Whole crash-dump document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrashdumpDocument {
    root: Node,
}

impl CrashdumpDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `crash_data` object
    pub fn crash_data(&mut self) -> &mut Node {
        self.root.child(keys::ROOT)
    }

    pub fn metadata(&mut self) -> &mut Node {
        self.crash_data().child(keys::METADATA)
    }

    pub fn processors(&mut self) -> &mut Node {
        self.crash_data().child(keys::PROCESSORS)
    }

    pub fn cpu(&mut self, index: usize) -> &mut Node {
        self.processors().child(&cpu_key(index))
    }

    /// The vendor-specific tree kept beside `crash_data`
    pub fn oem_processors(&mut self) -> &mut Node {
        self.root.child(keys::OEM_ROOT).child(keys::PROCESSORS)
    }

    pub fn oem_root(&mut self) -> &mut Node {
        self.root.child(keys::OEM_ROOT)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        self.root.to_json_pretty()
    }
}
