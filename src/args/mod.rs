//! Codec for the `CNI_ARGS` encoding: `key=value` pairs joined by `;`.
//!
//! Values are not escaped, so a value containing `;` cannot be represented.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WrapperError};

/// Namespace of the pod being attached
pub const K8S_POD_NAMESPACE: &str = "K8S_POD_NAMESPACE";
/// Name of the pod being attached
pub const K8S_POD_NAME: &str = "K8S_POD_NAME";
/// Static address handed to the delegate
pub const IP: &str = "IP";

/// Ordered set of CNI arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CniArgs {
    pairs: Vec<(String, String)>,
}

impl CniArgs {
    /// Create an empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `CNI_ARGS` string.
    ///
    /// A repeated key keeps the position of its first occurrence and the
    /// value of its last.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut args = Self::new();

        for segment in raw.split(';') {
            if segment.is_empty() {
                continue;
            }

            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| WrapperError::ArgsParse {
                    segment: segment.to_string(),
                })?;
            args.insert(key, value);
        }

        Ok(args)
    }

    /// Serialize back into the `CNI_ARGS` encoding
    pub fn serialize(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, amending an existing pair in place or appending a new one
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for CniArgs {
    type Err = WrapperError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CniArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
