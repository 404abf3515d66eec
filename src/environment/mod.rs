use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;

use crate::error::{Result, WrapperError};

/// Operation requested by the container runtime
pub const CNI_COMMAND: &str = "CNI_COMMAND";
/// Network namespace path of the container
pub const CNI_NETNS: &str = "CNI_NETNS";
/// Extra `key=value` arguments
pub const CNI_ARGS: &str = "CNI_ARGS";

/// Read/write access to the variables a delegate inherits
pub trait Environment {
    /// Value of `key`, `None` when unset
    fn var(&self, key: &str) -> Result<Option<String>>;

    /// Raw value of `key`, for variables that need not be UTF-8
    fn var_os(&self, key: &str) -> Option<OsString>;

    fn set_var(&mut self, key: &str, value: &str) -> Result<()>;

    /// All variables, in the order they should be handed to a child
    fn vars(&self) -> Vec<(OsString, OsString)>;
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Result<Option<String>> {
        match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(err) => Err(WrapperError::EnvironmentRead {
                key: key.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn var_os(&self, key: &str) -> Option<OsString> {
        env::var_os(key)
    }

    fn set_var(&mut self, key: &str, value: &str) -> Result<()> {
        validate(key, value)?;
        env::set_var(key, value);
        Ok(())
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        env::vars_os().collect()
    }
}

/// In-memory environment
#[derive(Debug, Default, Clone)]
pub struct MapEnvironment {
    vars: BTreeMap<String, String>,
}

impl MapEnvironment {
    pub fn insert(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Environment for MapEnvironment {
    fn var(&self, key: &str) -> Result<Option<String>> {
        Ok(self.vars.get(key).cloned())
    }

    fn var_os(&self, key: &str) -> Option<OsString> {
        self.vars.get(key).map(OsString::from)
    }

    fn set_var(&mut self, key: &str, value: &str) -> Result<()> {
        validate(key, value)?;
        self.vars.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        self.vars
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }
}

/// `KEY=VALUE` lines, as recorded in the audit log
pub fn snapshot_lines(env: &dyn Environment) -> Vec<String> {
    env.vars()
        .into_iter()
        .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
        .collect()
}

// std::env::set_var panics on these instead of failing
fn validate(key: &str, value: &str) -> Result<()> {
    let reason = if key.is_empty() {
        Some("empty key")
    } else if key.contains('=') {
        Some("key contains '='")
    } else if key.contains('\0') || value.contains('\0') {
        Some("contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(WrapperError::EnvironmentMutation {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_environment_round_trip() {
        let mut env: MapEnvironment = [(CNI_COMMAND, "ADD")].into_iter().collect();
        assert_eq!(env.var(CNI_COMMAND).unwrap().as_deref(), Some("ADD"));
        assert_eq!(env.var(CNI_NETNS).unwrap(), None);

        env.set_var(CNI_ARGS, "IP=10.0.0.5").unwrap();
        assert_eq!(
            snapshot_lines(&env),
            vec!["CNI_ARGS=IP=10.0.0.5".to_string(), "CNI_COMMAND=ADD".to_string()]
        );
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let mut env = MapEnvironment::default();
        let err = env.set_var(CNI_ARGS, "IP=10.0.0.5\0").unwrap_err();
        assert!(matches!(err, WrapperError::EnvironmentMutation { .. }));
        assert!(env.set_var("A=B", "x").is_err());
    }
}
