use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::environment::Environment;
use crate::error::Result;

/// Environment variable overriding the audit log location
pub const LOG_FILE_ENV: &str = "CALICO_WRAPPER_LOG_FILE";
/// Environment variable overriding the delegate binary name
pub const DELEGATE_ENV: &str = "CALICO_WRAPPER_DELEGATE";

/// Process level settings for the wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperConfig {
    /// Append-only audit log
    pub log_path: PathBuf,
    /// Name of the delegate binary, resolved next to the wrapper
    pub delegate_name: String,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/wrapper.log"),
            delegate_name: "calico".to_string(),
        }
    }
}

impl WrapperConfig {
    /// Defaults, overridden by `CALICO_WRAPPER_*` variables when set
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = env.var(LOG_FILE_ENV)?.filter(|p| !p.is_empty()) {
            config.log_path = PathBuf::from(path);
        }
        if let Some(name) = env.var(DELEGATE_ENV)?.filter(|n| !n.is_empty()) {
            config.delegate_name = name;
        }

        Ok(config)
    }
}

/// The part of the network configuration the wrapper understands.
///
/// The same document is handed untouched to the delegate, which parses it
/// with its own schema; unknown fields are ignored here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConf {
    pub policy: KubernetesPolicy,
    pub kubernetes: KubernetesConfig,
}

/// Inline Kubernetes connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesPolicy {
    #[serde(rename = "type", deserialize_with = "non_empty")]
    pub policy_type: Option<String>,
    #[serde(rename = "k8s_api_root", deserialize_with = "non_empty")]
    pub api_root: Option<String>,
    #[serde(rename = "k8s_auth_token", deserialize_with = "non_empty")]
    pub auth_token: Option<String>,
    #[serde(rename = "k8s_client_certificate", deserialize_with = "non_empty")]
    pub client_certificate: Option<String>,
    #[serde(rename = "k8s_client_key", deserialize_with = "non_empty")]
    pub client_key: Option<String>,
    #[serde(rename = "k8s_certificate_authority", deserialize_with = "non_empty")]
    pub certificate_authority: Option<String>,
}

/// Kubeconfig-file based connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    #[serde(deserialize_with = "non_empty")]
    pub kubeconfig: Option<PathBuf>,
}

impl NetConf {
    /// Parse NetConf from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl KubernetesPolicy {
    /// API server URL without any `/api/...` suffix
    pub fn server(&self) -> Option<String> {
        self.api_root.as_deref().map(|root| {
            root.split("/api/")
                .next()
                .unwrap_or(root)
                .to_string()
        })
    }

    /// Whether any inline field would override the kubeconfig
    pub fn has_overrides(&self) -> bool {
        self.api_root.is_some()
            || self.auth_token.is_some()
            || self.client_certificate.is_some()
            || self.client_key.is_some()
            || self.certificate_authority.is_some()
    }
}

/// Treat `""` and `null` like a missing field
fn non_empty<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(T::from))
}
