//! Pod lookups against the Kubernetes API.
//!
//! Connection settings come from an optional kubeconfig file overlaid with
//! the inline `policy` fields of the network configuration, the same
//! precedence the calico plugin applies: inline fields win.

use k8s_openapi::api::core::v1::Pod;
use kube::config::{
    AuthInfo, Cluster, Context, KubeConfigOptions, Kubeconfig, NamedAuthInfo, NamedCluster,
    NamedContext,
};
use kube::{Api, Client, Config};
use secrecy::SecretString;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::{KubernetesPolicy, NetConf};
use crate::error::{Result, WrapperError};

/// Annotation carrying the address assigned to a pod
pub const IP_ADDRESS_ANNOTATION: &str = "bosh.cloudfoundry.org/ip-address";

/// Name used for kubeconfig entries synthesized from inline settings
const OVERRIDE_NAME: &str = "calico-wrapper";

/// Fetches pods by namespace and name
pub trait PodLookup {
    fn fetch_workload(&self, namespace: &str, name: &str) -> Result<Pod>;
}

/// Builds a [`PodLookup`] from the network configuration
pub trait Connector {
    type Lookup: PodLookup;

    fn connect(&self, conf: &NetConf) -> Result<Self::Lookup>;
}

/// Address assigned to the pod through [`IP_ADDRESS_ANNOTATION`], if any
pub fn assigned_address(pod: &Pod) -> Option<&str> {
    pod.metadata
        .annotations
        .as_ref()?
        .get(IP_ADDRESS_ANNOTATION)
        .map(String::as_str)
}

/// Connects to the API server described by a [`NetConf`]
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeConnector;

impl Connector for KubeConnector {
    type Lookup = KubeLookup;

    fn connect(&self, conf: &NetConf) -> Result<KubeLookup> {
        let kubeconfig = match &conf.kubernetes.kubeconfig {
            Some(path) => Kubeconfig::read_from(path).map_err(|err| {
                WrapperError::Connection(format!("{}: {}", path.display(), err))
            })?,
            None => Kubeconfig::default(),
        };
        let (kubeconfig, options) = overlay(kubeconfig, &conf.policy);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                WrapperError::Connection(format!("failed to create Tokio runtime: {}", err))
            })?;

        // The client spawns its service stack, so it must be built inside the runtime
        let client = runtime.block_on(async {
            let config = Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|err| WrapperError::Connection(err.to_string()))?;
            debug!("Connecting to Kubernetes API at {}", config.cluster_url);
            Client::try_from(config).map_err(|err| WrapperError::Connection(err.to_string()))
        })?;

        Ok(KubeLookup { client, runtime })
    }
}

/// Pod lookup backed by a kube client
pub struct KubeLookup {
    client: Client,
    runtime: Runtime,
}

impl PodLookup for KubeLookup {
    fn fetch_workload(&self, namespace: &str, name: &str) -> Result<Pod> {
        let lookup_error = |reason: String| WrapperError::Lookup {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason,
        };

        if namespace.is_empty() || name.is_empty() {
            return Err(lookup_error("pod namespace and name are required".to_string()));
        }

        debug!("Fetching pod {}/{}", namespace, name);
        self.runtime
            .block_on(async {
                let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
                pods.get(name).await
            })
            .map_err(|err| lookup_error(err.to_string()))
    }
}

/// Apply the inline policy fields on top of a kubeconfig.
///
/// The cluster and user of the current context are amended in place; when
/// there is no usable current context, entries named `calico-wrapper` are
/// created. The returned options pin the client to the amended entries.
pub fn overlay(
    mut kubeconfig: Kubeconfig,
    policy: &KubernetesPolicy,
) -> (Kubeconfig, KubeConfigOptions) {
    if !policy.has_overrides() {
        return (kubeconfig, KubeConfigOptions::default());
    }

    let current = kubeconfig
        .current_context
        .as_ref()
        .and_then(|name| kubeconfig.contexts.iter().find(|c| &c.name == name))
        .and_then(|named| named.context.clone());

    let (cluster_name, user_name) = match current {
        Some(context) => {
            let user: Option<String> = context.user.into();
            (context.cluster, user.unwrap_or_else(|| OVERRIDE_NAME.to_string()))
        }
        None => {
            let context = Context {
                cluster: OVERRIDE_NAME.to_string(),
                user: OVERRIDE_NAME.to_string().into(),
                ..Default::default()
            };
            kubeconfig.contexts.retain(|c| c.name != OVERRIDE_NAME);
            kubeconfig.contexts.push(NamedContext {
                name: OVERRIDE_NAME.to_string(),
                context: Some(context),
            });
            kubeconfig.current_context = Some(OVERRIDE_NAME.to_string());
            (OVERRIDE_NAME.to_string(), OVERRIDE_NAME.to_string())
        }
    };

    let cluster = cluster_entry(&mut kubeconfig, &cluster_name);
    if let Some(server) = policy.server() {
        cluster.server = Some(server);
    }
    if let Some(ca) = &policy.certificate_authority {
        cluster.certificate_authority = Some(ca.clone());
        cluster.certificate_authority_data = None;
    }

    let auth_info = auth_info_entry(&mut kubeconfig, &user_name);
    if let Some(cert) = &policy.client_certificate {
        auth_info.client_certificate = Some(cert.clone());
        auth_info.client_certificate_data = None;
    }
    if let Some(key) = &policy.client_key {
        auth_info.client_key = Some(key.clone());
        auth_info.client_key_data = None;
    }
    if let Some(token) = &policy.auth_token {
        auth_info.token = Some(SecretString::from(token.clone()));
        auth_info.token_file = None;
    }

    let options = KubeConfigOptions {
        context: kubeconfig.current_context.clone(),
        cluster: Some(cluster_name),
        user: Some(user_name),
    };

    (kubeconfig, options)
}

fn cluster_entry<'a>(kubeconfig: &'a mut Kubeconfig, name: &str) -> &'a mut Cluster {
    let index = match kubeconfig.clusters.iter().position(|c| c.name == name) {
        Some(index) => index,
        None => {
            kubeconfig.clusters.push(NamedCluster {
                name: name.to_string(),
                cluster: None,
            });
            kubeconfig.clusters.len() - 1
        }
    };
    kubeconfig.clusters[index]
        .cluster
        .get_or_insert_with(Cluster::default)
}

fn auth_info_entry<'a>(kubeconfig: &'a mut Kubeconfig, name: &str) -> &'a mut AuthInfo {
    let index = match kubeconfig.auth_infos.iter().position(|a| a.name == name) {
        Some(index) => index,
        None => {
            kubeconfig.auth_infos.push(NamedAuthInfo {
                name: name.to_string(),
                auth_info: None,
            });
            kubeconfig.auth_infos.len() - 1
        }
    };
    kubeconfig.auth_infos[index]
        .auth_info
        .get_or_insert_with(AuthInfo::default)
}
