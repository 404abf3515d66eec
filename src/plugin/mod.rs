use std::io::{Read, Write};
use tracing::{debug, error, info};

use crate::args::{CniArgs, IP, K8S_POD_NAME, K8S_POD_NAMESPACE};
use crate::audit::TransactionRecord;
use crate::config::NetConf;
use crate::delegate::Delegate;
use crate::environment::{snapshot_lines, Environment, CNI_ARGS};
use crate::error::{Result, WrapperError};
use crate::k8s::{assigned_address, Connector, PodLookup};
use crate::types::Invocation;

/// Printed instead of running the delegate when `CNI_NETNS` is empty.
///
/// Kept byte-for-byte as runtimes have seen it so far.
pub const NETNS_MISSING_MSG: &str = r#"{ "code": 101, "msg": "CNI_NETNS not set" }"#;

/// Exit status for failures before the delegate runs
pub const FAILURE_STATUS: i32 = 1;

/// Wraps a delegate plugin, enriching ADD calls with the pod's address
pub struct CalicoWrapper<C, D> {
    connector: C,
    delegate: D,
}

impl<C: Connector, D: Delegate> CalicoWrapper<C, D> {
    pub fn new(connector: C, delegate: D) -> Self {
        Self {
            connector,
            delegate,
        }
    }

    /// Handle one invocation and return the process exit status.
    ///
    /// Failures are appended to `record`; nothing is written to `stdout`
    /// except the delegate's result or the `CNI_NETNS` diagnostic.
    pub fn run(
        &self,
        env: &mut dyn Environment,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        record: &mut TransactionRecord,
    ) -> i32 {
        match self.execute(env, stdin, stdout, record) {
            Ok(status) => status,
            Err(WrapperError::NamespaceMissing) => {
                error!("CNI_NETNS not set, refusing to run delegate");
                if let Err(err) = stdout
                    .write_all(NETNS_MISSING_MSG.as_bytes())
                    .and_then(|()| stdout.flush())
                {
                    record.push_error(err);
                }
                FAILURE_STATUS
            }
            Err(err) => {
                error!("{}", err);
                record.push_error(err);
                FAILURE_STATUS
            }
        }
    }

    fn execute(
        &self,
        env: &mut dyn Environment,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        record: &mut TransactionRecord,
    ) -> Result<i32> {
        // stdin can only be read once; the same bytes go to the delegate
        let mut input = Vec::new();
        stdin
            .read_to_end(&mut input)
            .map_err(WrapperError::InputRead)?;

        if !input.is_empty() {
            let value: serde_json::Value = serde_json::from_slice(&input)?;
            record.input = Some(value).filter(|v| !v.is_null());
        }

        let conf = NetConf::parse(&input)?;
        let lookup = self.connector.connect(&conf)?;

        let invocation = Invocation::from_env(env)?;
        if invocation.netns.is_empty() {
            return Err(WrapperError::NamespaceMissing);
        }

        if invocation.is_add() {
            if let Some(args) = self.enrich(&lookup, &invocation.args, record)? {
                let args = args.serialize();
                info!("Committing {}={}", CNI_ARGS, args);
                env.set_var(CNI_ARGS, &args)?;
            }
        } else {
            debug!("Skipping pod lookup for {:?}", invocation.command);
        }

        record.environment = snapshot_lines(env);
        let output = self.delegate.invoke(&input, &env.vars())?;

        // From here on the delegate's status is authoritative
        if let Err(err) = stdout
            .write_all(&output.stdout)
            .and_then(|()| stdout.flush())
        {
            record.push_error(err);
        }

        if !output.stdout.is_empty() {
            match serde_json::from_slice(&output.stdout) {
                Ok(value) => record.output = Some(value),
                Err(err) => record.push_error(err),
            }
        }

        if output.status != 0 {
            record.push_error(format!("delegate exited with status {}", output.status));
        }

        Ok(output.status)
    }

    /// Look up the pod named in `args` and return the amended arguments,
    /// or `None` when the pod carries no address annotation.
    pub fn enrich(
        &self,
        lookup: &C::Lookup,
        args: &CniArgs,
        record: &mut TransactionRecord,
    ) -> Result<Option<CniArgs>> {
        let namespace = args.get(K8S_POD_NAMESPACE).unwrap_or_default();
        let name = args.get(K8S_POD_NAME).unwrap_or_default();

        let pod = lookup.fetch_workload(namespace, name)?;
        let address = assigned_address(&pod).map(str::to_string);
        record.pod = Some(pod);

        Ok(address.map(|address| {
            info!("Pod {}/{} has address {}", namespace, name, address);
            let mut amended = args.clone();
            amended.insert(IP, &address);
            amended
        }))
    }
}
