use std::io;
use tracing::{error, warn};

use crate::audit::{AuditRecorder, AuditScope};
use crate::config::WrapperConfig;
use crate::delegate::CalicoDelegate;
use crate::environment::ProcessEnvironment;
use crate::k8s::KubeConnector;
use crate::plugin::{CalicoWrapper, FAILURE_STATUS};

/// Main entry point for the wrapper, returns the process exit status
pub fn run_wrapper() -> i32 {
    let mut env = ProcessEnvironment;

    let config = WrapperConfig::from_env(&env).unwrap_or_else(|err| {
        warn!("Ignoring wrapper overrides: {}", err);
        WrapperConfig::default()
    });

    let mut scope = AuditScope::new(AuditRecorder::new(&config.log_path));
    let wrapper = CalicoWrapper::new(
        KubeConnector,
        CalicoDelegate::from_process(&config.delegate_name),
    );

    let status = wrapper.run(
        &mut env,
        &mut io::stdin().lock(),
        &mut io::stdout().lock(),
        scope.record_mut(),
    );

    // An unwritable audit log fails the invocation, without hiding an
    // earlier failure status
    match scope.finish() {
        Ok(()) => status,
        Err(err) => {
            error!("{}", err);
            eprintln!("{}", err);
            if status == 0 {
                FAILURE_STATUS
            } else {
                status
            }
        }
    }
}
