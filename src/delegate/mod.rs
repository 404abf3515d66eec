use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::error::{Result, WrapperError};

/// Exit status reported when the delegate did not exit normally
pub const UNKNOWN_EXIT_STATUS: i32 = 1;

/// Outcome of a delegate run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateOutput {
    /// Everything the delegate wrote to stdout
    pub stdout: Vec<u8>,
    /// Exit code, or [`UNKNOWN_EXIT_STATUS`] when killed by a signal
    pub status: i32,
}

/// The plugin the wrapper hands the invocation to
pub trait Delegate {
    /// Run the delegate to completion with `stdin` and exactly `env`.
    ///
    /// A non-zero exit is not an error; only failing to start the
    /// delegate is.
    fn invoke(&self, stdin: &[u8], env: &[(OsString, OsString)]) -> Result<DelegateOutput>;
}

/// Runs the calico binary installed next to the wrapper
#[derive(Debug, Clone)]
pub struct CalicoDelegate {
    path: PathBuf,
    args: Vec<OsString>,
}

impl CalicoDelegate {
    pub fn new(path: PathBuf, args: Vec<OsString>) -> Self {
        Self { path, args }
    }

    /// Delegate named `name` beside the running executable, receiving the
    /// wrapper's own arguments
    pub fn from_process(name: &str) -> Self {
        let mut argv = std::env::args_os();
        let argv0 = argv.next().unwrap_or_default();
        Self::new(locate(Path::new(&argv0), name), argv.collect())
    }
}

/// Path of `name` in the same directory as `argv0`.
///
/// A bare `argv0` resolves against the working directory rather than `PATH`.
pub fn locate(argv0: &Path, name: &str) -> PathBuf {
    match argv0.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => Path::new(".").join(name),
    }
}

impl Delegate for CalicoDelegate {
    fn invoke(&self, stdin: &[u8], env: &[(OsString, OsString)]) -> Result<DelegateOutput> {
        info!("Invoking delegate {}", self.path.display());

        let mut child = Command::new(&self.path)
            .args(&self.args)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| WrapperError::Launch {
                path: self.path.display().to_string(),
                source,
            })?;

        // stdin must be fed while stdout drains; either pipe can fill first
        let pipe = child.stdin.take();
        let output = std::thread::scope(|scope| {
            let writer = pipe.map(|mut pipe| {
                scope.spawn(move || match pipe.write_all(stdin) {
                    Ok(()) => {}
                    // The delegate is free to exit without reading its input
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                        debug!("Delegate closed stdin early");
                    }
                    Err(err) => warn!("Failed to write delegate stdin: {}", err),
                })
            });

            let output = child.wait_with_output();
            if let Some(writer) = writer {
                if writer.join().is_err() {
                    warn!("Delegate stdin writer panicked");
                }
            }
            output
        })
        .map_err(|source| WrapperError::Launch {
            path: self.path.display().to_string(),
            source,
        })?;

        let status = output.status.code().unwrap_or_else(|| {
            warn!("Delegate terminated without an exit code: {}", output.status);
            UNKNOWN_EXIT_STATUS
        });
        debug!(status, stdout_bytes = output.stdout.len(), "Delegate finished");

        Ok(DelegateOutput {
            stdout: output.stdout,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_delegate_next_to_wrapper() {
        assert_eq!(
            locate(Path::new("/opt/cni/bin/calico-wrapper"), "calico"),
            PathBuf::from("/opt/cni/bin/calico")
        );
        assert_eq!(
            locate(Path::new("bin/calico-wrapper"), "calico"),
            PathBuf::from("bin/calico")
        );
    }

    #[test]
    fn bare_argv0_resolves_to_working_directory() {
        assert_eq!(
            locate(Path::new("calico-wrapper"), "calico"),
            PathBuf::from("./calico")
        );
        assert_eq!(locate(Path::new(""), "calico"), PathBuf::from("./calico"));
    }

    #[test]
    fn missing_binary_is_a_launch_error() {
        let delegate = CalicoDelegate::new(PathBuf::from("/nonexistent/calico"), Vec::new());
        let err = delegate.invoke(b"{}", &[]).unwrap_err();
        assert!(matches!(err, WrapperError::Launch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn forwards_streams_and_exit_code() {
        let delegate = CalicoDelegate::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".into(), "cat; printf \"$CNI_ARGS\"; exit 42".into()],
        );
        let env = vec![(OsString::from("CNI_ARGS"), OsString::from(";IP=10.0.0.5"))];

        let output = delegate.invoke(b"{\"name\":\"net\"}", &env).unwrap();
        assert_eq!(output.status, 42);
        assert_eq!(output.stdout, b"{\"name\":\"net\"};IP=10.0.0.5".to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn large_output_before_reading_stdin_completes() {
        use std::sync::mpsc;
        use std::time::Duration;

        const BYTES: usize = 200_000;
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let delegate = CalicoDelegate::new(
                PathBuf::from("/bin/sh"),
                vec![
                    "-c".into(),
                    format!("head -c {} /dev/zero; cat >/dev/null", BYTES).into(),
                ],
            );
            let env = vec![(OsString::from("PATH"), OsString::from("/usr/bin:/bin"))];
            let _ = tx.send(delegate.invoke(&[b' '; BYTES], &env));
        });

        let output = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("delegate invocation stalled")
            .unwrap();
        assert_eq!(output.status, 0);
        assert_eq!(output.stdout.len(), BYTES);
    }

    #[cfg(unix)]
    #[test]
    fn signal_exit_falls_back_to_one() {
        let delegate = CalicoDelegate::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".into(), "kill -9 $$".into()],
        );
        let output = delegate.invoke(b"", &[]).unwrap();
        assert_eq!(output.status, UNKNOWN_EXIT_STATUS);
    }
}
