use std::ffi::OsString;

use crate::args::CniArgs;
use crate::environment::{Environment, CNI_ARGS, CNI_COMMAND, CNI_NETNS};
use crate::error::Result;

/// The command that triggers pod enrichment
pub const ADD: &str = "ADD";

/// CNI parameters the wrapper reads from its environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// `CNI_COMMAND`, empty when unset
    pub command: String,
    /// `CNI_NETNS`, empty when unset. Only its presence matters, so any
    /// bytes are accepted.
    pub netns: OsString,
    /// Decoded `CNI_ARGS`
    pub args: CniArgs,
}

impl Invocation {
    /// Read the invocation from `env`.
    ///
    /// A missing `CNI_ARGS` yields an empty argument set. A non-UTF-8
    /// `CNI_COMMAND` can never be `ADD` and is kept lossily.
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let args = CniArgs::parse(&env.var(CNI_ARGS)?.unwrap_or_default())?;
        let netns = env.var_os(CNI_NETNS).unwrap_or_default();
        let command = env
            .var_os(CNI_COMMAND)
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            command,
            netns,
            args,
        })
    }

    pub fn is_add(&self) -> bool {
        self.command == ADD
    }
}
