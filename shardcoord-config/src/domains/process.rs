//! Worker process launch configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::validation::{Validatable, validate_required_string};
use crate::error::ConfigResult;

/// Command used to launch one shard worker
///
/// Each argument is a template. `{0}` or `{shard_id}` is replaced with the
/// shard id, `{1}` or `{coordinator_pid}` with the coordinator's process id and
/// `{2}` with an empty string (kept so older argument lists still render).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Executable to run
    #[serde(default = "default_command")]
    pub command: String,

    /// Argument templates
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the worker, inherited when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            working_dir: None,
        }
    }
}

impl Validatable for ProcessConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.command, "command", self.domain_name())?;

        if !self
            .args
            .iter()
            .any(|arg| arg.contains("{0}") || arg.contains("{shard_id}"))
        {
            log::warn!("process.args never reference the shard id; every shard will receive identical arguments");
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "process"
    }
}

fn default_command() -> String {
    "shard-worker".to_string()
}

fn default_args() -> Vec<String> {
    vec!["{0}".to_string(), "{1}".to_string()]
}
