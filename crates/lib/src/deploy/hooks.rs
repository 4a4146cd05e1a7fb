//! Deployment hook execution.
//!
//! Hooks are shell snippets from the manifest's `pre_deploy` and `post_deploy`
//! sections. Each runs through the system shell in the package's staging
//! directory, with the caller's environment plus the session variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HookError {
  #[error("failed to start command '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command failed with exit code {code:?}: {cmd}")]
  Failed { cmd: String, code: Option<i32> },
}

/// Run `cmd` in `cwd` with `env` added to the inherited environment.
///
/// The hook writes straight to the caller's stdout and stderr.
pub fn run_hook(cmd: &str, cwd: &Path, env: &BTreeMap<String, String>, shell: Option<&str>) -> Result<(), HookError> {
  info!(cmd = %cmd, "running hook");

  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .envs(env)
    .stdin(Stdio::null())
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit());

  debug!(shell = %shell_cmd, working_dir = ?cwd, "spawning process");

  let status = command.status().map_err(|e| HookError::Spawn {
    cmd: cmd.to_string(),
    source: e,
  })?;

  if !status.success() {
    return Err(HookError::Failed {
      cmd: cmd.to_string(),
      code: status.code(),
    });
  }

  Ok(())
}

/// Shell command and the argument that precedes the script.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), vec!["/C".to_string()])
  }
}
