//! Shell command execution for the router networking layer.
//!
//! Commands are run through `/bin/sh -c`, so every value that originates
//! from relation data must go through [`shellquote`] first.
//!
//! # Example
//!
//! ```ignore
//! use router_cfgmgr_common::shell::{self, IP_CMD, shellquote};
//!
//! let cmd = format!("{} route replace {} via {}",
//!     IP_CMD, shellquote("172.250.0.0/16"), shellquote("192.168.250.3"));
//! shell::exec_or_throw(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{RouterError, RouterResult};

/// Path to the `ip` command for interface and route configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `sysctl` command for kernel parameters.
pub const SYSCTL_CMD: &str = "/sbin/sysctl";

/// Path to the `iptables` command for NAT rules.
pub const IPTABLES_CMD: &str = "/sbin/iptables";

/// Characters that need escaping inside shell double-quotes:
/// `$`, `` ` ``, `"`, `\` and newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes characters that keep
/// their special meaning inside double quotes.
///
/// # Example
///
/// ```
/// use router_cfgmgr_common::shell::shellquote;
///
/// assert_eq!(shellquote("core"), "\"core\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Captured output of one command run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit status, or `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Returns true if stderr carries any of `messages`.
    pub fn reports_any(&self, messages: &[&str]) -> bool {
        messages.iter().any(|m| self.stderr.contains(m))
    }

    /// Non-empty output streams, stdout first.
    pub fn diagnostic(&self) -> String {
        [self.stdout.as_str(), self.stderr.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs `cmd` under `/bin/sh -c` and captures its output.
///
/// Only a spawn failure is an `Err`; the exit status is left to the caller.
pub async fn exec(cmd: &str) -> RouterResult<CommandOutput> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .args(["-c", cmd])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| RouterError::ShellExec {
            command: cmd.to_string(),
            source,
        })?;

    let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).trim().to_string();
    Ok(CommandOutput {
        status: output.status.code(),
        stdout: text(&output.stdout),
        stderr: text(&output.stderr),
    })
}

/// Runs `cmd` and fails unless it exits zero. Returns stdout.
pub async fn exec_or_throw(cmd: &str) -> RouterResult<String> {
    exec_tolerating(cmd, &[]).await
}

/// Runs `cmd`, also accepting a non-zero exit whose stderr matches one of
/// `benign` (e.g. deleting a route the kernel already dropped).
pub async fn exec_tolerating(cmd: &str, benign: &[&str]) -> RouterResult<String> {
    let out = exec(cmd).await?;
    if out.success() {
        return Ok(out.stdout);
    }
    if out.reports_any(benign) {
        tracing::debug!(command = %cmd, stderr = %out.stderr, "Target already in desired state");
        return Ok(out.stdout);
    }

    tracing::warn!(command = %cmd, status = ?out.status, stderr = %out.stderr, "Command failed");
    Err(RouterError::ShellCommandFailed {
        command: cmd.to_string(),
        exit_code: out.status.unwrap_or(-1),
        output: out.diagnostic(),
    })
}
