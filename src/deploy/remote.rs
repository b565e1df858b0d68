//! Command execution on the deploy target.
//!
//! [`SshRemote`] runs commands over `ssh` and uploads with `scp`;
//! [`LocalRemote`] runs them through `sh` on this machine, for single-host
//! setups and for exercising the deploy tasks against a scratch directory.
//! [`Target`] layers the service-account `sudo`, exit-status checking, and
//! the small file queries the tasks need on top of either.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Captured result of one remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn from_output(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        }
    }
}

pub trait Remote {
    /// Human-readable target, used in log lines.
    fn describe(&self) -> String;

    /// Run `command` through a shell with `cwd` as working directory.
    /// A non-zero exit is not an error here.
    fn exec(&self, cwd: &str, command: &str) -> Result<CommandOutput>;

    /// Copy a local file to `remote_path`.
    fn put(&self, local: &Path, remote_path: &str) -> Result<()>;
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

pub struct SshRemote {
    host: String,
    port: Option<u16>,
}

impl SshRemote {
    pub fn new(host: &str, port: Option<u16>) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl Remote for SshRemote {
    fn describe(&self) -> String {
        self.host.clone()
    }

    fn exec(&self, cwd: &str, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"]);
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        cmd.arg(&self.host);
        cmd.arg(format!("cd {} && {}", shell_quote(cwd), command));

        let output = cmd
            .output()
            .with_context(|| "Failed to execute 'ssh'. Is OpenSSH installed?")?;
        Ok(CommandOutput::from_output(output))
    }

    fn put(&self, local: &Path, remote_path: &str) -> Result<()> {
        let mut cmd = Command::new("scp");
        cmd.args(["-o", "BatchMode=yes"]);
        if let Some(port) = self.port {
            cmd.arg("-P").arg(port.to_string());
        }
        cmd.arg(local);
        cmd.arg(format!("{}:{}", self.host, remote_path));

        let output = cmd
            .output()
            .with_context(|| "Failed to execute 'scp'. Is OpenSSH installed?")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("scp to {} failed: {}", self.host, stderr.trim());
        }
        Ok(())
    }
}

pub struct LocalRemote;

impl Remote for LocalRemote {
    fn describe(&self) -> String {
        "local".to_string()
    }

    fn exec(&self, cwd: &str, command: &str) -> Result<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .with_context(|| format!("Failed to run '{}' in {}", command, cwd))?;
        Ok(CommandOutput::from_output(output))
    }

    fn put(&self, local: &Path, remote_path: &str) -> Result<()> {
        std::fs::copy(local, remote_path).with_context(|| {
            format!("Failed to copy {} to {}", local.display(), remote_path)
        })?;
        Ok(())
    }
}

/// A deploy root on a [`Remote`], with an optional service account.
pub struct Target {
    remote: Box<dyn Remote>,
    account: Option<String>,
    root: String,
}

impl Target {
    pub fn new(remote: Box<dyn Remote>, account: Option<&str>, root: &str) -> Self {
        Self {
            remote,
            account: account.map(str::to_string),
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn describe(&self) -> String {
        format!("{}:{}", self.remote.describe(), self.root)
    }

    /// Absolute path of `relative` under the deploy root.
    pub fn path(&self, relative: &str) -> String {
        format!("{}/{}", self.root, relative.trim_start_matches('/'))
    }

    fn as_account(&self, command: &str) -> String {
        match &self.account {
            Some(account) => format!(
                "sudo -u {} sh -c {}",
                shell_quote(account),
                shell_quote(command)
            ),
            None => command.to_string(),
        }
    }

    fn checked(&self, cwd: &str, command: &str) -> Result<String> {
        tracing::debug!(target_host = %self.remote.describe(), cwd, command, "remote");
        let output = self.remote.exec(cwd, command)?;
        if !output.success() {
            bail!(
                "remote command failed (exit {}): {}\n{}",
                output
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                command,
                output.stderr.trim()
            );
        }
        Ok(output.stdout)
    }

    /// Run as the connecting user; fails on non-zero exit.
    pub fn run(&self, cwd: &str, command: &str) -> Result<String> {
        self.checked(cwd, command)
    }

    /// Run as the service account; fails on non-zero exit.
    pub fn sudo(&self, cwd: &str, command: &str) -> Result<String> {
        self.checked(cwd, &self.as_account(command))
    }

    /// Run as the service account and return the output whatever the exit.
    pub fn sudo_warn_only(&self, cwd: &str, command: &str) -> Result<CommandOutput> {
        let command = self.as_account(command);
        tracing::debug!(target_host = %self.remote.describe(), cwd, %command, "remote (warn only)");
        self.remote.exec(cwd, &command)
    }

    /// Whether `relative` exists under the root (dangling symlinks count).
    pub fn exists(&self, relative: &str) -> Result<bool> {
        let quoted = shell_quote(relative);
        let output = self
            .remote
            .exec(&self.root, &format!("test -e {0} || test -L {0}", quoted))?;
        Ok(output.success())
    }

    /// Target of the symlink `relative`, or `None` when it does not exist.
    pub fn readlink(&self, relative: &str) -> Result<Option<String>> {
        if !self.exists(relative)? {
            return Ok(None);
        }
        let out = self.sudo(&self.root, &format!("readlink {}", shell_quote(relative)))?;
        Ok(Some(out.trim().to_string()))
    }

    pub fn put(&self, local: &Path, remote_path: &str) -> Result<()> {
        tracing::debug!(target_host = %self.remote.describe(), local = %local.display(), remote_path, "put");
        self.remote.put(local, remote_path)
    }
}
