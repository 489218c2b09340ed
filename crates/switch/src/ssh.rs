//! SSH sessions to switches
//!
//! Runs remote commands over `ssh` with a persistent control master, so a
//! sequence of per-entry writes reuses one TCP connection. Destinations
//! must be reachable without an interactive password prompt.

use netforge_common::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace};

/// A multiplexed SSH session to one switch.
#[derive(Debug, Clone)]
pub struct SshSession {
    destination: String,
}

impl SshSession {
    /// Open a session and verify the destination answers.
    pub async fn connect(destination: impl Into<String>, deadline: Duration) -> Result<Self> {
        let session = Self {
            destination: destination.into(),
        };
        trace!(host = %session.destination, "probing ssh connectivity");
        let (stdout, rc) = session.execute("echo ok", deadline).await?;
        if rc != 0 || stdout.trim() != "ok" {
            return Err(Error::Transport(format!(
                "ssh probe to {} failed (rc={}, stdout={:?})",
                session.destination, rc, stdout
            )));
        }
        debug!(host = %session.destination, "ssh session established");
        Ok(session)
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-oControlMaster=auto")
            .arg("-oControlPath=/tmp/.netforge-ssh-%r@%h:%p")
            .arg("-oControlPersist=10m")
            .arg("-oBatchMode=yes")
            .arg(&self.destination)
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a remote command, returning its stdout and exit code.
    pub async fn execute(&self, remote: &str, deadline: Duration) -> Result<(String, i32)> {
        trace!(host = %self.destination, cmd = remote, "ssh exec");
        let output = timeout(deadline, self.command(remote).output())
            .await
            .map_err(|_| Error::Timeout {
                seconds: deadline.as_secs(),
            })?
            .map_err(|e| Error::Transport(format!("ssh to {}: {}", self.destination, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let rc = output.status.code().unwrap_or(-1);
        if rc != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                host = %self.destination,
                cmd = remote,
                rc,
                stderr = %stderr.trim(),
                "remote command failed"
            );
        }
        Ok((stdout, rc))
    }

    /// Run a remote command, failing unless it exits zero.
    pub async fn execute_checked(&self, remote: &str, deadline: Duration) -> Result<String> {
        let (stdout, rc) = self.execute(remote, deadline).await?;
        if rc != 0 {
            return Err(Error::Transport(format!(
                "{} on {} exited {}",
                remote, self.destination, rc
            )));
        }
        Ok(stdout)
    }
}

/// Quote a string for the remote shell.
pub fn sh_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "_-./:".contains(c)) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_passes_plain_words_through() {
        assert_eq!(sh_quote("Ethernet0"), "Ethernet0");
        assert_eq!(sh_quote("10.0.0.1/31"), "10.0.0.1/31");
    }

    #[test]
    fn quoting_wraps_keys_with_separators() {
        assert_eq!(sh_quote("VLAN|Vlan100"), "'VLAN|Vlan100'");
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
        assert_eq!(sh_quote(""), "''");
    }
}
