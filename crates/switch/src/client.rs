//! Switch client boundary
//!
//! Everything the core needs from one switch: ConfigDB reads and writes,
//! STATE_DB reads, shell execution, and the device-scoped advisory lock.
//! [`SshSwitchClient`] is the production implementation; tests use
//! [`crate::stub::StubSwitch`].

use crate::ssh::{sh_quote, SshSession};
use async_trait::async_trait;
use netforge_common::configdb::{ConfigDbSnapshot, FieldValues, Table};
use netforge_common::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Well-known STATE_DB key holding the advisory lock.
pub const LOCK_KEY: &str = "NETFORGE_LOCK";

/// Proof of lock ownership, passed back on unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub owner: String,
    pub token: String,
}

/// Deadlines for each class of switch I/O.
#[derive(Debug, Clone)]
pub struct SwitchTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
    pub shell: Duration,
    pub save: Duration,
    pub reload: Duration,
    pub liveness: Duration,
    pub liveness_interval: Duration,
}

impl Default for SwitchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(15),
            write: Duration::from_secs(5),
            shell: Duration::from_secs(30),
            save: Duration::from_secs(30),
            reload: Duration::from_secs(90),
            liveness: Duration::from_secs(30),
            liveness_interval: Duration::from_secs(2),
        }
    }
}

/// Operations the core requires from a switch connection.
///
/// `write` has replace semantics: the entry afterwards holds exactly the
/// given fields. Callers merge before writing when they mean to patch.
#[async_trait]
pub trait SwitchClient: Send + Sync {
    async fn read_all_tables(&self) -> Result<ConfigDbSnapshot>;

    async fn write(&self, table: Table, key: &str, fields: &FieldValues) -> Result<()>;

    async fn delete(&self, table: Table, key: &str) -> Result<()>;

    async fn read_state_table(&self, name: &str) -> Result<BTreeMap<String, FieldValues>>;

    async fn exec_shell(&self, cmd: &str, deadline: Duration) -> Result<(String, i32)>;

    async fn lock_device(&self, ttl: Duration, owner: &str) -> Result<LockToken>;

    async fn unlock(&self, token: &LockToken) -> Result<()>;

    /// Persist the running configuration.
    async fn config_save(&self, deadline: Duration) -> Result<()> {
        let (_, rc) = self.exec_shell("config save -y", deadline).await?;
        if rc != 0 {
            return Err(Error::Transport(format!("config save exited {}", rc)));
        }
        Ok(())
    }

    /// Force every daemon to re-read ConfigDB.
    async fn config_reload(&self, deadline: Duration) -> Result<()> {
        let (_, rc) = self.exec_shell("config reload -y", deadline).await?;
        if rc != 0 {
            return Err(Error::Transport(format!("config reload exited {}", rc)));
        }
        Ok(())
    }

    /// Whether the routing daemon answers its liveness probe.
    async fn routing_alive(&self, deadline: Duration) -> Result<bool> {
        let (_, rc) = self
            .exec_shell("vtysh -c 'show version'", deadline)
            .await?;
        Ok(rc == 0)
    }
}

/// Production client: SSH to the switch, speaking to its KV-store CLI.
pub struct SshSwitchClient {
    session: SshSession,
    timeouts: SwitchTimeouts,
}

/// One row of the STATE_DB dump format.
#[derive(Deserialize)]
struct StateDumpRow {
    #[serde(default)]
    value: FieldValues,
}

impl SshSwitchClient {
    pub async fn connect(destination: impl Into<String>, timeouts: SwitchTimeouts) -> Result<Self> {
        let session = SshSession::connect(destination, timeouts.connect).await?;
        Ok(Self { session, timeouts })
    }

    pub fn destination(&self) -> &str {
        self.session.destination()
    }

    fn full_key(table: Table, key: &str) -> String {
        format!("{}|{}", table.as_str(), key)
    }
}

#[async_trait]
impl SwitchClient for SshSwitchClient {
    #[instrument(skip(self), fields(host = %self.session.destination()))]
    async fn read_all_tables(&self) -> Result<ConfigDbSnapshot> {
        let dump = self
            .session
            .execute_checked("sonic-cfggen -d --print-data", self.timeouts.read)
            .await?;
        let snapshot = ConfigDbSnapshot::from_dump(&dump)?;
        debug!(entries = snapshot.entry_count(), "snapshot read");
        Ok(snapshot)
    }

    async fn write(&self, table: Table, key: &str, fields: &FieldValues) -> Result<()> {
        let full = sh_quote(&Self::full_key(table, key));
        // Replace semantics: clear, then set. Empty entries are stored as
        // the NULL/NULL sentinel the switch convention expects.
        let mut cmd = format!(
            "sonic-db-cli CONFIG_DB DEL {k} > /dev/null; sonic-db-cli CONFIG_DB HSET {k}",
            k = full
        );
        if fields.is_empty() {
            cmd.push_str(" NULL NULL");
        } else {
            for (name, value) in fields {
                cmd.push(' ');
                cmd.push_str(&sh_quote(name));
                cmd.push(' ');
                cmd.push_str(&sh_quote(value));
            }
        }
        self.session
            .execute_checked(&cmd, self.timeouts.write)
            .await?;
        Ok(())
    }

    async fn delete(&self, table: Table, key: &str) -> Result<()> {
        let cmd = format!(
            "sonic-db-cli CONFIG_DB DEL {}",
            sh_quote(&Self::full_key(table, key))
        );
        self.session
            .execute_checked(&cmd, self.timeouts.write)
            .await?;
        Ok(())
    }

    async fn read_state_table(&self, name: &str) -> Result<BTreeMap<String, FieldValues>> {
        let cmd = format!(
            "sonic-db-dump -n STATE_DB -k {} -y",
            sh_quote(&format!("{}|*", name))
        );
        let dump = self
            .session
            .execute_checked(&cmd, self.timeouts.read)
            .await?;
        let raw: BTreeMap<String, StateDumpRow> = serde_json::from_str(&dump)?;
        let prefix = format!("{}|", name);
        Ok(raw
            .into_iter()
            .map(|(key, row)| {
                let key = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
                (key, row.value)
            })
            .collect())
    }

    async fn exec_shell(&self, cmd: &str, deadline: Duration) -> Result<(String, i32)> {
        self.session.execute(cmd, deadline).await
    }

    async fn lock_device(&self, ttl: Duration, owner: &str) -> Result<LockToken> {
        let token = uuid::Uuid::new_v4().to_string();
        let value = format!("{}#{}", owner, token);
        let cmd = format!(
            "sonic-db-cli STATE_DB SET {} {} NX EX {}",
            sh_quote(LOCK_KEY),
            sh_quote(&value),
            ttl.as_secs().max(1)
        );
        let (stdout, _) = self.session.execute(&cmd, self.timeouts.write).await?;
        if stdout.trim() == "OK" {
            return Ok(LockToken {
                owner: owner.to_string(),
                token,
            });
        }
        // Someone else holds it; report who.
        let (holder, _) = self
            .session
            .execute(
                &format!("sonic-db-cli STATE_DB GET {}", sh_quote(LOCK_KEY)),
                self.timeouts.write,
            )
            .await?;
        Err(Error::LockBusy {
            device: self.session.destination().to_string(),
            owner: holder
                .trim()
                .split('#')
                .next()
                .unwrap_or("unknown")
                .to_string(),
        })
    }

    async fn unlock(&self, token: &LockToken) -> Result<()> {
        let (holder, _) = self
            .session
            .execute(
                &format!("sonic-db-cli STATE_DB GET {}", sh_quote(LOCK_KEY)),
                self.timeouts.write,
            )
            .await?;
        let expected = format!("{}#{}", token.owner, token.token);
        if holder.trim() != expected {
            warn!(
                host = %self.session.destination(),
                holder = %holder.trim(),
                "lock changed hands before unlock, leaving it alone"
            );
            return Ok(());
        }
        self.session
            .execute_checked(
                &format!("sonic-db-cli STATE_DB DEL {}", sh_quote(LOCK_KEY)),
                self.timeouts.write,
            )
            .await?;
        Ok(())
    }
}
