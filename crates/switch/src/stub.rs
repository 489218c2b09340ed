//! In-memory switch double
//!
//! Implements [`SwitchClient`] over plain maps: unit tests, the e2e
//! scenarios, and offline devices all run against it. Records every write
//! so dry-run purity is observable, and supports injected write failures
//! for partial-apply tests.

use crate::client::{LockToken, SwitchClient};
use async_trait::async_trait;
use netforge_common::configdb::{ConfigDbSnapshot, FieldValues, Table};
use netforge_common::{Error, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// What a write did, as recorded by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedWrite {
    Set { table: Table, key: String },
    Delete { table: Table, key: String },
}

#[derive(Default)]
struct StubInner {
    config: ConfigDbSnapshot,
    state: BTreeMap<String, BTreeMap<String, FieldValues>>,
    lock: Option<(String, String)>,
    writes: Vec<RecordedWrite>,
    shell_log: Vec<String>,
    fail_on: Option<(Table, String)>,
    saved: bool,
    reloaded: bool,
    routing_alive: bool,
}

/// An idealised switch held entirely in memory.
pub struct StubSwitch {
    inner: Mutex<StubInner>,
}

impl Default for StubSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl StubSwitch {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StubInner {
                routing_alive: true,
                ..Default::default()
            }),
        }
    }

    /// Seed a ConfigDB entry.
    pub fn with_entry(self, table: Table, key: &str, fields: FieldValues) -> Self {
        self.inner.lock().config.set(table, key, fields);
        self
    }

    /// Seed an operational-state row, e.g. a BGP session state.
    pub fn set_state(&self, table: &str, key: &str, fields: FieldValues) {
        self.inner
            .lock()
            .state
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), fields);
    }

    /// Replace the whole ConfigDB content.
    pub fn load_config(&self, snapshot: ConfigDbSnapshot) {
        self.inner.lock().config = snapshot;
    }

    /// Fail the next write or delete touching this entry.
    pub fn fail_next_write_on(&self, table: Table, key: &str) {
        self.inner.lock().fail_on = Some((table, key.to_string()));
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    pub fn shell_log(&self) -> Vec<String> {
        self.inner.lock().shell_log.clone()
    }

    pub fn locked_by(&self) -> Option<String> {
        self.inner.lock().lock.as_ref().map(|(owner, _)| owner.clone())
    }

    pub fn was_saved(&self) -> bool {
        self.inner.lock().saved
    }

    pub fn was_reloaded(&self) -> bool {
        self.inner.lock().reloaded
    }

    pub fn set_routing_alive(&self, alive: bool) {
        self.inner.lock().routing_alive = alive;
    }

    /// Current ConfigDB content, for assertions.
    pub fn config(&self) -> ConfigDbSnapshot {
        self.inner.lock().config.clone()
    }
}

#[async_trait]
impl SwitchClient for StubSwitch {
    async fn read_all_tables(&self) -> Result<ConfigDbSnapshot> {
        Ok(self.inner.lock().config.clone())
    }

    async fn write(&self, table: Table, key: &str, fields: &FieldValues) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_on.as_ref() == Some(&(table, key.to_string())) {
            inner.fail_on = None;
            return Err(Error::Transport(format!(
                "injected write failure on {}|{}",
                table, key
            )));
        }
        inner.writes.push(RecordedWrite::Set {
            table,
            key: key.to_string(),
        });
        inner.config.set(table, key, fields.clone());
        Ok(())
    }

    async fn delete(&self, table: Table, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_on.as_ref() == Some(&(table, key.to_string())) {
            inner.fail_on = None;
            return Err(Error::Transport(format!(
                "injected delete failure on {}|{}",
                table, key
            )));
        }
        inner.writes.push(RecordedWrite::Delete {
            table,
            key: key.to_string(),
        });
        inner.config.remove(table, key);
        Ok(())
    }

    async fn read_state_table(&self, name: &str) -> Result<BTreeMap<String, FieldValues>> {
        Ok(self
            .inner
            .lock()
            .state
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn exec_shell(&self, cmd: &str, _deadline: Duration) -> Result<(String, i32)> {
        let mut inner = self.inner.lock();
        inner.shell_log.push(cmd.to_string());
        match cmd {
            "config save -y" => {
                inner.saved = true;
                Ok((String::new(), 0))
            }
            "config reload -y" => {
                inner.reloaded = true;
                Ok((String::new(), 0))
            }
            _ if cmd.starts_with("vtysh") => {
                let rc = if inner.routing_alive { 0 } else { 1 };
                Ok((String::new(), rc))
            }
            _ => Ok((String::new(), 0)),
        }
    }

    async fn lock_device(&self, _ttl: Duration, owner: &str) -> Result<LockToken> {
        let mut inner = self.inner.lock();
        if let Some((holder, _)) = &inner.lock {
            return Err(Error::LockBusy {
                device: "stub".to_string(),
                owner: holder.clone(),
            });
        }
        let token = uuid::Uuid::new_v4().to_string();
        inner.lock = Some((owner.to_string(), token.clone()));
        Ok(LockToken {
            owner: owner.to_string(),
            token,
        })
    }

    async fn unlock(&self, token: &LockToken) -> Result<()> {
        let mut inner = self.inner.lock();
        match &inner.lock {
            Some((_, held)) if *held == token.token => {
                inner.lock = None;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn writes_are_recorded_and_visible() {
        let stub = StubSwitch::new();
        stub.write(Table::Vlan, "Vlan100", &fields(&[("vlanid", "100")]))
            .await
            .unwrap();
        assert_eq!(stub.write_count(), 1);
        let snapshot = stub.read_all_tables().await.unwrap();
        assert!(snapshot.contains(Table::Vlan, "Vlan100"));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let stub = StubSwitch::new();
        stub.fail_next_write_on(Table::Vlan, "Vlan100");
        let err = stub
            .write(Table::Vlan, "Vlan100", &FieldValues::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        stub.write(Table::Vlan, "Vlan100", &FieldValues::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let stub = StubSwitch::new();
        let token = stub
            .lock_device(Duration::from_secs(60), "alice")
            .await
            .unwrap();
        let err = stub
            .lock_device(Duration::from_secs(60), "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockBusy { owner, .. } if owner == "alice"));
        stub.unlock(&token).await.unwrap();
        stub.lock_device(Duration::from_secs(60), "bob")
            .await
            .unwrap();
    }
}
