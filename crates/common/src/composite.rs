//! CompositeConfig - the full intended ConfigDB for one device
//!
//! Accumulated by the topology provisioner, then diffed against the live
//! snapshot by the delivery engine.

use crate::changeset::{Change, ChangeKind, ChangeSet};
use crate::configdb::{validate_entry, ConfigDbSnapshot, FieldValues, Table};
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// How a composite relates to whatever the device already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// The composite is the complete intended state; live entries with no
    /// counterpart are deleted on delivery.
    Overwrite,
    /// The composite is layered on top of the live state; nothing is
    /// deleted and field maps may be partial.
    Merge,
}

/// Full intended per-device configuration: table -> key -> fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeConfig {
    pub mode: CompositeMode,
    tables: BTreeMap<Table, BTreeMap<String, FieldValues>>,
}

impl CompositeConfig {
    pub fn new(mode: CompositeMode) -> Self {
        Self {
            mode,
            tables: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(BTreeMap::is_empty)
    }

    pub fn entry_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn get(&self, table: Table, key: &str) -> Option<&FieldValues> {
        self.tables.get(&table)?.get(key)
    }

    /// Set an entry. In Overwrite mode a duplicate key replaces the earlier
    /// entry; in Merge mode the field maps are unioned with later wins.
    pub fn set(&mut self, table: Table, key: impl Into<String>, fields: FieldValues) -> Result<()> {
        let key = key.into();
        let entries = self.tables.entry(table).or_default();
        match self.mode {
            CompositeMode::Overwrite => {
                validate_entry(table, &key, &fields)?;
                entries.insert(key, fields);
            }
            CompositeMode::Merge => {
                let slot = entries.entry(key).or_default();
                for (k, v) in fields {
                    slot.insert(k, v);
                }
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, table: Table, key: &str) -> Option<FieldValues> {
        self.tables.get_mut(&table)?.remove(key)
    }

    /// Fold a ChangeSet into the composite: adds and modifies land as
    /// entries, deletes remove them.
    pub fn absorb(&mut self, set: &ChangeSet) -> Result<()> {
        for change in set.iter() {
            match change.kind {
                ChangeKind::Add | ChangeKind::Modify => {
                    self.set(
                        change.table,
                        change.key.clone(),
                        change.after.clone().unwrap_or_default(),
                    )?;
                }
                ChangeKind::Delete => {
                    self.remove(change.table, &change.key);
                }
            }
        }
        Ok(())
    }

    /// Every entry across all tables.
    pub fn iter_entries(&self) -> impl Iterator<Item = (Table, &String, &FieldValues)> {
        self.tables
            .iter()
            .flat_map(|(table, entries)| entries.iter().map(move |(k, f)| (*table, k, f)))
    }

    /// View the composite as a snapshot, for seeding offline devices.
    pub fn as_snapshot(&self) -> ConfigDbSnapshot {
        let mut snapshot = ConfigDbSnapshot::new();
        for (table, key, fields) in self.iter_entries() {
            snapshot.set(table, key.clone(), fields.clone());
        }
        snapshot
    }

    /// Diff this composite against a live snapshot.
    ///
    /// Entries missing from the live snapshot become Adds; entries whose
    /// fields differ become Modifies carrying the full desired field map.
    /// In Overwrite mode, live entries with no counterpart in the composite
    /// become Deletes; Merge mode never deletes.
    pub fn diff(
        &self,
        live: &ConfigDbSnapshot,
        device: impl Into<String>,
        operation: impl Into<String>,
    ) -> Result<ChangeSet> {
        let mut set = ChangeSet::new(device, operation);

        for (table, key, desired) in self.iter_entries() {
            match live.get(table, key) {
                None => set.add(Change::add(table, key.clone(), desired.clone()))?,
                Some(actual) => {
                    // Overwrite means the composite entry is the whole
                    // truth; Merge layers its fields over the live ones.
                    let target = match self.mode {
                        CompositeMode::Overwrite => desired.clone(),
                        CompositeMode::Merge => {
                            let mut union = actual.clone();
                            for (k, v) in desired {
                                union.insert(k.clone(), v.clone());
                            }
                            union
                        }
                    };
                    if *actual != target {
                        set.add(Change::modify(table, key.clone(), actual.clone(), target))?;
                    }
                }
            }
        }

        if self.mode == CompositeMode::Overwrite {
            for (table, key, actual) in live.iter_entries() {
                if self.get(table, key).is_none() {
                    set.add(Change::delete(table, key.clone(), actual.clone()))?;
                }
            }
        }

        Ok(set)
    }

    /// Content hash over the canonical rendering; identical intended
    /// configurations hash identically.
    pub fn content_hash(&self) -> String {
        let canonical =
            serde_json::to_vec(&self.tables).expect("composite tables always serialize");
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
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

    #[test]
    fn overwrite_diff_adds_modifies_and_deletes() {
        let mut composite = CompositeConfig::new(CompositeMode::Overwrite);
        composite
            .set(Table::Vlan, "Vlan100", fields(&[("vlanid", "100")]))
            .unwrap();
        composite
            .set(
                Table::Vlan,
                "Vlan200",
                fields(&[("vlanid", "200"), ("description", "storage")]),
            )
            .unwrap();

        let mut live = ConfigDbSnapshot::new();
        live.set(Table::Vlan, "Vlan200", fields(&[("vlanid", "200")]));
        live.set(Table::Vlan, "Vlan300", fields(&[("vlanid", "300")]));

        let diff = composite.diff(&live, "leaf1", "provision").unwrap();
        assert_eq!(
            diff.get(Table::Vlan, "Vlan100").unwrap().kind,
            ChangeKind::Add
        );
        assert_eq!(
            diff.get(Table::Vlan, "Vlan200").unwrap().kind,
            ChangeKind::Modify
        );
        assert_eq!(
            diff.get(Table::Vlan, "Vlan300").unwrap().kind,
            ChangeKind::Delete
        );
    }

    #[test]
    fn merge_diff_never_deletes() {
        let composite = CompositeConfig::new(CompositeMode::Merge);
        let mut live = ConfigDbSnapshot::new();
        live.set(Table::Vlan, "Vlan300", fields(&[("vlanid", "300")]));
        let diff = composite.diff(&live, "leaf1", "provision").unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn identical_composites_hash_identically() {
        let build = || {
            let mut c = CompositeConfig::new(CompositeMode::Overwrite);
            c.set(Table::Vlan, "Vlan100", fields(&[("vlanid", "100")]))
                .unwrap();
            c.set(
                Table::VxlanTunnel,
                "vtep",
                fields(&[("src_ip", "10.0.0.1")]),
            )
            .unwrap();
            c
        };
        assert_eq!(build().content_hash(), build().content_hash());

        let mut different = build();
        different
            .set(Table::Vlan, "Vlan200", fields(&[("vlanid", "200")]))
            .unwrap();
        assert_ne!(build().content_hash(), different.content_hash());
    }

    #[test]
    fn absorb_folds_changesets_in() {
        let mut set = ChangeSet::new("leaf1", "vlan create");
        set.add(Change::add(
            Table::Vlan,
            "Vlan100",
            fields(&[("vlanid", "100")]),
        ))
        .unwrap();

        let mut composite = CompositeConfig::new(CompositeMode::Overwrite);
        composite.absorb(&set).unwrap();
        assert!(composite.get(Table::Vlan, "Vlan100").is_some());
    }
}
