//! ChangeSet - a transactional delta against ConfigDB
//!
//! Every mutating operation produces one of these: an ordered list of typed
//! mutations against `(table, key, fields)`. A ChangeSet can be previewed,
//! merged, inverted for rollback, and applied against a device.

use crate::configdb::{validate_entry, validate_fields, FieldValues, Table};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

/// What a single change does to its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

/// One mutation against a `(table, key)` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub table: Table,
    pub key: String,
    pub kind: ChangeKind,
    /// Fields as they were before the change. Captured so a partial apply
    /// can be rolled back with [`ChangeSet::inverse`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<FieldValues>,
    /// Fields after the change: the full post-image of the entry for Add
    /// and Modify alike. A field absent here but present in `before` is
    /// dropped by the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<FieldValues>,
}

impl Change {
    pub fn add(table: Table, key: impl Into<String>, after: FieldValues) -> Self {
        Self {
            table,
            key: key.into(),
            kind: ChangeKind::Add,
            before: None,
            after: Some(after),
        }
    }

    pub fn modify(
        table: Table,
        key: impl Into<String>,
        before: FieldValues,
        after: FieldValues,
    ) -> Self {
        Self {
            table,
            key: key.into(),
            kind: ChangeKind::Modify,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(table: Table, key: impl Into<String>, before: FieldValues) -> Self {
        Self {
            table,
            key: key.into(),
            kind: ChangeKind::Delete,
            before: Some(before),
            after: None,
        }
    }

    fn validate(&self) -> Result<()> {
        match self.kind {
            ChangeKind::Add => {
                validate_entry(self.table, &self.key, self.after.as_ref().unwrap_or(&FieldValues::new()))
            }
            ChangeKind::Modify => {
                validate_fields(self.table, self.after.as_ref().unwrap_or(&FieldValues::new()))
            }
            ChangeKind::Delete => Ok(()),
        }
    }
}

/// Ordered sequence of changes produced by one operation on one device.
///
/// Invariant: at most one change per `(table, key)`; adding a second merges
/// with the first (see [`ChangeSet::add`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub device: String,
    pub operation: String,
    pub created_at: DateTime<Utc>,
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(device: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            operation: operation.into(),
            created_at: Utc::now(),
            changes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn get(&self, table: Table, key: &str) -> Option<&Change> {
        self.changes
            .iter()
            .find(|c| c.table == table && c.key == key)
    }

    /// Add a change, merging with any existing change for the same
    /// `(table, key)`:
    ///
    /// - Add + Add/Modify: fields union, later wins, kind stays Add
    /// - Add + Delete: the pair cancels out
    /// - Modify + Add/Modify: fields union, later wins
    /// - Modify + Delete: becomes Delete
    /// - Delete + anything: error, a deleted key must not be resurrected
    ///   within one set
    pub fn add(&mut self, change: Change) -> Result<()> {
        change.validate()?;
        let existing = self
            .changes
            .iter()
            .position(|c| c.table == change.table && c.key == change.key);

        let Some(idx) = existing else {
            self.changes.push(change);
            return Ok(());
        };

        match (self.changes[idx].kind, change.kind) {
            (ChangeKind::Delete, _) => Err(Error::conflict(format!(
                "{}|{} already deleted in this change set",
                change.table, change.key
            ))),
            (_, ChangeKind::Delete) => {
                if self.changes[idx].kind == ChangeKind::Add {
                    // Add then Delete cancels out entirely.
                    self.changes.remove(idx);
                } else {
                    let before = self.changes[idx].before.clone();
                    let slot = &mut self.changes[idx];
                    slot.kind = ChangeKind::Delete;
                    slot.before = before.or(change.before);
                    slot.after = None;
                }
                Ok(())
            }
            (_, ChangeKind::Add | ChangeKind::Modify) => {
                let slot = &mut self.changes[idx];
                let merged = slot.after.get_or_insert_with(FieldValues::new);
                if let Some(incoming) = change.after {
                    for (k, v) in incoming {
                        merged.insert(k, v);
                    }
                }
                Ok(())
            }
        }
    }

    /// Merge another ChangeSet into this one, change by change.
    pub fn merge(&mut self, other: ChangeSet) -> Result<()> {
        for change in other.changes {
            self.add(change)?;
        }
        Ok(())
    }

    /// Changes in apply order.
    ///
    /// Adds and modifies come first, by ascending table band; deletes come
    /// last, by descending band (reverse dependency order). Ordering is
    /// stable within a band.
    pub fn ordered(&self) -> Vec<&Change> {
        let mut out: Vec<&Change> = self.changes.iter().collect();
        out.sort_by_key(|c| match c.kind {
            ChangeKind::Add | ChangeKind::Modify => (0u8, c.table.apply_band()),
            ChangeKind::Delete => (1u8, u8::MAX - c.table.apply_band()),
        });
        out
    }

    /// Best-effort rollback set: the inverse of every change, in a fresh
    /// set. Applying it undoes what this set did, as far as the captured
    /// `before` fields allow.
    pub fn inverse(&self) -> Result<ChangeSet> {
        let mut out = ChangeSet::new(
            self.device.clone(),
            format!("rollback({})", self.operation),
        );
        for change in &self.changes {
            let inverted = match change.kind {
                ChangeKind::Add => Change::delete(
                    change.table,
                    change.key.clone(),
                    change.after.clone().unwrap_or_default(),
                ),
                ChangeKind::Delete => Change::add(
                    change.table,
                    change.key.clone(),
                    change.before.clone().unwrap_or_default(),
                ),
                ChangeKind::Modify => Change::modify(
                    change.table,
                    change.key.clone(),
                    change.after.clone().unwrap_or_default(),
                    change.before.clone().unwrap_or_default(),
                ),
            };
            out.add(inverted)?;
        }
        Ok(out)
    }

    /// Render a terminal diff, grouped by table in apply order.
    pub fn preview(&self) -> String {
        if self.is_empty() {
            return format!("{} no changes\n", "(empty)".dimmed());
        }

        let mut out = String::new();
        out.push_str(&format!(
            "{} {} on {} ({} changes)\n",
            "==".bold(),
            self.operation.bold(),
            self.device,
            self.len()
        ));

        let mut last_table: Option<Table> = None;
        for change in self.ordered() {
            if last_table != Some(change.table) {
                out.push_str(&format!("\n{}\n", change.table.as_str().bold().underline()));
                last_table = Some(change.table);
            }
            match change.kind {
                ChangeKind::Add => {
                    out.push_str(&format!("  {} {}\n", "+".green().bold(), change.key.green()));
                    for (name, value) in change.after.iter().flatten() {
                        out.push_str(&format!("      {} = {}\n", name.green(), value.green()));
                    }
                }
                ChangeKind::Delete => {
                    out.push_str(&format!("  {} {}\n", "-".red().bold(), change.key.red()));
                    for (name, value) in change.before.iter().flatten() {
                        out.push_str(&format!(
                            "      {} = {}\n",
                            name.red().strikethrough(),
                            value.red().strikethrough()
                        ));
                    }
                }
                ChangeKind::Modify => {
                    out.push_str(&format!(
                        "  {} {}\n",
                        "~".yellow().bold(),
                        change.key.yellow()
                    ));
                    let empty = FieldValues::new();
                    let before = change.before.as_ref().unwrap_or(&empty);
                    let after = change.after.as_ref().unwrap_or(&empty);
                    for (name, value) in after {
                        match before.get(name) {
                            None => out.push_str(&format!(
                                "      {} {} = {}\n",
                                "+".green(),
                                name.green(),
                                value.green()
                            )),
                            Some(old) if old != value => out.push_str(&format!(
                                "      {} {}: {} {} {}\n",
                                "~".yellow(),
                                name.yellow(),
                                old.red().strikethrough(),
                                "->".dimmed(),
                                value.green()
                            )),
                            Some(_) => {}
                        }
                    }
                    for (name, value) in before {
                        if !after.contains_key(name) {
                            out.push_str(&format!(
                                "      {} {} = {}\n",
                                "-".red(),
                                name.red().strikethrough(),
                                value.red().strikethrough()
                            ));
                        }
                    }
                }
            }
        }
        out
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

    fn vlan_add(id: u32) -> Change {
        Change::add(
            Table::Vlan,
            format!("Vlan{id}"),
            fields(&[("vlanid", &id.to_string())]),
        )
    }

    #[test]
    fn adding_the_same_change_twice_is_idempotent() {
        let mut set = ChangeSet::new("leaf1", "test");
        set.add(vlan_add(100)).unwrap();
        let once = set.clone();
        set.add(vlan_add(100)).unwrap();
        assert_eq!(set.len(), once.len());
        assert_eq!(
            set.get(Table::Vlan, "Vlan100").unwrap().after,
            once.get(Table::Vlan, "Vlan100").unwrap().after
        );
    }

    #[test]
    fn add_then_delete_cancels() {
        let mut set = ChangeSet::new("leaf1", "test");
        set.add(vlan_add(100)).unwrap();
        set.add(Change::delete(Table::Vlan, "Vlan100", FieldValues::new()))
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn add_plus_modify_merges_with_later_wins() {
        let mut set = ChangeSet::new("leaf1", "test");
        set.add(vlan_add(100)).unwrap();
        set.add(Change::modify(
            Table::Vlan,
            "Vlan100",
            FieldValues::new(),
            fields(&[("description", "servers"), ("vlanid", "100")]),
        ))
        .unwrap();
        let change = set.get(Table::Vlan, "Vlan100").unwrap();
        assert_eq!(change.kind, ChangeKind::Add);
        assert_eq!(
            change.after.as_ref().unwrap().get("description").unwrap(),
            "servers"
        );
    }

    #[test]
    fn modify_then_delete_becomes_delete() {
        let mut set = ChangeSet::new("leaf1", "test");
        let before = fields(&[("vlanid", "100")]);
        set.add(Change::modify(
            Table::Vlan,
            "Vlan100",
            before.clone(),
            fields(&[("description", "x")]),
        ))
        .unwrap();
        set.add(Change::delete(Table::Vlan, "Vlan100", FieldValues::new()))
            .unwrap();
        let change = set.get(Table::Vlan, "Vlan100").unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.before.as_ref().unwrap(), &before);
    }

    #[test]
    fn delete_then_add_is_a_conflict() {
        let mut set = ChangeSet::new("leaf1", "test");
        set.add(Change::delete(Table::Vlan, "Vlan100", FieldValues::new()))
            .unwrap();
        assert!(matches!(set.add(vlan_add(100)), Err(Error::Conflict(_))));
    }

    #[test]
    fn apply_order_puts_deletes_last_in_reverse_band() {
        let mut set = ChangeSet::new("leaf1", "test");
        set.add(Change::delete(Table::Vrf, "Vrf_cust", FieldValues::new()))
            .unwrap();
        set.add(Change::delete(
            Table::BgpNeighbor,
            "Vrf_cust|10.1.1.2",
            FieldValues::new(),
        ))
        .unwrap();
        set.add(vlan_add(100)).unwrap();
        set.add(Change::add(
            Table::VlanMember,
            "Vlan100|Ethernet0",
            fields(&[("tagging_mode", "untagged")]),
        ))
        .unwrap();

        let order: Vec<(Table, ChangeKind)> =
            set.ordered().iter().map(|c| (c.table, c.kind)).collect();
        assert_eq!(
            order,
            vec![
                (Table::Vlan, ChangeKind::Add),
                (Table::VlanMember, ChangeKind::Add),
                (Table::BgpNeighbor, ChangeKind::Delete),
                (Table::Vrf, ChangeKind::Delete),
            ]
        );
    }

    #[test]
    fn inverse_round_trips_kinds() {
        let mut set = ChangeSet::new("leaf1", "test");
        set.add(vlan_add(100)).unwrap();
        set.add(Change::delete(
            Table::Vrf,
            "Vrf_old",
            fields(&[("vni", "10100")]),
        ))
        .unwrap();
        set.add(Change::modify(
            Table::Vlan,
            "Vlan200",
            fields(&[("description", "old")]),
            fields(&[("description", "new")]),
        ))
        .unwrap();

        let inverse = set.inverse().unwrap();
        assert_eq!(
            inverse.get(Table::Vlan, "Vlan100").unwrap().kind,
            ChangeKind::Delete
        );
        assert_eq!(
            inverse.get(Table::Vrf, "Vrf_old").unwrap().kind,
            ChangeKind::Add
        );
        let modify = inverse.get(Table::Vlan, "Vlan200").unwrap();
        assert_eq!(
            modify.after.as_ref().unwrap().get("description").unwrap(),
            "old"
        );
    }

    #[test]
    fn preview_mentions_every_key() {
        colored::control::set_override(false);
        let mut set = ChangeSet::new("leaf1", "vlan create");
        set.add(vlan_add(100)).unwrap();
        set.add(Change::delete(
            Table::AclTable,
            "Ethernet0-in",
            FieldValues::new(),
        ))
        .unwrap();
        let preview = set.preview();
        assert!(preview.contains("Vlan100"));
        assert!(preview.contains("Ethernet0-in"));
        assert!(preview.contains("VLAN"));
        assert!(preview.contains("ACL_TABLE"));
        colored::control::unset_override();
    }

    #[test]
    fn invalid_entries_are_rejected_at_add() {
        let mut set = ChangeSet::new("leaf1", "test");
        let err = set.add(Change::add(
            Table::Vlan,
            "Vlan9999",
            fields(&[("vlanid", "9999")]),
        ));
        assert!(matches!(err, Err(Error::Validation(_))));
    }
}
