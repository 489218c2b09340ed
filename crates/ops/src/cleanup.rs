//! Orphan collection
//!
//! Scans a device snapshot for configuration that nothing references any
//! more: ACL tables bound to no port, VRFs with no interface bindings,
//! tunnel maps pointing at VLANs or VRFs that are gone.

use netforge_common::changeset::{Change, ChangeSet};
use netforge_common::configdb::{split_key, Table};
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::Result;
use netforge_switch::Device;
use serde::Serialize;

/// Restrict a cleanup run to one orphan class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    Acl,
    Vrf,
    VxlanMap,
}

/// What a cleanup run found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupSummary {
    pub orphan_acl_tables: Vec<String>,
    pub orphan_vrfs: Vec<String>,
    pub orphan_tunnel_maps: Vec<String>,
}

impl CleanupSummary {
    pub fn is_empty(&self) -> bool {
        self.orphan_acl_tables.is_empty()
            && self.orphan_vrfs.is_empty()
            && self.orphan_tunnel_maps.is_empty()
    }
}

/// Scan for orphans and emit the delete set.
pub fn cleanup(
    device: &Device,
    kind: Option<CleanupKind>,
) -> Result<(ChangeSet, CleanupSummary)> {
    require(
        Permission::DeviceCleanup,
        &PermissionContext::device(&device.name),
    )?;
    let mut set = ChangeSet::new(&device.name, "cleanup");
    let mut summary = CleanupSummary::default();
    let wants = |k: CleanupKind| kind.is_none() || kind == Some(k);

    if wants(CleanupKind::Acl) {
        for (table_name, fields) in device.snapshot().table(Table::AclTable) {
            let bound = fields
                .get("ports")
                .map(|p| p.split(',').any(|p| !p.is_empty()))
                .unwrap_or(false);
            if bound {
                continue;
            }
            for (rule_key, rule_fields) in device
                .snapshot()
                .table(Table::AclRule)
                .filter(|(key, _)| split_key(key).first() == Some(&table_name.as_str()))
            {
                set.add(Change::delete(
                    Table::AclRule,
                    rule_key.clone(),
                    rule_fields.clone(),
                ))?;
            }
            set.add(Change::delete(
                Table::AclTable,
                table_name.clone(),
                fields.clone(),
            ))?;
            summary.orphan_acl_tables.push(table_name.clone());
        }
    }

    if wants(CleanupKind::Vrf) {
        for vrf in device.vrfs() {
            if device.vrf_has_bindings(&vrf) {
                continue;
            }
            let fields = device
                .snapshot()
                .get(Table::Vrf, &vrf)
                .cloned()
                .unwrap_or_default();
            set.add(Change::delete(Table::Vrf, vrf.clone(), fields))?;
            summary.orphan_vrfs.push(vrf);
        }
    }

    if wants(CleanupKind::VxlanMap) {
        for (map_key, fields) in device.snapshot().table(Table::VxlanTunnelMap) {
            let vlan_gone = fields
                .get("vlan")
                .is_some_and(|vlan| !device.snapshot().contains(Table::Vlan, vlan));
            // A map whose VRF is only now being deleted is an orphan too.
            let vrf_gone = fields.get("vrf").is_some_and(|vrf| {
                !device.snapshot().contains(Table::Vrf, vrf)
                    || summary.orphan_vrfs.contains(vrf)
            });
            if vlan_gone || vrf_gone {
                set.add(Change::delete(
                    Table::VxlanTunnelMap,
                    map_key.clone(),
                    fields.clone(),
                ))?;
                summary.orphan_tunnel_maps.push(map_key.clone());
            }
        }
    }

    Ok((set, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::connected_device;

    #[tokio::test]
    async fn finds_each_orphan_class() {
        let (device, _stub) = connected_device(&[
            // ACL with no ports left.
            (
                Table::AclTable,
                "Ethernet0-in",
                &[("type", "L3"), ("stage", "ingress"), ("ports", "")],
            ),
            (
                Table::AclRule,
                "Ethernet0-in|RULE_10",
                &[("PRIORITY", "9990"), ("PACKET_ACTION", "DROP")],
            ),
            // VRF with no bindings, and its map.
            (Table::Vrf, "Vrf_stale", &[("vni", "10900")]),
            (
                Table::VxlanTunnelMap,
                "vtep|map_10900_Vrf_stale",
                &[("vni", "10900"), ("vrf", "Vrf_stale")],
            ),
            // Map pointing at a VLAN that is gone.
            (
                Table::VxlanTunnelMap,
                "vtep|map_1100_Vlan100",
                &[("vni", "1100"), ("vlan", "Vlan100")],
            ),
            // Healthy VRF that stays.
            (Table::Vrf, "Vrf_live", &[]),
            (Table::Interface, "Ethernet4", &[("vrf_name", "Vrf_live")]),
        ])
        .await;

        let (set, summary) = cleanup(&device, None).unwrap();
        assert_eq!(summary.orphan_acl_tables, vec!["Ethernet0-in"]);
        assert_eq!(summary.orphan_vrfs, vec!["Vrf_stale"]);
        assert_eq!(
            summary.orphan_tunnel_maps,
            vec!["vtep|map_10900_Vrf_stale", "vtep|map_1100_Vlan100"]
        );
        assert!(set.get(Table::AclRule, "Ethernet0-in|RULE_10").is_some());
        assert!(set.get(Table::Vrf, "Vrf_live").is_none());
        assert_eq!(set.len(), 5);
    }

    #[tokio::test]
    async fn kind_filter_narrows_the_scan() {
        let (device, _stub) = connected_device(&[
            (
                Table::AclTable,
                "Ethernet0-in",
                &[("type", "L3"), ("stage", "ingress")],
            ),
            (Table::Vrf, "Vrf_stale", &[]),
        ])
        .await;

        let (_, summary) = cleanup(&device, Some(CleanupKind::Vrf)).unwrap();
        assert!(summary.orphan_acl_tables.is_empty());
        assert_eq!(summary.orphan_vrfs, vec!["Vrf_stale"]);
    }

    #[tokio::test]
    async fn clean_device_yields_empty_set() {
        let (device, _stub) = connected_device(&[]).await;
        let (set, summary) = cleanup(&device, None).unwrap();
        assert!(set.is_empty());
        assert!(summary.is_empty());
    }
}
