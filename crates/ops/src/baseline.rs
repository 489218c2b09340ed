//! Baseline application
//!
//! Renders a configlet against device-derived variables (plus caller
//! overrides) and emits the delta that brings the device up to the
//! baseline.

use netforge_common::changeset::{Change, ChangeSet};
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::Result;
use netforge_switch::Device;
use std::collections::BTreeMap;

/// Variables every configlet can rely on without the caller passing them.
fn builtin_vars(device: &Device) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("device".to_string(), device.name.clone()),
        ("hostname".to_string(), device.name.clone()),
        ("asn".to_string(), device.asn.to_string()),
        ("loopback".to_string(), device.loopback.to_string()),
        ("router_id".to_string(), device.router_id.to_string()),
        ("mgmt_ip".to_string(), device.mgmt_ip.to_string()),
        ("platform".to_string(), device.platform.name.clone()),
        ("hwsku".to_string(), device.platform.hwsku.clone()),
    ])
}

/// Apply a named baseline configlet to a device.
pub fn apply_baseline(
    device: &Device,
    configlet: &str,
    vars: &BTreeMap<String, String>,
) -> Result<ChangeSet> {
    require(
        Permission::BaselineApply,
        &PermissionContext::device(&device.name).with_resource(configlet),
    )?;
    let template = device.network().configlet(configlet)?;

    let mut merged = builtin_vars(device);
    for (k, v) in vars {
        merged.insert(k.clone(), v.clone());
    }

    let mut set = ChangeSet::new(&device.name, "baseline apply");
    for (table, key, fields) in template.render(&merged)? {
        match device.snapshot().get(table, &key) {
            None => set.add(Change::add(table, key, fields))?,
            Some(current) => {
                // Baselines are authoritative for the fields they name,
                // hands-off for the rest.
                let mut desired = current.clone();
                for (k, v) in fields {
                    desired.insert(k, v);
                }
                if desired != *current {
                    set.add(Change::modify(table, key, current.clone(), desired))?;
                }
            }
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_network;
    use netforge_common::configdb::Table;
    use netforge_spec::Configlet;
    use netforge_switch::Device;
    use std::sync::Arc;

    fn network_with_configlet() -> netforge_spec::Network {
        let mut network = test_network();
        let configlet: Configlet = serde_json::from_str(
            r#"{
                "name": "day1",
                "entries": {
                    "DEVICE_METADATA": {
                        "localhost": {
                            "hostname": "{{hostname}}",
                            "bgp_asn": "{{asn}}",
                            "router_id": "{{router_id}}"
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        network.configlets.insert("day1".to_string(), configlet);
        network
    }

    #[tokio::test]
    async fn builtins_fill_the_template() {
        let device = Device::offline(Arc::new(network_with_configlet()), "leaf1").unwrap();
        let set = apply_baseline(&device, "day1", &BTreeMap::new()).unwrap();
        let change = set.get(Table::DeviceMetadata, "localhost").unwrap();
        let fields = change.after.as_ref().unwrap();
        assert_eq!(fields.get("hostname").unwrap(), "leaf1");
        assert_eq!(fields.get("bgp_asn").unwrap(), "65001");
        assert_eq!(fields.get("router_id").unwrap(), "10.255.0.1");
    }

    #[tokio::test]
    async fn caller_vars_override_builtins() {
        let device = Device::offline(Arc::new(network_with_configlet()), "leaf1").unwrap();
        let vars = BTreeMap::from([("hostname".to_string(), "leaf1.pod2".to_string())]);
        let set = apply_baseline(&device, "day1", &vars).unwrap();
        let change = set.get(Table::DeviceMetadata, "localhost").unwrap();
        assert_eq!(
            change.after.as_ref().unwrap().get("hostname").unwrap(),
            "leaf1.pod2"
        );
    }

    #[tokio::test]
    async fn unknown_configlet_is_not_found() {
        let device = Device::offline(Arc::new(test_network()), "leaf1").unwrap();
        assert!(apply_baseline(&device, "ghost", &BTreeMap::new()).is_err());
    }
}
