//! Switched virtual interface configuration

use crate::vlan::vlan_key;
use ipnetwork::Ipv4Network;
use netforge_common::changeset::{Change, ChangeSet};
use netforge_common::configdb::{FieldValues, Table};
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::{Error, Result};
use netforge_switch::Device;

/// Inputs for [`configure_svi`].
#[derive(Debug, Clone, Default)]
pub struct SviParams {
    pub vrf: Option<String>,
    pub ip: Option<Ipv4Network>,
    pub anycast_mac: Option<String>,
}

/// Configure the L3 interface of a VLAN.
pub fn configure_svi(device: &Device, vlan_id: u16, params: &SviParams) -> Result<ChangeSet> {
    require(
        Permission::VrfModify,
        &PermissionContext::device(&device.name).with_resource(vlan_key(vlan_id)),
    )?;
    if !device.has_vlan(vlan_id) {
        return Err(Error::not_found("vlan", vlan_key(vlan_id)));
    }
    if let Some(vrf) = &params.vrf {
        if !device.snapshot().contains(Table::Vrf, vrf) {
            return Err(Error::not_found("vrf", vrf.clone()));
        }
    }

    let svi_key = vlan_key(vlan_id);
    let mut desired = device
        .snapshot()
        .get(Table::VlanInterface, &svi_key)
        .cloned()
        .unwrap_or_default();
    if let Some(vrf) = &params.vrf {
        desired.insert("vrf_name".to_string(), vrf.clone());
    }
    if let Some(mac) = &params.anycast_mac {
        desired.insert("anycast_mac".to_string(), mac.clone());
    }

    let mut set = ChangeSet::new(&device.name, "svi configure");
    match device.snapshot().get(Table::VlanInterface, &svi_key) {
        Some(current) if *current != desired => {
            set.add(Change::modify(
                Table::VlanInterface,
                svi_key.clone(),
                current.clone(),
                desired,
            ))?;
        }
        Some(_) => {}
        None => {
            set.add(Change::add(Table::VlanInterface, svi_key.clone(), desired))?;
        }
    }

    if let Some(ip) = params.ip {
        let ip_key = format!("{}|{}", svi_key, ip);
        if !device.snapshot().contains(Table::VlanInterface, &ip_key) {
            set.add(Change::add(Table::VlanInterface, ip_key, FieldValues::new()))?;
        }
    }
    Ok(set)
}
