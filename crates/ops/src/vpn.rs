//! IP-VPN binding operations
//!
//! Binding attaches an IP-VPN's L3VNI and route targets to an existing
//! VRF; unbinding clears them again.

use netforge_common::changeset::{Change, ChangeSet};
use netforge_common::configdb::{list_value, FieldValues, Table};
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::{Error, Result};
use netforge_spec::IpVpn;
use netforge_switch::Device;

/// The VRF fields an IP-VPN binding owns.
pub fn ipvpn_fields(vpn: &IpVpn) -> FieldValues {
    let mut fields = FieldValues::from([("vni".to_string(), vpn.l3vni.to_string())]);
    if !vpn.import_rt.is_empty() {
        fields.insert("import_rt".to_string(), list_value(&vpn.import_rt));
    }
    if !vpn.export_rt.is_empty() {
        fields.insert("export_rt".to_string(), list_value(&vpn.export_rt));
    }
    fields
}

/// Bind an IP-VPN to a VRF.
pub fn bind_ipvpn(device: &Device, vrf: &str, ipvpn: &str) -> Result<ChangeSet> {
    require(
        Permission::EvpnModify,
        &PermissionContext::device(&device.name).with_resource(vrf),
    )?;
    let Some(current) = device.snapshot().get(Table::Vrf, vrf).cloned() else {
        return Err(Error::not_found("vrf", vrf));
    };
    let vpn = device.spec().ipvpn(ipvpn)?;

    if let Some(existing) = current.get("vni") {
        if existing != &vpn.l3vni.to_string() {
            return Err(Error::conflict(format!(
                "{} is already bound to vni {}",
                vrf, existing
            )));
        }
    }

    let mut desired = current.clone();
    for (k, v) in ipvpn_fields(vpn) {
        desired.insert(k, v);
    }

    let mut set = ChangeSet::new(&device.name, "vpn bind");
    if desired != current {
        set.add(Change::modify(Table::Vrf, vrf, current, desired))?;
    }
    Ok(set)
}

/// Clear a VRF's VPN binding.
pub fn unbind_ipvpn(device: &Device, vrf: &str) -> Result<ChangeSet> {
    require(
        Permission::EvpnModify,
        &PermissionContext::device(&device.name).with_resource(vrf),
    )?;
    let Some(current) = device.snapshot().get(Table::Vrf, vrf).cloned() else {
        return Err(Error::not_found("vrf", vrf));
    };
    if !current.contains_key("vni") {
        return Err(Error::conflict(format!("{} has no VPN binding", vrf)));
    }

    let mut desired = current.clone();
    desired.remove("vni");
    desired.remove("import_rt");
    desired.remove("export_rt");

    let mut set = ChangeSet::new(&device.name, "vpn unbind");
    set.add(Change::modify(Table::Vrf, vrf, current, desired))?;
    Ok(set)
}
