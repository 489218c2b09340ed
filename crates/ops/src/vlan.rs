//! VLAN operations

use netforge_common::changeset::{Change, ChangeSet};
use netforge_common::configdb::{FieldValues, Table};
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::{Error, Result};
use netforge_spec::types::check_vlan_id;
use netforge_switch::Device;

pub fn vlan_key(id: u16) -> String {
    format!("Vlan{}", id)
}

/// Create a VLAN. Fails if the id is out of range or the VLAN exists.
pub fn create_vlan(device: &Device, id: u16, name: Option<&str>) -> Result<ChangeSet> {
    require(
        Permission::VlanCreate,
        &PermissionContext::device(&device.name).with_resource(vlan_key(id)),
    )?;
    check_vlan_id(id)?;
    if device.has_vlan(id) {
        return Err(Error::conflict(format!("{} already exists", vlan_key(id))));
    }

    let mut fields = FieldValues::from([("vlanid".to_string(), id.to_string())]);
    if let Some(name) = name {
        fields.insert("description".to_string(), name.to_string());
    }

    let mut set = ChangeSet::new(&device.name, "vlan create");
    set.add(Change::add(Table::Vlan, vlan_key(id), fields))?;
    Ok(set)
}

/// Delete a VLAN. Refuses while members or an SVI still reference it.
pub fn delete_vlan(device: &Device, id: u16) -> Result<ChangeSet> {
    require(
        Permission::VlanDelete,
        &PermissionContext::device(&device.name).with_resource(vlan_key(id)),
    )?;
    let key = vlan_key(id);
    let Some(before) = device.snapshot().get(Table::Vlan, &key).cloned() else {
        return Err(Error::not_found("vlan", key));
    };

    let members = device.snapshot().keys_under(Table::VlanMember, &key);
    if !members.is_empty() {
        return Err(Error::conflict(format!(
            "{} still has {} members",
            key,
            members.len()
        )));
    }
    if device.snapshot().get(Table::VlanInterface, &key).is_some()
        || !device.ip_bindings(&key).is_empty()
    {
        return Err(Error::conflict(format!("{} still has an SVI", key)));
    }

    let mut set = ChangeSet::new(&device.name, "vlan delete");
    set.add(Change::delete(Table::Vlan, key, before))?;
    Ok(set)
}

/// Add an interface to a VLAN.
pub fn add_vlan_member(
    device: &Device,
    vlan_id: u16,
    interface: &str,
    tagged: bool,
) -> Result<ChangeSet> {
    require(
        Permission::VlanModify,
        &PermissionContext::device(&device.name).with_resource(vlan_key(vlan_id)),
    )?;
    if !device.has_vlan(vlan_id) {
        return Err(Error::not_found("vlan", vlan_key(vlan_id)));
    }
    if !device.has_interface(interface) {
        return Err(Error::not_found("interface", interface));
    }

    let tagging = if tagged { "tagged" } else { "untagged" };
    let member_key = format!("{}|{}", vlan_key(vlan_id), interface);
    let mut set = ChangeSet::new(&device.name, "vlan add-member");

    match device.snapshot().get(Table::VlanMember, &member_key) {
        Some(existing) if existing.get("tagging_mode").map(String::as_str) == Some(tagging) => {
            return Err(Error::conflict(format!(
                "{} is already a {} member of {}",
                interface,
                tagging,
                vlan_key(vlan_id)
            )));
        }
        Some(existing) => {
            set.add(Change::modify(
                Table::VlanMember,
                member_key,
                existing.clone(),
                FieldValues::from([("tagging_mode".to_string(), tagging.to_string())]),
            ))?;
        }
        None => {
            set.add(Change::add(
                Table::VlanMember,
                member_key,
                FieldValues::from([("tagging_mode".to_string(), tagging.to_string())]),
            ))?;
        }
    }
    Ok(set)
}

/// Remove an interface from a VLAN.
pub fn remove_vlan_member(device: &Device, vlan_id: u16, interface: &str) -> Result<ChangeSet> {
    require(
        Permission::VlanModify,
        &PermissionContext::device(&device.name).with_resource(vlan_key(vlan_id)),
    )?;
    let member_key = format!("{}|{}", vlan_key(vlan_id), interface);
    let Some(before) = device.snapshot().get(Table::VlanMember, &member_key).cloned() else {
        return Err(Error::not_found("vlan member", member_key));
    };

    let mut set = ChangeSet::new(&device.name, "vlan remove-member");
    set.add(Change::delete(Table::VlanMember, member_key, before))?;
    Ok(set)
}
