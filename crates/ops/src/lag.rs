//! Port-channel (LAG) operations

use netforge_common::changeset::{Change, ChangeSet};
use netforge_common::configdb::{FieldValues, Table};
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::{Error, Result};
use netforge_switch::Device;
use once_cell::sync::Lazy;
use regex::Regex;

static LAG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PortChannel\d+$").expect("valid regex"));

/// Inputs for [`create_port_channel`].
#[derive(Debug, Clone)]
pub struct PortChannelParams {
    pub members: Vec<String>,
    pub min_links: u32,
    pub fast_rate: bool,
    pub mtu: Option<u32>,
}

impl Default for PortChannelParams {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            min_links: 1,
            fast_rate: false,
            mtu: None,
        }
    }
}

fn check_member(device: &Device, lag: &str, member: &str, speed: Option<u32>) -> Result<u32> {
    if !device.has_interface(member) {
        return Err(Error::not_found("interface", member));
    }
    if let Some(holder) = device.lag_of(member) {
        return Err(Error::conflict(format!(
            "{} is already a member of {}",
            member, holder
        )));
    }
    if !device.ip_bindings(member).is_empty() {
        return Err(Error::conflict(format!(
            "{} carries an IP assignment, remove it before adding to {}",
            member, lag
        )));
    }
    let member_speed = device.port_speed(member);
    if let Some(expected) = speed {
        if member_speed != expected {
            return Err(Error::conflict(format!(
                "{} runs at {} but {} members run at {}",
                member, member_speed, lag, expected
            )));
        }
    }
    Ok(member_speed)
}

/// Create a port-channel with its initial members.
pub fn create_port_channel(
    device: &Device,
    name: &str,
    params: &PortChannelParams,
) -> Result<ChangeSet> {
    require(
        Permission::LagCreate,
        &PermissionContext::device(&device.name).with_resource(name),
    )?;
    if !LAG_NAME_RE.is_match(name) {
        return Err(Error::validation(format!(
            "{:?} does not match PortChannel<number>",
            name
        )));
    }
    if device.snapshot().contains(Table::PortChannel, name) {
        return Err(Error::conflict(format!("{} already exists", name)));
    }

    let mut speed = None;
    for member in &params.members {
        speed = Some(check_member(device, name, member, speed)?);
    }

    let mtu = params
        .mtu
        .unwrap_or(device.spec().settings.default_mtu);
    let mut set = ChangeSet::new(&device.name, "lag create");
    set.add(Change::add(
        Table::PortChannel,
        name,
        FieldValues::from([
            ("admin_status".to_string(), "up".to_string()),
            ("lacp_key".to_string(), "auto".to_string()),
            ("min_links".to_string(), params.min_links.to_string()),
            ("mtu".to_string(), mtu.to_string()),
            ("fast_rate".to_string(), params.fast_rate.to_string()),
        ]),
    ))?;

    for member in &params.members {
        set.add(Change::add(
            Table::PortChannelMember,
            format!("{}|{}", name, member),
            FieldValues::new(),
        ))?;
        set.merge(admin_up(device, member)?)?;
    }
    Ok(set)
}

/// Bring a member port administratively up.
fn admin_up(device: &Device, member: &str) -> Result<ChangeSet> {
    let mut set = ChangeSet::new(&device.name, "port admin up");
    let current = device.snapshot().get(Table::Port, member).cloned();
    match current {
        Some(fields) if fields.get("admin_status").map(String::as_str) == Some("up") => {}
        Some(fields) => {
            let mut after = fields.clone();
            after.insert("admin_status".to_string(), "up".to_string());
            set.add(Change::modify(Table::Port, member, fields, after))?;
        }
        None => {
            set.add(Change::add(
                Table::Port,
                member,
                FieldValues::from([
                    ("admin_status".to_string(), "up".to_string()),
                    ("speed".to_string(), device.port_speed(member).to_string()),
                ]),
            ))?;
        }
    }
    Ok(set)
}

/// Add one member to an existing port-channel.
pub fn add_port_channel_member(device: &Device, name: &str, member: &str) -> Result<ChangeSet> {
    require(
        Permission::LagModify,
        &PermissionContext::device(&device.name).with_resource(name),
    )?;
    if !device.snapshot().contains(Table::PortChannel, name) {
        return Err(Error::not_found("port-channel", name));
    }
    let speed = device
        .lag_members(name)
        .first()
        .map(|existing| device.port_speed(existing));
    check_member(device, name, member, speed)?;

    let mut set = ChangeSet::new(&device.name, "lag add-member");
    set.add(Change::add(
        Table::PortChannelMember,
        format!("{}|{}", name, member),
        FieldValues::new(),
    ))?;
    set.merge(admin_up(device, member)?)?;
    Ok(set)
}

/// Remove one member from a port-channel.
pub fn remove_port_channel_member(device: &Device, name: &str, member: &str) -> Result<ChangeSet> {
    require(
        Permission::LagModify,
        &PermissionContext::device(&device.name).with_resource(name),
    )?;
    let member_key = format!("{}|{}", name, member);
    let Some(before) = device
        .snapshot()
        .get(Table::PortChannelMember, &member_key)
        .cloned()
    else {
        return Err(Error::not_found("port-channel member", member_key));
    };

    let mut set = ChangeSet::new(&device.name, "lag remove-member");
    set.add(Change::delete(Table::PortChannelMember, member_key, before))?;
    Ok(set)
}

/// Delete a port-channel and its member records.
pub fn delete_port_channel(device: &Device, name: &str) -> Result<ChangeSet> {
    require(
        Permission::LagModify,
        &PermissionContext::device(&device.name).with_resource(name),
    )?;
    let Some(before) = device.snapshot().get(Table::PortChannel, name).cloned() else {
        return Err(Error::not_found("port-channel", name));
    };
    if !device.ip_bindings(name).is_empty() || device.interface_vrf(name).is_some() {
        return Err(Error::conflict(format!(
            "{} still carries L3 configuration",
            name
        )));
    }

    let mut set = ChangeSet::new(&device.name, "lag delete");
    for member in device.lag_members(name) {
        let member_key = format!("{}|{}", name, member);
        let member_before = device
            .snapshot()
            .get(Table::PortChannelMember, &member_key)
            .cloned()
            .unwrap_or_default();
        set.add(Change::delete(
            Table::PortChannelMember,
            member_key,
            member_before,
        ))?;
    }
    set.add(Change::delete(Table::PortChannel, name, before))?;
    Ok(set)
}
