//! Service attachment operations
//!
//! `apply_service` is the centrepiece of the surface: it expands a named
//! service definition into every table entry an interface needs, driven by
//! the service type. `remove_service` inverts it from the recorded
//! binding, and `refresh_service` reconciles an attached interface with
//! the current definition.

use crate::filter::{acl_table_name, compile, Direction};
use crate::neighbor::derive_neighbor;
use crate::vlan::vlan_key;
use crate::vpn::ipvpn_fields;
use ipnetwork::Ipv4Network;
use netforge_common::changeset::{Change, ChangeKind, ChangeSet};
use netforge_common::configdb::{split_key, FieldValues, Table};
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::{Error, Result};
use netforge_spec::{Service, ServiceKind, VrfType};
use netforge_switch::{l3_table_for, Device};
use std::net::Ipv4Addr;
use tracing::debug;

/// Caller-supplied inputs to [`apply_service`].
#[derive(Debug, Clone, Default)]
pub struct ApplyServiceParams {
    /// Interface address, required for L3 services.
    pub ip: Option<Ipv4Network>,
    /// Peer AS, required when the service's routing says "request".
    pub peer_as: Option<u32>,
    /// Explicit BGP neighbor, required when it cannot be derived.
    pub neighbor: Option<Ipv4Addr>,
}

/// VRF a service instance lands in on this interface.
fn service_vrf(device: &Device, service: &Service, interface: &str) -> Result<Option<String>> {
    match service.kind {
        ServiceKind::L2 => Ok(None),
        ServiceKind::L3 => match service.vrf_type {
            Some(VrfType::Interface) => Ok(Some(format!("Vrf_{}", interface))),
            Some(VrfType::Shared) => {
                let ipvpn = service.ipvpn.as_deref().ok_or_else(|| {
                    Error::validation(format!(
                        "service {}: shared vrf_type requires an ipvpn",
                        service.name
                    ))
                })?;
                Ok(Some(device.spec().ipvpn(ipvpn)?.vrf_name()))
            }
            None => Err(Error::validation(format!(
                "service {}: L3 service requires vrf_type",
                service.name
            ))),
        },
        ServiceKind::Irb => match &service.ipvpn {
            Some(ipvpn) => Ok(Some(device.spec().ipvpn(ipvpn)?.vrf_name())),
            None => Ok(None),
        },
    }
}

/// Ensure the VRF exists with its VPN binding, emitting what is missing.
fn ensure_vrf(device: &Device, service: &Service, vrf: &str, set: &mut ChangeSet) -> Result<()> {
    let vpn = service
        .ipvpn
        .as_deref()
        .map(|name| device.spec().ipvpn(name))
        .transpose()?;
    let vpn_fields = vpn.map(ipvpn_fields).unwrap_or_default();

    match device.snapshot().get(Table::Vrf, vrf) {
        None => {
            set.add(Change::add(Table::Vrf, vrf, vpn_fields))?;
        }
        Some(current) => {
            if let (Some(existing), Some(vpn)) = (current.get("vni"), vpn) {
                if existing != &vpn.l3vni.to_string() {
                    return Err(Error::conflict(format!(
                        "{} is bound to vni {}, service {} wants {}",
                        vrf, existing, service.name, vpn.l3vni
                    )));
                }
            }
            let mut desired = current.clone();
            for (k, v) in vpn_fields {
                desired.insert(k, v);
            }
            if desired != *current {
                set.add(Change::modify(Table::Vrf, vrf, current.clone(), desired))?;
            }
        }
    }

    // The L3VNI rides on its own tunnel map.
    if let Some(vpn) = vpn {
        let map_key = format!(
            "{}|map_{}_{}",
            device.spec().settings.vtep_name,
            vpn.l3vni,
            vrf
        );
        if !device.snapshot().contains(Table::VxlanTunnelMap, &map_key) {
            set.add(Change::add(
                Table::VxlanTunnelMap,
                map_key,
                FieldValues::from([
                    ("vni".to_string(), vpn.l3vni.to_string()),
                    ("vrf".to_string(), vrf.to_string()),
                ]),
            ))?;
        }
    }
    Ok(())
}

/// The L2 half: VLAN, membership, L2VNI map, ARP suppression.
fn apply_l2(
    device: &Device,
    interface: &str,
    service: &Service,
    set: &mut ChangeSet,
    binding: &mut FieldValues,
) -> Result<()> {
    let vlan_id = service
        .vlan
        .ok_or_else(|| Error::validation(format!("service {}: no vlan", service.name)))?;
    let vlan = vlan_key(vlan_id);

    if !device.has_vlan(vlan_id) {
        set.add(Change::add(
            Table::Vlan,
            vlan.clone(),
            FieldValues::from([("vlanid".to_string(), vlan_id.to_string())]),
        ))?;
    }

    let member_key = format!("{}|{}", vlan, interface);
    if device.snapshot().contains(Table::VlanMember, &member_key) {
        return Err(Error::conflict(format!(
            "{} is already a member of {}",
            interface, vlan
        )));
    }
    set.add(Change::add(
        Table::VlanMember,
        member_key,
        FieldValues::from([("tagging_mode".to_string(), "untagged".to_string())]),
    ))?;

    if let Some(macvpn_name) = &service.macvpn {
        let vpn = device.spec().macvpn(macvpn_name)?;
        if vpn.vlan_id != vlan_id {
            return Err(Error::validation(format!(
                "service {}: macvpn {} binds vlan {} but the service uses vlan {}",
                service.name, vpn.name, vpn.vlan_id, vlan_id
            )));
        }
        let map_key = format!(
            "{}|map_{}_{}",
            device.spec().settings.vtep_name,
            vpn.vni,
            vlan
        );
        if !device.snapshot().contains(Table::VxlanTunnelMap, &map_key) {
            set.add(Change::add(
                Table::VxlanTunnelMap,
                map_key,
                FieldValues::from([
                    ("vni".to_string(), vpn.vni.to_string()),
                    ("vlan".to_string(), vlan.clone()),
                ]),
            ))?;
        }
        if vpn.arp_suppression {
            let current = device.snapshot().get(Table::Vlan, &vlan).cloned();
            match current {
                Some(fields)
                    if fields.get("arp_suppress").map(String::as_str) == Some("on") => {}
                Some(fields) => {
                    let mut desired = fields.clone();
                    desired.insert("arp_suppress".to_string(), "on".to_string());
                    set.add(Change::modify(Table::Vlan, vlan.clone(), fields, desired))?;
                }
                None => {
                    // VLAN is being created in this very set; fold the
                    // flag into the pending Add.
                    set.add(Change::modify(
                        Table::Vlan,
                        vlan.clone(),
                        FieldValues::new(),
                        FieldValues::from([("arp_suppress".to_string(), "on".to_string())]),
                    ))?;
                }
            }
        }
    }

    binding.insert("vlan".to_string(), vlan);
    Ok(())
}

/// The L3 half: VRF, interface rows, BGP neighbor, filters.
fn apply_l3(
    device: &Device,
    interface: &str,
    service: &Service,
    params: &ApplyServiceParams,
    set: &mut ChangeSet,
    binding: &mut FieldValues,
) -> Result<()> {
    let ip = params.ip.ok_or_else(|| {
        Error::validation(format!(
            "service {}: an interface address in CIDR form is required",
            service.name
        ))
    })?;
    let vrf = service_vrf(device, service, interface)?
        .expect("L3 services always resolve a VRF");

    if let Some(bound) = device.interface_vrf(interface) {
        return Err(Error::conflict(format!(
            "{} is already bound to {}",
            interface, bound
        )));
    }
    if !device.ip_bindings(interface).is_empty() {
        return Err(Error::conflict(format!(
            "{} already carries an IP assignment",
            interface
        )));
    }

    ensure_vrf(device, service, &vrf, set)?;

    let l3_table = l3_table_for(interface);
    set.add(Change::add(
        l3_table,
        interface,
        FieldValues::from([("vrf_name".to_string(), vrf.clone())]),
    ))?;
    set.add(Change::add(
        l3_table,
        format!("{}|{}", interface, ip),
        FieldValues::new(),
    ))?;
    binding.insert("vrf".to_string(), vrf.clone());
    binding.insert("ip".to_string(), ip.to_string());

    if let Some(peer_spec) = service.routing.peer_as {
        let asn = match peer_spec {
            netforge_spec::PeerAs::As(asn) => asn,
            netforge_spec::PeerAs::Request => params.peer_as.ok_or_else(|| {
                Error::validation(format!(
                    "service {} requests a peer AS; supply one",
                    service.name
                ))
            })?,
        };
        let neighbor = match params.neighbor {
            Some(neighbor) => neighbor,
            None => derive_neighbor(ip)?,
        };
        set.add(Change::add(
            Table::BgpNeighbor,
            format!("{}|{}", vrf, neighbor),
            FieldValues::from([
                ("asn".to_string(), asn.to_string()),
                ("local_addr".to_string(), ip.ip().to_string()),
                ("name".to_string(), service.name.clone()),
                ("admin_status".to_string(), "up".to_string()),
            ]),
        ))?;
        binding.insert("neighbor".to_string(), neighbor.to_string());
        binding.insert("peer_as".to_string(), asn.to_string());
    }

    for (filter_name, direction) in [
        (&service.ingress_filter, Direction::Ingress),
        (&service.egress_filter, Direction::Egress),
    ] {
        let Some(filter_name) = filter_name else {
            continue;
        };
        let table_name = acl_table_name(interface, direction);
        if device.snapshot().contains(Table::AclTable, &table_name) {
            return Err(Error::conflict(format!(
                "{} already has a filter attached",
                table_name
            )));
        }
        let filter = device.spec().filter(filter_name)?;
        for (table, key, fields) in compile(filter, interface, direction)? {
            set.add(Change::add(table, key, fields))?;
        }
        let field = match direction {
            Direction::Ingress => "ingress_filter",
            Direction::Egress => "egress_filter",
        };
        binding.insert(field.to_string(), filter_name.clone());
    }
    Ok(())
}

/// The IRB extras on top of the L2 half: SVI with anycast gateway and VRF
/// binding.
fn apply_irb_svi(
    device: &Device,
    service: &Service,
    set: &mut ChangeSet,
    binding: &mut FieldValues,
) -> Result<()> {
    let vlan_id = service.vlan.expect("IRB services always carry a vlan");
    let vlan = vlan_key(vlan_id);
    let macvpn = service
        .macvpn
        .as_deref()
        .map(|name| device.spec().macvpn(name))
        .transpose()?;

    if let Some(vrf) = service_vrf(device, service, &vlan)? {
        ensure_vrf(device, service, &vrf, set)?;
        let mut svi = device
            .snapshot()
            .get(Table::VlanInterface, &vlan)
            .cloned()
            .unwrap_or_default();
        let had_svi = device.snapshot().contains(Table::VlanInterface, &vlan);
        let before = svi.clone();
        svi.insert("vrf_name".to_string(), vrf.clone());
        if let Some(mac) = service
            .anycast_mac
            .clone()
            .or_else(|| macvpn.and_then(|m| m.anycast_mac.clone()))
        {
            svi.insert("anycast_mac".to_string(), mac);
        }
        if had_svi {
            if svi != before {
                set.add(Change::modify(Table::VlanInterface, vlan.clone(), before, svi))?;
            }
        } else {
            set.add(Change::add(Table::VlanInterface, vlan.clone(), svi))?;
        }
        binding.insert("vrf".to_string(), vrf);
    }

    let gateway = service
        .anycast_gateway
        .or_else(|| macvpn.and_then(|m| m.anycast_ip));
    if let Some(gateway) = gateway {
        let ip_key = format!("{}|{}", vlan, gateway);
        if !device.snapshot().contains(Table::VlanInterface, &ip_key) {
            set.add(Change::add(Table::VlanInterface, ip_key, FieldValues::new()))?;
        }
    }
    Ok(())
}

/// Attach a service to an interface.
pub fn apply_service(
    device: &Device,
    interface: &str,
    service_name: &str,
    params: &ApplyServiceParams,
) -> Result<ChangeSet> {
    require(
        Permission::ServiceApply,
        &PermissionContext::device(&device.name)
            .with_resource(interface)
            .with_service(service_name),
    )?;
    let service = device.spec().service(service_name)?;
    service.validate()?;
    if !device.has_interface(interface) {
        return Err(Error::not_found("interface", interface));
    }
    if let Some(existing) = device.service_binding(interface) {
        return Err(Error::conflict(format!(
            "{} already carries service {}",
            interface,
            existing.get("service").map(String::as_str).unwrap_or("?")
        )));
    }

    let mut set = ChangeSet::new(&device.name, "service apply");
    let mut binding = FieldValues::from([("service".to_string(), service_name.to_string())]);

    match service.kind {
        ServiceKind::L2 => {
            apply_l2(device, interface, service, &mut set, &mut binding)?;
        }
        ServiceKind::L3 => {
            apply_l3(device, interface, service, params, &mut set, &mut binding)?;
        }
        ServiceKind::Irb => {
            apply_l2(device, interface, service, &mut set, &mut binding)?;
            apply_irb_svi(device, service, &mut set, &mut binding)?;
        }
    }

    if let Some(policy) = &service.qos_policy {
        binding.insert("qos_policy".to_string(), policy.clone());
    }
    set.add(Change::add(Table::ServiceBinding, interface, binding))?;
    debug!(
        device = %device.name,
        interface,
        service = service_name,
        changes = set.len(),
        "service expansion complete"
    );
    Ok(set)
}

/// Detach whatever service an interface carries, working entirely from
/// the recorded binding and the snapshot.
///
/// ACL tables that would no longer be bound to any interface are deleted
/// along the way.
pub fn remove_service(device: &Device, interface: &str) -> Result<ChangeSet> {
    require(
        Permission::ServiceApply,
        &PermissionContext::device(&device.name).with_resource(interface),
    )?;
    let Some(binding) = device.service_binding(interface).cloned() else {
        return Err(Error::not_found("service binding", interface));
    };

    let mut set = ChangeSet::new(&device.name, "service remove");

    if let Some(vlan) = binding.get("vlan") {
        let member_key = format!("{}|{}", vlan, interface);
        if let Some(before) = device.snapshot().get(Table::VlanMember, &member_key) {
            set.add(Change::delete(Table::VlanMember, member_key, before.clone()))?;
        }
        // The VLAN itself goes once this was its last consumer.
        let other_members = device
            .snapshot()
            .keys_under(Table::VlanMember, vlan)
            .into_iter()
            .any(|key| split_key(&key).get(1) != Some(&interface));
        let has_svi = device.snapshot().contains(Table::VlanInterface, vlan)
            || !device.ip_bindings(vlan).is_empty();
        if !other_members && !has_svi {
            if let Some(before) = device.snapshot().get(Table::Vlan, vlan) {
                set.add(Change::delete(Table::Vlan, vlan.clone(), before.clone()))?;
            }
            delete_tunnel_maps(device, "vlan", vlan, &mut set)?;
        }
    }

    let l3_table = l3_table_for(interface);
    for cidr in device.ip_bindings(interface) {
        let ip_key = format!("{}|{}", interface, cidr);
        let before = device
            .snapshot()
            .get(l3_table, &ip_key)
            .cloned()
            .unwrap_or_default();
        set.add(Change::delete(l3_table, ip_key, before))?;
    }
    if let Some(before) = device.snapshot().get(l3_table, interface) {
        set.add(Change::delete(l3_table, interface, before.clone()))?;
    }

    if let Some(vrf) = binding.get("vrf") {
        if let Some(neighbor) = binding.get("neighbor") {
            let neighbor_key = format!("{}|{}", vrf, neighbor);
            if let Some(before) = device.snapshot().get(Table::BgpNeighbor, &neighbor_key) {
                set.add(Change::delete(
                    Table::BgpNeighbor,
                    neighbor_key,
                    before.clone(),
                ))?;
            }
        }

        // A VRF bound by no other interface is retired with its maps and
        // remaining neighbors.
        let still_bound = [
            Table::Interface,
            Table::VlanInterface,
            Table::LoopbackInterface,
        ]
        .iter()
        .any(|table| {
            device.snapshot().table(*table).any(|(key, fields)| {
                key != interface && fields.get("vrf_name") == Some(vrf)
            })
        });
        if !still_bound {
            if let Some(before) = device.snapshot().get(Table::Vrf, vrf) {
                set.add(Change::delete(Table::Vrf, vrf.clone(), before.clone()))?;
            }
            delete_tunnel_maps(device, "vrf", vrf, &mut set)?;
            for (key, fields) in device.snapshot().table(Table::BgpNeighbor) {
                if split_key(key).first() == Some(&vrf.as_str())
                    && set.get(Table::BgpNeighbor, key).is_none()
                {
                    set.add(Change::delete(Table::BgpNeighbor, key.clone(), fields.clone()))?;
                }
            }
        }
    }

    collect_acl_orphans(device, interface, &mut set)?;

    set.add(Change::delete(Table::ServiceBinding, interface, binding))?;
    Ok(set)
}

/// Delete every tunnel map whose `field` references `target`.
fn delete_tunnel_maps(
    device: &Device,
    field: &str,
    target: &str,
    set: &mut ChangeSet,
) -> Result<()> {
    for (key, fields) in device.snapshot().table(Table::VxlanTunnelMap) {
        if fields.get(field).map(String::as_str) == Some(target)
            && set.get(Table::VxlanTunnelMap, key).is_none()
        {
            set.add(Change::delete(
                Table::VxlanTunnelMap,
                key.clone(),
                fields.clone(),
            ))?;
        }
    }
    Ok(())
}

/// Remove one interface from every ACL table binding it; tables left with no
/// ports are deleted together with their rules.
fn collect_acl_orphans(device: &Device, interface: &str, set: &mut ChangeSet) -> Result<()> {
    let tables: Vec<(String, FieldValues)> = device
        .snapshot()
        .table(Table::AclTable)
        .map(|(key, fields)| (key.clone(), fields.clone()))
        .collect();

    for (table_name, fields) in tables {
        let ports: Vec<&str> = fields
            .get("ports")
            .map(|p| p.split(',').filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if !ports.contains(&interface) {
            continue;
        }
        let remaining: Vec<&str> = ports.into_iter().filter(|p| *p != interface).collect();
        if remaining.is_empty() {
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
            set.add(Change::delete(Table::AclTable, table_name, fields))?;
        } else {
            let mut desired = fields.clone();
            desired.insert("ports".to_string(), remaining.join(","));
            set.add(Change::modify(Table::AclTable, table_name, fields, desired))?;
        }
    }
    Ok(())
}

/// Reconcile an attached interface with the current service definition,
/// emitting the minimal ChangeSet that brings it up to date.
pub fn refresh_service(device: &Device, interface: &str) -> Result<ChangeSet> {
    require(
        Permission::ServiceApply,
        &PermissionContext::device(&device.name).with_resource(interface),
    )?;
    let Some(binding) = device.service_binding(interface).cloned() else {
        return Err(Error::not_found("service binding", interface));
    };
    let service_name = binding
        .get("service")
        .cloned()
        .ok_or_else(|| Error::Internal(format!("binding on {} lacks a service", interface)))?;

    let params = ApplyServiceParams {
        ip: binding.get("ip").and_then(|ip| ip.parse().ok()),
        peer_as: binding.get("peer_as").and_then(|asn| asn.parse().ok()),
        neighbor: binding.get("neighbor").and_then(|n| n.parse().ok()),
    };

    // Expand the definition against a clean twin of this device, then
    // diff the result with what the snapshot holds.
    let clean = Device::offline(device.network_handle(), &device.name)?;
    let desired = apply_service(&clean, interface, &service_name, &params)?;

    let mut set = ChangeSet::new(&device.name, "service refresh");
    for change in desired.iter() {
        if change.kind != ChangeKind::Add {
            continue;
        }
        let desired_fields = change.after.clone().unwrap_or_default();
        match device.snapshot().get(change.table, &change.key) {
            None => {
                set.add(Change::add(change.table, change.key.clone(), desired_fields))?;
            }
            Some(current) => {
                // Shared tables keep their extra fields; service-owned
                // entries are replaced outright.
                let target = if change.table == Table::Vlan {
                    let mut union = current.clone();
                    for (k, v) in desired_fields {
                        union.insert(k, v);
                    }
                    union
                } else {
                    desired_fields
                };
                if *current != target {
                    set.add(Change::modify(
                        change.table,
                        change.key.clone(),
                        current.clone(),
                        target,
                    ))?;
                }
            }
        }
    }

    // Rules the definition no longer produces are retired.
    for direction in [Direction::Ingress, Direction::Egress] {
        let table_name = acl_table_name(interface, direction);
        let rule_keys: Vec<String> = device
            .snapshot()
            .table(Table::AclRule)
            .filter(|(key, _)| split_key(key).first() == Some(&table_name.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        for rule_key in rule_keys {
            if desired.get(Table::AclRule, &rule_key).is_none() {
                let before = device
                    .snapshot()
                    .get(Table::AclRule, &rule_key)
                    .cloned()
                    .unwrap_or_default();
                set.add(Change::delete(Table::AclRule, rule_key, before))?;
            }
        }
        if device.snapshot().contains(Table::AclTable, &table_name)
            && desired.get(Table::AclTable, &table_name).is_none()
        {
            let before = device
                .snapshot()
                .get(Table::AclTable, &table_name)
                .cloned()
                .unwrap_or_default();
            set.add(Change::delete(Table::AclTable, table_name, before))?;
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::connected_device;

    #[tokio::test]
    async fn l2_service_with_macvpn_expands_fully() {
        let (device, _stub) =
            connected_device(&[(Table::Vlan, "Vlan100", &[("vlanid", "100")])]).await;
        let set = apply_service(
            &device,
            "Ethernet8",
            "servers",
            &ApplyServiceParams::default(),
        )
        .unwrap();

        let member = set.get(Table::VlanMember, "Vlan100|Ethernet8").unwrap();
        assert_eq!(
            member.after.as_ref().unwrap().get("tagging_mode").unwrap(),
            "untagged"
        );

        let map = set
            .get(Table::VxlanTunnelMap, "vtep|map_1100_Vlan100")
            .unwrap();
        assert_eq!(map.after.as_ref().unwrap().get("vni").unwrap(), "1100");
        assert_eq!(map.after.as_ref().unwrap().get("vlan").unwrap(), "Vlan100");

        let vlan = set.get(Table::Vlan, "Vlan100").unwrap();
        assert_eq!(vlan.kind, ChangeKind::Modify);
        assert_eq!(
            vlan.after.as_ref().unwrap().get("arp_suppress").unwrap(),
            "on"
        );

        let binding = set.get(Table::ServiceBinding, "Ethernet8").unwrap();
        assert_eq!(
            binding.after.as_ref().unwrap().get("service").unwrap(),
            "servers"
        );
    }

    #[tokio::test]
    async fn l2_service_creates_missing_vlan() {
        let (device, _stub) = connected_device(&[]).await;
        let set = apply_service(
            &device,
            "Ethernet8",
            "servers",
            &ApplyServiceParams::default(),
        )
        .unwrap();
        let vlan = set.get(Table::Vlan, "Vlan100").unwrap();
        assert_eq!(vlan.kind, ChangeKind::Add);
        let fields = vlan.after.as_ref().unwrap();
        assert_eq!(fields.get("vlanid").unwrap(), "100");
        assert_eq!(fields.get("arp_suppress").unwrap(), "on");
    }

    #[tokio::test]
    async fn l3_service_emits_vrf_interface_bgp_and_acl() {
        let (device, _stub) = connected_device(&[]).await;
        let params = ApplyServiceParams {
            ip: Some("10.1.1.1/30".parse().unwrap()),
            peer_as: Some(64512),
            neighbor: None,
        };
        let set = apply_service(&device, "Ethernet4", "customer-l3", &params).unwrap();

        let vrf = set.get(Table::Vrf, "Vrf_cust").unwrap();
        assert_eq!(vrf.after.as_ref().unwrap().get("vni").unwrap(), "10100");

        assert!(set
            .get(Table::VxlanTunnelMap, "vtep|map_10100_Vrf_cust")
            .is_some());

        let vrf_row = set.get(Table::Interface, "Ethernet4").unwrap();
        assert_eq!(
            vrf_row.after.as_ref().unwrap().get("vrf_name").unwrap(),
            "Vrf_cust"
        );
        assert!(set.get(Table::Interface, "Ethernet4|10.1.1.1/30").is_some());

        let neighbor = set.get(Table::BgpNeighbor, "Vrf_cust|10.1.1.2").unwrap();
        let fields = neighbor.after.as_ref().unwrap();
        assert_eq!(fields.get("asn").unwrap(), "64512");
        assert_eq!(fields.get("local_addr").unwrap(), "10.1.1.1");

        assert!(set.get(Table::AclTable, "Ethernet4-in").is_some());
        assert!(set.get(Table::AclRule, "Ethernet4-in|RULE_10").is_some());

        let binding = set.get(Table::ServiceBinding, "Ethernet4").unwrap();
        let fields = binding.after.as_ref().unwrap();
        assert_eq!(fields.get("vrf").unwrap(), "Vrf_cust");
        assert_eq!(fields.get("neighbor").unwrap(), "10.1.1.2");
        assert_eq!(fields.get("qos_policy").unwrap(), "gold");
    }

    #[tokio::test]
    async fn requested_peer_as_must_be_supplied() {
        let (device, _stub) = connected_device(&[]).await;
        let params = ApplyServiceParams {
            ip: Some("10.1.1.1/30".parse().unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            apply_service(&device, "Ethernet4", "customer-l3", &params),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn l3_service_requires_an_ip() {
        let (device, _stub) = connected_device(&[]).await;
        assert!(matches!(
            apply_service(
                &device,
                "Ethernet4",
                "customer-l3",
                &ApplyServiceParams::default()
            ),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn interface_vrf_type_derives_private_vrf() {
        let (device, _stub) = connected_device(&[]).await;
        let params = ApplyServiceParams {
            ip: Some("10.9.0.1/31".parse().unwrap()),
            ..Default::default()
        };
        let set = apply_service(&device, "Ethernet12", "private-l3", &params).unwrap();
        assert!(set.get(Table::Vrf, "Vrf_Ethernet12").is_some());
    }

    #[tokio::test]
    async fn bound_interface_conflicts() {
        let (device, _stub) = connected_device(&[(
            Table::ServiceBinding,
            "Ethernet8",
            &[("service", "servers")],
        )])
        .await;
        assert!(matches!(
            apply_service(
                &device,
                "Ethernet8",
                "servers",
                &ApplyServiceParams::default()
            ),
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn irb_service_adds_svi_with_gateway() {
        let (device, _stub) = connected_device(&[]).await;
        let set = apply_service(
            &device,
            "Ethernet16",
            "guests",
            &ApplyServiceParams::default(),
        )
        .unwrap();

        let svi = set.get(Table::VlanInterface, "Vlan200").unwrap();
        let fields = svi.after.as_ref().unwrap();
        assert_eq!(fields.get("vrf_name").unwrap(), "Vrf_cust");
        assert_eq!(fields.get("anycast_mac").unwrap(), "00:00:5e:00:01:01");
        assert!(set
            .get(Table::VlanInterface, "Vlan200|10.2.0.1/24")
            .is_some());
        assert!(set.get(Table::VlanMember, "Vlan200|Ethernet16").is_some());
        assert!(set
            .get(Table::VxlanTunnelMap, "vtep|map_1200_Vlan200")
            .is_some());
    }

    #[tokio::test]
    async fn remove_service_deletes_what_apply_created() {
        let (device, _stub) = connected_device(&[
            (Table::Vrf, "Vrf_cust", &[("vni", "10100")]),
            (Table::Interface, "Ethernet4", &[("vrf_name", "Vrf_cust")]),
            (Table::Interface, "Ethernet4|10.1.1.1/30", &[]),
            // A second customer keeps the shared VRF alive.
            (Table::Interface, "Ethernet8", &[("vrf_name", "Vrf_cust")]),
            (
                Table::BgpNeighbor,
                "Vrf_cust|10.1.1.2",
                &[("asn", "64512"), ("local_addr", "10.1.1.1")],
            ),
            (
                Table::AclTable,
                "Ethernet4-in",
                &[("type", "L3"), ("stage", "ingress"), ("ports", "Ethernet4")],
            ),
            (
                Table::AclRule,
                "Ethernet4-in|RULE_10",
                &[("PRIORITY", "9990"), ("PACKET_ACTION", "FORWARD")],
            ),
            (
                Table::ServiceBinding,
                "Ethernet4",
                &[
                    ("service", "customer-l3"),
                    ("vrf", "Vrf_cust"),
                    ("ip", "10.1.1.1/30"),
                    ("neighbor", "10.1.1.2"),
                ],
            ),
        ])
        .await;

        let set = remove_service(&device, "Ethernet4").unwrap();
        for (table, key) in [
            (Table::Interface, "Ethernet4|10.1.1.1/30"),
            (Table::Interface, "Ethernet4"),
            (Table::BgpNeighbor, "Vrf_cust|10.1.1.2"),
            (Table::AclTable, "Ethernet4-in"),
            (Table::AclRule, "Ethernet4-in|RULE_10"),
            (Table::ServiceBinding, "Ethernet4"),
        ] {
            let change = set.get(table, key).unwrap_or_else(|| panic!("missing {key}"));
            assert_eq!(change.kind, ChangeKind::Delete, "{key}");
        }
        // The VRF is still bound elsewhere and survives.
        assert!(set.get(Table::Vrf, "Vrf_cust").is_none());
    }

    #[tokio::test]
    async fn remove_service_retires_orphaned_vrf_and_vlan() {
        // L2: last member takes the VLAN and its map along.
        let (device, _stub) = connected_device(&[
            (Table::Vlan, "Vlan100", &[("vlanid", "100"), ("arp_suppress", "on")]),
            (
                Table::VlanMember,
                "Vlan100|Ethernet8",
                &[("tagging_mode", "untagged")],
            ),
            (
                Table::VxlanTunnelMap,
                "vtep|map_1100_Vlan100",
                &[("vni", "1100"), ("vlan", "Vlan100")],
            ),
            (
                Table::ServiceBinding,
                "Ethernet8",
                &[("service", "servers"), ("vlan", "Vlan100")],
            ),
        ])
        .await;
        let set = remove_service(&device, "Ethernet8").unwrap();
        assert_eq!(set.get(Table::Vlan, "Vlan100").unwrap().kind, ChangeKind::Delete);
        assert_eq!(
            set.get(Table::VxlanTunnelMap, "vtep|map_1100_Vlan100")
                .unwrap()
                .kind,
            ChangeKind::Delete
        );

        // L3: sole binding takes the VRF, its map, and its neighbors.
        let (device, _stub) = connected_device(&[
            (Table::Vrf, "Vrf_cust", &[("vni", "10100")]),
            (Table::Interface, "Ethernet4", &[("vrf_name", "Vrf_cust")]),
            (Table::Interface, "Ethernet4|10.1.1.1/30", &[]),
            (
                Table::VxlanTunnelMap,
                "vtep|map_10100_Vrf_cust",
                &[("vni", "10100"), ("vrf", "Vrf_cust")],
            ),
            (
                Table::BgpNeighbor,
                "Vrf_cust|10.1.1.2",
                &[("asn", "64512"), ("local_addr", "10.1.1.1")],
            ),
            (
                Table::ServiceBinding,
                "Ethernet4",
                &[
                    ("service", "customer-l3"),
                    ("vrf", "Vrf_cust"),
                    ("ip", "10.1.1.1/30"),
                    ("neighbor", "10.1.1.2"),
                ],
            ),
        ])
        .await;
        let set = remove_service(&device, "Ethernet4").unwrap();
        assert_eq!(set.get(Table::Vrf, "Vrf_cust").unwrap().kind, ChangeKind::Delete);
        assert_eq!(
            set.get(Table::VxlanTunnelMap, "vtep|map_10100_Vrf_cust")
                .unwrap()
                .kind,
            ChangeKind::Delete
        );
    }

    #[tokio::test]
    async fn remove_service_keeps_shared_acl_tables() {
        let (device, _stub) = connected_device(&[
            (
                Table::AclTable,
                "Ethernet4-in",
                &[
                    ("type", "L3"),
                    ("stage", "ingress"),
                    ("ports", "Ethernet4,Ethernet8"),
                ],
            ),
            (
                Table::ServiceBinding,
                "Ethernet4",
                &[("service", "customer-l3")],
            ),
        ])
        .await;
        let set = remove_service(&device, "Ethernet4").unwrap();
        let change = set.get(Table::AclTable, "Ethernet4-in").unwrap();
        assert_eq!(change.kind, ChangeKind::Modify);
        assert_eq!(
            change.after.as_ref().unwrap().get("ports").unwrap(),
            "Ethernet8"
        );
    }

    #[tokio::test]
    async fn remove_without_binding_is_not_found() {
        let (device, _stub) = connected_device(&[]).await;
        assert!(matches!(
            remove_service(&device, "Ethernet4"),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn refresh_on_in_sync_interface_is_empty() {
        // Build the attached state by applying on a clean device first.
        let (device, stub) = connected_device(&[]).await;
        let params = ApplyServiceParams {
            ip: Some("10.1.1.1/30".parse().unwrap()),
            peer_as: Some(64512),
            neighbor: None,
        };
        let set = apply_service(&device, "Ethernet4", "customer-l3", &params).unwrap();
        let mut device = device;
        device.apply_changeset(&set).await.unwrap();
        let _ = stub;

        let refresh = refresh_service(&device, "Ethernet4").unwrap();
        assert!(
            refresh.is_empty(),
            "expected empty refresh, got:\n{}",
            refresh.preview()
        );
    }

    #[tokio::test]
    async fn refresh_retires_stale_acl_rules() {
        let (device, _stub) = connected_device(&[
            (Table::Vrf, "Vrf_cust", &[("vni", "10100")]),
            (Table::Interface, "Ethernet4", &[("vrf_name", "Vrf_cust")]),
            (Table::Interface, "Ethernet4|10.1.1.1/30", &[]),
            (
                Table::AclTable,
                "Ethernet4-in",
                &[
                    ("type", "L3"),
                    ("stage", "ingress"),
                    ("ports", "Ethernet4"),
                    ("policy_desc", "edge-in"),
                ],
            ),
            // A rule the filter no longer contains.
            (
                Table::AclRule,
                "Ethernet4-in|RULE_99",
                &[("PRIORITY", "9901"), ("PACKET_ACTION", "DROP")],
            ),
            (
                Table::ServiceBinding,
                "Ethernet4",
                &[
                    ("service", "customer-l3"),
                    ("vrf", "Vrf_cust"),
                    ("ip", "10.1.1.1/30"),
                    ("neighbor", "10.1.1.2"),
                    ("peer_as", "64512"),
                ],
            ),
        ])
        .await;

        let set = refresh_service(&device, "Ethernet4").unwrap();
        let stale = set.get(Table::AclRule, "Ethernet4-in|RULE_99").unwrap();
        assert_eq!(stale.kind, ChangeKind::Delete);
        // The missing rules from the definition come back.
        assert!(set.get(Table::AclRule, "Ethernet4-in|RULE_10").is_some());
    }
}
