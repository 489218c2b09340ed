//! Topology provisioner
//!
//! Walks the spec and produces the complete intended ConfigDB for one
//! device, without touching the live switch. Service attachments run
//! through the same `apply_service` logic as the imperative path, so the
//! two can never drift apart.

use netforge_common::composite::{CompositeConfig, CompositeMode};
use netforge_common::configdb::{FieldValues, Table};
use netforge_common::feature::Feature;
use netforge_common::Result;
use netforge_ops::service::{apply_service, ApplyServiceParams};
use netforge_spec::Network;
use netforge_switch::Device;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// An entry dropped by the platform filter.
#[derive(Debug, Clone, Serialize)]
pub struct OmittedEntry {
    pub table: String,
    pub key: String,
    pub feature: Feature,
}

/// Companion report of a provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub device: String,
    pub entries: usize,
    pub content_hash: String,
    pub omitted: Vec<OmittedEntry>,
}

fn str_fields(pairs: &[(&str, String)]) -> FieldValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Produce the complete intended configuration for `device_name`.
pub fn generate_device_composite(
    network: &Arc<Network>,
    device_name: &str,
) -> Result<(CompositeConfig, ProvisionReport)> {
    let device_spec = network.device(device_name)?;
    let platform = network.platform(&device_spec.platform)?;
    let settings = &network.spec.settings;
    let mut composite = CompositeConfig::new(CompositeMode::Overwrite);

    // Device identity.
    composite.set(
        Table::DeviceMetadata,
        "localhost",
        str_fields(&[
            ("hostname", device_spec.name.clone()),
            ("bgp_asn", device_spec.asn.to_string()),
            ("router_id", device_spec.router_id().to_string()),
            ("platform", platform.name.clone()),
            ("hwsku", platform.hwsku.clone()),
        ]),
    )?;

    // Physical ports at their default speed; links and services bring
    // theirs up below.
    for port in platform.port_names() {
        composite.set(
            Table::Port,
            port,
            str_fields(&[
                ("speed", platform.default_speed.to_string()),
                ("admin_status", "down".to_string()),
            ]),
        )?;
    }

    // Underlay links.
    for link in network.topology.links_of(device_name) {
        let endpoint = link
            .endpoint_of(device_name)
            .expect("links_of only returns incident links");
        let addr = link.addr_of(device_name)?;
        composite.set(
            Table::Port,
            endpoint.interface.clone(),
            str_fields(&[
                ("speed", platform.default_speed.to_string()),
                ("admin_status", "up".to_string()),
            ]),
        )?;
        composite.set(Table::Interface, endpoint.interface.clone(), FieldValues::new())?;
        composite.set(
            Table::Interface,
            format!("{}|{}/{}", endpoint.interface, addr, link.subnet.prefix()),
            FieldValues::new(),
        )?;

        let peer = link
            .peer_of(device_name)
            .expect("links_of only returns incident links");
        if let Ok(peer_spec) = network.device(&peer.device) {
            // Direct neighbor: sourced from the link address.
            composite.set(
                Table::BgpNeighbor,
                link.addr_of(&peer.device)?.to_string(),
                str_fields(&[
                    ("asn", peer_spec.asn.to_string()),
                    ("local_addr", addr.to_string()),
                    ("name", peer_spec.name.clone()),
                    ("admin_status", "up".to_string()),
                ]),
            )?;
        }
    }

    // Loopback and the VTEP sourced from it.
    composite.set(Table::LoopbackInterface, "Loopback0", FieldValues::new())?;
    composite.set(
        Table::LoopbackInterface,
        format!("Loopback0|{}/32", device_spec.loopback),
        FieldValues::new(),
    )?;
    composite.set(
        Table::VxlanTunnel,
        settings.vtep_name.clone(),
        str_fields(&[("src_ip", device_spec.loopback.to_string())]),
    )?;
    composite.set(
        Table::VxlanEvpnNvo,
        settings.nvo_name.clone(),
        str_fields(&[("source_vtep", settings.vtep_name.clone())]),
    )?;

    // Indirect EVPN neighbors: loopback-sourced sessions to the overlay
    // peers the topology enumerates.
    for peer_loopback in network.topology.evpn_peers(device_name, settings)? {
        let peer_asn = network
            .topology
            .devices
            .values()
            .find(|d| d.loopback == peer_loopback)
            .map(|d| d.asn)
            .unwrap_or(device_spec.asn);
        composite.set(
            Table::BgpNeighbor,
            peer_loopback.to_string(),
            str_fields(&[
                ("asn", peer_asn.to_string()),
                ("local_addr", device_spec.loopback.to_string()),
                ("name", "evpn-overlay".to_string()),
                ("admin_status", "up".to_string()),
            ]),
        )?;
    }

    // Service attachments, through the very same expansion the imperative
    // path uses, against an offline twin seeded with what we have so far.
    let mut offline = Device::offline(Arc::clone(network), device_name)?;
    for (interface, attachment) in &device_spec.services {
        offline.load_snapshot(composite.as_snapshot());
        let params = ApplyServiceParams {
            ip: attachment.ip,
            peer_as: attachment.peer_as,
            neighbor: attachment.neighbor,
        };
        let set = apply_service(&offline, interface, &attachment.service, &params)?;
        composite.absorb(&set)?;
        composite.set(
            Table::Port,
            interface.clone(),
            str_fields(&[
                ("speed", platform.default_speed.to_string()),
                ("admin_status", "up".to_string()),
            ]),
        )?;
    }

    // QoS policies referenced by attached services.
    emit_qos(network, device_name, &mut composite)?;

    // Platform filter: drop whatever the hardware cannot do. Entries
    // whose requirement comes from a single field (a VRF's vni, a VLAN's
    // arp_suppress, an SVI's anycast_mac) keep the entry and lose the
    // field, so base switching survives on reduced platforms.
    let disabled = platform.disabled_features();
    let mut omitted = Vec::new();
    if !disabled.is_empty() {
        let doomed: Vec<(Table, String, Feature)> = composite
            .iter_entries()
            .filter_map(|(table, key, fields)| {
                table
                    .required_feature(fields)
                    .filter(|feature| disabled.contains(feature))
                    .map(|feature| (table, key.clone(), feature))
            })
            .collect();
        for (table, key, feature) in doomed {
            let stripped_fields: Option<&[&str]> = match table {
                Table::Vrf => Some(&["vni", "import_rt", "export_rt"]),
                Table::Vlan => Some(&["arp_suppress"]),
                Table::VlanInterface => Some(&["anycast_mac"]),
                _ => None,
            };
            match stripped_fields {
                Some(names) => {
                    debug!(%table, key, %feature, "platform filter stripped fields");
                    if let Some(mut fields) = composite.remove(table, &key) {
                        for name in names {
                            fields.remove(*name);
                        }
                        composite.set(table, key.clone(), fields)?;
                    }
                }
                None => {
                    debug!(%table, key, %feature, "platform filter dropped entry");
                    composite.remove(table, &key);
                }
            }
            omitted.push(OmittedEntry {
                table: table.as_str().to_string(),
                key,
                feature,
            });
        }
    }

    let report = ProvisionReport {
        device: device_name.to_string(),
        entries: composite.entry_count(),
        content_hash: composite.content_hash(),
        omitted,
    };
    info!(
        device = device_name,
        entries = report.entries,
        omitted = report.omitted.len(),
        "composite generated"
    );
    Ok((composite, report))
}

/// QUEUE / SCHEDULER / WRED_PROFILE / DSCP_TO_TC_MAP entries for every
/// policy referenced by a service attached on this device.
fn emit_qos(
    network: &Arc<Network>,
    device_name: &str,
    composite: &mut CompositeConfig,
) -> Result<()> {
    let device_spec = network.device(device_name)?;
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for (interface, attachment) in &device_spec.services {
        let service = network.spec.service(&attachment.service)?;
        let Some(policy_name) = &service.qos_policy else {
            continue;
        };
        let policy = network.spec.qos_policy(policy_name)?;

        if seen.insert(policy_name) {
            let mut dscp_map = FieldValues::new();
            for queue in &policy.queues {
                let profile = format!("{}-{}", policy.name, queue.queue_id);
                let mut scheduler = FieldValues::from([(
                    "type".to_string(),
                    match queue.kind {
                        netforge_spec::QueueKind::Dwrr => "DWRR".to_string(),
                        netforge_spec::QueueKind::Strict => "STRICT".to_string(),
                    },
                )]);
                if let Some(weight) = queue.weight {
                    scheduler.insert("weight".to_string(), weight.to_string());
                }
                composite.set(Table::Scheduler, profile.clone(), scheduler)?;

                if queue.ecn {
                    composite.set(
                        Table::WredProfile,
                        profile,
                        FieldValues::from([("ecn".to_string(), "ecn_all".to_string())]),
                    )?;
                }
                for &dscp in &queue.dscp {
                    dscp_map.insert(dscp.to_string(), queue.queue_id.to_string());
                }
            }
            composite.set(Table::DscpToTcMap, policy.name.clone(), dscp_map)?;
        }

        for queue in &policy.queues {
            let profile = format!("{}-{}", policy.name, queue.queue_id);
            let mut fields =
                FieldValues::from([("scheduler".to_string(), profile.clone())]);
            if queue.ecn {
                fields.insert("wred_profile".to_string(), profile);
            }
            composite.set(
                Table::Queue,
                format!("{}|{}", interface, queue.queue_id),
                fields,
            )?;
        }
    }
    Ok(())
}

/// Classification of a BGP neighbor entry: a non-empty `local_addr` that
/// differs from the device loopback marks a direct (underlay) session,
/// anything else an indirect (overlay) one.
pub fn is_direct_neighbor(fields: &FieldValues, loopback: &str) -> bool {
    fields
        .get("local_addr")
        .is_some_and(|addr| !addr.is_empty() && addr != loopback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netforge_spec::{Network, NetworkSpec, Platform, Topology};
    use std::collections::BTreeMap;

    fn network(unsupported: &str) -> Arc<Network> {
        let mut spec: NetworkSpec = serde_json::from_str(
            r#"{
                "ipvpns": {"cust": {"l3vni": 10100, "import_rt": ["65000:100"], "export_rt": ["65000:100"]}},
                "macvpns": {"servers-vlan100": {"vni": 1100, "vlan_id": 100, "arp_suppression": true}},
                "qos_policies": {
                    "gold": {"queues": [
                        {"queue_id": 0, "type": "dwrr", "weight": 10, "dscp": [0, 8]},
                        {"queue_id": 5, "type": "strict", "dscp": [46], "ecn": true}
                    ]}
                },
                "services": {
                    "servers": {"type": "l2", "vlan": 100, "macvpn": "servers-vlan100", "qos_policy": "gold"},
                    "customer-l3": {"type": "l3", "vrf_type": "shared", "ipvpn": "cust"}
                }
            }"#,
        )
        .unwrap();
        spec.finish_load().unwrap();

        let mut topology: Topology = serde_json::from_str(
            r#"{
                "devices": {
                    "leaf1": {
                        "mgmt_ip": "192.0.2.11", "loopback": "10.255.0.1",
                        "platform": "base-8", "asn": 65001,
                        "services": {
                            "Ethernet8": {"service": "servers"},
                            "Ethernet12": {"service": "customer-l3", "ip": "10.1.1.1/30"}
                        }
                    },
                    "leaf2": {"mgmt_ip": "192.0.2.12", "loopback": "10.255.0.2", "platform": "base-8", "asn": 65002}
                },
                "links": [
                    {
                        "a": {"device": "leaf1", "interface": "Ethernet0"},
                        "b": {"device": "leaf2", "interface": "Ethernet0"},
                        "subnet": "10.0.0.0/31"
                    }
                ]
            }"#,
        )
        .unwrap();
        topology.finish_load();

        let unsupported: Vec<netforge_common::Feature> =
            serde_json::from_str(unsupported).unwrap();
        let mut platforms = BTreeMap::new();
        platforms.insert(
            "base-8".to_string(),
            Platform {
                name: "base-8".to_string(),
                hwsku: "Base-8x100G".to_string(),
                port_count: 8,
                default_speed: 100_000,
                unsupported,
            },
        );
        Arc::new(Network {
            spec,
            topology,
            platforms,
            configlets: BTreeMap::new(),
        })
    }

    #[test]
    fn composite_covers_underlay_overlay_and_services() {
        let network = network("[]");
        let (composite, report) = generate_device_composite(&network, "leaf1").unwrap();

        // Underlay link.
        assert!(composite.get(Table::Interface, "Ethernet0|10.0.0.0/31").is_some());
        let direct = composite.get(Table::BgpNeighbor, "10.0.0.1").unwrap();
        assert_eq!(direct.get("asn").unwrap(), "65002");
        assert!(is_direct_neighbor(direct, "10.255.0.1"));

        // Loopback + VTEP.
        assert!(composite
            .get(Table::LoopbackInterface, "Loopback0|10.255.0.1/32")
            .is_some());
        assert_eq!(
            composite.get(Table::VxlanTunnel, "vtep").unwrap().get("src_ip").unwrap(),
            "10.255.0.1"
        );

        // Overlay peer.
        let indirect = composite.get(Table::BgpNeighbor, "10.255.0.2").unwrap();
        assert!(!is_direct_neighbor(indirect, "10.255.0.1"));

        // L2 service expansion.
        assert!(composite.get(Table::Vlan, "Vlan100").is_some());
        assert!(composite.get(Table::VlanMember, "Vlan100|Ethernet8").is_some());
        assert!(composite
            .get(Table::VxlanTunnelMap, "vtep|map_1100_Vlan100")
            .is_some());

        // L3 service expansion.
        assert_eq!(
            composite.get(Table::Vrf, "Vrf_cust").unwrap().get("vni").unwrap(),
            "10100"
        );

        // QoS.
        assert!(composite.get(Table::Scheduler, "gold-0").is_some());
        assert!(composite.get(Table::WredProfile, "gold-5").is_some());
        assert!(composite.get(Table::Queue, "Ethernet8|5").is_some());
        let dscp = composite.get(Table::DscpToTcMap, "gold").unwrap();
        assert_eq!(dscp.get("46").unwrap(), "5");

        assert!(report.omitted.is_empty());
    }

    #[test]
    fn two_runs_hash_identically() {
        let network = network("[]");
        let (a, _) = generate_device_composite(&network, "leaf1").unwrap();
        let (b, _) = generate_device_composite(&network, "leaf1").unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn platform_filter_drops_disabled_features_transitively() {
        let network = network(r#"["vxlan"]"#);
        let (composite, report) = generate_device_composite(&network, "leaf1").unwrap();

        assert!(composite.get(Table::VxlanTunnel, "vtep").is_none());
        assert!(composite.get(Table::VxlanEvpnNvo, "nvo").is_none());
        assert!(composite
            .get(Table::VxlanTunnelMap, "vtep|map_1100_Vlan100")
            .is_none());
        // The VRF survives but loses its EVPN fields.
        let vrf = composite.get(Table::Vrf, "Vrf_cust").unwrap();
        assert!(!vrf.contains_key("vni"));
        // Plain switching is untouched, minus the suppression flag.
        let vlan = composite.get(Table::Vlan, "Vlan100").unwrap();
        assert!(!vlan.contains_key("arp_suppress"));
        assert!(!report.omitted.is_empty());
        assert!(report
            .omitted
            .iter()
            .any(|o| o.table == "VXLAN_TUNNEL" && o.key == "vtep"));
    }
}
