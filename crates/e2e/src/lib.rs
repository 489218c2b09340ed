//! Shared fixtures for the end-to-end scenarios
//!
//! A small two-leaf EVPN fabric with representative services, plus
//! helpers for connecting devices to stub switches.

use netforge_common::configdb::{FieldValues, Table};
use netforge_spec::{Network, NetworkSpec, Platform, Topology};
use netforge_switch::{Device, StubSwitch};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn fields(pairs: &[(&str, &str)]) -> FieldValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Two leaves joined by one /31 link, with L2, L3, and IRB services and
/// a service attachment on leaf1 for provisioning scenarios.
pub fn fixture_network() -> Network {
    let mut spec: NetworkSpec = serde_json::from_str(
        r#"{
            "ipvpns": {
                "cust": {"l3vni": 10100, "import_rt": ["65000:100"], "export_rt": ["65000:100"]}
            },
            "macvpns": {
                "servers-vlan100": {"vni": 1100, "vlan_id": 100, "arp_suppression": true}
            },
            "filters": {
                "edge-in": {
                    "type": "L3",
                    "rules": [
                        {"sequence": 10, "action": "permit", "src_ip": "10.0.0.0/8"},
                        {"sequence": 20, "action": "deny"}
                    ]
                }
            },
            "qos_policies": {
                "gold": {
                    "queues": [
                        {"queue_id": 0, "type": "dwrr", "weight": 10, "dscp": [0]},
                        {"queue_id": 5, "type": "strict", "dscp": [46], "ecn": true}
                    ]
                }
            },
            "services": {
                "servers": {"type": "l2", "vlan": 100, "macvpn": "servers-vlan100"},
                "customer-l3": {
                    "type": "l3", "vrf_type": "shared", "ipvpn": "cust",
                    "routing": {"peer_as": "request"},
                    "ingress_filter": "edge-in"
                }
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
                        "Ethernet8": {"service": "servers"}
                    }
                },
                "leaf2": {
                    "mgmt_ip": "192.0.2.12", "loopback": "10.255.0.2",
                    "platform": "base-8", "asn": 65002
                }
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

    let mut platforms = BTreeMap::new();
    platforms.insert(
        "base-8".to_string(),
        Platform {
            name: "base-8".to_string(),
            hwsku: "Base-8x100G".to_string(),
            port_count: 8,
            default_speed: 100_000,
            unsupported: vec![],
        },
    );

    Network {
        spec,
        topology,
        platforms,
        configlets: BTreeMap::new(),
    }
}

/// Connect `device` to a fresh stub seeded with the given entries.
pub async fn connected(
    device: &str,
    entries: &[(Table, &str, &[(&str, &str)])],
) -> (Device, Arc<StubSwitch>) {
    connected_on(Arc::new(fixture_network()), device, entries).await
}

/// Same, but sharing a caller-provided network.
pub async fn connected_on(
    network: Arc<Network>,
    device: &str,
    entries: &[(Table, &str, &[(&str, &str)])],
) -> (Device, Arc<StubSwitch>) {
    let mut stub = StubSwitch::new();
    for (table, key, pairs) in entries {
        stub = stub.with_entry(*table, key, fields(pairs));
    }
    let stub = Arc::new(stub);
    let device = Device::connect(network, device, stub.clone())
        .await
        .unwrap();
    (device, stub)
}
