//! Topology model
//!
//! Devices and the point-to-point links between them. Each link owns its
//! `/30` or `/31` subnet; endpoint addresses are derived from it, side A
//! taking the first usable host and side B the second.

use crate::types::Settings;
use ipnetwork::Ipv4Network;
use netforge_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

/// A service attached to one interface of a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAttachment {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_as: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbor: Option<Ipv4Addr>,
}

/// One switch in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    #[serde(default)]
    pub name: String,
    pub mgmt_ip: IpAddr,
    pub loopback: Ipv4Addr,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub asn: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_id: Option<Ipv4Addr>,
    /// Interface name -> attached service.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceAttachment>,
}

impl DeviceSpec {
    pub fn router_id(&self) -> Ipv4Addr {
        self.router_id.unwrap_or(self.loopback)
    }
}

/// One end of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub device: String,
    pub interface: String,
}

/// A point-to-point link with its addressing subnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub a: Endpoint,
    pub b: Endpoint,
    pub subnet: Ipv4Network,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Link {
    /// The two usable host addresses of the subnet, in (a, b) order.
    pub fn host_pair(&self) -> Result<(Ipv4Addr, Ipv4Addr)> {
        match self.subnet.prefix() {
            31 => {
                let base = u32::from(self.subnet.network());
                Ok((Ipv4Addr::from(base), Ipv4Addr::from(base + 1)))
            }
            30 => {
                let base = u32::from(self.subnet.network());
                Ok((Ipv4Addr::from(base + 1), Ipv4Addr::from(base + 2)))
            }
            p => Err(Error::validation(format!(
                "link {}:{} - {}:{}: subnet {} has /{} prefix, expected /30 or /31",
                self.a.device, self.a.interface, self.b.device, self.b.interface, self.subnet, p
            ))),
        }
    }

    /// Endpoint belonging to `device`, if the link touches it.
    pub fn endpoint_of(&self, device: &str) -> Option<&Endpoint> {
        if self.a.device == device {
            Some(&self.a)
        } else if self.b.device == device {
            Some(&self.b)
        } else {
            None
        }
    }

    /// The far endpoint relative to `device`.
    pub fn peer_of(&self, device: &str) -> Option<&Endpoint> {
        if self.a.device == device {
            Some(&self.b)
        } else if self.b.device == device {
            Some(&self.a)
        } else {
            None
        }
    }

    /// Address of `device`'s end of the link.
    pub fn addr_of(&self, device: &str) -> Result<Ipv4Addr> {
        let (a, b) = self.host_pair()?;
        if self.a.device == device {
            Ok(a)
        } else if self.b.device == device {
            Ok(b)
        } else {
            Err(Error::not_found("link endpoint", device))
        }
    }
}

/// Devices and links of the fabric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceSpec>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Topology {
    pub fn device(&self, name: &str) -> Result<&DeviceSpec> {
        self.devices
            .get(name)
            .ok_or_else(|| Error::not_found("device", name))
    }

    /// Links incident to a device.
    pub fn links_of(&self, device: &str) -> Vec<&Link> {
        self.links
            .iter()
            .filter(|link| link.endpoint_of(device).is_some())
            .collect()
    }

    /// EVPN session peers for a device: the loopbacks of the configured
    /// route-reflectors, or of every other device when no reflectors are
    /// set (full mesh). A reflector itself peers with everyone.
    pub fn evpn_peers(&self, device: &str, settings: &Settings) -> Result<Vec<Ipv4Addr>> {
        self.device(device)?;
        let peers: Vec<&DeviceSpec> = if settings.route_reflectors.is_empty()
            || settings.route_reflectors.iter().any(|rr| rr == device)
        {
            self.devices.values().filter(|d| d.name != device).collect()
        } else {
            settings
                .route_reflectors
                .iter()
                .map(|rr| self.device(rr))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(peers.into_iter().map(|d| d.loopback).collect())
    }

    /// Fix up the redundant name fields after deserialization.
    pub fn finish_load(&mut self) {
        for (name, device) in &mut self.devices {
            device.name = name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_device_topology() -> Topology {
        let mut topology: Topology = serde_json::from_str(
            r#"{
                "devices": {
                    "leaf1": {"mgmt_ip": "192.0.2.11", "loopback": "10.255.0.1", "platform": "base-32", "asn": 65001},
                    "leaf2": {"mgmt_ip": "192.0.2.12", "loopback": "10.255.0.2", "platform": "base-32", "asn": 65002}
                },
                "links": [
                    {
                        "a": {"device": "leaf1", "interface": "Ethernet48"},
                        "b": {"device": "leaf2", "interface": "Ethernet48"},
                        "subnet": "10.0.0.0/31"
                    }
                ]
            }"#,
        )
        .unwrap();
        topology.finish_load();
        topology
    }

    #[test]
    fn slash31_host_pair() {
        let topology = two_device_topology();
        let link = &topology.links[0];
        assert_eq!(link.addr_of("leaf1").unwrap(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(link.addr_of("leaf2").unwrap(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn slash30_skips_network_address() {
        let link = Link {
            a: Endpoint {
                device: "leaf1".into(),
                interface: "Ethernet0".into(),
            },
            b: Endpoint {
                device: "leaf2".into(),
                interface: "Ethernet0".into(),
            },
            subnet: "10.1.1.0/30".parse().unwrap(),
            metadata: BTreeMap::new(),
        };
        assert_eq!(
            link.host_pair().unwrap(),
            (Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2))
        );
    }

    #[test]
    fn wide_subnet_is_rejected() {
        let link = Link {
            a: Endpoint {
                device: "leaf1".into(),
                interface: "Ethernet0".into(),
            },
            b: Endpoint {
                device: "leaf2".into(),
                interface: "Ethernet0".into(),
            },
            subnet: "10.1.1.0/29".parse().unwrap(),
            metadata: BTreeMap::new(),
        };
        assert!(link.host_pair().is_err());
    }

    #[test]
    fn full_mesh_evpn_peers() {
        let topology = two_device_topology();
        let peers = topology.evpn_peers("leaf1", &Settings::default()).unwrap();
        assert_eq!(peers, vec![Ipv4Addr::new(10, 255, 0, 2)]);
    }

    #[test]
    fn route_reflector_peers() {
        let topology = two_device_topology();
        let settings = Settings {
            route_reflectors: vec!["leaf2".into()],
            ..Default::default()
        };
        let peers = topology.evpn_peers("leaf1", &settings).unwrap();
        assert_eq!(peers, vec![Ipv4Addr::new(10, 255, 0, 2)]);
        // The reflector itself meshes with everyone.
        let rr_peers = topology.evpn_peers("leaf2", &settings).unwrap();
        assert_eq!(rr_peers, vec![Ipv4Addr::new(10, 255, 0, 1)]);
    }
}
