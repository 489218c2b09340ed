//! Core types of the network document
//!
//! Services, filters, QoS policies, and VPN definitions as they appear in
//! `network.json`. Everything is name-keyed; devices reference these by
//! name, never by pointer.

use ipnetwork::Ipv4Network;
use netforge_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Service type: pure bridging, pure routing, or both (IRB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    L2,
    L3,
    Irb,
}

/// How a L3 service derives its VRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VrfType {
    /// One private VRF per interface the service lands on.
    Interface,
    /// One VRF shared by every interface of the service's IP-VPN.
    Shared,
}

/// A peer AS is either a literal number or "request", meaning the caller
/// must supply one at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAs {
    As(u32),
    Request,
}

impl Serialize for PeerAs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PeerAs::As(asn) => serializer.serialize_u32(*asn),
            PeerAs::Request => serializer.serialize_str("request"),
        }
    }
}

impl<'de> Deserialize<'de> for PeerAs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = PeerAs;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an AS number or the string \"request\"")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<PeerAs, E> {
                u32::try_from(v)
                    .map(PeerAs::As)
                    .map_err(|_| E::custom(format!("AS number {} out of range", v)))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<PeerAs, E> {
                u32::try_from(v)
                    .map(PeerAs::As)
                    .map_err(|_| E::custom(format!("AS number {} out of range", v)))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<PeerAs, E> {
                if v == "request" {
                    Ok(PeerAs::Request)
                } else {
                    Err(E::custom(format!("expected \"request\", got {:?}", v)))
                }
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Routing knobs of a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRouting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_as: Option<PeerAs>,
}

/// A service a customer interface can be attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipvpn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macvpn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf_type: Option<VrfType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_filter: Option<String>,
    #[serde(default)]
    pub routing: ServiceRouting,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anycast_gateway: Option<Ipv4Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anycast_mac: Option<String>,
}

impl Service {
    /// Structural checks beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ServiceKind::L2 => {
                if self.vlan.is_none() {
                    return Err(Error::validation(format!(
                        "service {}: L2 service requires a vlan",
                        self.name
                    )));
                }
            }
            ServiceKind::L3 => {
                if self.vrf_type.is_none() {
                    return Err(Error::validation(format!(
                        "service {}: L3 service requires vrf_type",
                        self.name
                    )));
                }
            }
            ServiceKind::Irb => {
                if self.vlan.is_none() || self.macvpn.is_none() {
                    return Err(Error::validation(format!(
                        "service {}: IRB service requires vlan and macvpn",
                        self.name
                    )));
                }
            }
        }
        if let Some(vlan) = self.vlan {
            check_vlan_id(vlan)?;
        }
        Ok(())
    }
}

pub fn check_vlan_id(id: u16) -> Result<()> {
    if !(1..=4094).contains(&id) {
        return Err(Error::validation(format!("vlan id {} out of [1, 4094]", id)));
    }
    Ok(())
}

/// L3 VPN: a VRF-backed routing instance carried over the L3VNI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpVpn {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub l3vni: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
    #[serde(default)]
    pub import_rt: Vec<String>,
    #[serde(default)]
    pub export_rt: Vec<String>,
}

impl IpVpn {
    /// VRF name for this VPN: the explicit override or `Vrf_<name>`.
    pub fn vrf_name(&self) -> String {
        self.vrf
            .clone()
            .unwrap_or_else(|| format!("Vrf_{}", self.name))
    }
}

/// L2 VPN: a VLAN extended over the L2VNI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacVpn {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub vni: u32,
    pub vlan_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anycast_ip: Option<Ipv4Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anycast_mac: Option<String>,
    #[serde(default)]
    pub arp_suppression: bool,
    #[serde(default)]
    pub route_targets: Vec<String>,
}

/// Filter address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    L3,
    L3V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Permit,
    Deny,
}

/// One rule of a filter, evaluated in ascending sequence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    pub sequence: u32,
    pub action: FilterAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dscp: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_prefix_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_prefix_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policer: Option<String>,
}

/// A named packet filter compiled into an ACL on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub rules: Vec<FilterRule>,
}

impl Filter {
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if !(1..=9999).contains(&rule.sequence) {
                return Err(Error::validation(format!(
                    "filter {}: sequence {} out of [1, 9999]",
                    self.name, rule.sequence
                )));
            }
            if !seen.insert(rule.sequence) {
                return Err(Error::validation(format!(
                    "filter {}: duplicate sequence {}",
                    self.name, rule.sequence
                )));
            }
            if let Some(dscp) = rule.dscp {
                if dscp > 63 {
                    return Err(Error::validation(format!(
                        "filter {}: dscp {} out of [0, 63]",
                        self.name, dscp
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Queue scheduling discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Dwrr,
    Strict,
}

/// One of the eight egress queues of a QoS policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QosQueue {
    pub queue_id: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: QueueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u8>,
    #[serde(default)]
    pub dscp: Vec<u8>,
    #[serde(default)]
    pub ecn: bool,
}

/// A named QoS policy: queue definitions plus the DSCP classification map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QosPolicy {
    #[serde(default)]
    pub name: String,
    pub queues: Vec<QosQueue>,
}

impl QosPolicy {
    pub fn validate(&self) -> Result<()> {
        let mut seen_queues = BTreeSet::new();
        let mut seen_dscp = BTreeSet::new();
        for queue in &self.queues {
            if queue.queue_id > 7 {
                return Err(Error::validation(format!(
                    "qos policy {}: queue id {} out of [0, 7]",
                    self.name, queue.queue_id
                )));
            }
            if !seen_queues.insert(queue.queue_id) {
                return Err(Error::validation(format!(
                    "qos policy {}: duplicate queue id {}",
                    self.name, queue.queue_id
                )));
            }
            if queue.kind == QueueKind::Dwrr && queue.weight.is_none() {
                return Err(Error::validation(format!(
                    "qos policy {}: dwrr queue {} requires a weight",
                    self.name, queue.queue_id
                )));
            }
            for &dscp in &queue.dscp {
                if dscp > 63 {
                    return Err(Error::validation(format!(
                        "qos policy {}: dscp {} out of [0, 63]",
                        self.name, dscp
                    )));
                }
                if !seen_dscp.insert(dscp) {
                    return Err(Error::validation(format!(
                        "qos policy {}: dscp {} mapped twice",
                        self.name, dscp
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Network-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_vtep_name")]
    pub vtep_name: String,
    #[serde(default = "default_nvo_name")]
    pub nvo_name: String,
    /// Devices acting as EVPN route-reflectors; empty means full mesh.
    #[serde(default)]
    pub route_reflectors: Vec<String>,
    #[serde(default = "default_mtu")]
    pub default_mtu: u32,
}

fn default_vtep_name() -> String {
    "vtep".to_string()
}

fn default_nvo_name() -> String {
    "nvo".to_string()
}

fn default_mtu() -> u32 {
    9100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vtep_name: default_vtep_name(),
            nvo_name: default_nvo_name(),
            route_reflectors: Vec::new(),
            default_mtu: default_mtu(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_as_parses_both_forms() {
        let literal: PeerAs = serde_json::from_str("65001").unwrap();
        assert_eq!(literal, PeerAs::As(65001));
        let request: PeerAs = serde_json::from_str("\"request\"").unwrap();
        assert_eq!(request, PeerAs::Request);
        assert!(serde_json::from_str::<PeerAs>("\"auto\"").is_err());
    }

    #[test]
    fn l2_service_requires_vlan() {
        let service: Service = serde_json::from_str(r#"{"type": "l2"}"#).unwrap();
        assert!(service.validate().is_err());
    }

    #[test]
    fn duplicate_filter_sequence_is_rejected() {
        let filter: Filter = serde_json::from_str(
            r#"{
                "type": "L3",
                "rules": [
                    {"sequence": 10, "action": "permit"},
                    {"sequence": 10, "action": "deny"}
                ]
            }"#,
        )
        .unwrap();
        assert!(filter.validate().is_err());
    }

    #[test]
    fn dwrr_queue_needs_weight() {
        let policy: QosPolicy = serde_json::from_str(
            r#"{"queues": [{"queue_id": 3, "type": "dwrr", "dscp": [26]}]}"#,
        )
        .unwrap();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn ipvpn_vrf_name_defaults_from_name() {
        let vpn: IpVpn = serde_json::from_str(r#"{"l3vni": 10100}"#).unwrap();
        let vpn = IpVpn {
            name: "cust".into(),
            ..vpn
        };
        assert_eq!(vpn.vrf_name(), "Vrf_cust");
    }
}
