//! Filter to ACL compilation
//!
//! A filter spec translates 1:1 into an ACL_TABLE named after the
//! interface and direction, plus one ACL_RULE per filter rule. Rule
//! priority is `10000 - sequence`: higher priority matches first, so
//! ascending sequences evaluate in order. The convention is uniform across
//! the whole engine.

use netforge_common::configdb::{FieldValues, Table};
use netforge_common::{Error, Result};
use netforge_spec::{Filter, FilterAction, FilterKind};

/// ACL attachment direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub const fn stage(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }

    const fn suffix(&self) -> &'static str {
        match self {
            Direction::Ingress => "in",
            Direction::Egress => "out",
        }
    }
}

/// ACL table name for an interface/direction pair, e.g. `Ethernet0-in`.
pub fn acl_table_name(interface: &str, direction: Direction) -> String {
    format!("{}-{}", interface, direction.suffix())
}

fn priority_of(sequence: u32) -> u32 {
    10_000 - sequence
}

fn protocol_number(protocol: &str) -> Result<u8> {
    match protocol {
        "icmp" => Ok(1),
        "tcp" => Ok(6),
        "udp" => Ok(17),
        other => other
            .parse()
            .map_err(|_| Error::validation(format!("unknown protocol {:?}", other))),
    }
}

/// Normalise an address match: a bare IP becomes a host prefix.
fn cidr_of(value: &str) -> Result<String> {
    if value.contains('/') {
        value
            .parse::<ipnetwork::IpNetwork>()
            .map(|_| value.to_string())
            .map_err(|_| Error::validation(format!("bad CIDR {:?}", value)))
    } else {
        value
            .parse::<std::net::IpAddr>()
            .map(|addr| match addr {
                std::net::IpAddr::V4(_) => format!("{}/32", addr),
                std::net::IpAddr::V6(_) => format!("{}/128", addr),
            })
            .map_err(|_| Error::validation(format!("bad address {:?}", value)))
    }
}

/// Compile a filter into its ACL_TABLE and ACL_RULE entries for one
/// interface and direction.
pub fn compile(
    filter: &Filter,
    interface: &str,
    direction: Direction,
) -> Result<Vec<(Table, String, FieldValues)>> {
    filter.validate()?;
    let table_name = acl_table_name(interface, direction);

    let mut table_fields = FieldValues::new();
    table_fields.insert(
        "type".to_string(),
        match filter.kind {
            FilterKind::L3 => "L3",
            FilterKind::L3V6 => "L3V6",
        }
        .to_string(),
    );
    table_fields.insert("stage".to_string(), direction.stage().to_string());
    table_fields.insert("ports".to_string(), interface.to_string());
    table_fields.insert("policy_desc".to_string(), filter.name.clone());

    let mut out = vec![(Table::AclTable, table_name.clone(), table_fields)];

    for rule in &filter.rules {
        let mut fields = FieldValues::new();
        fields.insert("PRIORITY".to_string(), priority_of(rule.sequence).to_string());
        fields.insert(
            "PACKET_ACTION".to_string(),
            match rule.action {
                FilterAction::Permit => "FORWARD",
                FilterAction::Deny => "DROP",
            }
            .to_string(),
        );
        if let Some(src) = &rule.src_ip {
            fields.insert("SRC_IP".to_string(), cidr_of(src)?);
        }
        if let Some(dst) = &rule.dst_ip {
            fields.insert("DST_IP".to_string(), cidr_of(dst)?);
        }
        if let Some(protocol) = &rule.protocol {
            fields.insert(
                "IP_PROTOCOL".to_string(),
                protocol_number(protocol)?.to_string(),
            );
        }
        if let Some(port) = rule.src_port {
            fields.insert("L4_SRC_PORT".to_string(), port.to_string());
        }
        if let Some(port) = rule.dst_port {
            fields.insert("L4_DST_PORT".to_string(), port.to_string());
        }
        if let Some(dscp) = rule.dscp {
            fields.insert("DSCP".to_string(), dscp.to_string());
        }
        if let Some(list) = &rule.src_prefix_list {
            fields.insert("SRC_PREFIX_LIST".to_string(), list.clone());
        }
        if let Some(list) = &rule.dst_prefix_list {
            fields.insert("DST_PREFIX_LIST".to_string(), list.clone());
        }
        if let Some(policer) = &rule.policer {
            fields.insert("POLICER".to_string(), policer.clone());
        }
        out.push((
            Table::AclRule,
            format!("{}|RULE_{}", table_name, rule.sequence),
            fields,
        ));
    }

    Ok(out)
}
