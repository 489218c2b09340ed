//! ConfigDB schema
//!
//! Typed definitions of every switch table netforge touches: table names,
//! the `|`-joined key grammar, and per-table field validators kept as data
//! so entries stay uniform string maps.

use crate::feature::Feature;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Key separator used by the switch's key/value store.
pub const KEY_SEPARATOR: char = '|';

/// Field map of a single ConfigDB entry.
///
/// Values are primitives rendered as strings; lists use the switch's
/// comma-separated convention (see [`list_value`]).
pub type FieldValues = BTreeMap<String, String>;

/// Render a list field the way the switch expects it.
pub fn list_value<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(",")
}

/// Join key parts with the ConfigDB separator.
pub fn join_key<'a, I: IntoIterator<Item = &'a str>>(parts: I) -> String {
    parts.into_iter().collect::<Vec<_>>().join("|")
}

/// Split a ConfigDB key into its parts.
pub fn split_key(key: &str) -> Vec<&str> {
    key.split(KEY_SEPARATOR).collect()
}

/// The tables netforge owns or reads in ConfigDB.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Table {
    #[serde(rename = "DEVICE_METADATA")]
    DeviceMetadata,
    #[serde(rename = "PORT")]
    Port,
    #[serde(rename = "VLAN")]
    Vlan,
    #[serde(rename = "VLAN_MEMBER")]
    VlanMember,
    #[serde(rename = "INTERFACE")]
    Interface,
    #[serde(rename = "VLAN_INTERFACE")]
    VlanInterface,
    #[serde(rename = "LOOPBACK_INTERFACE")]
    LoopbackInterface,
    #[serde(rename = "PORTCHANNEL")]
    PortChannel,
    #[serde(rename = "PORTCHANNEL_MEMBER")]
    PortChannelMember,
    #[serde(rename = "VRF")]
    Vrf,
    #[serde(rename = "VXLAN_TUNNEL")]
    VxlanTunnel,
    #[serde(rename = "VXLAN_TUNNEL_MAP")]
    VxlanTunnelMap,
    #[serde(rename = "VXLAN_EVPN_NVO")]
    VxlanEvpnNvo,
    #[serde(rename = "BGP_NEIGHBOR")]
    BgpNeighbor,
    #[serde(rename = "ACL_TABLE")]
    AclTable,
    #[serde(rename = "ACL_RULE")]
    AclRule,
    #[serde(rename = "QUEUE")]
    Queue,
    #[serde(rename = "SCHEDULER")]
    Scheduler,
    #[serde(rename = "WRED_PROFILE")]
    WredProfile,
    #[serde(rename = "DSCP_TO_TC_MAP")]
    DscpToTcMap,
    #[serde(rename = "SERVICE_BINDING")]
    ServiceBinding,
}

impl Table {
    /// Every table, in no particular order.
    pub const ALL: &'static [Table] = &[
        Table::DeviceMetadata,
        Table::Port,
        Table::Vlan,
        Table::VlanMember,
        Table::Interface,
        Table::VlanInterface,
        Table::LoopbackInterface,
        Table::PortChannel,
        Table::PortChannelMember,
        Table::Vrf,
        Table::VxlanTunnel,
        Table::VxlanTunnelMap,
        Table::VxlanEvpnNvo,
        Table::BgpNeighbor,
        Table::AclTable,
        Table::AclRule,
        Table::Queue,
        Table::Scheduler,
        Table::WredProfile,
        Table::DscpToTcMap,
        Table::ServiceBinding,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Table::DeviceMetadata => "DEVICE_METADATA",
            Table::Port => "PORT",
            Table::Vlan => "VLAN",
            Table::VlanMember => "VLAN_MEMBER",
            Table::Interface => "INTERFACE",
            Table::VlanInterface => "VLAN_INTERFACE",
            Table::LoopbackInterface => "LOOPBACK_INTERFACE",
            Table::PortChannel => "PORTCHANNEL",
            Table::PortChannelMember => "PORTCHANNEL_MEMBER",
            Table::Vrf => "VRF",
            Table::VxlanTunnel => "VXLAN_TUNNEL",
            Table::VxlanTunnelMap => "VXLAN_TUNNEL_MAP",
            Table::VxlanEvpnNvo => "VXLAN_EVPN_NVO",
            Table::BgpNeighbor => "BGP_NEIGHBOR",
            Table::AclTable => "ACL_TABLE",
            Table::AclRule => "ACL_RULE",
            Table::Queue => "QUEUE",
            Table::Scheduler => "SCHEDULER",
            Table::WredProfile => "WRED_PROFILE",
            Table::DscpToTcMap => "DSCP_TO_TC_MAP",
            Table::ServiceBinding => "SERVICE_BINDING",
        }
    }

    /// Write-ordering band.
    ///
    /// Downstream daemons observe each write as a keyspace event and must
    /// see prerequisites first: VRFs before their bindings, VLANs before
    /// members, ACL tables before rules, scheduler profiles before queues.
    /// Deletes are issued last, in reverse band order.
    pub const fn apply_band(&self) -> u8 {
        match self {
            Table::DeviceMetadata => 0,
            Table::Vrf => 1,
            Table::Vlan => 2,
            Table::PortChannel => 3,
            Table::Port | Table::LoopbackInterface | Table::PortChannelMember => 4,
            Table::VlanMember => 5,
            Table::Interface | Table::VlanInterface => 6,
            Table::VxlanTunnel | Table::VxlanEvpnNvo | Table::VxlanTunnelMap => 7,
            Table::BgpNeighbor => 8,
            Table::AclTable => 9,
            Table::AclRule => 10,
            Table::Scheduler | Table::WredProfile | Table::DscpToTcMap => 11,
            Table::Queue => 12,
            Table::ServiceBinding => 13,
        }
    }

    /// The platform feature an entry in this table requires, if any.
    ///
    /// Some requirements are field-dependent: a VRF only needs EVPN once it
    /// carries a VNI, a VLAN only needs ARP suppression once the flag is on.
    pub fn required_feature(&self, fields: &FieldValues) -> Option<Feature> {
        match self {
            Table::PortChannel | Table::PortChannelMember => Some(Feature::Lag),
            Table::AclTable | Table::AclRule => Some(Feature::Acl),
            Table::Queue | Table::Scheduler | Table::WredProfile | Table::DscpToTcMap => {
                Some(Feature::Qos)
            }
            Table::BgpNeighbor => Some(Feature::Bgp),
            Table::VxlanTunnel | Table::VxlanEvpnNvo => Some(Feature::Vxlan),
            Table::VxlanTunnelMap => Some(Feature::Evpn),
            Table::Vrf if fields.contains_key("vni") => Some(Feature::Evpn),
            Table::VlanInterface if fields.contains_key("anycast_mac") => {
                Some(Feature::AnycastGateway)
            }
            Table::Vlan if fields.get("arp_suppress").map(String::as_str) == Some("on") => {
                Some(Feature::ArpSuppression)
            }
            _ => None,
        }
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::not_found("table", s))
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value kinds a field validator can enforce.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Str,
    U32 { min: u32, max: u32 },
    Bool,
    Ip,
    Cidr,
    List,
    Enum(&'static [&'static str]),
}

/// Validator for one field of a table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSchema {
    FieldSchema {
        name,
        kind,
        required: false,
    }
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSchema {
    FieldSchema {
        name,
        kind,
        required: true,
    }
}

/// Field validators per table.
#[derive(Debug, Clone, Copy)]
enum TableSchema {
    Fixed(&'static [FieldSchema]),
    /// DSCP_TO_TC_MAP: fields are dscp values 0..=63 mapping to tc 0..=7.
    DscpMap,
}

const DEVICE_METADATA_FIELDS: &[FieldSchema] = &[
    field("hostname", FieldKind::Str),
    field("bgp_asn", FieldKind::U32 { min: 1, max: u32::MAX }),
    field("router_id", FieldKind::Ip),
    field("platform", FieldKind::Str),
    field("hwsku", FieldKind::Str),
];
const PORT_FIELDS: &[FieldSchema] = &[
    field("alias", FieldKind::Str),
    field("lanes", FieldKind::Str),
    field("speed", FieldKind::U32 { min: 1000, max: 800_000 }),
    field("admin_status", FieldKind::Enum(&["up", "down"])),
    field("mtu", FieldKind::U32 { min: 68, max: 9216 }),
    field("description", FieldKind::Str),
    field("index", FieldKind::U32 { min: 0, max: u32::MAX }),
];
const VLAN_FIELDS: &[FieldSchema] = &[
    required("vlanid", FieldKind::U32 { min: 1, max: 4094 }),
    field("description", FieldKind::Str),
    field("arp_suppress", FieldKind::Enum(&["on", "off"])),
];
const VLAN_MEMBER_FIELDS: &[FieldSchema] = &[required(
    "tagging_mode",
    FieldKind::Enum(&["tagged", "untagged"]),
)];
const INTERFACE_FIELDS: &[FieldSchema] = &[field("vrf_name", FieldKind::Str)];
const VLAN_INTERFACE_FIELDS: &[FieldSchema] = &[
    field("vrf_name", FieldKind::Str),
    field("anycast_mac", FieldKind::Str),
];
const LOOPBACK_INTERFACE_FIELDS: &[FieldSchema] = &[field("vrf_name", FieldKind::Str)];
const PORT_CHANNEL_FIELDS: &[FieldSchema] = &[
    field("admin_status", FieldKind::Enum(&["up", "down"])),
    field("mtu", FieldKind::U32 { min: 68, max: 9216 }),
    field("min_links", FieldKind::U32 { min: 1, max: 128 }),
    field("fast_rate", FieldKind::Bool),
    field("lacp_key", FieldKind::Str),
    field("description", FieldKind::Str),
];
const VRF_FIELDS: &[FieldSchema] = &[
    field("vni", FieldKind::U32 { min: 1, max: 16_777_215 }),
    field("import_rt", FieldKind::List),
    field("export_rt", FieldKind::List),
];
const VXLAN_TUNNEL_FIELDS: &[FieldSchema] = &[required("src_ip", FieldKind::Ip)];
const VXLAN_TUNNEL_MAP_FIELDS: &[FieldSchema] = &[
    required("vni", FieldKind::U32 { min: 1, max: 16_777_215 }),
    field("vlan", FieldKind::Str),
    field("vrf", FieldKind::Str),
];
const VXLAN_EVPN_NVO_FIELDS: &[FieldSchema] = &[required("source_vtep", FieldKind::Str)];
const BGP_NEIGHBOR_FIELDS: &[FieldSchema] = &[
    required("asn", FieldKind::U32 { min: 1, max: u32::MAX }),
    field("local_addr", FieldKind::Ip),
    field("name", FieldKind::Str),
    field("admin_status", FieldKind::Enum(&["up", "down"])),
];
const ACL_TABLE_FIELDS: &[FieldSchema] = &[
    required("type", FieldKind::Enum(&["L3", "L3V6"])),
    required("stage", FieldKind::Enum(&["ingress", "egress"])),
    field("ports", FieldKind::List),
    field("policy_desc", FieldKind::Str),
];
const ACL_RULE_FIELDS: &[FieldSchema] = &[
    required("PRIORITY", FieldKind::U32 { min: 1, max: 65_535 }),
    required("PACKET_ACTION", FieldKind::Enum(&["FORWARD", "DROP"])),
    field("SRC_IP", FieldKind::Cidr),
    field("DST_IP", FieldKind::Cidr),
    field("IP_PROTOCOL", FieldKind::U32 { min: 0, max: 255 }),
    field("L4_SRC_PORT", FieldKind::U32 { min: 0, max: 65_535 }),
    field("L4_DST_PORT", FieldKind::U32 { min: 0, max: 65_535 }),
    field("DSCP", FieldKind::U32 { min: 0, max: 63 }),
    field("SRC_PREFIX_LIST", FieldKind::Str),
    field("DST_PREFIX_LIST", FieldKind::Str),
    field("POLICER", FieldKind::Str),
];
const QUEUE_FIELDS: &[FieldSchema] = &[
    field("scheduler", FieldKind::Str),
    field("wred_profile", FieldKind::Str),
];
const SCHEDULER_FIELDS: &[FieldSchema] = &[
    required("type", FieldKind::Enum(&["DWRR", "STRICT"])),
    field("weight", FieldKind::U32 { min: 1, max: 100 }),
];
const WRED_PROFILE_FIELDS: &[FieldSchema] = &[
    required("ecn", FieldKind::Enum(&["ecn_none", "ecn_all"])),
    field("green_min_threshold", FieldKind::U32 { min: 0, max: u32::MAX }),
    field("green_max_threshold", FieldKind::U32 { min: 0, max: u32::MAX }),
];
const SERVICE_BINDING_FIELDS: &[FieldSchema] = &[
    required("service", FieldKind::Str),
    field("vlan", FieldKind::Str),
    field("vrf", FieldKind::Str),
    field("ip", FieldKind::Cidr),
    field("neighbor", FieldKind::Ip),
    field("peer_as", FieldKind::U32 { min: 1, max: u32::MAX }),
    field("qos_policy", FieldKind::Str),
    field("ingress_filter", FieldKind::Str),
    field("egress_filter", FieldKind::Str),
];

static SCHEMAS: Lazy<BTreeMap<Table, TableSchema>> = Lazy::new(|| {
    let mut m = BTreeMap::new();
    m.insert(Table::DeviceMetadata, TableSchema::Fixed(DEVICE_METADATA_FIELDS));
    m.insert(Table::Port, TableSchema::Fixed(PORT_FIELDS));
    m.insert(Table::Vlan, TableSchema::Fixed(VLAN_FIELDS));
    m.insert(Table::VlanMember, TableSchema::Fixed(VLAN_MEMBER_FIELDS));
    m.insert(Table::Interface, TableSchema::Fixed(INTERFACE_FIELDS));
    m.insert(Table::VlanInterface, TableSchema::Fixed(VLAN_INTERFACE_FIELDS));
    m.insert(Table::LoopbackInterface, TableSchema::Fixed(LOOPBACK_INTERFACE_FIELDS));
    m.insert(Table::PortChannel, TableSchema::Fixed(PORT_CHANNEL_FIELDS));
    m.insert(Table::PortChannelMember, TableSchema::Fixed(&[]));
    m.insert(Table::Vrf, TableSchema::Fixed(VRF_FIELDS));
    m.insert(Table::VxlanTunnel, TableSchema::Fixed(VXLAN_TUNNEL_FIELDS));
    m.insert(Table::VxlanTunnelMap, TableSchema::Fixed(VXLAN_TUNNEL_MAP_FIELDS));
    m.insert(Table::VxlanEvpnNvo, TableSchema::Fixed(VXLAN_EVPN_NVO_FIELDS));
    m.insert(Table::BgpNeighbor, TableSchema::Fixed(BGP_NEIGHBOR_FIELDS));
    m.insert(Table::AclTable, TableSchema::Fixed(ACL_TABLE_FIELDS));
    m.insert(Table::AclRule, TableSchema::Fixed(ACL_RULE_FIELDS));
    m.insert(Table::Queue, TableSchema::Fixed(QUEUE_FIELDS));
    m.insert(Table::Scheduler, TableSchema::Fixed(SCHEDULER_FIELDS));
    m.insert(Table::WredProfile, TableSchema::Fixed(WRED_PROFILE_FIELDS));
    m.insert(Table::DscpToTcMap, TableSchema::DscpMap);
    m.insert(Table::ServiceBinding, TableSchema::Fixed(SERVICE_BINDING_FIELDS));
    m
});

fn check_value(table: Table, schema: &FieldSchema, value: &str) -> Result<()> {
    let bad = |why: String| {
        Error::validation(format!(
            "{}: field {}={:?}: {}",
            table, schema.name, value, why
        ))
    };
    match schema.kind {
        FieldKind::Str => Ok(()),
        FieldKind::U32 { min, max } => {
            let n: u32 = value
                .parse()
                .map_err(|_| bad("not an integer".into()))?;
            if n < min || n > max {
                return Err(bad(format!("out of range [{min}, {max}]")));
            }
            Ok(())
        }
        FieldKind::Bool => match value {
            "true" | "false" => Ok(()),
            _ => Err(bad("expected true or false".into())),
        },
        FieldKind::Ip => value
            .parse::<std::net::IpAddr>()
            .map(|_| ())
            .map_err(|_| bad("not an IP address".into())),
        FieldKind::Cidr => value
            .parse::<ipnetwork::IpNetwork>()
            .map(|_| ())
            .map_err(|_| bad("not a CIDR".into())),
        FieldKind::List => Ok(()),
        FieldKind::Enum(allowed) => {
            if allowed.contains(&value) {
                Ok(())
            } else {
                Err(bad(format!("expected one of {:?}", allowed)))
            }
        }
    }
}

/// Validate field names and values against the table's schema, without
/// checking required fields. Used for partial modifications.
pub fn validate_fields(table: Table, fields: &FieldValues) -> Result<()> {
    let schema = SCHEMAS
        .get(&table)
        .ok_or_else(|| Error::Internal(format!("no schema for table {}", table)))?;
    match schema {
        TableSchema::Fixed(field_schemas) => {
            for (name, value) in fields {
                let fs = field_schemas
                    .iter()
                    .find(|fs| fs.name == name)
                    .ok_or_else(|| {
                        Error::validation(format!("{}: unknown field {:?}", table, name))
                    })?;
                check_value(table, fs, value)?;
            }
            Ok(())
        }
        TableSchema::DscpMap => validate_dscp_map(table, fields),
    }
}

fn validate_dscp_map(table: Table, fields: &FieldValues) -> Result<()> {
    for (name, value) in fields {
        let dscp: u32 = name.parse().map_err(|_| {
            Error::validation(format!("{}: field name {:?} is not a dscp", table, name))
        })?;
        let tc: u32 = value.parse().map_err(|_| {
            Error::validation(format!("{}: value {:?} is not a tc", table, value))
        })?;
        if dscp > 63 || tc > 7 {
            return Err(Error::validation(format!(
                "{}: mapping {}->{} out of range",
                table, dscp, tc
            )));
        }
    }
    Ok(())
}

/// Validate a complete entry against the table's schema.
///
/// Rejects unknown fields, malformed values, and missing required fields.
pub fn validate_entry(table: Table, key: &str, fields: &FieldValues) -> Result<()> {
    if key.is_empty() {
        return Err(Error::validation(format!("{}: empty key", table)));
    }
    let schema = SCHEMAS
        .get(&table)
        .ok_or_else(|| Error::Internal(format!("no schema for table {}", table)))?;
    match schema {
        TableSchema::Fixed(field_schemas) => {
            validate_fields(table, fields)?;
            for fs in field_schemas.iter().filter(|fs| fs.required) {
                if !fields.contains_key(fs.name) {
                    return Err(Error::validation(format!(
                        "{}|{}: missing required field {:?}",
                        table, key, fs.name
                    )));
                }
            }
            Ok(())
        }
        TableSchema::DscpMap => validate_dscp_map(table, fields),
    }
}

/// Full snapshot of a switch's ConfigDB: table -> key -> fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDbSnapshot {
    tables: BTreeMap<Table, BTreeMap<String, FieldValues>>,
}

impl ConfigDbSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the switch's full-DB JSON dump, skipping tables netforge does
    /// not model.
    pub fn from_dump(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, FieldValues>> = serde_json::from_str(json)?;
        let mut snapshot = Self::new();
        for (table_name, entries) in raw {
            match table_name.parse::<Table>() {
                Ok(table) => {
                    snapshot.tables.insert(table, entries);
                }
                Err(_) => {
                    tracing::debug!(table = %table_name, "skipping unmodelled table in dump");
                }
            }
        }
        Ok(snapshot)
    }

    pub fn get(&self, table: Table, key: &str) -> Option<&FieldValues> {
        self.tables.get(&table)?.get(key)
    }

    pub fn contains(&self, table: Table, key: &str) -> bool {
        self.get(table, key).is_some()
    }

    /// All entries of one table. Missing tables read as empty.
    pub fn table(&self, table: Table) -> impl Iterator<Item = (&String, &FieldValues)> {
        self.tables.get(&table).into_iter().flatten()
    }

    /// Keys of one table whose first key part equals `part`.
    pub fn keys_under(&self, table: Table, part: &str) -> Vec<String> {
        self.table(table)
            .filter(|(key, _)| split_key(key).first() == Some(&part))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn set(&mut self, table: Table, key: impl Into<String>, fields: FieldValues) {
        self.tables.entry(table).or_default().insert(key.into(), fields);
    }

    /// Merge fields into an entry, creating it if absent.
    pub fn merge(&mut self, table: Table, key: &str, fields: &FieldValues) {
        let entry = self
            .tables
            .entry(table)
            .or_default()
            .entry(key.to_string())
            .or_default();
        for (k, v) in fields {
            entry.insert(k.clone(), v.clone());
        }
    }

    pub fn remove(&mut self, table: Table, key: &str) -> Option<FieldValues> {
        let removed = self.tables.get_mut(&table)?.remove(key);
        if self.tables.get(&table).is_some_and(BTreeMap::is_empty) {
            self.tables.remove(&table);
        }
        removed
    }

    /// Every entry across all tables.
    pub fn iter_entries(&self) -> impl Iterator<Item = (Table, &String, &FieldValues)> {
        self.tables
            .iter()
            .flat_map(|(table, entries)| entries.iter().map(move |(k, f)| (*table, k, f)))
    }

    pub fn entry_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }
}
