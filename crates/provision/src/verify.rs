//! Health and intent verification
//!
//! Re-runs the provisioner offline, compares the expected ConfigDB with
//! the live one, and reads the operational tables for session, link, LAG,
//! and VTEP state. The call always returns the report; failed checks are
//! data, not errors.

use crate::topology::{generate_device_composite, is_direct_neighbor};
use netforge_common::configdb::{split_key, Table};
use netforge_common::Result;
use netforge_switch::Device;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// STATE_DB table holding BGP session state, keyed by peer address.
pub const STATE_BGP_TABLE: &str = "BGP_STATE_TABLE";
/// STATE_DB table holding interface operational status.
pub const STATE_PORT_TABLE: &str = "PORT_TABLE";
/// STATE_DB table holding LAG member status, keyed `lag|member`.
pub const STATE_LAG_MEMBER_TABLE: &str = "LAG_MEMBER_TABLE";
/// STATE_DB table holding VTEP operational state.
pub const STATE_VXLAN_TABLE: &str = "VXLAN_TUNNEL_TABLE";
/// STATE_DB table of discovered remote VNIs, keyed `vlan|remote_ip`.
pub const STATE_REMOTE_VNI_TABLE: &str = "EVPN_REMOTE_VNI_TABLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One expected-vs-actual mismatch in ConfigDB.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub table: String,
    pub key: String,
    pub field: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub device: String,
    pub overall: CheckStatus,
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn failed(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .count()
    }
}

fn check(name: &str, status: CheckStatus, message: impl Into<String>) -> HealthCheck {
    HealthCheck {
        name: name.to_string(),
        status,
        message: message.into(),
        violations: Vec::new(),
    }
}

/// Compare generated against observed configuration and read the
/// operational tables.
pub async fn verify_device_health(device: &Device) -> Result<HealthReport> {
    let mut checks = Vec::new();
    checks.push(config_check(device)?);

    // The operational reads are independent; fan them out.
    let (bgp, interfaces, lag, vtep, evpn) = futures::join!(
        bgp_check(device),
        interface_check(device),
        lag_check(device),
        vtep_check(device),
        remote_vtep_check(device),
    );
    checks.push(bgp?);
    checks.push(interfaces?);
    checks.push(lag?);
    checks.push(vtep?);
    checks.push(evpn?);

    let overall = checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(CheckStatus::Pass);
    Ok(HealthReport {
        device: device.name.clone(),
        overall,
        checks,
    })
}

/// Expected composite vs live ConfigDB, field by field.
fn config_check(device: &Device) -> Result<HealthCheck> {
    let network = device.network_handle();
    let (expected, _) = generate_device_composite(&network, &device.name)?;
    let live = device.snapshot();
    let mut violations = Vec::new();

    for (table, key, expected_fields) in expected.iter_entries() {
        match live.get(table, key) {
            None => violations.push(Violation {
                table: table.as_str().to_string(),
                key: key.clone(),
                field: "<entry>".to_string(),
                expected: "present".to_string(),
                actual: "missing".to_string(),
            }),
            Some(actual_fields) => {
                for (field, expected_value) in expected_fields {
                    let actual_value = actual_fields.get(field);
                    if actual_value != Some(expected_value) {
                        violations.push(Violation {
                            table: table.as_str().to_string(),
                            key: key.clone(),
                            field: field.clone(),
                            expected: expected_value.clone(),
                            actual: actual_value.cloned().unwrap_or_else(|| "<unset>".to_string()),
                        });
                    }
                }
            }
        }
    }

    let status = if violations.is_empty() {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };
    let message = if violations.is_empty() {
        format!("{} entries match the intended configuration", expected.entry_count())
    } else {
        format!("{} field violations against the intended configuration", violations.len())
    };
    debug!(device = %device.name, violations = violations.len(), "config check done");
    Ok(HealthCheck {
        name: "config".to_string(),
        status,
        message,
        violations,
    })
}

/// Every configured BGP session should be Established.
async fn bgp_check(device: &Device) -> Result<HealthCheck> {
    let state = device.client().read_state_table(STATE_BGP_TABLE).await?;
    let loopback = device.loopback.to_string();

    let mut down: Vec<String> = Vec::new();
    let mut direct = 0usize;
    let mut indirect = 0usize;
    for (key, fields) in device.snapshot().table(Table::BgpNeighbor) {
        // Key is `vrf|peer` or bare `peer`.
        let peer = split_key(key).last().map(|s| s.to_string()).unwrap_or_default();
        if is_direct_neighbor(fields, &loopback) {
            direct += 1;
        } else {
            indirect += 1;
        }
        let established = state
            .get(&peer)
            .or_else(|| state.get(key.as_str()))
            .and_then(|row| row.get("state"))
            .map(String::as_str)
            == Some("Established");
        if !established {
            down.push(peer);
        }
    }

    Ok(if down.is_empty() {
        check(
            "bgp",
            CheckStatus::Pass,
            format!("{} direct and {} overlay sessions established", direct, indirect),
        )
    } else {
        check(
            "bgp",
            CheckStatus::Fail,
            format!("sessions not established: {}", down.join(", ")),
        )
    })
}

/// Admin-up ports should be oper-up.
async fn interface_check(device: &Device) -> Result<HealthCheck> {
    let state = device.client().read_state_table(STATE_PORT_TABLE).await?;
    let mut down = Vec::new();
    for (port, fields) in device.snapshot().table(Table::Port) {
        if fields.get("admin_status").map(String::as_str) != Some("up") {
            continue;
        }
        let oper_up = state
            .get(port.as_str())
            .and_then(|row| row.get("oper_status"))
            .map(String::as_str)
            == Some("up");
        if !oper_up {
            down.push(port.clone());
        }
    }
    Ok(if down.is_empty() {
        check("interfaces", CheckStatus::Pass, "all admin-up ports are oper-up")
    } else {
        check(
            "interfaces",
            CheckStatus::Warn,
            format!("admin-up but oper-down: {}", down.join(", ")),
        )
    })
}

/// Active LAG members vs configured, judged against min_links.
async fn lag_check(device: &Device) -> Result<HealthCheck> {
    let state = device
        .client()
        .read_state_table(STATE_LAG_MEMBER_TABLE)
        .await?;

    let mut active: BTreeMap<String, usize> = BTreeMap::new();
    for (key, fields) in &state {
        if fields.get("status").map(String::as_str) == Some("enabled") {
            if let Some(lag) = split_key(key).first() {
                *active.entry(lag.to_string()).or_default() += 1;
            }
        }
    }

    let mut status = CheckStatus::Pass;
    let mut notes = Vec::new();
    for (lag, fields) in device.snapshot().table(Table::PortChannel) {
        let configured = device.lag_members(lag).len();
        let min_links: usize = fields
            .get("min_links")
            .and_then(|m| m.parse().ok())
            .unwrap_or(1);
        let up = active.get(lag.as_str()).copied().unwrap_or(0);
        if up < min_links {
            status = status.max(CheckStatus::Fail);
            notes.push(format!("{}: {}/{} active, below min_links {}", lag, up, configured, min_links));
        } else if up < configured {
            status = status.max(CheckStatus::Warn);
            notes.push(format!("{}: {}/{} active", lag, up, configured));
        }
    }

    Ok(if notes.is_empty() {
        check("lag", CheckStatus::Pass, "all port-channel members active")
    } else {
        check("lag", status, notes.join("; "))
    })
}

/// The VTEP should be operationally up once configured.
async fn vtep_check(device: &Device) -> Result<HealthCheck> {
    let vtep = &device.spec().settings.vtep_name;
    if !device.snapshot().contains(Table::VxlanTunnel, vtep) {
        return Ok(check("vtep", CheckStatus::Pass, "no VTEP configured"));
    }
    let state = device.client().read_state_table(STATE_VXLAN_TABLE).await?;
    let oper_up = state
        .get(vtep.as_str())
        .and_then(|row| row.get("operstatus"))
        .map(String::as_str)
        == Some("up");
    Ok(if oper_up {
        check("vtep", CheckStatus::Pass, format!("{} is oper-up", vtep))
    } else {
        check("vtep", CheckStatus::Fail, format!("{} is not oper-up", vtep))
    })
}

/// Remote VTEP discovery and VNI count, as visibility rather than a hard
/// gate.
async fn remote_vtep_check(device: &Device) -> Result<HealthCheck> {
    let configured_vnis = device.snapshot().table(Table::VxlanTunnelMap).count();
    if configured_vnis == 0 {
        return Ok(check("evpn", CheckStatus::Pass, "no VNIs configured"));
    }
    let state = device
        .client()
        .read_state_table(STATE_REMOTE_VNI_TABLE)
        .await?;
    let remotes: std::collections::BTreeSet<String> = state
        .keys()
        .filter_map(|key| split_key(key).last().map(|s| s.to_string()))
        .collect();

    Ok(if remotes.is_empty() {
        check(
            "evpn",
            CheckStatus::Warn,
            format!("{} VNIs configured but no remote VTEPs discovered", configured_vnis),
        )
    } else {
        check(
            "evpn",
            CheckStatus::Pass,
            format!(
                "{} VNIs configured, {} remote VTEPs discovered",
                configured_vnis,
                remotes.len()
            ),
        )
    })
}
