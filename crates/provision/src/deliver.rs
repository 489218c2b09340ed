//! Delivery engine
//!
//! Takes a ChangeSet (or a freshly generated composite) to a live switch:
//! acquire the lock, re-read the snapshot, build the delta, apply in
//! order, then save / reload / wait for the routing daemon as needed.
//! Exactly one audit event is emitted per invocation, dry-run included.

use crate::topology::{generate_device_composite, ProvisionReport};
use netforge_common::audit::{self, AuditEvent};
use netforge_common::changeset::{ChangeKind, ChangeSet};
use netforge_common::composite::CompositeMode;
use netforge_common::configdb::Table;
use netforge_common::permissions::{require, Permission, PermissionContext};
use netforge_common::{Error, Result};
use netforge_switch::{acquire, Device, LockConfig, SwitchTimeouts};
use serde::Serialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fields certain daemons cannot pick up from a keyspace event; touching
/// one forces a full config reload.
const HOT_RELOAD_HOSTILE: &[(Table, &str)] = &[
    (Table::DeviceMetadata, "bgp_asn"),
    (Table::DeviceMetadata, "hostname"),
    (Table::VxlanTunnel, "src_ip"),
];

/// Whether a set touches a field the daemons cannot hot-reload.
pub fn needs_reload(set: &ChangeSet) -> bool {
    set.iter().any(|change| {
        HOT_RELOAD_HOSTILE.iter().any(|(table, field)| {
            change.table == *table
                && match change.kind {
                    ChangeKind::Add => change
                        .after
                        .as_ref()
                        .is_some_and(|fields| fields.contains_key(*field)),
                    ChangeKind::Modify => {
                        let before = change.before.as_ref();
                        let after = change.after.as_ref();
                        before.and_then(|f| f.get(*field)) != after.and_then(|f| f.get(*field))
                    }
                    ChangeKind::Delete => true,
                }
        })
    })
}

/// Knobs for one delivery run.
pub struct DeliveryOptions {
    /// False means dry-run: build and preview, never touch the switch.
    pub execute: bool,
    /// Run `config save` after a successful apply.
    pub save: bool,
    /// Force (or suppress) the post-apply reload; None means automatic
    /// classification via [`needs_reload`].
    pub reload: Option<bool>,
    pub lock: LockConfig,
    pub timeouts: SwitchTimeouts,
    pub cancel: CancellationToken,
    /// Extra audit context.
    pub service: Option<String>,
    pub interface: Option<String>,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            execute: false,
            save: false,
            reload: None,
            lock: LockConfig::default(),
            timeouts: SwitchTimeouts::default(),
            cancel: CancellationToken::new(),
            service: None,
            interface: None,
        }
    }
}

/// Outcome of one delivery run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub device: String,
    pub operation: String,
    pub applied: usize,
    pub total: usize,
    pub dry_run: bool,
    pub saved: bool,
    pub reloaded: bool,
    pub duration_ms: u64,
    pub warnings: Vec<String>,
}

/// Deliver the ChangeSet produced by `build`.
///
/// `build` runs against the post-lock snapshot, so concurrent mutators
/// cannot cause lost updates: whatever the previous holder wrote is
/// visible before this set is computed.
pub async fn deliver<F>(
    device: &mut Device,
    build: F,
    options: &DeliveryOptions,
) -> Result<(ChangeSet, ApplyReport)>
where
    F: Fn(&Device) -> Result<ChangeSet>,
{
    let started = Instant::now();
    let result = deliver_inner(device, &build, options, started).await;

    let (operation, success, error) = match &result {
        Ok((set, _)) => (set.operation.clone(), true, None),
        Err(e) => ("unknown".to_string(), false, Some(e.to_string())),
    };
    let mut event = AuditEvent::new(&device.name, operation);
    event.success = success;
    event.dry_run = !options.execute;
    event.duration_ms = started.elapsed().as_millis() as u64;
    event.error = error;
    event.service = options.service.clone();
    event.interface = options.interface.clone();
    audit::emit(&event);

    result
}

async fn deliver_inner<F>(
    device: &mut Device,
    build: &F,
    options: &DeliveryOptions,
    started: Instant,
) -> Result<(ChangeSet, ApplyReport)>
where
    F: Fn(&Device) -> Result<ChangeSet>,
{
    if !options.execute {
        let set = build(device)?;
        let report = ApplyReport {
            device: device.name.clone(),
            operation: set.operation.clone(),
            applied: 0,
            total: set.len(),
            dry_run: true,
            saved: false,
            reloaded: false,
            duration_ms: started.elapsed().as_millis() as u64,
            warnings: Vec::new(),
        };
        return Ok((set, report));
    }

    let client = device.client();
    let token = acquire(client.as_ref(), &options.lock, &options.cancel).await?;

    let outcome = execute_locked(device, build, options).await;

    if let Err(e) = client.unlock(&token).await {
        warn!(device = %device.name, error = %e, "failed to release switch lock");
    }

    let (set, applied, saved, reloaded, warnings) = outcome?;
    let report = ApplyReport {
        device: device.name.clone(),
        operation: set.operation.clone(),
        applied,
        total: set.len(),
        dry_run: false,
        saved,
        reloaded,
        duration_ms: started.elapsed().as_millis() as u64,
        warnings,
    };
    Ok((set, report))
}

async fn execute_locked<F>(
    device: &mut Device,
    build: &F,
    options: &DeliveryOptions,
) -> Result<(ChangeSet, usize, bool, bool, Vec<String>)>
where
    F: Fn(&Device) -> Result<ChangeSet>,
{
    // Lost-update guard: whoever held the lock before us may have written.
    device.refresh_snapshot().await?;
    let set = build(device)?;
    let mut warnings = Vec::new();

    if set.is_empty() {
        return Ok((set, 0, false, false, warnings));
    }
    if options.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let applied = tokio::select! {
        biased;
        _ = options.cancel.cancelled() => return Err(Error::Cancelled),
        result = device.apply_changeset(&set) => result?,
    };
    info!(device = %device.name, applied, "change set applied");

    let mut saved = false;
    if options.save {
        device.client().config_save(options.timeouts.save).await?;
        saved = true;
    }

    let reload = options.reload.unwrap_or_else(|| needs_reload(&set));
    let mut reloaded = false;
    if reload {
        match device.client().config_reload(options.timeouts.reload).await {
            Ok(()) => {
                reloaded = true;
                wait_for_routing(device, options, &mut warnings).await?;
                reissue_routing_entries(device, &set, &mut warnings).await;
            }
            // A failed reload does not invalidate the applied writes.
            Err(e) => warnings.push(format!("config reload failed: {}", e)),
        }
    }

    Ok((set, applied, saved, reloaded, warnings))
}

/// Poll the routing daemon until it answers or the liveness window
/// closes.
async fn wait_for_routing(
    device: &Device,
    options: &DeliveryOptions,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let deadline = Instant::now() + options.timeouts.liveness;
    let mut ticker = tokio::time::interval(options.timeouts.liveness_interval);
    loop {
        tokio::select! {
            _ = options.cancel.cancelled() => return Err(Error::Cancelled),
            _ = ticker.tick() => {}
        }
        match device
            .client()
            .routing_alive(options.timeouts.liveness_interval)
            .await
        {
            Ok(true) => return Ok(()),
            Ok(false) | Err(_) if Instant::now() < deadline => continue,
            Ok(false) => {
                warnings.push("routing daemon did not confirm liveness".to_string());
                return Ok(());
            }
            Err(e) => {
                warnings.push(format!("routing liveness probe failed: {}", e));
                return Ok(());
            }
        }
    }
}

/// After a reload the routing renderer rebuilds its config from ConfigDB,
/// but freshly written neighbor rows can be missed in the race; re-issue
/// them so their keyspace events fire after the daemon re-attached.
async fn reissue_routing_entries(
    device: &mut Device,
    set: &ChangeSet,
    warnings: &mut Vec<String>,
) {
    let neighbors: Vec<(String, netforge_common::FieldValues)> = set
        .iter()
        .filter(|change| {
            change.table == Table::BgpNeighbor && change.kind != ChangeKind::Delete
        })
        .filter_map(|change| {
            change
                .after
                .clone()
                .map(|fields| (change.key.clone(), fields))
        })
        .collect();
    for (key, fields) in neighbors {
        if let Err(e) = device.client().write(Table::BgpNeighbor, &key, &fields).await {
            warnings.push(format!("post-reload rewrite of {} failed: {}", key, e));
        }
    }
}

/// End-to-end provisioning: generate the composite, diff, deliver.
pub async fn provision_device(
    device: &mut Device,
    mode: CompositeMode,
    options: &DeliveryOptions,
) -> Result<(ChangeSet, ApplyReport, ProvisionReport)> {
    require(
        Permission::DeviceProvision,
        &PermissionContext::device(&device.name),
    )?;
    let network = device.network_handle();
    let (composite, provision_report) = generate_device_composite(&network, &device.name)?;

    let device_name = device.name.clone();
    let mode_label = match mode {
        CompositeMode::Overwrite => "provision overwrite",
        CompositeMode::Merge => "provision merge",
    };
    let (set, report) = deliver(
        device,
        move |d| {
            let mut composite = composite.clone();
            composite.mode = mode;
            composite.diff(d.snapshot(), &device_name, mode_label)
        },
        options,
    )
    .await?;
    Ok((set, report, provision_report))
}
