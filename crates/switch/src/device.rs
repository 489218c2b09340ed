//! Device model
//!
//! A `Device` is the aggregate root for one switch: its identity resolved
//! from the spec, a live ConfigDB snapshot, cached views over it, and the
//! client connection. Mutating operations read the snapshot and emit
//! ChangeSets; only [`Device::apply_changeset`] touches the switch.

use crate::client::{SshSwitchClient, SwitchClient, SwitchTimeouts};
use crate::stub::StubSwitch;
use netforge_common::changeset::{ChangeKind, ChangeSet};
use netforge_common::configdb::{split_key, ConfigDbSnapshot, FieldValues, Table};
use netforge_common::{Error, Result};
use netforge_spec::{Network, NetworkSpec, Platform};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// The L3 binding table an interface's rows live in.
pub fn l3_table_for(interface: &str) -> Table {
    if interface.starts_with("Vlan") {
        Table::VlanInterface
    } else if interface.starts_with("Loopback") {
        Table::LoopbackInterface
    } else {
        Table::Interface
    }
}

/// One connected (or offline) switch.
pub struct Device {
    pub name: String,
    pub mgmt_ip: IpAddr,
    pub loopback: Ipv4Addr,
    pub platform: Platform,
    pub zone: Option<String>,
    pub asn: u32,
    pub router_id: Ipv4Addr,
    /// EVPN session peers resolved from the topology.
    pub evpn_peers: Vec<Ipv4Addr>,
    network: Arc<Network>,
    client: Arc<dyn SwitchClient>,
    snapshot: ConfigDbSnapshot,
    dirty: bool,
}

impl Device {
    /// Build a device over an existing client connection, loading the
    /// initial snapshot.
    pub async fn connect(
        network: Arc<Network>,
        name: &str,
        client: Arc<dyn SwitchClient>,
    ) -> Result<Self> {
        let mut device = Self::assemble(network, name, client)?;
        device.refresh_snapshot().await?;
        info!(
            device = %device.name,
            entries = device.snapshot.entry_count(),
            "device connected"
        );
        Ok(device)
    }

    /// Build an offline device on an in-memory stub with an empty
    /// snapshot. Used by the provisioner and by tests.
    pub fn offline(network: Arc<Network>, name: &str) -> Result<Self> {
        Self::assemble(network, name, Arc::new(StubSwitch::new()))
    }

    fn assemble(
        network: Arc<Network>,
        name: &str,
        client: Arc<dyn SwitchClient>,
    ) -> Result<Self> {
        let spec = network.device(name)?;
        let platform = network.platform(&spec.platform)?.clone();
        let evpn_peers = network
            .topology
            .evpn_peers(name, &network.spec.settings)?;
        Ok(Self {
            name: spec.name.clone(),
            mgmt_ip: spec.mgmt_ip,
            loopback: spec.loopback,
            zone: spec.zone.clone(),
            asn: spec.asn,
            router_id: spec.router_id(),
            platform,
            evpn_peers,
            network,
            client,
            snapshot: ConfigDbSnapshot::new(),
            dirty: false,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_handle(&self) -> Arc<Network> {
        Arc::clone(&self.network)
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.network.spec
    }

    pub fn client(&self) -> Arc<dyn SwitchClient> {
        Arc::clone(&self.client)
    }

    pub fn snapshot(&self) -> &ConfigDbSnapshot {
        &self.snapshot
    }

    /// Overwrite the in-memory snapshot. Test seam; production code reads
    /// from the switch via [`Device::refresh_snapshot`].
    pub fn load_snapshot(&mut self, snapshot: ConfigDbSnapshot) {
        self.snapshot = snapshot;
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Re-read the full ConfigDB from the switch.
    pub async fn refresh_snapshot(&mut self) -> Result<()> {
        self.snapshot = self.client.read_all_tables().await?;
        self.dirty = false;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshot views
    // ------------------------------------------------------------------

    pub fn has_vlan(&self, id: u16) -> bool {
        self.snapshot.contains(Table::Vlan, &format!("Vlan{}", id))
    }

    pub fn vlan_ids(&self) -> Vec<u16> {
        self.snapshot
            .table(Table::Vlan)
            .filter_map(|(key, _)| key.strip_prefix("Vlan")?.parse().ok())
            .collect()
    }

    /// Physical ports: the live PORT table, falling back to the platform
    /// definition when the snapshot is empty (offline devices).
    pub fn physical_interfaces(&self) -> Vec<String> {
        let from_snapshot: Vec<String> = self
            .snapshot
            .table(Table::Port)
            .map(|(key, _)| key.clone())
            .collect();
        if from_snapshot.is_empty() {
            self.platform.port_names()
        } else {
            from_snapshot
        }
    }

    pub fn port_channels(&self) -> Vec<String> {
        self.snapshot
            .table(Table::PortChannel)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn has_interface(&self, name: &str) -> bool {
        if name.starts_with("PortChannel") {
            return self.snapshot.contains(Table::PortChannel, name);
        }
        if let Some(id) = name.strip_prefix("Vlan") {
            return id.parse::<u16>().map(|id| self.has_vlan(id)).unwrap_or(false);
        }
        self.physical_interfaces().iter().any(|i| i == name)
    }

    /// The LAG a port belongs to, if any.
    pub fn lag_of(&self, member: &str) -> Option<String> {
        self.snapshot
            .table(Table::PortChannelMember)
            .find_map(|(key, _)| {
                let parts = split_key(key);
                (parts.len() == 2 && parts[1] == member).then(|| parts[0].to_string())
            })
    }

    pub fn lag_members(&self, lag: &str) -> Vec<String> {
        self.snapshot
            .table(Table::PortChannelMember)
            .filter_map(|(key, _)| {
                let parts = split_key(key);
                (parts.len() == 2 && parts[0] == lag).then(|| parts[1].to_string())
            })
            .collect()
    }

    /// CIDR rows bound to an interface in its L3 table.
    pub fn ip_bindings(&self, interface: &str) -> Vec<String> {
        self.snapshot
            .table(l3_table_for(interface))
            .filter_map(|(key, _)| {
                let parts = split_key(key);
                (parts.len() == 2 && parts[0] == interface).then(|| parts[1].to_string())
            })
            .collect()
    }

    pub fn interface_vrf(&self, interface: &str) -> Option<String> {
        self.snapshot
            .get(l3_table_for(interface), interface)?
            .get("vrf_name")
            .cloned()
    }

    pub fn vrfs(&self) -> Vec<String> {
        self.snapshot
            .table(Table::Vrf)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Whether any interface row references the VRF.
    pub fn vrf_has_bindings(&self, vrf: &str) -> bool {
        [
            Table::Interface,
            Table::VlanInterface,
            Table::LoopbackInterface,
        ]
        .iter()
        .any(|table| {
            self.snapshot
                .table(*table)
                .any(|(_, fields)| fields.get("vrf_name").map(String::as_str) == Some(vrf))
        })
    }

    pub fn service_binding(&self, interface: &str) -> Option<&FieldValues> {
        self.snapshot.get(Table::ServiceBinding, interface)
    }

    /// Configured speed of a port, falling back to the platform default.
    pub fn port_speed(&self, interface: &str) -> u32 {
        self.snapshot
            .get(Table::Port, interface)
            .and_then(|fields| fields.get("speed"))
            .and_then(|speed| speed.parse().ok())
            .unwrap_or(self.platform.default_speed)
    }

    // ------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------

    /// Apply a ChangeSet in §apply order, sequentially and non-atomically.
    ///
    /// On the first failed write the apply stops and returns
    /// [`Error::Partial`] with the count applied so far and the failing
    /// entry. The in-memory snapshot mirrors every successful write.
    #[instrument(skip(self, set), fields(device = %self.name, operation = %set.operation))]
    pub async fn apply_changeset(&mut self, set: &ChangeSet) -> Result<usize> {
        let ordered = set.ordered();
        let mut applied = 0usize;
        for change in ordered {
            let outcome = match change.kind {
                ChangeKind::Add => {
                    let fields = change.after.clone().unwrap_or_default();
                    self.client
                        .write(change.table, &change.key, &fields)
                        .await
                        .map(|_| fields)
                }
                ChangeKind::Modify => {
                    // Modify carries the full post-image; the client write
                    // replaces the entry with it, which is also how fields
                    // get dropped.
                    let fields = change.after.clone().unwrap_or_default();
                    self.client
                        .write(change.table, &change.key, &fields)
                        .await
                        .map(|_| fields)
                }
                ChangeKind::Delete => self
                    .client
                    .delete(change.table, &change.key)
                    .await
                    .map(|_| FieldValues::new()),
            };

            match outcome {
                Ok(written) => {
                    match change.kind {
                        ChangeKind::Delete => {
                            self.snapshot.remove(change.table, &change.key);
                        }
                        _ => self.snapshot.set(change.table, change.key.clone(), written),
                    }
                    self.dirty = true;
                    applied += 1;
                }
                Err(e) => {
                    debug!(
                        table = %change.table,
                        key = %change.key,
                        applied,
                        "apply stopped at failed write"
                    );
                    return Err(Error::Partial {
                        applied,
                        table: change.table.as_str().to_string(),
                        key: change.key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(applied)
    }
}

/// Entry point for connecting devices out of a loaded spec.
pub struct Fabric {
    network: Arc<Network>,
    timeouts: SwitchTimeouts,
}

impl Fabric {
    pub fn new(network: Network) -> Self {
        Self {
            network: Arc::new(network),
            timeouts: SwitchTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SwitchTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn network(&self) -> Arc<Network> {
        Arc::clone(&self.network)
    }

    pub fn timeouts(&self) -> &SwitchTimeouts {
        &self.timeouts
    }

    /// SSH to the device's management address and load its snapshot.
    pub async fn connect_device(&self, name: &str) -> Result<Device> {
        let spec = self.network.device(name)?;
        let client =
            SshSwitchClient::connect(spec.mgmt_ip.to_string(), self.timeouts.clone()).await?;
        Device::connect(Arc::clone(&self.network), name, Arc::new(client)).await
    }

    /// Offline device on a stub switch, for provisioning runs and tests.
    pub fn offline_device(&self, name: &str) -> Result<Device> {
        Device::offline(Arc::clone(&self.network), name)
    }
}
