//! netforge mutating operations
//!
//! Every operation here follows one contract: take a device plus typed
//! inputs, read only the snapshot and the spec, and produce a ChangeSet or
//! an error. Nothing in this crate talks to a switch, which makes dry-run
//! the default and every operation a pure, testable function.

pub mod baseline;
pub mod cleanup;
pub mod filter;
pub mod lag;
pub mod neighbor;
pub mod service;
pub mod svi;
pub mod vlan;
pub mod vpn;

#[cfg(test)]
pub(crate) mod testutil;

pub use baseline::apply_baseline;
pub use cleanup::{cleanup, CleanupKind, CleanupSummary};
pub use filter::{acl_table_name, compile as compile_filter, Direction};
pub use lag::{
    add_port_channel_member, create_port_channel, delete_port_channel,
    remove_port_channel_member, PortChannelParams,
};
pub use neighbor::derive_neighbor;
pub use service::{apply_service, refresh_service, remove_service, ApplyServiceParams};
pub use svi::{configure_svi, SviParams};
pub use vlan::{add_vlan_member, create_vlan, delete_vlan, remove_vlan_member};
pub use vpn::{bind_ipvpn, unbind_ipvpn};
