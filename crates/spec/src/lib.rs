//! netforge specification model
//!
//! In-memory representation of the network document: devices, topology
//! links, services, filters, QoS policies, IP-VPNs, MAC-VPNs, and the
//! platform feature matrix. Pure data with name-keyed lookups; loaded once
//! and shared read-only.

pub mod configlet;
pub mod loader;
pub mod network;
pub mod platform;
pub mod topology;
pub mod types;

pub use configlet::Configlet;
pub use loader::load_dir;
pub use network::{Network, NetworkSpec};
pub use platform::Platform;
pub use topology::{DeviceSpec, Endpoint, Link, ServiceAttachment, Topology};
pub use types::{
    Filter, FilterAction, FilterKind, FilterRule, IpVpn, MacVpn, PeerAs, QosPolicy, QosQueue,
    QueueKind, Service, ServiceKind, Settings, VrfType,
};
