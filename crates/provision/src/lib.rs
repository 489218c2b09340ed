//! netforge provisioning
//!
//! The topology provisioner that synthesises a device's complete intended
//! configuration, the delivery engine that takes deltas to live switches,
//! and the health verifier that compares intent with observation.

pub mod deliver;
pub mod topology;
pub mod verify;

pub use deliver::{deliver, needs_reload, provision_device, ApplyReport, DeliveryOptions};
pub use topology::{generate_device_composite, OmittedEntry, ProvisionReport};
pub use verify::{verify_device_health, CheckStatus, HealthCheck, HealthReport, Violation};
