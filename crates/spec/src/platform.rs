//! Platform definitions
//!
//! Hardware models with their port layout and feature limitations. The
//! unsupported-feature list expands through the feature dependency graph
//! before the provisioner consults it.

use netforge_common::feature::{disabled_closure, Feature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One switch hardware model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub name: String,
    pub hwsku: String,
    pub port_count: u32,
    /// Default port speed in Mb/s.
    pub default_speed: u32,
    #[serde(default)]
    pub unsupported: Vec<Feature>,
}

impl Platform {
    /// Physical port names, 4-lane stride: Ethernet0, Ethernet4, ...
    pub fn port_names(&self) -> Vec<String> {
        (0..self.port_count)
            .map(|i| format!("Ethernet{}", i * 4))
            .collect()
    }

    /// The unsupported set expanded through the dependency graph.
    pub fn disabled_features(&self) -> BTreeSet<Feature> {
        disabled_closure(&self.unsupported)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        !self.disabled_features().contains(&feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_names_follow_lane_stride() {
        let platform = Platform {
            name: "base-4".into(),
            hwsku: "Base-4x100G".into(),
            port_count: 4,
            default_speed: 100_000,
            unsupported: vec![],
        };
        assert_eq!(
            platform.port_names(),
            vec!["Ethernet0", "Ethernet4", "Ethernet8", "Ethernet12"]
        );
    }

    #[test]
    fn unsupported_features_cascade() {
        let platform = Platform {
            name: "legacy".into(),
            hwsku: "Legacy-48".into(),
            port_count: 48,
            default_speed: 10_000,
            unsupported: vec![Feature::Vxlan],
        };
        assert!(!platform.supports(Feature::Evpn));
        assert!(!platform.supports(Feature::AnycastGateway));
        assert!(platform.supports(Feature::Lag));
    }
}
