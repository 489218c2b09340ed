//! Platform feature matrix
//!
//! Switch platforms declare features they cannot support. Features form a
//! fixed acyclic dependency graph; disabling one disables everything that
//! depends on it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A capability a platform may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Lag,
    Acl,
    Qos,
    Bgp,
    Vxlan,
    Evpn,
    AnycastGateway,
    ArpSuppression,
}

impl Feature {
    /// All features, in dependency order (dependencies first).
    pub const ALL: &'static [Feature] = &[
        Feature::Lag,
        Feature::Acl,
        Feature::Qos,
        Feature::Bgp,
        Feature::Vxlan,
        Feature::Evpn,
        Feature::AnycastGateway,
        Feature::ArpSuppression,
    ];

    /// Direct prerequisites of this feature.
    pub fn depends_on(self) -> &'static [Feature] {
        match self {
            Feature::Evpn => &[Feature::Vxlan, Feature::Bgp],
            Feature::AnycastGateway => &[Feature::Evpn],
            Feature::ArpSuppression => &[Feature::Evpn],
            _ => &[],
        }
    }

    fn requires(self, other: Feature) -> bool {
        self == other
            || self
                .depends_on()
                .iter()
                .any(|dep| dep.requires(other))
    }
}

/// Expand a set of unsupported features through the dependency graph.
///
/// Any feature that (transitively) requires an unsupported one is itself
/// unsupported.
pub fn disabled_closure(unsupported: &[Feature]) -> BTreeSet<Feature> {
    let mut out = BTreeSet::new();
    for &feature in Feature::ALL {
        if unsupported.iter().any(|&u| feature.requires(u)) {
            out.insert(feature);
        }
    }
    out
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Feature::Lag => "lag",
            Feature::Acl => "acl",
            Feature::Qos => "qos",
            Feature::Bgp => "bgp",
            Feature::Vxlan => "vxlan",
            Feature::Evpn => "evpn",
            Feature::AnycastGateway => "anycast_gateway",
            Feature::ArpSuppression => "arp_suppression",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_vxlan_cascades_to_evpn_and_anycast() {
        let disabled = disabled_closure(&[Feature::Vxlan]);
        assert!(disabled.contains(&Feature::Vxlan));
        assert!(disabled.contains(&Feature::Evpn));
        assert!(disabled.contains(&Feature::AnycastGateway));
        assert!(disabled.contains(&Feature::ArpSuppression));
        assert!(!disabled.contains(&Feature::Lag));
        assert!(!disabled.contains(&Feature::Bgp));
    }

    #[test]
    fn disabling_a_leaf_stays_local() {
        let disabled = disabled_closure(&[Feature::AnycastGateway]);
        assert_eq!(disabled.len(), 1);
    }
}
