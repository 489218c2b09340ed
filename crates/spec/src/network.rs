//! The network document and its lookups
//!
//! `NetworkSpec` mirrors `network.json`; `Network` bundles it with the
//! topology, platform definitions, and configlets. Read-only after load
//! and shared freely.

use crate::configlet::Configlet;
use crate::platform::Platform;
use crate::topology::{DeviceSpec, Topology};
use crate::types::{Filter, IpVpn, MacVpn, QosPolicy, Service, Settings};
use netforge_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The primary spec document: services, filters, QoS, VPNs, settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    #[serde(default)]
    pub filters: BTreeMap<String, Filter>,
    #[serde(default)]
    pub qos_policies: BTreeMap<String, QosPolicy>,
    #[serde(default)]
    pub ipvpns: BTreeMap<String, IpVpn>,
    #[serde(default)]
    pub macvpns: BTreeMap<String, MacVpn>,
    #[serde(default)]
    pub settings: Settings,
}

impl NetworkSpec {
    /// Propagate map keys into the redundant name fields and validate
    /// every definition.
    pub fn finish_load(&mut self) -> Result<()> {
        for (name, service) in &mut self.services {
            service.name = name.clone();
            service.validate()?;
        }
        for (name, filter) in &mut self.filters {
            filter.name = name.clone();
            filter.validate()?;
        }
        for (name, policy) in &mut self.qos_policies {
            policy.name = name.clone();
            policy.validate()?;
        }
        for (name, vpn) in &mut self.ipvpns {
            vpn.name = name.clone();
        }
        for (name, vpn) in &mut self.macvpns {
            vpn.name = name.clone();
        }
        self.cross_check()
    }

    /// References between definitions must resolve.
    fn cross_check(&self) -> Result<()> {
        for service in self.services.values() {
            if let Some(ipvpn) = &service.ipvpn {
                if !self.ipvpns.contains_key(ipvpn) {
                    return Err(Error::validation(format!(
                        "service {}: unknown ipvpn {:?}",
                        service.name, ipvpn
                    )));
                }
            }
            if let Some(macvpn) = &service.macvpn {
                if !self.macvpns.contains_key(macvpn) {
                    return Err(Error::validation(format!(
                        "service {}: unknown macvpn {:?}",
                        service.name, macvpn
                    )));
                }
            }
            for filter in [&service.ingress_filter, &service.egress_filter]
                .into_iter()
                .flatten()
            {
                if !self.filters.contains_key(filter) {
                    return Err(Error::validation(format!(
                        "service {}: unknown filter {:?}",
                        service.name, filter
                    )));
                }
            }
            if let Some(policy) = &service.qos_policy {
                if !self.qos_policies.contains_key(policy) {
                    return Err(Error::validation(format!(
                        "service {}: unknown qos policy {:?}",
                        service.name, policy
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> Result<&Service> {
        self.services
            .get(name)
            .ok_or_else(|| Error::not_found("service", name))
    }

    pub fn filter(&self, name: &str) -> Result<&Filter> {
        self.filters
            .get(name)
            .ok_or_else(|| Error::not_found("filter", name))
    }

    pub fn qos_policy(&self, name: &str) -> Result<&QosPolicy> {
        self.qos_policies
            .get(name)
            .ok_or_else(|| Error::not_found("qos policy", name))
    }

    pub fn ipvpn(&self, name: &str) -> Result<&IpVpn> {
        self.ipvpns
            .get(name)
            .ok_or_else(|| Error::not_found("ipvpn", name))
    }

    pub fn macvpn(&self, name: &str) -> Result<&MacVpn> {
        self.macvpns
            .get(name)
            .ok_or_else(|| Error::not_found("macvpn", name))
    }
}

/// The full loaded specification: document + topology + platforms +
/// configlets.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub spec: NetworkSpec,
    pub topology: Topology,
    pub platforms: BTreeMap<String, Platform>,
    pub configlets: BTreeMap<String, Configlet>,
}

impl Network {
    pub fn device(&self, name: &str) -> Result<&DeviceSpec> {
        self.topology.device(name)
    }

    pub fn platform(&self, name: &str) -> Result<&Platform> {
        self.platforms
            .get(name)
            .ok_or_else(|| Error::not_found("platform", name))
    }

    pub fn platform_of(&self, device: &str) -> Result<&Platform> {
        let device = self.device(device)?;
        self.platform(&device.platform)
    }

    pub fn configlet(&self, name: &str) -> Result<&Configlet> {
        self.configlets
            .get(name)
            .ok_or_else(|| Error::not_found("configlet", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_service_references_fail_load() {
        let mut spec: NetworkSpec = serde_json::from_str(
            r#"{
                "services": {
                    "broken": {"type": "l3", "vrf_type": "shared", "ipvpn": "nonexistent"}
                }
            }"#,
        )
        .unwrap();
        assert!(spec.finish_load().is_err());
    }

    #[test]
    fn names_propagate_from_map_keys() {
        let mut spec: NetworkSpec = serde_json::from_str(
            r#"{
                "ipvpns": {"cust": {"l3vni": 10100}},
                "services": {
                    "customer-l3": {"type": "l3", "vrf_type": "shared", "ipvpn": "cust"}
                }
            }"#,
        )
        .unwrap();
        spec.finish_load().unwrap();
        assert_eq!(spec.service("customer-l3").unwrap().name, "customer-l3");
        assert_eq!(spec.ipvpn("cust").unwrap().vrf_name(), "Vrf_cust");
    }
}
