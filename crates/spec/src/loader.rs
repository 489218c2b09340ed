//! Spec directory loader
//!
//! Reads `network.json`, the optional `topology.json`, `platforms.json`,
//! and the `configlets/` directory into a [`Network`].

use crate::configlet::Configlet;
use crate::network::{Network, NetworkSpec};
use crate::platform::Platform;
use crate::topology::Topology;
use netforge_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Load a spec directory into memory.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Network> {
    let dir = dir.as_ref();

    let network_path = dir.join("network.json");
    let mut spec: NetworkSpec = if network_path.exists() {
        serde_json::from_str(&std::fs::read_to_string(&network_path)?)?
    } else {
        return Err(Error::not_found(
            "spec document",
            network_path.display().to_string(),
        ));
    };
    spec.finish_load()?;

    let topology_path = dir.join("topology.json");
    let mut topology = if topology_path.exists() {
        serde_json::from_str::<Topology>(&std::fs::read_to_string(&topology_path)?)?
    } else {
        debug!("no topology.json, topology-level operations unavailable");
        Topology::default()
    };
    topology.finish_load();

    let platforms_path = dir.join("platforms.json");
    let mut platforms: BTreeMap<String, Platform> = if platforms_path.exists() {
        serde_json::from_str(&std::fs::read_to_string(&platforms_path)?)?
    } else {
        BTreeMap::new()
    };
    for (name, platform) in &mut platforms {
        platform.name = name.clone();
    }

    // Every device must reference a known platform, and every attachment
    // a known service.
    for device in topology.devices.values() {
        if !platforms.contains_key(&device.platform) {
            return Err(Error::validation(format!(
                "device {}: unknown platform {:?}",
                device.name, device.platform
            )));
        }
        for (interface, attachment) in &device.services {
            if spec.service(&attachment.service).is_err() {
                return Err(Error::validation(format!(
                    "device {} {}: unknown service {:?}",
                    device.name, interface, attachment.service
                )));
            }
        }
    }

    let mut configlets = BTreeMap::new();
    let configlet_dir = dir.join("configlets");
    if configlet_dir.is_dir() {
        for entry in WalkDir::new(&configlet_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        {
            let mut configlet: Configlet =
                serde_json::from_str(&std::fs::read_to_string(entry.path())?)?;
            if configlet.name.is_empty() {
                configlet.name = entry
                    .path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            configlets.insert(configlet.name.clone(), configlet);
        }
    }

    info!(
        services = spec.services.len(),
        devices = topology.devices.len(),
        links = topology.links.len(),
        platforms = platforms.len(),
        configlets = configlets.len(),
        "loaded spec from {}",
        dir.display()
    );

    Ok(Network {
        spec,
        topology,
        platforms,
        configlets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn loads_a_complete_spec_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "network.json",
            r#"{
                "ipvpns": {"cust": {"l3vni": 10100}},
                "services": {
                    "customer-l3": {"type": "l3", "vrf_type": "shared", "ipvpn": "cust"}
                }
            }"#,
        );
        write(
            dir.path(),
            "topology.json",
            r#"{
                "devices": {
                    "leaf1": {"mgmt_ip": "192.0.2.11", "loopback": "10.255.0.1", "platform": "base-32", "asn": 65001}
                }
            }"#,
        );
        write(
            dir.path(),
            "platforms.json",
            r#"{"base-32": {"hwsku": "Base-32x100G", "port_count": 32, "default_speed": 100000}}"#,
        );
        std::fs::create_dir(dir.path().join("configlets")).unwrap();
        write(
            &dir.path().join("configlets"),
            "mgmt.json",
            r#"{"entries": {"DEVICE_METADATA": {"localhost": {"hostname": "{{hostname}}"}}}}"#,
        );

        let network = load_dir(dir.path()).unwrap();
        assert!(network.spec.service("customer-l3").is_ok());
        assert!(network.device("leaf1").is_ok());
        assert!(network.platform("base-32").is_ok());
        assert!(network.configlet("mgmt").is_ok());
        assert_eq!(network.configlets["mgmt"].name, "mgmt");
    }

    #[test]
    fn unknown_platform_reference_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "network.json", "{}");
        write(
            dir.path(),
            "topology.json",
            r#"{
                "devices": {
                    "leaf1": {"mgmt_ip": "192.0.2.11", "loopback": "10.255.0.1", "platform": "ghost", "asn": 65001}
                }
            }"#,
        );
        assert!(load_dir(dir.path()).is_err());
    }

    #[test]
    fn missing_network_json_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
