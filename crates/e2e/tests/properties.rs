//! Cross-cutting properties of the planning and delivery pipeline

use netforge_common::changeset::{ChangeKind, ChangeSet};
use netforge_common::composite::CompositeMode;
use netforge_common::configdb::{ConfigDbSnapshot, Table};
use netforge_e2e::{connected, fixture_network};
use netforge_ops::{apply_service, derive_neighbor, remove_service, ApplyServiceParams};
use netforge_provision::generate_device_composite;
use pretty_assertions::assert_eq;
use std::net::Ipv4Addr;
use std::sync::Arc;
use test_case::test_case;

/// Fold a ChangeSet into a snapshot the way the preview describes it.
fn fold(snapshot: &ConfigDbSnapshot, set: &ChangeSet) -> ConfigDbSnapshot {
    let mut out = snapshot.clone();
    for change in set.ordered() {
        match change.kind {
            ChangeKind::Add | ChangeKind::Modify => out.set(
                change.table,
                change.key.clone(),
                change.after.clone().unwrap_or_default(),
            ),
            ChangeKind::Delete => {
                out.remove(change.table, &change.key);
            }
        }
    }
    out
}

/// Applying a set leaves the switch in exactly the state the preview
/// described.
#[tokio::test]
async fn preview_faithfulness() {
    let (mut device, stub) = connected("leaf1", &[]).await;
    let params = ApplyServiceParams {
        ip: Some("10.1.1.1/30".parse().unwrap()),
        peer_as: Some(64512),
        neighbor: None,
    };
    let set = apply_service(&device, "Ethernet4", "customer-l3", &params).unwrap();

    let expected = fold(device.snapshot(), &set);
    device.apply_changeset(&set).await.unwrap();
    assert_eq!(stub.config(), expected);
    assert_eq!(device.snapshot(), &expected);
}

/// Pure operations never touch the client.
#[tokio::test]
async fn dry_run_purity() {
    let (device, stub) = connected("leaf1", &[(Table::Vlan, "Vlan100", &[("vlanid", "100")])]).await;
    let before = device.snapshot().clone();

    let _ = apply_service(
        &device,
        "Ethernet8",
        "servers",
        &ApplyServiceParams::default(),
    )
    .unwrap();
    let _ = netforge_ops::create_vlan(&device, 200, None).unwrap();

    assert_eq!(stub.write_count(), 0);
    assert!(stub.shell_log().is_empty());
    assert_eq!(device.snapshot(), &before);
}

/// No delete is ever issued before an add or modify within one set.
#[tokio::test]
async fn order_invariant_deletes_last() {
    let (device, _stub) = connected(
        "leaf1",
        &[
            (Table::Vlan, "Vlan300", &[("vlanid", "300")]),
            (
                Table::VlanMember,
                "Vlan300|Ethernet4",
                &[("tagging_mode", "untagged")],
            ),
            (
                Table::ServiceBinding,
                "Ethernet4",
                &[("service", "servers"), ("vlan", "Vlan300")],
            ),
        ],
    )
    .await;

    // A removal plus a fresh apply merged into one set mixes adds and
    // deletes across many tables.
    let mut set = remove_service(&device, "Ethernet4").unwrap();
    set.merge(
        apply_service(
            &device,
            "Ethernet8",
            "servers",
            &ApplyServiceParams::default(),
        )
        .unwrap(),
    )
    .unwrap();

    let ordered = set.ordered();
    let first_delete = ordered
        .iter()
        .position(|c| c.kind == ChangeKind::Delete)
        .unwrap_or(ordered.len());
    let last_nondelete = ordered
        .iter()
        .rposition(|c| c.kind != ChangeKind::Delete)
        .unwrap_or(0);
    assert!(
        last_nondelete < first_delete,
        "a delete preceded an add/modify"
    );
}

/// Apply-then-remove nets out to the original snapshot.
#[tokio::test]
async fn remove_service_inverts_apply() {
    for (interface, service, params) in [
        ("Ethernet8", "servers", ApplyServiceParams::default()),
        (
            "Ethernet4",
            "customer-l3",
            ApplyServiceParams {
                ip: Some("10.1.1.1/30".parse().unwrap()),
                peer_as: Some(64512),
                neighbor: None,
            },
        ),
    ] {
        let (mut device, stub) = connected("leaf1", &[]).await;
        let original = device.snapshot().clone();

        let apply = apply_service(&device, interface, service, &params).unwrap();
        device.apply_changeset(&apply).await.unwrap();

        let remove = remove_service(&device, interface).unwrap();
        device.apply_changeset(&remove).await.unwrap();

        assert_eq!(
            stub.config(),
            original,
            "{service} on {interface} did not invert cleanly"
        );
    }
}

/// The provisioner is a pure function of the spec.
#[test]
fn provisioner_determinism() {
    let network = Arc::new(fixture_network());
    let (a, report_a) = generate_device_composite(&network, "leaf1").unwrap();
    let (b, report_b) = generate_device_composite(&network, "leaf1").unwrap();
    assert_eq!(a.content_hash(), b.content_hash());
    assert_eq!(report_a.content_hash, report_b.content_hash);
    assert_eq!(a.mode, CompositeMode::Overwrite);
}

/// No composite entry requires a feature the platform lacks.
#[test]
fn platform_filtering_is_exhaustive() {
    let mut network = fixture_network();
    let platform = network.platforms.get_mut("base-8").unwrap();
    platform.unsupported = vec![netforge_common::Feature::Vxlan];
    let disabled = platform.disabled_features();

    let network = Arc::new(network);
    let (composite, report) = generate_device_composite(&network, "leaf1").unwrap();

    for (table, key, fields) in composite.iter_entries() {
        if let Some(feature) = table.required_feature(fields) {
            assert!(
                !disabled.contains(&feature),
                "{table}|{key} requires disabled feature {feature}"
            );
        }
    }
    assert!(!report.omitted.is_empty());
}

#[test_case("10.0.0.0/31", Some(Ipv4Addr::new(10, 0, 0, 1)); "slash31 low")]
#[test_case("10.0.0.1/31", Some(Ipv4Addr::new(10, 0, 0, 0)); "slash31 high")]
#[test_case("10.0.0.1/30", Some(Ipv4Addr::new(10, 0, 0, 2)); "slash30 first host")]
#[test_case("10.0.0.2/30", Some(Ipv4Addr::new(10, 0, 0, 1)); "slash30 second host")]
#[test_case("10.0.0.1/29", None; "slash29 needs explicit neighbor")]
#[test_case("10.0.0.0/30", None; "slash30 network address")]
fn neighbor_derivation(local: &str, expected: Option<Ipv4Addr>) {
    let result = derive_neighbor(local.parse().unwrap());
    match expected {
        Some(addr) => assert_eq!(result.unwrap(), addr),
        None => assert!(result.is_err()),
    }
}
