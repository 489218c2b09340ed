//! Permission gate boundary
//!
//! Policy evaluation is external; operations only consume the outcome.
//! Every mutating operation names its permission tag and calls
//! [`require`] before emitting any change.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fixed enumeration of permission tags used by operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    VlanCreate,
    VlanModify,
    VlanDelete,
    LagCreate,
    LagModify,
    VrfModify,
    ServiceApply,
    EvpnModify,
    AclModify,
    QosModify,
    BaselineApply,
    DeviceCleanup,
    DeviceProvision,
    SpecAuthor,
}

impl Permission {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Permission::VlanCreate => "VLAN_CREATE",
            Permission::VlanModify => "VLAN_MODIFY",
            Permission::VlanDelete => "VLAN_DELETE",
            Permission::LagCreate => "LAG_CREATE",
            Permission::LagModify => "LAG_MODIFY",
            Permission::VrfModify => "VRF_MODIFY",
            Permission::ServiceApply => "SERVICE_APPLY",
            Permission::EvpnModify => "EVPN_MODIFY",
            Permission::AclModify => "ACL_MODIFY",
            Permission::QosModify => "QOS_MODIFY",
            Permission::BaselineApply => "BASELINE_APPLY",
            Permission::DeviceCleanup => "DEVICE_CLEANUP",
            Permission::DeviceProvision => "DEVICE_PROVISION",
            Permission::SpecAuthor => "SPEC_AUTHOR",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the permission is being checked against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl PermissionContext {
    pub fn device(device: impl Into<String>) -> Self {
        Self {
            device: Some(device.into()),
            ..Default::default()
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// External policy evaluator.
pub trait PermissionChecker: Send + Sync {
    fn check(&self, permission: Permission, context: &PermissionContext) -> bool;
}

/// Default checker: everything allowed. Deployments install a real one.
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn check(&self, _permission: Permission, _context: &PermissionContext) -> bool {
        true
    }
}

/// Denying checker for tests.
pub struct DenyAll;

impl PermissionChecker for DenyAll {
    fn check(&self, _permission: Permission, _context: &PermissionContext) -> bool {
        false
    }
}

static CHECKER: Lazy<RwLock<Arc<dyn PermissionChecker>>> =
    Lazy::new(|| RwLock::new(Arc::new(AllowAll)));

/// Install the process-wide permission checker.
pub fn init_permissions(checker: Arc<dyn PermissionChecker>) {
    *CHECKER.write() = checker;
}

/// Reset to the default allow-all checker.
pub fn teardown_permissions() {
    *CHECKER.write() = Arc::new(AllowAll);
}

/// Check a permission, turning a refusal into [`Error::PermissionDenied`].
pub fn require(permission: Permission, context: &PermissionContext) -> Result<()> {
    if CHECKER.read().check(permission, context) {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "{} on {}",
            permission,
            context.device.as_deref().unwrap_or("<none>")
        )))
    }
}
