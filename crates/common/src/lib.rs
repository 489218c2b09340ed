//! netforge common library
//!
//! Shared foundation for the netforge configuration engine: the ConfigDB
//! schema, the ChangeSet and CompositeConfig deltas, the error taxonomy,
//! and the audit/permission collaborator boundaries.

pub mod audit;
pub mod changeset;
pub mod composite;
pub mod configdb;
pub mod error;
pub mod feature;
pub mod permissions;

pub use changeset::{Change, ChangeKind, ChangeSet};
pub use composite::{CompositeConfig, CompositeMode};
pub use configdb::{ConfigDbSnapshot, FieldValues, Table};
pub use error::{Error, Result};
pub use feature::Feature;
pub use permissions::{Permission, PermissionContext};

/// netforge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
