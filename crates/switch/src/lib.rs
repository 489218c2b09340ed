//! netforge switch access
//!
//! The connection to one switch: SSH-tunnelled key/value store access, the
//! device-scoped advisory lock, and the `Device` aggregate holding the
//! live snapshot with its cached views.

pub mod client;
pub mod device;
pub mod lock;
pub mod ssh;
pub mod stub;

pub use client::{LockToken, SshSwitchClient, SwitchClient, SwitchTimeouts};
pub use device::{l3_table_for, Device, Fabric};
pub use lock::{acquire, owner_fingerprint, LockConfig};
pub use stub::{RecordedWrite, StubSwitch};
