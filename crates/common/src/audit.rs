//! Audit stream boundary
//!
//! The core emits one structured event per mutating invocation; the sink is
//! an external collaborator registered at process start. Tests inject a
//! recording double.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One mutating invocation, as seen by the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub device: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub success: bool,
    pub dry_run: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(device: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user: whoami(),
            device: device.into(),
            operation: operation.into(),
            service: None,
            interface: None,
            success: false,
            dry_run: true,
            duration_ms: 0,
            error: None,
        }
    }
}

/// Invoking user, for the audit trail and lock owner fingerprints.
pub fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// External audit sink.
pub trait AuditSink: Send + Sync {
    fn log(&self, event: &AuditEvent);
}

/// Default sink: events land on the tracing stream as structured records.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log(&self, event: &AuditEvent) {
        tracing::info!(
            target: "audit",
            device = %event.device,
            operation = %event.operation,
            user = %event.user,
            success = event.success,
            dry_run = event.dry_run,
            duration_ms = event.duration_ms,
            error = event.error.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Recording sink for tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

static SINK: Lazy<RwLock<Arc<dyn AuditSink>>> =
    Lazy::new(|| RwLock::new(Arc::new(TracingAuditSink)));

/// Install the process-wide audit sink.
pub fn init_audit(sink: Arc<dyn AuditSink>) {
    *SINK.write() = sink;
}

/// Reset to the default sink.
pub fn teardown_audit() {
    *SINK.write() = Arc::new(TracingAuditSink);
}

/// Emit an event to the installed sink.
pub fn emit(event: &AuditEvent) {
    SINK.read().log(event);
}
