//! Switch lock acquisition
//!
//! The advisory lock itself lives on the switch (a well-known STATE_DB key
//! with a TTL); this module adds the retry policy and the owner
//! fingerprint.

use crate::client::{LockToken, SwitchClient};
use netforge_common::{Error, Result};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Retry policy for lock acquisition.
#[derive(Debug, Clone)]
pub struct LockConfig {
    pub ttl: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            max_attempts: 6,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Identify this invocation to other operators: `user@host#pid`.
pub fn owner_fingerprint() -> String {
    let user = netforge_common::audit::whoami();
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}:{}", user, host, std::process::id())
}

/// Acquire the device lock with bounded exponential backoff and jitter.
///
/// Only [`Error::LockBusy`] is retried; transport failures surface
/// immediately. Cancellation aborts the wait.
pub async fn acquire(
    client: &dyn SwitchClient,
    config: &LockConfig,
    cancel: &CancellationToken,
) -> Result<LockToken> {
    let owner = owner_fingerprint();
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match client.lock_device(config.ttl, &owner).await {
            Ok(token) => {
                info!(owner = %owner, "switch lock acquired");
                return Ok(token);
            }
            Err(Error::LockBusy { device, owner: holder }) => {
                attempt += 1;
                if attempt >= config.max_attempts {
                    return Err(Error::LockBusy {
                        device,
                        owner: holder,
                    });
                }
                let exp = config
                    .base_delay
                    .saturating_mul(1u32 << attempt.min(16))
                    .min(config.max_delay);
                let jitter = rand::thread_rng().gen_range(0..=exp.as_millis() as u64 / 2);
                let delay = exp + Duration::from_millis(jitter);
                debug!(
                    holder = %holder,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "switch lock busy, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubSwitch;
    use std::sync::Arc;

    #[tokio::test]
    async fn acquire_succeeds_on_a_free_switch() {
        let stub = Arc::new(StubSwitch::new());
        let token = acquire(
            stub.as_ref(),
            &LockConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(stub.locked_by().unwrap(), token.owner);
    }

    #[tokio::test]
    async fn acquire_gives_up_after_bounded_attempts() {
        let stub = Arc::new(StubSwitch::new());
        let _held = stub
            .lock_device(Duration::from_secs(60), "someone-else")
            .await
            .unwrap();

        let config = LockConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..Default::default()
        };
        let err = acquire(stub.as_ref(), &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockBusy { .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let stub = Arc::new(StubSwitch::new());
        let _held = stub
            .lock_device(Duration::from_secs(60), "someone-else")
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = acquire(stub.as_ref(), &LockConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
