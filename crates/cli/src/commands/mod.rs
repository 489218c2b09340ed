//! Command implementations

pub mod baseline;
pub mod cleanup;
pub mod health;
pub mod lag;
pub mod provision;
pub mod service;
pub mod snapshot;
pub mod svi;
pub mod vlan;
pub mod vpn;

use crate::output;
use netforge_common::changeset::ChangeSet;
use netforge_common::Result;
use netforge_provision::{deliver, DeliveryOptions};
use netforge_switch::{Device, Fabric};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Shared state every command receives.
pub struct Ctx {
    pub fabric: Fabric,
    pub device: String,
    pub execute: bool,
    pub save: bool,
    pub json: bool,
}

impl Ctx {
    pub async fn connect(&self) -> Result<Device> {
        self.fabric.connect_device(&self.device).await
    }

    pub fn delivery_options(&self) -> DeliveryOptions {
        let cancel = CancellationToken::new();
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_cancel.cancel();
            }
        });
        DeliveryOptions {
            execute: self.execute,
            save: self.save,
            cancel,
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct JsonOutcome<'a> {
    changes: &'a ChangeSet,
    report: &'a netforge_provision::ApplyReport,
}

/// Connect, deliver the operation, and print the outcome.
///
/// `build` is re-run against the post-lock snapshot when executing, so
/// what gets applied always reflects the device as it is under the lock.
pub async fn run_op<F>(
    ctx: &Ctx,
    service: Option<String>,
    interface: Option<String>,
    build: F,
) -> Result<()>
where
    F: Fn(&Device) -> Result<ChangeSet>,
{
    let mut device = ctx.connect().await?;
    let mut options = ctx.delivery_options();
    options.service = service;
    options.interface = interface;

    let (set, report) = deliver(&mut device, build, &options).await?;

    if ctx.json {
        output::print_json(&JsonOutcome {
            changes: &set,
            report: &report,
        });
    } else {
        print!("{}", set.preview());
        output::print_apply_report(&report);
    }
    Ok(())
}
