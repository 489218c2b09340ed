//! Health command

use super::Ctx;
use crate::output;
use netforge_common::Result;
use netforge_provision::verify_device_health;

pub async fn execute(ctx: &Ctx) -> Result<()> {
    let device = ctx.connect().await?;
    let report = verify_device_health(&device).await?;

    if ctx.json {
        output::print_json(&report);
    } else {
        output::print_health_report(&report);
    }
    Ok(())
}
