//! Provision command

use super::Ctx;
use crate::output;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use netforge_common::composite::CompositeMode;
use netforge_common::Result;
use netforge_provision::provision_device;
use serde::Serialize;
use std::time::Duration;

#[derive(Args)]
pub struct ProvisionArgs {
    /// Layer the composite over the live config instead of replacing it
    #[arg(long)]
    merge: bool,
}

#[derive(Serialize)]
struct JsonOutcome<'a> {
    changes: &'a netforge_common::ChangeSet,
    report: &'a netforge_provision::ApplyReport,
    provision: &'a netforge_provision::ProvisionReport,
}

pub async fn execute(args: ProvisionArgs, ctx: &Ctx) -> Result<()> {
    let mode = if args.merge {
        CompositeMode::Merge
    } else {
        CompositeMode::Overwrite
    };

    let mut device = ctx.connect().await?;
    let options = ctx.delivery_options();

    let spinner = if ctx.execute && !ctx.json {
        let bar = ProgressBar::new_spinner().with_message(format!("provisioning {}", device.name));
        bar.set_style(ProgressStyle::default_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        Some(bar)
    } else {
        None
    };

    let result = provision_device(&mut device, mode, &options).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let (set, report, provision_report) = result?;

    if ctx.json {
        output::print_json(&JsonOutcome {
            changes: &set,
            report: &report,
            provision: &provision_report,
        });
        return Ok(());
    }

    print!("{}", set.preview());
    for omitted in &provision_report.omitted {
        output::print_warning(&format!(
            "platform lacks {}: omitted {}|{}",
            omitted.feature, omitted.table, omitted.key
        ));
    }
    println!(
        "composite: {} entries, hash {}",
        provision_report.entries,
        &provision_report.content_hash[..12]
    );
    output::print_apply_report(&report);
    Ok(())
}
