//! Cleanup command

use super::{run_op, Ctx};
use crate::output;
use clap::{Args, ValueEnum};
use netforge_common::Result;
use netforge_ops::CleanupKind;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Acl,
    Vrf,
    VxlanMap,
}

impl From<KindArg> for CleanupKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Acl => CleanupKind::Acl,
            KindArg::Vrf => CleanupKind::Vrf,
            KindArg::VxlanMap => CleanupKind::VxlanMap,
        }
    }
}

#[derive(Args)]
pub struct CleanupArgs {
    /// Restrict the scan to one orphan class
    #[arg(long)]
    kind: Option<KindArg>,
}

pub async fn execute(args: CleanupArgs, ctx: &Ctx) -> Result<()> {
    let kind = args.kind.map(CleanupKind::from);

    // Report the scan summary up front, then deliver the delete set.
    {
        let device = ctx.connect().await?;
        let (_, summary) = netforge_ops::cleanup(&device, kind)?;
        if ctx.json {
            output::print_json(&summary);
        } else if summary.is_empty() {
            output::print_success("nothing orphaned");
        } else {
            for acl in &summary.orphan_acl_tables {
                println!("orphan acl table: {}", acl);
            }
            for vrf in &summary.orphan_vrfs {
                println!("orphan vrf: {}", vrf);
            }
            for map in &summary.orphan_tunnel_maps {
                println!("orphan tunnel map: {}", map);
            }
        }
    }

    run_op(ctx, None, None, move |device| {
        netforge_ops::cleanup(device, kind).map(|(set, _)| set)
    })
    .await
}
