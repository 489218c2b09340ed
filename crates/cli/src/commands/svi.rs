//! SVI commands

use super::{run_op, Ctx};
use clap::Subcommand;
use ipnetwork::Ipv4Network;
use netforge_common::Result;
use netforge_ops::SviParams;

#[derive(Subcommand)]
pub enum SviCommands {
    /// Configure the L3 interface of a VLAN
    Configure {
        /// VLAN id
        id: u16,

        /// VRF to bind the SVI into
        #[arg(long)]
        vrf: Option<String>,

        /// SVI address in CIDR form
        #[arg(long)]
        ip: Option<Ipv4Network>,

        /// Anycast gateway MAC
        #[arg(long)]
        anycast_mac: Option<String>,
    },
}

pub async fn execute(cmd: SviCommands, ctx: &Ctx) -> Result<()> {
    match cmd {
        SviCommands::Configure {
            id,
            vrf,
            ip,
            anycast_mac,
        } => {
            let params = SviParams {
                vrf,
                ip,
                anycast_mac,
            };
            run_op(ctx, None, Some(format!("Vlan{id}")), move |device| {
                netforge_ops::configure_svi(device, id, &params)
            })
            .await
        }
    }
}
