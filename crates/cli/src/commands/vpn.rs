//! IP-VPN commands

use super::{run_op, Ctx};
use clap::Subcommand;
use netforge_common::Result;

#[derive(Subcommand)]
pub enum VpnCommands {
    /// Bind an IP-VPN to a VRF
    Bind {
        /// VRF name
        vrf: String,

        /// IP-VPN name from the spec
        ipvpn: String,
    },

    /// Clear a VRF's VPN binding
    Unbind {
        /// VRF name
        vrf: String,
    },
}

pub async fn execute(cmd: VpnCommands, ctx: &Ctx) -> Result<()> {
    match cmd {
        VpnCommands::Bind { vrf, ipvpn } => {
            run_op(ctx, None, Some(vrf.clone()), move |device| {
                netforge_ops::bind_ipvpn(device, &vrf, &ipvpn)
            })
            .await
        }
        VpnCommands::Unbind { vrf } => {
            run_op(ctx, None, Some(vrf.clone()), move |device| {
                netforge_ops::unbind_ipvpn(device, &vrf)
            })
            .await
        }
    }
}
