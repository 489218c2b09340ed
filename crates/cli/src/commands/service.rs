//! Service commands

use super::{run_op, Ctx};
use clap::Subcommand;
use ipnetwork::Ipv4Network;
use netforge_common::Result;
use netforge_ops::ApplyServiceParams;
use std::net::Ipv4Addr;

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Attach a service to an interface
    Apply {
        /// Interface name
        interface: String,

        /// Service name from the spec
        service: String,

        /// Interface address in CIDR form (L3 services)
        #[arg(long)]
        ip: Option<Ipv4Network>,

        /// Peer AS, when the service requests one
        #[arg(long)]
        peer_as: Option<u32>,

        /// Explicit BGP neighbor address
        #[arg(long)]
        neighbor: Option<Ipv4Addr>,
    },

    /// Detach whatever service an interface carries
    Remove {
        /// Interface name
        interface: String,
    },

    /// Reconcile an interface with the current service definition
    Refresh {
        /// Interface name
        interface: String,
    },
}

pub async fn execute(cmd: ServiceCommands, ctx: &Ctx) -> Result<()> {
    match cmd {
        ServiceCommands::Apply {
            interface,
            service,
            ip,
            peer_as,
            neighbor,
        } => {
            let params = ApplyServiceParams {
                ip,
                peer_as,
                neighbor,
            };
            run_op(
                ctx,
                Some(service.clone()),
                Some(interface.clone()),
                move |device| netforge_ops::apply_service(device, &interface, &service, &params),
            )
            .await
        }
        ServiceCommands::Remove { interface } => {
            run_op(ctx, None, Some(interface.clone()), move |device| {
                netforge_ops::remove_service(device, &interface)
            })
            .await
        }
        ServiceCommands::Refresh { interface } => {
            run_op(ctx, None, Some(interface.clone()), move |device| {
                netforge_ops::refresh_service(device, &interface)
            })
            .await
        }
    }
}
