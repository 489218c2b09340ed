//! Port-channel commands

use super::{run_op, Ctx};
use clap::Subcommand;
use netforge_common::Result;
use netforge_ops::PortChannelParams;

#[derive(Subcommand)]
pub enum LagCommands {
    /// Create a port-channel
    Create {
        /// Name, e.g. PortChannel100
        name: String,

        /// Member interfaces (comma-separated)
        #[arg(long, value_delimiter = ',')]
        members: Vec<String>,

        /// Minimum links for the bundle to come up
        #[arg(long, default_value_t = 1)]
        min_links: u32,

        /// LACP fast rate
        #[arg(long)]
        fast_rate: bool,

        /// MTU (defaults to the fabric-wide setting)
        #[arg(long)]
        mtu: Option<u32>,
    },

    /// Delete a port-channel
    Delete {
        /// Name
        name: String,
    },

    /// Add a member interface
    AddMember {
        /// Port-channel name
        name: String,

        /// Interface to add
        member: String,
    },

    /// Remove a member interface
    RemoveMember {
        /// Port-channel name
        name: String,

        /// Interface to remove
        member: String,
    },
}

pub async fn execute(cmd: LagCommands, ctx: &Ctx) -> Result<()> {
    match cmd {
        LagCommands::Create {
            name,
            members,
            min_links,
            fast_rate,
            mtu,
        } => {
            let params = PortChannelParams {
                members,
                min_links,
                fast_rate,
                mtu,
            };
            run_op(ctx, None, Some(name.clone()), move |device| {
                netforge_ops::create_port_channel(device, &name, &params)
            })
            .await
        }
        LagCommands::Delete { name } => {
            run_op(ctx, None, Some(name.clone()), move |device| {
                netforge_ops::delete_port_channel(device, &name)
            })
            .await
        }
        LagCommands::AddMember { name, member } => {
            run_op(ctx, None, Some(member.clone()), move |device| {
                netforge_ops::add_port_channel_member(device, &name, &member)
            })
            .await
        }
        LagCommands::RemoveMember { name, member } => {
            run_op(ctx, None, Some(member.clone()), move |device| {
                netforge_ops::remove_port_channel_member(device, &name, &member)
            })
            .await
        }
    }
}
