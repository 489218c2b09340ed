//! VLAN commands

use super::{run_op, Ctx};
use clap::Subcommand;
use netforge_common::Result;

#[derive(Subcommand)]
pub enum VlanCommands {
    /// Create a VLAN
    Create {
        /// VLAN id (1-4094)
        id: u16,

        /// Description
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a VLAN
    Delete {
        /// VLAN id
        id: u16,
    },

    /// Add an interface to a VLAN
    AddMember {
        /// VLAN id
        id: u16,

        /// Interface name
        interface: String,

        /// Tagged membership (default untagged)
        #[arg(long)]
        tagged: bool,
    },

    /// Remove an interface from a VLAN
    RemoveMember {
        /// VLAN id
        id: u16,

        /// Interface name
        interface: String,
    },
}

pub async fn execute(cmd: VlanCommands, ctx: &Ctx) -> Result<()> {
    match cmd {
        VlanCommands::Create { id, name } => {
            run_op(ctx, None, None, move |device| {
                netforge_ops::create_vlan(device, id, name.as_deref())
            })
            .await
        }
        VlanCommands::Delete { id } => {
            run_op(ctx, None, None, move |device| {
                netforge_ops::delete_vlan(device, id)
            })
            .await
        }
        VlanCommands::AddMember {
            id,
            interface,
            tagged,
        } => {
            run_op(ctx, None, Some(interface.clone()), move |device| {
                netforge_ops::add_vlan_member(device, id, &interface, tagged)
            })
            .await
        }
        VlanCommands::RemoveMember { id, interface } => {
            run_op(ctx, None, Some(interface.clone()), move |device| {
                netforge_ops::remove_vlan_member(device, id, &interface)
            })
            .await
        }
    }
}
