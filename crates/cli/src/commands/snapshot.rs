//! Snapshot command

use super::Ctx;
use crate::output;
use clap::Args;
use netforge_common::configdb::Table;
use netforge_common::Result;

#[derive(Args)]
pub struct SnapshotArgs {
    /// Restrict the dump to one table
    #[arg(long)]
    table: Option<Table>,
}

pub async fn execute(args: SnapshotArgs, ctx: &Ctx) -> Result<()> {
    let device = ctx.connect().await?;
    let snapshot = device.snapshot();

    if ctx.json {
        match args.table {
            Some(table) => {
                let entries: std::collections::BTreeMap<_, _> = snapshot.table(table).collect();
                output::print_json(&entries);
            }
            None => output::print_json(snapshot),
        }
        return Ok(());
    }

    for (table, key, fields) in snapshot.iter_entries() {
        if args.table.is_some_and(|t| t != table) {
            continue;
        }
        println!("{}|{}", table, key);
        for (name, value) in fields {
            println!("    {} = {}", name, value);
        }
    }
    Ok(())
}
