//! Baseline commands

use super::{run_op, Ctx};
use clap::Subcommand;
use netforge_common::{Error, Result};
use std::collections::BTreeMap;

#[derive(Subcommand)]
pub enum BaselineCommands {
    /// Render a configlet against this device and apply the delta
    Apply {
        /// Configlet name
        configlet: String,

        /// Template variables as key=value
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// List configlets and the variables they take
    List,
}

fn parse_vars(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::validation(format!("expected KEY=VALUE, got {:?}", pair)))?;
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

pub async fn execute(cmd: BaselineCommands, ctx: &Ctx) -> Result<()> {
    match cmd {
        BaselineCommands::Apply { configlet, vars } => {
            let vars = parse_vars(&vars)?;
            run_op(ctx, None, Some(configlet.clone()), move |device| {
                netforge_ops::apply_baseline(device, &configlet, &vars)
            })
            .await
        }
        BaselineCommands::List => {
            let network = ctx.fabric.network();
            if ctx.json {
                let listing: BTreeMap<&String, Vec<String>> = network
                    .configlets
                    .iter()
                    .map(|(name, c)| (name, c.variables().into_iter().collect()))
                    .collect();
                crate::output::print_json(&listing);
            } else {
                for (name, configlet) in &network.configlets {
                    let vars: Vec<String> = configlet.variables().into_iter().collect();
                    println!("{}  [{}]", name, vars.join(", "));
                }
            }
            Ok(())
        }
    }
}
