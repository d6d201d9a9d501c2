use anyhow::{Context, Result};
use clap::Parser;

use chainhawk_core::config::chainhawk_home;
use chainhawk_core::ChainhawkConfig;

#[derive(Parser, Debug)]
#[command(about = "Print the effective configuration")]
pub struct ConfigCmd {}

impl ConfigCmd {
    pub fn execute(&self, config: &ChainhawkConfig, json_output: bool) -> Result<()> {
        if json_output {
            println!(
                "{}",
                serde_json::to_string_pretty(config).context("serialize config")?
            );
        } else {
            println!("# chainhawk home: {}", chainhawk_home().display());
            print!("{}", serde_yaml::to_string(config).context("serialize config")?);
        }
        Ok(())
    }
}
