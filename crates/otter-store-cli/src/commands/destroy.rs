//! Destroy command - delete a store's files.

use anyhow::{Result, anyhow};
use clap::Args;
use otter_store::{StoreConfig, store_context};

use crate::config::Config;

#[derive(Args)]
pub struct DestroyCommand {
    /// Store name, relative to the base directory
    pub name: String,
}

impl DestroyCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        destroy(&config.store, &self.name)?;
        println!("Destroyed {}", self.name);
        Ok(())
    }
}

fn destroy(config: &StoreConfig, name: &str) -> Result<()> {
    // The default store must not be held open while its files go away
    let config = StoreConfig {
        default_store: None,
        ..config.clone()
    };
    let ctx = store_context(config)?;
    ctx.call("destroy", vec![name.into()])
        .map_err(|e| anyhow!(e).context(format!("Failed to destroy {name}")))?;
    Ok(())
}
