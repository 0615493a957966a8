//! Print the effective simulation configuration.

use crate::scenario::SimulationConfig;
use anyhow::Result;
use std::path::Path;

pub fn show_config(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = SimulationConfig::load(config_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}
