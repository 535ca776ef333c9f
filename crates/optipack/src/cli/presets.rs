//! The `optipack presets` command.

use optipack_core::Config;
use serde_json::json;

/// Print the configured size presets as JSON.
pub async fn execute() -> anyhow::Result<()> {
    let config = Config::load()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "presets": config.presets }))?
    );
    Ok(())
}
