use alb_monitor_core::controller::{ContractError, ControllerSettings};
use anyhow::Context;

/// Validates the controller environment and renders it as pretty JSON.
pub fn render_settings(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<String> {
    render(ControllerSettings::from_lookup(lookup))
}

pub fn run() -> anyhow::Result<String> {
    render(ControllerSettings::from_env())
}

fn render(settings: Result<ControllerSettings, ContractError>) -> anyhow::Result<String> {
    let settings = settings.context("invalid controller environment")?;
    Ok(serde_json::to_string_pretty(&settings)?)
}
