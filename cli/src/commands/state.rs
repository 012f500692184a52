use anyhow::Result;
use clap::Subcommand;
use colored::*;
use provisioning::{ProvisioningState, StateStore};
use std::path::PathBuf;

use crate::utils::env_paths::ProvisioningPaths;

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Show the record written by the identity stage
    Show {
        /// Provisioning state file to read
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Output format (json, yaml, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

pub async fn execute(action: StateAction) -> Result<()> {
    match action {
        StateAction::Show { state_file, format } => show(state_file, &format),
    }
}

fn show(state_file: Option<PathBuf>, format: &str) -> Result<()> {
    let paths = ProvisioningPaths::load()?.with_overrides(state_file, None, None);
    let store = StateStore::new(paths.state_file);
    let state = store.load()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&state)?),
        "yaml" => print!("{}", serde_yaml::to_string(&state)?),
        _ => print_state_text(&state, store.path().display().to_string()),
    }
    Ok(())
}

fn print_state_text(state: &ProvisioningState, path: String) {
    println!("{}", "Provisioning State".bold());
    println!("{}", "─".repeat(50));
    println!("  {}: {}", "File".cyan(), path);
    println!("  {}: {}", "Schema version".cyan(), state.schema_version);
    println!("  {}: {}", "Display name".cyan(), state.display_name);
    println!("  {}: {}", "Application id".cyan(), state.application_id);
    println!("  {}: {}", "Object id".cyan(), state.object_id);
    println!("  {}: {}", "Tenant id".cyan(), state.tenant_id);
    println!();
    println!("{}", "Certificate".bold());
    println!("{}", "─".repeat(50));
    println!("  {}: {}", "Name".cyan(), state.certificate_name);
    println!("  {}: {}", "Thumbprint".cyan(), state.certificate_thumbprint);
    println!(
        "  {}: {} ({})",
        "Automation account".cyan(),
        state.execution_environment_name,
        state.execution_environment_resource_group
    );
    println!("  {}: {}", "Created".cyan(), state.created_at.to_rfc3339());
}
