use anyhow::{bail, Context, Result};
use clap::Args;
use directory::{token_provider_from_env, GraphDirectoryClient};
use provisioning::{
    grant_tenant_permissions, resolve_target, GrantCatalog, ItemStatus, StateStore,
    TenantGrantRequest,
};
use std::path::PathBuf;

use super::VerifyArgs;
use crate::output::print_report;
use crate::utils::endpoints::Endpoints;
use crate::utils::env_paths::ProvisioningPaths;

#[derive(Args, Debug)]
pub struct PermissionArgs {
    /// Application (client) id; defaults to the one in the state file
    #[arg(long)]
    pub app_id: Option<String>,

    /// Provisioning state file to read
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// YAML grant catalog (defaults to the built-in permission table)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    #[command(flatten)]
    pub verify: VerifyArgs,

    /// Exit non-zero when any permission could not be granted
    #[arg(long)]
    pub strict: bool,

    /// Output format (json, text)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

/// Execute the tenant-wide grant stage
pub async fn execute(args: PermissionArgs) -> Result<()> {
    let paths = ProvisioningPaths::load()?.with_overrides(args.state_file, None, args.catalog);
    let store = StateStore::new(paths.state_file);
    let target = resolve_target(args.app_id.as_deref(), &store)?;
    let catalog = GrantCatalog::load(paths.grant_catalog.as_deref())?;
    let endpoints = Endpoints::from_env();

    let graph = GraphDirectoryClient::connect(
        &endpoints.graph,
        token_provider_from_env(&endpoints.login),
    )
    .await
    .context("Failed to connect to Microsoft Graph")?;

    let request = TenantGrantRequest {
        target,
        login_base: endpoints.login,
        verify: args.verify.policy(),
    };
    let report = grant_tenant_permissions(&graph, &catalog, &request).await;
    graph.close();
    let report = report?;

    print_report(&report, &args.format)?;

    if args.strict && report.has_failures() {
        bail!(
            "{} permission(s) could not be granted",
            report.count(ItemStatus::Failed)
        );
    }
    Ok(())
}
