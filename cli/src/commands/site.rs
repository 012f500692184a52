use anyhow::{bail, Context, Result};
use clap::Args;
use directory::{token_provider_from_env, GraphSiteAdminClient, SitePermissionLevel};
use provisioning::{
    grant_site_permission, resolve_target, ItemStatus, SiteGrantPlan, SiteLocator, StateStore,
};
use std::path::PathBuf;
use tracing::info;

use super::VerifyArgs;
use crate::output::print_report;
use crate::utils::endpoints::Endpoints;
use crate::utils::env_paths::ProvisioningPaths;

#[derive(Args, Debug)]
pub struct SiteArgs {
    /// Site URL, e.g. https://contoso.sharepoint.com/sites/calendar
    #[arg(long)]
    pub site_url: String,

    /// Permission level (read, write, fullcontrol)
    #[arg(long, default_value = "write")]
    pub permission: SitePermissionLevel,

    /// Application (client) id; defaults to the one in the state file
    #[arg(long)]
    pub app_id: Option<String>,

    /// Display name recorded on the grant (defaults to the stored one)
    #[arg(long)]
    pub display_name: Option<String>,

    /// Provisioning state file to read
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    #[command(flatten)]
    pub verify: VerifyArgs,

    /// Exit non-zero when the grant failed
    #[arg(long)]
    pub strict: bool,

    /// Output format (json, text)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

/// Execute the site grant stage
pub async fn execute(args: SiteArgs) -> Result<()> {
    // Reject a bad URL before the state file or any service is touched
    SiteLocator::parse(&args.site_url)?;

    let paths = ProvisioningPaths::load()?.with_overrides(args.state_file, None, None);
    let store = StateStore::new(paths.state_file);
    let target = resolve_target(args.app_id.as_deref(), &store)?;
    let plan = SiteGrantPlan::new(&args.site_url, args.permission, target, args.display_name)?;
    let admin_endpoint = plan.admin_endpoint()?;
    let endpoints = Endpoints::from_env();

    info!(admin = %admin_endpoint, site = %plan.site, "Connecting to SharePoint admin");
    let sites = GraphSiteAdminClient::connect(
        &admin_endpoint,
        &endpoints.graph,
        token_provider_from_env(&endpoints.login),
    )
    .await
    .with_context(|| format!("Failed to open an admin session on {}", admin_endpoint))?;

    let report = grant_site_permission(&sites, &plan, args.verify.policy()).await;
    sites.close();
    let report = report?;

    print_report(&report, &args.format)?;

    if args.strict && report.has_failures() {
        bail!(
            "site grant failed for {} ({} failure(s))",
            plan.site,
            report.count(ItemStatus::Failed)
        );
    }
    Ok(())
}
