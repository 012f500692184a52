use anyhow::{Context, Result};
use clap::Args;
use credentials::{Passphrase, MIN_PASSPHRASE_LEN};
use directory::{
    token_provider_from_env, ArmClient, AzureCliTokenProvider, GraphDirectoryClient, TokenProvider,
};
use provisioning::{
    provision_identity, GrantCatalog, IdentityRequest, ImportTarget, StateStore,
    DEFAULT_DISPLAY_NAME,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::output::print_report;
use crate::utils::endpoints::Endpoints;
use crate::utils::env_paths::ProvisioningPaths;

#[derive(Args, Debug)]
pub struct IdentityArgs {
    /// Display name of the application registration
    #[arg(long, default_value = DEFAULT_DISPLAY_NAME)]
    pub display_name: String,

    /// Certificate name (defaults to the display name with a -cert suffix)
    #[arg(long)]
    pub certificate_name: Option<String>,

    /// Automation account that receives the certificate
    #[arg(long, env = "CALPROV_AUTOMATION_ACCOUNT")]
    pub automation_account: String,

    /// Resource group of the automation account
    #[arg(long, env = "CALPROV_RESOURCE_GROUP")]
    pub resource_group: String,

    /// Subscription of the automation account (defaults to the Azure CLI's current one)
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription: Option<String>,

    /// Directory for the .cer and .pfx files
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Passphrase protecting the .pfx file (prompted for if omitted)
    #[arg(long, env = "CALPROV_CERT_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Provisioning state file to write
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// YAML grant catalog (defaults to the built-in permission table)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Output format (json, text)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

/// Execute the identity stage
pub async fn execute(args: IdentityArgs) -> Result<()> {
    // Nothing is generated or contacted until the passphrase is accepted
    let passphrase = read_passphrase(args.passphrase)?;

    let paths =
        ProvisioningPaths::load()?.with_overrides(args.state_file, args.output_dir, args.catalog);
    let catalog = GrantCatalog::load(paths.grant_catalog.as_deref())?;
    let endpoints = Endpoints::from_env();
    let provider = token_provider_from_env(&endpoints.login);

    let graph = GraphDirectoryClient::connect(&endpoints.graph, provider.clone())
        .await
        .context("Failed to connect to Microsoft Graph")?;

    let arm = connect_resource_manager(&endpoints, args.subscription, provider).await;
    let import = match &arm {
        Ok(client) => ImportTarget::Client(client),
        Err(reason) => {
            warn!(%reason, "Resource manager unavailable; certificate import will be skipped");
            ImportTarget::Unavailable(reason.clone())
        }
    };

    let request = IdentityRequest {
        display_name: args.display_name,
        certificate_name: args.certificate_name,
        automation_account: args.automation_account,
        resource_group: args.resource_group,
        output_dir: paths.cert_dir,
    };
    let store = StateStore::new(paths.state_file);
    let outcome =
        provision_identity(&graph, import, &store, &catalog, &request, &passphrase).await;

    graph.close();
    if let Ok(client) = &arm {
        client.close();
    }

    let outcome = outcome?;
    info!(app_id = %outcome.state.application_id, "Identity stage complete");
    print_report(&outcome.report, &args.format)
}

fn read_passphrase(value: Option<String>) -> Result<Passphrase> {
    let raw = match value {
        Some(value) => value,
        None => dialoguer::Password::new()
            .with_prompt(format!(
                "Certificate passphrase (at least {} characters)",
                MIN_PASSPHRASE_LEN
            ))
            .with_confirmation("Confirm passphrase", "Passphrases do not match")
            .interact()
            .context("A certificate passphrase is required; pass --passphrase or set CALPROV_CERT_PASSPHRASE")?,
    };
    Ok(Passphrase::new(raw)?)
}

async fn connect_resource_manager(
    endpoints: &Endpoints,
    subscription: Option<String>,
    provider: Arc<dyn TokenProvider>,
) -> std::result::Result<ArmClient, String> {
    let subscription = match subscription.filter(|s| !s.trim().is_empty()) {
        Some(subscription) => subscription,
        None => AzureCliTokenProvider::current_subscription()
            .await
            .map_err(|e| {
                format!("No subscription given and none selected in the Azure CLI: {}", e)
            })?,
    };
    ArmClient::connect(&endpoints.management, subscription, provider)
        .await
        .map_err(|e| e.to_string())
}
