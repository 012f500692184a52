//! Identity stage: certificate, application registration, certificate import,
//! and the state record the grant stages read.

use chrono::Utc;
use credentials::{
    default_artifact_name, CertificateArtifacts, IdentityMaterial, MaterialSpec, Passphrase,
};
use directory::{
    CertificateImport, DirectoryClient, KeyCredential, NewApplication, ResourceManagerClient,
    SIGN_IN_AUDIENCE_MY_ORG,
};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::catalog::GrantCatalog;
use crate::error::{ProvisioningError, Result};
use crate::report::{Stage, StageReport};
use crate::state::{ProvisioningState, StateStore, STATE_SCHEMA_VERSION};

pub const DEFAULT_DISPLAY_NAME: &str = "Calendar Automation";

#[derive(Debug, Clone)]
pub struct IdentityRequest {
    pub display_name: String,
    /// Defaults to a slug of the display name with a `-cert` suffix.
    pub certificate_name: Option<String>,
    pub automation_account: String,
    pub resource_group: String,
    pub output_dir: PathBuf,
}

impl IdentityRequest {
    pub fn certificate_name(&self) -> String {
        self.certificate_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_artifact_name(&self.display_name))
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("display name", &self.display_name),
            ("automation account", &self.automation_account),
            ("resource group", &self.resource_group),
        ] {
            if value.trim().is_empty() {
                return Err(ProvisioningError::InvalidInput(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// Where the private certificate is imported.
pub enum ImportTarget<'a> {
    Client(&'a dyn ResourceManagerClient),
    /// The resource manager session could not be opened; the reason is
    /// reported and the import is left to the operator.
    Unavailable(String),
}

#[derive(Debug)]
pub struct IdentityOutcome {
    pub report: StageReport,
    pub state: ProvisioningState,
    pub artifacts: CertificateArtifacts,
}

/// Create the certificate and application registration, attempt the
/// certificate import, and persist the provisioning state.
///
/// The import is the only step allowed to fail without aborting; the state
/// is written either way.
pub async fn provision_identity(
    directory: &dyn DirectoryClient,
    import: ImportTarget<'_>,
    store: &StateStore,
    catalog: &GrantCatalog,
    request: &IdentityRequest,
    passphrase: &Passphrase,
) -> Result<IdentityOutcome> {
    request.validate()?;
    catalog.validate()?;
    let certificate_name = request.certificate_name();
    let mut report = StageReport::new(Stage::Identity);

    let tenant_id = directory
        .tenant_id()
        .await
        .map_err(|e| ProvisioningError::remote("Query tenant", e))?;
    info!(tenant_id = %tenant_id, "Connected to directory");

    let existing = directory
        .find_applications_by_name(&request.display_name)
        .await
        .map_err(|e| ProvisioningError::remote("Look up existing applications", e))?;
    if !existing.is_empty() {
        warn!(
            display_name = %request.display_name,
            count = existing.len(),
            "Application name already in use"
        );
        report.warning(
            "Existing registration",
            format!(
                "{} application(s) named '{}' already exist ({}); a new registration is created",
                existing.len(),
                request.display_name,
                existing
                    .iter()
                    .map(|app| app.app_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }

    let spec = MaterialSpec::for_display_name(&request.display_name);
    let material = IdentityMaterial::generate(&spec)?;
    let artifacts = material.export(&request.output_dir, &certificate_name, passphrase)?;
    report.succeeded(format!("Certificate '{}' generated", certificate_name));
    report.succeeded(format!(
        "Certificate files written to {}",
        request.output_dir.display()
    ));

    let key_credential = KeyCredential::asymmetric_x509(
        certificate_name.clone(),
        material.public_base64()?,
        Some(material.custom_key_identifier()?),
        artifacts.not_before,
        artifacts.not_after,
    );
    let application = directory
        .create_application(&NewApplication {
            display_name: request.display_name.clone(),
            sign_in_audience: SIGN_IN_AUDIENCE_MY_ORG.to_string(),
            key_credentials: vec![key_credential],
            required_resource_access: catalog.required_resource_access(),
        })
        .await
        .map_err(|e| ProvisioningError::remote("Create application", e))?;
    report.succeeded(format!(
        "Application '{}' registered with {} requested permissions",
        application.display_name,
        catalog.permission_count()
    ));

    let import_request = CertificateImport {
        automation_account: request.automation_account.clone(),
        resource_group: request.resource_group.clone(),
        certificate_name: certificate_name.clone(),
        pfx_path: artifacts.private_path.clone(),
        exportable: false,
        description: Some(format!("Certificate for {}", request.display_name)),
    };
    let import_failure = match import {
        ImportTarget::Client(client) => client
            .import_certificate(&import_request, passphrase)
            .await
            .err()
            .map(|e| e.to_string()),
        ImportTarget::Unavailable(reason) => Some(reason),
    };
    match import_failure {
        None => report.succeeded(format!(
            "Certificate imported into automation account '{}'",
            request.automation_account
        )),
        Some(reason) => {
            warn!(
                automation_account = %request.automation_account,
                %reason,
                "Certificate import failed"
            );
            report.warning("Certificate import", reason);
            report.follow_up(format!(
                "Import {} into automation account '{}' (resource group '{}') as certificate '{}', not exportable",
                artifacts.private_path.display(),
                request.automation_account,
                request.resource_group,
                certificate_name
            ));
        }
    }

    let state = ProvisioningState {
        schema_version: STATE_SCHEMA_VERSION,
        application_id: application.app_id.clone(),
        object_id: application.id.clone(),
        tenant_id: tenant_id.clone(),
        display_name: application.display_name.clone(),
        certificate_name: certificate_name.clone(),
        certificate_thumbprint: artifacts.thumbprint.clone(),
        execution_environment_name: request.automation_account.clone(),
        execution_environment_resource_group: request.resource_group.clone(),
        created_at: Utc::now(),
    };
    store.save(&state)?;
    report.succeeded(format!("Provisioning state saved to {}", store.path().display()));

    report.fact("Application ID", &state.application_id);
    report.fact("Object ID", &state.object_id);
    report.fact("Tenant ID", &state.tenant_id);
    report.fact("Certificate thumbprint", &state.certificate_thumbprint);
    report.fact("Certificate valid until", artifacts.not_after.to_rfc3339());
    report.fact("Public certificate", artifacts.public_path.display().to_string());
    report.fact("Private certificate", artifacts.private_path.display().to_string());

    report.next_step("Grant the tenant-wide permissions: calprov grant-permissions");
    report.next_step("Grant access to the calendar site: calprov grant-site --site-url <url>");
    report.next_step(format!(
        "Keep {} and its passphrase somewhere safe; it is the identity's private key",
        artifacts.private_path.display()
    ));

    Ok(IdentityOutcome {
        report,
        state,
        artifacts,
    })
}
