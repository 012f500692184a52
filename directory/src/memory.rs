//! In-memory tenant implementing every client trait, used as the test double
//! for the provisioning stages.
//!
//! Behaves like the live services for the parts the pipeline depends on.
//! Duplicate role assignments are rejected with the directory's "already
//! exists" message and certificate imports re-open the PFX with the supplied
//! passphrase. Site grants add a new entry while updates change an existing
//! entry's roles. Faults can be injected per operation.

use async_trait::async_trait;
use credentials::{IdentityMaterial, Passphrase};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;
use uuid::Uuid;

use crate::clients::{DirectoryClient, ResourceManagerClient, SiteAdminClient};
use crate::error::{ClientError, Result};
use crate::types::{
    AppRoleAssignment, Application, CertificateImport, GrantedApplication, KeyCredential,
    NewAppRoleAssignment, NewApplication, ServicePrincipal, SiteGrant, SitePermission,
    SitePermissionLevel, EXCHANGE_ONLINE_APP_ID, MICROSOFT_GRAPH_APP_ID,
};

const GRAPH: &str = "Microsoft Graph";
const ARM: &str = "Azure Resource Manager";
const SHAREPOINT: &str = "SharePoint";

/// A certificate accepted by [`InMemoryTenant::import_certificate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCertificate {
    pub automation_account: String,
    pub resource_group: String,
    pub certificate_name: String,
    pub thumbprint: String,
    pub exportable: bool,
}

#[derive(Default)]
struct TenantState {
    applications: Vec<Application>,
    key_credentials: HashMap<String, Vec<KeyCredential>>,
    service_principals: Vec<ServicePrincipal>,
    assignments: Vec<AppRoleAssignment>,
    certificates: Vec<ImportedCertificate>,
    site_permissions: HashMap<String, Vec<SitePermission>>,
    site_grant_calls: usize,
    site_update_calls: usize,
    failing_site_listings: usize,
    failing_app_roles: HashSet<String>,
    certificate_import_error: Option<String>,
    site_grant_error: Option<String>,
    hide_site_permissions: bool,
}

pub struct InMemoryTenant {
    tenant_id: String,
    state: Mutex<TenantState>,
}

impl InMemoryTenant {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            state: Mutex::new(TenantState::default()),
        }
    }

    /// Add the service principal of a first-party resource such as Graph.
    pub fn with_resource(self, app_id: &str, display_name: &str) -> Self {
        self.state().service_principals.push(ServicePrincipal {
            id: Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            display_name: display_name.to_string(),
        });
        self
    }

    /// Tenant with the Microsoft Graph and Exchange Online resources present.
    pub fn with_standard_resources(tenant_id: impl Into<String>) -> Self {
        Self::new(tenant_id)
            .with_resource(MICROSOFT_GRAPH_APP_ID, "Microsoft Graph")
            .with_resource(EXCHANGE_ONLINE_APP_ID, "Office 365 Exchange Online")
    }

    /// Reject any assignment of `app_role_id` with an authorization error.
    pub fn fail_app_role(&self, app_role_id: &str) {
        self.state()
            .failing_app_roles
            .insert(app_role_id.to_ascii_lowercase());
    }

    pub fn fail_certificate_import(&self, message: &str) {
        self.state().certificate_import_error = Some(message.to_string());
    }

    /// Make the next site permission listing fail with a 503.
    pub fn fail_next_site_listing(&self) {
        self.state().failing_site_listings += 1;
    }

    /// Make site grants and updates fail with `message` (status 400).
    pub fn fail_site_grant(&self, message: &str) {
        self.state().site_grant_error = Some(message.to_string());
    }

    /// Site permission listings return nothing, as if not yet propagated.
    pub fn hide_site_permissions(&self) {
        self.state().hide_site_permissions = true;
    }

    pub fn applications(&self) -> Vec<Application> {
        self.state().applications.clone()
    }

    pub fn key_credentials(&self, app_id: &str) -> Vec<KeyCredential> {
        self.state()
            .key_credentials
            .get(app_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn service_principal(&self, app_id: &str) -> Option<ServicePrincipal> {
        self.state()
            .service_principals
            .iter()
            .find(|sp| sp.app_id.eq_ignore_ascii_case(app_id))
            .cloned()
    }

    pub fn app_role_assignments(&self) -> Vec<AppRoleAssignment> {
        self.state().assignments.clone()
    }

    pub fn imported_certificates(&self) -> Vec<ImportedCertificate> {
        self.state().certificates.clone()
    }

    pub fn site_permissions(&self, site_url: &Url) -> Vec<SitePermission> {
        self.state()
            .site_permissions
            .get(&site_key(site_url))
            .cloned()
            .unwrap_or_default()
    }

    pub fn site_grant_calls(&self) -> usize {
        self.state().site_grant_calls
    }

    pub fn site_update_calls(&self) -> usize {
        self.state().site_update_calls
    }

    fn state(&self) -> MutexGuard<'_, TenantState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn site_key(site_url: &Url) -> String {
    site_url.as_str().trim_end_matches('/').to_ascii_lowercase()
}

#[async_trait]
impl DirectoryClient for InMemoryTenant {
    async fn tenant_id(&self) -> Result<String> {
        Ok(self.tenant_id.clone())
    }

    async fn find_applications_by_name(&self, display_name: &str) -> Result<Vec<Application>> {
        Ok(self
            .state()
            .applications
            .iter()
            .filter(|app| app.display_name == display_name)
            .cloned()
            .collect())
    }

    async fn get_application(&self, app_id: &str) -> Result<Option<Application>> {
        Ok(self
            .state()
            .applications
            .iter()
            .find(|app| app.app_id.eq_ignore_ascii_case(app_id))
            .cloned())
    }

    async fn create_application(&self, application: &NewApplication) -> Result<Application> {
        if application.display_name.trim().is_empty() {
            return Err(ClientError::Api {
                service: GRAPH,
                status: 400,
                message: "Request_BadRequest: displayName is required".to_string(),
            });
        }

        let created = Application {
            id: Uuid::new_v4().to_string(),
            app_id: Uuid::new_v4().to_string(),
            display_name: application.display_name.clone(),
            required_resource_access: application.required_resource_access.clone(),
        };
        let mut state = self.state();
        state
            .key_credentials
            .insert(created.app_id.clone(), application.key_credentials.clone());
        state.applications.push(created.clone());
        Ok(created)
    }

    async fn find_service_principal(&self, app_id: &str) -> Result<Option<ServicePrincipal>> {
        Ok(self.service_principal(app_id))
    }

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal> {
        let mut state = self.state();
        if state
            .service_principals
            .iter()
            .any(|sp| sp.app_id.eq_ignore_ascii_case(app_id))
        {
            return Err(ClientError::Api {
                service: GRAPH,
                status: 409,
                message: "Request_MultipleObjectsWithSameKeyValue: service principal already exists"
                    .to_string(),
            });
        }
        let display_name = state
            .applications
            .iter()
            .find(|app| app.app_id.eq_ignore_ascii_case(app_id))
            .map(|app| app.display_name.clone())
            .ok_or_else(|| ClientError::Api {
                service: GRAPH,
                status: 400,
                message: format!("Request_BadRequest: no application with appId '{}'", app_id),
            })?;

        let created = ServicePrincipal {
            id: Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            display_name,
        };
        state.service_principals.push(created.clone());
        Ok(created)
    }

    async fn list_app_role_assignments(
        &self,
        principal_id: &str,
    ) -> Result<Vec<AppRoleAssignment>> {
        Ok(self
            .state()
            .assignments
            .iter()
            .filter(|a| a.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn create_app_role_assignment(
        &self,
        assignment: &NewAppRoleAssignment,
    ) -> Result<AppRoleAssignment> {
        let mut state = self.state();
        if state
            .failing_app_roles
            .contains(&assignment.app_role_id.to_ascii_lowercase())
        {
            return Err(ClientError::Api {
                service: GRAPH,
                status: 403,
                message: "Authorization_RequestDenied: Insufficient privileges to complete the operation."
                    .to_string(),
            });
        }
        if state.assignments.iter().any(|a| {
            a.principal_id == assignment.principal_id
                && a.matches(&assignment.resource_id, &assignment.app_role_id)
        }) {
            return Err(ClientError::Api {
                service: GRAPH,
                status: 400,
                message: "Request_BadRequest: Permission being assigned already exists on the object"
                    .to_string(),
            });
        }

        let resource_display_name = state
            .service_principals
            .iter()
            .find(|sp| sp.id == assignment.resource_id)
            .map(|sp| sp.display_name.clone());
        let created = AppRoleAssignment {
            id: Uuid::new_v4().to_string(),
            principal_id: assignment.principal_id.clone(),
            resource_id: assignment.resource_id.clone(),
            app_role_id: assignment.app_role_id.clone(),
            resource_display_name,
        };
        state.assignments.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl ResourceManagerClient for InMemoryTenant {
    async fn import_certificate(
        &self,
        request: &CertificateImport,
        passphrase: &Passphrase,
    ) -> Result<()> {
        if let Some(message) = self.state().certificate_import_error.clone() {
            return Err(ClientError::Api {
                service: ARM,
                status: 404,
                message,
            });
        }

        let material = IdentityMaterial::from_pfx(&request.pfx_path, passphrase)?;
        let thumbprint = material.thumbprint()?;
        self.state().certificates.push(ImportedCertificate {
            automation_account: request.automation_account.clone(),
            resource_group: request.resource_group.clone(),
            certificate_name: request.certificate_name.clone(),
            thumbprint,
            exportable: request.exportable,
        });
        Ok(())
    }
}

#[async_trait]
impl SiteAdminClient for InMemoryTenant {
    async fn grant_site_permission(&self, grant: &SiteGrant) -> Result<SitePermission> {
        let mut state = self.state();
        state.site_grant_calls += 1;
        if let Some(message) = state.site_grant_error.clone() {
            return Err(ClientError::Api {
                service: SHAREPOINT,
                status: 400,
                message,
            });
        }

        let created = SitePermission {
            id: Uuid::new_v4().to_string(),
            roles: vec![grant.level.graph_role().to_string()],
            applications: vec![GrantedApplication {
                id: grant.application_id.clone(),
                display_name: Some(grant.display_name.clone()),
            }],
        };
        state
            .site_permissions
            .entry(site_key(&grant.site_url))
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_site_permission(
        &self,
        site_url: &Url,
        permission_id: &str,
        level: SitePermissionLevel,
    ) -> Result<SitePermission> {
        let mut state = self.state();
        state.site_update_calls += 1;
        if let Some(message) = state.site_grant_error.clone() {
            return Err(ClientError::Api {
                service: SHAREPOINT,
                status: 400,
                message,
            });
        }

        let existing = state
            .site_permissions
            .get_mut(&site_key(site_url))
            .and_then(|entries| entries.iter_mut().find(|p| p.id == permission_id))
            .ok_or_else(|| ClientError::Api {
                service: GRAPH,
                status: 404,
                message: format!("itemNotFound: permission {} does not exist", permission_id),
            })?;
        existing.roles = vec![level.graph_role().to_string()];
        Ok(existing.clone())
    }

    async fn list_site_permissions(&self, site_url: &Url) -> Result<Vec<SitePermission>> {
        let mut state = self.state();
        if state.failing_site_listings > 0 {
            state.failing_site_listings -= 1;
            return Err(ClientError::Api {
                service: GRAPH,
                status: 503,
                message: "serviceNotAvailable: try again later".to_string(),
            });
        }
        if state.hide_site_permissions {
            return Ok(Vec::new());
        }
        Ok(state
            .site_permissions
            .get(&site_key(site_url))
            .cloned()
            .unwrap_or_default())
    }
}
