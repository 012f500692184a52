use async_trait::async_trait;
use credentials::Passphrase;
use url::Url;

use crate::error::Result;
use crate::types::{
    AppRoleAssignment, Application, CertificateImport, NewAppRoleAssignment, NewApplication,
    ServicePrincipal, SiteGrant, SitePermission, SitePermissionLevel,
};

/// Identity directory operations used by the identity and grant stages.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Id of the tenant the session is signed in to.
    async fn tenant_id(&self) -> Result<String>;

    async fn find_applications_by_name(&self, display_name: &str) -> Result<Vec<Application>>;

    /// Application registration by application (client) id.
    async fn get_application(&self, app_id: &str) -> Result<Option<Application>>;

    async fn create_application(&self, application: &NewApplication) -> Result<Application>;

    async fn find_service_principal(&self, app_id: &str) -> Result<Option<ServicePrincipal>>;

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal>;

    /// Role assignments held by the principal with object id `principal_id`.
    async fn list_app_role_assignments(&self, principal_id: &str) -> Result<Vec<AppRoleAssignment>>;

    async fn create_app_role_assignment(
        &self,
        assignment: &NewAppRoleAssignment,
    ) -> Result<AppRoleAssignment>;
}

/// Resource manager operations on the automation account.
#[async_trait]
pub trait ResourceManagerClient: Send + Sync {
    /// Re-open the `.pfx` at `request.pfx_path` and upload it as an
    /// automation-account certificate.
    async fn import_certificate(
        &self,
        request: &CertificateImport,
        passphrase: &Passphrase,
    ) -> Result<()>;
}

/// Site-scoped permission operations.
#[async_trait]
pub trait SiteAdminClient: Send + Sync {
    /// Add a new permission entry for the application.
    async fn grant_site_permission(&self, grant: &SiteGrant) -> Result<SitePermission>;

    /// Replace the roles of the existing entry `permission_id`.
    async fn update_site_permission(
        &self,
        site_url: &Url,
        permission_id: &str,
        level: SitePermissionLevel,
    ) -> Result<SitePermission>;

    async fn list_site_permissions(&self, site_url: &Url) -> Result<Vec<SitePermission>>;

    /// Permission entries on `site_url` that name `application_id`.
    async fn find_site_permissions(
        &self,
        site_url: &Url,
        application_id: &str,
    ) -> Result<Vec<SitePermission>> {
        Ok(self
            .list_site_permissions(site_url)
            .await?
            .into_iter()
            .filter(|permission| permission.grants_application(application_id))
            .collect())
    }
}
