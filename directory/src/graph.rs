//! Microsoft Graph implementation of [`DirectoryClient`].

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::DirectoryClient;
use crate::error::{ClientError, Result};
use crate::http::{get_all, odata_literal, send_json};
use crate::session::{Session, TokenProvider};
use crate::types::{
    AppRoleAssignment, Application, NewAppRoleAssignment, NewApplication, ServicePrincipal,
};

pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com";

const SERVICE: &str = "Microsoft Graph";

pub struct GraphDirectoryClient {
    http: reqwest::Client,
    base: String,
    session: Session,
}

impl GraphDirectoryClient {
    /// Open a Graph session. The token audience is `base_url` itself.
    pub async fn connect(base_url: &str, provider: Arc<dyn TokenProvider>) -> Result<Self> {
        let base = base_url.trim_end_matches('/').to_string();
        let session = Session::open(SERVICE, base.clone(), provider).await?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            session,
        })
    }

    pub fn close(&self) {
        self.session.close();
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1.0/{}", self.base, path)
    }

    async fn first_by_app_id<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        app_id: &str,
    ) -> Result<Option<T>> {
        let filter = format!("appId eq {}", odata_literal(app_id));
        let mut found: Vec<T> =
            get_all(&self.session, &self.http, &self.url(collection), &[("$filter", filter)])
                .await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }
}

#[async_trait]
impl DirectoryClient for GraphDirectoryClient {
    async fn tenant_id(&self) -> Result<String> {
        let organizations: Vec<Value> = get_all(
            &self.session,
            &self.http,
            &self.url("organization"),
            &[("$select", "id".to_string())],
        )
        .await?;
        organizations
            .first()
            .and_then(|org| org["id"].as_str())
            .map(str::to_string)
            .ok_or_else(|| ClientError::UnexpectedResponse {
                service: SERVICE,
                reason: "organization query returned no tenant id".to_string(),
            })
    }

    async fn find_applications_by_name(&self, display_name: &str) -> Result<Vec<Application>> {
        let filter = format!("displayName eq {}", odata_literal(display_name));
        get_all(&self.session, &self.http, &self.url("applications"), &[("$filter", filter)]).await
    }

    async fn get_application(&self, app_id: &str) -> Result<Option<Application>> {
        self.first_by_app_id("applications", app_id).await
    }

    async fn create_application(&self, application: &NewApplication) -> Result<Application> {
        let created: Application = send_json(
            &self.session,
            self.http.post(self.url("applications")).json(application),
        )
        .await?;
        info!(app_id = %created.app_id, object_id = %created.id, "Application registered");
        Ok(created)
    }

    async fn find_service_principal(&self, app_id: &str) -> Result<Option<ServicePrincipal>> {
        self.first_by_app_id("servicePrincipals", app_id).await
    }

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal> {
        let created: ServicePrincipal = send_json(
            &self.session,
            self.http
                .post(self.url("servicePrincipals"))
                .json(&json!({ "appId": app_id })),
        )
        .await?;
        info!(app_id, object_id = %created.id, "Service principal created");
        Ok(created)
    }

    async fn list_app_role_assignments(
        &self,
        principal_id: &str,
    ) -> Result<Vec<AppRoleAssignment>> {
        let url = self.url(&format!("servicePrincipals/{}/appRoleAssignments", principal_id));
        get_all(&self.session, &self.http, &url, &[]).await
    }

    async fn create_app_role_assignment(
        &self,
        assignment: &NewAppRoleAssignment,
    ) -> Result<AppRoleAssignment> {
        let url = self.url(&format!(
            "servicePrincipals/{}/appRoleAssignments",
            assignment.principal_id
        ));
        let created: AppRoleAssignment =
            send_json(&self.session, self.http.post(url).json(assignment)).await?;
        debug!(
            app_role_id = %created.app_role_id,
            resource_id = %created.resource_id,
            "Role assigned"
        );
        Ok(created)
    }
}
