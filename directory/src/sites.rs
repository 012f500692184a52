//! Site-scoped permission grants through the SharePoint admin endpoint and
//! the Graph site permissions API.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::clients::SiteAdminClient;
use crate::error::{ClientError, Result};
use crate::http::{get_all, send_json};
use crate::session::{Session, TokenProvider};
use crate::types::{GrantedApplication, SiteGrant, SitePermission, SitePermissionLevel};

const ADMIN_SERVICE: &str = "SharePoint admin";
const GRAPH_SERVICE: &str = "Microsoft Graph";

pub struct GraphSiteAdminClient {
    http: reqwest::Client,
    graph_base: String,
    admin_session: Session,
    graph_session: Session,
    site_ids: Mutex<HashMap<String, String>>,
}

impl GraphSiteAdminClient {
    /// Open the admin session against `admin_endpoint` and confirm the
    /// operator can reach it, then open the Graph session used for grants.
    pub async fn connect(
        admin_endpoint: &Url,
        graph_base: &str,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let http = reqwest::Client::new();
        let admin_resource = admin_endpoint.as_str().trim_end_matches('/').to_string();
        let admin_session =
            Session::open(ADMIN_SERVICE, admin_resource.clone(), provider.clone()).await?;

        let probe = format!("{}/_api/web?$select=Title", admin_resource);
        let _: Value = send_json(&admin_session, http.get(probe))
            .await
            .map_err(|e| ClientError::Authentication {
                resource: admin_resource.clone(),
                reason: e.to_string(),
            })?;
        info!(endpoint = %admin_resource, "SharePoint admin endpoint reachable");

        let graph_base = graph_base.trim_end_matches('/').to_string();
        let graph_session = Session::open(GRAPH_SERVICE, graph_base.clone(), provider).await?;

        Ok(Self {
            http,
            graph_base,
            admin_session,
            graph_session,
            site_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn close(&self) {
        self.graph_session.close();
        self.admin_session.close();
    }

    async fn site_id(&self, site_url: &Url) -> Result<String> {
        let key = site_url.as_str().trim_end_matches('/').to_string();
        if let Some(id) = self.site_ids.lock().await.get(&key) {
            return Ok(id.clone());
        }

        let host = site_url.host_str().ok_or_else(|| ClientError::UnexpectedResponse {
            service: GRAPH_SERVICE,
            reason: format!("site URL has no host: {}", site_url),
        })?;
        let path = site_url.path().trim_end_matches('/');
        let url = if path.is_empty() {
            format!("{}/v1.0/sites/{}", self.graph_base, host)
        } else {
            format!("{}/v1.0/sites/{}:{}", self.graph_base, host, path)
        };

        let site: Value = send_json(&self.graph_session, self.http.get(url)).await?;
        let id = site["id"]
            .as_str()
            .ok_or_else(|| ClientError::UnexpectedResponse {
                service: GRAPH_SERVICE,
                reason: format!("site lookup for {} returned no id", site_url),
            })?
            .to_string();
        debug!(site = %site_url, site_id = %id, "Resolved site");
        self.site_ids.lock().await.insert(key, id.clone());
        Ok(id)
    }

    fn permissions_url(&self, site_id: &str) -> String {
        format!("{}/v1.0/sites/{}/permissions", self.graph_base, site_id)
    }
}

#[async_trait]
impl SiteAdminClient for GraphSiteAdminClient {
    async fn grant_site_permission(&self, grant: &SiteGrant) -> Result<SitePermission> {
        let site_id = self.site_id(&grant.site_url).await?;
        let body = json!({
            "roles": [grant.level.graph_role()],
            "grantedToIdentities": [{
                "application": {
                    "id": grant.application_id,
                    "displayName": grant.display_name,
                }
            }]
        });
        let created: Value = send_json(
            &self.graph_session,
            self.http.post(self.permissions_url(&site_id)).json(&body),
        )
        .await?;
        info!(site = %grant.site_url, level = %grant.level, "Site permission granted");
        Ok(parse_site_permission(&created))
    }

    async fn update_site_permission(
        &self,
        site_url: &Url,
        permission_id: &str,
        level: SitePermissionLevel,
    ) -> Result<SitePermission> {
        let site_id = self.site_id(site_url).await?;
        let url = format!("{}/{}", self.permissions_url(&site_id), permission_id);
        let updated: Value = send_json(
            &self.graph_session,
            self.http
                .patch(url)
                .json(&json!({ "roles": [level.graph_role()] })),
        )
        .await?;
        info!(site = %site_url, permission_id, level = %level, "Site permission updated");
        Ok(parse_site_permission(&updated))
    }

    async fn list_site_permissions(&self, site_url: &Url) -> Result<Vec<SitePermission>> {
        let site_id = self.site_id(site_url).await?;
        let url = self.permissions_url(&site_id);
        let entries: Vec<Value> = get_all(&self.graph_session, &self.http, &url, &[]).await?;

        let mut permissions = Vec::with_capacity(entries.len());
        for entry in &entries {
            let mut permission = parse_site_permission(entry);
            // The collection omits roles; fetch the entry itself when needed.
            if permission.roles.is_empty() && !permission.id.is_empty() {
                let detail: Value = send_json(
                    &self.graph_session,
                    self.http.get(format!("{}/{}", url, permission.id)),
                )
                .await?;
                permission.roles = string_array(&detail["roles"]);
            }
            permissions.push(permission);
        }
        Ok(permissions)
    }
}

fn parse_site_permission(value: &Value) -> SitePermission {
    let mut applications = Vec::new();
    for key in ["grantedToIdentitiesV2", "grantedToIdentities"] {
        if let Some(identities) = value[key].as_array() {
            for identity in identities {
                let app = &identity["application"];
                if let Some(id) = app["id"].as_str() {
                    if !applications.iter().any(|a: &GrantedApplication| a.id == id) {
                        applications.push(GrantedApplication {
                            id: id.to_string(),
                            display_name: app["displayName"].as_str().map(str::to_string),
                        });
                    }
                }
            }
        }
    }

    SitePermission {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        roles: string_array(&value["roles"]),
        applications,
    }
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
