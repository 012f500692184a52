//! Wire and domain types shared by the directory, resource manager, and site clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Application id of the Microsoft Graph resource service principal.
pub const MICROSOFT_GRAPH_APP_ID: &str = "00000003-0000-0000-c000-000000000000";

/// Application id of the Exchange Online resource service principal.
pub const EXCHANGE_ONLINE_APP_ID: &str = "00000002-0000-0ff1-ce00-000000000000";

/// Registrations are single-tenant.
pub const SIGN_IN_AUDIENCE_MY_ORG: &str = "AzureADMyOrg";

/// Whether a permission is an application role or a delegated scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionKind {
    Role,
    Scope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAccess {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PermissionKind,
}

/// Permissions an application declares against one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredResourceAccess {
    pub resource_app_id: String,
    pub resource_access: Vec<ResourceAccess>,
}

/// A certificate credential attached to an application registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCredential {
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub usage: String,
    /// Base64 DER of the public certificate.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_key_identifier: Option<String>,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
}

impl KeyCredential {
    pub fn asymmetric_x509(
        display_name: impl Into<String>,
        key: impl Into<String>,
        custom_key_identifier: Option<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            kind: "AsymmetricX509Cert".to_string(),
            usage: "Verify".to_string(),
            key: key.into(),
            custom_key_identifier,
            start_date_time: start,
            end_date_time: end,
        }
    }
}

/// Body of an application registration request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub display_name: String,
    pub sign_in_audience: String,
    pub key_credentials: Vec<KeyCredential>,
    pub required_resource_access: Vec<RequiredResourceAccess>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Directory object id.
    pub id: String,
    /// Application (client) id.
    pub app_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub required_resource_access: Vec<RequiredResourceAccess>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub id: String,
    pub app_id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppRoleAssignment {
    pub principal_id: String,
    pub resource_id: String,
    pub app_role_id: String,
}

/// A tenant-wide application role granted to a service principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRoleAssignment {
    #[serde(default)]
    pub id: String,
    pub principal_id: String,
    pub resource_id: String,
    pub app_role_id: String,
    #[serde(default)]
    pub resource_display_name: Option<String>,
}

impl AppRoleAssignment {
    pub fn matches(&self, resource_id: &str, app_role_id: &str) -> bool {
        self.resource_id.eq_ignore_ascii_case(resource_id)
            && self.app_role_id.eq_ignore_ascii_case(app_role_id)
    }
}

/// Access level on a single SharePoint site, ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SitePermissionLevel {
    Read,
    Write,
    FullControl,
}

impl SitePermissionLevel {
    /// Role name used by the Graph site permissions API.
    pub fn graph_role(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::FullControl => "fullcontrol",
        }
    }

    pub fn from_graph_role(role: &str) -> Option<Self> {
        match role.to_ascii_lowercase().as_str() {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "fullcontrol" | "owner" => Some(Self::FullControl),
            _ => None,
        }
    }
}

impl fmt::Display for SitePermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::FullControl => "FullControl",
        };
        f.write_str(name)
    }
}

impl FromStr for SitePermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "fullcontrol" => Ok(Self::FullControl),
            _ => Err(format!(
                "unknown site permission '{}' (expected Read, Write, or FullControl)",
                s
            )),
        }
    }
}

/// Request to grant one application access to one site.
#[derive(Debug, Clone)]
pub struct SiteGrant {
    pub application_id: String,
    pub display_name: String,
    pub site_url: Url,
    pub level: SitePermissionLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantedApplication {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One permission entry on a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePermission {
    pub id: String,
    pub roles: Vec<String>,
    pub applications: Vec<GrantedApplication>,
}

impl SitePermission {
    pub fn grants_application(&self, application_id: &str) -> bool {
        self.applications
            .iter()
            .any(|app| app.id.eq_ignore_ascii_case(application_id))
    }

    /// Highest level among the entry's roles, if any role is recognized.
    pub fn level(&self) -> Option<SitePermissionLevel> {
        self.roles
            .iter()
            .filter_map(|role| SitePermissionLevel::from_graph_role(role))
            .max()
    }
}

/// Request to upload the private certificate into an automation account.
#[derive(Debug, Clone)]
pub struct CertificateImport {
    pub automation_account: String,
    pub resource_group: String,
    pub certificate_name: String,
    pub pfx_path: PathBuf,
    pub exportable: bool,
    pub description: Option<String>,
}
