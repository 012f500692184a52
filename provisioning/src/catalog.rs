//! Declarative table of the application permissions the identity needs.

use directory::{
    PermissionKind, RequiredResourceAccess, ResourceAccess, EXCHANGE_ONLINE_APP_ID,
    MICROSOFT_GRAPH_APP_ID,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ProvisioningError, Result};

/// Permissions required on every resource provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantCatalog {
    pub resources: Vec<ResourceGrants>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrants {
    /// Friendly name of the resource provider.
    pub name: String,
    pub resource_app_id: String,
    pub permissions: Vec<PermissionGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub name: String,
    pub id: String,
    #[serde(default = "default_kind")]
    pub kind: PermissionKind,
}

fn default_kind() -> PermissionKind {
    PermissionKind::Role
}

/// One role the grant stage must ensure, flattened from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub resource_name: String,
    pub resource_app_id: String,
    pub permission_name: String,
    pub app_role_id: String,
}

impl GrantCatalog {
    /// Calendar automation defaults: six Graph roles and one Exchange role.
    pub fn builtin() -> Self {
        fn role(name: &str, id: &str) -> PermissionGrant {
            PermissionGrant {
                name: name.to_string(),
                id: id.to_string(),
                kind: PermissionKind::Role,
            }
        }

        Self {
            resources: vec![
                ResourceGrants {
                    name: "Microsoft Graph".to_string(),
                    resource_app_id: MICROSOFT_GRAPH_APP_ID.to_string(),
                    permissions: vec![
                        role("User.Read.All", "df021288-bdef-4463-88db-98f22de89214"),
                        role("Group.Read.All", "5b567255-7703-4780-807c-7be8301ae99b"),
                        role("GroupMember.Read.All", "98830695-27a2-44f7-8c18-0c3ebc9698f6"),
                        role("Calendars.ReadWrite", "ef54d2bf-783f-4e0f-bca1-3210c0444d99"),
                        role("Files.Read.All", "01d4889c-1287-42c6-ac1f-5d1e02578ef6"),
                        role("Sites.Selected", "883ea226-0bf2-4a8f-9f9d-92c9162a727d"),
                    ],
                },
                ResourceGrants {
                    name: "Office 365 Exchange Online".to_string(),
                    resource_app_id: EXCHANGE_ONLINE_APP_ID.to_string(),
                    permissions: vec![role(
                        "Exchange.ManageAsApp",
                        "dc50a0fb-09a3-484d-be87-e023b12c6440",
                    )],
                },
            ],
        }
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(source)
            .map_err(|e| ProvisioningError::Catalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ProvisioningError::Catalog(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&source)
    }

    /// Built-in catalog unless `path` names a file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.permission_count() == 0 {
            return Err(ProvisioningError::Catalog(
                "at least one permission is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !is_guid(&resource.resource_app_id) {
                return Err(ProvisioningError::Catalog(format!(
                    "resource '{}' has invalid resource_app_id '{}'",
                    resource.name, resource.resource_app_id
                )));
            }
            for permission in &resource.permissions {
                if !is_guid(&permission.id) {
                    return Err(ProvisioningError::Catalog(format!(
                        "permission '{}' has invalid id '{}'",
                        permission.name, permission.id
                    )));
                }
                let key = (
                    resource.resource_app_id.to_ascii_lowercase(),
                    permission.id.to_ascii_lowercase(),
                );
                if !seen.insert(key) {
                    return Err(ProvisioningError::Catalog(format!(
                        "permission '{}' is listed twice for '{}'",
                        permission.name, resource.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn permission_count(&self) -> usize {
        self.resources.iter().map(|r| r.permissions.len()).sum()
    }

    /// Resource access entries declared on the application registration.
    pub fn required_resource_access(&self) -> Vec<RequiredResourceAccess> {
        self.resources
            .iter()
            .filter(|r| !r.permissions.is_empty())
            .map(|r| RequiredResourceAccess {
                resource_app_id: r.resource_app_id.clone(),
                resource_access: r
                    .permissions
                    .iter()
                    .map(|p| ResourceAccess {
                        id: p.id.clone(),
                        kind: p.kind,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Application roles to assign, in catalog order. Delegated scopes are
    /// declared only and never assigned.
    pub fn role_grants(&self) -> Vec<RoleGrant> {
        self.resources
            .iter()
            .flat_map(|r| {
                r.permissions
                    .iter()
                    .filter(|p| p.kind == PermissionKind::Role)
                    .map(move |p| RoleGrant {
                        resource_name: r.name.clone(),
                        resource_app_id: r.resource_app_id.clone(),
                        permission_name: p.name.clone(),
                        app_role_id: p.id.clone(),
                    })
            })
            .collect()
    }
}

pub(crate) fn is_guid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok() && value.len() == 36
}
