//! Tenant-wide application role grants on the identity's service principal.

use directory::{AppRoleAssignment, DirectoryClient, NewAppRoleAssignment, ServicePrincipal};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::catalog::{GrantCatalog, RoleGrant};
use crate::classify::{classify_client_error, GrantErrorClass};
use crate::consent::admin_consent_url;
use crate::error::{ProvisioningError, Result};
use crate::report::{ItemStatus, Stage, StageReport};
use crate::state::ResolvedTarget;
use crate::verify::VerifyPolicy;

#[derive(Debug, Clone)]
pub struct TenantGrantRequest {
    pub target: ResolvedTarget,
    /// Sign-in authority used for the admin consent URL.
    pub login_base: String,
    pub verify: VerifyPolicy,
}

/// Ensure every role in `catalog` is assigned to the application's service
/// principal.
///
/// Each role is checked against the existing assignments before it is
/// created, so re-runs never duplicate. A failed role is recorded and the
/// remaining roles are still attempted.
pub async fn grant_tenant_permissions(
    directory: &dyn DirectoryClient,
    catalog: &GrantCatalog,
    request: &TenantGrantRequest,
) -> Result<StageReport> {
    catalog.validate()?;
    let app_id = request.target.application_id.as_str();
    let mut report = StageReport::new(Stage::TenantGrants);

    let application = directory
        .get_application(app_id)
        .await
        .map_err(|e| ProvisioningError::remote("Look up application", e))?
        .ok_or_else(|| ProvisioningError::ApplicationNotFound(app_id.to_string()))?;

    let tenant_id = match &request.target.tenant_id {
        Some(tenant) => tenant.clone(),
        None => directory
            .tenant_id()
            .await
            .map_err(|e| ProvisioningError::remote("Query tenant", e))?,
    };

    let principal = ensure_service_principal(directory, app_id, &mut report).await?;
    let grants = catalog.role_grants();
    let resources = resolve_resources(directory, &grants).await?;

    let existing = directory
        .list_app_role_assignments(&principal.id)
        .await
        .map_err(|e| ProvisioningError::remote("List role assignments", e))?;

    for grant in &grants {
        let label = format!("{} ({})", grant.permission_name, grant.resource_name);
        let Some(resource) = resources.get(&grant.resource_app_id).and_then(Option::as_ref) else {
            report.failed(
                label,
                format!(
                    "resource service principal {} is not present in the tenant",
                    grant.resource_app_id
                ),
            );
            continue;
        };

        if existing
            .iter()
            .any(|a| a.matches(&resource.id, &grant.app_role_id))
        {
            report.already_satisfied(label, "already granted");
            continue;
        }

        let assignment = NewAppRoleAssignment {
            principal_id: principal.id.clone(),
            resource_id: resource.id.clone(),
            app_role_id: grant.app_role_id.clone(),
        };
        match directory.create_app_role_assignment(&assignment).await {
            Ok(_) => {
                info!(
                    permission = %grant.permission_name,
                    resource = %grant.resource_name,
                    "Permission granted"
                );
                report.succeeded(label);
            }
            Err(e) if classify_client_error(&e) == GrantErrorClass::AlreadyExists => {
                report.already_satisfied(label, "already granted (reported by the directory)");
            }
            Err(e) => {
                warn!(permission = %grant.permission_name, error = %e, "Permission grant failed");
                report.failed(label, e.to_string());
            }
        }
    }

    verify_assignments(directory, &principal, &grants, &resources, request.verify, &mut report)
        .await;

    let failed = report.count(ItemStatus::Failed);
    if failed > 0 {
        report.follow_up(format!(
            "{} permission(s) could not be granted; add them under App registrations > {} > API permissions, or fix access and re-run",
            failed, application.display_name
        ));
    }

    let consent = admin_consent_url(&request.login_base, &tenant_id, app_id)?;
    report.follow_up(format!(
        "Open the admin consent URL as a tenant administrator: {}",
        consent
    ));
    report.fact("Application ID", app_id);
    report.fact("Tenant ID", &tenant_id);
    report.fact("Service principal", &principal.id);
    report.fact("Admin consent URL", consent.to_string());
    report.next_step("Grant access to the calendar site: calprov grant-site --site-url <url>");

    Ok(report)
}

async fn ensure_service_principal(
    directory: &dyn DirectoryClient,
    app_id: &str,
    report: &mut StageReport,
) -> Result<ServicePrincipal> {
    let found = directory
        .find_service_principal(app_id)
        .await
        .map_err(|e| ProvisioningError::remote("Look up service principal", e))?;
    if let Some(principal) = found {
        report.already_satisfied("Service principal", format!("exists ({})", principal.id));
        return Ok(principal);
    }

    let principal = directory
        .create_service_principal(app_id)
        .await
        .map_err(|e| ProvisioningError::remote("Create service principal", e))?;
    report.succeeded(format!("Service principal created ({})", principal.id));
    Ok(principal)
}

/// Look up each resource provider once. `None` marks a resource whose
/// service principal is absent from the tenant.
async fn resolve_resources(
    directory: &dyn DirectoryClient,
    grants: &[RoleGrant],
) -> Result<HashMap<String, Option<ServicePrincipal>>> {
    let mut resources = HashMap::new();
    for grant in grants {
        if resources.contains_key(&grant.resource_app_id) {
            continue;
        }
        let principal = directory
            .find_service_principal(&grant.resource_app_id)
            .await
            .map_err(|e| {
                let action = format!("Look up {} service principal", grant.resource_name);
                ProvisioningError::remote(action, e)
            })?;
        if principal.is_none() {
            warn!(
                resource = %grant.resource_name,
                app_id = %grant.resource_app_id,
                "Resource service principal not found"
            );
        }
        resources.insert(grant.resource_app_id.clone(), principal);
    }
    Ok(resources)
}

/// Re-query the assignments and list them. Read-only; mismatches are warnings.
async fn verify_assignments(
    directory: &dyn DirectoryClient,
    principal: &ServicePrincipal,
    grants: &[RoleGrant],
    resources: &HashMap<String, Option<ServicePrincipal>>,
    policy: VerifyPolicy,
    report: &mut StageReport,
) {
    let expected: Vec<(String, &RoleGrant)> = grants
        .iter()
        .filter_map(|grant| {
            let resource = resources.get(&grant.resource_app_id)?.as_ref()?;
            let label = format!("{} ({})", grant.permission_name, grant.resource_name);
            let granted = report.items.iter().any(|item| {
                item.label == label
                    && matches!(item.status, ItemStatus::Succeeded | ItemStatus::AlreadySatisfied)
            });
            granted.then(|| (resource.id.clone(), grant))
        })
        .collect();

    let all_visible = |assignments: &Vec<AppRoleAssignment>| {
        expected.iter().all(|(resource_id, grant)| {
            assignments
                .iter()
                .any(|a| a.matches(resource_id, &grant.app_role_id))
        })
    };

    let observed = policy
        .run(all_visible, || directory.list_app_role_assignments(&principal.id))
        .await;

    match observed {
        Ok((assignments, visible)) => {
            for assignment in &assignments {
                report.verification.push(describe_assignment(assignment, grants, resources));
            }
            if assignments.is_empty() {
                report.warning(
                    "Verification",
                    "no role assignments are visible on the service principal yet",
                );
            } else if !visible {
                report.warning(
                    "Verification",
                    "some granted permissions are not visible yet; they may still be propagating",
                );
            }
        }
        Err(e) => {
            report.warning("Verification", format!("could not re-query role assignments: {}", e));
        }
    }
}

fn describe_assignment(
    assignment: &AppRoleAssignment,
    grants: &[RoleGrant],
    resources: &HashMap<String, Option<ServicePrincipal>>,
) -> String {
    let known = grants.iter().find(|grant| {
        resources
            .get(&grant.resource_app_id)
            .and_then(Option::as_ref)
            .is_some_and(|resource| assignment.matches(&resource.id, &grant.app_role_id))
    });
    match known {
        Some(grant) => format!("{} ({})", grant.permission_name, grant.resource_name),
        None => format!(
            "{} ({})",
            assignment.app_role_id,
            assignment
                .resource_display_name
                .as_deref()
                .unwrap_or(&assignment.resource_id)
        ),
    }
}
