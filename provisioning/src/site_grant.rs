//! Site-scoped permission grant for a single collaboration site.

use directory::{SiteAdminClient, SiteGrant, SitePermission, SitePermissionLevel};
use tracing::{info, warn};
use url::Url;

use crate::classify::{classify_client_error, GrantErrorClass};
use crate::error::Result;
use crate::identity::DEFAULT_DISPLAY_NAME;
use crate::report::{Stage, StageReport};
use crate::site_locator::SiteLocator;
use crate::state::ResolvedTarget;
use crate::verify::VerifyPolicy;

/// A validated site grant. Building one performs no remote calls, so an
/// invalid site URL is rejected before any admin session is opened.
#[derive(Debug, Clone)]
pub struct SiteGrantPlan {
    pub site: SiteLocator,
    pub level: SitePermissionLevel,
    pub application_id: String,
    pub display_name: String,
    pub tenant_id: Option<String>,
}

impl SiteGrantPlan {
    /// Display name falls back to the stored one, then the default.
    pub fn new(
        site_url: &str,
        level: SitePermissionLevel,
        target: ResolvedTarget,
        display_name: Option<String>,
    ) -> Result<Self> {
        let site = SiteLocator::parse(site_url)?;
        let display_name = display_name
            .filter(|name| !name.trim().is_empty())
            .or(target.display_name)
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
        Ok(Self {
            site,
            level,
            application_id: target.application_id,
            display_name,
            tenant_id: target.tenant_id,
        })
    }

    pub fn admin_endpoint(&self) -> Result<Url> {
        self.site.admin_endpoint()
    }

    fn grant(&self) -> SiteGrant {
        SiteGrant {
            application_id: self.application_id.clone(),
            display_name: self.display_name.clone(),
            site_url: self.site.url().clone(),
            level: self.level,
        }
    }
}

/// Grant the planned level on the site unless an equal or higher grant for
/// the application already exists, then re-query to confirm the level is
/// visible.
///
/// A lower existing grant is upgraded in place rather than duplicated. Grant
/// failures and verification mismatches are recorded on the report; only
/// failures to build the plan or open the session abort the stage.
pub async fn grant_site_permission(
    sites: &dyn SiteAdminClient,
    plan: &SiteGrantPlan,
    verify: VerifyPolicy,
) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::SiteGrant);
    let site_url = plan.site.url();
    let app_id = plan.application_id.as_str();
    let label = format!("{} access on {}", plan.level, site_url);

    let existing = match sites.find_site_permissions(site_url, app_id).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(
                site = %site_url,
                error = %e,
                "Could not list site permissions; granting directly"
            );
            Vec::new()
        }
    };
    let current = existing
        .iter()
        .filter_map(|permission| permission.level().map(|level| (level, permission)))
        .max_by_key(|(level, _)| *level);

    let result = match current {
        Some((level, _)) if level >= plan.level => {
            report.already_satisfied(label.clone(), format!("existing grant at {}", level));
            None
        }
        Some((level, permission)) if !permission.id.is_empty() => {
            info!(
                site = %site_url,
                from = %level,
                to = %plan.level,
                "Upgrading existing site permission"
            );
            Some(
                sites
                    .update_site_permission(site_url, &permission.id, plan.level)
                    .await,
            )
        }
        _ => Some(sites.grant_site_permission(&plan.grant()).await),
    };

    match result {
        None => {}
        Some(Ok(_)) => {
            info!(site = %site_url, level = %plan.level, app_id, "Site permission granted");
            report.succeeded(label);
        }
        Some(Err(e)) if classify_client_error(&e) == GrantErrorClass::AlreadyExists => {
            report.already_satisfied(label, "the site reported the grant already exists");
        }
        Some(Err(e)) => {
            warn!(site = %site_url, error = %e, "Site permission grant failed");
            report.failed(label, e.to_string());
            report.follow_up(format!(
                "Grant {} access on {} to application {} manually from the SharePoint admin center",
                plan.level, site_url, app_id
            ));
        }
    }

    let observed = verify
        .run(
            |found: &Vec<SitePermission>| highest_level(found) >= Some(plan.level),
            || sites.find_site_permissions(site_url, app_id),
        )
        .await;
    match observed {
        Ok((found, satisfied)) => {
            for permission in &found {
                report.verification.push(format!(
                    "{} on {} ({})",
                    permission.roles.join(", "),
                    site_url,
                    permission.id
                ));
            }
            if !satisfied {
                let visible = highest_level(&found)
                    .map_or_else(|| "none".to_string(), |level| level.to_string());
                report.warning(
                    "Verification",
                    format!(
                        "{} access for {} is not visible on {} yet (highest visible: {})",
                        plan.level, app_id, site_url, visible
                    ),
                );
                report.follow_up(format!(
                    "Re-check the permissions on {} in a few minutes; grants can take time to appear",
                    site_url
                ));
            }
        }
        Err(e) => {
            report.warning(
                "Verification",
                format!("could not re-query site permissions: {}", e),
            );
        }
    }

    report.fact("Site", site_url.to_string());
    report.fact("Permission", plan.level.to_string());
    report.fact("Application ID", app_id);
    report.fact("Display name", &plan.display_name);
    if let Some(tenant) = &plan.tenant_id {
        report.fact("Tenant ID", tenant);
    }
    report.next_step(
        "Configure the calendar automation with the application ID, tenant ID, and certificate thumbprint",
    );

    Ok(report)
}

fn highest_level(permissions: &[SitePermission]) -> Option<SitePermissionLevel> {
    permissions.iter().filter_map(SitePermission::level).max()
}
