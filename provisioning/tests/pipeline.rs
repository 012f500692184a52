use std::collections::HashSet;
use std::time::Duration;

use credentials::Passphrase;
use directory::{InMemoryTenant, SitePermissionLevel, MICROSOFT_GRAPH_APP_ID};
use provisioning::{
    grant_site_permission, grant_tenant_permissions, provision_identity, resolve_target,
    GrantCatalog, IdentityOutcome, IdentityRequest, ImportTarget, ItemStatus, Outcome,
    ProvisioningError, SiteGrantPlan, StateStore, TenantGrantRequest, VerifyPolicy,
    DEFAULT_DISPLAY_NAME,
};
use tempfile::TempDir;

const TENANT_ID: &str = "72f988bf-86f1-41af-91ab-2d7cd011db47";
const SITE_URL: &str = "https://contoso.sharepoint.com/sites/calendar";
const LOGIN: &str = "https://login.microsoftonline.com";

struct Fixture {
    tenant: InMemoryTenant,
    store: StateStore,
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self::with_tenant(InMemoryTenant::with_standard_resources(TENANT_ID))
    }

    fn with_tenant(tenant: InMemoryTenant) -> Self {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("provisioning-state.json"));
        Self { tenant, store, dir }
    }

    fn request(&self) -> IdentityRequest {
        IdentityRequest {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            certificate_name: None,
            automation_account: "aa1".to_string(),
            resource_group: "rg1".to_string(),
            output_dir: self.dir.path().join("certs"),
        }
    }

    async fn identity(&self) -> IdentityOutcome {
        let passphrase = Passphrase::new("correct horse battery").unwrap();
        provision_identity(
            &self.tenant,
            ImportTarget::Client(&self.tenant),
            &self.store,
            &GrantCatalog::builtin(),
            &self.request(),
            &passphrase,
        )
        .await
        .unwrap()
    }

    fn grant_request(&self, app_id: Option<&str>) -> TenantGrantRequest {
        TenantGrantRequest {
            target: resolve_target(app_id, &self.store).unwrap(),
            login_base: LOGIN.to_string(),
            verify: VerifyPolicy::default(),
        }
    }

    fn site_plan(&self, level: SitePermissionLevel) -> SiteGrantPlan {
        let target = resolve_target(None, &self.store).unwrap();
        SiteGrantPlan::new(SITE_URL, level, target, None).unwrap()
    }
}

fn assignment_set(tenant: &InMemoryTenant) -> HashSet<(String, String, String)> {
    tenant
        .app_role_assignments()
        .into_iter()
        .map(|a| (a.principal_id, a.resource_id, a.app_role_id))
        .collect()
}

#[tokio::test]
async fn test_end_to_end_on_clean_tenant() {
    let fx = Fixture::new();

    let outcome = fx.identity().await;
    assert_eq!(outcome.report.outcome, Outcome::Succeeded);
    let state = fx.store.load().unwrap();
    assert!(uuid::Uuid::parse_str(&state.application_id).is_ok());
    assert_eq!(state.tenant_id, TENANT_ID);
    assert_eq!(state.execution_environment_name, "aa1");
    assert_eq!(state.execution_environment_resource_group, "rg1");
    assert_eq!(state.certificate_name, "calendar-automation-cert");
    assert!(outcome.artifacts.public_path.exists());
    assert!(outcome.artifacts.private_path.exists());

    let imported = fx.tenant.imported_certificates();
    assert_eq!(imported.len(), 1);
    assert!(!imported[0].exportable);
    assert_eq!(imported[0].thumbprint, state.certificate_thumbprint);

    let app = &fx.tenant.applications()[0];
    assert_eq!(app.required_resource_access.len(), 2);
    let credentials = fx.tenant.key_credentials(&app.app_id);
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].kind, "AsymmetricX509Cert");

    let catalog = GrantCatalog::builtin();
    let report = grant_tenant_permissions(&fx.tenant, &catalog, &fx.grant_request(None))
        .await
        .unwrap();
    assert_eq!(report.count(ItemStatus::Failed), 0);
    let permission_items = report
        .items
        .iter()
        .filter(|item| item.label.ends_with(')') && !item.label.starts_with("Service principal"))
        .count();
    assert_eq!(permission_items, 7);
    assert_eq!(fx.tenant.app_role_assignments().len(), 7);
    assert_eq!(report.verification.len(), 7);
    let consent = report.fact_value("Admin consent URL").unwrap();
    assert!(consent.contains(TENANT_ID));
    assert!(consent.contains(&state.application_id));

    let plan = fx.site_plan(SitePermissionLevel::Write);
    let report = grant_site_permission(&fx.tenant, &plan, VerifyPolicy::default())
        .await
        .unwrap();
    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.items[0].status, ItemStatus::Succeeded);
    assert_eq!(report.verification.len(), 1);
    assert_eq!(plan.display_name, DEFAULT_DISPLAY_NAME);
}

#[tokio::test]
async fn test_tenant_grants_are_idempotent() {
    let fx = Fixture::new();
    fx.identity().await;
    let catalog = GrantCatalog::builtin();

    grant_tenant_permissions(&fx.tenant, &catalog, &fx.grant_request(None))
        .await
        .unwrap();
    let first = assignment_set(&fx.tenant);

    let rerun = grant_tenant_permissions(&fx.tenant, &catalog, &fx.grant_request(None))
        .await
        .unwrap();
    assert_eq!(assignment_set(&fx.tenant), first);
    assert_eq!(fx.tenant.app_role_assignments().len(), 7);
    // Service principal plus the seven roles.
    assert_eq!(rerun.count(ItemStatus::AlreadySatisfied), 8);
    assert_eq!(rerun.count(ItemStatus::Succeeded), 0);
}

#[tokio::test]
async fn test_one_failed_grant_does_not_stop_the_rest() {
    let fx = Fixture::new();
    fx.identity().await;
    let catalog = GrantCatalog::builtin();
    let third = catalog.role_grants()[2].clone();
    fx.tenant.fail_app_role(&third.app_role_id);

    let report = grant_tenant_permissions(&fx.tenant, &catalog, &fx.grant_request(None))
        .await
        .unwrap();

    let permissions: Vec<_> = report
        .items
        .iter()
        .filter(|item| !item.label.starts_with("Service principal") && item.label != "Verification")
        .collect();
    assert_eq!(permissions.len(), 7);
    assert_eq!(
        permissions
            .iter()
            .filter(|item| item.status == ItemStatus::Succeeded)
            .count(),
        6
    );
    let failed: Vec<_> = permissions
        .iter()
        .filter(|item| item.status == ItemStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].label.contains(&third.permission_name));
    assert_eq!(report.outcome, Outcome::PartiallyFailed);
    assert!(report.has_failures());
    assert_eq!(fx.tenant.app_role_assignments().len(), 6);
}

#[tokio::test]
async fn test_missing_resource_provider_fails_only_its_permissions() {
    let tenant =
        InMemoryTenant::new(TENANT_ID).with_resource(MICROSOFT_GRAPH_APP_ID, "Microsoft Graph");
    let fx = Fixture::with_tenant(tenant);
    fx.identity().await;

    let catalog = GrantCatalog::builtin();
    let report = grant_tenant_permissions(&fx.tenant, &catalog, &fx.grant_request(None))
        .await
        .unwrap();
    assert_eq!(report.count(ItemStatus::Failed), 1);
    assert_eq!(fx.tenant.app_role_assignments().len(), 6);
    let failed = report
        .items
        .iter()
        .find(|item| item.status == ItemStatus::Failed)
        .unwrap();
    assert!(failed.label.contains("Exchange.ManageAsApp"));
}

#[tokio::test]
async fn test_unknown_application_is_fatal() {
    let fx = Fixture::new();
    let request = fx.grant_request(Some("9d8c7b6a-5f4e-4d3c-8b2a-1f0e9d8c7b6a"));
    let err = grant_tenant_permissions(&fx.tenant, &GrantCatalog::builtin(), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::ApplicationNotFound(_)));
}

#[tokio::test]
async fn test_state_hand_off_and_explicit_override() {
    let fx = Fixture::new();
    let outcome = fx.identity().await;

    let target = resolve_target(None, &fx.store).unwrap();
    assert_eq!(target.application_id, outcome.state.application_id);
    assert_eq!(target.tenant_id.as_deref(), Some(TENANT_ID));

    let explicit = "9d8c7b6a-5f4e-4d3c-8b2a-1f0e9d8c7b6a";
    let target = resolve_target(Some(explicit), &fx.store).unwrap();
    assert_eq!(target.application_id, explicit);
    assert_eq!(target.tenant_id.as_deref(), Some(TENANT_ID));
}

#[tokio::test]
async fn test_failed_certificate_import_is_degraded() {
    let fx = Fixture::new();
    fx.tenant.fail_certificate_import("ResourceNotFound: automation account 'aa1' was not found");

    let outcome = fx.identity().await;
    assert_eq!(outcome.report.outcome, Outcome::SucceededWithWarnings);
    assert!(fx.store.exists());
    assert!(fx.tenant.imported_certificates().is_empty());
    assert!(outcome
        .report
        .manual_follow_up
        .iter()
        .any(|step| step.contains("aa1") && step.contains("rg1")));
}

#[tokio::test]
async fn test_unavailable_resource_manager_is_degraded() {
    let fx = Fixture::new();
    let passphrase = Passphrase::new("correct horse battery").unwrap();
    let outcome = provision_identity(
        &fx.tenant,
        ImportTarget::Unavailable(
            "Authentication failed for https://management.azure.com".to_string(),
        ),
        &fx.store,
        &GrantCatalog::builtin(),
        &fx.request(),
        &passphrase,
    )
    .await
    .unwrap();

    assert_eq!(outcome.report.count(ItemStatus::Warning), 1);
    assert_eq!(fx.store.load().unwrap().application_id, outcome.state.application_id);
}

#[tokio::test]
async fn test_rerunning_identity_warns_about_existing_name() {
    let fx = Fixture::new();
    let first = fx.identity().await;
    let second = fx.identity().await;

    assert_ne!(first.state.application_id, second.state.application_id);
    assert_eq!(fx.store.load().unwrap().application_id, second.state.application_id);
    let warning = second
        .report
        .items
        .iter()
        .find(|item| item.status == ItemStatus::Warning)
        .unwrap();
    assert_eq!(warning.label, "Existing registration");
}

#[tokio::test]
async fn test_site_grant_skips_when_already_present() {
    let fx = Fixture::new();
    fx.identity().await;

    let plan = fx.site_plan(SitePermissionLevel::Write);
    grant_site_permission(&fx.tenant, &plan, VerifyPolicy::default())
        .await
        .unwrap();
    let rerun = grant_site_permission(&fx.tenant, &plan, VerifyPolicy::default())
        .await
        .unwrap();

    assert_eq!(fx.tenant.site_grant_calls(), 1);
    assert_eq!(rerun.items[0].status, ItemStatus::AlreadySatisfied);

    let read = fx.site_plan(SitePermissionLevel::Read);
    let lower = grant_site_permission(&fx.tenant, &read, VerifyPolicy::default())
        .await
        .unwrap();
    assert_eq!(lower.items[0].status, ItemStatus::AlreadySatisfied);
    assert_eq!(fx.tenant.site_grant_calls(), 1);
}

#[tokio::test]
async fn test_site_grant_upgrades_lower_existing_grant() {
    let fx = Fixture::new();
    fx.identity().await;
    let site = url::Url::parse(SITE_URL).unwrap();

    let read = fx.site_plan(SitePermissionLevel::Read);
    grant_site_permission(&fx.tenant, &read, VerifyPolicy::default())
        .await
        .unwrap();
    let write = fx.site_plan(SitePermissionLevel::Write);
    let report = grant_site_permission(&fx.tenant, &write, VerifyPolicy::default())
        .await
        .unwrap();

    assert_eq!(report.items[0].status, ItemStatus::Succeeded);
    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(fx.tenant.site_grant_calls(), 1);
    assert_eq!(fx.tenant.site_update_calls(), 1);
    let permissions = fx.tenant.site_permissions(&site);
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].level(), Some(SitePermissionLevel::Write));
}

#[tokio::test]
async fn test_already_granted_error_with_lower_visible_level_warns() {
    let fx = Fixture::new();
    fx.identity().await;

    let read = fx.site_plan(SitePermissionLevel::Read);
    grant_site_permission(&fx.tenant, &read, VerifyPolicy::default())
        .await
        .unwrap();
    fx.tenant
        .fail_site_grant("The application has already been granted access to this site");

    let write = fx.site_plan(SitePermissionLevel::Write);
    let report = grant_site_permission(&fx.tenant, &write, VerifyPolicy::default())
        .await
        .unwrap();

    // Only Read is visible afterwards, which does not cover Write
    assert_eq!(report.items[0].status, ItemStatus::AlreadySatisfied);
    assert_eq!(report.outcome, Outcome::SucceededWithWarnings);
    let warning = report
        .items
        .iter()
        .find(|item| item.label == "Verification")
        .unwrap();
    assert_eq!(warning.status, ItemStatus::Warning);
    assert!(warning.detail.as_deref().unwrap_or_default().contains("highest visible: Read"));
}

#[tokio::test]
async fn test_already_granted_error_counts_as_success_when_level_is_visible() {
    let fx = Fixture::new();
    fx.identity().await;
    let site = url::Url::parse(SITE_URL).unwrap();

    let write = fx.site_plan(SitePermissionLevel::Write);
    grant_site_permission(&fx.tenant, &write, VerifyPolicy::default())
        .await
        .unwrap();
    // The pre-query fails, so the grant call is made and reports a duplicate
    fx.tenant.fail_next_site_listing();
    fx.tenant
        .fail_site_grant("The application has already been granted access to this site");

    let report = grant_site_permission(&fx.tenant, &write, VerifyPolicy::default())
        .await
        .unwrap();
    assert_eq!(report.items[0].status, ItemStatus::AlreadySatisfied);
    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(fx.tenant.site_grant_calls(), 2);
    assert_eq!(fx.tenant.site_permissions(&site).len(), 1);

    fx.tenant.hide_site_permissions();
    let report = grant_site_permission(&fx.tenant, &write, VerifyPolicy::default())
        .await
        .unwrap();
    assert_eq!(report.items[0].status, ItemStatus::AlreadySatisfied);
    assert_eq!(report.outcome, Outcome::SucceededWithWarnings);
    assert_eq!(report.items[1].label, "Verification");
}

#[tokio::test]
async fn test_failed_upgrade_is_not_verified_by_lower_grant() {
    let fx = Fixture::new();
    fx.identity().await;

    let read = fx.site_plan(SitePermissionLevel::Read);
    grant_site_permission(&fx.tenant, &read, VerifyPolicy::default())
        .await
        .unwrap();
    fx.tenant.fail_site_grant("Access denied. You do not have permission to perform this action");

    let report = grant_site_permission(
        &fx.tenant,
        &fx.site_plan(SitePermissionLevel::Write),
        VerifyPolicy::polling(2, Duration::from_millis(1)),
    )
    .await
    .unwrap();

    assert_eq!(report.items[0].status, ItemStatus::Failed);
    assert_eq!(report.outcome, Outcome::PartiallyFailed);
    let warning = report
        .items
        .iter()
        .find(|item| item.label == "Verification")
        .unwrap();
    assert_eq!(warning.status, ItemStatus::Warning);
    assert!(report
        .manual_follow_up
        .iter()
        .any(|step| step.contains("Re-check")));
}

#[tokio::test]
async fn test_other_site_grant_errors_are_reported_not_fatal() {
    let fx = Fixture::new();
    fx.identity().await;
    fx.tenant.fail_site_grant("Access denied. You do not have permission to perform this action");

    let report = grant_site_permission(
        &fx.tenant,
        &fx.site_plan(SitePermissionLevel::Write),
        VerifyPolicy::polling(2, Duration::from_millis(1)),
    )
    .await
    .unwrap();

    assert_eq!(report.items[0].status, ItemStatus::Failed);
    assert_eq!(report.outcome, Outcome::PartiallyFailed);
    assert!(report.items.iter().any(|item| item.label == "Verification"));
    assert_eq!(fx.tenant.site_grant_calls(), 1);
}
