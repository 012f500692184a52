//! Provisioning pipeline for the calendar automation identity.
//!
//! Three independently re-runnable stages:
//!
//! 1. [`identity::provision_identity`] creates the certificate and the
//!    application registration, imports the certificate into the automation
//!    account, and writes the [`state::ProvisioningState`] record.
//! 2. [`tenant_grants::grant_tenant_permissions`] assigns every application
//!    role in the [`catalog::GrantCatalog`] to the service principal.
//! 3. [`site_grant::grant_site_permission`] grants access to one site.
//!
//! Stages 2 and 3 read the state record but do not depend on each other.
//! Each returns a [`report::StageReport`]; only pre-flight and required
//! mutation failures are returned as errors.

pub mod catalog;
pub mod classify;
pub mod consent;
pub mod error;
pub mod identity;
pub mod report;
pub mod site_grant;
pub mod site_locator;
pub mod state;
pub mod tenant_grants;
pub mod verify;

pub use catalog::{GrantCatalog, PermissionGrant, ResourceGrants, RoleGrant};
pub use classify::{classify_client_error, classify_grant_error, GrantErrorClass};
pub use consent::{admin_consent_url, CONSENT_SCOPE};
pub use error::{ProvisioningError, Result};
pub use identity::{
    provision_identity, IdentityOutcome, IdentityRequest, ImportTarget, DEFAULT_DISPLAY_NAME,
};
pub use report::{Fact, ItemStatus, Outcome, ReportItem, Stage, StageReport};
pub use site_grant::{grant_site_permission, SiteGrantPlan};
pub use site_locator::SiteLocator;
pub use state::{
    resolve_target, ProvisioningState, ResolvedTarget, StateStore, DEFAULT_STATE_FILE,
    STATE_SCHEMA_VERSION,
};
pub use tenant_grants::{grant_tenant_permissions, TenantGrantRequest};
pub use verify::VerifyPolicy;
