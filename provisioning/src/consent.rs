use url::Url;

use crate::error::{ProvisioningError, Result};

/// Scope requested on the consent prompt.
pub const CONSENT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Admin consent URL for the operator to open. Nothing here completes consent.
pub fn admin_consent_url(login_base: &str, tenant_id: &str, application_id: &str) -> Result<Url> {
    let base = format!(
        "{}/{}/v2.0/adminconsent",
        login_base.trim_end_matches('/'),
        tenant_id
    );
    Url::parse_with_params(
        &base,
        &[("client_id", application_id), ("scope", CONSENT_SCOPE)],
    )
    .map_err(|e| ProvisioningError::InvalidInput(format!("cannot build consent URL: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_url_embeds_tenant_app_and_scope() {
        let url = admin_consent_url(
            "https://login.microsoftonline.com/",
            "72f988bf-86f1-41af-91ab-2d7cd011db47",
            "3f2b6c1e-8d4a-4c2b-9a7e-1b2c3d4e5f60",
        )
        .unwrap();

        assert_eq!(
            url.path(),
            "/72f988bf-86f1-41af-91ab-2d7cd011db47/v2.0/adminconsent"
        );
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("client_id".to_string(), "3f2b6c1e-8d4a-4c2b-9a7e-1b2c3d4e5f60".to_string()),
                ("scope".to_string(), CONSENT_SCOPE.to_string()),
            ]
        );
    }
}
