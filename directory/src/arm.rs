//! Azure Resource Manager client for automation-account certificates.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use credentials::{IdentityMaterial, Passphrase};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::clients::ResourceManagerClient;
use crate::error::Result;
use crate::http::send_json;
use crate::session::{Session, TokenProvider};
use crate::types::CertificateImport;

pub const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";
pub const AUTOMATION_API_VERSION: &str = "2023-11-01";

const SERVICE: &str = "Azure Resource Manager";

pub struct ArmClient {
    http: reqwest::Client,
    base: String,
    subscription_id: String,
    session: Session,
}

impl ArmClient {
    pub async fn connect(
        base_url: &str,
        subscription_id: impl Into<String>,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let base = base_url.trim_end_matches('/').to_string();
        let session = Session::open(SERVICE, base.clone(), provider).await?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            subscription_id: subscription_id.into(),
            session,
        })
    }

    pub fn close(&self) {
        self.session.close();
    }

    fn certificate_url(&self, request: &CertificateImport) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Automation/automationAccounts/{}/certificates/{}?api-version={}",
            self.base,
            self.subscription_id,
            request.resource_group,
            request.automation_account,
            request.certificate_name,
            AUTOMATION_API_VERSION
        )
    }
}

#[async_trait]
impl ResourceManagerClient for ArmClient {
    async fn import_certificate(
        &self,
        request: &CertificateImport,
        passphrase: &Passphrase,
    ) -> Result<()> {
        let material = IdentityMaterial::from_pfx(&request.pfx_path, passphrase)?;
        let thumbprint = material.thumbprint()?;
        let body = json!({
            "name": request.certificate_name,
            "properties": {
                "base64Value": BASE64.encode(material.to_import_pkcs12()?),
                "thumbprint": thumbprint,
                "isExportable": request.exportable,
                "description": request.description.clone().unwrap_or_default(),
            }
        });

        let _: Value = send_json(
            &self.session,
            self.http.put(self.certificate_url(request)).json(&body),
        )
        .await?;
        info!(
            automation_account = %request.automation_account,
            certificate = %request.certificate_name,
            %thumbprint,
            "Certificate imported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticTokenProvider;
    use credentials::MaterialSpec;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn exported_pfx(dir: &TempDir, passphrase: &Passphrase) -> (std::path::PathBuf, String) {
        let mut spec = MaterialSpec::for_display_name("ARM Test");
        spec.validity_days = 30;
        let material = IdentityMaterial::generate(&spec).unwrap();
        let artifacts = material.export(dir.path(), "arm-test-cert", passphrase).unwrap();
        (artifacts.private_path, artifacts.thumbprint)
    }

    fn import_request(pfx_path: std::path::PathBuf) -> CertificateImport {
        CertificateImport {
            automation_account: "aa1".to_string(),
            resource_group: "rg1".to_string(),
            certificate_name: "arm-test-cert".to_string(),
            pfx_path,
            exportable: false,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_import_puts_non_exportable_certificate() {
        let dir = TempDir::new().unwrap();
        let passphrase = Passphrase::new("correct horse").unwrap();
        let (pfx_path, thumbprint) = exported_pfx(&dir, &passphrase);

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.Automation/automationAccounts/aa1/certificates/arm-test-cert",
            ))
            .and(query_param("api-version", AUTOMATION_API_VERSION))
            .and(body_partial_json(json!({
                "properties": { "isExportable": false, "thumbprint": thumbprint }
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "name": "arm-test-cert" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(StaticTokenProvider::new("t"));
        let arm = ArmClient::connect(&server.uri(), "sub-1", provider)
            .await
            .unwrap();
        arm.import_certificate(&import_request(pfx_path), &passphrase)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_import_with_wrong_passphrase_fails_before_upload() {
        let dir = TempDir::new().unwrap();
        let passphrase = Passphrase::new("correct horse").unwrap();
        let (pfx_path, _) = exported_pfx(&dir, &passphrase);

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = Arc::new(StaticTokenProvider::new("t"));
        let arm = ArmClient::connect(&server.uri(), "sub-1", provider)
            .await
            .unwrap();
        let wrong = Passphrase::new("battery staple").unwrap();
        let err = arm
            .import_certificate(&import_request(pfx_path), &wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::ClientError::Certificate(_)));
    }

    #[tokio::test]
    async fn test_missing_automation_account_reports_status() {
        let dir = TempDir::new().unwrap();
        let passphrase = Passphrase::new("correct horse").unwrap();
        let (pfx_path, _) = exported_pfx(&dir, &passphrase);

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": "ResourceNotFound",
                    "message": "The Resource 'aa1' was not found."
                }
            })))
            .mount(&server)
            .await;

        let provider = Arc::new(StaticTokenProvider::new("t"));
        let arm = ArmClient::connect(&server.uri(), "sub-1", provider)
            .await
            .unwrap();
        let err = arm
            .import_certificate(&import_request(pfx_path), &passphrase)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("ResourceNotFound"));
    }
}
