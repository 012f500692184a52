use std::fmt;
use url::Url;

use crate::error::{ProvisioningError, Result};

const SHAREPOINT_SUFFIX: &str = ".sharepoint.com";

/// A validated collaboration-site URL and the tenant it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLocator {
    url: Url,
    tenant: String,
}

impl SiteLocator {
    /// Accepts `https://<tenant>.sharepoint.com/...` and the matching
    /// `-my` personal-site host. Admin hosts are rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| ProvisioningError::InvalidSiteUrl {
            url: input.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(input.trim()).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "https" {
            return Err(invalid("site URL must use https"));
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("site URL has no host"))?
            .to_ascii_lowercase();
        let label = host
            .strip_suffix(SHAREPOINT_SUFFIX)
            .ok_or_else(|| invalid("host must end with .sharepoint.com"))?;
        if label.is_empty() || label.contains('.') {
            return Err(invalid("host must be <tenant>.sharepoint.com"));
        }
        if label.ends_with("-admin") {
            return Err(invalid("this is the admin endpoint, not a site"));
        }

        let tenant = label.strip_suffix("-my").unwrap_or(label);
        if tenant.is_empty() {
            return Err(invalid("host must be <tenant>.sharepoint.com"));
        }

        Ok(Self {
            tenant: tenant.to_string(),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// `https://<tenant>-admin.sharepoint.com`
    pub fn admin_endpoint(&self) -> Result<Url> {
        let endpoint = format!("https://{}-admin{}", self.tenant, SHAREPOINT_SUFFIX);
        Url::parse(&endpoint).map_err(|e| ProvisioningError::InvalidSiteUrl {
            url: self.url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for SiteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
