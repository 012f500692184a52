use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment-based path configuration
#[derive(Debug, Clone)]
pub struct ProvisioningPaths {
    pub state_file: PathBuf,
    pub cert_dir: PathBuf,
    pub grant_catalog: Option<PathBuf>,
}

impl ProvisioningPaths {
    /// Load paths from environment variables with defaults
    pub fn load() -> Result<Self> {
        Self::load_with_base(None)
    }

    /// Load paths from environment variables with an optional base directory
    /// This is primarily for testing purposes
    pub fn load_with_base(base_dir: Option<PathBuf>) -> Result<Self> {
        let base = if let Some(base) = base_dir {
            base
        } else {
            load_dotenv();
            env::current_dir().context("Failed to get current directory")?
        };

        Ok(Self {
            state_file: Self::get_path_from_env(
                "CALPROV_STATE_FILE",
                provisioning::DEFAULT_STATE_FILE,
                &base,
            ),
            cert_dir: Self::get_path_from_env("CALPROV_CERT_DIR", "./certs", &base),
            grant_catalog: env::var("CALPROV_GRANT_CATALOG")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(|value| Self::resolve(PathBuf::from(value), &base)),
        })
    }

    /// Command-line values win over the environment.
    pub fn with_overrides(
        mut self,
        state_file: Option<PathBuf>,
        cert_dir: Option<PathBuf>,
        grant_catalog: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = state_file {
            self.state_file = path;
        }
        if let Some(path) = cert_dir {
            self.cert_dir = path;
        }
        if grant_catalog.is_some() {
            self.grant_catalog = grant_catalog;
        }
        self
    }

    /// Get a path from environment variable or use default
    fn get_path_from_env(var_name: &str, default: &str, base_dir: &Path) -> PathBuf {
        let path_str = env::var(var_name).unwrap_or_else(|_| default.to_string());
        Self::resolve(PathBuf::from(path_str), base_dir)
    }

    fn resolve(path: PathBuf, base_dir: &Path) -> PathBuf {
        if path.is_relative() {
            base_dir.join(path)
        } else {
            path
        }
    }
}

/// Load `.env` from the working directory if one exists.
pub fn load_dotenv() {
    if let Ok(dir) = env::current_dir() {
        let env_file = dir.join(".env");
        if env_file.exists() {
            dotenv::from_path(&env_file).ok();
        }
    }
}
