use directory::{DEFAULT_GRAPH_URL, DEFAULT_LOGIN_URL, DEFAULT_MANAGEMENT_URL};
use std::env;

/// Service base URLs, overridable for sovereign clouds and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub graph: String,
    pub management: String,
    pub login: String,
}

impl Endpoints {
    pub fn from_env() -> Self {
        Self {
            graph: var_or("CALPROV_GRAPH_URL", DEFAULT_GRAPH_URL),
            management: var_or("CALPROV_MANAGEMENT_URL", DEFAULT_MANAGEMENT_URL),
            login: var_or("CALPROV_LOGIN_URL", DEFAULT_LOGIN_URL),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
