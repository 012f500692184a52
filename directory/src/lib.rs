//! Clients for the remote services the provisioning stages talk to: the
//! identity directory (Microsoft Graph), Azure Resource Manager for the
//! automation account, and the SharePoint admin endpoint for site grants.
//!
//! Each service is reached through an explicit [`Session`] that is opened
//! before use and closed when the client is dropped. Stage logic depends on
//! the traits in [`clients`] so it can run against [`InMemoryTenant`].

pub mod arm;
pub mod clients;
pub mod error;
pub mod graph;
mod http;
pub mod memory;
pub mod session;
pub mod sites;
pub mod types;

pub use arm::{ArmClient, AUTOMATION_API_VERSION, DEFAULT_MANAGEMENT_URL};
pub use clients::{DirectoryClient, ResourceManagerClient, SiteAdminClient};
pub use error::{ClientError, Result};
pub use graph::{GraphDirectoryClient, DEFAULT_GRAPH_URL};
pub use memory::{ImportedCertificate, InMemoryTenant};
pub use session::{
    token_provider_from_env, AzureCliTokenProvider, ClientSecretTokenProvider, Session,
    StaticTokenProvider, TokenProvider, DEFAULT_LOGIN_URL,
};
pub use sites::GraphSiteAdminClient;
pub use types::*;
