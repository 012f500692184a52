pub mod endpoints;
pub mod env_paths;
