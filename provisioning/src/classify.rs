//! Recognising "already granted" rejections from grant calls.

use directory::ClientError;

/// How a failed grant call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantErrorClass {
    /// The grant is already in place; record it as satisfied.
    AlreadyExists,
    Other,
}

/// Lower-case fragments that identify an "already exists" rejection across
/// the directory, resource manager, and site administration services.
const ALREADY_EXISTS_PATTERNS: &[&str] = &[
    "already exists",
    "already exist",
    "already granted",
    "already been granted",
    "already assigned",
    "already has access",
    "already present",
    "roleassignmentexists",
];

pub fn classify_grant_error(message: &str) -> GrantErrorClass {
    let message = message.to_lowercase();
    if ALREADY_EXISTS_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
    {
        GrantErrorClass::AlreadyExists
    } else {
        GrantErrorClass::Other
    }
}

/// A conflict status counts as "already exists" regardless of its message.
pub fn classify_client_error(err: &ClientError) -> GrantErrorClass {
    if err.is_conflict() {
        return GrantErrorClass::AlreadyExists;
    }
    classify_grant_error(&err.to_string())
}
