//! Error types surfaced by the credential helper.
//!
//! Only conditions that leave the helper unable to produce any credential are
//! modelled here. Cache misses, cancelled pickers and browser launch failures
//! are absorbed where they happen and never reach the caller as errors.

use std::fmt;
use std::path::PathBuf;

/// A failed call against the SSO or SSO OIDC service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    /// SDK operation name, e.g. `ListAccounts`.
    pub operation: &'static str,
    pub message: String,
}

impl ServiceError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

impl std::error::Error for ServiceError {}

/// Errors returned by the helper pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum HelperError {
    /// No usable region or start URL after configuration layering.
    Configuration(String),
    /// Registering the OIDC client or starting the device authorization failed.
    AuthRegistration(ServiceError),
    /// No access token was issued before the poll timeout elapsed.
    AuthTimeout { timeout_secs: u64 },
    /// The user denied the request or the device code expired.
    AuthRejected(String),
    /// The access token was refused while listing accounts.
    AccountListing(ServiceError),
    /// The token cache could not be written.
    Cache { path: PathBuf, message: String },
    /// Any other service failure that stops the pipeline.
    Service(ServiceError),
    /// The credentials cannot be rendered in the requested format.
    Output(String),
}

impl fmt::Display for HelperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            HelperError::AuthRegistration(err) => {
                write!(f, "Failed to start device authorization: {}", err)
            }
            HelperError::AuthTimeout { timeout_secs } => write!(
                f,
                "No access token was obtained within {} seconds",
                timeout_secs
            ),
            HelperError::AuthRejected(msg) => write!(f, "Device authorization rejected: {}", msg),
            HelperError::AccountListing(err) => write!(
                f,
                "Failed to list accounts ({}). Run again with --refresh-access-token to force a new login",
                err
            ),
            HelperError::Cache { path, message } => {
                write!(f, "Token cache error at {}: {}", path.display(), message)
            }
            HelperError::Service(err) => write!(f, "{}", err),
            HelperError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for HelperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HelperError::AuthRegistration(err)
            | HelperError::AccountListing(err)
            | HelperError::Service(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ServiceError> for HelperError {
    fn from(err: ServiceError) -> Self {
        HelperError::Service(err)
    }
}
