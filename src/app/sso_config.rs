//! Configuration layering for the credential helper.
//!
//! Values are taken, highest precedence first, from the command line, from an
//! optional `sso.json` settings file in the cache directory, from the ambient
//! AWS region chain (region only), and finally from built-in defaults.
//!
//! # sso.json Format
//!
//! ```json
//! {
//!   "startUrl": "https://d-xxxxxxxxxx.awsapps.com/start",
//!   "region": "us-east-1",
//!   "clientName": "default",
//!   "roleName": "ReadOnly",
//!   "timeoutInSeconds": 120
//! }
//! ```
//!
//! Every field is optional. A file that cannot be parsed is ignored.

use crate::app::credentials::OutputFormat;
use crate::app::device_auth::poll_timeout;
use crate::app::errors::HelperError;
use crate::app::token_cache::TokenCacheManager;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SETTINGS_FILE_NAME: &str = "sso.json";
pub const DEFAULT_CLIENT_NAME: &str = "default";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// OIDC client type used at registration. AWS SSO only accepts public clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ClientType {
    #[default]
    Public,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Public => "public",
        }
    }
}

/// Settings loaded from `sso.json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SsoConfig {
    pub start_url: Option<String>,
    pub region: Option<String>,
    pub client_name: Option<String>,
    pub role_name: Option<String>,
    pub timeout_in_seconds: Option<u64>,
}

impl SsoConfig {
    /// Load `sso.json` from `dir`. Returns None if the file doesn't exist or is invalid.
    pub fn load_from_dir(dir: &Path) -> Option<Self> {
        Self::load_from_path(dir.join(SETTINGS_FILE_NAME))
    }

    /// Load settings from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();

        if !path.exists() {
            debug!("No settings file found at {:?}", path);
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<SsoConfig>(&contents) {
                Ok(config) => {
                    debug!(
                        "Loaded settings: start_url={:?}, region={:?}, client={:?}",
                        config.start_url, config.region, config.client_name
                    );
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read {:?}: {}", path, e);
                None
            }
        }
    }
}

/// Expand a portal short name to a full start URL.
///
/// Full URLs are kept as given, minus surrounding whitespace and trailing slashes.
///
/// - "https://ssoins-xxxxxxxxxxxxxxxx.portal.us-east-1.app.aws" -> unchanged
/// - "d-xxxxxxxxxx.awsapps.com" -> "https://d-xxxxxxxxxx.awsapps.com/start"
/// - "d-xxxxxxxxxx" -> "https://d-xxxxxxxxxx.awsapps.com/start"
pub fn normalize_start_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');

    if url.contains("://") {
        url.to_string()
    } else if url.contains(".awsapps.com") {
        if url.ends_with("/start") {
            format!("https://{}", url)
        } else {
            format!("https://{}/start", url)
        }
    } else {
        format!("https://{}.awsapps.com/start", url)
    }
}

/// Options of one invocation, as given on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelperOptions {
    pub start_url: Option<String>,
    pub account_id: Option<String>,
    pub role_name: Option<String>,
    pub all_account_roles: bool,
    pub refresh_access_token: bool,
    pub region: Option<String>,
    pub pass_thru: bool,
    pub client_name: Option<String>,
    pub client_type: ClientType,
    pub timeout_in_seconds: Option<u64>,
    pub cache_path: Option<PathBuf>,
    pub output: OutputFormat,
    pub no_browser: bool,
}

/// Fully layered settings. Every field has a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub start_url: String,
    pub region: String,
    pub account_id: Option<String>,
    pub role_name: Option<String>,
    pub all_account_roles: bool,
    pub refresh_access_token: bool,
    pub pass_thru: bool,
    pub client_name: String,
    pub client_type: ClientType,
    pub timeout_secs: u64,
    pub cache_path: PathBuf,
    pub output: OutputFormat,
    pub no_browser: bool,
}

impl HelperOptions {
    /// Cache directory to use: explicit, else `<home>/.awsssohelper`.
    pub fn cache_dir(&self) -> Result<PathBuf, HelperError> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => TokenCacheManager::default_cache_dir().ok_or_else(|| {
                HelperError::Configuration(
                    "Could not determine the home directory, pass --cache-path".to_string(),
                )
            }),
        }
    }

    /// Layer these options over `file` and the ambient region lookup.
    ///
    /// `ambient_region` is only consulted when neither the command line nor the
    /// settings file name a region.
    pub fn resolve(
        self,
        file: Option<SsoConfig>,
        ambient_region: impl FnOnce() -> Option<String>,
    ) -> Result<ResolvedSettings, HelperError> {
        let cache_path = self.cache_dir()?;
        let file = file.unwrap_or_default();

        let start_url = self
            .start_url
            .or(file.start_url)
            .filter(|url| !url.trim().is_empty())
            .map(|url| normalize_start_url(&url))
            .ok_or_else(|| {
                HelperError::Configuration(
                    "No SSO start URL given, pass --start-url".to_string(),
                )
            })?;

        let region = match self.region.or(file.region) {
            Some(region) => Some(region),
            None => ambient_region(),
        }
        .filter(|region| !region.trim().is_empty())
        .ok_or_else(|| {
            HelperError::Configuration(
                "No default region is configured, pass --region or set AWS_REGION".to_string(),
            )
        })?;

        let timeout_secs = self
            .timeout_in_seconds
            .or(file.timeout_in_seconds)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if poll_timeout(timeout_secs).is_none() {
            return Err(HelperError::Configuration(format!(
                "Timeout of {} seconds is out of range",
                timeout_secs
            )));
        }

        Ok(ResolvedSettings {
            start_url,
            region,
            account_id: self.account_id,
            role_name: self.role_name.or(file.role_name),
            all_account_roles: self.all_account_roles,
            refresh_access_token: self.refresh_access_token,
            pass_thru: self.pass_thru,
            client_name: self
                .client_name
                .or(file.client_name)
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            client_type: self.client_type,
            timeout_secs,
            cache_path,
            output: self.output,
            no_browser: self.no_browser,
        })
    }
}

/// Region from the AWS default chain (`AWS_REGION`, `AWS_DEFAULT_REGION`, profile).
pub fn ambient_region() -> Option<String> {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("Failed to create runtime for region lookup: {}", e);
            return None;
        }
    };

    runtime
        .block_on(
            aws_config::meta::region::RegionProviderChain::default_provider().region(),
        )
        .map(|region| region.to_string())
}
