//! # Device-flow access token cache
//!
//! One JSON file per client name under the cache directory
//! (`<home>/.awsssohelper` by default). The file is overwritten on every
//! successful login and never appended to.
//!
//! A cached token is reused only when it has not outlived its declared lifetime
//! and a live probe against the SSO portal accepts it. Anything else (missing
//! file, unreadable JSON, expired, rejected, minted for another portal) is a
//! [`CacheMiss`], which the caller answers with a fresh device flow.
//!
//! Concurrent writers to the same client name are not coordinated; the last
//! write wins.

use crate::app::clock::Clock;
use crate::app::errors::HelperError;
use crate::app::sso_service::SsoService;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default cache directory name, relative to the home directory.
pub const DEFAULT_CACHE_DIR_NAME: &str = ".awsssohelper";

/// An access token persisted between invocations.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    pub logged_at: DateTime<Utc>,
    /// Lifetime in seconds declared by the service at issue time.
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("logged_at", &self.logged_at)
            .field("expires_in", &self.expires_in)
            .field("start_url", &self.start_url)
            .field("region", &self.region)
            .finish()
    }
}

impl CachedToken {
    /// Elapsed time since `logged_at` has reached the declared lifetime.
    ///
    /// Both sides are compared in seconds. A lifetime that is not positive or
    /// cannot be represented counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => self.expires_in <= 0 || now >= expires_at,
            None => true,
        }
    }

    /// `None` when `logged_at + expires_in` is out of range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| self.logged_at.checked_add_signed(lifetime))
    }

    /// Whether the token was minted for this portal and region. Tokens written
    /// without that information are assumed to match.
    pub fn matches(&self, start_url: &str, region: &str) -> bool {
        let url_matches = self
            .start_url
            .as_deref()
            .map_or(true, |url| url.trim_end_matches('/') == start_url.trim_end_matches('/'));
        let region_matches = self.region.as_deref().map_or(true, |r| r == region);
        url_matches && region_matches
    }
}

/// Why a cached token could not be reused.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheMiss {
    Absent,
    Corrupt(String),
    Expired,
    Rejected(String),
    Mismatch,
    RefreshForced,
}

impl fmt::Display for CacheMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMiss::Absent => write!(f, "no cached token"),
            CacheMiss::Corrupt(msg) => write!(f, "cached token is unreadable: {}", msg),
            CacheMiss::Expired => write!(f, "cached token has expired"),
            CacheMiss::Rejected(msg) => write!(f, "cached token was rejected: {}", msg),
            CacheMiss::Mismatch => write!(f, "cached token belongs to another portal or region"),
            CacheMiss::RefreshForced => write!(f, "refresh requested"),
        }
    }
}

/// Owns the cache directory and the load/check/save lifecycle of tokens in it.
#[derive(Debug, Clone)]
pub struct TokenCacheManager {
    cache_dir: PathBuf,
}

impl TokenCacheManager {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// `<home>/.awsssohelper`, if a home directory can be determined.
    pub fn default_cache_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_CACHE_DIR_NAME))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file for `client_name`.
    pub fn token_path(&self, client_name: &str) -> PathBuf {
        self.cache_dir.join(client_name)
    }

    /// Read a cached token. Missing and malformed files are both misses.
    pub fn load(&self, path: &Path) -> Result<CachedToken, CacheMiss> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cached token at {:?}", path);
                return Err(CacheMiss::Absent);
            }
            Err(e) => {
                warn!("Failed to read cached token {:?}: {}", path, e);
                return Err(CacheMiss::Corrupt(e.to_string()));
            }
        };

        serde_json::from_str::<CachedToken>(&contents).map_err(|e| {
            warn!("Failed to parse cached token {:?}: {}", path, e);
            CacheMiss::Corrupt(e.to_string())
        })
    }

    pub fn is_expired(&self, token: &CachedToken, clock: &dyn Clock) -> bool {
        token.is_expired_at(clock.now())
    }

    /// Probe the SSO portal with the token. Any failure means invalid.
    pub fn is_valid(&self, service: &dyn SsoService, token: &CachedToken) -> bool {
        self.probe(service, token).is_ok()
    }

    fn probe(&self, service: &dyn SsoService, token: &CachedToken) -> Result<(), CacheMiss> {
        service.check_token(&token.access_token).map_err(|e| {
            debug!("Token probe failed: {}", e);
            CacheMiss::Rejected(e.to_string())
        })
    }

    /// Load the token for `client_name` and decide whether it can be reused.
    ///
    /// The expiry check runs before the probe so an expired token costs no
    /// network round trip.
    pub fn lookup(
        &self,
        client_name: &str,
        start_url: &str,
        region: &str,
        service: &dyn SsoService,
        clock: &dyn Clock,
    ) -> Result<CachedToken, CacheMiss> {
        let token = self.load(&self.token_path(client_name))?;

        if !token.matches(start_url, region) {
            return Err(CacheMiss::Mismatch);
        }
        let Some(expires_at) = token.expires_at() else {
            warn!(
                "Cached token for client '{}' has an out-of-range lifetime of {}s",
                client_name, token.expires_in
            );
            return Err(CacheMiss::Corrupt(format!(
                "expiresIn {} is out of range",
                token.expires_in
            )));
        };
        if self.is_expired(&token, clock) {
            return Err(CacheMiss::Expired);
        }
        self.probe(service, &token)?;

        info!(
            "Reusing cached access token for client '{}' (expires {})",
            client_name, expires_at
        );
        Ok(token)
    }

    /// Write `token` to `path`, replacing any previous content.
    pub fn save(&self, path: &Path, token: &CachedToken) -> Result<(), HelperError> {
        let cache_error = |message: String| HelperError::Cache {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| cache_error(format!("Failed to create cache directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(token)
            .map_err(|e| cache_error(format!("Failed to serialize token: {}", e)))?;

        let temp_path = path.with_extension("tmp");
        let mut file = open_private(&temp_path)
            .map_err(|e| cache_error(format!("Failed to create temp file: {}", e)))?;
        file.write_all(json.as_bytes())
            .map_err(|e| cache_error(format!("Failed to write temp file: {}", e)))?;
        drop(file);

        fs::rename(&temp_path, path)
            .map_err(|e| cache_error(format!("Failed to replace cache file: {}", e)))?;

        debug!("Cached access token written to {:?}", path);
        Ok(())
    }
}

/// Create or truncate `path`, readable by the owner only on Unix.
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
