//! # OAuth 2.0 device authorization flow (RFC 8628) against AWS SSO OIDC
//!
//! ```text
//! register client -> start device authorization -> open browser / print URL
//!                                                        |
//!                      +---------------------------------+
//!                      v
//!                 create token --pending--> sleep 5s --> create token ...
//!                      |                                   |
//!                   success                     elapsed >= timeout
//!                      v                                   v
//!                 CachedToken                        AuthTimeout
//! ```
//!
//! The poll loop blocks the calling thread between attempts. It stops on the
//! first issued token, on a terminal response (denied, device code expired),
//! or once the elapsed time since polling started reaches the timeout.

use crate::app::clock::Clock;
use crate::app::errors::HelperError;
use crate::app::sso_service::{DeviceAuthorization, SsoService, TokenPollError};
use crate::app::token_cache::CachedToken;
use chrono::Duration;
use tracing::{debug, info, warn};

/// Fixed wait between two token polls.
pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Extra wait added each time the service answers `slow_down`.
pub const SLOW_DOWN_INCREMENT: std::time::Duration = std::time::Duration::from_secs(5);

/// The poll timeout as a duration, or `None` when it cannot be represented.
pub fn poll_timeout(timeout_secs: u64) -> Option<Duration> {
    i64::try_from(timeout_secs).ok().and_then(Duration::try_seconds)
}

/// Opens a URL in the user's browser.
pub trait BrowserLauncher {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Launches the platform default browser.
#[derive(Debug, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Never opens anything, so the URL is always printed.
#[derive(Debug, Default)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "browser launch disabled",
        ))
    }
}

/// Parameters of one device-flow login.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFlowRequest<'a> {
    pub start_url: &'a str,
    pub client_name: &'a str,
    pub client_type: &'a str,
    pub timeout_secs: u64,
}

pub struct DeviceAuthFlow<'a> {
    service: &'a dyn SsoService,
    clock: &'a dyn Clock,
    browser: &'a dyn BrowserLauncher,
}

impl<'a> DeviceAuthFlow<'a> {
    pub fn new(
        service: &'a dyn SsoService,
        clock: &'a dyn Clock,
        browser: &'a dyn BrowserLauncher,
    ) -> Self {
        Self {
            service,
            clock,
            browser,
        }
    }

    /// Run the full flow and return a token stamped with the current time.
    pub fn run(&self, request: &DeviceFlowRequest<'_>) -> Result<CachedToken, HelperError> {
        let timeout = poll_timeout(request.timeout_secs).ok_or_else(|| {
            HelperError::Configuration(format!(
                "Timeout of {} seconds is out of range",
                request.timeout_secs
            ))
        })?;

        info!(
            "Starting device authorization for client '{}' at {}",
            request.client_name, request.start_url
        );

        let registration = self
            .service
            .register_client(request.client_name, request.client_type)
            .map_err(HelperError::AuthRegistration)?;

        let authorization = self
            .service
            .start_device_authorization(&registration, request.start_url)
            .map_err(HelperError::AuthRegistration)?;
        debug!(
            "Device authorization started, code valid for {}s, suggested interval {}s",
            authorization.expires_in, authorization.interval
        );

        self.present(&authorization);

        let mut token = self.poll(&authorization, timeout, request.timeout_secs)?;
        token.start_url = Some(request.start_url.to_string());
        Ok(token)
    }

    /// Show the verification URL. Browser launch is best effort.
    fn present(&self, authorization: &DeviceAuthorization) {
        let url = authorization
            .verification_uri_complete
            .as_deref()
            .unwrap_or(&authorization.verification_uri);

        eprintln!(
            "Confirm the code {} in your browser to sign in with AWS SSO.",
            authorization.user_code
        );

        if let Err(e) = self.browser.open(url) {
            warn!("Failed to open browser: {}", e);
            eprintln!("Open the following URL to continue:\n\n    {}\n", url);
        }
    }

    fn poll(
        &self,
        authorization: &DeviceAuthorization,
        timeout: Duration,
        timeout_secs: u64,
    ) -> Result<CachedToken, HelperError> {
        let started = self.clock.now();
        let mut interval = POLL_INTERVAL;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match self.service.create_token(authorization) {
                Ok(grant) => {
                    info!("Access token issued after {} poll attempts", attempts);
                    return Ok(CachedToken {
                        access_token: grant.access_token,
                        token_type: grant.token_type,
                        logged_at: self.clock.now(),
                        expires_in: grant.expires_in,
                        start_url: None,
                        region: None,
                    });
                }
                Err(TokenPollError::Denied(msg)) => {
                    return Err(HelperError::AuthRejected(format!(
                        "the login request was denied ({})",
                        msg
                    )));
                }
                Err(TokenPollError::Expired(msg)) => {
                    return Err(HelperError::AuthRejected(format!(
                        "the device code expired before the login completed ({})",
                        msg
                    )));
                }
                Err(TokenPollError::SlowDown) => {
                    interval += SLOW_DOWN_INCREMENT;
                    debug!("Service asked to slow down, polling every {:?}", interval);
                }
                Err(TokenPollError::Pending) => {
                    debug!("Authorization pending (attempt {})", attempts);
                }
                Err(TokenPollError::Service(e)) => {
                    warn!("Token poll attempt {} failed: {}", attempts, e);
                }
            }

            let elapsed = self.clock.now().signed_duration_since(started);
            if elapsed >= timeout {
                warn!(
                    "Device authorization timed out after {} attempts",
                    attempts
                );
                return Err(HelperError::AuthTimeout { timeout_secs });
            }

            // Never sleep past the deadline, so the last attempt lands on it.
            let remaining = (timeout - elapsed).to_std().unwrap_or_default();
            self.clock.sleep(interval.min(remaining));
        }
    }
}
