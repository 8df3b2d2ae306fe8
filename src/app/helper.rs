//! End-to-end pipeline: cached token or device flow, then role credentials.
//!
//! ```text
//! TokenCacheManager --miss--> DeviceAuthFlow --token--> save
//!        |                                        |
//!        +-----------------hit--------------------+
//!                          v
//!                 CredentialResolver --> Vec<RoleCredential>
//! ```

use crate::app::clock::Clock;
use crate::app::credentials::{CredentialRequest, CredentialResolver, RoleCredential};
use crate::app::device_auth::{BrowserLauncher, DeviceAuthFlow, DeviceFlowRequest};
use crate::app::errors::HelperError;
use crate::app::picker::Picker;
use crate::app::sso_config::ResolvedSettings;
use crate::app::sso_service::SsoService;
use crate::app::token_cache::{CacheMiss, CachedToken, TokenCacheManager};
use tracing::{info, warn};

/// Wires the capabilities of one invocation together.
pub struct SsoHelper<'a> {
    service: &'a dyn SsoService,
    picker: &'a dyn Picker,
    clock: &'a dyn Clock,
    browser: &'a dyn BrowserLauncher,
}

impl<'a> SsoHelper<'a> {
    pub fn new(
        service: &'a dyn SsoService,
        picker: &'a dyn Picker,
        clock: &'a dyn Clock,
        browser: &'a dyn BrowserLauncher,
    ) -> Self {
        Self {
            service,
            picker,
            clock,
            browser,
        }
    }

    /// A usable access token, from the cache when possible.
    ///
    /// Cache misses of every kind fall through to a new device-flow login. A
    /// refreshed token that cannot be written back is still returned.
    pub fn access_token(&self, settings: &ResolvedSettings) -> Result<CachedToken, HelperError> {
        let cache = TokenCacheManager::new(&settings.cache_path);

        let cached = if settings.refresh_access_token {
            Err(CacheMiss::RefreshForced)
        } else {
            cache.lookup(
                &settings.client_name,
                &settings.start_url,
                &settings.region,
                self.service,
                self.clock,
            )
        };

        match cached {
            Ok(token) => return Ok(token),
            Err(miss) => info!("Signing in again: {}", miss),
        }

        let flow = DeviceAuthFlow::new(self.service, self.clock, self.browser);
        let mut token = flow.run(&DeviceFlowRequest {
            start_url: &settings.start_url,
            client_name: &settings.client_name,
            client_type: settings.client_type.as_str(),
            timeout_secs: settings.timeout_secs,
        })?;
        token.region = Some(settings.region.clone());

        if let Err(e) = cache.save(&cache.token_path(&settings.client_name), &token) {
            warn!("{}", e);
        }

        Ok(token)
    }

    /// Resolve role credentials for the accounts and role in `settings`.
    pub fn get_credentials(
        &self,
        settings: &ResolvedSettings,
    ) -> Result<Vec<RoleCredential>, HelperError> {
        let token = self.access_token(settings)?;

        let request = CredentialRequest::new(
            settings.account_id.as_deref(),
            settings.role_name.as_deref(),
            settings.all_account_roles,
        );

        CredentialResolver::new(self.service, self.picker).resolve(&token.access_token, &request)
    }
}
