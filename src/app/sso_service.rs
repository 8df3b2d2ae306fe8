//! # SSO and SSO OIDC service capability
//!
//! The device flow, the token cache probe and the credential resolver only talk
//! to AWS through the [`SsoService`] trait. [`AwsSsoService`] is the production
//! implementation on top of `aws-sdk-ssooidc` and `aws-sdk-sso`; tests drive the
//! same state machines with an in-memory fake.
//!
//! The SDK is async while the helper is a linear, blocking pipeline, so the AWS
//! implementation owns a Tokio runtime and resolves every request with
//! `block_on` before returning.

use crate::app::credentials::RoleCredential;
use crate::app::errors::{HelperError, ServiceError};
use aws_config::BehaviorVersion;
use aws_sdk_sso::Client as SsoClient;
use aws_sdk_ssooidc::Client as SsoOidcClient;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Grant type used to exchange a device code for an access token.
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Credentials of an OIDC client registered for one device flow.
#[derive(Clone, PartialEq)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// An in-progress device authorization. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAuthorization {
    pub registration: ClientRegistration,
    pub verification_uri: String,
    /// Verification URL with the user code embedded, when the service provides one.
    pub verification_uri_complete: Option<String>,
    pub user_code: String,
    pub device_code: String,
    /// Seconds until the device code lapses.
    pub expires_in: i64,
    /// Polling interval suggested by the service, in seconds.
    pub interval: i64,
}

/// A freshly issued access token.
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: Option<String>,
    /// Lifetime in seconds declared by the service.
    pub expires_in: i64,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// An account the access token can reach.
#[derive(Debug, Clone, PartialEq)]
pub struct SsoAccount {
    pub account_id: String,
    pub account_name: String,
    pub email: Option<String>,
}

impl SsoAccount {
    /// Label shown in the interactive account picker.
    pub fn label(&self) -> String {
        match &self.email {
            Some(email) => format!("{} ({}) {}", self.account_name, self.account_id, email),
            None => format!("{} ({})", self.account_name, self.account_id),
        }
    }
}

/// Outcome of one token poll that did not yield a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenPollError {
    /// The user has not completed the browser login yet.
    Pending,
    /// The service asks the client to poll less often.
    SlowDown,
    /// The user denied the authorization request.
    Denied(String),
    /// The device code lapsed before the user approved it.
    Expired(String),
    /// Any other failure.
    Service(ServiceError),
}

/// The SSO OIDC and SSO portal operations the helper depends on.
pub trait SsoService {
    fn register_client(
        &self,
        client_name: &str,
        client_type: &str,
    ) -> Result<ClientRegistration, ServiceError>;

    fn start_device_authorization(
        &self,
        registration: &ClientRegistration,
        start_url: &str,
    ) -> Result<DeviceAuthorization, ServiceError>;

    fn create_token(
        &self,
        authorization: &DeviceAuthorization,
    ) -> Result<TokenGrant, TokenPollError>;

    /// All accounts reachable with `access_token`, in service order.
    fn list_accounts(&self, access_token: &str) -> Result<Vec<SsoAccount>, ServiceError>;

    /// Role names available in `account_id`, in service order.
    fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<String>, ServiceError>;

    fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredential, ServiceError>;

    /// Side-effect-free call that succeeds only for a live token.
    fn check_token(&self, access_token: &str) -> Result<(), ServiceError> {
        self.list_accounts(access_token).map(|_| ())
    }
}

/// [`SsoService`] backed by the AWS SDK, pinned to one region.
pub struct AwsSsoService {
    runtime: Runtime,
    oidc_client: SsoOidcClient,
    sso_client: SsoClient,
    region: String,
}

impl fmt::Debug for AwsSsoService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSsoService")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AwsSsoService {
    /// Build SDK clients for `region`.
    ///
    /// No ambient AWS credentials are loaded: every SSO portal call is
    /// authorized by the bearer access token instead.
    pub fn new(region: &str) -> Result<Self, HelperError> {
        let rt_start = std::time::Instant::now();
        let runtime = Runtime::new().map_err(|e| {
            HelperError::Configuration(format!("Failed to create Tokio runtime: {}", e))
        })?;
        debug!("Runtime creation took {:?}", rt_start.elapsed());

        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .no_credentials()
                .load(),
        );

        info!("SSO clients configured for region {}", region);

        Ok(Self {
            oidc_client: SsoOidcClient::new(&config),
            sso_client: SsoClient::new(&config),
            runtime,
            region: region.to_string(),
        })
    }

    async fn list_accounts_async(
        &self,
        access_token: &str,
        max_pages: Option<usize>,
        page_size: Option<i32>,
    ) -> Result<Vec<SsoAccount>, ServiceError> {
        let mut accounts = Vec::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let resp = self
                .sso_client
                .list_accounts()
                .access_token(access_token)
                .set_max_results(page_size)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    ServiceError::new(
                        "ListAccounts",
                        aws_sdk_sso::error::DisplayErrorContext(&e).to_string(),
                    )
                })?;
            pages += 1;

            for account in resp.account_list.unwrap_or_default() {
                accounts.push(SsoAccount {
                    account_id: account.account_id.unwrap_or_default(),
                    account_name: account.account_name.unwrap_or_default(),
                    email: account.email_address,
                });
            }

            match resp.next_token {
                Some(token) if !token.is_empty() && max_pages.map_or(true, |max| pages < max) => {
                    next_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(accounts)
    }

    async fn list_account_roles_async(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let mut roles = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .sso_client
                .list_account_roles()
                .access_token(access_token)
                .account_id(account_id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    ServiceError::new(
                        "ListAccountRoles",
                        aws_sdk_sso::error::DisplayErrorContext(&e).to_string(),
                    )
                })?;

            roles.extend(
                resp.role_list
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|role| role.role_name),
            );

            match resp.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(roles)
    }
}

impl SsoService for AwsSsoService {
    fn register_client(
        &self,
        client_name: &str,
        client_type: &str,
    ) -> Result<ClientRegistration, ServiceError> {
        let resp = self
            .runtime
            .block_on(
                self.oidc_client
                    .register_client()
                    .client_name(client_name)
                    .client_type(client_type)
                    .send(),
            )
            .map_err(|e| {
                ServiceError::new(
                    "RegisterClient",
                    aws_sdk_ssooidc::error::DisplayErrorContext(&e).to_string(),
                )
            })?;

        match (resp.client_id, resp.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(ClientRegistration {
                client_id,
                client_secret,
            }),
            _ => Err(ServiceError::new(
                "RegisterClient",
                "response did not contain client credentials",
            )),
        }
    }

    fn start_device_authorization(
        &self,
        registration: &ClientRegistration,
        start_url: &str,
    ) -> Result<DeviceAuthorization, ServiceError> {
        let resp = self
            .runtime
            .block_on(
                self.oidc_client
                    .start_device_authorization()
                    .client_id(&registration.client_id)
                    .client_secret(&registration.client_secret)
                    .start_url(start_url)
                    .send(),
            )
            .map_err(|e| {
                ServiceError::new(
                    "StartDeviceAuthorization",
                    aws_sdk_ssooidc::error::DisplayErrorContext(&e).to_string(),
                )
            })?;

        let missing = |field: &str| {
            ServiceError::new(
                "StartDeviceAuthorization",
                format!("response did not contain {}", field),
            )
        };

        Ok(DeviceAuthorization {
            registration: registration.clone(),
            device_code: resp.device_code.ok_or_else(|| missing("deviceCode"))?,
            user_code: resp.user_code.ok_or_else(|| missing("userCode"))?,
            verification_uri: resp
                .verification_uri
                .ok_or_else(|| missing("verificationUri"))?,
            verification_uri_complete: resp.verification_uri_complete,
            expires_in: resp.expires_in as i64,
            interval: resp.interval as i64,
        })
    }

    fn create_token(
        &self,
        authorization: &DeviceAuthorization,
    ) -> Result<TokenGrant, TokenPollError> {
        let result = self.runtime.block_on(
            self.oidc_client
                .create_token()
                .client_id(&authorization.registration.client_id)
                .client_secret(&authorization.registration.client_secret)
                .device_code(&authorization.device_code)
                .grant_type(DEVICE_CODE_GRANT_TYPE)
                .send(),
        );

        match result {
            Ok(resp) => match resp.access_token {
                Some(access_token) => Ok(TokenGrant {
                    access_token,
                    token_type: resp.token_type,
                    expires_in: resp.expires_in as i64,
                }),
                None => Err(TokenPollError::Service(ServiceError::new(
                    "CreateToken",
                    "response did not contain an access token",
                ))),
            },
            Err(err) => {
                let message = aws_sdk_ssooidc::error::DisplayErrorContext(&err).to_string();
                match err.as_service_error() {
                    Some(e) if e.is_authorization_pending_exception() => {
                        Err(TokenPollError::Pending)
                    }
                    Some(e) if e.is_slow_down_exception() => Err(TokenPollError::SlowDown),
                    Some(e) if e.is_access_denied_exception() => {
                        Err(TokenPollError::Denied(message))
                    }
                    Some(e) if e.is_expired_token_exception() => {
                        Err(TokenPollError::Expired(message))
                    }
                    _ => Err(TokenPollError::Service(ServiceError::new(
                        "CreateToken",
                        message,
                    ))),
                }
            }
        }
    }

    fn list_accounts(&self, access_token: &str) -> Result<Vec<SsoAccount>, ServiceError> {
        self.runtime
            .block_on(self.list_accounts_async(access_token, None, None))
    }

    fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        self.runtime
            .block_on(self.list_account_roles_async(access_token, account_id))
    }

    fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredential, ServiceError> {
        let resp = self
            .runtime
            .block_on(
                self.sso_client
                    .get_role_credentials()
                    .access_token(access_token)
                    .account_id(account_id)
                    .role_name(role_name)
                    .send(),
            )
            .map_err(|e| {
                ServiceError::new(
                    "GetRoleCredentials",
                    aws_sdk_sso::error::DisplayErrorContext(&e).to_string(),
                )
            })?;

        let creds = resp.role_credentials.ok_or_else(|| {
            ServiceError::new("GetRoleCredentials", "response did not contain credentials")
        })?;

        Ok(RoleCredential {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            access_key: creds.access_key_id.unwrap_or_default(),
            secret_key: creds.secret_access_key.unwrap_or_default(),
            session_token: creds.session_token.unwrap_or_default(),
            expiration: expiration_from_millis(creds.expiration),
        })
    }

    fn check_token(&self, access_token: &str) -> Result<(), ServiceError> {
        self.runtime
            .block_on(self.list_accounts_async(access_token, Some(1), Some(1)))
            .map(|_| ())
    }
}

/// Role credential expirations are reported as epoch milliseconds.
pub fn expiration_from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}
