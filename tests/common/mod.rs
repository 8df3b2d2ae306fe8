//! Shared fakes for the integration tests.

#![allow(dead_code)]

use aws_sso_helper::app::clock::Clock;
use aws_sso_helper::app::credentials::RoleCredential;
use aws_sso_helper::app::device_auth::BrowserLauncher;
use aws_sso_helper::app::errors::ServiceError;
use aws_sso_helper::app::sso_service::{
    ClientRegistration, DeviceAuthorization, SsoAccount, SsoService, TokenGrant, TokenPollError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

pub const START_URL: &str = "https://d-1234567890.awsapps.com/start";
pub const REGION: &str = "us-east-1";

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

/// Clock that only moves when slept on or advanced explicitly.
pub struct ManualClock {
    start: DateTime<Utc>,
    now: Cell<DateTime<Utc>>,
    sleeps: RefCell<Vec<std::time::Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            now: Cell::new(start),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    /// Time moved since construction.
    pub fn now_offset(&self) -> Duration {
        self.now.get() - self.start
    }

    pub fn sleeps(&self) -> Vec<std::time::Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: std::time::Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(Duration::from_std(duration).unwrap());
    }
}

/// Browser that records the URLs it was asked to open.
#[derive(Default)]
pub struct RecordingBrowser {
    pub fail: bool,
    opened: RefCell<Vec<String>>,
}

impl RecordingBrowser {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.opened.borrow_mut().push(url.to_string());
        if self.fail {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no display"))
        } else {
            Ok(())
        }
    }
}

pub fn grant(access_token: &str) -> Result<TokenGrant, TokenPollError> {
    Ok(TokenGrant {
        access_token: access_token.to_string(),
        token_type: Some("Bearer".to_string()),
        expires_in: 28800,
    })
}

pub fn credential_expiration() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 20, 0, 0).unwrap()
}

/// In-memory SSO service. Token polls replay a queue and answer `Pending`
/// once it is exhausted. Every call is logged as `operation:argument`.
#[derive(Default)]
pub struct FakeSsoService {
    accounts: Vec<SsoAccount>,
    roles: HashMap<String, Vec<String>>,
    token_responses: RefCell<VecDeque<Result<TokenGrant, TokenPollError>>>,
    register_error: Option<ServiceError>,
    rejected_tokens: HashSet<String>,
    failing_role_lists: HashSet<String>,
    failing_credentials: HashSet<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeSsoService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account_id: &str, name: &str, roles: &[&str]) -> Self {
        self.accounts.push(SsoAccount {
            account_id: account_id.to_string(),
            account_name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
        });
        self.roles.insert(
            account_id.to_string(),
            roles.iter().map(|role| role.to_string()).collect(),
        );
        self
    }

    pub fn with_token_responses(
        self,
        responses: impl IntoIterator<Item = Result<TokenGrant, TokenPollError>>,
    ) -> Self {
        *self.token_responses.borrow_mut() = responses.into_iter().collect();
        self
    }

    pub fn with_register_error(mut self, message: &str) -> Self {
        self.register_error = Some(ServiceError::new("RegisterClient", message));
        self
    }

    pub fn rejecting_token(mut self, access_token: &str) -> Self {
        self.rejected_tokens.insert(access_token.to_string());
        self
    }

    pub fn failing_role_list(mut self, account_id: &str) -> Self {
        self.failing_role_lists.insert(account_id.to_string());
        self
    }

    pub fn failing_credentials(mut self, account_id: &str) -> Self {
        self.failing_credentials.insert(account_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.split(':').next() == Some(operation))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn authorize(&self, operation: &'static str, access_token: &str) -> Result<(), ServiceError> {
        if self.rejected_tokens.contains(access_token) {
            Err(ServiceError::new(
                operation,
                "UnauthorizedException: Session token not found or invalid",
            ))
        } else {
            Ok(())
        }
    }
}

impl SsoService for FakeSsoService {
    fn register_client(
        &self,
        client_name: &str,
        client_type: &str,
    ) -> Result<ClientRegistration, ServiceError> {
        self.record(format!("register_client:{}/{}", client_name, client_type));
        if let Some(err) = &self.register_error {
            return Err(err.clone());
        }
        Ok(ClientRegistration {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        })
    }

    fn start_device_authorization(
        &self,
        registration: &ClientRegistration,
        start_url: &str,
    ) -> Result<DeviceAuthorization, ServiceError> {
        self.record(format!("start_device_authorization:{}", start_url));
        Ok(DeviceAuthorization {
            registration: registration.clone(),
            verification_uri: "https://device.sso.us-east-1.amazonaws.com/".to_string(),
            verification_uri_complete: Some(
                "https://device.sso.us-east-1.amazonaws.com/?user_code=ABCD-EFGH".to_string(),
            ),
            user_code: "ABCD-EFGH".to_string(),
            device_code: "device-code".to_string(),
            expires_in: 600,
            interval: 1,
        })
    }

    fn create_token(
        &self,
        authorization: &DeviceAuthorization,
    ) -> Result<TokenGrant, TokenPollError> {
        self.record(format!("create_token:{}", authorization.device_code));
        self.token_responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(TokenPollError::Pending))
    }

    fn list_accounts(&self, access_token: &str) -> Result<Vec<SsoAccount>, ServiceError> {
        self.record(format!("list_accounts:{}", access_token));
        self.authorize("ListAccounts", access_token)?;
        Ok(self.accounts.clone())
    }

    fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        self.record(format!("list_account_roles:{}", account_id));
        self.authorize("ListAccountRoles", access_token)?;
        if self.failing_role_lists.contains(account_id) {
            return Err(ServiceError::new("ListAccountRoles", "ResourceNotFoundException"));
        }
        Ok(self.roles.get(account_id).cloned().unwrap_or_default())
    }

    fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredential, ServiceError> {
        self.record(format!("get_role_credentials:{}/{}", account_id, role_name));
        self.authorize("GetRoleCredentials", access_token)?;
        if self.failing_credentials.contains(account_id) {
            return Err(ServiceError::new("GetRoleCredentials", "ForbiddenException"));
        }
        Ok(RoleCredential {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            access_key: format!("ASIA{}", account_id),
            secret_key: format!("secret-{}", account_id),
            session_token: format!("session-{}-{}", account_id, role_name),
            expiration: credential_expiration(),
        })
    }
}
