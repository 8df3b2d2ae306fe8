//! # Role credential resolution
//!
//! Turns a valid access token into temporary credentials for one or more
//! account/role pairs. Accounts and roles that were not named explicitly are
//! chosen through a [`Picker`]; a dismissed picker produces no credential for
//! that selection point and is not an error.
//!
//! Failures are isolated per account: if listing roles or exchanging the token
//! fails for one account, it is logged and skipped, and the remaining accounts
//! are still resolved. Only a failure to list accounts aborts the call, since
//! it means the token itself was refused.

use crate::app::errors::HelperError;
use crate::app::picker::Picker;
use crate::app::sso_service::SsoService;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Temporary credentials for one account/role pair. Never cached.
#[derive(Clone, PartialEq)]
pub struct RoleCredential {
    pub account_id: String,
    pub role_name: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for RoleCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleCredential")
            .field("account_id", &self.account_id)
            .field("role_name", &self.role_name)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Which accounts and role to resolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialRequest {
    /// Space-delimited account ids. Empty means "list and pick".
    pub account_ids: Vec<String>,
    pub role_name: Option<String>,
    /// Resolve every listed account instead of prompting for one.
    pub all_accounts: bool,
}

impl CredentialRequest {
    pub fn new(account_id: Option<&str>, role_name: Option<&str>, all_accounts: bool) -> Self {
        Self {
            account_ids: parse_account_ids(account_id),
            role_name: role_name
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_string),
            all_accounts,
        }
    }
}

/// Split a space-delimited account id list, dropping empty entries.
pub fn parse_account_ids(account_id: Option<&str>) -> Vec<String> {
    account_id
        .map(|ids| ids.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub struct CredentialResolver<'a> {
    service: &'a dyn SsoService,
    picker: &'a dyn Picker,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(service: &'a dyn SsoService, picker: &'a dyn Picker) -> Self {
        Self { service, picker }
    }

    /// Resolve credentials in account order. No deduplication, no retries.
    pub fn resolve(
        &self,
        access_token: &str,
        request: &CredentialRequest,
    ) -> Result<Vec<RoleCredential>, HelperError> {
        let account_ids = if request.account_ids.is_empty() {
            match self.select_accounts(access_token, request.all_accounts)? {
                Some(ids) => ids,
                None => {
                    info!("Account selection cancelled, no credentials produced");
                    return Ok(Vec::new());
                }
            }
        } else {
            request.account_ids.clone()
        };

        let mut credentials = Vec::with_capacity(account_ids.len());

        for account_id in &account_ids {
            let role_name = match &request.role_name {
                Some(role) => role.clone(),
                None => match self.select_role(access_token, account_id) {
                    Ok(Some(role)) => role,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Skipping account {}: {}", account_id, e);
                        continue;
                    }
                },
            };

            match self
                .service
                .get_role_credentials(access_token, account_id, &role_name)
            {
                Ok(credential) => {
                    info!(
                        "Obtained credentials for {}/{} (expires {})",
                        account_id, role_name, credential.expiration
                    );
                    credentials.push(credential);
                }
                Err(e) => warn!("Skipping account {} role {}: {}", account_id, role_name, e),
            }
        }

        Ok(credentials)
    }

    /// `None` when the user dismissed the account picker.
    fn select_accounts(
        &self,
        access_token: &str,
        all_accounts: bool,
    ) -> Result<Option<Vec<String>>, HelperError> {
        let accounts = self
            .service
            .list_accounts(access_token)
            .map_err(HelperError::AccountListing)?;
        debug!("Token can access {} accounts", accounts.len());

        if all_accounts {
            return Ok(Some(
                accounts.into_iter().map(|account| account.account_id).collect(),
            ));
        }

        let labels: Vec<String> = accounts.iter().map(|account| account.label()).collect();
        Ok(self
            .picker
            .choose_one("Select an AWS account", &labels)
            .map(|index| vec![accounts[index].account_id.clone()]))
    }

    /// A single available role is taken without prompting.
    fn select_role(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Option<String>, HelperError> {
        let mut roles = self.service.list_account_roles(access_token, account_id)?;

        match roles.len() {
            0 => {
                warn!("No roles available in account {}", account_id);
                Ok(None)
            }
            1 => {
                let role = roles.remove(0);
                debug!("Account {} has a single role, selecting {}", account_id, role);
                Ok(Some(role))
            }
            _ => {
                let prompt = format!("Select a role for account {}", account_id);
                let choice = self.picker.choose_one(&prompt, &roles);
                if choice.is_none() {
                    info!("Role selection for account {} cancelled", account_id);
                }
                Ok(choice.map(|index| roles.swap_remove(index)))
            }
        }
    }
}

/// How resolved credentials are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON array of credential objects.
    #[default]
    Json,
    /// Shell `export` statements.
    Env,
    /// AWS CLI `credential_process` document (single credential only).
    CredentialProcess,
}

/// Serialized shape of one credential. `passThru` drops the identifying fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOutput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<&'a str>,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub session_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl<'a> CredentialOutput<'a> {
    pub fn new(credential: &'a RoleCredential, pass_thru: bool) -> Self {
        if pass_thru {
            Self {
                account_id: None,
                role_name: None,
                access_key: &credential.access_key,
                secret_key: &credential.secret_key,
                session_token: &credential.session_token,
                expiration: None,
            }
        } else {
            Self {
                account_id: Some(&credential.account_id),
                role_name: Some(&credential.role_name),
                access_key: &credential.access_key,
                secret_key: &credential.secret_key,
                session_token: &credential.session_token,
                expiration: Some(format_expiration(&credential.expiration)),
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialProcessOutput<'a> {
    version: u8,
    access_key_id: &'a str,
    secret_access_key: &'a str,
    session_token: &'a str,
    expiration: String,
}

fn format_expiration(expiration: &DateTime<Utc>) -> String {
    expiration.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render credentials for stdout. An empty set renders as an empty string.
pub fn render(
    credentials: &[RoleCredential],
    format: OutputFormat,
    pass_thru: bool,
) -> Result<String, HelperError> {
    if credentials.is_empty() {
        return Ok(String::new());
    }

    match format {
        OutputFormat::Json => {
            let outputs: Vec<CredentialOutput<'_>> = credentials
                .iter()
                .map(|credential| CredentialOutput::new(credential, pass_thru))
                .collect();
            serde_json::to_string_pretty(&outputs)
                .map_err(|e| HelperError::Output(format!("Failed to serialize credentials: {}", e)))
        }
        OutputFormat::Env => {
            let blocks: Vec<String> = credentials
                .iter()
                .map(|credential| {
                    let mut block = String::new();
                    if !pass_thru {
                        block.push_str(&format!(
                            "# {}/{} expires {}\n",
                            credential.account_id,
                            credential.role_name,
                            format_expiration(&credential.expiration)
                        ));
                    }
                    block.push_str(&format!(
                        "export AWS_ACCESS_KEY_ID={}\nexport AWS_SECRET_ACCESS_KEY={}\nexport AWS_SESSION_TOKEN={}",
                        credential.access_key, credential.secret_key, credential.session_token
                    ));
                    block
                })
                .collect();
            Ok(blocks.join("\n\n"))
        }
        OutputFormat::CredentialProcess => {
            let [credential] = credentials else {
                return Err(HelperError::Output(format!(
                    "credential-process output needs exactly one credential, got {}",
                    credentials.len()
                )));
            };
            let output = CredentialProcessOutput {
                version: 1,
                access_key_id: &credential.access_key,
                secret_access_key: &credential.secret_key,
                session_token: &credential.session_token,
                expiration: format_expiration(&credential.expiration),
            };
            serde_json::to_string_pretty(&output)
                .map_err(|e| HelperError::Output(format!("Failed to serialize credentials: {}", e)))
        }
    }
}
