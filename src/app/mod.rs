//! Core modules of the AWS SSO credential helper.
//!
//! # Module Organization
//!
//! ## Token lifecycle
//! - [`token_cache`] - Cached device-flow access token (load, expiry, probe, save)
//! - [`device_auth`] - OAuth device authorization flow against AWS SSO OIDC
//!
//! ## Credentials
//! - [`credentials`] - Account/role resolution and output rendering
//! - [`picker`] - Interactive and scripted selection
//!
//! ## Infrastructure
//! - [`sso_service`] - SSO/SSO OIDC capability and its AWS SDK implementation
//! - [`sso_config`] - Configuration layering
//! - [`clock`] - Time source for expiry checks and polling
//! - [`errors`] - Error types
//! - [`helper`] - The end-to-end pipeline

pub mod clock;
pub mod credentials;
pub mod device_auth;
pub mod errors;
pub mod helper;
pub mod picker;
pub mod sso_config;
pub mod sso_service;
pub mod token_cache;

pub use helper::SsoHelper;
