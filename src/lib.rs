//! AWS SSO Helper - temporary AWS credentials through AWS IAM Identity Center
//!
//! Retrieves role credentials with an OAuth device-flow access token that is
//! cached on disk, so a browser login is only needed when the cached token has
//! expired or is rejected by the service.
//!
//! # Architecture Overview
//!
//! - **Token cache** ([`app::token_cache`]): one JSON file per client name,
//!   reused while its lifetime lasts and a live probe accepts it
//! - **Device flow** ([`app::device_auth`]): client registration, browser
//!   verification and token polling with a fixed backoff and a timeout
//! - **Credential resolution** ([`app::credentials`]): account and role
//!   selection, then one credential exchange per selected pair
//!
//! All network access goes through [`app::sso_service::SsoService`], so the
//! pipeline in [`app::helper::SsoHelper`] runs unchanged against the AWS SDK
//! or an in-memory fake.

#![warn(clippy::all, rust_2018_idioms)]

pub mod app;
pub use app::SsoHelper;
