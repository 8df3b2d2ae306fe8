//! End-to-end runs of the helper against in-memory fakes and a temp cache dir.

mod common;

use aws_sso_helper::app::credentials::OutputFormat;
use aws_sso_helper::app::picker::ScriptedPicker;
use aws_sso_helper::app::sso_config::{ClientType, ResolvedSettings};
use aws_sso_helper::app::token_cache::{CachedToken, TokenCacheManager};
use aws_sso_helper::SsoHelper;
use chrono::Duration;
use common::{epoch, grant, FakeSsoService, ManualClock, RecordingBrowser, REGION, START_URL};
use pretty_assertions::assert_eq;
use std::path::Path;

fn settings(cache_path: &Path) -> ResolvedSettings {
    ResolvedSettings {
        start_url: START_URL.to_string(),
        region: REGION.to_string(),
        account_id: Some("111111111111".to_string()),
        role_name: None,
        all_account_roles: false,
        refresh_access_token: false,
        pass_thru: false,
        client_name: "default".to_string(),
        client_type: ClientType::Public,
        timeout_secs: 120,
        cache_path: cache_path.to_path_buf(),
        output: OutputFormat::Json,
        no_browser: false,
    }
}

fn cached(access_token: &str) -> CachedToken {
    CachedToken {
        access_token: access_token.to_string(),
        token_type: Some("Bearer".to_string()),
        logged_at: epoch(),
        expires_in: 28800,
        start_url: Some(START_URL.to_string()),
        region: Some(REGION.to_string()),
    }
}

fn service() -> FakeSsoService {
    FakeSsoService::new()
        .with_account("111111111111", "Sandbox", &["Developer"])
        .with_token_responses([grant("fresh-token")])
}

#[test]
fn test_cached_token_skips_login() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TokenCacheManager::new(dir.path());
    cache
        .save(&cache.token_path("default"), &cached("cached-token"))
        .unwrap();

    let service = service();
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch() + Duration::hours(1));
    let browser = RecordingBrowser::default();

    let credentials = SsoHelper::new(&service, &picker, &clock, &browser)
        .get_credentials(&settings(dir.path()))
        .unwrap();

    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].role_name, "Developer");
    assert_eq!(service.count("register_client"), 0);
    assert_eq!(service.count("create_token"), 0);
    assert!(browser.opened().is_empty());
}

#[test]
fn test_empty_cache_logs_in_and_saves_token() {
    let dir = tempfile::tempdir().unwrap();
    let service = service();
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch());
    let browser = RecordingBrowser::default();

    let credentials = SsoHelper::new(&service, &picker, &clock, &browser)
        .get_credentials(&settings(dir.path()))
        .unwrap();

    assert_eq!(credentials.len(), 1);
    assert_eq!(service.count("register_client"), 1);
    assert_eq!(browser.opened().len(), 1);

    let cache = TokenCacheManager::new(dir.path());
    let saved = cache.load(&cache.token_path("default")).unwrap();
    assert_eq!(saved.access_token, "fresh-token");
    assert_eq!(saved.logged_at, epoch());
    assert_eq!(saved.start_url.as_deref(), Some(START_URL));
    assert_eq!(saved.region.as_deref(), Some(REGION));
}

#[test]
fn test_corrupt_cache_file_logs_in_and_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("default"), "{ truncated").unwrap();

    let service = service();
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch());
    let browser = RecordingBrowser::default();

    let token = SsoHelper::new(&service, &picker, &clock, &browser)
        .access_token(&settings(dir.path()))
        .unwrap();

    assert_eq!(token.access_token, "fresh-token");
    let cache = TokenCacheManager::new(dir.path());
    assert_eq!(
        cache.load(&cache.token_path("default")).unwrap().access_token,
        "fresh-token"
    );
}

#[test]
fn test_expired_token_logs_in_again() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TokenCacheManager::new(dir.path());
    cache
        .save(&cache.token_path("default"), &cached("stale-token"))
        .unwrap();

    let service = service();
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch() + Duration::hours(9));
    let browser = RecordingBrowser::default();

    let token = SsoHelper::new(&service, &picker, &clock, &browser)
        .access_token(&settings(dir.path()))
        .unwrap();

    assert_eq!(token.access_token, "fresh-token");
    // Expired tokens are not probed against the portal.
    assert_eq!(service.count("list_accounts"), 0);
}

#[test]
fn test_rejected_token_logs_in_again() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TokenCacheManager::new(dir.path());
    cache
        .save(&cache.token_path("default"), &cached("revoked-token"))
        .unwrap();

    let service = service().rejecting_token("revoked-token");
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch());
    let browser = RecordingBrowser::default();

    let credentials = SsoHelper::new(&service, &picker, &clock, &browser)
        .get_credentials(&settings(dir.path()))
        .unwrap();

    assert_eq!(credentials.len(), 1);
    assert_eq!(service.count("create_token"), 1);
    assert_eq!(
        service.calls().first().map(String::as_str),
        Some("list_accounts:revoked-token")
    );
}

#[test]
fn test_forced_refresh_ignores_valid_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TokenCacheManager::new(dir.path());
    cache
        .save(&cache.token_path("default"), &cached("cached-token"))
        .unwrap();

    let service = service();
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch());
    let browser = RecordingBrowser::default();
    let mut settings = settings(dir.path());
    settings.refresh_access_token = true;

    let token = SsoHelper::new(&service, &picker, &clock, &browser)
        .access_token(&settings)
        .unwrap();

    assert_eq!(token.access_token, "fresh-token");
    assert_eq!(service.count("list_accounts"), 0);
    assert_eq!(service.count("register_client"), 1);
}

#[test]
fn test_failed_login_leaves_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let service = FakeSsoService::new().with_register_error("InternalServerException");
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch());
    let browser = RecordingBrowser::default();

    let result = SsoHelper::new(&service, &picker, &clock, &browser)
        .get_credentials(&settings(dir.path()));

    assert!(result.is_err());
    assert!(!dir.path().join("default").exists());
}

#[test]
fn test_unwritable_cache_still_returns_token() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the cache directory should be.
    let blocked = dir.path().join("not-a-dir");
    std::fs::write(&blocked, "").unwrap();

    let service = service();
    let picker = ScriptedPicker::cancelling();
    let clock = ManualClock::new(epoch());
    let browser = RecordingBrowser::default();

    let token = SsoHelper::new(&service, &picker, &clock, &browser)
        .access_token(&settings(&blocked))
        .unwrap();

    assert_eq!(token.access_token, "fresh-token");
}
