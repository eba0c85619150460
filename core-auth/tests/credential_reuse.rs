//! Credential reuse against real files on disk.

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::ManualClock;
use chrono::{DateTime, TimeZone, Utc};
use core_auth::{
    AuthError, Credential, CredentialStore, IdentityProvider, Result, ScopeMetadata,
    TokenLifecycleManager, UserProfile,
};
use core_runtime::events::EventBus;
use core_runtime::{CancellationToken, TokenPolicy};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DRIVE_FILE: &str = "drive.file";
const DRIVE_APPDATA: &str = "drive.appdata";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

#[derive(Default)]
struct CountingIdentity {
    calls: AtomicUsize,
}

#[async_trait]
impl IdentityProvider for CountingIdentity {
    async fn authorize_interactive(&self, _scopes: &[String]) -> Result<Credential> {
        Err(AuthError::AuthorizationCancelled)
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuthError::NetworkFailure("unreachable".into()))
    }

    async fn introspect_token(&self, _access_token: &str) -> Result<BTreeSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok([DRIVE_FILE, DRIVE_APPDATA].iter().map(|s| s.to_string()).collect())
    }

    async fn revoke_token(&self, _token: &str) -> Result<()> {
        Ok(())
    }

    async fn get_profile(&self, _access_token: &str) -> Result<UserProfile> {
        Err(AuthError::NetworkFailure("unreachable".into()))
    }
}

struct Fixture {
    tmp: TempDir,
    identity: Arc<CountingIdentity>,
    store: CredentialStore,
    manager: TokenLifecycleManager,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let fs = Arc::new(TokioFileSystem::new());
    let store = CredentialStore::new(fs, tmp.path().join("credentials"));
    let identity = Arc::new(CountingIdentity::default());
    let manager = TokenLifecycleManager::new(
        store.clone(),
        identity.clone(),
        Arc::new(ManualClock::new(t0())),
        TokenPolicy::default(),
        Duration::from_secs(30),
        EventBus::default(),
    );
    Fixture {
        tmp,
        identity,
        store,
        manager,
    }
}

#[tokio::test]
async fn test_narrower_persisted_scopes_reject_and_wipe_storage() {
    let f = fixture();
    f.store
        .save(&Credential::new("ya29", Some("1//r".into()), t0(), 3600))
        .await
        .unwrap();
    f.store
        .save_scopes(&ScopeMetadata::new([DRIVE_FILE], t0()))
        .await
        .unwrap();

    let required = vec![DRIVE_FILE.to_string(), DRIVE_APPDATA.to_string()];
    let result = f.manager.try_reuse(&required, &CancellationToken::new()).await;

    assert!(!result.can_reuse);
    assert!(result.credential.is_none());
    assert!(result.reason_text().contains("scope mismatch"));
    assert!(result.reason_text().contains(DRIVE_APPDATA));
    assert_eq!(f.identity.calls.load(Ordering::SeqCst), 0);

    let dir = f.tmp.path().join("credentials");
    assert!(dir.is_dir());
    assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_wider_persisted_scopes_are_reusable_in_any_order() {
    let f = fixture();
    f.store
        .save(&Credential::new("ya29", Some("1//r".into()), t0(), 3600))
        .await
        .unwrap();
    f.store
        .save_scopes(&ScopeMetadata::new([DRIVE_APPDATA, DRIVE_FILE], t0()))
        .await
        .unwrap();

    let result = f
        .manager
        .try_reuse(&[DRIVE_FILE.to_string()], &CancellationToken::new())
        .await;

    assert!(result.can_reuse);
    assert_eq!(result.credential.unwrap().access_token, "ya29");
}

#[tokio::test]
async fn test_unreadable_token_file_counts_as_no_token() {
    let f = fixture();
    let dir = f.tmp.path().join("credentials");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("token.json"), b"\x00\x01garbage").unwrap();

    let result = f
        .manager
        .try_reuse(&[DRIVE_FILE.to_string()], &CancellationToken::new())
        .await;

    assert!(!result.can_reuse);
    assert_eq!(result.reason_text(), "no token");
}
