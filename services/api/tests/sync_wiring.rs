//! The orchestrator built from `AppState` reads and rebinds the AnkiWeb session
//! through the shared credential store.

use anki_sync_api::{config::Config, credentials::CredentialStore, web::state::AppState};
use anki_sync_core::{
    CollectionGate, MediaSyncStatus, PortResult, SessionAuth, SyncError, SyncOutcome,
    SyncOutcomeKind, SyncRequired, SyncService,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use url::Url;

/// Remote that always wants a normal sync and migrates to `moved_to`.
struct MigratingRemote {
    moved_to: &'static str,
    endpoints: Mutex<Vec<String>>,
}

impl MigratingRemote {
    fn seen(&self, auth: &SessionAuth) {
        self.endpoints.lock().unwrap().push(auth.endpoint.to_string());
    }
}

#[async_trait]
impl SyncService for MigratingRemote {
    async fn sync_status(&self, auth: &SessionAuth) -> PortResult<SyncRequired> {
        self.seen(auth);
        Ok(SyncRequired::SomeChanges)
    }

    async fn sync_collection(&self, auth: &SessionAuth, commit: bool) -> PortResult<SyncOutcome> {
        self.seen(auth);
        if commit {
            return Ok(SyncOutcome::new(SyncOutcomeKind::NoChanges));
        }
        Ok(SyncOutcome::new(SyncOutcomeKind::NormalSync).with_new_endpoint(self.moved_to))
    }

    async fn full_transfer(&self, auth: &SessionAuth, _upload: bool) -> PortResult<()> {
        self.seen(auth);
        Ok(())
    }

    async fn start_media_sync(&self, auth: &SessionAuth) -> PortResult<()> {
        self.seen(auth);
        Ok(())
    }

    async fn media_sync_status(&self) -> PortResult<MediaSyncStatus> {
        Ok(MediaSyncStatus::finished())
    }
}

fn state_with_session(vars: &[(&str, &str)]) -> (AppState, Arc<CredentialStore>) {
    let credentials = Arc::new(CredentialStore::new());
    credentials.set_anki_session(SessionAuth::new(
        Url::parse("https://sync.ankiweb.net/").unwrap(),
        "host-key",
    ));
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = Config::from_vars(|key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap();
    (
        AppState::new(Arc::new(config), credentials.clone()),
        credentials,
    )
}

#[tokio::test]
async fn migration_is_written_back_to_the_credential_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".credentials");
    let path_var = path.to_string_lossy().into_owned();
    let (state, credentials) = state_with_session(&[
        ("MEDIA_SYNC_TIMEOUT_SECS", "2"),
        ("CREDENTIALS_PATH", path_var.as_str()),
    ]);
    let remote = Arc::new(MigratingRemote {
        moved_to: "https://sync5.ankiweb.net/",
        endpoints: Mutex::new(Vec::new()),
    });

    let orchestrator = state.sync_orchestrator(remote.clone());
    assert_eq!(orchestrator.media_sync_timeout(), 2);
    orchestrator.run_cycle(false).await.unwrap();

    let session = credentials.anki_session().unwrap();
    assert_eq!(session.endpoint.as_str(), "https://sync5.ankiweb.net/");
    assert_eq!(session.token, "host-key");
    assert_eq!(
        *remote.endpoints.lock().unwrap(),
        vec![
            "https://sync.ankiweb.net/",
            "https://sync.ankiweb.net/",
            "https://sync5.ankiweb.net/",
            "https://sync5.ankiweb.net/",
        ]
    );

    // The migration also reached the credential file.
    let reloaded = CredentialStore::new();
    reloaded.load(&path).unwrap();
    assert_eq!(reloaded.anki_session(), Some(session));
}

#[tokio::test]
async fn gate_without_a_stored_session_fails_before_mutating() {
    let dir = tempfile::tempdir().unwrap();
    let path_var = dir.path().join(".credentials").to_string_lossy().into_owned();
    let (state, credentials) = state_with_session(&[("CREDENTIALS_PATH", path_var.as_str())]);
    credentials.set_anki_session(None);
    let remote = Arc::new(MigratingRemote {
        moved_to: "",
        endpoints: Mutex::new(Vec::new()),
    });
    let gate = CollectionGate::new(0u32, state.sync_orchestrator(remote.clone()));

    let err = gate
        .mutate(|count| {
            *count += 1;
            Ok(*count)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MissingSession));
    assert!(remote.endpoints.lock().unwrap().is_empty());
}
