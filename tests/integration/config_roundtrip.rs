//! Config file driving a real service: endpoint, state directory and
//! fetch guard all come from TOML.

use crate::helpers::{ORG_ID, test_credentials, usage_body};
use std::sync::Arc;
use usage_sync::SyncConfig;
use usage_sync::credentials::{CredentialStore, FileCredentialStore};
use usage_sync::notify::TracingNotifier;
use usage_sync::service::HISTORY_FILE;
use usage_sync::store::JsonFileStore;
use usage_sync::usage::{ClaudeUsageClient, UsageError};
use usage_sync::UsageService;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn service_follows_config_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/api/organizations/{ORG_ID}/usage")))
        .respond_with(ResponseTemplate::new(200).set_body_string(usage_body(64.0)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let state_dir = temp.path().join("state");
    let config_path = temp.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[api]\nbase_url = \"{}/\"\n\n[sync]\nmin_fetch_interval_secs = 120\n\n[storage]\nstate_dir = \"{}\"\n",
            mock_server.uri(),
            state_dir.display()
        ),
    )
    .unwrap();

    let config = SyncConfig::load_or_default(&config_path).unwrap().validate();
    assert_eq!(config.state_dir(), state_dir);

    let credentials: Arc<dyn CredentialStore> = Arc::new(
        FileCredentialStore::new(temp.path().join("credentials.json")).without_env_override(),
    );
    credentials.save(&test_credentials()).unwrap();
    let client = ClaudeUsageClient::new(&config.api, Arc::clone(&credentials)).unwrap();
    let service = UsageService::with_parts(
        &config,
        Arc::new(client),
        credentials,
        Arc::new(JsonFileStore::new(config.state_dir())),
        Arc::new(TracingNotifier),
    )
    .unwrap();

    assert!(service.sync_now().await.is_success());
    // Guard from the file blocks the immediate retry; the mock's expect(1)
    // verifies no second request went out.
    assert_eq!(
        service.sync_now().await.error(),
        Some(&UsageError::RateLimited)
    );

    assert!(state_dir.join(HISTORY_FILE).exists());
    let reopened = JsonFileStore::new(&state_dir);
    let cached = usage_sync::store::StateStore::load_cached_usage(&reopened)
        .unwrap()
        .unwrap();
    assert_eq!(cached.session_utilization(), Some(64.0));
}

#[tokio::test]
async fn credentials_file_survives_reload() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("credentials.json");

    let store = FileCredentialStore::new(path.clone()).without_env_override();
    assert!(store.load().is_none());
    store.save(&test_credentials()).unwrap();

    let reloaded = FileCredentialStore::new(path.clone()).without_env_override();
    assert_eq!(reloaded.load(), Some(test_credentials()));

    reloaded.clear().unwrap();
    assert!(FileCredentialStore::new(path).without_env_override().load().is_none());
}
