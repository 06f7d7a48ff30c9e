//! Shared helpers for integration tests.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use usage_sync::config::SyncConfig;
use usage_sync::credentials::{CredentialStore, MemoryCredentialStore, SessionCredentials};
use usage_sync::notify::{ChannelNotifier, Notification};
use usage_sync::store::{JsonFileStore, StateStore};
use usage_sync::usage::ClaudeUsageClient;
use usage_sync::UsageService;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const SESSION_KEY: &str = "sk-ant-REDACTED";
pub(crate) const ORG_ID: &str = "org-integration";

pub(crate) fn test_credentials() -> SessionCredentials {
    SessionCredentials::new(SESSION_KEY, ORG_ID)
}

/// Config rooted at `state_dir` with the fetch guard disabled,
/// so back-to-back manual syncs all reach the server.
pub(crate) fn test_config(server: &MockServer, state_dir: &Path) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.api.base_url = server.uri();
    config.api.read_timeout_secs = 5;
    config.sync.min_fetch_interval_secs = 0;
    config.storage.state_dir = Some(state_dir.to_path_buf());
    config
}

/// A service wired to a wiremock server and a JSON store in a temp dir.
pub(crate) struct TestEnv {
    pub server: MockServer,
    pub dir: tempfile::TempDir,
    pub service: UsageService,
    pub credentials: Arc<dyn CredentialStore>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

impl TestEnv {
    pub(crate) async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = test_config(&server, dir.path());
        Self::with_config(server, dir, &config)
    }

    pub(crate) fn with_config(server: MockServer, dir: tempfile::TempDir, config: &SyncConfig) -> Self {
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(MemoryCredentialStore::new(Some(test_credentials())));
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(dir.path()));
        let (service, notifications) = build_service(config, Arc::clone(&credentials), store);
        Self {
            server,
            dir,
            service,
            credentials,
            notifications,
        }
    }

    /// A second service over the same state directory, as after a restart.
    pub(crate) fn restart(&mut self) -> UsageService {
        self.service.shutdown();
        let config = test_config(&self.server, self.dir.path());
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(self.dir.path()));
        let (service, notifications) = build_service(&config, Arc::clone(&self.credentials), store);
        self.notifications = notifications;
        service
    }

    /// Replace whatever the server returns with a usage body at `percent`.
    pub(crate) async fn serve_session_usage(&self, percent: f64) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/organizations/{ORG_ID}/usage")))
            .respond_with(ResponseTemplate::new(200).set_body_string(usage_body(percent)))
            .mount(&self.server)
            .await;
    }

    pub(crate) async fn serve_status(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/organizations/{ORG_ID}/usage")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Drain all notifications sent so far.
    pub(crate) fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut sent = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            sent.push(n);
        }
        sent
    }
}

fn build_service(
    config: &SyncConfig,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn StateStore>,
) -> (UsageService, mpsc::UnboundedReceiver<Notification>) {
    let client = ClaudeUsageClient::new(&config.api, Arc::clone(&credentials))
        .expect("build usage client");
    let (notifier, rx) = ChannelNotifier::channel();
    let service = UsageService::with_parts(
        config,
        Arc::new(client),
        credentials,
        store,
        Arc::new(notifier),
    )
    .expect("build service");
    (service, rx)
}

/// Usage payload with the five-hour window at `percent` and a fixed weekly
/// window.
pub(crate) fn usage_body(percent: f64) -> String {
    serde_json::json!({
        "five_hour": {"utilization": percent, "resets_at": "2030-01-01T05:00:00Z"},
        "seven_day": {"utilization": 12, "resets_at": "2030-01-07T00:00:00Z"},
        "seven_day_opus": null,
        "seven_day_sonnet": null,
    })
    .to_string()
}

pub(crate) fn milestone(current_percent: u8, threshold: u8) -> Notification {
    Notification::UsageMilestone {
        current_percent,
        threshold,
    }
}
