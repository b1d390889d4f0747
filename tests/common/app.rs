use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use attendance_backend::config::{AutoSignOutConfig, Config, EmailConfig, WorkerConfig};
use attendance_backend::routes::build_router;
use attendance_backend::services::email::EmailService;
use attendance_backend::state::AppState;
use attendance_backend::store::Store;

pub const TRIGGER_TOKEN: &str = "integration-test-trigger-token";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

/// Build the app against a throwaway sled store. Config is constructed
/// directly instead of via env vars to avoid set_var races between tests.
pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("attendance-test.sled");

    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        admin_trigger_token: TRIGGER_TOKEN.to_string(),
        worker: WorkerConfig { is_leader: false },
        auto_sign_out: AutoSignOutConfig {
            cron: "0 0 * * * *".to_string(),
            threshold_hours: 8,
            page_size: 1000,
            batch_limit: 450,
            history_sync_concurrency: 4,
        },
        email: EmailConfig {
            enabled: true,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            from: String::new(),
            timeout_secs: 1,
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    let mailer = Arc::new(EmailService::new(&config.email));

    let state = AppState::new(store, mailer, &config);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}
