use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub admin_trigger_token: String,
    pub worker: WorkerConfig,
    pub auto_sign_out: AutoSignOutConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
}

#[derive(Debug, Clone)]
pub struct AutoSignOutConfig {
    /// Cron expression for the scheduled run; cadence is deployment policy,
    /// historically anywhere from hourly to daily.
    pub cron: String,
    pub threshold_hours: i64,
    pub page_size: usize,
    pub batch_limit: usize,
    pub history_sync_concurrency: usize,
}

#[derive(Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("admin_trigger_token", &"***REDACTED***")
            .field("worker", &self.worker)
            .field("auto_sign_out", &self.auto_sign_out)
            .field("email", &self.email)
            .finish()
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("enabled", &self.enabled)
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("from", &self.from)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/attendance.sled"),
            admin_trigger_token: env_or("ADMIN_TRIGGER_TOKEN", ""),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
            },
            auto_sign_out: AutoSignOutConfig {
                cron: env_or("AUTO_SIGN_OUT_CRON", "0 0 * * * *"),
                threshold_hours: env_or_parse(
                    "AUTO_SIGN_OUT_THRESHOLD_HOURS",
                    constants::DEFAULT_SIGN_OUT_THRESHOLD_HOURS,
                ),
                page_size: env_or_parse(
                    "AUTO_SIGN_OUT_PAGE_SIZE",
                    constants::DEFAULT_SCAN_PAGE_SIZE,
                ),
                batch_limit: env_or_parse(
                    "AUTO_SIGN_OUT_BATCH_LIMIT",
                    constants::DEFAULT_BATCH_OP_LIMIT,
                ),
                history_sync_concurrency: env_or_parse(
                    "HISTORY_SYNC_CONCURRENCY",
                    constants::DEFAULT_HISTORY_SYNC_CONCURRENCY,
                ),
            },
            email: EmailConfig {
                enabled: env_or_bool("EMAIL_ENABLED", false),
                mock: env_or_bool("EMAIL_MOCK", true),
                api_url: env_or("EMAIL_API_URL", "https://api.resend.com/emails"),
                api_key: env_or("EMAIL_API_KEY", ""),
                from: env_or("EMAIL_FROM", ""),
                timeout_secs: env_or_parse("EMAIL_TIMEOUT_SECS", 10_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "AUTO_SIGN_OUT_CRON",
            "AUTO_SIGN_OUT_THRESHOLD_HOURS",
            "AUTO_SIGN_OUT_BATCH_LIMIT",
            "EMAIL_ENABLED",
            "EMAIL_MOCK",
            "EMAIL_TIMEOUT_SECS",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.auto_sign_out.threshold_hours, 8);
        assert_eq!(cfg.auto_sign_out.page_size, 1000);
        assert_eq!(cfg.auto_sign_out.batch_limit, 450);
        assert!(!cfg.email.enabled);
        assert!(cfg.email.mock);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("AUTO_SIGN_OUT_THRESHOLD_HOURS", "12");
        env::set_var("EMAIL_TIMEOUT_SECS", "42");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.auto_sign_out.threshold_hours, 12);
        assert_eq!(cfg.email.timeout_secs, 42);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("AUTO_SIGN_OUT_BATCH_LIMIT", "x");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.auto_sign_out.batch_limit, 450);
    }

    #[test]
    fn email_flags_isolation() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("EMAIL_ENABLED", "true");
        env::set_var("EMAIL_MOCK", "false");

        let cfg = Config::from_env();
        assert!(cfg.email.enabled);
        assert!(!cfg.email.mock);
    }
}
