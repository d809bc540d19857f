use std::time::Duration;

/// Engine configuration, loaded once from `VANTAGE_*` environment variables.
///
/// Cache TTLs live here rather than in the algorithms that use them: callers
/// pass the relevant TTL into every cache write.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub clickhouse_url: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub clickhouse_database: String,
    /// Lifetime of a "this visitor was already counted" marker.
    pub unique_session_ttl_secs: u64,
    /// Lifetime of a live-visitor heartbeat key.
    pub heartbeat_ttl_secs: u64,
    /// Idle time after which a session's start timestamp is forgotten.
    pub session_duration_ttl_secs: u64,
    /// Lifetime of the session hashing salt before it is regenerated.
    pub salt_ttl_secs: u64,
    /// Maximum time between two consecutive funnel steps.
    pub funnel_window_secs: u64,
    /// Timezone assumed when a request does not name one.
    pub default_timezone: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clickhouse_url: "http://localhost:8123".to_string(),
            clickhouse_user: "default".to_string(),
            clickhouse_password: String::new(),
            clickhouse_database: "analytics".to_string(),
            unique_session_ttl_secs: 1800,
            heartbeat_ttl_secs: 60,
            session_duration_ttl_secs: 1800,
            salt_ttl_secs: 86_400,
            funnel_window_secs: 86_400,
            default_timezone: "Etc/GMT".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            clickhouse_url: std::env::var("VANTAGE_CLICKHOUSE_URL")
                .unwrap_or(defaults.clickhouse_url),
            clickhouse_user: std::env::var("VANTAGE_CLICKHOUSE_USER")
                .unwrap_or(defaults.clickhouse_user),
            clickhouse_password: std::env::var("VANTAGE_CLICKHOUSE_PASSWORD")
                .unwrap_or(defaults.clickhouse_password),
            clickhouse_database: std::env::var("VANTAGE_CLICKHOUSE_DATABASE")
                .unwrap_or(defaults.clickhouse_database),
            unique_session_ttl_secs: parse_secs(
                "VANTAGE_UNIQUE_SESSION_TTL_SECS",
                defaults.unique_session_ttl_secs,
            )?,
            heartbeat_ttl_secs: parse_secs(
                "VANTAGE_HEARTBEAT_TTL_SECS",
                defaults.heartbeat_ttl_secs,
            )?,
            session_duration_ttl_secs: parse_secs(
                "VANTAGE_SESSION_DURATION_TTL_SECS",
                defaults.session_duration_ttl_secs,
            )?,
            salt_ttl_secs: parse_secs("VANTAGE_SALT_TTL_SECS", defaults.salt_ttl_secs)?,
            funnel_window_secs: parse_secs(
                "VANTAGE_FUNNEL_WINDOW_SECS",
                defaults.funnel_window_secs,
            )?,
            default_timezone: std::env::var("VANTAGE_DEFAULT_TIMEZONE")
                .unwrap_or(defaults.default_timezone),
        })
    }

    pub fn unique_session_ttl(&self) -> Duration {
        Duration::from_secs(self.unique_session_ttl_secs)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_secs)
    }

    pub fn session_duration_ttl(&self) -> Duration {
        Duration::from_secs(self.session_duration_ttl_secs)
    }

    pub fn salt_ttl(&self) -> Duration {
        Duration::from_secs(self.salt_ttl_secs)
    }
}

fn parse_secs(var: &str, default: u64) -> Result<u64, String> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {var}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Env vars are process-global; serialise the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        std::env::remove_var("VANTAGE_FUNNEL_WINDOW_SECS");
        let cfg = EngineConfig::from_env().expect("config");
        assert_eq!(cfg.funnel_window_secs, 86_400);
        assert_eq!(cfg.heartbeat_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.session_duration_ttl(), Duration::from_secs(1800));
    }

    #[test]
    fn malformed_ttl_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        std::env::set_var("VANTAGE_FUNNEL_WINDOW_SECS", "a day");
        let result = EngineConfig::from_env();
        std::env::remove_var("VANTAGE_FUNNEL_WINDOW_SECS");
        let err = result.expect_err("should fail");
        assert!(err.contains("VANTAGE_FUNNEL_WINDOW_SECS"));
    }
}
