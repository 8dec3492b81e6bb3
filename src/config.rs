use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub cron_secret: String,
    pub encryption_key: String,
    pub host: IpAddr,
    pub port: u16,
    pub linkedin_api_base: String,
    /// Posts scheduled up to this many seconds in the future are still due.
    pub due_buffer_secs: i64,
    /// Minimum spacing between two pipeline runs.
    pub min_run_interval_secs: i64,
    /// Lease duration for the cron lock; a crashed holder frees up after this.
    pub run_lease_secs: i64,
    /// A 'processing' claim older than this is considered abandoned.
    pub claim_ttl_secs: i64,
    pub per_post_timeout_secs: u64,
    pub run_deadline_secs: u64,
    pub default_max_attempts: i32,
    /// Permits header-less trigger calls for local testing. Never enable in
    /// production.
    pub allow_manual_trigger: bool,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let cron_secret = env_required("POSTPILOT_CRON_SECRET")?;
        let encryption_key = env_required("POSTPILOT_ENCRYPTION_KEY")?;

        let host: IpAddr = env_or("POSTPILOT_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid POSTPILOT_HOST: {e}"))?;

        let port: u16 = env_or("POSTPILOT_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid POSTPILOT_PORT: {e}"))?;

        let linkedin_api_base = env_or("POSTPILOT_LINKEDIN_API_BASE", "https://api.linkedin.com");

        let due_buffer_secs = env_parse("POSTPILOT_DUE_BUFFER_SECS", "60")?;
        let min_run_interval_secs = env_parse("POSTPILOT_MIN_RUN_INTERVAL_SECS", "55")?;
        let run_lease_secs = env_parse("POSTPILOT_RUN_LEASE_SECS", "300")?;
        let claim_ttl_secs = env_parse("POSTPILOT_CLAIM_TTL_SECS", "600")?;
        let per_post_timeout_secs = env_parse("POSTPILOT_PER_POST_TIMEOUT_SECS", "30")?;
        let run_deadline_secs = env_parse("POSTPILOT_RUN_DEADLINE_SECS", "240")?;
        let default_max_attempts = env_parse("POSTPILOT_DEFAULT_MAX_ATTEMPTS", "3")?;

        let allow_manual_trigger = env_or("POSTPILOT_ALLOW_MANUAL_TRIGGER", "false") == "true";

        let log_level = env_or("POSTPILOT_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            cron_secret,
            encryption_key,
            host,
            port,
            linkedin_api_base,
            due_buffer_secs,
            min_run_interval_secs,
            run_lease_secs,
            claim_ttl_secs,
            per_post_timeout_secs,
            run_deadline_secs,
            default_max_attempts,
            allow_manual_trigger,
            log_level,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}
