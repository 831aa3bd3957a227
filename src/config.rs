use std::time::Duration;

use serde::Deserialize;

/// Process-wide settings. Job-specific configuration arrives with each job
/// record (see `jobs::config`); this only covers transport and endpoint knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Overrides the cloud's authority host (login endpoint).
    pub authority_url: Option<String>,
    /// Overrides the cloud's resource-manager endpoint.
    pub management_url: Option<String>,
    /// Overrides the computed `https://{vault}.{suffix}` data-plane URL.
    pub vault_url: Option<String>,
    /// Overrides the instance metadata service base URL.
    pub imds_url: Option<String>,
    /// Per-request HTTP timeout in seconds.
    /// Set via AKV_HTTP_TIMEOUT_SECS. Default: 60.
    pub http_timeout_secs: u64,
    /// Transient-failure retries performed by the HTTP middleware.
    /// Set via AKV_MAX_RETRIES. Default: 3.
    pub max_retries: u32,
    /// Delay between polls of long-running operations (vault creation,
    /// certificate recovery). Set via AKV_POLL_INTERVAL_MS. Default: 2000.
    pub poll_interval_ms: u64,
    /// Upper bound on long-running-operation polls. Default: 60.
    pub poll_max_attempts: u32,
    /// Whole-job timeout applied by the CLI. 0 = none.
    pub job_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authority_url: None,
            management_url: None,
            vault_url: None,
            imds_url: None,
            http_timeout_secs: 60,
            max_retries: 3,
            poll_interval_ms: 2000,
            poll_max_attempts: 60,
            job_timeout_secs: 0,
        }
    }
}

impl Config {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    /// Settings pointing every endpoint at a single base URL (mock servers).
    pub fn with_base_url(base: &str) -> Self {
        Self {
            authority_url: Some(base.to_string()),
            management_url: Some(base.to_string()),
            vault_url: Some(base.to_string()),
            imds_url: Some(base.to_string()),
            max_retries: 0,
            poll_interval_ms: 10,
            poll_max_attempts: 5,
            ..Self::default()
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();
    let cfg = Config {
        authority_url: non_empty_var("AKV_AUTHORITY_URL"),
        management_url: non_empty_var("AKV_MANAGEMENT_URL"),
        vault_url: non_empty_var("AKV_VAULT_URL"),
        imds_url: non_empty_var("AKV_IMDS_URL"),
        http_timeout_secs: parsed_var("AKV_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
        max_retries: parsed_var("AKV_MAX_RETRIES", defaults.max_retries),
        poll_interval_ms: parsed_var("AKV_POLL_INTERVAL_MS", defaults.poll_interval_ms),
        poll_max_attempts: parsed_var("AKV_POLL_MAX_ATTEMPTS", defaults.poll_max_attempts),
        job_timeout_secs: parsed_var("AKV_JOB_TIMEOUT_SECS", defaults.job_timeout_secs),
    };

    if cfg.http_timeout_secs == 0 {
        anyhow::bail!("AKV_HTTP_TIMEOUT_SECS must be greater than zero");
    }

    Ok(cfg)
}
