//! Daemon configuration from `CRATEDIG_*` environment variables

use anyhow::{Context, Result};
use cratedig_api_rpc::{RateLimitConfig, RpcServerConfig, DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use cratedig_core::application::{ScanConfig, SchedulerConfig};
use cratedig_core::domain::SCAN_DIRECTORY_JOB;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_DB_PATH: &str = "~/.cratedig/cratedig.db";
const DEFAULT_LIBRARY_ROOTS: &str = "~/Music";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub log_format: LogFormat,
    pub rpc: RpcServerConfig,
    pub scan: ScanConfig,
    pub scheduler: SchedulerConfig,
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = expand(&lookup("CRATEDIG_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into()));

        let log_format = match lookup("CRATEDIG_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let roots_raw = lookup("CRATEDIG_LIBRARY_ROOTS").unwrap_or_else(|| DEFAULT_LIBRARY_ROOTS.into());
        let allowed_roots: Vec<PathBuf> = std::env::split_paths(&roots_raw)
            .filter(|root| !root.as_os_str().is_empty())
            .map(|root| expand(&root.to_string_lossy()))
            .collect();

        let mut scan = ScanConfig {
            allowed_roots,
            ..Default::default()
        };
        scan.batch_size = parse_var(&lookup, "CRATEDIG_BATCH_SIZE", scan.batch_size)?;
        scan.validate()?;

        let mut scheduler = SchedulerConfig::default();
        scheduler.caps.max_concurrent_jobs = parse_var(
            &lookup,
            "CRATEDIG_MAX_CONCURRENT_JOBS",
            scheduler.caps.max_concurrent_jobs,
        )?;
        let scan_cap = parse_var(
            &lookup,
            "CRATEDIG_MAX_CONCURRENT_SCANS",
            scheduler.caps.per_type.get(SCAN_DIRECTORY_JOB).copied().unwrap_or(1),
        )?;
        scheduler.caps = scheduler.caps.with_type_cap(SCAN_DIRECTORY_JOB, scan_cap);
        scheduler.validate()?;

        let defaults = RateLimitConfig::default();
        let rpc = RpcServerConfig {
            host: DEFAULT_RPC_HOST.to_string(),
            port: parse_var(&lookup, "CRATEDIG_RPC_PORT", DEFAULT_RPC_PORT)?,
            rate_limit: RateLimitConfig {
                burst: parse_var(&lookup, "CRATEDIG_RATE_LIMIT_BURST", defaults.burst)?,
                per_second: parse_var(&lookup, "CRATEDIG_RATE_LIMIT_RATE", defaults.per_second)?,
            },
        };

        Ok(Self {
            db_path,
            log_format,
            rpc,
            scan,
            scheduler,
        })
    }
}
