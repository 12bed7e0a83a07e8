//! cratedig CLI - talks to the daemon over JSON-RPC

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9638";

#[derive(Parser, Debug)]
#[command(name = "cratedig")]
#[command(about = "Scan music libraries through the cratedig daemon", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CRATEDIG_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start scanning one library folder
    Scan {
        /// Folder to scan (exactly one)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(short, long, env = "CRATEDIG_USER")]
        user: String,

        #[arg(short, long)]
        library: String,

        /// Only ingest files not processed by an earlier scan
        #[arg(long)]
        only_unprocessed: bool,

        /// Follow progress until the scan finishes
        #[arg(short, long)]
        wait: bool,
    },

    /// Show a scan's state and counters
    Status { scan_id: String },

    /// Request cancellation of a scan
    Cancel { scan_id: String },

    /// Show daemon job statistics
    Stats,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize, Tabled)]
struct StartedScan {
    scan_id: String,
    job_id: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Tabled)]
struct Counts {
    files_discovered: u64,
    files_persisted: u64,
    batches_flushed: u64,
    errors: u64,
}

#[derive(Debug, Deserialize)]
struct ScanStatus {
    scan_id: String,
    state: String,
    counts: Counts,
    #[serde(default)]
    errors: Vec<String>,
    last_error: Option<String>,
    stats: Option<serde_json::Value>,
}

impl ScanStatus {
    fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "succeeded" | "failed" | "cancelled")
    }
}

#[derive(Debug, Deserialize)]
struct CancelResult {
    cancelled: bool,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Tabled)]
struct JobCounts {
    queued: i64,
    running: i64,
    succeeded: i64,
    failed: i64,
    cancelled: i64,
}

struct RpcClient {
    url: String,
    http: reqwest::Client,
}

impl RpcClient {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response: JsonRpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to connect to daemon at {}", self.url))?
            .json()
            .await
            .context("Failed to parse response")?;

        if let Some(error) = response.error {
            anyhow::bail!("RPC error ({}): {}", error.code, error.message);
        }
        let result = response
            .result
            .ok_or_else(|| anyhow::anyhow!("No result in response"))?;
        serde_json::from_value(result).with_context(|| format!("Unexpected {} result", method))
    }
}

fn colored_state(state: &str) -> String {
    match state {
        "succeeded" => state.green().bold().to_string(),
        "failed" => state.red().bold().to_string(),
        "cancelled" => state.yellow().bold().to_string(),
        _ => state.cyan().to_string(),
    }
}

fn print_status(status: &ScanStatus) {
    println!(
        "  {} {}  {}",
        "Scan:".bold(),
        status.scan_id,
        colored_state(&status.state)
    );
    println!("{}", Table::new([status.counts]));

    if let Some(last_error) = &status.last_error {
        println!("  {} {}", "Last error:".bold(), last_error.red());
    }
    if !status.errors.is_empty() {
        println!("  {} ({})", "Entry errors".bold(), status.errors.len());
        for error in &status.errors {
            println!("    - {}", error);
        }
    }
    if let Some(ingestion) = status.stats.as_ref().and_then(|s| s.get("ingestion")) {
        if !ingestion.is_null() {
            println!("  {} {}", "Ingestion:".bold(), ingestion);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = RpcClient::new(&cli.rpc_url);

    match cli.command {
        Commands::Scan {
            paths,
            user,
            library,
            only_unprocessed,
            wait,
        } => {
            let started: StartedScan = client
                .call(
                    "scan.start.v1",
                    json!({
                        "user_id": user,
                        "library_id": library,
                        "paths": paths,
                        "process_only_unprocessed": only_unprocessed,
                    }),
                )
                .await?;

            println!("{}", "✓ Scan queued".green().bold());
            println!("{}", Table::new([&started]));

            if wait {
                loop {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    let status: ScanStatus = client
                        .call("scan.status.v1", json!({ "scan_id": started.scan_id }))
                        .await?;
                    if status.is_terminal() {
                        println!();
                        print_status(&status);
                        break;
                    }
                    println!(
                        "  {} discovered={} persisted={} errors={}",
                        colored_state(&status.state),
                        status.counts.files_discovered,
                        status.counts.files_persisted,
                        status.counts.errors
                    );
                }
            }
        }

        Commands::Status { scan_id } => {
            let status: ScanStatus = client
                .call("scan.status.v1", json!({ "scan_id": scan_id }))
                .await?;
            print_status(&status);
        }

        Commands::Cancel { scan_id } => {
            let result: CancelResult = client
                .call("scan.cancel.v1", json!({ "scan_id": scan_id }))
                .await?;
            if result.cancelled {
                println!("{}", format!("✓ Cancellation requested for {}", scan_id).green().bold());
            } else {
                println!(
                    "{} {} ({})",
                    "✗ Not cancelled:".yellow().bold(),
                    scan_id,
                    result.reason.as_deref().unwrap_or("unknown reason")
                );
            }
        }

        Commands::Stats => {
            println!("{}", "Daemon Status".cyan().bold());
            println!();

            match client.call::<serde_json::Value>("admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    let jobs: JobCounts = serde_json::from_value(stats["jobs"].clone())
                        .context("Unexpected job counts")?;
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), stats["version"]);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                    println!("  {} {}", "In flight:".bold(), stats["inflight"]["global"]);
                    println!();
                    println!("{}", Table::new([jobs]));
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_arguments() {
        let cli = Cli::try_parse_from([
            "cratedig",
            "--rpc-url",
            "http://127.0.0.1:1",
            "scan",
            "/music/jazz",
            "--user",
            "u1",
            "--library",
            "main",
            "--wait",
        ])
        .unwrap();

        assert_eq!(cli.rpc_url, "http://127.0.0.1:1");
        match cli.command {
            Commands::Scan {
                paths,
                user,
                library,
                only_unprocessed,
                wait,
            } => {
                assert_eq!(paths, vec![PathBuf::from("/music/jazz")]);
                assert_eq!(user, "u1");
                assert_eq!(library, "main");
                assert!(!only_unprocessed);
                assert!(wait);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_scan_requires_a_path() {
        assert!(Cli::try_parse_from(["cratedig", "scan", "--user", "u", "--library", "l"]).is_err());
    }

    #[test]
    fn test_status_response_parses() {
        let status: ScanStatus = serde_json::from_value(json!({
            "scan_id": "s1",
            "state": "failed",
            "progress": {"stage": "walking"},
            "counts": {"files_discovered": 4, "files_persisted": 2, "batches_flushed": 1, "errors": 0},
            "errors": [],
            "last_error": "disk I/O error",
            "stats": null
        }))
        .unwrap();

        assert!(status.is_terminal());
        assert_eq!(status.counts.files_persisted, 2);
        assert_eq!(status.last_error.as_deref(), Some("disk I/O error"));
    }
}
