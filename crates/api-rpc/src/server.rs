//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over TCP, bound to localhost.

use crate::handler::RpcHandler;
use crate::rate_limiter::RateLimitConfig;
use crate::types::{ScanIdRequest, StartScanRequest, StatsRequest};
use cratedig_core::application::{InflightLimiter, JobQueue, ScanService};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9638;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
    pub rate_limit: RateLimitConfig,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        scans: Arc<ScanService>,
        jobs: Arc<JobQueue>,
        inflight: Arc<InflightLimiter>,
    ) -> Self {
        let handler = Arc::new(RpcHandler::new(scans, jobs, inflight, config.rate_limit));
        Self { config, handler }
    }

    fn module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("scan.start.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StartScanRequest = params.parse()?;
                    handler.start_scan(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("scan.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ScanIdRequest = params.parse()?;
                    handler.scan_status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("scan.cancel.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ScanIdRequest = params.parse()?;
                    handler.cancel_scan(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    // Parameters are optional for stats
                    let req: StatsRequest = params.parse().unwrap_or_default();
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    /// Start the JSON-RPC server. Returns the handle and the bound address.
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let module = self.module()?;

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        info!(addr = %local_addr, "JSON-RPC server listening");
        Ok((server.start(module), local_addr))
    }
}
