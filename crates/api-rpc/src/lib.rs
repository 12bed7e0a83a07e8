//! JSON-RPC API Layer
//!
//! `scan.start.v1`, `scan.status.v1`, `scan.cancel.v1` and `admin.stats.v1`
//! served over localhost TCP.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use rate_limiter::RateLimitConfig;
pub use server::{RpcServer, RpcServerConfig, DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
