//! Interface-bound HTTP client pools.

pub mod client;
pub mod interface;
pub mod response;
pub mod user_agent;

pub use client::{fetch, ClientPoolConfig, InterfaceClientPool};
pub use interface::{loopback_fallback, worker_shares, LinkSpeed, NetworkInterface};
pub use response::HttpResponse;
