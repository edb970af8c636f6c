//! Per-interface HTTP client pool.
//!
//! Adapted from the corpus's `HttpClient`: same shape (a `reqwest::Client`
//! wrapped with the crawler's own request bookkeeping), but generalized to
//! bind the socket to a specific interface's source IP and to hold a fixed
//! pool of functionally-equivalent clients rather than a single client with
//! crawl-repository logging.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;

use super::interface::NetworkInterface;
use super::response::HttpResponse;
use super::user_agent::resolve_user_agent;

/// Tuning knobs for building a client pool, mirroring the corpus's
/// builder-style `DlConfig` pattern for connection limits and timeouts.
#[derive(Debug, Clone)]
pub struct ClientPoolConfig {
    pub clients_per_interface: usize,
    pub connection_timeout: Duration,
    pub request_timeout: Duration,
    pub keep_alive_timeout: Duration,
    pub max_connections_total: usize,
    pub max_connections_per_host: usize,
    pub user_agent: Option<String>,
}

impl Default for ClientPoolConfig {
    fn default() -> Self {
        Self {
            clients_per_interface: 64,
            connection_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(300),
            max_connections_total: 12_000,
            max_connections_per_host: 1_200,
            user_agent: None,
        }
    }
}

/// A fixed pool of equivalent HTTP clients bound to one interface's source
/// IP. Workers round-robin across `clients` via `next_index`.
pub struct InterfaceClientPool {
    pub interface: NetworkInterface,
    pub clients: Vec<Client>,
    next_index: AtomicUsize,
}

impl InterfaceClientPool {
    /// Build the client pool for one interface, given how many interfaces
    /// share the global connection budget.
    pub fn build(
        interface: NetworkInterface,
        config: &ClientPoolConfig,
        interface_count: usize,
    ) -> Self {
        let per_interface_total = config.max_connections_total / interface_count.max(1);
        let idle_per_host = (per_interface_total / config.clients_per_interface.max(1))
            .min(config.max_connections_per_host)
            .max(1);

        let user_agent = resolve_user_agent(config.user_agent.as_deref(), &interface.name);
        let bind_addr: IpAddr = interface.source_ip.into();

        let clients = (0..config.clients_per_interface)
            .map(|_| {
                Client::builder()
                    .user_agent(user_agent.clone())
                    .local_address(Some(bind_addr))
                    .connect_timeout(config.connection_timeout)
                    .timeout(config.request_timeout)
                    .pool_idle_timeout(config.keep_alive_timeout)
                    .pool_max_idle_per_host(idle_per_host)
                    .gzip(true)
                    .brotli(true)
                    .deflate(true)
                    .build()
                    .expect("failed to build interface-bound http client")
            })
            .collect();

        Self {
            interface,
            clients,
            next_index: AtomicUsize::new(0),
        }
    }

    /// Round-robin the next client index within this interface's pool.
    pub fn next_client_index(&self) -> usize {
        self.next_index.fetch_add(1, Ordering::Relaxed) % self.clients.len().max(1)
    }

    pub fn client(&self, index: usize) -> &Client {
        &self.clients[index % self.clients.len()]
    }

    pub fn local_socket(&self) -> SocketAddr {
        SocketAddr::new(self.interface.source_ip.into(), 0)
    }
}

/// Fetch `url` via a specific client, returning the response wrapper the
/// download worker expects.
pub async fn fetch(client: &Client, url: &str) -> Result<HttpResponse, reqwest::Error> {
    let response = client.get(url).send().await?;
    let status = response.status();
    let content_disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Ok(HttpResponse {
        status,
        content_disposition,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::interface::LinkSpeed;
    use std::net::Ipv4Addr;

    #[test]
    fn pool_builds_requested_client_count() {
        let interface = NetworkInterface::new("eth0", Ipv4Addr::new(127, 0, 0, 1), LinkSpeed::OneGbps);
        let config = ClientPoolConfig {
            clients_per_interface: 4,
            ..Default::default()
        };
        let pool = InterfaceClientPool::build(interface, &config, 1);
        assert_eq!(pool.clients.len(), 4);
    }

    #[test]
    fn round_robin_wraps_around() {
        let interface = NetworkInterface::new("eth0", Ipv4Addr::new(127, 0, 0, 1), LinkSpeed::OneGbps);
        let config = ClientPoolConfig {
            clients_per_interface: 3,
            ..Default::default()
        };
        let pool = InterfaceClientPool::build(interface, &config, 1);
        let indices: Vec<usize> = (0..6).map(|_| pool.next_client_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
    }
}
