//! Configuration layer: built-in defaults, an optional TOML file, and CLI
//! flag overrides, in that order of increasing precedence.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use url::Url;

use crate::crawl::CrawlConfig;
use crate::download::DownloadConfig;
use crate::errors::ConfigError;
use crate::net::{ClientPoolConfig, LinkSpeed, NetworkInterface};

/// Command-line flags. Anything not given falls back to the TOML file, then
/// to the built-in default.
#[derive(Debug, Parser)]
#[command(name = "multicrawl", about = "Breadth-first document crawler")]
pub struct Cli {
    /// Seed URL to start crawling from.
    pub seed_url: String,

    /// Directory downloaded documents are written to.
    #[arg(long, default_value = ".")]
    pub target_dir: PathBuf,

    /// Optional TOML config file layered under these flags.
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Maximum BFS depth from the seed.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Upper bound on concurrent download workers.
    #[arg(long)]
    pub max_download_workers: Option<usize>,

    /// "impersonate" for a random real-browser string, or a literal value.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Emit machine-readable JSON stats lines instead of human-readable
    /// text, on each performance-sampler tick and once at shutdown.
    #[arg(long)]
    pub stats_json: bool,
}

/// TOML-deserializable overlay; every field optional so a partial file only
/// overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    max_depth: Option<u32>,
    concurrent_workers: Option<usize>,
    max_queue_size: Option<usize>,
    initial_download_workers: Option<usize>,
    max_download_workers: Option<usize>,
    max_retries: Option<u32>,
    doc_extensions: Option<Vec<String>>,
    user_agent: Option<String>,
}

/// Fully resolved, validated configuration the rest of the crate runs with.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub seed_url: String,
    pub target_dir: PathBuf,
    pub interfaces: Vec<NetworkInterface>,
    pub crawl: CrawlConfig,
    pub download: DownloadConfig,
    pub client_pool: ClientPoolConfig,
    pub stats_json: bool,
}

impl AppConfig {
    /// Build the final config from CLI flags, layering an optional TOML
    /// file underneath them, then validating.
    pub fn from_cli(cli: Cli, interfaces: Vec<NetworkInterface>) -> Result<Self, ConfigError> {
        let file_config = match &cli.config_file {
            Some(path) => load_file_config(path)?,
            None => FileConfig::default(),
        };

        let seed_url = normalize_seed(&cli.seed_url)?;

        if interfaces.is_empty() {
            return Err(ConfigError::NoInterfaces);
        }

        std::fs::create_dir_all(&cli.target_dir)
            .map_err(|err| ConfigError::TargetDirUnwritable(cli.target_dir.clone(), err))?;

        let mut crawl = CrawlConfig::default();
        crawl.max_depth = cli.max_depth.or(file_config.max_depth).unwrap_or(crawl.max_depth);
        crawl.concurrent_workers = file_config.concurrent_workers.unwrap_or(crawl.concurrent_workers);
        if let Some(extensions) = file_config.doc_extensions {
            crawl.doc_extensions = extensions;
        }

        let mut download = DownloadConfig::default();
        download.max_queue_size = file_config.max_queue_size.unwrap_or(download.max_queue_size);
        download.initial_workers = file_config
            .initial_download_workers
            .unwrap_or(download.initial_workers);
        download.max_workers = cli
            .max_download_workers
            .or(file_config.max_download_workers)
            .unwrap_or(download.max_workers);
        download.max_retries = file_config.max_retries.unwrap_or(download.max_retries);
        download.target_dir = cli.target_dir.clone();
        download.rate_limit_burst = rate_limit_burst(download.max_workers);
        download.rate_limit_refill = rate_limit_refill();
        download.stats_json = cli.stats_json;

        let client_pool = ClientPoolConfig {
            user_agent: cli.user_agent.or(file_config.user_agent),
            ..ClientPoolConfig::default()
        };

        Ok(Self {
            seed_url,
            target_dir: cli.target_dir,
            interfaces,
            crawl,
            download,
            client_pool,
            stats_json: cli.stats_json,
        })
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::ConfigFileUnreadable(path.to_path_buf(), err))?;
    toml::from_str(&contents).map_err(|err| ConfigError::BadConfigFile(path.to_path_buf(), err))
}

/// Validate the seed URL, defaulting to `https` when no scheme is given.
fn normalize_seed(raw: &str) -> Result<String, ConfigError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let parsed = Url::parse(&candidate)?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::SeedInvalidScheme(candidate));
    }
    if parsed.host_str().unwrap_or("").is_empty() {
        return Err(ConfigError::SeedMissingHost(candidate));
    }

    Ok(candidate)
}

/// Non-interactive interface resolution: every up, non-loopback IPv4
/// interface on the host. Operator-driven selection is outside this crate's
/// core (see the network boundary notes); this is the standalone fallback.
#[cfg(target_os = "linux")]
pub fn resolve_interfaces() -> Vec<NetworkInterface> {
    use std::ffi::CStr;

    let mut interfaces = Vec::new();
    unsafe {
        let mut addrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(&mut addrs) != 0 {
            return crate::net::loopback_fallback();
        }

        let mut cursor = addrs;
        while !cursor.is_null() {
            let entry = &*cursor;
            if !entry.ifa_addr.is_null() {
                let family = (*entry.ifa_addr).sa_family as i32;
                if family == libc::AF_INET {
                    let sockaddr = entry.ifa_addr as *const libc::sockaddr_in;
                    let ip = Ipv4Addr::from(u32::from_be((*sockaddr).sin_addr.s_addr));
                    let up = entry.ifa_flags & (libc::IFF_UP as u32) != 0;
                    let name = CStr::from_ptr(entry.ifa_name).to_string_lossy().to_string();

                    if up && !ip.is_loopback() {
                        interfaces.push(NetworkInterface::new(name, ip, LinkSpeed::Unknown));
                    }
                }
            }
            cursor = entry.ifa_next;
        }
        libc::freeifaddrs(addrs);
    }

    if interfaces.is_empty() {
        crate::net::loopback_fallback()
    } else {
        crate::net::interface::assign_worker_shares(&mut interfaces);
        interfaces
    }
}

#[cfg(not(target_os = "linux"))]
pub fn resolve_interfaces() -> Vec<NetworkInterface> {
    crate::net::loopback_fallback()
}

/// Background refill interval and burst size for the rate limiter, derived
/// from the configured worker ceiling: burst is a fixed multiple of
/// `max_workers` so admission pressure scales with worker fan-out.
pub fn rate_limit_burst(max_workers: usize) -> usize {
    max_workers.saturating_mul(4).max(1)
}

pub fn rate_limit_refill() -> Duration {
    Duration::from_micros(10)
}
