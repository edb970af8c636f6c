//! Network interface model.
//!
//! Enumeration and interactive selection live outside this crate's core
//! (see `SPEC_FULL.md` §4.5); what the core owns is the resolved list of
//! interfaces to bind workers to, plus a non-interactive fallback so the
//! crate runs standalone.

use std::net::Ipv4Addr;

/// Coarse link-speed classes used only to weight each interface's share of
/// the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpeed {
    Unknown,
    OneGbps,
    TenGbps,
}

impl LinkSpeed {
    /// Relative weight used to divide the global worker total across
    /// interfaces. A 10 Gbps interface gets a large multiple of a 1 Gbps
    /// one; an interface of unknown speed is treated conservatively.
    fn weight(self) -> u32 {
        match self {
            LinkSpeed::Unknown => 1,
            LinkSpeed::OneGbps => 1,
            LinkSpeed::TenGbps => 10,
        }
    }
}

/// A selected local network interface, immutable for the run.
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub name: String,
    pub source_ip: Ipv4Addr,
    pub up: bool,
    pub speed: LinkSpeed,
    /// This interface's fraction (0.0-1.0) of the global worker pool, set by
    /// `assign_worker_shares` once every interface for the run is known.
    /// A freshly-constructed interface defaults to 1.0, correct only when it
    /// is the sole interface.
    pub target_worker_share: f64,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, source_ip: Ipv4Addr, speed: LinkSpeed) -> Self {
        Self {
            name: name.into(),
            source_ip,
            up: true,
            speed,
            target_worker_share: 1.0,
        }
    }
}

/// Set each interface's `target_worker_share` from its link-speed weight
/// relative to the sum of all weights in `interfaces`. Call once, after the
/// final interface list for the run is known.
pub fn assign_worker_shares(interfaces: &mut [NetworkInterface]) {
    let weight_sum: u32 = interfaces.iter().map(|i| i.speed.weight()).sum::<u32>().max(1);
    for interface in interfaces.iter_mut() {
        interface.target_worker_share = interface.speed.weight() as f64 / weight_sum as f64;
    }
}

/// Divide `total_workers` across `interfaces` proportionally to
/// `target_worker_share`, rounding down and handing the remainder to the
/// highest-share interfaces first.
pub fn worker_shares(interfaces: &[NetworkInterface], total_workers: usize) -> Vec<usize> {
    if interfaces.is_empty() {
        return Vec::new();
    }

    let mut shares: Vec<usize> = interfaces
        .iter()
        .map(|i| (total_workers as f64 * i.target_worker_share) as usize)
        .collect();

    let assigned: usize = shares.iter().sum();
    let mut remainder = total_workers.saturating_sub(assigned);

    // Hand out the remainder to the highest-share interfaces first so
    // rounding never drops workers.
    let mut order: Vec<usize> = (0..interfaces.len()).collect();
    order.sort_by(|&a, &b| {
        interfaces[b]
            .target_worker_share
            .total_cmp(&interfaces[a].target_worker_share)
    });
    for idx in order {
        if remainder == 0 {
            break;
        }
        shares[idx] += 1;
        remainder -= 1;
    }

    shares
}

/// Fallback used when the operator hasn't resolved interfaces externally:
/// a single loopback-bound interface of unknown speed. Real deployments
/// pass in OS-enumerated interfaces instead.
pub fn loopback_fallback() -> Vec<NetworkInterface> {
    let mut interfaces = vec![NetworkInterface::new(
        "lo",
        Ipv4Addr::LOCALHOST,
        LinkSpeed::Unknown,
    )];
    assign_worker_shares(&mut interfaces);
    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_shares_sum_to_total() {
        let mut interfaces = vec![
            NetworkInterface::new("eth0", Ipv4Addr::new(10, 0, 0, 1), LinkSpeed::OneGbps),
            NetworkInterface::new("eth1", Ipv4Addr::new(10, 0, 0, 2), LinkSpeed::TenGbps),
        ];
        assign_worker_shares(&mut interfaces);
        let shares = worker_shares(&interfaces, 100);
        assert_eq!(shares.iter().sum::<usize>(), 100);
        assert!(shares[1] > shares[0]);
    }

    #[test]
    fn worker_shares_empty_interfaces_yields_empty() {
        assert!(worker_shares(&[], 100).is_empty());
    }

    #[test]
    fn assign_worker_shares_normalizes_to_one() {
        let mut interfaces = vec![
            NetworkInterface::new("eth0", Ipv4Addr::new(10, 0, 0, 1), LinkSpeed::OneGbps),
            NetworkInterface::new("eth1", Ipv4Addr::new(10, 0, 0, 2), LinkSpeed::TenGbps),
        ];
        assign_worker_shares(&mut interfaces);
        let total: f64 = interfaces.iter().map(|i| i.target_worker_share).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
