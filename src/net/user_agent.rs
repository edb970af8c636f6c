//! User agent selection, keyed per network interface.
//!
//! Every client in an `InterfaceClientPool` shares one interface's source IP,
//! so they must also share one identity: a client pool that handed out a
//! different impersonate string to each of its N clients would be a more
//! obvious fingerprint than sending no impersonation at all. Selection is
//! therefore a pure function of the interface name, not of wall-clock time.

pub const USER_AGENT: &str = "multicrawl/0.1 (+https://example.invalid/bot)";

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:132.0) Gecko/20100101 Firefox/132.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0",
];

/// FNV-1a over the interface name, so the same interface always lands on
/// the same entry across process restarts and across every client built
/// for its pool.
fn impersonate_index(interface_name: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in interface_name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % IMPERSONATE_USER_AGENTS.len() as u64) as usize
}

/// Resolve the user agent string clients bound to `interface_name` should
/// send.
/// - `None` => default user agent
/// - `Some("impersonate")` => a real browser string, stable per interface
/// - `Some(custom)` => the literal custom string
pub fn resolve_user_agent(config: Option<&str>, interface_name: &str) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => IMPERSONATE_USER_AGENTS[impersonate_index(interface_name)].to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_user_agent_default() {
        let ua = resolve_user_agent(None, "eth0");
        assert!(ua.contains("multicrawl"));
    }

    #[test]
    fn resolve_user_agent_impersonate() {
        let ua = resolve_user_agent(Some("impersonate"), "eth0");
        assert!(ua.contains("Mozilla"));
        assert!(!ua.contains("multicrawl"));
    }

    #[test]
    fn resolve_user_agent_custom() {
        let ua = resolve_user_agent(Some("MyBot/1.0"), "eth0");
        assert_eq!(ua, "MyBot/1.0");
    }

    #[test]
    fn impersonate_choice_is_stable_per_interface() {
        let first = resolve_user_agent(Some("impersonate"), "eth0");
        let second = resolve_user_agent(Some("impersonate"), "eth0");
        assert_eq!(first, second);
    }

    #[test]
    fn impersonate_choice_can_differ_across_interfaces() {
        let names = ["eth0", "eth1", "eth2", "eth3", "wlan0"];
        let choices: std::collections::HashSet<_> = names
            .iter()
            .map(|name| resolve_user_agent(Some("impersonate"), name))
            .collect();
        assert!(choices.len() > 1, "expected at least two distinct picks across {names:?}");
    }
}
