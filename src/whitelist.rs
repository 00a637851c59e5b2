//! Override whitelists
//!
//! Two static membership tests that short-circuit the admission pipeline:
//! - path-prefix whitelist, checked before any IP logic so ACME challenges
//!   and health checks stay reachable during an active geo-block
//! - exact-IP whitelist (string equality, not CIDR)

use std::collections::HashSet;

/// Path prefixes exempt from all geo and IP checks
#[derive(Debug, Clone, Default)]
pub struct PathWhitelist {
    prefixes: Vec<String>,
}

impl PathWhitelist {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// A path matches if it equals or begins with any configured prefix
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// IPs admitted unconditionally
#[derive(Debug, Clone, Default)]
pub struct IpWhitelist {
    ips: HashSet<String>,
}

impl IpWhitelist {
    pub fn new<I: IntoIterator<Item = String>>(ips: I) -> Self {
        Self {
            ips: ips.into_iter().collect(),
        }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.ips.contains(ip)
    }
}
