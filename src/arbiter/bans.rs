//! Address ban list.
//!
//! Bans are keyed on IP only; a banned peer stays banned whatever source
//! port it reconnects from. The set only grows while the server runs and is
//! cleared on stop.

use std::net::IpAddr;

use dashmap::DashSet;

#[derive(Debug, Default)]
pub struct BanList {
    inner: DashSet<IpAddr>,
}

impl BanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban an address. Returns `true` if it was not banned before.
    pub fn ban(&self, addr: IpAddr) -> bool {
        self.inner.insert(addr)
    }

    pub fn is_banned(&self, addr: &IpAddr) -> bool {
        self.inner.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Banned addresses, sorted for stable output.
    pub fn snapshot(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<IpAddr> = self.inner.iter().map(|r| *r.key()).collect();
        addrs.sort();
        addrs
    }
}
