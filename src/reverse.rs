//! Read-only view of an address to host name index used to answer PTR queries.
//!
//! The index is maintained elsewhere (for example by a cluster membership
//! watcher); the query path only reads from it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;

pub trait ReverseIndex: Send + Sync {
    /// Fully qualified host names registered for `addr`, in registration order
    fn lookup(&self, addr: IpAddr) -> Vec<String>;
}

/// Shared in-memory index
#[derive(Default)]
pub struct StaticReverseIndex {
    entries: RwLock<HashMap<IpAddr, Vec<String>>>,
}

impl StaticReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, addr: IpAddr, host: &str) {
        let host = crate::dns::name::normalize(host);
        let mut entries = self.entries.write();
        let hosts = entries.entry(addr).or_default();
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }

    pub fn remove(&self, addr: IpAddr) {
        self.entries.write().remove(&addr);
    }
}

impl ReverseIndex for StaticReverseIndex {
    fn lookup(&self, addr: IpAddr) -> Vec<String> {
        self.entries.read().get(&addr).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let index = StaticReverseIndex::new();
        let addr: IpAddr = "10.0.0.7".parse().unwrap();
        index.insert(addr, "Node7.cluster.local");
        index.insert(addr, "node7.cluster.local.");

        assert_eq!(index.lookup(addr), vec!["node7.cluster.local."]);
        index.remove(addr);
        assert!(index.lookup(addr).is_empty());
    }
}
