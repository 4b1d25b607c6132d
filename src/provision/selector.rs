//! Server Selector
//!
//! Picks the storage server(s) that will serve a new device request, under
//! the configured load-balancing policy. Capacity-policy discoveries are
//! cached per kind so repeated selections for the same kind reuse the
//! monitored ranking without re-querying.

use crate::config::sections::LoadBalancingPolicy;
use crate::domain::ports::{CapacityMonitorRef, StorageKind, StorageServer};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use tracing::{debug, info, warn};

// =============================================================================
// Server Cache
// =============================================================================

/// Per-kind cache of capacity-ranked servers
///
/// Owned by the selector rather than process-global, so test runs reset it
/// deterministically by constructing a new selector.
#[derive(Debug, Default)]
pub struct ServerCache {
    inner: Mutex<HashMap<StorageKind, Vec<StorageServer>>>,
}

impl ServerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached ranking for a kind, when present
    pub fn get(&self, kind: StorageKind) -> Option<Vec<StorageServer>> {
        self.inner.lock().get(&kind).cloned()
    }

    /// Store a ranking for a kind
    pub fn put(&self, kind: StorageKind, servers: Vec<StorageServer>) {
        self.inner.lock().insert(kind, servers);
    }

    /// Drop every cached ranking
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

// =============================================================================
// Server Selector
// =============================================================================

/// Selects servers for new device requests under a load-balancing policy
pub struct ServerSelector {
    policy: LoadBalancingPolicy,
    monitor: Option<CapacityMonitorRef>,
    cache: ServerCache,
}

impl ServerSelector {
    /// Create a selector for a policy
    ///
    /// A monitor is required only for [`LoadBalancingPolicy::Capacity`].
    pub fn new(policy: LoadBalancingPolicy, monitor: Option<CapacityMonitorRef>) -> Self {
        Self {
            policy,
            monitor,
            cache: ServerCache::new(),
        }
    }

    /// Active policy
    pub fn policy(&self) -> LoadBalancingPolicy {
        self.policy
    }

    /// Select up to `count` servers for a kind from the eligible pool
    ///
    /// Returns an empty list when the kind has no eligible server under a
    /// non-capacity policy; callers skip that kind with a logged reason
    /// rather than treating it as an error.
    pub async fn select(
        &self,
        kind: StorageKind,
        eligible: &[String],
        count: usize,
    ) -> Result<Vec<StorageServer>> {
        match self.policy {
            LoadBalancingPolicy::None => {
                if eligible.is_empty() {
                    warn!("no servers configured for kind {}, skipping", kind);
                    return Ok(Vec::new());
                }
                // selection is a no-op; take the configured servers as given
                Ok(eligible
                    .iter()
                    .take(count)
                    .map(|addr| StorageServer::new(addr.clone(), kind))
                    .collect())
            }
            LoadBalancingPolicy::Random => {
                if eligible.is_empty() {
                    warn!("no servers configured for kind {}, skipping", kind);
                    return Ok(Vec::new());
                }
                let mut rng = rand::thread_rng();
                let picked: Vec<StorageServer> = eligible
                    .choose_multiple(&mut rng, count.min(eligible.len()))
                    .map(|addr| StorageServer::new(addr.clone(), kind))
                    .collect();
                debug!("random policy picked {} server(s) for {}", picked.len(), kind);
                Ok(picked)
            }
            LoadBalancingPolicy::Capacity => self.select_by_capacity(kind, eligible, count).await,
        }
    }

    /// Capacity policy: rank by monitored disk-space-to-CPU ratio, best first
    async fn select_by_capacity(
        &self,
        kind: StorageKind,
        eligible: &[String],
        count: usize,
    ) -> Result<Vec<StorageServer>> {
        if let Some(cached) = self.cache.get(kind) {
            debug!("reusing cached capacity ranking for {}", kind);
            return Ok(cached.into_iter().take(count).collect());
        }

        let monitor = self.monitor.as_ref().ok_or_else(|| Error::ServerSelection {
            kind: kind.to_string(),
            reason: "capacity policy active but no monitor configured".to_string(),
        })?;

        let ranked = monitor
            .servers_by_disk_space_to_cpu_ratio(kind)
            .await
            .map_err(|e| Error::ServerSelection {
                kind: kind.to_string(),
                reason: format!("monitoring unreachable: {}", e),
            })?;

        // restrict to the configured pool when one is given
        let ranked: Vec<StorageServer> = if eligible.is_empty() {
            ranked
        } else {
            ranked
                .into_iter()
                .filter(|s| eligible.iter().any(|addr| addr == &s.address))
                .collect()
        };

        if ranked.is_empty() {
            return Err(Error::ServerSelection {
                kind: kind.to_string(),
                reason: "no capacity data for any eligible server".to_string(),
            });
        }

        info!(
            "capacity policy ranked {} server(s) for {}, best: {}",
            ranked.len(),
            kind,
            ranked[0].address
        );

        self.cache.put(kind, ranked.clone());
        Ok(ranked.into_iter().take(count).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CapacityMonitor;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedMonitor {
        servers: Vec<StorageServer>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CapacityMonitor for FixedMonitor {
        async fn servers_by_disk_space_to_cpu_ratio(
            &self,
            _kind: StorageKind,
        ) -> Result<Vec<StorageServer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.servers.clone())
        }
    }

    struct DeadMonitor;

    #[async_trait]
    impl CapacityMonitor for DeadMonitor {
        async fn servers_by_disk_space_to_cpu_ratio(
            &self,
            _kind: StorageKind,
        ) -> Result<Vec<StorageServer>> {
            Err(Error::MonitoringQuery("connection refused".into()))
        }
    }

    fn ranked(addrs: &[(&str, f64)]) -> Vec<StorageServer> {
        addrs
            .iter()
            .map(|(a, r)| StorageServer {
                address: a.to_string(),
                kind: StorageKind::Nfs,
                available_ratio: Some(*r),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_none_policy_is_a_noop() {
        let selector = ServerSelector::new(LoadBalancingPolicy::None, None);
        let eligible = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        let picked = selector.select(StorageKind::Nfs, &eligible, 1).await.unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].address, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_empty_pool_skips_instead_of_failing() {
        let selector = ServerSelector::new(LoadBalancingPolicy::None, None);
        let picked = selector.select(StorageKind::Gluster, &[], 1).await.unwrap();
        assert!(picked.is_empty());

        let selector = ServerSelector::new(LoadBalancingPolicy::Random, None);
        let picked = selector.select(StorageKind::Gluster, &[], 2).await.unwrap();
        assert!(picked.is_empty());
    }

    #[tokio::test]
    async fn test_random_policy_picks_from_eligible() {
        let selector = ServerSelector::new(LoadBalancingPolicy::Random, None);
        let eligible = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        for _ in 0..10 {
            let picked = selector.select(StorageKind::Nfs, &eligible, 2).await.unwrap();
            assert_eq!(picked.len(), 2);
            for server in &picked {
                assert!(eligible.contains(&server.address));
            }
        }
        // asking for more than available caps at the pool size
        let picked = selector.select(StorageKind::Nfs, &eligible, 9).await.unwrap();
        assert_eq!(picked.len(), 3);
    }

    #[tokio::test]
    async fn test_capacity_policy_ranks_and_caches() {
        let monitor = Arc::new(FixedMonitor {
            servers: ranked(&[("fast", 9.5), ("slow", 1.2)]),
            calls: AtomicUsize::new(0),
        });
        let selector =
            ServerSelector::new(LoadBalancingPolicy::Capacity, Some(monitor.clone()));

        let picked = selector.select(StorageKind::Nfs, &[], 1).await.unwrap();
        assert_eq!(picked[0].address, "fast");

        // second selection for the same kind comes from the cache
        let picked = selector.select(StorageKind::Nfs, &[], 1).await.unwrap();
        assert_eq!(picked[0].address, "fast");
        assert_eq!(monitor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capacity_policy_respects_eligible_pool() {
        let monitor = Arc::new(FixedMonitor {
            servers: ranked(&[("outsider", 99.0), ("member", 2.0)]),
            calls: AtomicUsize::new(0),
        });
        let selector = ServerSelector::new(LoadBalancingPolicy::Capacity, Some(monitor));
        let eligible = vec!["member".to_string()];
        let picked = selector.select(StorageKind::Nfs, &eligible, 1).await.unwrap();
        assert_eq!(picked[0].address, "member");
    }

    #[tokio::test]
    async fn test_capacity_policy_monitor_failure() {
        let selector =
            ServerSelector::new(LoadBalancingPolicy::Capacity, Some(Arc::new(DeadMonitor)));
        let result = selector.select(StorageKind::Iscsi, &[], 1).await;
        assert_matches!(result, Err(Error::ServerSelection { .. }));

        // no monitor configured at all is also a selection error
        let selector = ServerSelector::new(LoadBalancingPolicy::Capacity, None);
        let result = selector.select(StorageKind::Iscsi, &[], 1).await;
        assert_matches!(result, Err(Error::ServerSelection { .. }));
    }
}
