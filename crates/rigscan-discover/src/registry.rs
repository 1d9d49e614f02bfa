//! Identity registry.
//!
//! Caches resolved identities by address so a device is classified once.
//! Unknown results are never cached; the next lookup classifies again.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::classify::Classifier;
use crate::identity::MinerIdentity;
use crate::scanner::Scanner;
use crate::target::NetworkTarget;

pub struct MinerRegistry {
    classifier: Classifier,
    port: u16,
    cache: RwLock<HashMap<Ipv4Addr, Arc<MinerIdentity>>>,
}

impl MinerRegistry {
    pub fn new(classifier: Classifier, port: u16) -> Self {
        Self {
            classifier,
            port,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Identity for `ip` on the default port.
    pub async fn get(&self, ip: Ipv4Addr) -> Arc<MinerIdentity> {
        self.get_at(ip, self.port).await
    }

    /// Identity for `ip`, classifying on `port` on a cache miss.
    pub async fn get_at(&self, ip: Ipv4Addr, port: u16) -> Arc<MinerIdentity> {
        if let Some(hit) = self.cache.read().await.get(&ip) {
            return hit.clone();
        }

        let identity = Arc::new(self.classifier.identify(ip, port).await);
        if !identity.is_unknown() {
            // Concurrent lookups for one address keep the first stored entry.
            let mut cache = self.cache.write().await;
            return cache.entry(ip).or_insert(identity).clone();
        }
        identity
    }

    pub async fn cached(&self, ip: Ipv4Addr) -> Option<Arc<MinerIdentity>> {
        self.cache.read().await.get(&ip).cloned()
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Scan `target` and identify every reachable device.
    ///
    /// Clears the cache before the sweep starts. Identities are yielded as
    /// each classification completes.
    pub fn scan_and_identify<'a>(
        &'a self,
        scanner: &'a Scanner,
        target: &'a NetworkTarget,
        concurrency: usize,
    ) -> impl Stream<Item = Arc<MinerIdentity>> + 'a {
        let scan_id = Uuid::new_v4();
        let started = Instant::now();
        let miners = Arc::new(AtomicUsize::new(0));
        let unknown = Arc::new(AtomicUsize::new(0));
        let (seen, unseen) = (miners.clone(), unknown.clone());

        let finished = stream::once(async move {
            tracing::info!(
                %scan_id,
                miners = miners.load(Ordering::Relaxed),
                unknown = unknown.load(Ordering::Relaxed),
                duration_ms = started.elapsed().as_millis() as u64,
                "Fleet scan complete"
            );
            None::<Arc<MinerIdentity>>
        })
        .filter_map(future::ready);

        stream::once(async move {
            self.clear().await;
            tracing::info!(%scan_id, target = %target, hosts = target.len(), "Starting fleet scan");
        })
        .flat_map(move |()| scanner.scan(target))
        .map(move |found| self.get_at(found.address, found.port))
        .buffer_unordered(concurrency.max(1))
        .inspect(move |identity| {
            seen.fetch_add(1, Ordering::Relaxed);
            if identity.is_unknown() {
                unseen.fetch_add(1, Ordering::Relaxed);
            }
        })
        .chain(finished)
    }

    /// Identify a fixed list of addresses on the default port.
    pub async fn identify_all(&self, ips: &[Ipv4Addr], concurrency: usize) -> Vec<Arc<MinerIdentity>> {
        stream::iter(ips.iter().copied())
            .map(|ip| self.get(ip))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unknown_not_cached() {
        let classifier = Classifier::default()
            .with_retries(1)
            .with_timeout(Duration::from_secs(2))
            .with_command_timeout(Duration::from_millis(200));
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let registry = MinerRegistry::new(classifier, port);
        let identity = registry.get(Ipv4Addr::LOCALHOST).await;
        assert!(identity.is_unknown());
        assert!(registry.is_empty().await);
    }
}
