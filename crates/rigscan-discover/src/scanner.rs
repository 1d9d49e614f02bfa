//! Reachability scanner.
//!
//! Bare TCP connects against the management port. Nothing is written; a
//! completed handshake is closed immediately and counted as reachable.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::DiscoverConfig;
use crate::target::NetworkTarget;

/// Result of probing one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub address: Ipv4Addr,
    /// Port that accepted the connection.
    pub port: u16,
    pub reachable: bool,
}

enum Attempt {
    Open,
    Refused,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Scanner {
    port: u16,
    fallback_ports: Vec<u16>,
    retries: u32,
    timeout: Duration,
    concurrency: usize,
}

impl Scanner {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            fallback_ports: Vec::new(),
            retries: 3,
            timeout: Duration::from_secs(5),
            concurrency: 300,
        }
    }

    pub fn from_config(config: &DiscoverConfig) -> Self {
        Self::new(config.api_port)
            .with_fallback_ports(config.fallback_ports.clone())
            .with_retries(config.ping_retries)
            .with_timeout(config.ping_timeout())
            .with_concurrency(config.scan_concurrency)
    }

    pub fn with_fallback_ports(mut self, ports: Vec<u16>) -> Self {
        self.fallback_ports = ports;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn attempt(&self, ip: Ipv4Addr, port: u16) -> Attempt {
        let addr = SocketAddr::new(IpAddr::V4(ip), port);
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Attempt::Open
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Attempt::Refused,
            Ok(Err(e)) => {
                tracing::trace!(ip = %ip, port, error = %e, "Connect failed");
                Attempt::Failed
            }
            Err(_) => Attempt::Failed,
        }
    }

    /// Probe one address.
    ///
    /// The primary port gets the full retry budget. If any attempt there was
    /// actively refused, each fallback port is tried once.
    pub async fn probe(&self, ip: Ipv4Addr) -> ProbeOutcome {
        let mut refused = false;
        for _ in 0..self.retries {
            match self.attempt(ip, self.port).await {
                Attempt::Open => return self.outcome(ip, self.port, true),
                Attempt::Refused => refused = true,
                Attempt::Failed => {}
            }
        }

        if refused {
            for &port in &self.fallback_ports {
                if let Attempt::Open = self.attempt(ip, port).await {
                    tracing::debug!(ip = %ip, port, "Reachable on fallback port");
                    return self.outcome(ip, port, true);
                }
            }
        }
        self.outcome(ip, self.port, false)
    }

    fn outcome(&self, address: Ipv4Addr, port: u16, reachable: bool) -> ProbeOutcome {
        ProbeOutcome {
            address,
            port,
            reachable,
        }
    }

    /// Lazily probe every host in `target`, yielding reachable ones as they
    /// complete. At most `concurrency` probes are in flight.
    pub fn scan<'a>(&'a self, target: &NetworkTarget) -> impl Stream<Item = ProbeOutcome> + 'a {
        stream::iter(target.clone().into_hosts())
            .map(move |ip| self.probe(ip))
            .buffer_unordered(self.concurrency)
            .filter(|o| futures::future::ready(o.reachable))
    }

    /// Run a full scan and collect the reachable addresses.
    pub async fn scan_all(&self, target: &NetworkTarget) -> Vec<ProbeOutcome> {
        let scan_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(%scan_id, target = %target, hosts = target.len(), "Starting scan");

        let found: Vec<ProbeOutcome> = self.scan(target).collect().await;

        tracing::info!(
            %scan_id,
            reachable = found.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Scan complete"
        );
        found
    }
}
