//! IP-report listener.
//!
//! Antminer firmware broadcasts `ip,mac` over UDP when the IP-report button
//! is pressed. Listening for these finds devices on networks that cannot be
//! swept.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use crate::error::Result;

/// Default IP-report port.
pub const ANNOUNCE_PORT: u16 = 14235;

/// One parsed IP-report datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub ip: Ipv4Addr,
    pub mac: String,
}

impl Announcement {
    /// Parse `ip,mac`. The MAC is uppercased.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(datagram).ok()?;
        let (ip, mac) = text.trim_matches(char::from(0)).trim().split_once(',')?;
        let ip = ip.trim().parse().ok()?;
        let mac = mac.trim();
        if mac.is_empty() {
            return None;
        }
        Some(Self {
            ip,
            mac: mac.to_ascii_uppercase(),
        })
    }
}

pub struct Listener {
    socket: UdpSocket,
}

impl Listener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!(addr = %socket.local_addr()?, "Listening for IP reports");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait for the next well-formed announcement. Malformed datagrams are
    /// logged and skipped.
    pub async fn recv(&self) -> Result<Announcement> {
        let mut buf = [0u8; 512];
        loop {
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            match Announcement::parse(&buf[..n]) {
                Some(announcement) => {
                    tracing::info!(ip = %announcement.ip, mac = %announcement.mac, "IP report received");
                    return Ok(announcement);
                }
                None => tracing::debug!(from = %from, len = n, "Ignoring malformed IP report"),
            }
        }
    }

    /// Collect announcements until `duration` elapses.
    pub async fn listen_for(&self, duration: Duration) -> Result<Vec<Announcement>> {
        let deadline = Instant::now() + duration;
        let mut seen = Vec::new();
        while let Ok(received) = timeout_at(deadline, self.recv()).await {
            seen.push(received?);
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announcement() {
        let a = Announcement::parse(b"192.168.1.23,a0:b1:c2:d3:e4:f5").unwrap();
        assert_eq!(a.ip, Ipv4Addr::new(192, 168, 1, 23));
        assert_eq!(a.mac, "A0:B1:C2:D3:E4:F5");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Announcement::parse(b"hello").is_none());
        assert!(Announcement::parse(b"300.1.1.1,aa").is_none());
        assert!(Announcement::parse(b"10.0.0.1,").is_none());
    }

    #[tokio::test]
    async fn test_listen_for_collects() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"junk", addr).await.unwrap();
        sender.send_to(b"10.0.0.7,de:ad:be:ef:00:01", addr).await.unwrap();

        let seen = listener.listen_for(Duration::from_millis(300)).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].mac, "DE:AD:BE:EF:00:01");
    }
}
