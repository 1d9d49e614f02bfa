//! Scan targets.
//!
//! A target is a set of IPv4 addresses kept as sorted, merged, inclusive
//! intervals so large subnets cost nothing until they are iterated.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;

use crate::error::{DiscoverError, Result};

const DEFAULT_NETWORK: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 0);
const DEFAULT_PREFIX: u8 = 24;

/// A finite, ordered set of IPv4 host addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkTarget {
    ranges: Vec<(u32, u32)>,
}

impl NetworkTarget {
    /// Host addresses of a subnet.
    ///
    /// Defaults to `192.168.1.0/24`. `mask` accepts a prefix length
    /// (`24` or `/24`), a netmask (`255.255.255.0`) or a hostmask
    /// (`0.0.0.255`).
    pub fn from_network(ip: Option<Ipv4Addr>, mask: Option<&str>) -> Result<Self> {
        let ip = ip.unwrap_or(DEFAULT_NETWORK);
        let prefix = match mask {
            Some(m) => parse_mask(m)?,
            None => DEFAULT_PREFIX,
        };
        let net = Ipv4Net::new(ip, prefix)
            .map_err(|e| DiscoverError::target(&format!("{ip}/{prefix}"), e.to_string()))?;
        Ok(Self::from_ranges(vec![host_bounds(&net)]))
    }

    /// Exactly the listed addresses.
    pub fn from_list<I: IntoIterator<Item = Ipv4Addr>>(addrs: I) -> Self {
        Self::from_ranges(
            addrs
                .into_iter()
                .map(|a| (u32::from(a), u32::from(a)))
                .collect(),
        )
    }

    fn from_ranges(mut ranges: Vec<(u32, u32)>) -> Self {
        ranges.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { ranges: merged }
    }

    pub fn len(&self) -> u64 {
        self.ranges
            .iter()
            .map(|(s, e)| u64::from(e - s) + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let ip = u32::from(ip);
        self.ranges.iter().any(|&(s, e)| s <= ip && ip <= e)
    }

    /// Iterate addresses in ascending order. Restartable.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.ranges
            .iter()
            .flat_map(|&(s, e)| (s..=e).map(Ipv4Addr::from))
    }

    pub fn into_hosts(self) -> impl Iterator<Item = Ipv4Addr> + Send + 'static {
        self.ranges
            .into_iter()
            .flat_map(|(s, e)| (s..=e).map(Ipv4Addr::from))
    }
}

fn host_bounds(net: &Ipv4Net) -> (u32, u32) {
    let network = u32::from(net.network());
    let broadcast = u32::from(net.broadcast());
    if net.prefix_len() >= 31 {
        (network, broadcast)
    } else {
        (network + 1, broadcast - 1)
    }
}

fn parse_mask(mask: &str) -> Result<u8> {
    let raw = mask.trim().trim_start_matches('/');
    if let Ok(prefix) = raw.parse::<u8>() {
        if prefix <= 32 {
            return Ok(prefix);
        }
        return Err(DiscoverError::target(mask, "prefix length exceeds 32"));
    }
    let addr: Ipv4Addr = raw
        .parse()
        .map_err(|_| DiscoverError::target(mask, "not a prefix length or dotted mask"))?;
    if let Ok(prefix) = ipnet::ipv4_mask_to_prefix(addr) {
        return Ok(prefix);
    }
    ipnet::ipv4_mask_to_prefix(Ipv4Addr::from(!u32::from(addr)))
        .map_err(|_| DiscoverError::target(mask, "mask bits are not contiguous"))
}

fn parse_ip(input: &str, raw: &str) -> Result<Ipv4Addr> {
    raw.trim()
        .parse()
        .map_err(|_| DiscoverError::target(input, format!("invalid address {raw:?}")))
}

/// Parse `a.b.c.d-e.f.g.h` or the abbreviated `a.b.c.d-h` / `a.b.c.d-g.h`.
fn parse_range(item: &str, start: &str, end: &str) -> Result<(u32, u32)> {
    let start = parse_ip(item, start)?;
    let end = end.trim();
    let tail: Vec<&str> = end.split('.').collect();
    if tail.is_empty() || tail.len() > 4 {
        return Err(DiscoverError::target(item, "malformed range end"));
    }

    let mut octets = start.octets();
    let offset = 4 - tail.len();
    for (i, part) in tail.iter().enumerate() {
        octets[offset + i] = part
            .parse()
            .map_err(|_| DiscoverError::target(item, format!("invalid octet {part:?}")))?;
    }

    let (s, e) = (u32::from(start), u32::from(Ipv4Addr::from(octets)));
    if e < s {
        return Err(DiscoverError::target(item, "range end precedes start"));
    }
    Ok((s, e))
}

impl FromStr for NetworkTarget {
    type Err = DiscoverError;

    /// Comma-separated list of single addresses, dashed ranges and CIDR
    /// blocks. Blank items are skipped.
    fn from_str(s: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            if let Some((start, end)) = item.split_once('-') {
                ranges.push(parse_range(item, start, end)?);
            } else if item.contains('/') {
                let net: Ipv4Net = item
                    .parse()
                    .map_err(|_| DiscoverError::target(item, "invalid CIDR block"))?;
                ranges.push(host_bounds(&net.trunc()));
            } else {
                let ip = u32::from(parse_ip(item, item)?);
                ranges.push((ip, ip));
            }
        }
        if ranges.is_empty() {
            return Err(DiscoverError::target(s, "no addresses"));
        }
        Ok(Self::from_ranges(ranges))
    }
}

impl fmt::Display for NetworkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|&(s, e)| {
                if s == e {
                    Ipv4Addr::from(s).to_string()
                } else {
                    format!("{}-{}", Ipv4Addr::from(s), Ipv4Addr::from(e))
                }
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}
