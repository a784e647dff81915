// Copyright (c) 2025 - Cowboy AI, Inc.
//! CIDR Block Value Object with Subnet Allocation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IPv4 address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Host bits set in CIDR block {0}")]
    HostBitsSet(String),

    #[error("Subnet /{prefix} does not fit in {block}: address space exhausted")]
    Exhausted { block: String, prefix: u8 },

    #[error("Subnet prefix /{prefix} is larger than its parent block {block}")]
    PrefixTooShort { block: String, prefix: u8 },
}

/// IPv4 CIDR block value object
///
/// Invariants:
/// - Valid IPv4 network address
/// - Prefix length 0-32
/// - No host bits set (canonical network address)
///
/// # Examples
///
/// ```rust
/// use data_platform_infra::domain::Ipv4Cidr;
///
/// let vpc = Ipv4Cidr::new("10.1.0.0/16").unwrap();
/// let subnet = Ipv4Cidr::new("10.1.32.0/19").unwrap();
/// assert!(vpc.contains(&subnet));
/// assert!(Ipv4Cidr::new("10.1.0.1/16").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_length: u8,
}

impl Ipv4Cidr {
    /// `0.0.0.0/0`
    pub const ANYWHERE: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::UNSPECIFIED,
        prefix_length: 0,
    };

    /// Parse a block from `a.b.c.d/n` notation
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let network = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(network, prefix_length).and_then(|block| {
            if block.network != network {
                return Err(NetworkError::HostBitsSet(cidr.to_string()));
            }
            Ok(block)
        })
    }

    /// Create from a network address and prefix, masking off host bits
    pub fn from_parts(address: Ipv4Addr, prefix_length: u8) -> Result<Self, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let bits = u32::from(address) & Self::mask(prefix_length);
        Ok(Self {
            network: Ipv4Addr::from(bits),
            prefix_length,
        })
    }

    fn mask(prefix_length: u8) -> u32 {
        if prefix_length == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_length))
        }
    }

    /// Get the network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Get the prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Number of addresses covered by the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_length))
    }

    fn first(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    fn last(&self) -> u64 {
        self.first() + self.size() - 1
    }

    /// Check whether `other` lies entirely inside this block
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix_length >= self.prefix_length
            && other.first() >= self.first()
            && other.last() <= self.last()
    }

    /// Check whether two blocks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// Get as CIDR notation string
    pub fn as_cidr(&self) -> String {
        format!("{}/{}", self.network, self.prefix_length)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_cidr())
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Sequential, alignment-respecting carve-out of subnets from a parent block
///
/// Blocks are handed out in request order; each one starts at the next
/// address aligned to its own size, so allocations never overlap and never
/// leave the parent block.
#[derive(Debug, Clone)]
pub struct SubnetAllocator {
    block: Ipv4Cidr,
    cursor: u64,
}

impl SubnetAllocator {
    pub fn new(block: Ipv4Cidr) -> Self {
        Self {
            cursor: block.first(),
            block,
        }
    }

    /// Allocate the next free block of the given prefix length
    pub fn allocate(&mut self, prefix_length: u8) -> Result<Ipv4Cidr, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }
        if prefix_length < self.block.prefix_length {
            return Err(NetworkError::PrefixTooShort {
                block: self.block.as_cidr(),
                prefix: prefix_length,
            });
        }

        let size = 1u64 << (32 - u32::from(prefix_length));
        let start = self.cursor.div_ceil(size) * size;
        let end = start + size - 1;

        if end > self.block.last() {
            return Err(NetworkError::Exhausted {
                block: self.block.as_cidr(),
                prefix: prefix_length,
            });
        }

        self.cursor = end + 1;
        // start fits in u32 because end <= block.last() <= u32::MAX
        Ipv4Cidr::from_parts(Ipv4Addr::from(start as u32), prefix_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr() {
        let block = Ipv4Cidr::new("10.1.0.0/16").unwrap();
        assert_eq!(block.network().to_string(), "10.1.0.0");
        assert_eq!(block.prefix_length(), 16);
        assert_eq!(block.size(), 65536);
        assert_eq!(block.as_cidr(), "10.1.0.0/16");
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(Ipv4Cidr::new("10.1.0.0").is_err());
        assert!(Ipv4Cidr::new("999.1.0.0/16").is_err());
        assert!(Ipv4Cidr::new("10.1.0.0/33").is_err());
        assert!(matches!(
            Ipv4Cidr::new("10.1.0.1/16"),
            Err(NetworkError::HostBitsSet(_))
        ));
    }

    #[test]
    fn test_contains_and_overlaps() {
        let vpc = Ipv4Cidr::new("10.1.0.0/16").unwrap();
        let a = Ipv4Cidr::new("10.1.0.0/19").unwrap();
        let b = Ipv4Cidr::new("10.1.16.0/20").unwrap();
        let c = Ipv4Cidr::new("10.1.32.0/19").unwrap();
        let outside = Ipv4Cidr::new("10.2.0.0/20").unwrap();

        assert!(vpc.contains(&a));
        assert!(!a.contains(&vpc));
        assert!(!vpc.contains(&outside));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_allocator_aligns_blocks() {
        let vpc = Ipv4Cidr::new("10.1.0.0/16").unwrap();
        let mut allocator = SubnetAllocator::new(vpc);

        let first = allocator.allocate(20).unwrap();
        let second = allocator.allocate(19).unwrap();
        assert_eq!(first.as_cidr(), "10.1.0.0/20");
        // a /19 must start on a /19 boundary
        assert_eq!(second.as_cidr(), "10.1.32.0/19");
        assert!(!first.overlaps(&second));
    }

    #[test]
    fn test_allocator_exhaustion() {
        let block = Ipv4Cidr::new("10.1.0.0/24").unwrap();
        let mut allocator = SubnetAllocator::new(block);
        allocator.allocate(25).unwrap();
        allocator.allocate(25).unwrap();
        assert!(matches!(
            allocator.allocate(25),
            Err(NetworkError::Exhausted { .. })
        ));
        assert!(matches!(
            SubnetAllocator::new(block).allocate(16),
            Err(NetworkError::PrefixTooShort { .. })
        ));
    }
}
