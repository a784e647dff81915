// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subnet allocation properties

use data_platform_infra::domain::{Ipv4Cidr, SubnetAllocator};
use data_platform_infra::validation::validate_subnet_layout;
use proptest::prelude::*;
use std::net::Ipv4Addr;

/// A /8 to /20 block at an aligned address in 10.0.0.0/8
fn vpc_block() -> impl Strategy<Value = Ipv4Cidr> {
    (8u8..=20, any::<u32>()).prop_map(|(prefix, seed)| {
        let host_bits = 32 - u32::from(prefix);
        let network = (0x0A00_0000 | (seed & 0x00FF_FFFF)) >> host_bits << host_bits;
        Ipv4Cidr::from_parts(Ipv4Addr::from(network), prefix).unwrap()
    })
}

proptest! {
    #[test]
    fn allocations_stay_inside_and_never_overlap(
        block in vpc_block(),
        extra in prop::collection::vec(1u8..=12, 1..24),
    ) {
        let mut allocator = SubnetAllocator::new(block);
        let mut subnets = Vec::new();

        for delta in extra {
            let prefix = (block.prefix_length() + delta).min(28);
            match allocator.allocate(prefix) {
                Ok(subnet) => subnets.push(subnet),
                // Exhaustion is allowed; everything handed out before must still be valid
                Err(_) => break,
            }
        }

        prop_assert!(validate_subnet_layout(block, &subnets).is_ok());
        for subnet in &subnets {
            prop_assert!(block.contains(subnet));
        }
    }

    #[test]
    fn shorter_prefix_than_block_is_rejected(block in vpc_block(), shorter in 1u8..8) {
        let mut allocator = SubnetAllocator::new(block);
        let prefix = block.prefix_length().saturating_sub(shorter);
        prop_assert!(allocator.allocate(prefix).is_err());
    }

    #[test]
    fn same_size_allocations_tile_the_block(prefix in 16u8..=24) {
        let block = Ipv4Cidr::new("10.1.0.0/16").unwrap();
        let mut allocator = SubnetAllocator::new(block);
        let count = 1u64 << (prefix - 16);

        for _ in 0..count {
            prop_assert!(allocator.allocate(prefix).is_ok());
        }
        prop_assert!(allocator.allocate(prefix).is_err());
    }
}
