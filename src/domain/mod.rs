// Copyright (c) 2025 - Cowboy AI, Inc.
//! Platform Domain Models
//!
//! Value objects shared by every stack module. Each one validates its
//! invariants on construction, so the modules that consume them never deal
//! with malformed CIDR blocks or environment names.
//!
//! # Value Objects with Invariants
//!
//! - [`Environment`] - Stack name concatenated into every resource name
//! - [`Ipv4Cidr`] - Canonical IPv4 CIDR block
//! - [`SubnetAllocator`] - Non-overlapping subnet carve-out
//! - [`Tags`] - Deterministically ordered resource tags
//! - [`BackendService`] - Services exposed through the load balancers

pub mod cidr;
pub mod environment;
pub mod service;
pub mod tags;

pub use cidr::{Ipv4Cidr, NetworkError, SubnetAllocator};
pub use environment::{Environment, EnvironmentError};
pub use service::{BackendService, Exposure, TargetProtocol};
pub use tags::Tags;
