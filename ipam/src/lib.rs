// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Subnet allocation for the virtual networks of the testbed.
//!
//! Every virtual network gets its own fixed-size IPv4 block (a /24 by default) carved out of a
//! single address pool (10.0.0.0/8 by default). The [`SubnetAllocator`] hands out blocks in
//! increasing address order, lets owners give them back, and reuses freed low addresses first.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod allocator;
mod errors;

pub use allocator::{DEFAULT_POOL, DEFAULT_PREFIX_LEN, Reservation, SubnetAllocator};
pub use errors::IpamError;

use tracectl::trace_target;
trace_target!("ipam", LevelFilter::INFO, &["network"]);
