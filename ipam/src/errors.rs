// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the subnet allocator

use ipnet::Ipv4Net;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpamError {
    #[error("Subnet prefix length /{prefix_len} does not fit in pool {pool}")]
    InvalidPrefixLen { prefix_len: u8, pool: Ipv4Net },
    #[error("Address pool {pool} exhausted: {issued} of {capacity} subnets issued")]
    Exhausted {
        pool: Ipv4Net,
        issued: usize,
        capacity: u64,
    },
}
