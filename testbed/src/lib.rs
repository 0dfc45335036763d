// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The resource and network-identity core of the emulated NFV testbed.
//!
//! A [`Testbed`] owns the subnet allocator, the interface name registry, the resource models of
//! the datacenters and the chain installer, built from a [`TestbedConfig`]. The provisioning
//! front-ends (OpenStack-like APIs, the CLI) drive it: networks get subnets, ports get interface
//! names, compute instances are admitted by the resource model of their datacenter, and port
//! chains are programmed into the flow backend.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

mod errors;
mod objects;
mod testbed;

pub use config::TestbedConfig;
pub use errors::TestbedError;
pub use objects::{ComputeRecord, Network, Port};
pub use testbed::Testbed;

use tracectl::trace_target;
trace_target!("testbed", LevelFilter::INFO, &["testbed"]);
