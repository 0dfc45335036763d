// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Short, unique names for the virtual interfaces backing the ports of the testbed.
//!
//! Port names are free-form (`"vnf1:eth0:input"`, `"my-firewall-port"`), but the kernel limits
//! interface names to 15 bytes. The [`InterfaceNameRegistry`] derives a short base name from the
//! port name, appends a counter to make it unique and keeps track of which port holds which name.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod registry;

pub use registry::{InterfaceNameRegistry, MAX_COUNTER, MAX_IFNAME_LEN, PortNames, base_name};

use thiserror::Error;
use tracectl::trace_target;
trace_target!("ifname", LevelFilter::INFO, &["network"]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IfNameError {
    #[error("Could not find a free interface name for port '{port}': {base}-0 to {base}-999 are all taken")]
    TooManyCollisions { port: String, base: String },
}
