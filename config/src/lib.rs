// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration of the testbed core: the address pool networks are given subnets from, the
//! datacenters and their resource models, the flavors instances can ask for, and the defaults of
//! service function chains. Configurations are read from YAML and validated as a whole before use.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

pub mod display;
pub mod errors;
pub mod testbed;

pub use errors::{ConfigError, ConfigResult}; // re-export
pub use testbed::{
    DatacenterConfig, DatacenterConfigBuilder, FlavorConfig, IpamConfig, ModelKind,
    ResourcesConfig, SfcConfig, TestbedConfig,
}; // re-export

use tracectl::trace_target;
trace_target!("config", LevelFilter::INFO, &["config"]);
