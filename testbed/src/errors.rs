// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{Network, Port};
use config::ConfigError;
use id::Id;
use ipam::IpamError;
use resources::ResourceError;
use sfc::SfcError;
use thiserror::Error;
use tracectl::TraceCtlError;

#[derive(Error, Debug)]
pub enum TestbedError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid tracing configuration: {0}")]
    Tracing(#[from] TraceCtlError),
    #[error(transparent)]
    Ipam(#[from] IpamError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Sfc(#[from] SfcError),
    #[error("No such network: {0}")]
    NoSuchNetwork(Id<Network>),
    #[error("No such port: {0}")]
    NoSuchPort(Id<Port>),
    #[error("No such compute instance: {0}")]
    NoSuchCompute(String),
    #[error("Compute instance {0} already exists")]
    ComputeExists(String),
}
