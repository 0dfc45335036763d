// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the resource models

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Not enough compute units in {dc}: requested {requested}, available {available}")]
    NotEnoughCompute {
        dc: String,
        requested: f64,
        available: f64,
    },
    #[error("Not enough memory units in {dc}: requested {requested}, available {available}")]
    NotEnoughMemory {
        dc: String,
        requested: f64,
        available: f64,
    },
    #[error("Invalid {metric} of flavor '{flavor}': {value} units")]
    InvalidFlavor {
        flavor: String,
        metric: String,
        value: f64,
    },
    #[error("Invalid datacenter capacity: {value} {metric} units")]
    InvalidCapacity { metric: String, value: f64 },
    #[error("Unknown flavor '{0}'")]
    UnknownFlavor(String),
    #[error("Flavor '{0}' already exists")]
    FlavorExists(String),
    #[error("Instance '{instance}' already has resources allocated in {dc}")]
    InstanceExists { dc: String, instance: String },
    #[error("Resource model is not registered for any datacenter")]
    NotRegistered,
    #[error("Resource model is already attached to datacenter {0}")]
    AlreadyAttached(String),
    #[error("Datacenter {0} already has a resource model")]
    DatacenterExists(String),
    #[error("No resource model for datacenter {0}")]
    UnknownDatacenter(String),
}
