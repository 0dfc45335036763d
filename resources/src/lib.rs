// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Admission control for the compute instances of the emulated datacenters.
//!
//! Each datacenter is bound to a [`ResourceModel`] in the [`ResourceModelRegistry`]. Instances
//! ask for a [`Flavor`], expressed in dimensionless compute and memory units, and the model either
//! rejects the request or turns it into concrete limits (a CPU share, a memory limit) for the
//! container running the instance.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

mod errors;
mod flavor;
mod model;
mod registry;
mod units;

pub use errors::ResourceError;
pub use flavor::{Flavor, FlavorTable};
pub use model::{
    Allocation, CfsQuota, CloudDcModel, InstanceSnapshot, Limit, MIN_CFS_QUOTA_US, MIN_MEMORY_MIB,
    ModelSnapshot, Policy, ResourceModel,
};
pub use registry::ResourceModelRegistry;
pub use units::MAX_UNITS;

use tracectl::trace_target;
trace_target!("resources", LevelFilter::INFO, &["resources"]);
