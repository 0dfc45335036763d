// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::collections::BTreeSet;

/// A running compute instance and the ports plugged into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeInstance {
    pub name: String,
    pub port_names: BTreeSet<String>,
}

impl ComputeInstance {
    #[must_use]
    pub fn new<'a>(name: &str, port_names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            name: name.to_string(),
            port_names: port_names.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Source of the compute instances that port chains are resolved against.
pub trait ComputeInventory {
    /// The instances running now.
    fn instances(&self) -> Vec<ComputeInstance>;
}

impl ComputeInventory for [ComputeInstance] {
    fn instances(&self) -> Vec<ComputeInstance> {
        self.to_vec()
    }
}

impl ComputeInventory for Vec<ComputeInstance> {
    fn instances(&self) -> Vec<ComputeInstance> {
        self.clone()
    }
}
