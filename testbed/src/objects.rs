// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Objects managed by the testbed

use id::Id;
use ipnet::Ipv4Net;
use resources::Allocation;
use sfc::PortRef;

/// A virtual network and its subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: Id<Network>,
    pub name: String,
    pub cidr: Ipv4Net,
}

/// A port, and the interface backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub id: Id<Port>,
    pub name: String,
    /// `None` if no unique interface name could be derived from the port name.
    pub intf_name: Option<String>,
    pub network: Option<Id<Network>>,
}

impl Port {
    /// Reference to this port, to build port pairs with.
    #[must_use]
    pub fn as_port_ref(&self) -> PortRef {
        PortRef {
            name: self.name.clone(),
            intf_name: self.intf_name.clone(),
        }
    }

    /// Short human-readable id, as shown by the OpenStack-like APIs.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.id.short()
    }
}

/// A running compute instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeRecord {
    pub name: String,
    pub datacenter: String,
    pub flavor: String,
    pub ports: Vec<Id<Port>>,
    pub allocation: Allocation,
}
