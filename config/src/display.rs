// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display of configuration objects

use crate::{DatacenterConfig, FlavorConfig, TestbedConfig};
use std::fmt::Display;

const SEP: &str = "    ";

impl Display for DatacenterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{SEP}{:<12} model: {:<16} max_cu: {:<8} max_mu: {}",
            self.name, self.model, self.max_cu, self.max_mu
        )
    }
}

impl Display for FlavorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{SEP}{:<12} compute: {:<6} memory: {:<6} disk: {}",
            self.name, self.compute, self.memory, self.disk
        )?;
        for (metric, value) in &self.extra {
            write!(f, " {metric}: {value}")?;
        }
        Ok(())
    }
}

impl Display for TestbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Testbed config")?;
        writeln!(
            f,
            "  subnets   : /{} from {}",
            self.ipam.subnet_prefix_len, self.ipam.pool
        )?;
        writeln!(
            f,
            "  emulation : cpu {} memory {} MiB",
            self.resources.emulation_max_cpu, self.resources.emulation_max_mem_mib
        )?;
        writeln!(
            f,
            "  chains    : priority {}{}",
            self.sfc.priority,
            if self.sfc.bidirectional {
                ", bidirectional"
            } else {
                ""
            }
        )?;
        if let Some(tracing) = &self.tracing {
            writeln!(f, "  tracing   : {tracing}")?;
        }
        if !self.resources.flavors.is_empty() {
            writeln!(f, "  flavors:")?;
            for flavor in &self.resources.flavors {
                writeln!(f, "{flavor}")?;
            }
        }
        writeln!(f, "  datacenters:")?;
        for dc in &self.resources.datacenters {
            writeln!(f, "{dc}")?;
        }
        Ok(())
    }
}
