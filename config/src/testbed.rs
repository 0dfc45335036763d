// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The testbed configuration model

use crate::{ConfigError, ConfigResult};
use derive_builder::Builder;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::Path;
use strum::Display;
use tracing::{debug, info};

const DEFAULT_POOL: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8);

fn default_pool() -> Ipv4Net {
    DEFAULT_POOL
}
fn default_subnet_prefix_len() -> u8 {
    24
}
fn default_max_cpu() -> f64 {
    1.0
}
fn default_max_mem_mib() -> f64 {
    512.0
}
fn default_max_cu() -> f64 {
    32.0
}
fn default_max_mu() -> f64 {
    1024.0
}
fn default_priority() -> u16 {
    10
}

/// Subnet allocation for virtual networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpamConfig {
    #[serde(default = "default_pool")]
    pub pool: Ipv4Net,
    #[serde(default = "default_subnet_prefix_len")]
    pub subnet_prefix_len: u8,
}

impl Default for IpamConfig {
    fn default() -> Self {
        Self {
            pool: default_pool(),
            subnet_prefix_len: default_subnet_prefix_len(),
        }
    }
}

/// Resource model of a datacenter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ModelKind {
    #[default]
    Simple,
    MemoryBounded,
    Overprovisioning,
    Dummy,
}

#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(error = "ConfigError"))]
#[serde(deny_unknown_fields)]
pub struct DatacenterConfig {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    #[serde(default)]
    pub model: ModelKind,
    /// Compute units available in the datacenter.
    #[builder(default = default_max_cu())]
    #[serde(default = "default_max_cu")]
    pub max_cu: f64,
    /// Memory units available in the datacenter.
    #[builder(default = default_max_mu())]
    #[serde(default = "default_max_mu")]
    pub max_mu: f64,
}

/// A flavor added to the default ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlavorConfig {
    pub name: String,
    pub compute: f64,
    pub memory: f64,
    #[serde(default)]
    pub disk: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Fraction of the host CPU time shared by all datacenters.
    #[serde(default = "default_max_cpu")]
    pub emulation_max_cpu: f64,
    /// Memory shared by all datacenters, in MiB.
    #[serde(default = "default_max_mem_mib")]
    pub emulation_max_mem_mib: f64,
    #[serde(default)]
    pub flavors: Vec<FlavorConfig>,
    #[serde(default)]
    pub datacenters: Vec<DatacenterConfig>,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            emulation_max_cpu: default_max_cpu(),
            emulation_max_mem_mib: default_max_mem_mib(),
            flavors: Vec::new(),
            datacenters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SfcConfig {
    /// Priority of the flows of port chains.
    #[serde(default = "default_priority")]
    pub priority: u16,
    /// Whether port chains also steer the reverse direction.
    #[serde(default)]
    pub bidirectional: bool,
}

impl Default for SfcConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            bidirectional: false,
        }
    }
}

/// The configuration of the whole testbed core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestbedConfig {
    #[serde(default)]
    pub ipam: IpamConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub sfc: SfcConfig,
    /// Tracing levels, e.g. `default=info,sfc=debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<String>,
}

fn check_positive(field: &str, value: f64) -> ConfigResult {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        })
    }
}

fn check_non_negative(field: &str, value: f64) -> ConfigResult {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        })
    }
}

impl IpamConfig {
    pub fn validate(&self) -> ConfigResult {
        if self.subnet_prefix_len < self.pool.prefix_len() || self.subnet_prefix_len > 32 {
            return Err(ConfigError::InvalidPrefixLen {
                prefix_len: self.subnet_prefix_len,
                pool: self.pool,
            });
        }
        Ok(())
    }
}

impl DatacenterConfig {
    pub fn validate(&self) -> ConfigResult {
        if self.name.is_empty() {
            return Err(ConfigError::MissingParameter("datacenter name".to_string()));
        }
        check_positive(&format!("{}.max_cu", self.name), self.max_cu)?;
        check_positive(&format!("{}.max_mu", self.name), self.max_mu)
    }
}

impl FlavorConfig {
    pub fn validate(&self) -> ConfigResult {
        if self.name.is_empty() {
            return Err(ConfigError::MissingParameter("flavor name".to_string()));
        }
        check_non_negative(&format!("{}.compute", self.name), self.compute)?;
        check_non_negative(&format!("{}.memory", self.name), self.memory)?;
        check_non_negative(&format!("{}.disk", self.name), self.disk)?;
        for (metric, value) in &self.extra {
            check_non_negative(&format!("{}.{metric}", self.name), *value)?;
        }
        Ok(())
    }
}

impl ResourcesConfig {
    pub fn validate(&self) -> ConfigResult {
        check_positive("emulation_max_cpu", self.emulation_max_cpu)?;
        if self.emulation_max_cpu > 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "emulation_max_cpu".to_string(),
                value: self.emulation_max_cpu,
            });
        }
        check_positive("emulation_max_mem_mib", self.emulation_max_mem_mib)?;

        let mut names = BTreeSet::new();
        for flavor in &self.flavors {
            flavor.validate()?;
            if !names.insert(flavor.name.as_str()) {
                return Err(ConfigError::DuplicateFlavor(flavor.name.clone()));
            }
        }
        let mut names = BTreeSet::new();
        for dc in &self.datacenters {
            dc.validate()?;
            if !names.insert(dc.name.as_str()) {
                return Err(ConfigError::DuplicateDatacenter(dc.name.clone()));
            }
        }
        Ok(())
    }
}

impl TestbedConfig {
    pub fn validate(&self) -> ConfigResult {
        self.ipam.validate()?;
        self.resources.validate()?;
        debug!("Configuration is valid");
        Ok(())
    }

    /// Parse and validate a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: TestbedConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_yaml(&yaml)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_config_is_default() {
        let config = TestbedConfig::from_yaml("{}").unwrap();
        assert_eq!(config, TestbedConfig::default());
        assert_eq!(config.ipam.pool.to_string(), "10.0.0.0/8");
        assert_eq!(config.ipam.subnet_prefix_len, 24);
        assert_eq!(config.sfc.priority, 10);
        assert!(!config.sfc.bidirectional);
    }

    #[test]
    fn full_config() {
        let yaml = r"
ipam:
  pool: 172.16.0.0/12
  subnet_prefix_len: 26
resources:
  emulation_max_cpu: 0.5
  emulation_max_mem_mib: 2048
  flavors:
    - name: gpu
      compute: 8
      memory: 256
      extra:
        gpu: 1
  datacenters:
    - name: dc1
      model: memory-bounded
      max_cu: 64
    - name: dc2
sfc:
  bidirectional: true
tracing: default=info,sfc=debug
";
        let config = TestbedConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.ipam.subnet_prefix_len, 26);
        assert_eq!(config.resources.flavors[0].extra.get("gpu"), Some(&1.0));
        assert_eq!(
            config.resources.datacenters,
            vec![
                DatacenterConfigBuilder::default()
                    .name("dc1")
                    .model(ModelKind::MemoryBounded)
                    .max_cu(64.0)
                    .build()
                    .unwrap(),
                DatacenterConfigBuilder::default().name("dc2").build().unwrap(),
            ]
        );
        assert!(config.sfc.bidirectional);
        assert_eq!(config.tracing.as_deref(), Some("default=info,sfc=debug"));
        let again = TestbedConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            TestbedConfig::from_yaml("ipam:\n  cidr: 10.0.0.0/8\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            TestbedConfig::from_yaml("resources:\n  datacenters:\n    - name: dc1\n      model: fancy\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn bad_prefix_len() {
        assert_eq!(
            TestbedConfig::from_yaml("ipam:\n  pool: 10.0.0.0/16\n  subnet_prefix_len: 8\n"),
            Err(ConfigError::InvalidPrefixLen {
                prefix_len: 8,
                pool: "10.0.0.0/16".parse().unwrap()
            })
        );
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut config = TestbedConfig::default();
        let dc = DatacenterConfigBuilder::default().name("dc1").build().unwrap();
        config.resources.datacenters = vec![dc.clone(), dc];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateDatacenter("dc1".to_string()))
        );

        let mut config = TestbedConfig::default();
        let flavor = FlavorConfig {
            name: "gpu".to_string(),
            compute: 8.0,
            memory: 256.0,
            disk: 0.0,
            extra: BTreeMap::new(),
        };
        config.resources.flavors = vec![flavor.clone(), flavor];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateFlavor("gpu".to_string()))
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = TestbedConfig::default();
        config.resources.datacenters = vec![
            DatacenterConfigBuilder::default()
                .name("dc1")
                .max_cu(0.0)
                .build()
                .unwrap(),
        ];
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "dc1.max_cu".to_string(),
                value: 0.0
            })
        );

        let mut config = TestbedConfig::default();
        config.resources.emulation_max_cpu = 1.5;
        assert!(config.validate().is_err());
        config.resources.emulation_max_cpu = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_requires_name() {
        assert_eq!(
            DatacenterConfigBuilder::default().build(),
            Err(ConfigError::MissingParameter("name".to_string()))
        );
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            TestbedConfig::load(Path::new("/nonexistent/testbed.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
