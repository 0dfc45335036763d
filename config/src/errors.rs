// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type for configuration / validation failures

use ipnet::Ipv4Net;
use thiserror::Error;

/// The reasons why we may reject a configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("Could not parse config: {0}")]
    Parse(String),
    #[error("Subnet prefix length /{prefix_len} does not fit in pool {pool}")]
    InvalidPrefixLen { prefix_len: u8, pool: Ipv4Net },
    #[error("A datacenter with name '{0}' already exists")]
    DuplicateDatacenter(String),
    #[error("A flavor with name '{0}' already exists")]
    DuplicateFlavor(String),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: f64 },
    #[error("Missing mandatory parameter: {0}")]
    MissingParameter(String),
}

pub type ConfigResult = Result<(), ConfigError>;

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        ConfigError::MissingParameter(e.field_name().to_string())
    }
}
