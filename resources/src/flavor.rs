// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resource flavors

use crate::ResourceError;
use crate::units::valid_units;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// A named bundle of resource units an instance can ask for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flavor {
    pub name: String,
    /// Compute units.
    pub compute: f64,
    /// Memory units.
    pub memory: f64,
    /// Disk units.
    pub disk: f64,
    /// Any other metric, not used for admission.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl Flavor {
    #[must_use]
    pub fn new(name: &str, compute: f64, memory: f64, disk: f64) -> Self {
        Self {
            name: name.to_string(),
            compute,
            memory,
            disk,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metric(mut self, metric: &str, value: f64) -> Self {
        self.extra.insert(metric.to_string(), value);
        self
    }

    /// Check that every unit count is finite, non-negative and at most [`MAX_UNITS`].
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidFlavor`] naming the first offending metric.
    ///
    /// [`MAX_UNITS`]: crate::MAX_UNITS
    pub fn validate(&self) -> Result<(), ResourceError> {
        let metrics = [
            ("compute", self.compute),
            ("memory", self.memory),
            ("disk", self.disk),
        ];
        let extra = self.extra.iter().map(|(k, v)| (k.as_str(), *v));
        match metrics.into_iter().chain(extra).find(|(_, v)| !valid_units(*v)) {
            Some((metric, value)) => Err(ResourceError::InvalidFlavor {
                flavor: self.name.clone(),
                metric: metric.to_string(),
                value,
            }),
            None => Ok(()),
        }
    }
}

/// The flavors known to a resource model, by name.
#[derive(Debug, Clone, PartialEq)]
pub struct FlavorTable(BTreeMap<String, Flavor>);

impl Default for FlavorTable {
    /// The OpenStack-like default flavors: `tiny`, `small`, `medium`, `large` and `xlarge`.
    fn default() -> Self {
        let flavors = [
            Flavor::new("tiny", 1.0, 32.0, 1.0),
            Flavor::new("small", 4.0, 128.0, 20.0),
            Flavor::new("medium", 8.0, 256.0, 40.0),
            Flavor::new("large", 16.0, 512.0, 80.0),
            Flavor::new("xlarge", 32.0, 1024.0, 160.0),
        ];
        Self(flavors.into_iter().map(|f| (f.name.clone(), f)).collect())
    }
}

impl FlavorTable {
    /// A table with no flavor at all.
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Add a flavor.
    ///
    /// # Errors
    ///
    /// Fails if a flavor with the same name exists, or if one of its unit counts is invalid.
    pub fn add(&mut self, flavor: Flavor) -> Result<(), ResourceError> {
        flavor.validate()?;
        if self.0.contains_key(&flavor.name) {
            return Err(ResourceError::FlavorExists(flavor.name));
        }
        debug!("Adding flavor {}: {flavor:?}", flavor.name);
        self.0.insert(flavor.name.clone(), flavor);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Flavor> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flavor> {
        self.0.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
