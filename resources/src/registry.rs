// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The registry binding resource models to datacenters

use crate::{Allocation, ModelSnapshot, ResourceError, ResourceModel};
use concurrency::sync::RwLock;
use concurrency::{read, write};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Binds one [`ResourceModel`] to each datacenter and holds the emulation-wide limits the
/// models share.
#[derive(Debug)]
pub struct ResourceModelRegistry {
    /// Fraction of the host CPU time available to all emulated datacenters.
    emulation_max_cpu: f64,
    /// Memory available to all emulated datacenters, in MiB.
    emulation_max_mem_mib: f64,
    models: RwLock<BTreeMap<String, Arc<dyn ResourceModel>>>,
}

impl ResourceModelRegistry {
    #[must_use]
    pub fn new(emulation_max_cpu: f64, emulation_max_mem_mib: f64) -> Arc<Self> {
        info!(
            "Resource model registry created: emulation_max_cpu={emulation_max_cpu}, emulation_max_mem={emulation_max_mem_mib} MiB"
        );
        Arc::new(Self {
            emulation_max_cpu,
            emulation_max_mem_mib,
            models: RwLock::new(BTreeMap::new()),
        })
    }

    #[must_use]
    pub fn emulation_max_cpu(&self) -> f64 {
        self.emulation_max_cpu
    }

    #[must_use]
    pub fn emulation_max_mem_mib(&self) -> f64 {
        self.emulation_max_mem_mib
    }

    /// Bind `model` to datacenter `dc`.
    ///
    /// # Errors
    ///
    /// Fails if `dc` already has a model, or if `model` is bound to another datacenter.
    pub fn register(
        self: &Arc<Self>,
        dc: &str,
        model: Arc<dyn ResourceModel>,
    ) -> Result<(), ResourceError> {
        let mut models = write(&self.models);
        if models.contains_key(dc) {
            warn!("Datacenter {dc} already has a resource model");
            return Err(ResourceError::DatacenterExists(dc.to_string()));
        }
        model.attach(Arc::downgrade(self), dc)?;
        info!("Registered resource model {model:?} for datacenter {dc}");
        models.insert(dc.to_string(), model);
        Ok(())
    }

    #[must_use]
    pub fn model(&self, dc: &str) -> Option<Arc<dyn ResourceModel>> {
        read(&self.models).get(dc).cloned()
    }

    #[must_use]
    pub fn all_models(&self) -> Vec<(String, Arc<dyn ResourceModel>)> {
        read(&self.models)
            .iter()
            .map(|(dc, model)| (dc.clone(), model.clone()))
            .collect()
    }

    #[must_use]
    pub fn num_datacenters_managed(&self) -> usize {
        read(&self.models).len()
    }

    /// Allocate `flavor` for `instance` in datacenter `dc`.
    ///
    /// # Errors
    ///
    /// Fails if `dc` has no model, or if its model refuses the instance.
    pub fn allocate(
        &self,
        dc: &str,
        instance: &str,
        flavor: &str,
    ) -> Result<Allocation, ResourceError> {
        let model = self
            .model(dc)
            .ok_or_else(|| ResourceError::UnknownDatacenter(dc.to_string()))?;
        model.allocate(instance, flavor)
    }

    /// Free the resources of `instance` in datacenter `dc`. Returns false if there were none.
    pub fn free(&self, dc: &str, instance: &str) -> bool {
        match self.model(dc) {
            Some(model) => model.free(instance),
            None => {
                warn!("Cannot free {instance}: no resource model for datacenter {dc}");
                false
            }
        }
    }

    /// Snapshots of every model, by datacenter.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ModelSnapshot> {
        self.all_models()
            .into_iter()
            .map(|(dc, model)| (dc, model.snapshot()))
            .collect()
    }
}

#[cfg(all(test, not(feature = "shuttle")))]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{CloudDcModel, Policy};

    #[test]
    fn register_binds_model() {
        let registry = ResourceModelRegistry::new(1.0, 512.0);
        registry
            .register("dc1", Arc::new(CloudDcModel::new(Policy::Simple, 32.0, 1024.0).unwrap()))
            .unwrap();
        registry
            .register("dc2", Arc::new(CloudDcModel::new(Policy::Dummy, 32.0, 1024.0).unwrap()))
            .unwrap();
        assert_eq!(registry.num_datacenters_managed(), 2);
        let dcs: Vec<_> = registry.all_models().into_iter().map(|(dc, _)| dc).collect();
        assert_eq!(dcs, vec!["dc1", "dc2"]);
        assert_eq!(
            registry.model("dc2").unwrap().snapshot().datacenter.as_deref(),
            Some("dc2")
        );
    }

    #[test]
    fn datacenter_takes_one_model() {
        let registry = ResourceModelRegistry::new(1.0, 512.0);
        let model = Arc::new(CloudDcModel::new(Policy::Simple, 32.0, 1024.0).unwrap());
        registry.register("dc1", model.clone()).unwrap();
        assert_eq!(
            registry.register(
                "dc1",
                Arc::new(CloudDcModel::new(Policy::Simple, 1.0, 1.0).unwrap())
            ),
            Err(ResourceError::DatacenterExists("dc1".to_string()))
        );
        assert_eq!(
            registry.register("dc2", model),
            Err(ResourceError::AlreadyAttached("dc1".to_string()))
        );
        assert_eq!(registry.num_datacenters_managed(), 1);
    }

    #[test]
    fn allocate_by_datacenter() {
        let registry = ResourceModelRegistry::new(0.5, 512.0);
        registry
            .register("dc1", Arc::new(CloudDcModel::new(Policy::Simple, 10.0, 1024.0).unwrap()))
            .unwrap();
        let allocation = registry.allocate("dc1", "vnf1", "small").unwrap();
        assert_eq!(allocation.cpu_share.bounded(), Some(0.5 / 10.0 * 4.0));
        assert_eq!(
            registry.allocate("dc9", "vnf1", "small"),
            Err(ResourceError::UnknownDatacenter("dc9".to_string()))
        );
        assert!(!registry.free("dc9", "vnf1"));
        assert!(registry.free("dc1", "vnf1"));
        assert_eq!(registry.snapshot()["dc1"].allocated_cu, 0.0);
    }
}
