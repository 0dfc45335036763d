// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resource models and the cloud datacenter model

use crate::units::{MilliUnits, valid_units};
use crate::{FlavorTable, ResourceError, ResourceModelRegistry};
use concurrency::lock;
use concurrency::sync::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, OnceLock, Weak};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

/// Smallest memory limit given to a container.
pub const MIN_MEMORY_MIB: f64 = 4.0;
/// Smallest CFS quota the kernel accepts.
pub const MIN_CFS_QUOTA_US: u64 = 1000;

const MIB: f64 = 1024.0 * 1024.0;

/// A resource limit, or the absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Limit<T> {
    Bounded(T),
    Unconstrained,
}

impl<T> Limit<T> {
    pub fn bounded(self) -> Option<T> {
        match self {
            Limit::Bounded(value) => Some(value),
            Limit::Unconstrained => None,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Limit::Unconstrained)
    }
}

/// CFS bandwidth control settings, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CfsQuota {
    pub period_us: u64,
    pub quota_us: u64,
}

/// The limits to apply to an instance admitted by a resource model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Allocation {
    /// Fraction of the host CPU time.
    pub cpu_share: Limit<f64>,
    /// Memory limit, in bytes.
    pub memory_bytes: Limit<u64>,
    /// Disk limit, in bytes.
    pub disk_bytes: Limit<u64>,
}

impl Allocation {
    pub const UNCONSTRAINED: Allocation = Allocation {
        cpu_share: Limit::Unconstrained,
        memory_bytes: Limit::Unconstrained,
        disk_bytes: Limit::Unconstrained,
    };

    /// The CFS quota enforcing the CPU share over `period_us`, if the CPU is limited.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn cfs_quota(&self, period_us: u64) -> Option<CfsQuota> {
        let share = self.cpu_share.bounded()?;
        let quota_us = ((period_us as f64) * share) as u64;
        Some(CfsQuota {
            period_us,
            quota_us: quota_us.max(MIN_CFS_QUOTA_US),
        })
    }
}

/// How a [`CloudDcModel`] turns flavors into limits and when it refuses instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Policy {
    /// Compute admission only. Memory and disk are not limited.
    Simple,
    /// Compute and memory admission, with a memory limit proportional to the memory units.
    MemoryBounded,
    /// Never refuses compute units, but shrinks the share of every compute unit once the
    /// datacenter is overcommitted. Memory as [`Policy::MemoryBounded`].
    Overprovisioning,
    /// Bookkeeping only.
    Dummy,
}

/// A pluggable admission policy for one datacenter.
pub trait ResourceModel: Send + Sync + Debug {
    /// Bind the model to `dc`, managed by `registry`. Called by
    /// [`ResourceModelRegistry::register`].
    ///
    /// # Errors
    ///
    /// Fails if the model is already bound to a datacenter.
    fn attach(&self, registry: Weak<ResourceModelRegistry>, dc: &str) -> Result<(), ResourceError>;

    /// Reserve the units of `flavor` for `instance`, or refuse to.
    ///
    /// # Errors
    ///
    /// Fails if the datacenter has not enough units left, if the flavor is unknown, if the
    /// instance is already accounted for or if the model is not registered. State is left
    /// untouched on failure.
    fn allocate(&self, instance: &str, flavor: &str) -> Result<Allocation, ResourceError>;

    /// Release the units reserved for `instance`. Returns false if it had none.
    fn free(&self, instance: &str) -> bool;

    fn snapshot(&self) -> ModelSnapshot;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub flavor: String,
    pub compute: f64,
    pub memory: f64,
}

/// State of a resource model, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSnapshot {
    pub datacenter: Option<String>,
    pub policy: Policy,
    pub max_cu: f64,
    pub max_mu: f64,
    pub allocated_cu: f64,
    pub allocated_mu: f64,
    pub cpu_op_factor: f64,
    pub instances: BTreeMap<String, InstanceSnapshot>,
}

#[derive(Debug)]
struct Binding {
    registry: Weak<ResourceModelRegistry>,
    dc: String,
}

#[derive(Debug, Default)]
struct DcState {
    allocated_cu: MilliUnits,
    allocated_mu: MilliUnits,
    cpu_op_factor: f64,
    instances: BTreeMap<String, InstanceSnapshot>,
}

/// A datacenter with a fixed budget of compute and memory units.
#[derive(Debug)]
pub struct CloudDcModel {
    policy: Policy,
    max_cu: MilliUnits,
    max_mu: MilliUnits,
    flavors: FlavorTable,
    binding: OnceLock<Binding>,
    state: Mutex<DcState>,
}

impl CloudDcModel {
    /// A model with the default flavors.
    ///
    /// # Errors
    ///
    /// See [`CloudDcModel::with_flavors`].
    pub fn new(policy: Policy, max_cu: f64, max_mu: f64) -> Result<Self, ResourceError> {
        Self::with_flavors(policy, max_cu, max_mu, FlavorTable::default())
    }

    /// A model admitting instances of `flavors`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidCapacity`] if `max_cu` or `max_mu` is not a finite
    /// count of at least a thousandth of a unit.
    pub fn with_flavors(
        policy: Policy,
        max_cu: f64,
        max_mu: f64,
        flavors: FlavorTable,
    ) -> Result<Self, ResourceError> {
        let max_cu = capacity("compute", max_cu)?;
        let max_mu = capacity("memory", max_mu)?;
        info!(
            "Resource model {policy} created: max_cu={}, max_mu={}",
            max_cu.as_units(),
            max_mu.as_units()
        );
        Ok(Self {
            policy,
            max_cu,
            max_mu,
            flavors,
            binding: OnceLock::new(),
            state: Mutex::new(DcState {
                cpu_op_factor: 1.0,
                ..DcState::default()
            }),
        })
    }

    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    #[must_use]
    pub fn flavors(&self) -> &FlavorTable {
        &self.flavors
    }

    fn dc_name(&self) -> String {
        self.binding
            .get()
            .map_or_else(|| "<unbound>".to_string(), |b| b.dc.clone())
    }

    fn registry(&self) -> Result<(Arc<ResourceModelRegistry>, &str), ResourceError> {
        let binding = self.binding.get().ok_or(ResourceError::NotRegistered)?;
        let registry = binding
            .registry
            .upgrade()
            .ok_or(ResourceError::NotRegistered)?;
        Ok((registry, &binding.dc))
    }

    /// Memory limit of `units` memory units, in bytes.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn memory_limit(&self, registry: &ResourceModelRegistry, units: f64) -> u64 {
        let mib = (registry.emulation_max_mem_mib() / self.max_mu.as_units() * units)
            .max(MIN_MEMORY_MIB);
        (mib * MIB) as u64
    }

    /// Share multiplier once more compute units are allocated than the datacenter has.
    fn op_factor(&self, allocated_cu: MilliUnits) -> f64 {
        self.max_cu.as_units() / self.max_cu.max(allocated_cu).as_units()
    }
}

fn capacity(metric: &str, value: f64) -> Result<MilliUnits, ResourceError> {
    let units = MilliUnits::from_units(value);
    if !valid_units(value) || units.is_zero() {
        return Err(ResourceError::InvalidCapacity {
            metric: metric.to_string(),
            value,
        });
    }
    Ok(units)
}

impl ResourceModel for CloudDcModel {
    fn attach(&self, registry: Weak<ResourceModelRegistry>, dc: &str) -> Result<(), ResourceError> {
        self.binding
            .set(Binding {
                registry,
                dc: dc.to_string(),
            })
            .map_err(|_| ResourceError::AlreadyAttached(self.dc_name()))
    }

    fn allocate(&self, instance: &str, flavor: &str) -> Result<Allocation, ResourceError> {
        let (registry, dc) = self.registry()?;
        let flavor = self
            .flavors
            .get(flavor)
            .ok_or_else(|| ResourceError::UnknownFlavor(flavor.to_string()))?;
        let mut state = lock(&self.state);
        if state.instances.contains_key(instance) {
            warn!("Instance {instance} already has resources in {dc}");
            return Err(ResourceError::InstanceExists {
                dc: dc.to_string(),
                instance: instance.to_string(),
            });
        }

        let (check_cu, check_mu) = match self.policy {
            Policy::Simple => (true, false),
            Policy::MemoryBounded => (true, true),
            Policy::Overprovisioning => (false, true),
            Policy::Dummy => (false, false),
        };
        let compute = MilliUnits::from_units(flavor.compute);
        let memory = MilliUnits::from_units(flavor.memory);
        let allocated_cu = state.allocated_cu.saturating_add(compute);
        let allocated_mu = state.allocated_mu.saturating_add(memory);
        if check_cu && allocated_cu > self.max_cu {
            let available = self.max_cu.saturating_sub(state.allocated_cu).as_units();
            warn!(
                "Refusing {instance} ({}) in {dc}: {} compute units requested, {available} available",
                flavor.name, flavor.compute
            );
            return Err(ResourceError::NotEnoughCompute {
                dc: dc.to_string(),
                requested: flavor.compute,
                available,
            });
        }
        if check_mu && allocated_mu > self.max_mu {
            let available = self.max_mu.saturating_sub(state.allocated_mu).as_units();
            warn!(
                "Refusing {instance} ({}) in {dc}: {} memory units requested, {available} available",
                flavor.name, flavor.memory
            );
            return Err(ResourceError::NotEnoughMemory {
                dc: dc.to_string(),
                requested: flavor.memory,
                available,
            });
        }

        state.allocated_cu = allocated_cu;
        state.allocated_mu = allocated_mu;
        state.instances.insert(
            instance.to_string(),
            InstanceSnapshot {
                flavor: flavor.name.clone(),
                compute: flavor.compute,
                memory: flavor.memory,
            },
        );

        let single_cu = registry.emulation_max_cpu() / self.max_cu.as_units();
        let allocation = match self.policy {
            Policy::Dummy => Allocation::UNCONSTRAINED,
            Policy::Simple => Allocation {
                cpu_share: Limit::Bounded(single_cu * flavor.compute),
                ..Allocation::UNCONSTRAINED
            },
            Policy::MemoryBounded => Allocation {
                cpu_share: Limit::Bounded(single_cu * flavor.compute),
                memory_bytes: Limit::Bounded(self.memory_limit(&registry, flavor.memory)),
                disk_bytes: Limit::Unconstrained,
            },
            Policy::Overprovisioning => {
                state.cpu_op_factor = self.op_factor(state.allocated_cu);
                if state.cpu_op_factor < 1.0 {
                    warn!(
                        "{dc} is overprovisioned: {} of {} compute units allocated, scaling shares by {:.3}",
                        state.allocated_cu.as_units(),
                        self.max_cu.as_units(),
                        state.cpu_op_factor
                    );
                }
                Allocation {
                    cpu_share: Limit::Bounded(single_cu * state.cpu_op_factor * flavor.compute),
                    memory_bytes: Limit::Bounded(self.memory_limit(&registry, flavor.memory)),
                    disk_bytes: Limit::Unconstrained,
                }
            }
        };
        debug!(
            "Allocated {} for {instance} in {dc}: {allocation:?} (cu {}/{}, mu {}/{})",
            flavor.name,
            state.allocated_cu.as_units(),
            self.max_cu.as_units(),
            state.allocated_mu.as_units(),
            self.max_mu.as_units()
        );
        Ok(allocation)
    }

    fn free(&self, instance: &str) -> bool {
        let mut state = lock(&self.state);
        let Some(record) = state.instances.remove(instance) else {
            warn!("Cannot free {instance} in {}: no resources allocated", self.dc_name());
            return false;
        };
        state.allocated_cu = state
            .allocated_cu
            .saturating_sub(MilliUnits::from_units(record.compute));
        state.allocated_mu = state
            .allocated_mu
            .saturating_sub(MilliUnits::from_units(record.memory));
        if self.policy == Policy::Overprovisioning {
            state.cpu_op_factor = self.op_factor(state.allocated_cu);
        }
        debug!(
            "Freed {} of {instance} in {}: cu {}/{}",
            record.flavor,
            self.dc_name(),
            state.allocated_cu.as_units(),
            self.max_cu.as_units()
        );
        true
    }

    fn snapshot(&self) -> ModelSnapshot {
        let state = lock(&self.state);
        ModelSnapshot {
            datacenter: self.binding.get().map(|b| b.dc.clone()),
            policy: self.policy,
            max_cu: self.max_cu.as_units(),
            max_mu: self.max_mu.as_units(),
            allocated_cu: state.allocated_cu.as_units(),
            allocated_mu: state.allocated_mu.as_units(),
            cpu_op_factor: state.cpu_op_factor,
            instances: state.instances.clone(),
        }
    }
}

#[cfg(all(test, not(feature = "shuttle")))]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::Flavor;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;
    use tracing_test::traced_test;

    fn registered(
        policy: Policy,
        max_cu: f64,
        max_mu: f64,
    ) -> (Arc<ResourceModelRegistry>, Arc<CloudDcModel>) {
        let registry = ResourceModelRegistry::new(1.0, 512.0);
        let model = Arc::new(CloudDcModel::new(policy, max_cu, max_mu).unwrap());
        registry.register("dc1", model.clone()).unwrap();
        (registry, model)
    }

    #[test]
    fn cpu_share_is_proportional_to_units() {
        let (_registry, model) = registered(Policy::Simple, 100.0, 1024.0);
        let flavors = [
            ("tiny", 1.0),
            ("small", 4.0),
            ("medium", 8.0),
            ("large", 16.0),
            ("xlarge", 32.0),
        ];
        for (i, (flavor, units)) in flavors.into_iter().enumerate() {
            let allocation = model.allocate(&format!("vnf{i}"), flavor).unwrap();
            assert_eq!(allocation.cpu_share, Limit::Bounded(1.0 / 100.0 * units));
            assert!(allocation.memory_bytes.is_unconstrained());
            assert!(allocation.disk_bytes.is_unconstrained());
        }
        assert_eq!(model.snapshot().allocated_cu, 61.0);
        model.allocate("vnf5", "xlarge").unwrap();
        assert_eq!(
            model.allocate("vnf6", "xlarge"),
            Err(ResourceError::NotEnoughCompute {
                dc: "dc1".to_string(),
                requested: 32.0,
                available: 7.0
            })
        );
        let snapshot = model.snapshot();
        assert_eq!(snapshot.allocated_cu, 93.0);
        assert!(!snapshot.instances.contains_key("vnf6"));
    }

    #[test]
    fn free_restores_totals() {
        let (_registry, model) = registered(Policy::MemoryBounded, 32.0, 1024.0);
        model.allocate("a", "small").unwrap();
        let before = model.snapshot();
        model.allocate("b", "large").unwrap();
        assert!(model.free("b"));
        assert_eq!(model.snapshot(), before);
        assert!(!model.free("b"));
        assert!(!model.free("unknown"));
        assert_eq!(model.snapshot(), before);
    }

    fn fractional(policy: Policy, max_cu: f64) -> (Arc<ResourceModelRegistry>, Arc<CloudDcModel>) {
        let mut flavors = FlavorTable::empty();
        flavors.add(Flavor::new("a", 0.1, 0.1, 0.0)).unwrap();
        flavors.add(Flavor::new("b", 0.2, 0.2, 0.0)).unwrap();
        let registry = ResourceModelRegistry::new(1.0, 512.0);
        let model = Arc::new(CloudDcModel::with_flavors(policy, max_cu, 1.0, flavors).unwrap());
        registry.register("dc1", model.clone()).unwrap();
        (registry, model)
    }

    #[test]
    fn fractional_units_free_exactly() {
        let (_registry, model) = fractional(Policy::MemoryBounded, 1.0);
        model.allocate("vnf1", "a").unwrap();
        let before = model.snapshot();
        model.allocate("vnf2", "b").unwrap();
        assert!(model.free("vnf2"));
        assert_eq!(model.snapshot(), before);
        assert_eq!(model.snapshot().allocated_cu, 0.1);
        assert_eq!(model.snapshot().allocated_mu, 0.1);
    }

    #[test]
    fn fractional_units_fill_capacity_exactly() {
        let (_registry, model) = fractional(Policy::Simple, 0.3);
        model.allocate("vnf1", "a").unwrap();
        model.allocate("vnf2", "b").unwrap();
        assert_eq!(model.snapshot().allocated_cu, 0.3);
        assert_eq!(
            model.allocate("vnf3", "a"),
            Err(ResourceError::NotEnoughCompute {
                dc: "dc1".to_string(),
                requested: 0.1,
                available: 0.0
            })
        );
        assert!(model.free("vnf1"));
        model.allocate("vnf3", "a").unwrap();
    }

    #[test]
    fn invalid_capacity_is_rejected() {
        let cases = [
            (0.0, 1024.0, "compute"),
            (-4.0, 1024.0, "compute"),
            (f64::NAN, 1024.0, "compute"),
            (32.0, f64::INFINITY, "memory"),
            (32.0, 0.0001, "memory"),
        ];
        for (max_cu, max_mu, bad) in cases {
            assert!(matches!(
                CloudDcModel::new(Policy::Simple, max_cu, max_mu),
                Err(ResourceError::InvalidCapacity { metric, .. }) if metric == bad
            ));
        }
        assert!(CloudDcModel::new(Policy::Simple, 0.5, 1.0).is_ok());
    }

    #[test]
    fn duplicate_instance_is_refused() {
        let (_registry, model) = registered(Policy::Simple, 32.0, 1024.0);
        model.allocate("a", "tiny").unwrap();
        assert_eq!(
            model.allocate("a", "small"),
            Err(ResourceError::InstanceExists {
                dc: "dc1".to_string(),
                instance: "a".to_string()
            })
        );
        assert_eq!(model.snapshot().allocated_cu, 1.0);
    }

    #[test]
    fn unknown_flavor() {
        let (_registry, model) = registered(Policy::Simple, 32.0, 1024.0);
        assert_eq!(
            model.allocate("a", "huge"),
            Err(ResourceError::UnknownFlavor("huge".to_string()))
        );
    }

    #[test]
    fn unregistered_model_refuses() {
        let model = CloudDcModel::new(Policy::Simple, 32.0, 1024.0).unwrap();
        assert_eq!(model.allocate("a", "tiny"), Err(ResourceError::NotRegistered));

        let registry = ResourceModelRegistry::new(1.0, 512.0);
        let model = Arc::new(CloudDcModel::new(Policy::Simple, 32.0, 1024.0).unwrap());
        registry.register("dc1", model.clone()).unwrap();
        drop(registry);
        assert_eq!(model.allocate("a", "tiny"), Err(ResourceError::NotRegistered));
    }

    #[test]
    fn memory_bounded_limits() {
        let (_registry, model) = registered(Policy::MemoryBounded, 64.0, 1024.0);
        // 512 MiB for 1024 units: half a MiB per unit
        let small = model.allocate("a", "small").unwrap();
        assert_eq!(small.memory_bytes, Limit::Bounded(64 * 1024 * 1024));
        let tiny = model.allocate("b", "tiny").unwrap();
        assert_eq!(tiny.memory_bytes, Limit::Bounded(16 * 1024 * 1024));
        model.allocate("c", "large").unwrap();
        model.allocate("d", "medium").unwrap();
        assert_eq!(
            model.allocate("e", "small"),
            Err(ResourceError::NotEnoughMemory {
                dc: "dc1".to_string(),
                requested: 128.0,
                available: 96.0
            })
        );
        assert_eq!(model.snapshot().allocated_mu, 928.0);
    }

    #[test]
    fn memory_floor() {
        let registry = ResourceModelRegistry::new(1.0, 64.0);
        let model = Arc::new(CloudDcModel::new(Policy::MemoryBounded, 32.0, 1024.0).unwrap());
        registry.register("dc1", model.clone()).unwrap();
        let tiny = model.allocate("a", "tiny").unwrap();
        assert_eq!(tiny.memory_bytes, Limit::Bounded(4 * 1024 * 1024));
    }

    #[traced_test]
    #[test]
    fn overprovisioning_scales_shares() {
        let (_registry, model) = registered(Policy::Overprovisioning, 32.0, 4096.0);
        let first = model.allocate("a", "xlarge").unwrap();
        assert_eq!(first.cpu_share, Limit::Bounded(1.0));
        let second = model.allocate("b", "xlarge").unwrap();
        assert_eq!(second.cpu_share, Limit::Bounded(0.5));
        assert_eq!(model.snapshot().cpu_op_factor, 0.5);
        assert!(logs_contain("overprovisioned"));
        assert!(model.free("b"));
        assert_eq!(model.snapshot().cpu_op_factor, 1.0);
    }

    #[test]
    fn dummy_only_accounts() {
        let (_registry, model) = registered(Policy::Dummy, 1.0, 1.0);
        assert_eq!(model.allocate("a", "xlarge"), Ok(Allocation::UNCONSTRAINED));
        assert_eq!(model.snapshot().allocated_cu, 32.0);
    }

    #[test]
    fn cfs_quota() {
        let allocation = Allocation {
            cpu_share: Limit::Bounded(0.25),
            ..Allocation::UNCONSTRAINED
        };
        assert_eq!(
            allocation.cfs_quota(100_000),
            Some(CfsQuota {
                period_us: 100_000,
                quota_us: 25_000
            })
        );
        let tiny = Allocation {
            cpu_share: Limit::Bounded(0.001),
            ..Allocation::UNCONSTRAINED
        };
        assert_eq!(tiny.cfs_quota(100_000).map(|q| q.quota_us), Some(MIN_CFS_QUOTA_US));
        assert_eq!(Allocation::UNCONSTRAINED.cfs_quota(100_000), None);
    }

    #[test]
    fn policy_names() {
        assert_eq!(Policy::MemoryBounded.to_string(), "memory-bounded");
        assert_eq!(Policy::from_str("overprovisioning"), Ok(Policy::Overprovisioning));
    }

    #[test]
    fn snapshot_serializes() {
        let (_registry, model) = registered(Policy::Simple, 32.0, 1024.0);
        model.allocate("vnf1", "tiny").unwrap();
        let yaml = serde_yaml_ng::to_string(&model.snapshot()).unwrap();
        assert!(yaml.contains("datacenter: dc1"));
        assert!(yaml.contains("policy: simple"));
        assert!(yaml.contains("flavor: tiny"));
    }
}
