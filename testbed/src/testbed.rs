// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{ComputeRecord, Network, Port, TestbedError};
use concurrency::sync::RwLock;
use concurrency::{read, write};
use config::{ModelKind, TestbedConfig};
use id::Id;
use ifname::InterfaceNameRegistry;
use ipam::SubnetAllocator;
use resources::{Allocation, CloudDcModel, Flavor, FlavorTable, Policy, ResourceModelRegistry};
use sfc::{
    ChainInstaller, ComputeInstance, ComputeInventory, FlowBackend, InstallReport, PortChain,
    PortRef, UpdateReport,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn policy(kind: ModelKind) -> Policy {
    match kind {
        ModelKind::Simple => Policy::Simple,
        ModelKind::MemoryBounded => Policy::MemoryBounded,
        ModelKind::Overprovisioning => Policy::Overprovisioning,
        ModelKind::Dummy => Policy::Dummy,
    }
}

fn flavor_table(config: &TestbedConfig) -> Result<FlavorTable, TestbedError> {
    let mut flavors = FlavorTable::default();
    for f in &config.resources.flavors {
        let flavor = f
            .extra
            .iter()
            .fold(Flavor::new(&f.name, f.compute, f.memory, f.disk), |flavor, (k, v)| {
                flavor.with_metric(k, *v)
            });
        flavors.add(flavor)?;
    }
    Ok(flavors)
}

/// The core of the emulated testbed.
///
/// Each table has its own lock and no operation holds two of them while calling into the
/// flow backend: port chains are resolved against a snapshot of the compute instances.
pub struct Testbed<B> {
    subnets: SubnetAllocator<Id<Network>>,
    ifnames: InterfaceNameRegistry<Id<Port>>,
    resources: Arc<ResourceModelRegistry>,
    chains: ChainInstaller<B>,
    networks: RwLock<HashMap<Id<Network>, Network>>,
    ports: RwLock<HashMap<Id<Port>, Port>>,
    computes: RwLock<BTreeMap<String, ComputeRecord>>,
}

impl<B> std::fmt::Debug for Testbed<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Testbed")
            .field("subnets", &self.subnets)
            .field("resources", &self.resources)
            .field("chains", &self.chains)
            .finish_non_exhaustive()
    }
}

impl<B: FlowBackend> Testbed<B> {
    /// Build a testbed from `config`, programming port chains through `backend`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, if its tracing string can't be parsed, or if a
    /// configured flavor or datacenter is defined twice.
    pub fn new(config: &TestbedConfig, backend: B) -> Result<Self, TestbedError> {
        config.validate()?;
        if let Some(tracing) = &config.tracing {
            tracectl::get_trace_ctl().setup_from_string(tracing)?;
        }

        let subnets = SubnetAllocator::new(config.ipam.pool, config.ipam.subnet_prefix_len)?;
        let flavors = flavor_table(config)?;
        let resources = ResourceModelRegistry::new(
            config.resources.emulation_max_cpu,
            config.resources.emulation_max_mem_mib,
        );
        for dc in &config.resources.datacenters {
            let model = CloudDcModel::with_flavors(
                policy(dc.model),
                dc.max_cu,
                dc.max_mu,
                flavors.clone(),
            )?;
            resources.register(&dc.name, Arc::new(model))?;
        }
        let chains =
            ChainInstaller::with_options(backend, config.sfc.priority, config.sfc.bidirectional);

        info!(
            "Testbed ready: {} /{} subnets in {}, {} datacenter(s), {} flavor(s)",
            subnets.capacity(),
            subnets.prefix_len(),
            subnets.pool(),
            resources.num_datacenters_managed(),
            flavors.len()
        );
        Ok(Self {
            subnets,
            ifnames: InterfaceNameRegistry::new(),
            resources,
            chains,
            networks: RwLock::new(HashMap::new()),
            ports: RwLock::new(HashMap::new()),
            computes: RwLock::new(BTreeMap::new()),
        })
    }

    #[must_use]
    pub fn subnets(&self) -> &SubnetAllocator<Id<Network>> {
        &self.subnets
    }

    #[must_use]
    pub fn ifnames(&self) -> &InterfaceNameRegistry<Id<Port>> {
        &self.ifnames
    }

    #[must_use]
    pub fn resources(&self) -> &Arc<ResourceModelRegistry> {
        &self.resources
    }

    #[must_use]
    pub fn chains(&self) -> &ChainInstaller<B> {
        &self.chains
    }

    //////////////////////////////////////////////////////////////////
    // Networks
    //////////////////////////////////////////////////////////////////

    /// Create a network with the next free subnet.
    ///
    /// # Errors
    ///
    /// Fails if the subnet pool is exhausted.
    pub fn create_network(&self, name: &str) -> Result<Network, TestbedError> {
        let id = Id::new();
        let cidr = self.subnets.try_allocate(id)?;
        let network = Network {
            id,
            name: name.to_string(),
            cidr,
        };
        write(&self.networks).insert(id, network.clone());
        info!("Created network {name} ({id}) with subnet {cidr}");
        Ok(network)
    }

    /// Delete a network, returning its subnet to the pool.
    ///
    /// # Errors
    ///
    /// Fails if there is no such network.
    pub fn delete_network(&self, id: Id<Network>) -> Result<Network, TestbedError> {
        let network = write(&self.networks)
            .remove(&id)
            .ok_or(TestbedError::NoSuchNetwork(id))?;
        if !self.subnets.free(network.cidr, &id) {
            error!("Subnet {} of network {} was not issued to it", network.cidr, network.name);
        }
        info!("Deleted network {} ({id})", network.name);
        Ok(network)
    }

    #[must_use]
    pub fn network(&self, id: Id<Network>) -> Option<Network> {
        read(&self.networks).get(&id).cloned()
    }

    #[must_use]
    pub fn networks(&self) -> Vec<Network> {
        let mut networks: Vec<_> = read(&self.networks).values().cloned().collect();
        networks.sort_by_key(|n| n.cidr);
        networks
    }

    //////////////////////////////////////////////////////////////////
    // Ports
    //////////////////////////////////////////////////////////////////

    /// Create a port and name its interface.
    ///
    /// A port whose interface can't be named is still created, without an interface name: it
    /// can't be chained until renamed.
    ///
    /// # Errors
    ///
    /// Fails if `network` is given but does not exist.
    pub fn create_port(
        &self,
        name: &str,
        network: Option<Id<Network>>,
    ) -> Result<Port, TestbedError> {
        if let Some(net) = network
            && !read(&self.networks).contains_key(&net)
        {
            return Err(TestbedError::NoSuchNetwork(net));
        }
        let id = Id::new();
        let intf_name = self
            .ifnames
            .claim(id, name)
            .inspect_err(|e| error!("Port {name} created without an interface: {e}"))
            .ok();
        let port = Port {
            id,
            name: name.to_string(),
            intf_name,
            network,
        };
        write(&self.ports).insert(id, port.clone());
        debug!(
            "Created port {name} ({}) with interface {:?}",
            port.short_id(),
            port.intf_name
        );
        Ok(port)
    }

    /// Rename a port. Its interface name is derived again from the new name.
    ///
    /// # Errors
    ///
    /// Fails if there is no such port.
    pub fn rename_port(&self, id: Id<Port>, name: &str) -> Result<Port, TestbedError> {
        let mut ports = write(&self.ports);
        let port = ports.get_mut(&id).ok_or(TestbedError::NoSuchPort(id))?;
        port.intf_name = self
            .ifnames
            .rename(&id, name)
            .inspect_err(|e| error!("Port {name} left without an interface: {e}"))
            .ok();
        port.name = name.to_string();
        Ok(port.clone())
    }

    /// Delete a port, releasing its interface name.
    ///
    /// # Errors
    ///
    /// Fails if there is no such port.
    pub fn delete_port(&self, id: Id<Port>) -> Result<Port, TestbedError> {
        let port = write(&self.ports)
            .remove(&id)
            .ok_or(TestbedError::NoSuchPort(id))?;
        if let Some(intf) = self.ifnames.release(&id) {
            debug!("Released interface {intf} of port {}", port.name);
        }
        Ok(port)
    }

    #[must_use]
    pub fn port(&self, id: Id<Port>) -> Option<Port> {
        read(&self.ports).get(&id).cloned()
    }

    /// Reference to port `id`, to use in port pairs.
    ///
    /// # Errors
    ///
    /// Fails if there is no such port.
    pub fn port_ref(&self, id: Id<Port>) -> Result<PortRef, TestbedError> {
        read(&self.ports)
            .get(&id)
            .map(Port::as_port_ref)
            .ok_or(TestbedError::NoSuchPort(id))
    }

    //////////////////////////////////////////////////////////////////
    // Compute
    //////////////////////////////////////////////////////////////////

    /// Start compute instance `name` with `flavor` in datacenter `dc`, plugged into `ports`.
    ///
    /// # Errors
    ///
    /// Fails if an instance with this name runs already, if a port does not exist, or if the
    /// resource model of `dc` refuses the instance. Nothing is recorded on failure.
    pub fn start_compute(
        &self,
        dc: &str,
        name: &str,
        flavor: &str,
        ports: &[Id<Port>],
    ) -> Result<Allocation, TestbedError> {
        let mut computes = write(&self.computes);
        if computes.contains_key(name) {
            return Err(TestbedError::ComputeExists(name.to_string()));
        }
        {
            let known = read(&self.ports);
            if let Some(missing) = ports.iter().find(|p| !known.contains_key(*p)) {
                return Err(TestbedError::NoSuchPort(*missing));
            }
        }
        let allocation = self.resources.allocate(dc, name, flavor)?;
        computes.insert(
            name.to_string(),
            ComputeRecord {
                name: name.to_string(),
                datacenter: dc.to_string(),
                flavor: flavor.to_string(),
                ports: ports.to_vec(),
                allocation,
            },
        );
        info!("Started compute {name} ({flavor}) in {dc}");
        Ok(allocation)
    }

    /// Stop compute instance `name`, releasing its resources.
    ///
    /// # Errors
    ///
    /// Fails if there is no such instance.
    pub fn stop_compute(&self, name: &str) -> Result<ComputeRecord, TestbedError> {
        let record = write(&self.computes)
            .remove(name)
            .ok_or_else(|| TestbedError::NoSuchCompute(name.to_string()))?;
        if !self.resources.free(&record.datacenter, name) {
            warn!("Compute {name} had no resources in {}", record.datacenter);
        }
        info!("Stopped compute {name} in {}", record.datacenter);
        Ok(record)
    }

    #[must_use]
    pub fn compute(&self, name: &str) -> Option<ComputeRecord> {
        read(&self.computes).get(name).cloned()
    }

    //////////////////////////////////////////////////////////////////
    // Port chains
    //////////////////////////////////////////////////////////////////

    /// Install `chain` against the instances running now.
    ///
    /// # Errors
    ///
    /// Fails if the flow backend fails.
    pub fn install_chain(&self, chain: &PortChain) -> Result<InstallReport, TestbedError> {
        let instances = self.instances();
        Ok(self.chains.install(chain, &instances)?)
    }

    /// Update installed `chain` to its new definition.
    ///
    /// # Errors
    ///
    /// Fails if the chain is not installed or if the flow backend fails.
    pub fn update_chain(&self, chain: &PortChain) -> Result<UpdateReport, TestbedError> {
        let instances = self.instances();
        Ok(self.chains.update(chain, &instances)?)
    }

    /// Remove the flows of `chain`. Returns the number of segments removed.
    ///
    /// # Errors
    ///
    /// Fails if the flow backend fails.
    pub fn uninstall_chain(&self, chain: &PortChain) -> Result<usize, TestbedError> {
        let instances = self.instances();
        Ok(self.chains.uninstall(chain, &instances)?.len())
    }
}

impl<B> ComputeInventory for Testbed<B> {
    fn instances(&self) -> Vec<ComputeInstance> {
        let computes = read(&self.computes);
        let ports = read(&self.ports);
        computes
            .values()
            .map(|record| ComputeInstance {
                name: record.name.clone(),
                port_names: record
                    .ports
                    .iter()
                    .filter_map(|id| ports.get(id).map(|p| p.name.clone()))
                    .collect(),
            })
            .collect()
    }
}
