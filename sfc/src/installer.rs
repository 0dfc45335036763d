// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Installation of port chains into the flow backend

use crate::{
    ChainRequest, ComputeInstance, ComputeInventory, Cookie, FlowBackend, FlowCommand, PortChain,
    PortPair, PortRef, SfcError,
};
use concurrency::lock;
use concurrency::sync::Mutex;
use id::Id;
use std::collections::HashMap;
use strum::Display;
use tracing::{debug, info, warn};

/// Priority of chain flows unless configured otherwise.
pub const DEFAULT_PRIORITY: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Defined,
    Installed,
    Updated,
    Uninstalled,
}

/// One hop of an installed chain: from an interface of one instance to an interface of another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowSegment {
    pub src_vnf: String,
    pub dst_vnf: String,
    pub src_intf: String,
    pub dst_intf: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Ingress,
    Egress,
}

/// A port pair left out of a chain because one of its ports is not connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPair {
    pub port_pair: String,
    pub side: Side,
    pub port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Segments installed, in chain order.
    pub segments: Vec<FlowSegment>,
    pub skipped: Vec<SkippedPair>,
    /// Match strings of the flow classifiers of the chain.
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub added: Vec<FlowSegment>,
    pub removed: Vec<FlowSegment>,
    pub skipped: Vec<SkippedPair>,
}

/// What the installer knows about a chain it has programmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledChain {
    pub cookie: Cookie,
    /// Segments believed to be installed in the backend.
    pub segments: Vec<FlowSegment>,
    pub state: ChainState,
}

fn owner<'a>(instances: &'a [ComputeInstance], port: &PortRef) -> Option<&'a ComputeInstance> {
    instances.iter().find(|i| i.port_names.contains(&port.name))
}

fn resolve_pair(
    instances: &[ComputeInstance],
    pair: &PortPair,
) -> Result<FlowSegment, SkippedPair> {
    let skip = |side, port: &PortRef| SkippedPair {
        port_pair: pair.name.clone(),
        side,
        port: port.name.clone(),
    };
    let (Some(src), Some(src_intf)) = (owner(instances, &pair.ingress), &pair.ingress.intf_name)
    else {
        return Err(skip(Side::Ingress, &pair.ingress));
    };
    let (Some(dst), Some(dst_intf)) = (owner(instances, &pair.egress), &pair.egress.intf_name)
    else {
        return Err(skip(Side::Egress, &pair.egress));
    };
    Ok(FlowSegment {
        src_vnf: src.name.clone(),
        dst_vnf: dst.name.clone(),
        src_intf: src_intf.clone(),
        dst_intf: dst_intf.clone(),
    })
}

/// Resolve the segments of `chain` against the current instances, in chain order.
fn resolve<I: ComputeInventory + ?Sized>(
    chain: &PortChain,
    inventory: &I,
) -> (Vec<FlowSegment>, Vec<SkippedPair>) {
    let instances = inventory.instances();
    let mut segments: Vec<FlowSegment> = Vec::new();
    let mut skipped = Vec::new();
    for pair in chain.port_pairs() {
        match resolve_pair(&instances, pair) {
            Ok(segment) => {
                if !segments.contains(&segment) {
                    segments.push(segment);
                }
            }
            Err(skip) => {
                warn!(
                    "SFC: {} port {} of port pair {} in chain {} is not connected, skipping",
                    skip.side, skip.port, skip.port_pair, chain.name
                );
                skipped.push(skip);
            }
        }
    }
    (segments, skipped)
}

/// Programs port chains into a [`FlowBackend`] and remembers what it programmed.
///
/// Backend calls are made while holding the lock of the installer's own chain table, which
/// serializes operations on chains but never blocks the other tables of the testbed.
pub struct ChainInstaller<B> {
    backend: B,
    priority: u16,
    bidirectional: bool,
    chains: Mutex<HashMap<Id<PortChain>, InstalledChain>>,
}

impl<B> std::fmt::Debug for ChainInstaller<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainInstaller")
            .field("priority", &self.priority)
            .field("bidirectional", &self.bidirectional)
            .finish_non_exhaustive()
    }
}

impl<B: FlowBackend> ChainInstaller<B> {
    /// An installer issuing unidirectional flows with priority [`DEFAULT_PRIORITY`].
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, DEFAULT_PRIORITY, false)
    }

    #[must_use]
    pub fn with_options(backend: B, priority: u16, bidirectional: bool) -> Self {
        Self {
            backend,
            priority,
            bidirectional,
            chains: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn request(&self, segment: &FlowSegment, command: FlowCommand, cookie: Cookie) -> ChainRequest {
        ChainRequest {
            src_vnf: segment.src_vnf.clone(),
            dst_vnf: segment.dst_vnf.clone(),
            src_intf: segment.src_intf.clone(),
            dst_intf: segment.dst_intf.clone(),
            command,
            cookie,
            priority: self.priority,
            bidirectional: self.bidirectional,
        }
    }

    fn send(
        &self,
        chain: &PortChain,
        segment: &FlowSegment,
        command: FlowCommand,
        cookie: Cookie,
    ) -> Result<(), SfcError> {
        self.backend
            .set_chain(&self.request(segment, command, cookie))
            .map_err(|source| {
                warn!(
                    "SFC: {command} {}:{} -> {}:{} for chain {} failed: {source}",
                    segment.src_vnf, segment.src_intf, segment.dst_vnf, segment.dst_intf, chain.name
                );
                SfcError::Backend {
                    chain: chain.name.clone(),
                    source,
                }
            })
    }

    /// Install the flows of `chain`.
    ///
    /// Port pairs with a port not connected to any instance of `inventory` are skipped. Installing
    /// a chain again re-applies its flows.
    ///
    /// # Errors
    ///
    /// Returns [`SfcError::Backend`] if the backend fails. The segments installed before the
    /// failure are kept track of, and removed by [`ChainInstaller::uninstall`].
    pub fn install<I: ComputeInventory + ?Sized>(
        &self,
        chain: &PortChain,
        inventory: &I,
    ) -> Result<InstallReport, SfcError> {
        let matches: Vec<String> = chain
            .flow_classifiers
            .iter()
            .map(|classifier| {
                let flow_match = classifier.to_match();
                debug!(
                    "SFC: classifier {} of chain {}: {flow_match}",
                    classifier.name, chain.name
                );
                flow_match
            })
            .collect();
        let (segments, skipped) = resolve(chain, inventory);

        let mut chains = lock(&self.chains);
        let entry = chains.entry(chain.id).or_insert_with(|| InstalledChain {
            cookie: chain.cookie,
            segments: Vec::new(),
            state: ChainState::Defined,
        });
        let cookie = entry.cookie;
        let mut installed = Vec::with_capacity(segments.len());
        let mut result = Ok(());
        for segment in segments {
            if let Err(e) = self.send(chain, &segment, FlowCommand::AddFlow, cookie) {
                result = Err(e);
                break;
            }
            installed.push(segment);
        }
        for segment in &installed {
            if !entry.segments.contains(segment) {
                entry.segments.push(segment.clone());
            }
        }
        entry.state = ChainState::Installed;
        result?;
        info!(
            "SFC: installed chain {} ({} segments, {} skipped, cookie {cookie})",
            chain.name,
            installed.len(),
            skipped.len()
        );
        Ok(InstallReport {
            segments: installed,
            skipped,
            matches,
        })
    }

    /// Remove all the flows of `chain`.
    ///
    /// The segments removed are the ones this installer installed, or, for a chain it does not
    /// know about, the ones resolved from `inventory`. Uninstalling an uninstalled chain does
    /// nothing. Returns the segments removed.
    ///
    /// # Errors
    ///
    /// Returns [`SfcError::Backend`] if the backend fails. The segments not removed yet are kept
    /// track of, so that uninstalling again resumes where it stopped.
    pub fn uninstall<I: ComputeInventory + ?Sized>(
        &self,
        chain: &PortChain,
        inventory: &I,
    ) -> Result<Vec<FlowSegment>, SfcError> {
        let mut chains = lock(&self.chains);
        let (cookie, segments) = match chains.get(&chain.id) {
            Some(known) if known.state == ChainState::Uninstalled => {
                debug!("SFC: chain {} already uninstalled", chain.name);
                return Ok(Vec::new());
            }
            Some(known) => (known.cookie, known.segments.clone()),
            None => (chain.cookie, resolve(chain, inventory).0),
        };
        let entry = chains.entry(chain.id).or_insert_with(|| InstalledChain {
            cookie,
            segments: segments.clone(),
            state: ChainState::Installed,
        });
        for (done, segment) in segments.iter().enumerate() {
            if let Err(e) = self.send(chain, segment, FlowCommand::DelFlows, cookie) {
                entry.segments = segments[done..].to_vec();
                return Err(e);
            }
        }
        entry.segments.clear();
        entry.state = ChainState::Uninstalled;
        info!(
            "SFC: uninstalled chain {} ({} segments, cookie {cookie})",
            chain.name,
            segments.len()
        );
        Ok(segments)
    }

    /// Bring the flows of an installed chain in line with its new definition `chain`, keeping its
    /// cookie: segments no longer in the chain are removed, new ones are added.
    ///
    /// # Errors
    ///
    /// Returns [`SfcError::NotInstalled`] if the chain is not installed, or [`SfcError::Backend`]
    /// if the backend fails. In the latter case the segments recorded are the ones actually left
    /// installed.
    pub fn update<I: ComputeInventory + ?Sized>(
        &self,
        chain: &PortChain,
        inventory: &I,
    ) -> Result<UpdateReport, SfcError> {
        let (wanted, skipped) = resolve(chain, inventory);
        let mut chains = lock(&self.chains);
        let entry = match chains.get_mut(&chain.id) {
            Some(entry) if matches!(entry.state, ChainState::Installed | ChainState::Updated) => {
                entry
            }
            _ => return Err(SfcError::NotInstalled(chain.name.clone())),
        };
        if entry.cookie != chain.cookie {
            debug!(
                "SFC: chain {} keeps cookie {} over {}",
                chain.name, entry.cookie, chain.cookie
            );
        }
        let cookie = entry.cookie;
        let removed: Vec<FlowSegment> = entry
            .segments
            .iter()
            .filter(|s| !wanted.contains(s))
            .cloned()
            .collect();
        let added: Vec<FlowSegment> = wanted
            .iter()
            .filter(|s| !entry.segments.contains(s))
            .cloned()
            .collect();

        for segment in &removed {
            self.send(chain, segment, FlowCommand::DelFlows, cookie)?;
            entry.segments.retain(|s| s != segment);
        }
        for segment in &added {
            self.send(chain, segment, FlowCommand::AddFlow, cookie)?;
            entry.segments.push(segment.clone());
        }
        entry.segments = wanted;
        entry.state = ChainState::Updated;
        info!(
            "SFC: updated chain {}: {} segments added, {} removed",
            chain.name,
            added.len(),
            removed.len()
        );
        Ok(UpdateReport {
            added,
            removed,
            skipped,
        })
    }

    #[must_use]
    pub fn state(&self, chain: Id<PortChain>) -> Option<ChainState> {
        lock(&self.chains).get(&chain).map(|c| c.state)
    }

    #[must_use]
    pub fn installed(&self, chain: Id<PortChain>) -> Option<InstalledChain> {
        lock(&self.chains).get(&chain).cloned()
    }

    /// Stop tracking a chain, once it is uninstalled and deleted.
    pub fn forget(&self, chain: Id<PortChain>) -> Option<InstalledChain> {
        lock(&self.chains).remove(&chain)
    }
}
