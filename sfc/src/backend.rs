// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The flow backend programming the switches of the emulated network

use crate::Cookie;
use concurrency::lock;
use concurrency::sync::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum FlowCommand {
    #[strum(serialize = "add-flow")]
    AddFlow,
    #[strum(serialize = "del-flows")]
    DelFlows,
}

/// A request to install or remove the flows steering traffic from one VNF interface to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRequest {
    pub src_vnf: String,
    pub dst_vnf: String,
    pub src_intf: String,
    pub dst_intf: String,
    pub command: FlowCommand,
    pub cookie: Cookie,
    pub priority: u16,
    /// Also steer the reverse direction.
    pub bidirectional: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Flow backend unreachable: {0}")]
    Unreachable(String),
    #[error("Flow backend rejected {command} {src}->{dst}: {reason}")]
    Rejected {
        command: FlowCommand,
        src: String,
        dst: String,
        reason: String,
    },
}

/// Installs and removes chain flows, e.g. through the REST API of an SDN controller.
pub trait FlowBackend: Send + Sync {
    /// Apply `request`. Removing flows that do not exist is not an error.
    ///
    /// # Errors
    ///
    /// Fails if the backend could not apply the request.
    fn set_chain(&self, request: &ChainRequest) -> Result<(), BackendError>;
}

impl<B: FlowBackend + ?Sized> FlowBackend for Arc<B> {
    fn set_chain(&self, request: &ChainRequest) -> Result<(), BackendError> {
        (**self).set_chain(request)
    }
}

impl<B: FlowBackend + ?Sized> FlowBackend for &B {
    fn set_chain(&self, request: &ChainRequest) -> Result<(), BackendError> {
        (**self).set_chain(request)
    }
}

/// A flow installed in a [`MemoryFlowBackend`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlowEntry {
    pub src_vnf: String,
    pub src_intf: String,
    pub dst_vnf: String,
    pub dst_intf: String,
    pub priority: u16,
}

#[derive(Debug, Default)]
struct MemoryState {
    flows: BTreeMap<Cookie, BTreeSet<FlowEntry>>,
    requests: Vec<ChainRequest>,
    unreachable: bool,
}

/// A [`FlowBackend`] that keeps flows in memory, for running without a controller.
#[derive(Debug, Default)]
pub struct MemoryFlowBackend {
    state: Mutex<MemoryState>,
}

impl MemoryFlowBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following request fail (or succeed again), as if the controller went away.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    /// Flows currently installed with `cookie`.
    #[must_use]
    pub fn flows(&self, cookie: Cookie) -> Vec<FlowEntry> {
        lock(&self.state)
            .flows
            .get(&cookie)
            .map(|flows| flows.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of flows installed, all cookies together.
    #[must_use]
    pub fn flow_count(&self) -> usize {
        lock(&self.state).flows.values().map(BTreeSet::len).sum()
    }

    /// Every request applied so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ChainRequest> {
        lock(&self.state).requests.clone()
    }
}

fn entries(request: &ChainRequest) -> Vec<FlowEntry> {
    let forward = FlowEntry {
        src_vnf: request.src_vnf.clone(),
        src_intf: request.src_intf.clone(),
        dst_vnf: request.dst_vnf.clone(),
        dst_intf: request.dst_intf.clone(),
        priority: request.priority,
    };
    if !request.bidirectional {
        return vec![forward];
    }
    let reverse = FlowEntry {
        src_vnf: forward.dst_vnf.clone(),
        src_intf: forward.dst_intf.clone(),
        dst_vnf: forward.src_vnf.clone(),
        dst_intf: forward.src_intf.clone(),
        priority: forward.priority,
    };
    vec![forward, reverse]
}

impl FlowBackend for MemoryFlowBackend {
    fn set_chain(&self, request: &ChainRequest) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        if state.unreachable {
            return Err(BackendError::Unreachable("memory backend disabled".to_string()));
        }
        debug!(
            "{} {}:{} -> {}:{} cookie={}",
            request.command,
            request.src_vnf,
            request.src_intf,
            request.dst_vnf,
            request.dst_intf,
            request.cookie
        );
        match request.command {
            FlowCommand::AddFlow => {
                state
                    .flows
                    .entry(request.cookie)
                    .or_default()
                    .extend(entries(request));
            }
            FlowCommand::DelFlows => {
                if let Some(flows) = state.flows.get_mut(&request.cookie) {
                    for entry in entries(request) {
                        flows.retain(|f| {
                            (&f.src_vnf, &f.src_intf, &f.dst_vnf, &f.dst_intf)
                                != (&entry.src_vnf, &entry.src_intf, &entry.dst_vnf, &entry.dst_intf)
                        });
                    }
                    if flows.is_empty() {
                        state.flows.remove(&request.cookie);
                    }
                }
            }
        }
        state.requests.push(request.clone());
        Ok(())
    }
}
