// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Service function chaining.
//!
//! A [`PortChain`] steers traffic through ordered groups of [`PortPair`]s, each pair being the
//! ingress and egress port of a VNF instance. The [`ChainInstaller`] resolves the instances owning
//! those ports in a [`ComputeInventory`] and asks a [`FlowBackend`] to install the matching
//! forwarding rules, all tagged with the [`Cookie`] of the chain so that they can later be updated
//! or removed together.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

mod backend;
mod chain;
mod classifier;
mod installer;
mod inventory;

pub use backend::{BackendError, ChainRequest, FlowBackend, FlowCommand, FlowEntry, MemoryFlowBackend};
pub use chain::{Cookie, InvalidCookie, PortChain, PortPair, PortPairGroup, PortRef};
pub use classifier::{
    ClassifierError, FlowClassifier, IPV4_ETHERTYPE, MatchValue, PortRange, Protocol, parse_match,
};
pub use installer::{
    ChainInstaller, ChainState, DEFAULT_PRIORITY, FlowSegment, InstallReport, InstalledChain, Side,
    SkippedPair, UpdateReport,
};
pub use inventory::{ComputeInstance, ComputeInventory};

use thiserror::Error;
use tracectl::trace_target;
trace_target!("sfc", LevelFilter::INFO, &["sfc"]);

#[derive(Error, Debug)]
pub enum SfcError {
    #[error("Flow backend failed for chain {chain}: {source}")]
    Backend {
        chain: String,
        #[source]
        source: BackendError,
    },
    #[error("Chain {0} is not installed")]
    NotInstalled(String),
}
