// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port pairs, port pair groups and port chains

use crate::FlowClassifier;
use id::Id;
use rand::Rng;
use std::fmt::{Display, Formatter};
use std::num::NonZero;

/// The tag carried by every flow rule installed for a port chain.
///
/// Zero is reserved: OpenFlow controllers use it for flows with no cookie.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Cookie(NonZero<u32>);

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCookie {
    #[error("Zero is not a legal cookie")]
    ReservedZero,
}

impl Cookie {
    /// A cookie drawn uniformly from `1..=u32::MAX`.
    #[must_use]
    pub fn random() -> Self {
        let raw = rand::rng().random_range(1..=u32::MAX);
        Cookie::new_checked(raw).unwrap_or_else(|e| unreachable!("{e:?}"))
    }

    /// # Errors
    ///
    /// Returns [`InvalidCookie::ReservedZero`] for 0.
    pub fn new_checked(raw: u32) -> Result<Cookie, InvalidCookie> {
        NonZero::new(raw)
            .map(Cookie)
            .ok_or(InvalidCookie::ReservedZero)
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for Cookie {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

impl TryFrom<u32> for Cookie {
    type Error = InvalidCookie;

    fn try_from(raw: u32) -> Result<Cookie, Self::Error> {
        Cookie::new_checked(raw)
    }
}

impl From<Cookie> for u32 {
    fn from(cookie: Cookie) -> u32 {
        cookie.as_u32()
    }
}

/// The end of a port pair: a port, and the interface it is plugged with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub name: String,
    /// Missing if no interface name could be claimed for the port.
    pub intf_name: Option<String>,
}

impl PortRef {
    #[must_use]
    pub fn new(name: &str, intf_name: &str) -> Self {
        Self {
            name: name.to_string(),
            intf_name: Some(intf_name.to_string()),
        }
    }
}

/// Where traffic enters and leaves one service function instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPair {
    pub name: String,
    pub ingress: PortRef,
    pub egress: PortRef,
}

/// Port pairs of instances of the same service function, load-sharing one hop of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPairGroup {
    pub name: String,
    pub port_pairs: Vec<PortPair>,
}

/// An ordered sequence of port pair groups that classified traffic goes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortChain {
    pub id: Id<PortChain>,
    pub name: String,
    pub port_pair_groups: Vec<PortPairGroup>,
    pub flow_classifiers: Vec<FlowClassifier>,
    /// Never changes for the lifetime of the chain.
    pub cookie: Cookie,
}

impl PortChain {
    /// A new chain with a fresh id and a random cookie.
    #[must_use]
    pub fn new(
        name: &str,
        port_pair_groups: Vec<PortPairGroup>,
        flow_classifiers: Vec<FlowClassifier>,
    ) -> Self {
        Self::with_cookie(name, port_pair_groups, flow_classifiers, Cookie::random())
    }

    #[must_use]
    pub fn with_cookie(
        name: &str,
        port_pair_groups: Vec<PortPairGroup>,
        flow_classifiers: Vec<FlowClassifier>,
        cookie: Cookie,
    ) -> Self {
        Self {
            id: Id::new(),
            name: name.to_string(),
            port_pair_groups,
            flow_classifiers,
            cookie,
        }
    }

    /// All port pairs of the chain, hop by hop.
    pub fn port_pairs(&self) -> impl Iterator<Item = &PortPair> {
        self.port_pair_groups
            .iter()
            .flat_map(|group| group.port_pairs.iter())
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::Cookie;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for Cookie {
        fn generate<D: Driver>(u: &mut D) -> Option<Self> {
            let raw = u.produce::<u32>()?.max(1);
            Some(Cookie::new_checked(raw).unwrap_or_else(|e| unreachable!("{e:?}")))
        }
    }
}
