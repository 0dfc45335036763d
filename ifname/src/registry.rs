// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The interface name table

use crate::IfNameError;
use concurrency::lock;
use concurrency::sync::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use tracing::{debug, error, warn};

/// Longest interface name accepted by the kernel (`IFNAMSIZ` minus the terminating NUL).
pub const MAX_IFNAME_LEN: usize = 15;
/// Highest counter appended to a base name.
pub const MAX_COUNTER: u16 = 999;

const MAX_PREFIX_LEN: usize = 4;
const MAX_FALLBACK_LEN: usize = 9;

/// The longest prefix of `s` that is at most `max` bytes and ends on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Derive the base of the interface name of a port, before the counter is appended.
///
/// Names with at least three `:`-separated fields, like `vnf1:eth0:input`, become the first
/// 4 bytes of the first field and a role taken from the third field (`in`, `out`, or its first
/// 4 bytes): `vnf1-in`. Any other name is cut to its first 9 bytes.
#[must_use]
pub fn base_name(port_name: &str) -> String {
    let fields: Vec<&str> = port_name.split(':').collect();
    if let [vnf, _, role, ..] = fields.as_slice() {
        let role = match *role {
            "input" | "in" => "in",
            "output" | "out" => "out",
            other => truncate(other, MAX_PREFIX_LEN),
        };
        format!("{}-{role}", truncate(vnf, MAX_PREFIX_LEN))
    } else {
        truncate(port_name, MAX_FALLBACK_LEN).to_string()
    }
}

/// Names held by a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortNames {
    /// The name the port was given by the user.
    pub name: String,
    /// The interface name derived from it, if one could be claimed.
    pub intf_name: Option<String>,
}

#[derive(Debug)]
struct Claim<O> {
    owner: O,
    /// Set when the owner claimed the name again while already holding it.
    renewed: bool,
}

#[derive(Debug)]
struct Table<O> {
    names: BTreeMap<String, Claim<O>>,
    ports: HashMap<O, PortNames>,
}

impl<O: Clone + Eq + Hash + Display> Table<O> {
    fn claim(&mut self, owner: &O, name: &str) -> Result<String, IfNameError> {
        let base = base_name(name);
        for counter in 0..=MAX_COUNTER {
            let candidate = format!("{base}-{counter}");
            match self.names.get_mut(&candidate) {
                Some(claim) if claim.owner != *owner => continue,
                Some(claim) => claim.renewed = true,
                None => {
                    self.names.insert(
                        candidate.clone(),
                        Claim {
                            owner: owner.clone(),
                            renewed: false,
                        },
                    );
                }
            }
            debug!("Port {owner} ({name}) uses interface name {candidate}");
            return Ok(candidate);
        }
        error!("Port {owner} could not create a unique interface name for '{name}' ({base})");
        Err(IfNameError::TooManyCollisions {
            port: name.to_string(),
            base,
        })
    }

    /// Give up one hold on `intf_name` by `owner`. Returns true if the name was dropped.
    fn unclaim(&mut self, owner: &O, intf_name: &str) -> bool {
        match self.names.get_mut(intf_name) {
            Some(claim) if claim.owner == *owner => {
                if claim.renewed {
                    claim.renewed = false;
                    false
                } else {
                    self.names.remove(intf_name);
                    true
                }
            }
            Some(claim) => {
                warn!(
                    "Interface name {intf_name} is held by {}, not by {owner}",
                    claim.owner
                );
                false
            }
            None => false,
        }
    }

    /// Drop `intf_name` if `owner` holds it, renewed or not.
    fn drop_claim(&mut self, owner: &O, intf_name: &str) {
        if self.names.get(intf_name).is_some_and(|c| c.owner == *owner) {
            self.names.remove(intf_name);
        }
    }

    fn set(&mut self, owner: &O, name: &str, intf_name: Option<String>) {
        self.ports.insert(
            owner.clone(),
            PortNames {
                name: name.to_string(),
                intf_name,
            },
        );
    }
}

/// Hands out unique interface names to the ports (of id type `O`) of the testbed.
pub struct InterfaceNameRegistry<O> {
    table: Mutex<Table<O>>,
}

impl<O> Debug for InterfaceNameRegistry<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceNameRegistry").finish_non_exhaustive()
    }
}

impl<O: Clone + Eq + Hash + Display> Default for InterfaceNameRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Clone + Eq + Hash + Display> InterfaceNameRegistry<O> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                names: BTreeMap::new(),
                ports: HashMap::new(),
            }),
        }
    }

    /// Claim an interface name for port `owner`, named `name`.
    ///
    /// The first of `<base>-0` .. `<base>-999` that no other port holds is used. If `owner`
    /// already holds that name, its claim is renewed: it then takes two [`release`]s to drop it.
    /// If `owner` held a different interface name, that name is given up.
    ///
    /// # Errors
    ///
    /// Returns [`IfNameError::TooManyCollisions`] if all candidates are taken. The port is then
    /// left without an interface name.
    ///
    /// [`release`]: InterfaceNameRegistry::release
    pub fn claim(&self, owner: O, name: &str) -> Result<String, IfNameError> {
        let mut table = lock(&self.table);
        let previous = table.ports.get(&owner).and_then(|p| p.intf_name.clone());
        let result = table.claim(&owner, name);
        if let Some(previous) = previous {
            if result.as_ref().ok() != Some(&previous) {
                table.unclaim(&owner, &previous);
            }
        }
        table.set(&owner, name, result.as_ref().ok().cloned());
        result
    }

    /// Rename port `owner` to `name` and derive its new interface name.
    ///
    /// Renaming a port to its current name keeps its interface name (or tries to claim one, if it
    /// has none). Otherwise the old interface name is dropped, even if its claim was renewed,
    /// before the new one is claimed.
    ///
    /// # Errors
    ///
    /// Fails like [`InterfaceNameRegistry::claim`].
    pub fn rename(&self, owner: &O, name: &str) -> Result<String, IfNameError> {
        let mut table = lock(&self.table);
        let current = table.ports.get(owner).cloned();
        if let Some(current) = current {
            if current.name == name {
                if let Some(intf_name) = current.intf_name {
                    return Ok(intf_name);
                }
            } else if let Some(old) = &current.intf_name {
                table.drop_claim(owner, old);
            }
        }
        let result = table.claim(owner, name);
        table.set(owner, name, result.as_ref().ok().cloned());
        result
    }

    /// Drop the interface name of port `owner`, returning it if it was actually freed.
    ///
    /// A renewed name survives one release and stays attached to the port.
    pub fn release(&self, owner: &O) -> Option<String> {
        let mut table = lock(&self.table);
        let intf_name = table.ports.get(owner)?.intf_name.clone();
        let Some(intf_name) = intf_name else {
            table.ports.remove(owner);
            return None;
        };
        if table.unclaim(owner, &intf_name) {
            table.ports.remove(owner);
            debug!("Released interface name {intf_name} of port {owner}");
            Some(intf_name)
        } else {
            debug!("Interface name {intf_name} of port {owner} was renewed, keeping it");
            None
        }
    }

    /// The current names of port `owner`.
    #[must_use]
    pub fn names_of(&self, owner: &O) -> Option<PortNames> {
        lock(&self.table).ports.get(owner).cloned()
    }

    #[must_use]
    pub fn interface_name(&self, owner: &O) -> Option<String> {
        self.names_of(owner).and_then(|n| n.intf_name)
    }

    /// The port holding interface name `intf_name`.
    #[must_use]
    pub fn owner(&self, intf_name: &str) -> Option<O> {
        lock(&self.table)
            .names
            .get(intf_name)
            .map(|c| c.owner.clone())
    }

    /// Number of interface names in use.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.table).names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(all(test, not(feature = "shuttle")))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use tracing_test::traced_test;

    #[test]
    fn base_names() {
        assert_eq!(base_name("vnf1:eth0:input"), "vnf1-in");
        assert_eq!(base_name("vnf1:eth0:in"), "vnf1-in");
        assert_eq!(base_name("firewall:eth1:output"), "fire-out");
        assert_eq!(base_name("firewall:eth1:mgmt0:x"), "fire-mgmt");
        assert_eq!(base_name("vnf1:input"), "vnf1:inpu");
        assert_eq!(base_name("port"), "port");
        assert_eq!(base_name(""), "");
        // multi-byte chars are never split
        assert_eq!(base_name("ééééé"), "éééé");
    }

    #[test]
    fn counter_resolves_collisions() {
        let names = InterfaceNameRegistry::<u32>::new();
        assert_eq!(names.claim(1, "vnf1:eth0:input").unwrap(), "vnf1-in-0");
        assert_eq!(names.claim(2, "vnf1:eth1:in").unwrap(), "vnf1-in-1");
        assert_eq!(names.claim(3, "vnf1:eth0:output").unwrap(), "vnf1-out-0");
        assert_eq!(names.owner("vnf1-in-1"), Some(2));
        assert_eq!(names.len(), 3);
    }

    #[traced_test]
    #[test]
    fn thousand_ports_on_one_base() {
        let names = InterfaceNameRegistry::<u32>::new();
        let mut seen = HashSet::new();
        for port in 0..1000 {
            let intf = names.claim(port, &format!("longportname{port}")).unwrap();
            assert!(intf.len() <= MAX_IFNAME_LEN);
            assert!(seen.insert(intf));
        }
        assert!(seen.contains("longportn-999"));
        assert_eq!(
            names.claim(1000, "longportname1000"),
            Err(IfNameError::TooManyCollisions {
                port: "longportname1000".to_string(),
                base: "longportn".to_string()
            })
        );
        assert_eq!(names.interface_name(&1000), None);
        assert!(logs_contain("could not create a unique interface name"));
        // the last port still got a record, and can be released without side effects
        assert_eq!(names.release(&1000), None);
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn release_frees_the_name() {
        let names = InterfaceNameRegistry::<u32>::new();
        names.claim(1, "vnf1:eth0:in").unwrap();
        names.claim(2, "vnf1:eth0:in").unwrap();
        assert_eq!(names.release(&1).as_deref(), Some("vnf1-in-0"));
        assert_eq!(names.release(&1), None);
        assert_eq!(names.claim(3, "vnf1:eth0:in").unwrap(), "vnf1-in-0");
    }

    #[test]
    fn renewed_claim_survives_one_release() {
        let names = InterfaceNameRegistry::<u32>::new();
        assert_eq!(names.claim(1, "vnf1:a:in").unwrap(), "vnf1-in-0");
        assert_eq!(names.claim(1, "vnf1:b:in").unwrap(), "vnf1-in-0");
        assert_eq!(names.release(&1), None);
        assert_eq!(names.owner("vnf1-in-0"), Some(1));
        assert_eq!(names.release(&1).as_deref(), Some("vnf1-in-0"));
        assert!(names.is_empty());
    }

    #[test]
    fn rename_to_same_name_keeps_interface() {
        let names = InterfaceNameRegistry::<u32>::new();
        names.claim(1, "vnf1:eth0:in").unwrap();
        assert_eq!(names.rename(&1, "vnf1:eth0:in").unwrap(), "vnf1-in-0");
        assert_eq!(names.len(), 1);
        assert_eq!(names.release(&1).as_deref(), Some("vnf1-in-0"));
    }

    #[test]
    fn rename_gives_up_old_name() {
        let names = InterfaceNameRegistry::<u32>::new();
        names.claim(1, "vnf1:eth0:in").unwrap();
        assert_eq!(names.rename(&1, "vnf2:eth0:out").unwrap(), "vnf2-out-0");
        assert_eq!(names.owner("vnf1-in-0"), None);
        assert_eq!(
            names.names_of(&1),
            Some(PortNames {
                name: "vnf2:eth0:out".to_string(),
                intf_name: Some("vnf2-out-0".to_string())
            })
        );
        assert_eq!(names.claim(2, "vnf1:eth1:in").unwrap(), "vnf1-in-0");
    }

    #[test]
    fn rename_onto_same_base_reuses_slot() {
        let names = InterfaceNameRegistry::<u32>::new();
        names.claim(1, "vnf1:eth0:in").unwrap();
        assert_eq!(names.rename(&1, "vnf1:eth9:in").unwrap(), "vnf1-in-0");
        assert_eq!(names.release(&1).as_deref(), Some("vnf1-in-0"));
        assert!(names.is_empty());
    }

    #[test]
    fn rename_drops_renewed_name() {
        let names = InterfaceNameRegistry::<u32>::new();
        names.claim(1, "vnf1:a:in").unwrap();
        names.claim(1, "vnf1:b:in").unwrap();
        assert_eq!(names.rename(&1, "vnf2:x:out").unwrap(), "vnf2-out-0");
        assert_eq!(names.owner("vnf1-in-0"), None);
        assert_eq!(names.len(), 1);
        assert_eq!(names.release(&1).as_deref(), Some("vnf2-out-0"));
        assert!(names.is_empty());
        assert_eq!(names.names_of(&1), None);
    }

    #[test]
    fn rename_of_unknown_port_claims() {
        let names = InterfaceNameRegistry::<u32>::new();
        assert_eq!(names.rename(&7, "p").unwrap(), "p-0");
        assert_eq!(names.interface_name(&7).as_deref(), Some("p-0"));
    }

    #[test]
    fn arbitrary_names_are_short_and_unique() {
        bolero::check!()
            .with_type()
            .for_each(|ports: &Vec<String>| {
                let names = InterfaceNameRegistry::<usize>::new();
                let mut seen = HashSet::new();
                for (id, name) in ports.iter().enumerate() {
                    let intf = names.claim(id, name).unwrap();
                    assert!(intf.len() <= MAX_IFNAME_LEN, "{intf} too long");
                    assert!(seen.insert(intf));
                }
            });
    }
}
