// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The subnet allocator

use crate::IpamError;
use concurrency::lock;
use concurrency::sync::Mutex;
use ipnet::Ipv4Net;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// The pool every network subnet is taken from unless configured otherwise.
pub const DEFAULT_POOL: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8);
/// Prefix length of the subnet given to every network unless configured otherwise.
pub const DEFAULT_PREFIX_LEN: u8 = 24;

/// A subnet handed out to (or explicitly assigned to) an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation<O> {
    pub cidr: Ipv4Net,
    pub owner: O,
}

struct Table<O> {
    /// Issued subnets, keyed by network address.
    issued: BTreeMap<u32, Reservation<O>>,
    /// Next candidate block. Kept as a `u64` so that it can step past 255.255.255.255.
    cursor: u64,
}

/// Hands out fixed-size subnets of an IPv4 pool to owners of type `O`.
///
/// Blocks are handed out in increasing address order. Freeing a block below the allocation
/// cursor moves the cursor back, so the lowest free block is always handed out next.
pub struct SubnetAllocator<O> {
    pool: Ipv4Net,
    prefix_len: u8,
    first: u64,
    end: u64,
    block: u64,
    table: Mutex<Table<O>>,
}

impl<O> Debug for SubnetAllocator<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubnetAllocator")
            .field("pool", &self.pool)
            .field("prefix_len", &self.prefix_len)
            .finish_non_exhaustive()
    }
}

impl<O: Clone + Eq + Display> Default for SubnetAllocator<O> {
    fn default() -> Self {
        Self::new(DEFAULT_POOL, DEFAULT_PREFIX_LEN)
            .unwrap_or_else(|_| unreachable!("default pool fits /{DEFAULT_PREFIX_LEN} blocks"))
    }
}

impl<O: Clone + Eq + Display> SubnetAllocator<O> {
    /// Create an allocator handing out `/prefix_len` blocks of `pool`.
    ///
    /// # Errors
    ///
    /// Fails if `prefix_len` is shorter than the prefix of the pool or longer than 32.
    pub fn new(pool: Ipv4Net, prefix_len: u8) -> Result<Self, IpamError> {
        if prefix_len < pool.prefix_len() || prefix_len > 32 {
            return Err(IpamError::InvalidPrefixLen { prefix_len, pool });
        }
        let pool = pool.trunc();
        let first = u64::from(pool.network().to_bits());
        let end = u64::from(pool.broadcast().to_bits()) + 1;
        debug!("New subnet allocator: /{prefix_len} blocks of {pool}");
        Ok(Self {
            pool,
            prefix_len,
            first,
            end,
            block: 1u64 << (32 - prefix_len),
            table: Mutex::new(Table {
                issued: BTreeMap::new(),
                cursor: first,
            }),
        })
    }

    #[must_use]
    pub fn pool(&self) -> Ipv4Net {
        self.pool
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of blocks in the pool.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        (self.end - self.first) / self.block
    }

    /// Number of subnets currently issued, including explicit assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.table).issued.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The network address of the block starting at `addr`, if that block lies in the pool.
    fn block_at(&self, addr: u64) -> Option<Ipv4Net> {
        if addr < self.first || addr + self.block > self.end {
            return None;
        }
        let base = u32::try_from(addr).ok()?;
        Ipv4Net::new(Ipv4Addr::from_bits(base), self.prefix_len).ok()
    }

    fn is_aligned(&self, addr: u64) -> bool {
        addr >= self.first && addr < self.end && (addr - self.first) % self.block == 0
    }

    /// Hand out the next free block to `owner`, or `None` once the pool is exhausted.
    pub fn allocate(&self, owner: O) -> Option<Ipv4Net> {
        let mut table = lock(&self.table);
        loop {
            let Some(cidr) = self.block_at(table.cursor) else {
                warn!("Address pool {} exhausted, cannot allocate for {owner}", self.pool);
                return None;
            };
            let key = cidr.network().to_bits();
            if !table.issued.contains_key(&key) {
                debug!("Allocated {cidr} to {owner}");
                table.issued.insert(key, Reservation { cidr, owner });
                return Some(cidr);
            }
            table.cursor += self.block;
        }
    }

    /// Like [`SubnetAllocator::allocate`], but reports exhaustion as an error.
    ///
    /// # Errors
    ///
    /// Returns [`IpamError::Exhausted`] if no block is left in the pool.
    pub fn try_allocate(&self, owner: O) -> Result<Ipv4Net, IpamError> {
        self.allocate(owner).ok_or_else(|| IpamError::Exhausted {
            pool: self.pool,
            issued: self.len(),
            capacity: self.capacity(),
        })
    }

    /// Give `cidr` back. Only the owner it was issued to may free it.
    ///
    /// Returns whether the subnet was released.
    pub fn free(&self, cidr: Ipv4Net, owner: &O) -> bool {
        let key = cidr.network().to_bits();
        let mut table = lock(&self.table);
        match table.issued.get(&key) {
            None => {
                warn!("Cannot free {cidr}: not issued");
                false
            }
            Some(reservation) if reservation.owner != *owner => {
                warn!(
                    "Refusing to free {cidr} for {owner}: issued to {}",
                    reservation.owner
                );
                false
            }
            Some(_) => {
                table.issued.remove(&key);
                let addr = u64::from(key);
                if self.is_aligned(addr) && addr < table.cursor {
                    table.cursor = addr;
                }
                debug!("Freed {cidr} of {owner}");
                true
            }
        }
    }

    /// Record `cidr` as issued to `owner` without going through the cursor.
    ///
    /// The subnet does not need to lie in the pool. Returns false if it is already issued.
    pub fn assign(&self, cidr: Ipv4Net, owner: O) -> bool {
        let key = cidr.network().to_bits();
        let mut table = lock(&self.table);
        if let Some(reservation) = table.issued.get(&key) {
            warn!(
                "Cannot assign {cidr} to {owner}: already issued to {}",
                reservation.owner
            );
            return false;
        }
        debug!("Assigned {cidr} to {owner}");
        table.issued.insert(key, Reservation { cidr, owner });
        true
    }

    #[must_use]
    pub fn is_issued(&self, cidr: Ipv4Net) -> bool {
        lock(&self.table)
            .issued
            .contains_key(&cidr.network().to_bits())
    }

    #[must_use]
    pub fn is_owned_by(&self, cidr: Ipv4Net, owner: &O) -> bool {
        self.owner_of(cidr).is_some_and(|o| o == *owner)
    }

    #[must_use]
    pub fn owner_of(&self, cidr: Ipv4Net) -> Option<O> {
        lock(&self.table)
            .issued
            .get(&cidr.network().to_bits())
            .map(|r| r.owner.clone())
    }

    /// All issued subnets, in address order.
    #[must_use]
    pub fn issued(&self) -> Vec<Reservation<O>> {
        lock(&self.table).issued.values().cloned().collect()
    }
}

#[cfg(all(test, not(feature = "shuttle")))]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tracing_test::traced_test;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn small_pool() -> SubnetAllocator<String> {
        SubnetAllocator::new(net("10.0.0.0/22"), 24).unwrap()
    }

    #[test]
    fn allocates_in_address_order() {
        let ipam = SubnetAllocator::<String>::default();
        assert_eq!(ipam.capacity(), 65536);
        assert_eq!(ipam.allocate("net1".into()), Some(net("10.0.0.0/24")));
        assert_eq!(ipam.allocate("net2".into()), Some(net("10.0.1.0/24")));
        assert_eq!(ipam.allocate("net3".into()), Some(net("10.0.2.0/24")));
        assert!(ipam.is_owned_by(net("10.0.1.0/24"), &"net2".to_string()));
        assert_eq!(ipam.len(), 3);
    }

    #[test]
    fn bad_prefix_len_is_rejected() {
        assert_eq!(
            SubnetAllocator::<String>::new(net("10.0.0.0/8"), 7).unwrap_err(),
            IpamError::InvalidPrefixLen {
                prefix_len: 7,
                pool: net("10.0.0.0/8")
            }
        );
        assert!(SubnetAllocator::<String>::new(net("10.0.0.0/8"), 33).is_err());
    }

    #[test]
    fn freed_low_block_is_reused_first() {
        let ipam = small_pool();
        for i in 0..3 {
            ipam.allocate(format!("net{i}")).unwrap();
        }
        assert!(ipam.free(net("10.0.0.0/24"), &"net0".to_string()));
        assert!(ipam.free(net("10.0.1.0/24"), &"net1".to_string()));
        assert_eq!(ipam.allocate("a".into()), Some(net("10.0.0.0/24")));
        assert_eq!(ipam.allocate("b".into()), Some(net("10.0.1.0/24")));
        assert_eq!(ipam.allocate("c".into()), Some(net("10.0.3.0/24")));
    }

    #[test]
    fn small_pool_exhaustion() {
        let ipam = small_pool();
        let cidrs: Vec<_> = (0..4).map(|i| ipam.allocate(format!("net{i}"))).collect();
        assert!(cidrs.iter().all(Option::is_some));
        assert_eq!(ipam.allocate("late".into()), None);
        assert!(matches!(
            ipam.try_allocate("late".into()),
            Err(IpamError::Exhausted { issued: 4, capacity: 4, .. })
        ));
        assert!(ipam.free(net("10.0.2.0/24"), &"net2".to_string()));
        assert_eq!(ipam.allocate("late".into()), Some(net("10.0.2.0/24")));
        assert_eq!(ipam.allocate("later".into()), None);
    }

    #[test]
    fn default_pool_exhaustion() {
        let ipam = SubnetAllocator::<u32>::default();
        for i in 0..65536 {
            assert!(ipam.allocate(i).is_some());
        }
        assert_eq!(ipam.allocate(65536), None);
        assert!(ipam.free(net("10.0.0.0/24"), &0));
        assert_eq!(ipam.allocate(65536), Some(net("10.0.0.0/24")));
        assert_eq!(ipam.allocate(65537), None);
    }

    #[test]
    fn pool_at_top_of_address_space() {
        let ipam = SubnetAllocator::<u32>::new(net("255.255.254.0/23"), 24).unwrap();
        assert_eq!(ipam.allocate(1), Some(net("255.255.254.0/24")));
        assert_eq!(ipam.allocate(2), Some(net("255.255.255.0/24")));
        assert_eq!(ipam.allocate(3), None);
    }

    #[traced_test]
    #[test]
    fn free_by_other_owner_is_refused() {
        let ipam = small_pool();
        let cidr = ipam.allocate("blue".into()).unwrap();
        assert!(!ipam.free(cidr, &"red".to_string()));
        assert!(ipam.is_issued(cidr));
        assert!(logs_contain("Refusing to free 10.0.0.0/24 for red"));
        assert!(!ipam.free(net("10.0.3.0/24"), &"blue".to_string()));
        assert!(ipam.free(cidr, &"blue".to_string()));
        assert!(!ipam.is_issued(cidr));
    }

    #[test]
    fn assign_does_not_move_cursor() {
        let ipam = small_pool();
        assert!(ipam.assign(net("10.0.1.0/24"), "static".into()));
        assert!(!ipam.assign(net("10.0.1.0/24"), "other".into()));
        assert_eq!(ipam.allocate("a".into()), Some(net("10.0.0.0/24")));
        assert_eq!(ipam.allocate("b".into()), Some(net("10.0.2.0/24")));
        assert_eq!(ipam.owner_of(net("10.0.1.0/24")), Some("static".into()));
    }

    #[test]
    fn freeing_foreign_subnets_keeps_cursor() {
        let ipam = small_pool();
        ipam.allocate("a".into()).unwrap();
        ipam.allocate("b".into()).unwrap();
        // outside of the pool
        assert!(ipam.assign(net("192.168.0.0/24"), "ext".into()));
        assert!(ipam.free(net("192.168.0.0/24"), &"ext".to_string()));
        // inside the pool, but not on a block boundary
        assert!(ipam.assign(net("10.0.3.128/25"), "half".into()));
        assert!(ipam.free(net("10.0.3.128/25"), &"half".to_string()));
        assert_eq!(ipam.allocate("c".into()), Some(net("10.0.2.0/24")));
    }

    #[test]
    fn issued_lists_in_address_order() {
        let ipam = small_pool();
        ipam.assign(net("10.0.3.0/24"), "z".into());
        ipam.allocate("a".into());
        let issued: Vec<_> = ipam.issued().into_iter().map(|r| r.cidr).collect();
        assert_eq!(issued, vec![net("10.0.0.0/24"), net("10.0.3.0/24")]);
    }

    #[test]
    fn random_alloc_free_sequences_keep_subnets_unique() {
        bolero::check!()
            .with_type()
            .for_each(|ops: &Vec<(bool, u8)>| {
                let ipam = SubnetAllocator::<u8>::new(net("10.0.0.0/20"), 24).unwrap();
                let mut held: Vec<(Ipv4Net, u8)> = Vec::new();
                for &(alloc, n) in ops {
                    if alloc || held.is_empty() {
                        match ipam.allocate(n) {
                            Some(cidr) => {
                                assert!(held.iter().all(|(c, _)| *c != cidr));
                                held.push((cidr, n));
                            }
                            None => assert_eq!(held.len(), 16),
                        }
                    } else {
                        let (cidr, owner) = held.swap_remove(usize::from(n) % held.len());
                        assert!(ipam.free(cidr, &owner));
                    }
                    assert_eq!(ipam.len(), held.len());
                }
                let issued: BTreeSet<_> = ipam.issued().into_iter().map(|r| r.cidr).collect();
                let expected: BTreeSet<_> = held.iter().map(|(c, _)| *c).collect();
                assert_eq!(issued, expected);
                // the lowest free block is handed out next
                if let Some(lowest) = (0..16u8)
                    .map(|i| net(&format!("10.0.{i}.0/24")))
                    .find(|c| !expected.contains(c))
                {
                    assert_eq!(ipam.allocate(0), Some(lowest));
                }
            });
    }
}

#[cfg(all(test, feature = "shuttle"))]
mod tests_shuttle {
    use super::*;
    use std::collections::BTreeSet;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn concurrent_allocations_are_disjoint() {
        use concurrency::sync::Arc;
        use concurrency::thread;

        shuttle::check_random(
            || {
                let ipam = Arc::new(SubnetAllocator::<u32>::new(net("10.0.0.0/22"), 24).unwrap());
                let handles: Vec<_> = (0..3)
                    .map(|t| {
                        let ipam = ipam.clone();
                        thread::spawn(move || {
                            let a = ipam.allocate(t).unwrap();
                            assert!(ipam.free(a, &t));
                            ipam.allocate(t).unwrap()
                        })
                    })
                    .collect();
                let kept: BTreeSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                assert_eq!(kept.len(), 3);
                assert_eq!(ipam.len(), 3);
            },
            200,
        );
    }
}
