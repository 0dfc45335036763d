// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed identifiers for the objects of the emulated testbed.
//!
//! Networks, ports and port chains are all identified by a [`Uuid`], the way the emulated
//! OpenStack APIs hand them out. Passing raw [`Uuid`]s around makes it easy to hand a network id
//! to a function expecting a port id, so this crate tags the [`Uuid`] with the type it identifies.
//!
//! ```
//! # use dcemu_id::Id;
//! pub struct Network {
//!     id: Id<Self>,
//!     cidr: String,
//! }
//!
//! pub struct Port {
//!     id: Id<Self>,
//!     network: Id<Network>,
//! }
//! ```
//!
//! Mixing them up is a compile error:
//!
//! ```rust,compile_fail
//! # use dcemu_id::Id;
//! # struct Network;
//! # struct Port;
//! fn attach(mut port: Id<Port>, network: Id<Network>) {
//!     port = network;
//! }
//! ```

use core::fmt::{Debug, Formatter};
use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use uuid::Uuid;

#[allow(unused_imports)] // re-export
#[cfg(any(test, feature = "bolero"))]
pub use contract::*;

/// A [`Uuid`] (or any other `U`) compile-time tagged with the type `T` it identifies.
///
/// The tag is a [`PhantomData`]: it takes no space and `Id<T>` has the layout of `U`.
#[repr(transparent)]
pub struct Id<T: ?Sized, U = Uuid>(U, PhantomData<T>);

// The trait impls below are written by hand: deriving them would require `T` to implement the
// trait as well, which marker types generally don't.

impl<T: ?Sized, U: Copy> Copy for Id<T, U> {}

impl<T: ?Sized, U: Clone> Clone for Id<T, U> {
    fn clone(&self) -> Self {
        Self(self.0.clone(), PhantomData)
    }
}

impl<T: ?Sized, U: Hash> Hash for Id<T, U> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T: ?Sized, U: PartialEq> PartialEq for Id<T, U> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: ?Sized, U: Eq> Eq for Id<T, U> {}

impl<T: ?Sized, U: Ord> PartialOrd for Id<T, U> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized, U: Ord> Ord for Id<T, U> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: ?Sized, U: Display> Display for Id<T, U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<T: ?Sized, U: Debug> Debug for Id<T, U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl<T: ?Sized, U> AsRef<U> for Id<T, U> {
    fn as_ref(&self) -> &U {
        &self.0
    }
}

impl<T: ?Sized> Id<T> {
    /// Generate a new random (version 4) id.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4(), PhantomData)
    }

    /// Tag a [`Uuid`] received from a context where its type is known, e.g. the id of a port
    /// looked up by the caller. Do not use this to convert one `Id` type into another.
    #[must_use]
    pub const fn from_raw(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    /// Strip the type tag.
    #[must_use]
    pub const fn into_raw(self) -> Uuid {
        self.0
    }

    #[must_use]
    pub const fn as_raw(&self) -> &Uuid {
        &self.0
    }

    /// The first 6 hex digits of the id, as used in short human-readable names.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.simple().to_string().chars().take(6).collect()
    }
}

impl<T: ?Sized> From<Id<T>> for Uuid {
    fn from(value: Id<T>) -> Self {
        value.0
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::Id;
    use bolero::{Driver, TypeGenerator};
    use std::marker::PhantomData;
    use uuid::Uuid;

    impl<T: ?Sized + 'static> TypeGenerator for Id<T> {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let bytes = driver.produce::<[u8; 16]>()?;
            Some(Id(
                uuid::Builder::from_random_bytes(bytes).into_uuid(),
                PhantomData,
            ))
        }
    }

    /// Nil ids are never produced by [`Id::new`]; make them available to tests explicitly.
    #[must_use]
    pub fn nil_id<T: ?Sized>() -> Id<T> {
        Id::from_raw(Uuid::nil())
    }
}

#[cfg(test)]
mod test {
    use crate::{Id, nil_id};
    use std::collections::HashSet;

    enum Network {}
    enum Port {}

    #[test]
    fn new_generates_unique() {
        bolero::check!().with_type().for_each(|x: &Id<Network>| {
            let y = Id::<Network>::new();
            assert_ne!(*x, y);
        });
    }

    #[test]
    fn raw_round_trip_keeps_value() {
        let id = Id::<Port>::new();
        let raw = id.into_raw();
        assert_eq!(Id::<Port>::from_raw(raw), id);
        assert_eq!(id.as_raw(), &raw);
    }

    #[test]
    fn short_id_is_prefix_of_uuid() {
        let id = Id::<Port>::new();
        let short = id.short();
        assert_eq!(short.len(), 6);
        assert!(id.into_raw().simple().to_string().starts_with(&short));
        assert_eq!(nil_id::<Port>().short(), "000000");
    }

    #[test]
    fn ids_hash_by_value() {
        let a = Id::<Network>::new();
        let set: HashSet<_> = [a, a, Id::new()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
