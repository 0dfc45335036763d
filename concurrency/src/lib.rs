// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Synchronization primitives used by the shared tables of the testbed.
//!
//! Crates import `Mutex`, `RwLock` and `Arc` from [`sync`] rather than from `std::sync`. With the
//! `shuttle` feature enabled, the same names resolve to the [shuttle] model-checker primitives so
//! that the allocator and registry tests can explore thread interleavings.
//!
//! [shuttle]: https://docs.rs/shuttle

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

#[cfg(not(feature = "shuttle"))]
pub use std::sync;

#[cfg(feature = "shuttle")]
pub use shuttle::sync;

#[cfg(not(feature = "shuttle"))]
pub use std::thread;

#[cfg(feature = "shuttle")]
pub use shuttle::thread;

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// All critical sections in this workspace leave their table consistent before any operation
/// that may panic, so the poison flag carries no information for them.
pub fn lock<T: ?Sized>(mutex: &sync::Mutex<T>) -> sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Read-lock an [`sync::RwLock`], recovering from poisoning like [`lock`].
pub fn read<T: ?Sized>(rwlock: &sync::RwLock<T>) -> sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Write-lock an [`sync::RwLock`], recovering from poisoning like [`lock`].
pub fn write<T: ?Sized>(rwlock: &sync::RwLock<T>) -> sync::RwLockWriteGuard<'_, T> {
    rwlock
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
