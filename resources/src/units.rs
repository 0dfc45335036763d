// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fixed-point resource units

/// Largest number of units a flavor or a datacenter may declare.
pub const MAX_UNITS: f64 = 1e12;

const SCALE: f64 = 1000.0;

/// Resource units counted in thousandths, so that totals add up and come back exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct MilliUnits(u64);

impl MilliUnits {
    /// Convert a unit count, rounded to the nearest thousandth. `units` must have passed
    /// [`valid_units`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn from_units(units: f64) -> Self {
        Self((units * SCALE).round() as u64)
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn as_units(self) -> f64 {
        self.0 as f64 / SCALE
    }

    pub(crate) fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub(crate) fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

/// Whether `units` is a count a flavor or a datacenter can declare.
pub(crate) fn valid_units(units: f64) -> bool {
    units.is_finite() && (0.0..=MAX_UNITS).contains(&units)
}
