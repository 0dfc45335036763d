// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display implementations

use crate::control::{TargetCfg, TargetCfgDb};
use std::fmt::{Display, Formatter};

impl Display for TargetCfg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>40} │ {:>8} │ {}",
            self.target,
            self.level,
            self.tags.join(",")
        )
    }
}

pub(crate) struct TargetCfgDbByTag<'a>(pub(crate) &'a TargetCfgDb);
impl Display for TargetCfgDbByTag<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let db = self.0;
        writeln!(f)?;
        writeln!(f, " ──────── Tracing targets by tag (default: {}) ────────", db.level)?;
        for tag in db.tags.values() {
            writeln!(f, " {}:", tag.tag)?;
            for target in db.tag_targets(tag.tag) {
                writeln!(f, "   {target}")?;
            }
        }
        Ok(())
    }
}
