// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of tracing for the testbed crates.
//!
//! Every crate declares its target with [`trace_target!`] and a set of tags. Targets are
//! collected at link time, so the [`TracingControl`] knows all of them without any explicit
//! registration, and log levels can then be changed per tag at runtime.

pub mod control;
pub mod display;
pub mod targets;

// re-exports
pub use control::{TraceCtlError, TracingControl, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;
