//! hcv-model
//!
//! Data model of the reconciliation engine:
//! - `DesiredState`: what the host should run (read-only to the engine)
//! - `HostState`: what the host actually runs, captured once per cycle
//! - `ModuleRegistry`: the explicit set of modules the engine may touch
//!
//! Plain data. No IO.

mod registry;
mod types;

pub use registry::{normalize_module_name, ModuleHandler, ModuleKind, ModuleRegistry};
pub use types::*;
