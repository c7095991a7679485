//! Configuration loading and validation (spec §6). YAML parsing is kept
//! deliberately separate from structural validation — `Config::load`
//! deserializes, `Config::validate` checks cross-field invariants the
//! schema alone can't express — mirroring the teacher's two-phase
//! load-then-validate modules.

mod env;
mod loader;
mod schema;
mod validate;

pub use env::{EnvDiscovery, ModelTier};
pub use schema::{AgentEntryPointConfig, Config, EvaluationConfig, PrStrategy};
