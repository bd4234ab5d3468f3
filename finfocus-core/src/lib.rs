//! # FinFocus Core
//!
//! Plugin orchestration primitives for FinFocus: provider/pattern matching,
//! dimension resolution, routing, and plugin RPC adaptation. This crate
//! holds no I/O or persistence concerns — those live in `finfocus-engine`,
//! which composes these primitives into the dismissal store, scoped budget
//! evaluator, and orchestrator.
//!
//! ## Modules
//!
//! - [`pattern`]: provider extraction, glob/regex pattern compilation and
//!   the compile-once [`pattern::PatternCache`].
//! - [`dimension`]: `(provider, resourceType, properties) -> (sku, region)`
//!   resolution plus actual-cost identifier resolution.
//! - [`plugin`]: the wire-level RPC contract and [`plugin::PluginClient`]
//!   trait that external plugin processes implement.
//! - [`router`]: plugin selection for a `(resource, feature)` pair.
//! - [`adapter`]: projected-cost and actual-cost fan-out over a single
//!   plugin client, translating to and from the wire contract.
//! - [`models`]: shared data types used across the orchestration plane.
//! - [`error`]: per-component error taxonomy.

pub mod adapter;
pub mod dimension;
pub mod error;
pub mod models;
pub mod pattern;
pub mod plugin;
pub mod router;

pub use adapter::{actual_cost_fan_out, projected_cost_fan_out, ActualCostBatchRequest};
pub use dimension::{resolve_actual_cost_identity, resolve_dimension, Dimension, EnvAccessor};
pub use models::{CostResult, CostResultWithErrors, ErrorDetail, Feature, ResourceDescriptor};
pub use pattern::{extract_provider, PatternCache, PatternKind};
pub use plugin::PluginClient;
pub use router::{PluginMatch, PluginRouting, Router, RouterValidation};
