//! # Error Handling Module
//!
//! Standardized error types for each core component: pattern compilation,
//! dimension resolution, routing, and plugin RPC adaptation. Each is a
//! `thiserror`-derived enum; fatal-at-construction failures (pattern compile,
//! router validation) are kept distinct from per-resource failures recorded
//! as `ErrorDetail` (see `models::ErrorDetail`) so callers can tell "the
//! router refused to build" apart from "one resource failed".

use thiserror::Error;

/// Errors from compiling or matching a `ResourcePattern` (glob or regex).
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid regex pattern {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("empty pattern for plugin {plugin}")]
    EmptyPattern { plugin: String },

    #[error("unknown pattern type {pattern_type:?} for plugin {plugin}")]
    UnknownPatternType { plugin: String, pattern_type: String },
}

/// Errors from the dimension resolver. Resolution never hard-fails (it
/// degrades to empty sku/region), so this is reserved for programmer
/// errors surfaced in tests and debug assertions.
#[derive(Error, Debug)]
pub enum DimensionError {
    #[error("property {key} present but not a scalar or string-convertible value")]
    UnsupportedPropertyValue { key: String },
}

/// Errors that abort router construction (§7: "Configuration" and "Pattern
/// compile" rows — both fatal at startup).
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("plugin routing config has empty name")]
    EmptyName,

    #[error("plugin routing config references unknown plugin {name:?}")]
    UnknownPlugin { name: String },

    #[error("plugin {name:?} has negative priority {priority}")]
    NegativePriority { name: String, priority: i64 },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("router validation failed with {0} error(s)")]
    ValidationFailed(usize),
}

/// Errors from the plugin adapter (§4.5). Transport/plugin errors and
/// pre-flight validation failures are *not* represented here — those are
/// captured as `ErrorDetail` + placeholder `CostResult` so that sibling
/// resources keep processing. This enum is reserved for adapter-level
/// invariant violations that abort the whole call.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// `properties` was non-nil but more than one resource id was requested
    /// (§4.5.2 pre-request invariant).
    #[error("properties supplied for an actual-cost request naming more than one resource id")]
    PropertiesMultiResource,
}
