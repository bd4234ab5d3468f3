//! # Router (C4)
//!
//! Selects an ordered chain of plugin matches for a `(resource, feature)`
//! pair: configured patterns take precedence over automatic provider
//! matching, with a stable priority-descending sort breaking ties by
//! insertion order. Immutable once constructed; all patterns are compiled
//! eagerly so a misconfigured regex aborts construction rather than a
//! later match call.

use crate::error::RouterError;
use crate::models::Feature;
use crate::pattern::{self, CompiledPattern, PatternCache, PatternKind};
use crate::plugin::PluginClient;
use std::collections::HashMap;
use std::sync::Arc;

/// One configured pattern entry: `{type: glob|regex, pattern}`.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    pub kind: PatternKind,
    pub pattern: String,
}

/// Tri-state fallback configuration: unset defaults to enabled.
#[derive(Debug, Clone, Copy, Default)]
pub enum FallbackSetting {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

impl FallbackSetting {
    fn resolve(self) -> bool {
        match self {
            FallbackSetting::Unset | FallbackSetting::Enabled => true,
            FallbackSetting::Disabled => false,
        }
    }
}

/// A single configured plugin routing entry (§3 `PluginRouting`).
#[derive(Debug, Clone, Default)]
pub struct PluginRouting {
    pub name: String,
    pub priority: i64,
    pub features: Vec<String>,
    pub patterns: Vec<PatternConfig>,
    pub fallback: FallbackSetting,
}

/// Reason a plugin was selected for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    Pattern,
    Automatic,
    Global,
}

/// Where a match came from: explicit configuration, or automatic provider
/// inference from client metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Config,
    Automatic,
}

/// One selection result, ready for the orchestrator's fallback chain walk.
#[derive(Clone)]
pub struct PluginMatch {
    pub client: Arc<dyn PluginClient>,
    pub priority: i64,
    pub fallback: bool,
    pub match_reason: MatchReason,
    pub source: MatchSource,
}

impl std::fmt::Debug for PluginMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginMatch")
            .field("client", &self.client.name())
            .field("priority", &self.priority)
            .field("fallback", &self.fallback)
            .field("match_reason", &self.match_reason)
            .field("source", &self.source)
            .finish()
    }
}

/// Structured validation result (§4.4.1). Non-empty `errors` blocks use;
/// `warnings` never do.
#[derive(Debug, Clone, Default)]
pub struct RouterValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RouterValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

struct ResolvedConfig {
    routing: PluginRouting,
    compiled_patterns: Vec<CompiledPattern>,
}

/// Immutable post-construction router over a fixed set of plugin clients
/// and an optional routing configuration.
pub struct Router {
    clients: Vec<Arc<dyn PluginClient>>,
    clients_by_name: HashMap<String, Arc<dyn PluginClient>>,
    configs_by_name: HashMap<String, ResolvedConfig>,
    config_order: Vec<String>,
    pattern_cache: PatternCache,
}

impl Router {
    /// Build a router, compiling all configured patterns eagerly. Fails
    /// (construction aborts) on the same conditions `Validate` reports as
    /// errors, since an un-buildable router must never be used.
    pub fn new(
        clients: Vec<Arc<dyn PluginClient>>,
        routings: Vec<PluginRouting>,
    ) -> Result<Self, RouterError> {
        let pattern_cache = PatternCache::new();
        let clients_by_name: HashMap<String, Arc<dyn PluginClient>> = clients
            .iter()
            .map(|c| (c.name().to_string(), c.clone()))
            .collect();

        let mut configs_by_name = HashMap::new();
        let mut config_order = Vec::new();

        for routing in routings {
            if routing.name.is_empty() {
                return Err(RouterError::EmptyName);
            }
            if !clients_by_name.contains_key(&routing.name) {
                return Err(RouterError::UnknownPlugin {
                    name: routing.name.clone(),
                });
            }
            if routing.priority < 0 {
                return Err(RouterError::NegativePriority {
                    name: routing.name.clone(),
                    priority: routing.priority,
                });
            }

            let mut compiled_patterns = Vec::with_capacity(routing.patterns.len());
            for p in &routing.patterns {
                compiled_patterns.push(pattern_cache.get_or_compile(
                    &routing.name,
                    p.kind,
                    &p.pattern,
                )?);
            }

            config_order.push(routing.name.clone());
            configs_by_name.insert(
                routing.name.clone(),
                ResolvedConfig {
                    routing,
                    compiled_patterns,
                },
            );
        }

        Ok(Self {
            clients,
            clients_by_name,
            configs_by_name,
            config_order,
            pattern_cache,
        })
    }

    /// Produce `{errors, warnings}` without mutating state. Intended to be
    /// called once after construction, before the router is used.
    pub fn validate(&self) -> RouterValidation {
        let mut out = RouterValidation::default();
        let mut seen_names = std::collections::HashSet::new();

        for name in &self.config_order {
            let cfg = &self.configs_by_name[name].routing;

            if !seen_names.insert(name.clone()) {
                out.warnings
                    .push(format!("duplicate plugin entry for {name:?}"));
            }

            for feature in &cfg.features {
                if Feature::parse(feature).is_none() {
                    out.warnings
                        .push(format!("unknown feature name {feature:?} for plugin {name:?}"));
                }
            }
        }

        out
    }

    pub fn pattern_cache(&self) -> &PatternCache {
        &self.pattern_cache
    }

    /// All plugin clients known to this router, in construction order.
    /// Callers use this to fetch `GetPluginInfo` metadata up front for
    /// [`Router::select_plugins_with_metadata`].
    pub fn clients(&self) -> &[Arc<dyn PluginClient>] {
        &self.clients
    }

    fn feature_matches(configured: &[String], feature: Option<&str>) -> bool {
        if configured.is_empty() {
            return true;
        }
        match feature {
            None => true,
            Some(f) => configured.iter().any(|c| c == f),
        }
    }

    /// Select the ordered chain of plugin matches for `(resource_type,
    /// feature)`. `feature` uses the exact closed-set spelling from §6.3;
    /// `None` matches any feature filter.
    pub fn select_plugins(&self, resource_type: &str, feature: Option<&str>) -> Vec<PluginMatch> {
        let provider = pattern::extract_provider(resource_type);
        let mut matched: Vec<PluginMatch> = Vec::new();
        let mut already_matched: std::collections::HashSet<String> =
            std::collections::HashSet::new();

        // Pattern pass: configured plugins with non-empty patterns.
        for name in &self.config_order {
            let resolved = &self.configs_by_name[name];
            if resolved.routing.patterns.is_empty() {
                continue;
            }
            // A plugin with configured patterns never falls through to
            // automatic matching for this resource, matched or not.
            already_matched.insert(name.clone());
            if !Self::feature_matches(&resolved.routing.features, feature) {
                continue;
            }
            let any_match = resolved
                .compiled_patterns
                .iter()
                .any(|p| p.is_match(resource_type));
            if any_match {
                if let Some(client) = self.clients_by_name.get(name) {
                    matched.push(PluginMatch {
                        client: client.clone(),
                        priority: resolved.routing.priority,
                        fallback: resolved.routing.fallback.resolve(),
                        match_reason: MatchReason::Pattern,
                        source: MatchSource::Config,
                    });
                }
            }
        }

        // Automatic pass: every known client not already matched.
        for client in &self.clients {
            let name = client.name();
            if already_matched.contains(name) {
                continue;
            }

            let cfg = self.configs_by_name.get(name);
            let features = cfg.map(|c| c.routing.features.as_slice()).unwrap_or(&[]);
            if !Self::feature_matches(features, feature) {
                continue;
            }

            // Metadata is not fetched synchronously here (it is an async
            // RPC); automatic matching instead relies on configuration for
            // provider scoping, falling back to global when unconfigured.
            let reason = MatchReason::Global;

            let priority = cfg.map(|c| c.routing.priority).unwrap_or(0);
            let fallback = cfg
                .map(|c| c.routing.fallback.resolve())
                .unwrap_or(true);

            matched.push(PluginMatch {
                client: client.clone(),
                priority,
                fallback,
                match_reason: reason,
                source: MatchSource::Automatic,
            });
        }

        let _ = provider; // retained for provider-aware client metadata matching (see select_plugins_with_metadata)
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// Variant of [`Router::select_plugins`] that additionally consults
    /// fetched plugin metadata for automatic provider matching (§4.4.2 step
    /// 3), used once `GetPluginInfo` has been cached by the caller.
    pub fn select_plugins_with_metadata(
        &self,
        resource_type: &str,
        feature: Option<&str>,
        metadata: &HashMap<String, crate::models::PluginMetadata>,
    ) -> Vec<PluginMatch> {
        let provider = pattern::extract_provider(resource_type);
        let mut matched: Vec<PluginMatch> = Vec::new();
        let mut already_matched: std::collections::HashSet<String> =
            std::collections::HashSet::new();

        for name in &self.config_order {
            let resolved = &self.configs_by_name[name];
            if resolved.routing.patterns.is_empty() {
                continue;
            }
            already_matched.insert(name.clone());
            if !Self::feature_matches(&resolved.routing.features, feature) {
                continue;
            }
            let any_match = resolved
                .compiled_patterns
                .iter()
                .any(|p| p.is_match(resource_type));
            if any_match {
                if let Some(client) = self.clients_by_name.get(name) {
                    matched.push(PluginMatch {
                        client: client.clone(),
                        priority: resolved.routing.priority,
                        fallback: resolved.routing.fallback.resolve(),
                        match_reason: MatchReason::Pattern,
                        source: MatchSource::Config,
                    });
                }
            }
        }

        for client in &self.clients {
            let name = client.name();
            if already_matched.contains(name) {
                continue;
            }

            let cfg = self.configs_by_name.get(name);
            let features = cfg.map(|c| c.routing.features.as_slice()).unwrap_or(&[]);
            if !Self::feature_matches(features, feature) {
                continue;
            }

            let reason = match metadata.get(name) {
                None => MatchReason::Global,
                Some(meta) => {
                    if meta.supported_providers.is_empty()
                        || meta.supported_providers.iter().any(|p| p == "*")
                    {
                        MatchReason::Global
                    } else if meta
                        .supported_providers
                        .iter()
                        .any(|p| pattern::providers_match(p, &provider))
                    {
                        MatchReason::Automatic
                    } else {
                        continue;
                    }
                }
            };

            let priority = cfg.map(|c| c.routing.priority).unwrap_or(0);
            let fallback = cfg
                .map(|c| c.routing.fallback.resolve())
                .unwrap_or(true);

            matched.push(PluginMatch {
                client: client.clone(),
                priority,
                fallback,
                match_reason: reason,
                source: MatchSource::Automatic,
            });
        }

        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// Tri-state fallback lookup by plugin name: unset or unknown name
    /// default to enabled (§4.4.3).
    pub fn should_fallback(&self, plugin_name: &str) -> bool {
        self.configs_by_name
            .get(plugin_name)
            .map(|c| c.routing.fallback.resolve())
            .unwrap_or(true)
    }
}
