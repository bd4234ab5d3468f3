//! # Core Data Model
//!
//! Shared types that flow between the router, the plugin adapter, and the
//! engine crate's budget evaluator and dismissal store. These mirror the
//! wire-level plugin RPC contract (see the `plugin_client` module) but are
//! the internal, owned representations the orchestration plane works with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single cloud resource to be priced, as produced by plan/state ingestion.
///
/// `properties` is intentionally a loose `serde_json::Value` map: the core
/// treats it as opaque except for a well-known set of keys consulted by the
/// dimension resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Stable identifier chosen by the ingestor (often a URN). Unique within
    /// an invocation.
    pub id: String,
    /// Dotted/colon resource-type token, e.g. `aws:ec2/instance:Instance`.
    /// Never empty.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Normalized provider identifier. May be pre-set by the ingestor or
    /// derived from `resource_type` via [`crate::pattern::extract_provider`].
    #[serde(default)]
    pub provider: String,
    /// Unrestricted scalar/map properties carrying pricing-relevant fields.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl ResourceDescriptor {
    /// True if this resource is a Pulumi-internal framework construct
    /// (`pulumi:providers:*`, `pulumi:pulumi:*`, ...) with no cost. These
    /// are excluded from routing by default.
    pub fn is_pulumi_internal(&self) -> bool {
        self.resource_type.starts_with("pulumi:")
    }
}

/// Plugin capability metadata, reported once per plugin via `GetPluginInfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Ordered set of provider strings this plugin supports. `[]` or
    /// `["*"]` means global (matches any provider).
    #[serde(default)]
    pub supported_providers: Vec<String>,
    /// Optional region pin. Empty means universal.
    #[serde(default)]
    pub region: String,
    /// Feature set this plugin declares support for. Empty defaults to
    /// `{ProjectedCosts, ActualCosts}`.
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// The closed set of plugin features. Case-sensitive at the config
/// boundary; [`Feature::parse`] maps the exact configured spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    ProjectedCosts,
    ActualCosts,
    Recommendations,
    Carbon,
    DryRun,
    Budgets,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::ProjectedCosts,
        Feature::ActualCosts,
        Feature::Recommendations,
        Feature::Carbon,
        Feature::DryRun,
        Feature::Budgets,
    ];

    /// Default feature set assumed for plugins that report no capabilities.
    pub fn default_set() -> Vec<Feature> {
        vec![Feature::ProjectedCosts, Feature::ActualCosts]
    }

    /// Parse the exact, case-sensitive configured spelling. Returns `None`
    /// for anything outside the closed set (a router validation warning,
    /// not an error).
    pub fn parse(name: &str) -> Option<Feature> {
        match name {
            "ProjectedCosts" => Some(Feature::ProjectedCosts),
            "ActualCosts" => Some(Feature::ActualCosts),
            "Recommendations" => Some(Feature::Recommendations),
            "Carbon" => Some(Feature::Carbon),
            "DryRun" => Some(Feature::DryRun),
            "Budgets" => Some(Feature::Budgets),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::ProjectedCosts => "ProjectedCosts",
            Feature::ActualCosts => "ActualCosts",
            Feature::Recommendations => "Recommendations",
            Feature::Carbon => "Carbon",
            Feature::DryRun => "DryRun",
            Feature::Budgets => "Budgets",
        }
    }
}

/// A point-in-time sustainability metric value, e.g. carbon footprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SustainabilityMetric {
    pub value: f64,
    pub unit: String,
}

/// Map a raw plugin-reported metric kind to its canonical key.
pub fn canonical_metric_kind(raw: &str) -> String {
    match raw {
        "carbon_footprint" | "energy_consumption" | "water_usage" => raw.to_string(),
        "" => "unspecified".to_string(),
        other => other.to_lowercase(),
    }
}

/// Result of pricing a single resource, or a placeholder for one that failed.
///
/// A zero-valued `CostResult` whose `notes` begins with `"VALIDATION: "` or
/// `"ERROR: "` is a placeholder inserted to preserve index alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostResult {
    pub currency: String,
    pub monthly_cost: f64,
    pub hourly_cost: f64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub cost_breakdown: HashMap<String, f64>,
    #[serde(default)]
    pub sustainability: HashMap<String, SustainabilityMetric>,
}

impl CostResult {
    /// Construct a placeholder result for a resource that failed validation
    /// or the plugin RPC. `prefix` must be `"VALIDATION: "` or `"ERROR: "`.
    pub fn placeholder(prefix: &str, detail: &str) -> Self {
        Self {
            currency: "USD".to_string(),
            monthly_cost: 0.0,
            hourly_cost: 0.0,
            notes: format!("{prefix}{detail}"),
            cost_breakdown: HashMap::new(),
            sustainability: HashMap::new(),
        }
    }

    /// True if this is a placeholder emitted for a failed resource.
    pub fn is_placeholder(&self) -> bool {
        self.notes.starts_with("VALIDATION: ") || self.notes.starts_with("ERROR: ")
    }

    /// Deep-copy at plugin boundaries: new owned maps so later caller
    /// mutation can never reach plugin-held memory.
    pub fn deep_clone(&self) -> Self {
        Self {
            currency: self.currency.clone(),
            monthly_cost: self.monthly_cost,
            hourly_cost: self.hourly_cost,
            notes: self.notes.clone(),
            cost_breakdown: self.cost_breakdown.clone(),
            sustainability: self.sustainability.clone(),
        }
    }
}

/// Per-resource error captured during fan-out. Accumulates independently of
/// `CostResult`s so every resource still gets exactly one result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub resource_type: String,
    pub resource_id: String,
    pub plugin_name: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// A partial-result container: one `CostResult` per resource processed, plus
/// independently accumulated errors. Invariant: `results.len()` equals the
/// number of resources processed regardless of per-resource failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostResultWithErrors {
    pub results: Vec<CostResult>,
    pub errors: Vec<ErrorDetail>,
    /// Indices into `results` (within this batch) where the plugin
    /// responded successfully but reported zero records. Distinct from a
    /// `VALIDATION:`/`ERROR:` placeholder: the result at these indices is a
    /// genuine, non-failing `CostResult` that callers may still want to
    /// treat as a fallback trigger (§4.4.4(b)) rather than a final answer.
    #[serde(default)]
    pub empty_responses: Vec<usize>,
}

impl CostResultWithErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the errors as a human-readable summary, truncated to 5
    /// entries with a `"… and N more errors"` tail.
    pub fn summarize_errors(&self) -> String {
        summarize_errors(&self.errors)
    }

    pub fn extend(&mut self, mut other: CostResultWithErrors) {
        let offset = self.results.len();
        self.results.append(&mut other.results);
        self.errors.append(&mut other.errors);
        self.empty_responses
            .extend(other.empty_responses.iter().map(|i| i + offset));
    }
}

/// Truncate a list of errors to 5 entries with a `"… and N more errors"`
/// tail, for user-visible failure summaries.
pub fn summarize_errors(errors: &[ErrorDetail]) -> String {
    const LIMIT: usize = 5;
    if errors.is_empty() {
        return String::new();
    }
    let shown: Vec<String> = errors
        .iter()
        .take(LIMIT)
        .map(|e| format!("{}({}): {}", e.resource_type, e.resource_id, e.error))
        .collect();
    let mut out = shown.join("; ");
    if errors.len() > LIMIT {
        out.push_str(&format!(" … and {} more errors", errors.len() - LIMIT));
    }
    out
}

/// A recommendation returned by a plugin's `GetRecommendations` RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub category: String,
    pub action_type: RecommendationActionType,
    pub description: String,
    pub resource_id: String,
    pub source: String,
    pub impact: RecommendationImpact,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

/// The 11 canonical recommendation action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationActionType {
    Rightsize,
    Terminate,
    Stop,
    PurchaseReservation,
    PurchaseSavingsPlan,
    ChangeStorageTier,
    EnableAutoscaling,
    DeleteUnattached,
    Upgrade,
    Downgrade,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationImpact {
    pub estimated_savings: f64,
    pub currency: String,
    pub current_cost: f64,
    pub projected_cost: f64,
    pub savings_percentage: f64,
}

/// Projection period for a recommendations request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionPeriod {
    Daily,
    Monthly,
    Annual,
}

/// Request envelope for `GetRecommendations`, including pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsRequest {
    pub target_resources: Vec<String>,
    pub projection_period: ProjectionPeriod,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub page_token: String,
    #[serde(default)]
    pub excluded_recommendation_ids: Vec<String>,
}

fn default_page_size() -> u32 {
    50
}

pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub next_page_token: String,
}

/// Reason a recommendation was dismissed or snoozed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DismissalReason {
    NotApplicable,
    AcceptedRisk,
    PlannedChange,
    FalsePositive,
    CostNotSignificant,
    Other,
}

/// Request for `DismissRecommendation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissRequest {
    pub recommendation_id: String,
    pub reason: DismissalReason,
    #[serde(default)]
    pub custom_reason: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub dismissed_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissResponse {
    pub success: bool,
    pub message: String,
    pub dismissed_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub recommendation_id: String,
}
