//! # Plugin RPC Contract
//!
//! Wire-level request/response types for the plugin service, and the
//! `PluginClient` capability trait the router and adapter depend on. The
//! shapes here mirror the schema-frozen RPC contract; implementors live in
//! the external pluginhost collaborator and are handed in as opaque
//! `Arc<dyn PluginClient>` values.

use crate::models::{
    DismissRequest, DismissResponse, PluginMetadata, RecommendationsRequest,
    RecommendationsResponse,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single resource as presented to `GetProjectedCost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedCostResource {
    pub id: String,
    pub provider: String,
    pub resource_type: String,
    pub sku: String,
    pub region: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProjectedCostRequest {
    pub resource: ProjectedCostResource,
}

/// A single impact metric as reported by a plugin (sustainability or
/// otherwise); `kind` is mapped through [`crate::models::canonical_metric_kind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactMetric {
    pub kind: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedCostRecord {
    pub currency: String,
    pub cost_per_month: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub billing_detail: String,
    #[serde(default)]
    pub impact_metrics: Vec<ImpactMetric>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetProjectedCostResponse {
    #[serde(default)]
    pub records: Vec<ProjectedCostRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetActualCostRequest {
    pub resource_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub arn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActualCostRecord {
    pub cost: f64,
    pub source: String,
    #[serde(default)]
    pub impact_metrics: Vec<ImpactMetric>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetActualCostResponse {
    #[serde(default)]
    pub results: Vec<ActualCostRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DryRunResponse {
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetBudgetsRequest {
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub total_allocated: f64,
    pub total_spent: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetBudgetsResponse {
    #[serde(default)]
    pub budgets: Vec<serde_json::Value>,
    pub summary: Option<BudgetSummary>,
}

/// Transport-level error from a plugin RPC. The adapter never propagates
/// this directly to callers; it is always wrapped into an `ErrorDetail`
/// plus a placeholder `CostResult` so sibling resources keep processing.
#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    #[error("plugin transport error: {0}")]
    Transport(String),
    #[error("plugin call cancelled")]
    Cancelled,
}

/// Capability trait for a plugin client, mirroring the RPC contract in
/// §6.2. Implementations are owned by the external pluginhost collaborator;
/// the core only holds and calls through `Arc<dyn PluginClient>`.
///
/// `EstimateCost` is intentionally absent: no example usage or invariant in
/// the contract currently calls for it (see the design notes).
#[async_trait]
pub trait PluginClient: Send + Sync {
    fn name(&self) -> &str;

    async fn get_plugin_info(&self) -> Result<PluginMetadata, PluginError>;

    async fn get_projected_cost(
        &self,
        req: GetProjectedCostRequest,
    ) -> Result<GetProjectedCostResponse, PluginError>;

    async fn get_actual_cost(
        &self,
        req: GetActualCostRequest,
    ) -> Result<GetActualCostResponse, PluginError>;

    async fn get_recommendations(
        &self,
        req: RecommendationsRequest,
    ) -> Result<RecommendationsResponse, PluginError>;

    async fn dismiss_recommendation(
        &self,
        req: DismissRequest,
    ) -> Result<DismissResponse, PluginError>;

    async fn get_budgets(
        &self,
        req: GetBudgetsRequest,
    ) -> Result<GetBudgetsResponse, PluginError>;

    async fn dry_run(&self, resource: ProjectedCostResource) -> Result<DryRunResponse, PluginError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoClient;

    #[async_trait]
    impl PluginClient for EchoClient {
        fn name(&self) -> &str {
            "echo"
        }

        async fn get_plugin_info(&self) -> Result<PluginMetadata, PluginError> {
            Ok(PluginMetadata::default())
        }

        async fn get_projected_cost(
            &self,
            _req: GetProjectedCostRequest,
        ) -> Result<GetProjectedCostResponse, PluginError> {
            Ok(GetProjectedCostResponse::default())
        }

        async fn get_actual_cost(
            &self,
            _req: GetActualCostRequest,
        ) -> Result<GetActualCostResponse, PluginError> {
            Ok(GetActualCostResponse::default())
        }

        async fn get_recommendations(
            &self,
            _req: RecommendationsRequest,
        ) -> Result<RecommendationsResponse, PluginError> {
            Ok(RecommendationsResponse::default())
        }

        async fn dismiss_recommendation(
            &self,
            _req: DismissRequest,
        ) -> Result<DismissResponse, PluginError> {
            Err(PluginError::Transport("not implemented".to_string()))
        }

        async fn get_budgets(
            &self,
            _req: GetBudgetsRequest,
        ) -> Result<GetBudgetsResponse, PluginError> {
            Ok(GetBudgetsResponse::default())
        }

        async fn dry_run(
            &self,
            _resource: ProjectedCostResource,
        ) -> Result<DryRunResponse, PluginError> {
            Ok(DryRunResponse::default())
        }
    }

    #[tokio::test]
    async fn plugin_client_trait_object_is_usable() {
        let client: std::sync::Arc<dyn PluginClient> = std::sync::Arc::new(EchoClient);
        assert_eq!(client.name(), "echo");
        let info = client.get_plugin_info().await.unwrap();
        assert!(info.supported_providers.is_empty());
    }
}
