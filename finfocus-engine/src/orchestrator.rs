//! # Orchestrator (C7)
//!
//! Ties the router, adapter, dismissal store and budget evaluator
//! together for a batch of resources. Pulumi-internal resources are
//! filtered up front (§4.4.5); each resource's match chain is walked via
//! `finfocus_core::adapter`, trying successive matches while
//! `match.fallback` allows it. Resources that currently share the same
//! match-chain head plugin are batched into one adapter call so the
//! "fan out across resources and plugins concurrently" requirement (§5)
//! holds without breaking the per-call ordering invariant (§4.5.1), which
//! only constrains ordering *within* a single adapter call.

use crate::budget::{Allocation, BudgetError, BudgetEvaluator, BudgetResult};
use crate::config::ScopedBudgetsConfig;
use crate::dismissal::DismissalStore;
use chrono::Utc;
use finfocus_core::dimension::ProcessEnv;
use finfocus_core::models::{
    CostResult, CostResultWithErrors, ErrorDetail, PluginMetadata, ResourceDescriptor,
};
use finfocus_core::plugin::PluginClient;
use finfocus_core::router::{PluginMatch, Router};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fetch `GetPluginInfo` for every client known to `router`, concurrently.
/// A plugin whose call fails falls back to default (global) metadata rather
/// than aborting the batch — automatic matching then treats it as
/// provider-unscoped, the same as an unconfigured plugin.
async fn fetch_metadata(router: &Router) -> HashMap<String, PluginMetadata> {
    let futures = router.clients().iter().map(|client| {
        let client = client.clone();
        async move {
            let name = client.name().to_string();
            match client.get_plugin_info().await {
                Ok(meta) => (name, meta),
                Err(e) => {
                    tracing::warn!(plugin = %name, error = %e, "get_plugin_info failed, treating as global match");
                    (name, PluginMetadata::default())
                }
            }
        }
    });
    futures::future::join_all(futures).await.into_iter().collect()
}

/// Output of a projected-cost orchestration pass.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationResult {
    pub results: Vec<CostResult>,
    pub errors: Vec<ErrorDetail>,
    pub budget_result: Option<BudgetResult>,
}

/// Coordinates the router, adapter and budget evaluator across a resource
/// batch. Holds no state of its own beyond borrowed references; construct
/// fresh per invocation.
pub struct Orchestrator<'a> {
    router: &'a Router,
    budgets: &'a ScopedBudgetsConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(router: &'a Router, budgets: &'a ScopedBudgetsConfig) -> Self {
        Self { router, budgets }
    }

    /// Run the projected-cost path over a resource batch for the given
    /// feature filter, then evaluate the resulting costs against the
    /// scoped budget configuration.
    pub async fn orchestrate_projected_costs(
        &self,
        resources: Vec<ResourceDescriptor>,
        feature: Option<&str>,
    ) -> OrchestrationResult {
        let routable: Vec<ResourceDescriptor> = resources
            .into_iter()
            .filter(|r| !r.is_pulumi_internal())
            .collect();

        let metadata = fetch_metadata(self.router).await;
        let mut chains: Vec<Vec<PluginMatch>> = routable
            .iter()
            .map(|r| {
                self.router
                    .select_plugins_with_metadata(&r.resource_type, feature, &metadata)
            })
            .collect();

        // index -> finalized result, filled in as each resource's chain
        // resolves or is exhausted.
        let mut finalized: Vec<Option<CostResult>> = vec![None; routable.len()];
        let mut errors: Vec<ErrorDetail> = Vec::new();

        // pending[i] = how many chain entries into resource i we've already
        // consumed (so chains[i][pending[i]] is the next candidate).
        let mut cursor: Vec<usize> = vec![0; routable.len()];

        loop {
            // Group resources whose chain still has a candidate by that
            // candidate plugin's name, so one adapter call serves a wave of
            // same-plugin resources (sequential within, concurrent across
            // plugins in the wave).
            let mut groups: HashMap<String, (Arc<dyn PluginClient>, Vec<usize>)> = HashMap::new();
            for (i, chain) in chains.iter().enumerate() {
                if finalized[i].is_some() {
                    continue;
                }
                if cursor[i] >= chain.len() {
                    // Chain exhausted with no result: last resort placeholder.
                    continue;
                }
                let m = &chain[cursor[i]];
                groups
                    .entry(m.client.name().to_string())
                    .or_insert_with(|| (m.client.clone(), Vec::new()))
                    .1
                    .push(i);
            }

            if groups.is_empty() {
                break;
            }

            let futures = groups.into_iter().map(|(_, (client, indices))| {
                let batch: Vec<ResourceDescriptor> =
                    indices.iter().map(|&i| routable[i].clone()).collect();
                async move {
                    let out =
                        finfocus_core::adapter::projected_cost_fan_out(&client, &batch, &ProcessEnv)
                            .await;
                    (indices, out)
                }
            });

            let wave_results = futures::future::join_all(futures).await;

            for (indices, out) in wave_results {
                let empty_positions: HashSet<usize> =
                    out.empty_responses.iter().copied().collect();
                for (pos, &i) in indices.iter().enumerate() {
                    let result = out.results[pos].clone();
                    let chain = &chains[i];
                    let m = &chain[cursor[i]];
                    // Fallback triggers on (a) a transport/validation
                    // placeholder, or (b) a plugin reporting zero records
                    // (§4.4.4) — the latter is still a genuine, non-error
                    // CostResult, so it's only discarded if a later match
                    // in the chain succeeds.
                    let triggers_fallback = result.is_placeholder() || empty_positions.contains(&pos);

                    if !triggers_fallback || !m.fallback {
                        finalized[i] = Some(result);
                    } else {
                        cursor[i] += 1;
                        // Only keep this attempt's errors if we're giving up
                        // on the resource; otherwise the next match may
                        // still succeed. Either way the attempt is recorded
                        // so failures are never silently dropped.
                    }
                    errors.extend(
                        out.errors
                            .iter()
                            .filter(|e| e.resource_id == routable[i].id)
                            .cloned(),
                    );
                }
            }
        }

        let mut results = Vec::with_capacity(routable.len());
        for (i, slot) in finalized.into_iter().enumerate() {
            results.push(slot.unwrap_or_else(|| {
                CostResult::placeholder("ERROR: ", "no plugin matched or all fallbacks exhausted")
                    .tap_error(&routable[i], &mut errors)
            }));
        }

        let allocations: Vec<Allocation> = routable
            .iter()
            .zip(results.iter())
            .map(|(resource, result)| Allocation {
                resource_type: resource.resource_type.clone(),
                tags: resource
                    .properties
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect(),
                cost: result.monthly_cost,
                currency: result.currency.clone(),
            })
            .collect();

        let mut evaluator = BudgetEvaluator::new(self.budgets);
        for allocation in &allocations {
            evaluator.record(allocation);
        }
        let budget_result = evaluator.evaluate(Utc::now()).ok();

        OrchestrationResult {
            results,
            errors,
            budget_result,
        }
    }

    /// Build the `excludedRecommendationIds` list for a `GetRecommendations`
    /// call from the dismissal store's currently dismissed/snoozed ids.
    pub fn excluded_recommendation_ids(store: &DismissalStore) -> Vec<String> {
        store.get_dismissed_ids()
    }
}

trait TapError {
    fn tap_error(self, resource: &ResourceDescriptor, errors: &mut Vec<ErrorDetail>) -> CostResult;
}

impl TapError for CostResult {
    fn tap_error(self, resource: &ResourceDescriptor, errors: &mut Vec<ErrorDetail>) -> CostResult {
        errors.push(ErrorDetail {
            resource_type: resource.resource_type.clone(),
            resource_id: resource.id.clone(),
            plugin_name: String::new(),
            error: "no plugin matched or all fallbacks exhausted".to_string(),
            timestamp: Utc::now(),
        });
        self
    }
}

pub fn summarize(result: &CostResultWithErrors) -> String {
    finfocus_core::models::summarize_errors(&result.errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finfocus_core::models::{
        DismissRequest, DismissResponse, PluginMetadata, RecommendationsRequest,
        RecommendationsResponse,
    };
    use finfocus_core::plugin::{
        DryRunResponse, GetActualCostRequest, GetActualCostResponse, GetBudgetsRequest,
        GetBudgetsResponse, GetProjectedCostRequest, GetProjectedCostResponse, PluginError,
        ProjectedCostRecord, ProjectedCostResource,
    };
    use finfocus_core::router::PluginRouting;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    #[derive(Default)]
    struct StubClient {
        name: String,
        fail: bool,
        /// Succeeds but reports zero records (§4.4.4(b) fallback trigger).
        empty: bool,
        cost_per_month: f64,
        supported_providers: Vec<String>,
    }

    #[async_trait]
    impl PluginClient for StubClient {
        fn name(&self) -> &str {
            &self.name
        }
        async fn get_plugin_info(&self) -> Result<PluginMetadata, PluginError> {
            Ok(PluginMetadata {
                supported_providers: self.supported_providers.clone(),
                ..Default::default()
            })
        }
        async fn get_projected_cost(
            &self,
            _req: GetProjectedCostRequest,
        ) -> Result<GetProjectedCostResponse, PluginError> {
            if self.fail {
                return Err(PluginError::Transport("down".to_string()));
            }
            if self.empty {
                return Ok(GetProjectedCostResponse { records: vec![] });
            }
            Ok(GetProjectedCostResponse {
                records: vec![ProjectedCostRecord {
                    currency: "USD".to_string(),
                    cost_per_month: self.cost_per_month,
                    unit_price: 0.0,
                    billing_detail: String::new(),
                    impact_metrics: vec![],
                }],
            })
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
            Err(PluginError::Transport("unused".to_string()))
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

    fn resource(id: &str) -> ResourceDescriptor {
        resource_of_type(id, "aws:ec2/instance:Instance")
    }

    fn resource_of_type(id: &str, resource_type: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            id: id.to_string(),
            resource_type: resource_type.to_string(),
            provider: String::new(),
            properties: Map::from([
                ("instanceType".to_string(), serde_json::json!("t3.micro")),
                ("region".to_string(), serde_json::json!("us-east-1")),
            ]),
        }
    }

    #[tokio::test]
    async fn pulumi_internal_resources_are_filtered() {
        let router = Router::new(
            vec![Arc::new(StubClient {
                name: "aws-public".to_string(),
                cost_per_month: 10.0,
                ..Default::default()
            })],
            vec![],
        )
        .unwrap();
        let budgets = ScopedBudgetsConfig::default();
        let orchestrator = Orchestrator::new(&router, &budgets);

        let resources = vec![ResourceDescriptor {
            id: "internal".to_string(),
            resource_type: "pulumi:providers:aws".to_string(),
            provider: String::new(),
            properties: Map::new(),
        }];

        let result = orchestrator
            .orchestrate_projected_costs(resources, None)
            .await;
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn fallback_to_next_match_on_failure() {
        let router = Router::new(
            vec![
                Arc::new(StubClient {
                    name: "primary".to_string(),
                    fail: true,
                    ..Default::default()
                }),
                Arc::new(StubClient {
                    name: "secondary".to_string(),
                    cost_per_month: 42.0,
                    ..Default::default()
                }),
            ],
            vec![PluginRouting {
                name: "primary".to_string(),
                priority: 10,
                ..Default::default()
            }],
        )
        .unwrap();
        let budgets = ScopedBudgetsConfig::default();
        let orchestrator = Orchestrator::new(&router, &budgets);

        let result = orchestrator
            .orchestrate_projected_costs(vec![resource("r1")], None)
            .await;
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].monthly_cost, 42.0);
    }

    #[tokio::test]
    async fn no_fallback_stops_chain_on_failure() {
        let router = Router::new(
            vec![
                Arc::new(StubClient {
                    name: "primary".to_string(),
                    fail: true,
                    ..Default::default()
                }),
                Arc::new(StubClient {
                    name: "secondary".to_string(),
                    cost_per_month: 42.0,
                    ..Default::default()
                }),
            ],
            vec![PluginRouting {
                name: "primary".to_string(),
                priority: 10,
                fallback: finfocus_core::router::FallbackSetting::Disabled,
                ..Default::default()
            }],
        )
        .unwrap();
        let budgets = ScopedBudgetsConfig::default();
        let orchestrator = Orchestrator::new(&router, &budgets);

        let result = orchestrator
            .orchestrate_projected_costs(vec![resource("r1")], None)
            .await;
        assert_eq!(result.results.len(), 1);
        assert!(result.results[0].is_placeholder());
    }

    #[tokio::test]
    async fn empty_response_triggers_fallback_to_next_match() {
        let router = Router::new(
            vec![
                Arc::new(StubClient {
                    name: "primary".to_string(),
                    empty: true,
                    ..Default::default()
                }),
                Arc::new(StubClient {
                    name: "secondary".to_string(),
                    cost_per_month: 42.0,
                    ..Default::default()
                }),
            ],
            vec![PluginRouting {
                name: "primary".to_string(),
                priority: 10,
                ..Default::default()
            }],
        )
        .unwrap();
        let budgets = ScopedBudgetsConfig::default();
        let orchestrator = Orchestrator::new(&router, &budgets);

        let result = orchestrator
            .orchestrate_projected_costs(vec![resource("r1")], None)
            .await;
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].monthly_cost, 42.0);
    }

    #[tokio::test]
    async fn empty_response_without_fallback_finalizes_as_zero_cost() {
        let router = Router::new(
            vec![Arc::new(StubClient {
                name: "only".to_string(),
                empty: true,
                ..Default::default()
            })],
            vec![PluginRouting {
                name: "only".to_string(),
                fallback: finfocus_core::router::FallbackSetting::Disabled,
                ..Default::default()
            }],
        )
        .unwrap();
        let budgets = ScopedBudgetsConfig::default();
        let orchestrator = Orchestrator::new(&router, &budgets);

        let result = orchestrator
            .orchestrate_projected_costs(vec![resource("r1")], None)
            .await;
        assert_eq!(result.results.len(), 1);
        assert!(!result.results[0].is_placeholder());
        assert_eq!(result.results[0].monthly_cost, 0.0);
        assert!(result.results[0].cost_breakdown.contains_key("no_cost_records"));
    }

    #[tokio::test]
    async fn automatic_matching_routes_by_supported_provider() {
        let router = Router::new(
            vec![
                Arc::new(StubClient {
                    name: "aws-public".to_string(),
                    cost_per_month: 10.0,
                    supported_providers: vec!["aws".to_string()],
                    ..Default::default()
                }),
                Arc::new(StubClient {
                    name: "gcp-public".to_string(),
                    cost_per_month: 20.0,
                    supported_providers: vec!["gcp".to_string()],
                    ..Default::default()
                }),
            ],
            vec![],
        )
        .unwrap();
        let budgets = ScopedBudgetsConfig::default();
        let orchestrator = Orchestrator::new(&router, &budgets);

        let gcp_resource = ResourceDescriptor {
            id: "r1".to_string(),
            resource_type: "gcp:compute/instance:Instance".to_string(),
            provider: String::new(),
            properties: Map::from([
                ("machineType".to_string(), serde_json::json!("n1-standard-1")),
                ("zone".to_string(), serde_json::json!("us-central1-a")),
            ]),
        };

        let result = orchestrator
            .orchestrate_projected_costs(vec![gcp_resource], None)
            .await;
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].monthly_cost, 20.0);
    }
}
