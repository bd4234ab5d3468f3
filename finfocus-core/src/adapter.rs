//! # Plugin Adapter (C5)
//!
//! Translates between the internal resource model and the plugin wire
//! contract for the two cost fan-out entry points. Each resource in a
//! batch produces exactly one `CostResult` at the same index as its input,
//! whether that result came from a real plugin response or a validation /
//! transport-error placeholder (§4.5).

use crate::dimension::{self, EnvAccessor};
use crate::error::AdapterError;
use crate::models::{canonical_metric_kind, CostResult, CostResultWithErrors, ErrorDetail, ResourceDescriptor, SustainabilityMetric};
use crate::plugin::{
    GetActualCostRequest, GetProjectedCostRequest, ImpactMetric, PluginClient, PluginError,
    ProjectedCostResource,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn error_detail(resource: &ResourceDescriptor, plugin_name: &str, error: String) -> ErrorDetail {
    ErrorDetail {
        resource_type: resource.resource_type.clone(),
        resource_id: resource.id.clone(),
        plugin_name: plugin_name.to_string(),
        error,
        timestamp: now(),
    }
}

fn stringify_properties(props: &HashMap<String, serde_json::Value>) -> HashMap<String, String> {
    props
        .iter()
        .map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), s)
        })
        .collect()
}

fn sum_impact_metrics(metrics: &[ImpactMetric]) -> HashMap<String, SustainabilityMetric> {
    let mut out: HashMap<String, SustainabilityMetric> = HashMap::new();
    for m in metrics {
        let kind = canonical_metric_kind(&m.kind);
        out.entry(kind)
            .and_modify(|existing| existing.value += m.value)
            .or_insert(SustainabilityMetric {
                value: m.value,
                unit: String::new(),
            });
        // Unit strings are taken from the last occurrence for this kind.
        if let Some(entry) = out.get_mut(&canonical_metric_kind(&m.kind)) {
            entry.unit = m.unit.clone();
        }
    }
    out
}

/// Run the projected-cost fan-out over `resources` against a single
/// plugin client, processing resources in declared order.
pub async fn projected_cost_fan_out(
    client: &Arc<dyn PluginClient>,
    resources: &[ResourceDescriptor],
    env: &dyn EnvAccessor,
) -> CostResultWithErrors {
    let mut out = CostResultWithErrors::new();

    for resource in resources {
        let provider = if resource.provider.is_empty() {
            crate::pattern::extract_provider(&resource.resource_type)
        } else {
            resource.provider.clone()
        };

        let dim = dimension::resolve_dimension(
            &provider,
            &resource.resource_type,
            &resource.properties,
            env,
        );

        if provider.is_empty() || dim.sku.is_empty() || dim.region.is_empty() {
            let missing = [
                ("provider", provider.is_empty()),
                ("sku", dim.sku.is_empty()),
                ("region", dim.region.is_empty()),
            ]
            .into_iter()
            .filter(|(_, empty)| *empty)
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(", ");
            let detail = format!("pre-flight validation failed: missing {missing}");
            tracing::warn!(resource_type = %resource.resource_type, error = %detail, "projected cost pre-flight validation failed");
            out.errors
                .push(error_detail(resource, client.name(), detail.clone()));
            out.results.push(CostResult::placeholder("VALIDATION: ", &detail));
            continue;
        }

        let req = GetProjectedCostRequest {
            resource: ProjectedCostResource {
                id: resource.id.clone(),
                provider: provider.clone(),
                resource_type: resource.resource_type.clone(),
                sku: dim.sku.clone(),
                region: dim.region.clone(),
                tags: stringify_properties(&resource.properties),
            },
        };

        match client.get_projected_cost(req).await {
            Err(e) => {
                let detail = format!("plugin call failed: {e}");
                out.errors
                    .push(error_detail(resource, client.name(), detail.clone()));
                out.results.push(CostResult::placeholder("ERROR: ", &detail));
            }
            Ok(resp) if resp.records.is_empty() => {
                out.empty_responses.push(out.results.len());
                out.results.push(CostResult {
                    currency: "USD".to_string(),
                    monthly_cost: 0.0,
                    hourly_cost: 0.0,
                    notes: String::new(),
                    cost_breakdown: HashMap::from([("no_cost_records".to_string(), 0.0)]),
                    sustainability: HashMap::new(),
                });
            }
            Ok(resp) => {
                let mut monthly_cost = 0.0;
                let mut hourly_cost = 0.0;
                let mut cost_breakdown = HashMap::new();
                let mut sustainability: HashMap<String, SustainabilityMetric> = HashMap::new();
                let mut currency = "USD".to_string();

                for (i, record) in resp.records.iter().enumerate() {
                    currency = record.currency.clone();
                    monthly_cost += record.cost_per_month;
                    hourly_cost += record.cost_per_month / (30.0 * 24.0);
                    cost_breakdown.insert(format!("record_{i}"), record.cost_per_month);
                    for (kind, metric) in sum_impact_metrics(&record.impact_metrics) {
                        sustainability
                            .entry(kind)
                            .and_modify(|e| e.value += metric.value)
                            .or_insert(metric.clone())
                            .unit = metric.unit;
                    }
                }

                out.results.push(CostResult {
                    currency,
                    monthly_cost,
                    hourly_cost,
                    notes: String::new(),
                    cost_breakdown,
                    sustainability,
                });
            }
        }
    }

    out
}

/// Request envelope for the actual-cost fan-out, one call per resource
/// batch sharing a `(provider, resourceType, startTime, endTime)` window.
pub struct ActualCostBatchRequest {
    pub resource_ids: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub properties: Option<HashMap<String, serde_json::Value>>,
    pub provider: String,
    pub resource_type: String,
}

/// Run the actual-cost fan-out over a batch request. Returns
/// `AdapterError::PropertiesMultiResource` without per-resource work if
/// `properties` is set alongside more than one resource id.
pub async fn actual_cost_fan_out(
    client: &Arc<dyn PluginClient>,
    req: &ActualCostBatchRequest,
) -> Result<CostResultWithErrors, AdapterError> {
    if req.properties.is_some() && req.resource_ids.len() > 1 {
        return Err(AdapterError::PropertiesMultiResource);
    }

    let mut out = CostResultWithErrors::new();
    let empty_props = HashMap::new();
    let props = req.properties.as_ref().unwrap_or(&empty_props);

    for resource_id in &req.resource_ids {
        let identity = dimension::resolve_actual_cost_identity(resource_id, props);
        let mut tags = identity.tags.clone();
        let dim = dimension::resolve_dimension(&req.provider, &req.resource_type, props, &dimension::ProcessEnv);
        dimension::enrich_tags(&mut tags, &req.provider, &dim);

        let resource = ResourceDescriptor {
            id: resource_id.clone(),
            resource_type: req.resource_type.clone(),
            provider: req.provider.clone(),
            properties: props.clone(),
        };

        if identity.cloud_id.is_empty() || req.end_time <= req.start_time {
            let detail = "pre-flight validation failed: empty resource id or inverted time range"
                .to_string();
            out.errors
                .push(error_detail(&resource, client.name(), detail.clone()));
            out.results.push(CostResult::placeholder("VALIDATION: ", &detail));
            continue;
        }

        let wire_req = GetActualCostRequest {
            resource_id: identity.cloud_id.clone(),
            start: req.start_time,
            end: req.end_time,
            tags,
            arn: identity.arn.clone(),
        };

        match client.get_actual_cost(wire_req).await {
            Err(e) => {
                let detail = format!("plugin call failed: {e}");
                out.errors
                    .push(error_detail(&resource, client.name(), detail.clone()));
                out.results.push(CostResult::placeholder("ERROR: ", &detail));
            }
            Ok(resp) if resp.results.is_empty() => {
                out.results.push(CostResult {
                    currency: "USD".to_string(),
                    monthly_cost: 0.0,
                    hourly_cost: 0.0,
                    notes: String::new(),
                    cost_breakdown: HashMap::new(),
                    sustainability: HashMap::new(),
                });
            }
            Ok(resp) => {
                let mut cost_breakdown = HashMap::new();
                let mut sustainability: HashMap<String, SustainabilityMetric> = HashMap::new();
                let mut total = 0.0;

                for record in &resp.results {
                    total += record.cost;
                    cost_breakdown.insert(record.source.clone(), record.cost);
                    for (kind, metric) in sum_impact_metrics(&record.impact_metrics) {
                        sustainability
                            .entry(kind)
                            .and_modify(|e| e.value += metric.value)
                            .or_insert(metric.clone())
                            .unit = metric.unit;
                    }
                }

                // Deep-copy at the boundary: owned, freshly allocated maps.
                let result = CostResult {
                    currency: "USD".to_string(),
                    monthly_cost: total,
                    hourly_cost: total / (30.0 * 24.0),
                    notes: String::new(),
                    cost_breakdown,
                    sustainability,
                }
                .deep_clone();
                out.results.push(result);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::ProcessEnv;
    use crate::models::{
        DismissRequest, DismissResponse, PluginMetadata, RecommendationsRequest,
        RecommendationsResponse,
    };
    use crate::plugin::{
        ActualCostRecord, DryRunResponse, GetActualCostResponse, GetBudgetsRequest,
        GetBudgetsResponse, GetProjectedCostResponse, ProjectedCostRecord,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockClient {
        projected: Mutex<Vec<ProjectedCostRecord>>,
        actual: Mutex<Vec<ActualCostRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl PluginClient for MockClient {
        fn name(&self) -> &str {
            "mock"
        }
        async fn get_plugin_info(&self) -> Result<PluginMetadata, PluginError> {
            Ok(PluginMetadata::default())
        }
        async fn get_projected_cost(
            &self,
            _req: GetProjectedCostRequest,
        ) -> Result<GetProjectedCostResponse, PluginError> {
            if self.fail {
                return Err(PluginError::Transport("boom".to_string()));
            }
            Ok(GetProjectedCostResponse {
                records: self.projected.lock().unwrap().clone(),
            })
        }
        async fn get_actual_cost(
            &self,
            _req: GetActualCostRequest,
        ) -> Result<GetActualCostResponse, PluginError> {
            if self.fail {
                return Err(PluginError::Transport("boom".to_string()));
            }
            Ok(GetActualCostResponse {
                results: self.actual.lock().unwrap().clone(),
            })
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

    fn resource(id: &str, rtype: &str, props: &[(&str, &str)]) -> ResourceDescriptor {
        ResourceDescriptor {
            id: id.to_string(),
            resource_type: rtype.to_string(),
            provider: String::new(),
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
        }
    }

    #[tokio::test]
    async fn projected_cost_validation_failure_skips_plugin_call() {
        let client: Arc<dyn PluginClient> = Arc::new(MockClient {
            projected: Mutex::new(vec![]),
            actual: Mutex::new(vec![]),
            fail: true,
        });
        let resources = vec![resource("r1", "aws:ec2/instance:Instance", &[])];
        let result = projected_cost_fan_out(&client, &resources, &ProcessEnv).await;
        assert_eq!(result.results.len(), 1);
        assert!(result.results[0].notes.starts_with("VALIDATION: "));
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn projected_cost_success_preserves_index_alignment() {
        let client: Arc<dyn PluginClient> = Arc::new(MockClient {
            projected: Mutex::new(vec![ProjectedCostRecord {
                currency: "USD".to_string(),
                cost_per_month: 72.0,
                unit_price: 0.1,
                billing_detail: String::new(),
                impact_metrics: vec![],
            }]),
            actual: Mutex::new(vec![]),
            fail: false,
        });
        let resources = vec![
            resource("r1", "aws:ec2/instance:Instance", &[("instanceType", "t3.micro"), ("region", "us-east-1")]),
            resource("r2", "aws:ec2/instance:Instance", &[]),
        ];
        let result = projected_cost_fan_out(&client, &resources, &ProcessEnv).await;
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].monthly_cost, 72.0);
        assert!(result.results[1].is_placeholder());
    }

    #[tokio::test]
    async fn actual_cost_rejects_multi_resource_with_properties() {
        let client: Arc<dyn PluginClient> = Arc::new(MockClient {
            projected: Mutex::new(vec![]),
            actual: Mutex::new(vec![]),
            fail: false,
        });
        let mut props = HashMap::new();
        props.insert("pulumi:cloudId".to_string(), serde_json::json!("i-123"));
        let req = ActualCostBatchRequest {
            resource_ids: vec!["r1".to_string(), "r2".to_string()],
            start_time: Utc::now() - chrono::Duration::days(1),
            end_time: Utc::now(),
            properties: Some(props),
            provider: "aws".to_string(),
            resource_type: "aws:ec2/instance:Instance".to_string(),
        };
        let err = actual_cost_fan_out(&client, &req).await.unwrap_err();
        assert!(matches!(err, AdapterError::PropertiesMultiResource));
    }

    #[tokio::test]
    async fn actual_cost_sums_sustainability_metrics() {
        let client: Arc<dyn PluginClient> = Arc::new(MockClient {
            projected: Mutex::new(vec![]),
            actual: Mutex::new(vec![
                ActualCostRecord {
                    cost: 10.0,
                    source: "compute".to_string(),
                    impact_metrics: vec![ImpactMetric {
                        kind: "carbon_footprint".to_string(),
                        value: 1.5,
                        unit: "kgCO2e".to_string(),
                    }],
                },
                ActualCostRecord {
                    cost: 5.0,
                    source: "storage".to_string(),
                    impact_metrics: vec![ImpactMetric {
                        kind: "carbon_footprint".to_string(),
                        value: 0.5,
                        unit: "kgCO2e".to_string(),
                    }],
                },
            ]),
            fail: false,
        });
        let req = ActualCostBatchRequest {
            resource_ids: vec!["r1".to_string()],
            start_time: Utc::now() - chrono::Duration::days(1),
            end_time: Utc::now(),
            properties: None,
            provider: "aws".to_string(),
            resource_type: "aws:ec2/instance:Instance".to_string(),
        };
        let result = actual_cost_fan_out(&client, &req).await.unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].monthly_cost, 15.0);
        let carbon = result.results[0].sustainability.get("carbon_footprint").unwrap();
        assert_eq!(carbon.value, 2.0);
    }

    #[tokio::test]
    async fn actual_cost_validation_failure_on_inverted_time_range() {
        let client: Arc<dyn PluginClient> = Arc::new(MockClient {
            projected: Mutex::new(vec![]),
            actual: Mutex::new(vec![]),
            fail: false,
        });
        let req = ActualCostBatchRequest {
            resource_ids: vec!["r1".to_string()],
            start_time: Utc::now(),
            end_time: Utc::now() - chrono::Duration::days(1),
            properties: None,
            provider: "aws".to_string(),
            resource_type: "aws:ec2/instance:Instance".to_string(),
        };
        let result = actual_cost_fan_out(&client, &req).await.unwrap();
        assert!(result.results[0].is_placeholder());
    }
}
