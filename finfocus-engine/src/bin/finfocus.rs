//! # FinFocus Binary
//!
//! Command-line entry point that loads a routing/budget configuration, a
//! JSON resource batch, and reports projected costs plus scoped budget
//! health. Plugin clients are wired in by the embedding host; this binary
//! wires up the handful that are configured by name in `routing.plugins`
//! and falls back to a no-op client for everything else, which is enough
//! to exercise the full orchestration path without a live plugin process.
//!
//! ## Usage
//!
//! ```bash
//! # Basic usage with default configuration
//! finfocus --config finfocus.yaml --resources resources.json
//!
//! # Debug logging
//! finfocus --config finfocus.yaml --resources resources.json --log-level debug
//! ```
//!
//! ## Command Line Arguments
//!
//! - `--config, -c`: Path to the YAML configuration file (default: finfocus.yaml)
//! - `--resources, -r`: Path to a JSON array of `ResourceDescriptor` values
//! - `--log-level`: Logging level (default: info)

use clap::Parser;
use finfocus_core::models::{
    DismissRequest, DismissResponse, PluginMetadata, RecommendationsRequest, RecommendationsResponse,
    ResourceDescriptor,
};
use finfocus_core::plugin::{
    DryRunResponse, GetActualCostRequest, GetActualCostResponse, GetBudgetsRequest,
    GetBudgetsResponse, GetProjectedCostRequest, GetProjectedCostResponse, PluginClient,
    PluginError, ProjectedCostResource,
};
use finfocus_core::router::Router;
use finfocus_engine::config::FinFocusConfig;
use finfocus_engine::orchestrator::Orchestrator;
use std::sync::Arc;

/// Command line arguments for the FinFocus CLI.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "finfocus.yaml")]
    config: String,

    /// Path to a JSON array of resources to price.
    #[arg(short, long)]
    resources: String,

    /// Logging level for the application.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// A plugin client stand-in with no backing pricing data, used for any
/// configured plugin name this binary doesn't have a live connection for.
struct NoopClient {
    name: String,
}

#[async_trait::async_trait]
impl PluginClient for NoopClient {
    fn name(&self) -> &str {
        &self.name
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
        Err(PluginError::Transport(
            "no live plugin connection configured".to_string(),
        ))
    }

    async fn get_budgets(
        &self,
        _req: GetBudgetsRequest,
    ) -> Result<GetBudgetsResponse, PluginError> {
        Ok(GetBudgetsResponse::default())
    }

    async fn dry_run(&self, _resource: ProjectedCostResource) -> Result<DryRunResponse, PluginError> {
        Ok(DryRunResponse::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let config = FinFocusConfig::load(&args.config)?;

    let clients: Vec<Arc<dyn PluginClient>> = config
        .routing
        .plugins
        .iter()
        .map(|p| {
            Arc::new(NoopClient {
                name: p.name.clone(),
            }) as Arc<dyn PluginClient>
        })
        .collect();

    let routings = config
        .routing
        .plugins
        .iter()
        .map(|p| p.to_core())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!(e))?;

    let router = Router::new(clients, routings)?;
    let validation = router.validate();
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }
    if !validation.is_valid() {
        anyhow::bail!("router configuration invalid: {:?}", validation.errors);
    }

    let resource_json = std::fs::read_to_string(&args.resources)?;
    let resources: Vec<ResourceDescriptor> = serde_json::from_str(&resource_json)?;

    let orchestrator = Orchestrator::new(&router, &config.cost.scoped_budgets);
    let result = orchestrator
        .orchestrate_projected_costs(resources, Some("ProjectedCosts"))
        .await;

    let total_monthly: f64 = result.results.iter().map(|r| r.monthly_cost).sum();
    tracing::info!(
        resources = result.results.len(),
        total_monthly_cost = total_monthly,
        errors = result.errors.len(),
        "projected cost run complete"
    );

    if let Some(budget_result) = &result.budget_result {
        for scope in &budget_result.scopes {
            tracing::info!(
                scope = %scope.scope,
                percentage = scope.percentage,
                health = ?scope.health,
                "budget scope evaluated"
            );
        }
        if let Some(overall) = budget_result.overall_health {
            tracing::info!(overall_health = ?overall, "overall budget health");
        }
    }

    if !result.errors.is_empty() {
        tracing::warn!(summary = %finfocus_core::models::summarize_errors(&result.errors), "errors occurred during pricing");
    }

    println!("{}", serde_json::to_string_pretty(&result.results)?);

    Ok(())
}
