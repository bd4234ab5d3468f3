//! # Scoped Budget Evaluator (C6)
//!
//! Evaluates a stream of per-resource cost allocations against a
//! `ScopedBudgetsConfig` across four scope levels (global, provider, tag
//! selector, type), producing a health status per scope and an overall
//! worst-case health.

use crate::config::{BudgetEntry, ScopedBudgetsConfig};
use chrono::{DateTime, Datelike, Utc};
use finfocus_core::pattern::extract_provider;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Health {
    Healthy,
    Ok,
    Warning,
    Critical,
    Exceeded,
}

impl Health {
    fn from_percentage(pct: f64, has_critical_band: bool) -> Self {
        if pct > 100.0 {
            Health::Exceeded
        } else if has_critical_band && pct >= 90.0 {
            Health::Critical
        } else if pct >= 80.0 {
            Health::Warning
        } else if pct >= 50.0 {
            Health::Ok
        } else {
            Health::Healthy
        }
    }
}

#[derive(Debug, Clone)]
pub struct Forecast {
    pub current_spend: f64,
    pub forecast: f64,
    pub day_of_month: u32,
    pub days_in_month: u32,
}

fn days_in_month(dt: DateTime<Utc>) -> u32 {
    let (year, month) = (dt.year(), dt.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap();
    let first_of_this = chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    (first_of_next - first_of_this).num_days() as u32
}

fn compute_forecast(current_spend: f64, now: DateTime<Utc>) -> Forecast {
    let day = now.day();
    let days = days_in_month(now);
    let forecast = current_spend / day as f64 * days as f64;
    Forecast {
        current_spend,
        forecast,
        day_of_month: day,
        days_in_month: days,
    }
}

#[derive(Debug, Clone)]
pub struct ScopeStatus {
    pub scope: String,
    pub amount: f64,
    pub currency: String,
    pub current_spend: f64,
    pub percentage: f64,
    pub health: Health,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, Default)]
pub struct BudgetResult {
    pub scopes: Vec<ScopeStatus>,
    pub overall_health: Option<Health>,
    pub critical_scopes: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum BudgetError {
    #[error("currency mismatch for scope {scope}: budget is {budget_currency} but spend is {spend_currency}")]
    CurrencyMismatch {
        scope: String,
        budget_currency: String,
        spend_currency: String,
    },
    #[error("negative current spend for scope {scope}: {amount}")]
    NegativeSpend { scope: String, amount: f64 },
    #[error("budget for scope {scope} is disabled (amount == 0)")]
    DisabledBudget { scope: String },
}

/// One resource's cost allocation, as fed to the evaluator.
pub struct Allocation {
    pub resource_type: String,
    pub tags: HashMap<String, String>,
    pub cost: f64,
    pub currency: String,
}

fn tag_selector_matches(selector: &str, tags: &HashMap<String, String>) -> bool {
    match selector.split_once(':') {
        Some((k, "*")) => tags.contains_key(k),
        Some((k, v)) => tags.get(k).map(|tv| tv == v).unwrap_or(false),
        None => false,
    }
}

/// Accumulate allocations into per-scope spend, then evaluate each scope
/// against its budget definition.
pub struct BudgetEvaluator<'a> {
    config: &'a ScopedBudgetsConfig,
    spend_by_scope: HashMap<String, f64>,
    currency_by_scope: HashMap<String, String>,
    warnings: Vec<String>,
}

impl<'a> BudgetEvaluator<'a> {
    pub fn new(config: &'a ScopedBudgetsConfig) -> Self {
        Self {
            config,
            spend_by_scope: HashMap::new(),
            currency_by_scope: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a single allocation's contribution to every scope it belongs
    /// to (§4.6: global always; provider/type if a matching budget exists;
    /// every matching tag selector).
    pub fn record(&mut self, allocation: &Allocation) {
        let provider = extract_provider(&allocation.resource_type);

        let mut scopes = Vec::new();
        if self.config.global.is_some() {
            scopes.push("global".to_string());
        }
        if self.config.providers.contains_key(&provider) {
            scopes.push(format!("provider:{provider}"));
        }
        if self.config.types.contains_key(&allocation.resource_type) {
            scopes.push(format!("type:{}", allocation.resource_type));
        }

        let mut tag_matches: Vec<&crate::config::TagBudgetEntry> = self
            .config
            .tags
            .iter()
            .filter(|t| tag_selector_matches(&t.selector, &allocation.tags))
            .collect();
        tag_matches.sort_by(|a, b| b.priority.cmp(&a.priority));

        if let Some(top_priority) = tag_matches.first().map(|t| t.priority) {
            let mut top: Vec<&crate::config::TagBudgetEntry> = tag_matches
                .iter()
                .filter(|t| t.priority == top_priority)
                .copied()
                .collect();
            top.sort_by(|a, b| a.selector.cmp(&b.selector));
            if top.len() > 1 {
                self.warnings.push(format!(
                    "overlapping tag selectors at priority {top_priority}"
                ));
            }
            scopes.push(format!("tag:{}", top[0].selector));
        }

        for scope in scopes {
            *self.spend_by_scope.entry(scope.clone()).or_insert(0.0) += allocation.cost;
            self.currency_by_scope
                .entry(scope)
                .or_insert_with(|| allocation.currency.clone());
        }
    }

    fn budget_for_scope(&self, scope: &str) -> Option<&BudgetEntry> {
        if scope == "global" {
            return self.config.global.as_ref();
        }
        if let Some(provider) = scope.strip_prefix("provider:") {
            return self.config.providers.get(provider);
        }
        if let Some(rtype) = scope.strip_prefix("type:") {
            return self.config.types.get(rtype);
        }
        if let Some(selector) = scope.strip_prefix("tag:") {
            return self
                .config
                .tags
                .iter()
                .find(|t| t.selector == selector)
                .map(|t| &t.budget);
        }
        None
    }

    /// Evaluate all scopes that received spend, at time `now`.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Result<BudgetResult, BudgetError> {
        let mut result = BudgetResult {
            warnings: self.warnings.clone(),
            ..Default::default()
        };

        let mut scope_names: Vec<&String> = self.spend_by_scope.keys().collect();
        scope_names.sort();

        for scope in scope_names {
            let spend = self.spend_by_scope[scope];
            let budget = match self.budget_for_scope(scope) {
                Some(b) => b,
                None => continue,
            };

            if budget.amount == 0.0 {
                return Err(BudgetError::DisabledBudget {
                    scope: scope.clone(),
                });
            }
            if spend < 0.0 {
                return Err(BudgetError::NegativeSpend {
                    scope: scope.clone(),
                    amount: spend,
                });
            }
            if let Some(spend_currency) = self.currency_by_scope.get(scope) {
                if spend_currency != &budget.currency {
                    return Err(BudgetError::CurrencyMismatch {
                        scope: scope.clone(),
                        budget_currency: budget.currency.clone(),
                        spend_currency: spend_currency.clone(),
                    });
                }
            }

            let has_critical_band = budget.alerts.iter().any(|a| a.threshold >= 90.0);
            let percentage = spend / budget.amount * 100.0;
            let health = Health::from_percentage(percentage, has_critical_band);

            let forecast = if budget.alerts.iter().any(|a| a.kind == "forecasted") {
                Some(compute_forecast(spend, now))
            } else {
                None
            };

            result.scopes.push(ScopeStatus {
                scope: scope.clone(),
                amount: budget.amount,
                currency: budget.currency.clone(),
                current_spend: spend,
                percentage,
                health,
                forecast,
            });
        }

        result.overall_health = result.scopes.iter().map(|s| s.health).max();
        result.critical_scopes = result
            .scopes
            .iter()
            .filter(|s| s.health >= Health::Critical)
            .map(|s| s.scope.clone())
            .collect();

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlertEntry, TagBudgetEntry};

    fn budget(amount: f64) -> BudgetEntry {
        BudgetEntry {
            amount,
            currency: "USD".to_string(),
            period: "monthly".to_string(),
            alerts: vec![],
        }
    }

    #[test]
    fn global_scope_exceeded_drives_overall_health() {
        let mut config = ScopedBudgetsConfig::default();
        config.global = Some(budget(100.0));

        let mut evaluator = BudgetEvaluator::new(&config);
        evaluator.record(&Allocation {
            resource_type: "aws:ec2/instance:Instance".to_string(),
            tags: HashMap::new(),
            cost: 150.0,
            currency: "USD".to_string(),
        });

        let result = evaluator.evaluate(Utc::now()).unwrap();
        assert_eq!(result.overall_health, Some(Health::Exceeded));
    }

    #[test]
    fn tag_selector_exact_match() {
        let mut config = ScopedBudgetsConfig::default();
        config.tags.push(TagBudgetEntry {
            selector: "env:prod".to_string(),
            priority: 1,
            budget: budget(50.0),
        });

        let mut evaluator = BudgetEvaluator::new(&config);
        evaluator.record(&Allocation {
            resource_type: "aws:ec2/instance:Instance".to_string(),
            tags: HashMap::from([("env".to_string(), "prod".to_string())]),
            cost: 40.0,
            currency: "USD".to_string(),
        });

        let result = evaluator.evaluate(Utc::now()).unwrap();
        assert_eq!(result.scopes.len(), 1);
        assert_eq!(result.scopes[0].scope, "tag:env:prod");
        assert_eq!(result.scopes[0].health, Health::Warning);
    }

    #[test]
    fn overlapping_tag_selectors_warn_and_pick_lexicographic() {
        let mut config = ScopedBudgetsConfig::default();
        config.tags.push(TagBudgetEntry {
            selector: "z:val".to_string(),
            priority: 5,
            budget: budget(100.0),
        });
        config.tags.push(TagBudgetEntry {
            selector: "a:val".to_string(),
            priority: 5,
            budget: budget(100.0),
        });

        let mut tags = HashMap::new();
        tags.insert("z".to_string(), "val".to_string());
        tags.insert("a".to_string(), "val".to_string());

        let mut evaluator = BudgetEvaluator::new(&config);
        evaluator.record(&Allocation {
            resource_type: "aws:ec2/instance:Instance".to_string(),
            tags,
            cost: 10.0,
            currency: "USD".to_string(),
        });

        let result = evaluator.evaluate(Utc::now()).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.scopes[0].scope, "tag:a:val");
    }

    #[test]
    fn disabled_budget_returns_error() {
        let mut config = ScopedBudgetsConfig::default();
        config.global = Some(budget(0.0));

        let mut evaluator = BudgetEvaluator::new(&config);
        evaluator.record(&Allocation {
            resource_type: "aws:ec2/instance:Instance".to_string(),
            tags: HashMap::new(),
            cost: 10.0,
            currency: "USD".to_string(),
        });

        assert!(evaluator.evaluate(Utc::now()).is_err());
    }

    #[test]
    fn currency_mismatch_returns_error() {
        let mut config = ScopedBudgetsConfig::default();
        config.global = Some(budget(100.0));

        let mut evaluator = BudgetEvaluator::new(&config);
        evaluator.record(&Allocation {
            resource_type: "aws:ec2/instance:Instance".to_string(),
            tags: HashMap::new(),
            cost: 10.0,
            currency: "EUR".to_string(),
        });

        let err = evaluator.evaluate(Utc::now()).unwrap_err();
        assert!(matches!(err, BudgetError::CurrencyMismatch { .. }));
    }

    #[test]
    fn forecast_only_computed_for_forecasted_alerts() {
        let mut config = ScopedBudgetsConfig::default();
        config.global = Some(BudgetEntry {
            amount: 1000.0,
            currency: "USD".to_string(),
            period: "monthly".to_string(),
            alerts: vec![AlertEntry {
                threshold: 80.0,
                kind: "forecasted".to_string(),
            }],
        });

        let mut evaluator = BudgetEvaluator::new(&config);
        evaluator.record(&Allocation {
            resource_type: "aws:ec2/instance:Instance".to_string(),
            tags: HashMap::new(),
            cost: 100.0,
            currency: "USD".to_string(),
        });

        let now = DateTime::parse_from_rfc3339("2026-07-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let result = evaluator.evaluate(now).unwrap();
        let forecast = result.scopes[0].forecast.as_ref().unwrap();
        assert_eq!(forecast.day_of_month, 15);
        assert_eq!(forecast.days_in_month, 31);
    }
}
