//! # Configuration Management Module
//!
//! Loads and validates the FinFocus YAML configuration: plugin routing
//! entries (consumed by `finfocus_core::Router`) and scoped budget
//! definitions (consumed by the budget evaluator). YAML was chosen over
//! the gateway's TOML so the config surface can embed nested tag selector
//! lists cleanly (§6.4).
//!
//! ## Usage
//!
//! ```no_run
//! use finfocus_engine::config::FinFocusConfig;
//!
//! let config = FinFocusConfig::load("finfocus.yaml")?;
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use finfocus_core::router::{FallbackSetting, PatternConfig, PluginRouting};
use finfocus_core::pattern::PatternKind;
use serde::{Deserialize, Serialize};

/// Top-level configuration document (§6.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinFocusConfig {
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub cost: CostSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSection {
    #[serde(default)]
    pub plugins: Vec<PluginRoutingEntry>,
}

/// YAML-facing mirror of `finfocus_core::router::PluginRouting`; converted
/// via `to_core()` once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRoutingEntry {
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
    #[serde(default)]
    pub fallback: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEntry {
    #[serde(rename = "type")]
    pub pattern_type: String,
    pub pattern: String,
}

impl PluginRoutingEntry {
    pub fn to_core(&self) -> Result<PluginRouting, String> {
        let mut patterns = Vec::with_capacity(self.patterns.len());
        for p in &self.patterns {
            let kind = match p.pattern_type.as_str() {
                "glob" => PatternKind::Glob,
                "regex" => PatternKind::Regex,
                other => {
                    return Err(format!(
                        "plugin {:?}: unknown pattern type {other:?}",
                        self.name
                    ))
                }
            };
            patterns.push(PatternConfig {
                kind,
                pattern: p.pattern.clone(),
            });
        }
        Ok(PluginRouting {
            name: self.name.clone(),
            priority: self.priority,
            features: self.features.clone(),
            patterns,
            fallback: match self.fallback {
                None => FallbackSetting::Unset,
                Some(true) => FallbackSetting::Enabled,
                Some(false) => FallbackSetting::Disabled,
            },
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSection {
    #[serde(default)]
    pub scoped_budgets: ScopedBudgetsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopedBudgetsConfig {
    pub global: Option<BudgetEntry>,
    #[serde(default)]
    pub providers: std::collections::HashMap<String, BudgetEntry>,
    #[serde(default)]
    pub tags: Vec<TagBudgetEntry>,
    #[serde(default)]
    pub types: std::collections::HashMap<String, BudgetEntry>,
    #[serde(default)]
    pub exit_on_threshold: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEntry {
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default)]
    pub alerts: Vec<AlertEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagBudgetEntry {
    pub selector: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(flatten)]
    pub budget: BudgetEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEntry {
    pub threshold: f64,
    #[serde(default = "default_alert_kind")]
    pub kind: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_period() -> String {
    "monthly".to_string()
}

fn default_alert_kind() -> String {
    "actual".to_string()
}

impl FinFocusConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FinFocusConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration document's own structural constraints
    /// (amounts, currency consistency); router-level validation (unknown
    /// plugin names, regex compile failures) happens when the `Router` is
    /// constructed from `routing.plugins`.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_routing()?;
        self.validate_budgets()?;
        Ok(())
    }

    fn validate_routing(&self) -> anyhow::Result<()> {
        for entry in &self.routing.plugins {
            if entry.name.is_empty() {
                return Err(anyhow::anyhow!("routing.plugins entry has empty name"));
            }
            if entry.priority < 0 {
                return Err(anyhow::anyhow!(
                    "routing.plugins[{}] has negative priority {}",
                    entry.name,
                    entry.priority
                ));
            }
            for p in &entry.patterns {
                if p.pattern.is_empty() {
                    return Err(anyhow::anyhow!(
                        "routing.plugins[{}] has an empty pattern",
                        entry.name
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_budgets(&self) -> anyhow::Result<()> {
        let check = |label: &str, b: &BudgetEntry| -> anyhow::Result<()> {
            if b.amount < 0.0 {
                return Err(anyhow::anyhow!("budget {label} has negative amount"));
            }
            Ok(())
        };

        if let Some(global) = &self.cost.scoped_budgets.global {
            check("global", global)?;
        }
        for (provider, budget) in &self.cost.scoped_budgets.providers {
            check(&format!("providers.{provider}"), budget)?;
        }
        for (rtype, budget) in &self.cost.scoped_budgets.types {
            check(&format!("types.{rtype}"), budget)?;
        }
        for tag in &self.cost.scoped_budgets.tags {
            if tag.selector.is_empty() {
                return Err(anyhow::anyhow!("tag budget has empty selector"));
            }
            check(&format!("tags.{}", tag.selector), &tag.budget)?;
        }

        Ok(())
    }
}
