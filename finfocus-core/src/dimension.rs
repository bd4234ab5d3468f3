//! # Dimension Resolver (C2)
//!
//! Derives a `(sku, region)` pricing dimension pair from a resource's
//! provider, type, and opaque properties, and resolves the identifiers
//! needed for actual-cost lookups (`cloudId`, `arn`, `tags`).
//!
//! Resolution order follows the provider family: AWS, Azure, GCP, then a
//! generic fallback. The AWS environment-variable fallback for region is
//! scoped strictly to the AWS provider (SC-001) — the resolver takes an env
//! accessor so tests can stub it without mutating real process state.

use serde_json::Value;
use std::collections::HashMap;

/// Abstraction over environment variable lookups, so the AWS region
/// fallback can be tested without touching real process environment state.
/// The default accessor is `std::env::var`.
pub trait EnvAccessor {
    fn get(&self, key: &str) -> Option<String>;
}

/// The production accessor, backed by `std::env::var`.
pub struct ProcessEnv;

impl EnvAccessor for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A resolved pricing dimension pair. Either field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dimension {
    pub sku: String,
    pub region: String,
}

fn as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn get_str(props: &HashMap<String, Value>, key: &str) -> Option<String> {
    props.get(key).and_then(as_str)
}

fn first_of(props: &HashMap<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| get_str(props, k))
}

/// Normalize an availability-zone string down to its region, per the rule:
/// trim; if the last character is a lowercase letter preceded by a digit
/// (AWS `us-west-2a` -> `us-west-2`) or by `-` preceded by a digit (GCP
/// `us-central1-a` -> `us-central1`), strip accordingly; otherwise return
/// the trimmed input unchanged.
pub fn az_to_region(az: &str) -> String {
    let az = az.trim();
    let chars: Vec<char> = az.chars().collect();
    let n = chars.len();
    if n < 2 {
        return az.to_string();
    }
    let last = chars[n - 1];
    if !last.is_ascii_lowercase() {
        return az.to_string();
    }
    let prev = chars[n - 2];
    if prev.is_ascii_digit() {
        // us-west-2a -> us-west-2
        return chars[..n - 1].iter().collect();
    }
    if prev == '-' && n >= 3 && chars[n - 3].is_ascii_digit() {
        // us-central1-a -> us-central1
        return chars[..n - 2].iter().collect();
    }
    az.to_string()
}

const AWS_SKU_KEYS: &[&str] = &["instanceType", "volumeType"];
const COMMON_SKU_KEYS: &[&str] = &["dbInstanceClass", "sku", "type", "tier"];
const AZURE_SKU_KEYS: &[&str] = &["vmSize", "sku"];
const GCP_SKU_KEYS: &[&str] = &["machineType"];

/// Well-known resource-type -> sku table for resources with no scalar SKU
/// property (e.g. managed clusters).
fn well_known_sku(resource_type: &str) -> Option<&'static str> {
    match resource_type {
        "aws:eks/cluster:Cluster" => Some("cluster"),
        "aws:ecs/cluster:Cluster" => Some("cluster"),
        "aws:rds/cluster:Cluster" => Some("cluster"),
        _ => None,
    }
}

fn resolve_aws(
    resource_type: &str,
    props: &HashMap<String, Value>,
    env: &dyn EnvAccessor,
) -> Dimension {
    let sku = first_of(props, AWS_SKU_KEYS)
        .or_else(|| first_of(props, COMMON_SKU_KEYS))
        .or_else(|| well_known_sku(resource_type).map(str::to_string))
        .unwrap_or_default();

    let region = first_of(props, &["region"])
        .or_else(|| {
            first_of(props, &["availabilityZone", "availability_zone"]).map(|az| az_to_region(&az))
        })
        .or_else(|| arn_region(props))
        .or_else(|| env.get("AWS_REGION"))
        .or_else(|| env.get("AWS_DEFAULT_REGION"))
        .unwrap_or_default();

    Dimension { sku, region }
}

/// Extract the region from the 4th colon-delimited segment of an ARN
/// (`arn:partition:service:REGION:account:resource`), ignoring empty or
/// wildcard segments.
fn arn_region(props: &HashMap<String, Value>) -> Option<String> {
    let arn = first_of(props, &["arn"])?;
    let segment = arn.split(':').nth(3)?;
    if segment.is_empty() || segment == "*" {
        None
    } else {
        Some(segment.to_string())
    }
}

fn resolve_azure(props: &HashMap<String, Value>) -> Dimension {
    let sku = first_of(props, AZURE_SKU_KEYS)
        .or_else(|| first_of(props, COMMON_SKU_KEYS))
        .unwrap_or_default();
    let region = first_of(props, &["location"]).unwrap_or_default();
    Dimension { sku, region }
}

fn resolve_gcp(props: &HashMap<String, Value>) -> Dimension {
    let sku = first_of(props, GCP_SKU_KEYS)
        .or_else(|| first_of(props, COMMON_SKU_KEYS))
        .unwrap_or_default();
    let region = first_of(props, &["zone"])
        .map(|zone| az_to_region(&zone))
        .unwrap_or_default();
    Dimension { sku, region }
}

fn resolve_generic(props: &HashMap<String, Value>) -> Dimension {
    let sku = first_of(props, COMMON_SKU_KEYS).unwrap_or_default();
    let region = first_of(props, &["region", "location", "zone"]).unwrap_or_default();
    Dimension { sku, region }
}

/// Resolve `(sku, region)` for a resource. `provider` is matched
/// case-insensitively; unrecognized providers use the generic fallback.
///
/// Invariant (SC-001): the `AWS_REGION`/`AWS_DEFAULT_REGION` fallback is
/// applied only when `provider` normalizes to `aws`; non-AWS resources
/// never inherit it even if present in the environment.
pub fn resolve_dimension(
    provider: &str,
    resource_type: &str,
    props: &HashMap<String, Value>,
    env: &dyn EnvAccessor,
) -> Dimension {
    match crate::pattern::normalize(provider).as_str() {
        "aws" => resolve_aws(resource_type, props, env),
        "azure" | "azure-native" => resolve_azure(props),
        "gcp" | "google-native" => resolve_gcp(props),
        _ => resolve_generic(props),
    }
}

/// Resolved identifiers for an "actual cost" request: the cloud-native id,
/// ARN, and tag map.
#[derive(Debug, Clone, Default)]
pub struct ActualCostIdentity {
    pub cloud_id: String,
    pub arn: String,
    pub tags: HashMap<String, String>,
}

fn value_to_tag_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_map(value: &Value) -> Option<HashMap<String, String>> {
    let obj = value.as_object()?;
    if obj.is_empty() {
        return None;
    }
    Some(
        obj.iter()
            .map(|(k, v)| (k.clone(), value_to_tag_string(v)))
            .collect(),
    )
}

/// Resolve `cloudId`, `arn`, and `tags` from a resource's properties,
/// falling back to the ingestor-assigned `id` when `pulumi:cloudId` is
/// absent or not a non-empty string.
pub fn resolve_actual_cost_identity(
    original_id: &str,
    props: &HashMap<String, Value>,
) -> ActualCostIdentity {
    let cloud_id = get_str(props, "pulumi:cloudId").unwrap_or_else(|| original_id.to_string());
    let arn = get_str(props, "pulumi:arn").unwrap_or_default();
    let tags = props
        .get("tagsAll")
        .and_then(string_map)
        .or_else(|| props.get("tags").and_then(string_map))
        .unwrap_or_default();

    ActualCostIdentity {
        cloud_id,
        arn,
        tags,
    }
}

/// Inject resolved `sku`/`region` into a tag map under `"sku"`/`"region"`,
/// never overwriting an existing value. No-op if `provider` is empty.
pub fn enrich_tags(tags: &mut HashMap<String, String>, provider: &str, dim: &Dimension) {
    if provider.is_empty() {
        return;
    }
    tags.entry("sku".to_string()).or_insert_with(|| dim.sku.clone());
    tags.entry("region".to_string())
        .or_insert_with(|| dim.region.clone());
}
