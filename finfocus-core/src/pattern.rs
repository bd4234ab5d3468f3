//! # Provider/Pattern Primitives (C1)
//!
//! Provider extraction from resource types, and glob/regex pattern
//! compilation with a compile-once cache. Patterns are compiled eagerly at
//! router construction time; compile failures are fatal then, never at
//! match time (§4.1, §4.4).

use crate::error::PatternError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

/// Sentinel provider returned for an empty or malformed resource type.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Extract the provider from a resource type: the first colon-delimited
/// segment, normalized (trimmed, lowercased). Returns [`UNKNOWN_PROVIDER`]
/// for an empty string or a type starting with a colon.
pub fn extract_provider(resource_type: &str) -> String {
    if resource_type.is_empty() || resource_type.starts_with(':') {
        return UNKNOWN_PROVIDER.to_string();
    }
    match resource_type.split_once(':') {
        Some((provider, _)) if !provider.is_empty() => normalize(provider),
        _ => UNKNOWN_PROVIDER.to_string(),
    }
}

/// Normalize a provider string for comparison: trim, lowercase.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Case-insensitive provider equality, after normalization.
pub fn providers_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// The kind of a configured resource pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Glob,
    Regex,
}

/// A compiled pattern matcher, immutable once built.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    /// Glob patterns are translated to an anchored regex at compile time.
    /// `/` is treated as an ordinary character so `*` can cross it, since
    /// resource types legitimately contain `/` (e.g. `aws:ec2/instance:Instance`).
    Glob(Regex),
    /// Regex patterns use unanchored substring semantics unless the pattern
    /// itself supplies anchors, matching RE2-equivalent behavior.
    Regex(Regex),
}

impl CompiledPattern {
    pub fn is_match(&self, resource_type: &str) -> bool {
        match self {
            CompiledPattern::Glob(re) => re.is_match(resource_type),
            CompiledPattern::Regex(re) => re.is_match(resource_type),
        }
    }
}

/// Compile a single pattern. Called once per distinct `(kind, pattern)` via
/// the [`PatternCache`]; never on the match-time hot path.
pub fn compile(
    plugin: &str,
    kind: PatternKind,
    pattern: &str,
) -> Result<CompiledPattern, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::EmptyPattern {
            plugin: plugin.to_string(),
        });
    }
    match kind {
        PatternKind::Glob => {
            let translated = glob_to_regex(pattern);
            let re = Regex::new(&translated).map_err(|source| PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            Ok(CompiledPattern::Glob(re))
        }
        PatternKind::Regex => {
            let re = Regex::new(pattern).map_err(|source| PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            Ok(CompiledPattern::Regex(re))
        }
    }
}

/// Translate a shell-style glob (`*`, `?`, `[...]`) into an anchored regex
/// source string. `/` is never treated specially.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // Copy the character class verbatim; regex and shell glob
                // classes agree closely enough for our purposes, except
                // negation: shell glob negates with a leading `!`, regex
                // with `^`.
                out.push('[');
                if let Some(&next) = chars.peek() {
                    if next == '!' {
                        out.push('^');
                        chars.next();
                    }
                }
                for class_char in chars.by_ref() {
                    out.push(class_char);
                    if class_char == ']' {
                        break;
                    }
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Compile-once cache for resource patterns, keyed by `(plugin, resource
/// type marker, pattern)` as a single string key. Many concurrent readers
/// are allowed; writes take the exclusive lock and double-check for a
/// racing writer before compiling again.
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: RwLock<HashMap<String, CompiledPattern>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(plugin: &str, kind: PatternKind, pattern: &str) -> String {
        let kind_tag = match kind {
            PatternKind::Glob => "glob",
            PatternKind::Regex => "regex",
        };
        format!("{plugin}\u{0}{kind_tag}\u{0}{pattern}")
    }

    /// Fetch a compiled pattern, compiling and inserting it if absent.
    pub fn get_or_compile(
        &self,
        plugin: &str,
        kind: PatternKind,
        pattern: &str,
    ) -> Result<CompiledPattern, PatternError> {
        let key = Self::cache_key(plugin, kind, pattern);

        if let Some(existing) = self.entries.read().unwrap().get(&key) {
            return Ok(existing.clone());
        }

        let mut write_guard = self.entries.write().unwrap();
        // Double-checked: another writer may have compiled this pattern
        // while we waited for the exclusive lock.
        if let Some(existing) = write_guard.get(&key) {
            return Ok(existing.clone());
        }

        let compiled = compile(plugin, kind, pattern)?;
        write_guard.insert(key, compiled.clone());
        Ok(compiled)
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn size(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_extraction_basic() {
        assert_eq!(extract_provider("aws:ec2/instance:Instance"), "aws");
        assert_eq!(extract_provider("AWS:ec2/instance:Instance"), "aws");
        assert_eq!(extract_provider(""), UNKNOWN_PROVIDER);
        assert_eq!(extract_provider(":ec2/instance:Instance"), UNKNOWN_PROVIDER);
        assert_eq!(extract_provider("noColonsHere"), UNKNOWN_PROVIDER);
    }

    #[test]
    fn glob_matches_across_slash() {
        let cache = PatternCache::new();
        let compiled = cache
            .get_or_compile("eks-costs", PatternKind::Glob, "aws:eks*")
            .unwrap();
        assert!(compiled.is_match("aws:eks:Cluster"));
        assert!(compiled.is_match("aws:eks/cluster:Cluster"));
        assert!(!compiled.is_match("aws:ec2:Instance"));
    }

    #[test]
    fn glob_negated_character_class() {
        let cache = PatternCache::new();
        let compiled = cache
            .get_or_compile("p", PatternKind::Glob, "aws:[!e]*")
            .unwrap();
        assert!(!compiled.is_match("aws:eks:Cluster"));
        assert!(compiled.is_match("aws:rds:Instance"));
    }

    #[test]
    fn regex_is_unanchored_substring_by_default() {
        let cache = PatternCache::new();
        let compiled = cache
            .get_or_compile("p", PatternKind::Regex, "eks")
            .unwrap();
        assert!(compiled.is_match("aws:eks:Cluster"));
    }

    #[test]
    fn invalid_regex_fails_to_compile() {
        let cache = PatternCache::new();
        let err = cache
            .get_or_compile("p", PatternKind::Regex, "(unclosed")
            .unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn empty_pattern_rejected() {
        let cache = PatternCache::new();
        let err = cache.get_or_compile("p", PatternKind::Glob, "").unwrap_err();
        assert!(matches!(err, PatternError::EmptyPattern { .. }));
    }

    #[test]
    fn cache_reuses_compiled_pattern() {
        let cache = PatternCache::new();
        cache
            .get_or_compile("p", PatternKind::Glob, "aws:*")
            .unwrap();
        assert_eq!(cache.size(), 1);
        cache
            .get_or_compile("p", PatternKind::Glob, "aws:*")
            .unwrap();
        assert_eq!(cache.size(), 1);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
