//! Masking policy
//!
//! The single source of truth for what counts as sensitive: table and column
//! names that never reach a prompt, value patterns that get masked, and the
//! SQL keyword deny list enforced by the validator. Immutable after load and
//! shared by reference across sessions.

use crate::config::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;

/// A named value pattern with its replacement token.
///
/// Patterns are applied in declaration order so that specific shapes (card
/// numbers) are consumed before looser ones (plain digit runs). The order is
/// part of the configuration contract.
#[derive(Debug, Clone)]
pub struct SensitivePattern {
    pub name: String,
    pub regex: Regex,
    pub replacement: String,
}

/// Raw pattern entry as accepted in the SENSITIVE_PATTERNS env override.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub replacement: Option<String>,
}

/// The compiled, process-wide masking policy.
#[derive(Debug)]
pub struct MaskPolicy {
    /// Table names stripped from the schema before any prompt (lowercase)
    pub sensitive_tables: HashSet<String>,
    /// Column names stripped from remaining tables (lowercase)
    pub sensitive_columns: HashSet<String>,
    /// Ordered value patterns applied to result cells and error messages
    pub patterns: Vec<SensitivePattern>,
    /// SQL keywords rejected as standalone tokens (uppercase)
    pub blocked_keywords: HashSet<String>,
    /// Only single SELECT statements are ever accepted
    pub select_only: bool,
}

const DEFAULT_SENSITIVE_TABLES: &[&str] = &[
    "users",
    "passwords",
    "credit_cards",
    "ssn",
    "personal_data",
    "employees",
    "patients",
    "accounts",
    "financial",
    "medical",
];

const DEFAULT_SENSITIVE_COLUMNS: &[&str] = &[
    "password",
    "ssn",
    "credit_card",
    "email",
    "phone",
    "address",
    "salary",
    "secret",
    "private",
];

const DEFAULT_BLOCKED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE",
];

/// Default value patterns, most specific first.
fn default_pattern_specs() -> Vec<PatternSpec> {
    let spec = |name: &str, pattern: &str| PatternSpec {
        name: name.to_string(),
        pattern: pattern.to_string(),
        replacement: None,
    };

    vec![
        spec("credit_card", r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b"),
        spec("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
        spec("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        spec("iban", r"\b[A-Z]{2}\d{2}[A-Z0-9]{4}\d{7}[A-Z0-9]{0,16}\b"),
        spec("phone", r"\b\d{10,11}\b"),
        spec("ipv4", r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b"),
    ]
}

impl MaskPolicy {
    /// Load the policy from environment variables, falling back to the
    /// built-in defaults. Any malformed pattern or an empty keyword deny
    /// list is a fatal configuration error.
    pub fn load() -> Result<Self, ConfigError> {
        let sensitive_tables = name_set_from_env("SENSITIVE_TABLES", DEFAULT_SENSITIVE_TABLES);
        let sensitive_columns = name_set_from_env("SENSITIVE_COLUMNS", DEFAULT_SENSITIVE_COLUMNS);

        let blocked_keywords: HashSet<String> = match std::env::var("BLOCKED_OPERATIONS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_BLOCKED_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        };

        if blocked_keywords.is_empty() {
            return Err(ConfigError::InvalidValue(
                "BLOCKED_OPERATIONS must not be empty".to_string(),
            ));
        }

        let specs = match std::env::var("SENSITIVE_PATTERNS") {
            Ok(raw) => serde_json::from_str::<Vec<PatternSpec>>(&raw).map_err(|e| {
                ConfigError::InvalidValue(format!("SENSITIVE_PATTERNS is not valid JSON: {}", e))
            })?,
            Err(_) => default_pattern_specs(),
        };

        Self::from_parts(sensitive_tables, sensitive_columns, specs, blocked_keywords)
    }

    /// Build a policy from already-collected parts, compiling every pattern.
    pub fn from_parts(
        sensitive_tables: HashSet<String>,
        sensitive_columns: HashSet<String>,
        specs: Vec<PatternSpec>,
        blocked_keywords: HashSet<String>,
    ) -> Result<Self, ConfigError> {
        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            let regex = Regex::new(&spec.pattern).map_err(|e| ConfigError::InvalidPattern {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;
            let replacement = spec
                .replacement
                .unwrap_or_else(|| format!("[REDACTED:{}]", spec.name));
            patterns.push(SensitivePattern {
                name: spec.name,
                regex,
                replacement,
            });
        }

        Ok(Self {
            sensitive_tables,
            sensitive_columns,
            patterns,
            blocked_keywords,
            select_only: true,
        })
    }

    /// Policy with the built-in defaults, bypassing the environment.
    pub fn defaults() -> Self {
        Self::from_parts(
            DEFAULT_SENSITIVE_TABLES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_SENSITIVE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            default_pattern_specs(),
            DEFAULT_BLOCKED_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        )
        .expect("built-in patterns must compile")
    }

    pub fn is_sensitive_table(&self, name: &str) -> bool {
        self.sensitive_tables.contains(&name.to_lowercase())
    }

    pub fn is_sensitive_column(&self, name: &str) -> bool {
        self.sensitive_columns.contains(&name.to_lowercase())
    }
}

fn name_set_from_env(var: &str, defaults: &[&str]) -> HashSet<String> {
    match std::env::var(var) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => defaults.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_policy_compiles() {
        let policy = MaskPolicy::defaults();
        assert!(policy.select_only);
        assert_eq!(policy.patterns.len(), 6);
        assert!(policy.blocked_keywords.contains("DROP"));
    }

    #[test]
    fn test_pattern_order_is_preserved() {
        let policy = MaskPolicy::defaults();
        let names: Vec<&str> = policy.patterns.iter().map(|p| p.name.as_str()).collect();
        // Card numbers must be consumed before the looser digit-run patterns.
        assert_eq!(names, vec!["credit_card", "email", "ssn", "iban", "phone", "ipv4"]);
    }

    #[test]
    fn test_sensitive_names_are_case_insensitive() {
        let policy = MaskPolicy::defaults();
        assert!(policy.is_sensitive_table("Passwords"));
        assert!(policy.is_sensitive_table("USERS"));
        assert!(policy.is_sensitive_column("Email"));
        assert!(!policy.is_sensitive_table("orders"));
    }

    #[test]
    fn test_invalid_pattern_is_a_config_error() {
        let specs = vec![PatternSpec {
            name: "broken".to_string(),
            pattern: "(unclosed".to_string(),
            replacement: None,
        }];
        let result = MaskPolicy::from_parts(
            HashSet::new(),
            HashSet::new(),
            specs,
            ["DROP".to_string()].into_iter().collect(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidPattern { .. })));
    }
}
