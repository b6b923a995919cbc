//! Schema compatibility checking
//!
//! Decides whether a candidate body may become the next version of a schema
//! under its compatibility policy. Checks are pure: they see only the candidate,
//! the policy and the version history handed to them.

use serde::{Deserialize, Serialize};

use crate::format::SchemaFormat;
use crate::schema::CompatibilityPolicy;
use crate::version::SchemaVersion;

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Whether the candidate is accepted
    pub is_compatible: bool,
    /// Version the candidate was compared with, if any
    pub checked_against: Option<u32>,
    /// Problems that make the candidate incompatible
    pub changes: Vec<SchemaChange>,
    /// Summary of the compatibility check
    pub summary: String,
}

impl CompatibilityResult {
    /// Create a compatible result
    pub fn compatible(checked_against: Option<u32>, summary: impl Into<String>) -> Self {
        Self {
            is_compatible: true,
            checked_against,
            changes: Vec::new(),
            summary: summary.into(),
        }
    }

    /// Create an incompatible result
    pub fn incompatible(checked_against: Option<u32>, changes: Vec<SchemaChange>) -> Self {
        let summary = match changes.as_slice() {
            [only] => only.description.clone(),
            _ => format!("{} breaking changes detected", changes.len()),
        };
        Self {
            is_compatible: false,
            checked_against,
            changes,
            summary,
        }
    }
}

/// A problem that prevents one schema from reading data of another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    /// Type of change
    pub change_type: ChangeType,
    /// Path to the changed element (e.g., "address.street")
    pub path: String,
    /// Which policy direction found it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Human-readable description
    pub description: String,
}

impl SchemaChange {
    pub fn new(change_type: ChangeType, path: &str, description: String) -> Self {
        Self {
            change_type,
            path: path.to_string(),
            direction: None,
            description,
        }
    }

    pub(crate) fn format_mismatch() -> Self {
        Self::new(
            ChangeType::FormatChanged,
            "",
            "schemas were parsed with different formats".to_string(),
        )
    }

    fn malformed(what: &str, reason: String) -> Self {
        Self::new(ChangeType::Malformed, "", format!("{} does not parse: {}", what, reason))
    }

    fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// Type of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Reader expects a field/property the writer may not provide
    MissingDefault,
    /// A field's type can no longer be resolved
    TypeChanged,
    /// A named type was renamed
    NameChanged,
    /// Writer may produce an enum value the reader does not know
    EnumSymbolRemoved,
    /// Writer property rejected by a closed reader
    UndeclaredProperty,
    /// A field without a default is no longer declared
    FieldRemoved,
    /// Bodies belong to different formats
    FormatChanged,
    /// Body does not parse under its format
    Malformed,
}

/// Direction of a policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Candidate reads data of the existing version
    Backward,
    /// Existing version reads data of the candidate
    Forward,
}

/// Compatibility checker for one schema format
#[derive(Debug, Clone, Copy)]
pub struct CompatibilityChecker {
    format: SchemaFormat,
}

impl CompatibilityChecker {
    /// Create a new compatibility checker
    pub fn new(format: SchemaFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> SchemaFormat {
        self.format
    }

    /// Whether `candidate` may follow `existing` under `policy`
    pub fn check(
        &self,
        candidate: &str,
        policy: CompatibilityPolicy,
        existing: &[SchemaVersion],
    ) -> bool {
        self.evaluate(candidate, policy, existing).is_compatible
    }

    /// Like [`check`](Self::check), with the detected problems.
    ///
    /// Only the latest version of `existing` takes part in the check.
    pub fn evaluate(
        &self,
        candidate: &str,
        policy: CompatibilityPolicy,
        existing: &[SchemaVersion],
    ) -> CompatibilityResult {
        let latest = existing.iter().max_by_key(|v| v.version);
        self.evaluate_against(candidate, policy, latest)
    }

    /// Check `candidate` against one specific version (or none)
    pub fn evaluate_against(
        &self,
        candidate: &str,
        policy: CompatibilityPolicy,
        reference: Option<&SchemaVersion>,
    ) -> CompatibilityResult {
        let checked_against = reference.map(|v| v.version);

        let candidate = match self.format.parse(candidate) {
            Ok(parsed) => parsed,
            Err(e) => {
                return CompatibilityResult::incompatible(
                    checked_against,
                    vec![SchemaChange::malformed("candidate", e.to_string())],
                )
            }
        };

        if policy == CompatibilityPolicy::None {
            return CompatibilityResult::compatible(
                checked_against,
                "policy NONE performs no check",
            );
        }

        let Some(reference) = reference else {
            return CompatibilityResult::compatible(None, "no previous version");
        };

        let existing = match self.format.parse(&reference.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return CompatibilityResult::incompatible(
                    checked_against,
                    vec![SchemaChange::malformed(
                        &format!("stored version {}", reference.version),
                        e.to_string(),
                    )],
                )
            }
        };

        let mut changes = Vec::new();
        if policy.checks_backward() {
            changes.extend(
                self.format
                    .backward_problems(&existing, &candidate)
                    .into_iter()
                    .map(|c| c.with_direction(Direction::Backward)),
            );
        }
        if policy.checks_forward() {
            changes.extend(
                self.format
                    .forward_problems(&existing, &candidate)
                    .into_iter()
                    .map(|c| c.with_direction(Direction::Forward)),
            );
        }

        if changes.is_empty() {
            CompatibilityResult::compatible(
                checked_against,
                format!("{} compatible with version {}", policy, reference.version),
            )
        } else {
            CompatibilityResult::incompatible(checked_against, changes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use chrono::Utc;

    fn version(version: u32, body: &str) -> SchemaVersion {
        SchemaVersion {
            metadata_id: 1,
            version,
            body: body.to_string(),
            fingerprint: Checksum::from_text(body),
            created_at: Utc::now(),
        }
    }

    const V1: &str = r#"{"type": "record", "name": "T", "fields": [{"name": "a", "type": "int"}]}"#;
    const ADD_B_DEFAULT: &str = r#"{"type": "record", "name": "T", "fields": [
        {"name": "a", "type": "int"},
        {"name": "b", "type": "int", "default": 0}
    ]}"#;
    const ADD_B_NO_DEFAULT: &str = r#"{"type": "record", "name": "T", "fields": [
        {"name": "a", "type": "int"},
        {"name": "b", "type": "int"}
    ]}"#;
    // drops a, introduces b without a default
    const REPLACE_A: &str = r#"{"type": "record", "name": "T", "fields": [{"name": "b", "type": "int"}]}"#;
    // drops a entirely
    const EMPTY: &str = r#"{"type": "record", "name": "T", "fields": []}"#;

    fn checker() -> CompatibilityChecker {
        CompatibilityChecker::new(SchemaFormat::Avro)
    }

    #[test]
    fn test_backward_policy() {
        let history = [version(1, V1)];
        assert!(checker().check(ADD_B_DEFAULT, CompatibilityPolicy::Backward, &history));
        assert!(!checker().check(ADD_B_NO_DEFAULT, CompatibilityPolicy::Backward, &history));
        assert!(!checker().check(REPLACE_A, CompatibilityPolicy::Backward, &history));

        // a had no default, so it may not be dropped
        let result = checker().evaluate(EMPTY, CompatibilityPolicy::Backward, &history);
        assert!(!result.is_compatible);
        assert_eq!(result.changes[0].change_type, ChangeType::FieldRemoved);
        assert_eq!(result.changes[0].direction, Some(Direction::Backward));
        assert_eq!(result.changes[0].path, "a");
    }

    #[test]
    fn test_forward_policy() {
        let history = [version(1, V1)];
        assert!(checker().check(ADD_B_NO_DEFAULT, CompatibilityPolicy::Forward, &history));
        // old readers need a, which has no default
        let result = checker().evaluate(EMPTY, CompatibilityPolicy::Forward, &history);
        assert!(!result.is_compatible);
        assert_eq!(result.changes[0].direction, Some(Direction::Forward));
        assert_eq!(result.changes[0].path, "a");
    }

    #[test]
    fn test_full_policy_requires_both() {
        let history = [version(1, V1)];
        assert!(checker().check(ADD_B_DEFAULT, CompatibilityPolicy::Full, &history));
        assert!(!checker().check(ADD_B_NO_DEFAULT, CompatibilityPolicy::Full, &history));
        assert!(!checker().check(EMPTY, CompatibilityPolicy::Full, &history));
    }

    #[test]
    fn test_only_latest_version_is_checked() {
        let history = [version(2, ADD_B_DEFAULT), version(1, V1)];
        let result = checker().evaluate(ADD_B_DEFAULT, CompatibilityPolicy::Full, &history);
        assert!(result.is_compatible);
        assert_eq!(result.checked_against, Some(2));
    }

    #[test]
    fn test_none_policy_and_empty_history() {
        let history = [version(1, V1)];
        assert!(checker().check(REPLACE_A, CompatibilityPolicy::None, &history));
        for policy in [
            CompatibilityPolicy::None,
            CompatibilityPolicy::Backward,
            CompatibilityPolicy::Forward,
            CompatibilityPolicy::Full,
        ] {
            assert!(checker().check(REPLACE_A, policy, &[]));
        }
    }

    #[test]
    fn test_malformed_candidate_is_incompatible() {
        for policy in [CompatibilityPolicy::None, CompatibilityPolicy::Backward] {
            let result = checker().evaluate("{a:int}", policy, &[]);
            assert!(!result.is_compatible);
            assert_eq!(result.changes[0].change_type, ChangeType::Malformed);
        }
    }
}
