//! Schema identity and metadata records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Logical name of a schema, independent of its version history.
///
/// All three segments are case-sensitive. `schema_type` also selects the
/// [`SchemaFormat`](crate::format::SchemaFormat) used to parse bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaIdentity {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub group: String,
    pub name: String,
}

impl SchemaIdentity {
    pub fn new(
        schema_type: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            schema_type: schema_type.into(),
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SchemaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.schema_type, self.group, self.name)
    }
}

/// Rule governing which evolutions of a schema are accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityPolicy {
    /// No structural check
    None,
    /// Candidate can read data written with the latest version
    #[default]
    Backward,
    /// Latest version can read data written with the candidate
    Forward,
    /// Backward and forward against the latest version
    #[serde(alias = "BOTH")]
    Full,
}

impl CompatibilityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityPolicy::None => "NONE",
            CompatibilityPolicy::Backward => "BACKWARD",
            CompatibilityPolicy::Forward => "FORWARD",
            CompatibilityPolicy::Full => "FULL",
        }
    }

    pub(crate) fn checks_backward(&self) -> bool {
        matches!(self, CompatibilityPolicy::Backward | CompatibilityPolicy::Full)
    }

    pub(crate) fn checks_forward(&self) -> bool {
        matches!(self, CompatibilityPolicy::Forward | CompatibilityPolicy::Full)
    }
}

impl fmt::Display for CompatibilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityPolicy {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(CompatibilityPolicy::None),
            "BACKWARD" => Ok(CompatibilityPolicy::Backward),
            "FORWARD" => Ok(CompatibilityPolicy::Forward),
            "FULL" | "BOTH" => Ok(CompatibilityPolicy::Full),
            other => Err(RegistryError::InvalidInput(format!(
                "unknown compatibility policy '{}'",
                other
            ))),
        }
    }
}

/// Metadata record owning a schema identity.
///
/// The compatibility policy is fixed for the life of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub id: u64,
    pub identity: SchemaIdentity,
    #[serde(default)]
    pub description: String,
    pub compatibility: CompatibilityPolicy,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "backward".parse::<CompatibilityPolicy>().unwrap(),
            CompatibilityPolicy::Backward
        );
        assert_eq!("BOTH".parse::<CompatibilityPolicy>().unwrap(), CompatibilityPolicy::Full);
        assert!("sideways".parse::<CompatibilityPolicy>().is_err());
        assert_eq!(CompatibilityPolicy::default(), CompatibilityPolicy::Backward);
    }

    #[test]
    fn test_policy_serde_accepts_both_alias() {
        let policy: CompatibilityPolicy = serde_json::from_str("\"BOTH\"").unwrap();
        assert_eq!(policy, CompatibilityPolicy::Full);
        assert_eq!(serde_json::to_string(&policy).unwrap(), "\"FULL\"");
    }

    #[test]
    fn test_identity_serializes_type_key() {
        let identity = SchemaIdentity::new("avro", "kafka", "User");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["type"], "avro");
        assert_eq!(identity.to_string(), "avro/kafka/User");
        assert_ne!(identity, SchemaIdentity::new("avro", "kafka", "user"));
    }
}
