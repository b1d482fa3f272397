//! Reconciliation engine and resource driver contracts

use crate::action::{ApplyResult, Plan};
use crate::error::Result;
use crate::graph::{ResourceKind, StackDefinition};
use crate::state::StackState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Engine that turns a declared stack into provider operations
///
/// The build side of the program only ever talks to this trait, so the graph
/// builder can be exercised without a live provider.
#[async_trait]
pub trait ReconciliationEngine: Send + Sync {
    /// Compute create/update/delete/no-op per resource, producers first
    async fn plan(&self, stack: &StackDefinition) -> Result<Plan>;

    /// Execute a plan and persist the resulting state
    async fn apply(&self, plan: &Plan) -> Result<ApplyResult>;

    /// Currently recorded state
    async fn state(&self) -> Result<StackState>;
}

/// Provider seam used by the state-backed engine
///
/// Each call receives properties with every reference already resolved.
#[async_trait]
pub trait ResourceDriver: Send + Sync {
    /// Returns the driver name (e.g., "aws")
    fn name(&self) -> &str;

    /// Check if the driver is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create a resource
    async fn create(&self, request: &DriverRequest<'_>) -> Result<ProvisionedResource>;

    /// Update a resource in place
    async fn update(&self, id: &str, request: &DriverRequest<'_>) -> Result<ProvisionedResource>;

    /// Delete a resource by provider id
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Fields of `kind` that [`ResourceDriver::update`] can change in place
    ///
    /// Names match [`crate::ResourceSpec::property_digests`]. A change to any other
    /// field makes the planner replace the resource. The default is none.
    fn updatable_fields(&self, _kind: ResourceKind) -> &'static [&'static str] {
        &[]
    }
}

/// Resolved input for one driver call
#[derive(Debug, Clone)]
pub struct DriverRequest<'a> {
    /// Logical resource name
    pub name: &'a str,

    /// Resource kind
    pub kind: ResourceKind,

    /// Properties with references resolved
    pub properties: &'a serde_json::Map<String, serde_json::Value>,

    /// Tags to attach
    pub tags: &'a BTreeMap<String, String>,

    /// Fields that differ from the applied state; empty on create
    pub changed: &'a [String],
}

impl DriverRequest<'_> {
    /// Whether an update touches `field`
    pub fn changes(&self, field: &str) -> bool {
        self.changed.iter().any(|f| f == field)
    }

    /// String property, if present
    pub fn str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    /// Boolean property, defaulting to false
    pub fn flag(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// List of strings, skipping non-string items
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.properties
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// What a driver returns after creating or updating a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Provider identifier
    pub id: String,

    /// Additional attributes consumers may reference
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ProvisionedResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Retry configuration for transient driver errors
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Configuration that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the given retry (1 = first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(2));
        assert_eq!(config.delay_for(3), Duration::from_secs(4));
        assert_eq!(config.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_driver_request_accessors() {
        let properties = serde_json::json!({
            "name": "sg",
            "ingress": ["a", 1, "b"],
            "public": true,
        });
        let properties = properties.as_object().unwrap().clone();
        let tags = BTreeMap::new();
        let request = DriverRequest {
            name: "sg",
            kind: ResourceKind::SecurityGroup,
            properties: &properties,
            tags: &tags,
            changed: &["tags".to_string()],
        };
        assert_eq!(request.str("name"), Some("sg"));
        assert!(request.changes("tags"));
        assert!(!request.changes("ingress"));
        assert_eq!(request.strings("ingress"), vec!["a", "b"]);
        assert!(request.flag("public"));
        assert!(!request.flag("missing"));
    }
}
