//! vaultstack cloud infrastructure
//!
//! This crate holds the provider-neutral half of vaultstack: the declarative
//! resource graph, the reconciliation engine contract, a state-backed engine,
//! image selection, and the output exporter.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 vaultstack CLI                   │
//! │            (plan / up / destroy)                 │
//! └─────────────────┬───────────────────────────────┘
//!                   │ StackDefinition
//! ┌─────────────────▼───────────────────────────────┐
//! │               vaultstack-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait ReconciliationEngine { plan, apply }│  │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ StateEngine  │  │  State Mgmt  │            │
//! │  └──────┬───────┘  └──────────────┘            │
//! └─────────┼───────────────────────────────────────┘
//!           │ trait ResourceDriver
//! ┌─────────▼───────────┐
//! │ vaultstack-cloud-aws │
//! │     (aws CLI)        │
//! └─────────────────────┘
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod graph;
pub mod image;
pub mod outputs;
pub mod reconcile;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use engine::{
    AuthStatus, DriverRequest, ProvisionedResource, ReconciliationEngine, ResourceDriver,
    RetryConfig,
};
pub use error::{CloudError, Result};
pub use graph::{OutputBinding, PropertyValue, Reference, ResourceKind, ResourceSpec, StackDefinition};
pub use image::{Image, ImageFilter, ImageSource, lookup_image, select_latest};
pub use outputs::export_outputs;
pub use reconcile::{StateEngine, plan_against};
pub use state::{ResourceState, ResourceStatus, StackState, StateLock, StateManager};
