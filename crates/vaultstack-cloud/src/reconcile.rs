//! State-backed reconciliation engine
//!
//! Plans by comparing each declared resource's property digests with the
//! digests recorded in `.vaultstack/state.json`, then applies the plan one
//! action at a time through a [`ResourceDriver`]. A change the driver cannot
//! make in place becomes a replacement: delete, then create. State is saved
//! after every successful operation, so a failed apply leaves exactly the
//! completed operations recorded. Nothing is rolled back.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::engine::{DriverRequest, ReconciliationEngine, ResourceDriver, RetryConfig};
use crate::error::{CloudError, Result};
use crate::graph::{Reference, ResourceSpec, StackDefinition, topological_order};
use crate::state::{ResourceState, ResourceStatus, StackState, StateManager};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Reconciliation engine backed by a local state file
pub struct StateEngine<D> {
    driver: D,
    state: StateManager,
    retry: RetryConfig,
}

impl<D: ResourceDriver> StateEngine<D> {
    pub fn new(driver: D, state: StateManager) -> Self {
        Self {
            driver,
            state,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Plan that removes every recorded resource
    pub async fn plan_destroy(&self) -> Result<Plan> {
        let state = self.state.load().await?;
        plan_against(&StackDefinition::new("destroy"), &state, &self.driver)
    }

    async fn retrying<T, F, Fut>(&self, resource: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        resource = %resource,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Execute one action, returning a message when something changed
    async fn apply_action(&self, action: &Action, state: &mut StackState) -> Result<Option<String>> {
        match action.action_type {
            ActionType::NoOp => Ok(None),
            ActionType::Create | ActionType::Update => {
                let spec = action.spec.as_ref().ok_or_else(|| {
                    CloudError::InvalidConfig(format!("action {} carries no resource spec", action.id))
                })?;
                let lookup = |r: &Reference| state.lookup(r);
                let properties = spec.resolve_properties(&lookup)?;
                let request = DriverRequest {
                    name: &spec.name,
                    kind: spec.kind,
                    properties: &properties,
                    tags: &spec.tags,
                    changed: &action.changed,
                };

                let mut record = ResourceState::new(String::new(), spec.kind);
                if action.action_type == ActionType::Create {
                    let provisioned = self
                        .retrying(&spec.name, || self.driver.create(&request))
                        .await?;
                    record.id = provisioned.id;
                    record.attributes = provisioned.attributes;
                } else {
                    let existing = state
                        .get_resource(&spec.name)
                        .ok_or_else(|| CloudError::ResourceNotFound(spec.name.clone()))?;
                    let id = existing.id.clone();
                    record.created_at = existing.created_at;
                    record.attributes = existing.attributes.clone();
                    let provisioned = self
                        .retrying(&spec.name, || self.driver.update(&id, &request))
                        .await?;
                    // attributes the update did not report keep their applied values
                    record.attributes.extend(provisioned.attributes);
                    record.id = provisioned.id;
                }

                let id = record.id.clone();
                let record = record
                    .with_status(ResourceStatus::Ready)
                    .with_digest(spec.digest())
                    .with_property_digests(spec.property_digests())
                    .with_dependencies(spec.dependencies().into_iter().map(String::from).collect());
                state.set_resource(spec.name.clone(), record);

                Ok(Some(format!(
                    "{} {} {} (id: {})",
                    action.action_type, spec.kind, spec.name, id
                )))
            }
            ActionType::Delete => {
                let id = match &action.provider_id {
                    Some(id) => id.clone(),
                    None => state
                        .get_resource(&action.resource)
                        .map(|r| r.id.clone())
                        .ok_or_else(|| CloudError::ResourceNotFound(action.resource.clone()))?,
                };

                self.mark(state, &action.resource, ResourceStatus::Deleting).await?;
                let deleted = self
                    .retrying(&action.resource, || self.driver.delete(action.kind, &id))
                    .await;
                if let Err(e) = deleted {
                    self.mark(state, &action.resource, ResourceStatus::Error).await?;
                    return Err(e);
                }

                state.remove_resource(&action.resource);
                Ok(Some(format!(
                    "delete {} {} (id: {})",
                    action.kind, action.resource, id
                )))
            }
        }
    }

    /// Record a status change and persist it before the next driver call
    async fn mark(&self, state: &mut StackState, resource: &str, status: ResourceStatus) -> Result<()> {
        if let Some(recorded) = state.resources.get_mut(resource) {
            recorded.status = status;
            recorded.updated_at = chrono::Utc::now();
            self.state.save(state).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<D: ResourceDriver> ReconciliationEngine for StateEngine<D> {
    async fn plan(&self, stack: &StackDefinition) -> Result<Plan> {
        let state = self.state.load().await?;
        let plan = plan_against(stack, &state, &self.driver)?;
        info!(
            stack = %stack.name(),
            driver = %self.driver.name(),
            summary = %plan.summary(),
            "Plan computed"
        );
        Ok(plan)
    }

    async fn apply(&self, plan: &Plan) -> Result<ApplyResult> {
        let lock = self.state.acquire_lock().await?;
        let mut state = self.state.load().await?;
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();
        let mut halted = false;

        for action in &plan.actions {
            if halted {
                if action.action_type != ActionType::NoOp {
                    result.skipped.push(action.id.clone());
                }
                continue;
            }

            match self.apply_action(action, &mut state).await {
                Ok(Some(message)) => {
                    self.state.save(&state).await?;
                    info!(resource = %action.resource, action = %action.action_type, "Applied");
                    result.add_success(action, message);
                }
                Ok(None) => {
                    debug!(resource = %action.resource, "Unchanged");
                }
                Err(e) => {
                    error!(resource = %action.resource, action = %action.action_type, error = %e, "Apply failed");
                    result.add_failure(action, e.to_string());
                    halted = true;
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        lock.release().await?;
        Ok(result)
    }

    async fn state(&self) -> Result<StackState> {
        self.state.load().await
    }
}

/// What the planner decided for one declared resource
enum Decision {
    Create,
    Replace(String),
    Update(Vec<String>),
    Unchanged,
}

/// Diff a declared stack against recorded state
///
/// Deletes come first, consumers before producers. They cover undeclared
/// resources and the old half of every replacement. Declared resources
/// follow in dependency order. A resource whose referenced producer is
/// created or replaced gets a new value for that property, so the same
/// update-or-replace rule applies to it.
pub fn plan_against(stack: &StackDefinition, state: &StackState, driver: &dyn ResourceDriver) -> Result<Plan> {
    stack.validate()?;
    let order = stack.dependency_order()?;

    let mut recreated: HashSet<&str> = HashSet::new();
    let mut decisions: Vec<(&ResourceSpec, Decision)> = Vec::with_capacity(order.len());
    for spec in order {
        let decision = match state.get_resource(&spec.name) {
            None => Decision::Create,
            Some(recorded) if recorded.kind != spec.kind => {
                return Err(CloudError::InvalidConfig(format!(
                    "resource '{}' changed kind from {} to {}; destroy it first",
                    spec.name, recorded.kind, spec.kind
                )));
            }
            Some(recorded) if recorded.status != ResourceStatus::Ready => {
                Decision::Replace(format!("recorded status is {}", recorded.status))
            }
            Some(recorded) => {
                let mut changed = changed_fields(spec, recorded);
                for field in spec.properties_referencing(&recreated) {
                    if !changed.iter().any(|c| c == field) {
                        changed.push(field.to_string());
                    }
                }
                let updatable = driver.updatable_fields(spec.kind);
                let fixed: Vec<&str> = changed
                    .iter()
                    .map(String::as_str)
                    .filter(|f| !updatable.contains(f))
                    .collect();
                if changed.is_empty() {
                    Decision::Unchanged
                } else if fixed.is_empty() {
                    Decision::Update(changed)
                } else {
                    Decision::Replace(format!("{} cannot change in place", fixed.join(", ")))
                }
            }
        };
        if matches!(decision, Decision::Create | Decision::Replace(_)) {
            recreated.insert(spec.name.as_str());
        }
        decisions.push((spec, decision));
    }

    let removed: Vec<(&str, Vec<&str>, String)> = state
        .resources
        .iter()
        .filter_map(|(name, r)| {
            let reason = match decisions.iter().find(|(s, _)| &s.name == name) {
                None => "no longer declared".to_string(),
                Some((_, Decision::Replace(reason))) => format!("replace: {}", reason),
                Some(_) => return None,
            };
            let deps = r.dependencies.iter().map(String::as_str).collect();
            Some((name.as_str(), deps, reason))
        })
        .collect();
    let graph: Vec<(&str, Vec<&str>)> = removed.iter().map(|(n, d, _)| (*n, d.clone())).collect();

    let mut actions = Vec::new();
    for i in topological_order(&graph)?.into_iter().rev() {
        let (name, _, reason) = &removed[i];
        let recorded = &state.resources[*name];
        actions.push(
            Action::new(ActionType::Delete, recorded.kind, *name, reason.clone())
                .with_provider_id(recorded.id.clone()),
        );
    }

    for (spec, decision) in decisions {
        let recorded = state.get_resource(&spec.name);
        let action = match decision {
            Decision::Create => Action::new(ActionType::Create, spec.kind, &spec.name, "not in state"),
            Decision::Replace(reason) => {
                Action::new(ActionType::Create, spec.kind, &spec.name, format!("replace: {}", reason))
            }
            Decision::Update(changed) => {
                let reason = format!("{} changed", changed.join(", "));
                let action = Action::new(ActionType::Update, spec.kind, &spec.name, reason).with_changes(changed);
                match recorded {
                    Some(r) => action.with_provider_id(r.id.clone()),
                    None => action,
                }
            }
            Decision::Unchanged => {
                let action = Action::new(ActionType::NoOp, spec.kind, &spec.name, "unchanged");
                match recorded {
                    Some(r) => action.with_provider_id(r.id.clone()),
                    None => action,
                }
            }
        };
        actions.push(action.with_spec(spec.clone()));
    }

    Ok(Plan::new(actions))
}

/// Fields whose digest differs from the applied state, sorted by name
fn changed_fields(spec: &ResourceSpec, recorded: &ResourceState) -> Vec<String> {
    if recorded.digest == spec.digest() {
        return Vec::new();
    }
    let declared = spec.property_digests();
    if recorded.property_digests.is_empty() {
        return declared.into_keys().collect();
    }
    let mut changed: Vec<String> = declared
        .iter()
        .filter(|(k, v)| recorded.property_digests.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    changed.extend(
        recorded
            .property_digests
            .keys()
            .filter(|k| !declared.contains_key(*k))
            .cloned(),
    );
    changed.sort();
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AuthStatus, ProvisionedResource};
    use crate::graph::{ResourceKind, ResourceSpec};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeDriver {
        calls: Mutex<Vec<String>>,
        received: Mutex<Vec<(String, serde_json::Map<String, serde_json::Value>)>>,
        fail_on: Option<String>,
        fail_deletes: bool,
        updatable: &'static [&'static str],
        transient_failures: AtomicU32,
        next_id: AtomicU32,
    }

    impl FakeDriver {
        fn failing_on(name: &str) -> Self {
            Self {
                fail_on: Some(name.to_string()),
                ..Default::default()
            }
        }

        fn updating(fields: &'static [&'static str]) -> Self {
            Self {
                updatable: fields,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn received(&self, name: &str) -> serde_json::Map<String, serde_json::Value> {
            self.received
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, p)| p.clone())
                .unwrap()
        }

        fn respond(&self, op: &str, request: &DriverRequest<'_>) -> Result<ProvisionedResource> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", op, request.name));
            self.received
                .lock()
                .unwrap()
                .push((request.name.to_string(), request.properties.clone()));

            if self.fail_on.as_deref() == Some(request.name) {
                return Err(CloudError::Provider("quota exceeded".to_string()));
            }
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(CloudError::Transient("throttled".to_string()));
            }

            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(ProvisionedResource::new(format!("{}-{}", request.kind, n))
                .with_attribute("arn", format!("arn:fake:{}", request.name)))
        }
    }

    #[async_trait]
    impl ResourceDriver for FakeDriver {
        fn name(&self) -> &str {
            "fake"
        }

        async fn check_auth(&self) -> Result<AuthStatus> {
            Ok(AuthStatus::ok("fake-account"))
        }

        async fn create(&self, request: &DriverRequest<'_>) -> Result<ProvisionedResource> {
            self.respond("create", request)
        }

        async fn update(&self, id: &str, request: &DriverRequest<'_>) -> Result<ProvisionedResource> {
            self.respond("update", request)
                .map(|p| ProvisionedResource { id: id.to_string(), ..p })
        }

        async fn delete(&self, _kind: ResourceKind, id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {}", id));
            if self.fail_deletes {
                return Err(CloudError::Provider("DependencyViolation".to_string()));
            }
            Ok(())
        }

        fn updatable_fields(&self, _kind: ResourceKind) -> &'static [&'static str] {
            self.updatable
        }
    }

    fn engine(driver: FakeDriver, root: &std::path::Path) -> StateEngine<FakeDriver> {
        StateEngine::new(driver, StateManager::new(root)).with_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        })
    }

    fn stack(user_data: &str) -> StackDefinition {
        stack_named(user_data, "lab")
    }

    fn stack_named(user_data: &str, name_tag: &str) -> StackDefinition {
        let mut stack = StackDefinition::new("test");
        stack
            .add(ResourceSpec::new("vpc", ResourceKind::Vpc).property("cidr_block", "10.0.0.0/16"))
            .unwrap();
        stack
            .add(
                ResourceSpec::new("subnet", ResourceKind::Subnet)
                    .property("vpc_id", Reference::id("vpc"))
                    .property("cidr_block", "10.0.1.0/24"),
            )
            .unwrap();
        stack
            .add(
                ResourceSpec::new("bucket", ResourceKind::Bucket)
                    .property("bucket", "lab-bucket")
                    .property("user_data", user_data)
                    .tag("Name", name_tag),
            )
            .unwrap();
        stack.output("bucketName", Reference::id("bucket"));
        stack
    }

    #[tokio::test]
    async fn test_first_plan_creates_in_dependency_order() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::default(), dir.path());

        let plan = engine.plan(&stack("data")).await.unwrap();
        let order: Vec<(&str, ActionType)> = plan
            .actions
            .iter()
            .map(|a| (a.resource.as_str(), a.action_type))
            .collect();
        assert_eq!(
            order,
            vec![
                ("vpc", ActionType::Create),
                ("subnet", ActionType::Create),
                ("bucket", ActionType::Create),
            ]
        );
        assert!(engine.driver().calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::default(), dir.path());
        let stack = stack("data");

        let plan = engine.plan(&stack).await.unwrap();
        let result = engine.apply(&plan).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.succeeded.len(), 3);

        let second = engine.plan(&stack).await.unwrap();
        assert!(!second.has_changes);
        assert_eq!(second.summary().no_change, 3);

        let calls_before = engine.driver().calls().len();
        let result = engine.apply(&second).await.unwrap();
        assert!(result.succeeded.is_empty());
        assert_eq!(engine.driver().calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_references_resolved_from_state() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::default(), dir.path());

        let plan = engine.plan(&stack("data")).await.unwrap();
        engine.apply(&plan).await.unwrap();

        let state = engine.state().await.unwrap();
        let vpc_id = state.get_resource("vpc").unwrap().id.clone();
        let subnet_props = engine.driver().received("subnet");
        assert_eq!(subnet_props["vpc_id"], serde_json::Value::String(vpc_id));
        assert_eq!(
            state.get_resource("subnet").unwrap().dependencies,
            vec!["vpc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_tag_change_updates_in_place() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::updating(&["tags"]), dir.path());
        let plan = engine.plan(&stack("data")).await.unwrap();
        engine.apply(&plan).await.unwrap();
        let bucket_id = engine.state().await.unwrap().get_resource("bucket").unwrap().id.clone();

        let retagged = stack_named("data", "lab-renamed");
        let plan = engine.plan(&retagged).await.unwrap();
        let summary = plan.summary();
        assert_eq!(summary.update, 1);
        assert_eq!(summary.no_change, 2);
        assert_eq!(summary.delete, 0);
        let update = plan.actions_by_type(ActionType::Update)[0];
        assert_eq!(update.resource, "bucket");
        assert_eq!(update.changed, vec!["tags".to_string()]);

        let result = engine.apply(&plan).await.unwrap();
        assert!(result.is_success());
        assert!(engine.driver().calls().contains(&"update bucket".to_string()));

        let state = engine.state().await.unwrap();
        let bucket = state.get_resource("bucket").unwrap();
        assert_eq!(bucket.id, bucket_id);
        assert_eq!(bucket.attribute_string("arn").as_deref(), Some("arn:fake:bucket"));
        assert!(!engine.plan(&retagged).await.unwrap().has_changes);
    }

    #[tokio::test]
    async fn test_fixed_property_change_replaces() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::updating(&["tags"]), dir.path());
        let plan = engine.plan(&stack("data")).await.unwrap();
        engine.apply(&plan).await.unwrap();
        let old_id = engine.state().await.unwrap().get_resource("bucket").unwrap().id.clone();

        let plan = engine.plan(&stack("other data")).await.unwrap();
        let summary = plan.summary();
        assert_eq!((summary.delete, summary.create, summary.update), (1, 1, 0));
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);
        assert_eq!(plan.actions[0].resource, "bucket");
        assert!(plan.actions[0].reason.contains("user_data"));

        let result = engine.apply(&plan).await.unwrap();
        assert!(result.is_success());
        let calls = engine.driver().calls();
        assert!(calls.contains(&format!("delete {}", old_id)));
        assert_eq!(calls.last().map(String::as_str), Some("create bucket"));
        assert!(!calls.iter().any(|c| c.starts_with("update")));

        let state = engine.state().await.unwrap();
        assert_ne!(state.get_resource("bucket").unwrap().id, old_id);
        assert!(!engine.plan(&stack("other data")).await.unwrap().has_changes);
    }

    #[tokio::test]
    async fn test_failed_delete_is_recorded_and_replaced() {
        let dir = tempdir().unwrap();
        let mut driver = FakeDriver::default();
        driver.fail_deletes = true;
        let engine = engine(driver, dir.path());
        let plan = engine.plan(&stack("data")).await.unwrap();
        engine.apply(&plan).await.unwrap();

        let plan = engine.plan_destroy().await.unwrap();
        let result = engine.apply(&plan).await.unwrap();
        assert!(!result.is_success());
        let failed = result.first_failure().unwrap().resource.clone();

        let state = engine.state().await.unwrap();
        assert_eq!(state.len(), 3);
        assert_eq!(state.get_resource(&failed).unwrap().status, ResourceStatus::Error);

        let plan = engine.plan(&stack("data")).await.unwrap();
        let delete = plan
            .actions_by_type(ActionType::Delete)
            .into_iter()
            .find(|a| a.resource == failed)
            .unwrap();
        assert!(delete.reason.contains("error"));
        assert!(
            plan.actions
                .iter()
                .any(|a| a.resource == failed && a.action_type == ActionType::Create)
        );
    }

    #[tokio::test]
    async fn test_removed_resource_deleted_first() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::default(), dir.path());
        let plan = engine.plan(&stack("data")).await.unwrap();
        engine.apply(&plan).await.unwrap();

        let mut smaller = StackDefinition::new("test");
        smaller
            .add(ResourceSpec::new("bucket", ResourceKind::Bucket)
                .property("bucket", "lab-bucket")
                .property("user_data", "data")
                .tag("Name", "lab"))
            .unwrap();

        let plan = engine.plan(&smaller).await.unwrap();
        let deletes: Vec<&str> = plan
            .actions_by_type(ActionType::Delete)
            .iter()
            .map(|a| a.resource.as_str())
            .collect();
        // subnet consumes vpc, so it goes first
        assert_eq!(deletes, vec!["subnet", "vpc"]);
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);

        engine.apply(&plan).await.unwrap();
        let state = engine.state().await.unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.get_resource("bucket").is_some());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_succeeded_state() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::failing_on("subnet"), dir.path());

        let plan = engine.plan(&stack("data")).await.unwrap();
        let result = engine.apply(&plan).await.unwrap();

        assert!(!result.is_success());
        let failure = result.first_failure().unwrap();
        assert_eq!(failure.resource, "subnet");
        assert!(failure.error.as_deref().unwrap().contains("quota exceeded"));
        assert_eq!(result.skipped, vec!["create-bucket".to_string()]);

        let state = engine.state().await.unwrap();
        assert!(state.get_resource("vpc").is_some());
        assert!(state.get_resource("subnet").is_none());
        assert!(state.get_resource("bucket").is_none());

        // No rollback happened
        assert!(!engine.driver().calls().iter().any(|c| c.starts_with("delete")));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::default();
        driver.transient_failures.store(2, Ordering::SeqCst);
        let engine = engine(driver, dir.path());

        let plan = engine.plan(&stack("data")).await.unwrap();
        let result = engine.apply(&plan).await.unwrap();

        assert!(result.is_success());
        let vpc_attempts = engine
            .driver()
            .calls()
            .iter()
            .filter(|c| *c == "create vpc")
            .count();
        assert_eq!(vpc_attempts, 3);
    }

    #[tokio::test]
    async fn test_dangling_reference_never_reaches_driver() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::default(), dir.path());

        let mut broken = stack("data");
        broken
            .add(
                ResourceSpec::new("igw", ResourceKind::InternetGateway)
                    .property("vpc_id", Reference::id("no-such-vpc")),
            )
            .unwrap();

        assert!(matches!(
            engine.plan(&broken).await,
            Err(CloudError::DanglingReference { .. })
        ));
        assert!(engine.driver().calls().is_empty());
    }

    #[tokio::test]
    async fn test_state_file_has_no_property_values() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::default(), dir.path());

        let plan = engine.plan(&stack("MIIEvQIBADANBgkqhkiG9w0BAQEFAASC")).await.unwrap();
        engine.apply(&plan).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(".vaultstack/state.json")).unwrap();
        assert!(!raw.contains("MIIEvQIBADANBgkqhkiG9w0BAQEFAASC"));
        assert!(raw.contains("\"digest\""));
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let dir = tempdir().unwrap();
        let engine = engine(FakeDriver::default(), dir.path());
        let plan = engine.plan(&stack("data")).await.unwrap();
        engine.apply(&plan).await.unwrap();

        let plan = engine.plan_destroy().await.unwrap();
        assert_eq!(plan.summary().delete, 3);
        engine.apply(&plan).await.unwrap();
        assert!(engine.state().await.unwrap().is_empty());
    }

    #[test]
    fn test_recreated_dependency_cascades_replace() {
        let declared = stack("d");
        let subnet = declared.get("subnet").unwrap();
        let mut state = StackState::new();
        state.set_resource(
            "subnet",
            ResourceState::new("subnet-1", ResourceKind::Subnet)
                .with_status(ResourceStatus::Ready)
                .with_digest(subnet.digest())
                .with_property_digests(subnet.property_digests())
                .with_dependencies(vec!["vpc".to_string()]),
        );

        let plan = plan_against(&declared, &state, &FakeDriver::updating(&["tags"])).unwrap();
        let order: Vec<(&str, ActionType)> = plan
            .actions
            .iter()
            .map(|a| (a.resource.as_str(), a.action_type))
            .collect();
        assert_eq!(
            order,
            vec![
                ("subnet", ActionType::Delete),
                ("vpc", ActionType::Create),
                ("subnet", ActionType::Create),
                ("bucket", ActionType::Create),
            ]
        );
        assert!(plan.actions[0].reason.contains("vpc_id"));
        assert_eq!(plan.actions[0].provider_id.as_deref(), Some("subnet-1"));
    }

    #[test]
    fn test_state_without_field_digests_replaces() {
        let declared = stack("d");
        let mut state = StackState::new();
        state.set_resource(
            "vpc",
            ResourceState::new("vpc-1", ResourceKind::Vpc)
                .with_status(ResourceStatus::Ready)
                .with_digest("stale"),
        );

        let plan = plan_against(&declared, &state, &FakeDriver::updating(&["tags"])).unwrap();
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);
        assert!(plan.actions[0].reason.contains("cidr_block"));
        assert!(plan.actions_by_type(ActionType::Update).is_empty());
    }
}
