//! Stack output exporter

use crate::error::{CloudError, Result};
use crate::graph::StackDefinition;
use crate::state::StackState;
use std::collections::BTreeMap;

/// Bind every declared output to its resolved value
///
/// Fails on the first output whose resource was never applied or whose
/// attribute the provider did not report.
pub fn export_outputs(stack: &StackDefinition, state: &StackState) -> Result<BTreeMap<String, String>> {
    let mut outputs = BTreeMap::new();
    for binding in stack.outputs() {
        let value = state.lookup(&binding.reference).ok_or_else(|| CloudError::UnresolvedOutput {
            output: binding.name.clone(),
            resource: binding.reference.resource.clone(),
            attribute: binding.reference.attribute.clone(),
        })?;
        outputs.insert(binding.name.clone(), value);
    }
    tracing::debug!(count = outputs.len(), "Exported stack outputs");
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Reference, ResourceKind, ResourceSpec};
    use crate::state::{ResourceState, ResourceStatus};

    fn stack() -> StackDefinition {
        let mut stack = StackDefinition::new("test");
        stack
            .add(ResourceSpec::new("bucket", ResourceKind::Bucket).property("bucket", "b"))
            .unwrap();
        stack
            .add(ResourceSpec::new("instance", ResourceKind::Instance))
            .unwrap();
        stack.output("bucketName", Reference::id("bucket"));
        stack.output("instancePublicIp", Reference::new("instance", "public_ip"));
        stack
    }

    #[test]
    fn test_outputs_bound_from_state() {
        let mut state = StackState::new();
        state.set_resource(
            "bucket",
            ResourceState::new("lab-bucket-1a2b", ResourceKind::Bucket).with_status(ResourceStatus::Ready),
        );
        state.set_resource(
            "instance",
            ResourceState::new("i-0123", ResourceKind::Instance)
                .with_attribute("public_ip", serde_json::json!("198.51.100.7")),
        );

        let outputs = export_outputs(&stack(), &state).unwrap();
        assert_eq!(outputs["bucketName"], "lab-bucket-1a2b");
        assert_eq!(outputs["instancePublicIp"], "198.51.100.7");
    }

    #[test]
    fn test_unapplied_resource_fails() {
        let mut state = StackState::new();
        state.set_resource("bucket", ResourceState::new("b-1", ResourceKind::Bucket));

        match export_outputs(&stack(), &state) {
            Err(CloudError::UnresolvedOutput { output, resource, attribute }) => {
                assert_eq!(output, "instancePublicIp");
                assert_eq!(resource, "instance");
                assert_eq!(attribute, "public_ip");
            }
            other => panic!("expected unresolved output, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_attribute_fails() {
        let mut state = StackState::new();
        state.set_resource("bucket", ResourceState::new("b-1", ResourceKind::Bucket));
        state.set_resource("instance", ResourceState::new("i-1", ResourceKind::Instance));

        assert!(matches!(
            export_outputs(&stack(), &state),
            Err(CloudError::UnresolvedOutput { .. })
        ));
    }
}
