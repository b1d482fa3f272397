//! Declarative resource graph
//!
//! A [`StackDefinition`] is the complete desired state submitted to the
//! reconciliation engine in one pass. Resources reference each other either
//! implicitly, through a [`PropertyValue::Ref`] in their property bag, or
//! explicitly through `depends_on`. Building a stack performs no I/O.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Kind of cloud object a resource spec describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    InternetGateway,
    RouteTable,
    Route,
    RouteTableAssociation,
    SecurityGroup,
    IamRole,
    IamRolePolicyAttachment,
    IamInstanceProfile,
    Instance,
    Bucket,
    KmsKey,
    KmsAlias,
    VpcEndpoint,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::Route => "route",
            ResourceKind::RouteTableAssociation => "route-table-association",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::IamRole => "iam-role",
            ResourceKind::IamRolePolicyAttachment => "iam-role-policy-attachment",
            ResourceKind::IamInstanceProfile => "iam-instance-profile",
            ResourceKind::Instance => "instance",
            ResourceKind::Bucket => "bucket",
            ResourceKind::KmsKey => "kms-key",
            ResourceKind::KmsAlias => "kms-alias",
            ResourceKind::VpcEndpoint => "vpc-endpoint",
        }
    }

    /// Properties that must be present before the resource can be submitted
    pub fn required_properties(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Vpc => &["cidr_block"],
            ResourceKind::Subnet => &["vpc_id", "cidr_block"],
            ResourceKind::InternetGateway => &["vpc_id"],
            ResourceKind::RouteTable => &["vpc_id"],
            ResourceKind::Route => &["route_table_id", "destination_cidr_block", "gateway_id"],
            ResourceKind::RouteTableAssociation => &["subnet_id", "route_table_id"],
            ResourceKind::SecurityGroup => &["vpc_id", "name", "description"],
            ResourceKind::IamRole => &["name", "assume_role_policy"],
            ResourceKind::IamRolePolicyAttachment => &["role", "policy_arn"],
            ResourceKind::IamInstanceProfile => &["name", "role"],
            ResourceKind::Instance => &[
                "ami",
                "instance_type",
                "subnet_id",
                "security_group_ids",
                "iam_instance_profile",
            ],
            ResourceKind::Bucket => &["bucket"],
            ResourceKind::KmsKey => &["key_usage"],
            ResourceKind::KmsAlias => &["name", "target_key_id"],
            ResourceKind::VpcEndpoint => &["vpc_id", "service_name", "vpc_endpoint_type"],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an attribute another resource exposes after it is applied
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// Logical name of the producing resource
    pub resource: String,

    /// Attribute name (e.g. "id", "arn", "public_ip")
    pub attribute: String,
}

impl Reference {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// Reference to the provider identifier of a resource
    pub fn id(resource: impl Into<String>) -> Self {
        Self::new(resource, "id")
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// A single property value in a resource spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    /// Value known at build time
    Literal(serde_json::Value),
    /// Value produced by another resource, known only after it is applied
    Ref(Reference),
    /// List that may mix literals and references
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// All references contained in this value, depth first
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            PropertyValue::Literal(_) => Vec::new(),
            PropertyValue::Ref(r) => vec![r],
            PropertyValue::List(items) => items.iter().flat_map(|v| v.references()).collect(),
        }
    }

    /// Replace references with the strings `lookup` returns for them
    pub fn resolve<F>(&self, lookup: &F) -> Result<serde_json::Value>
    where
        F: Fn(&Reference) -> Option<String>,
    {
        match self {
            PropertyValue::Literal(v) => Ok(v.clone()),
            PropertyValue::Ref(r) => lookup(r).map(serde_json::Value::String).ok_or_else(|| {
                CloudError::UnresolvedReference {
                    resource: r.resource.clone(),
                    attribute: r.attribute.clone(),
                }
            }),
            PropertyValue::List(items) => items
                .iter()
                .map(|v| v.resolve(lookup))
                .collect::<Result<Vec<_>>>()
                .map(serde_json::Value::Array),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Literal(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Literal(serde_json::Value::String(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Literal(serde_json::Value::Bool(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Literal(serde_json::Value::from(value))
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        PropertyValue::Literal(value)
    }
}

impl From<Reference> for PropertyValue {
    fn from(value: Reference) -> Self {
        PropertyValue::Ref(value)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(value: Vec<PropertyValue>) -> Self {
        PropertyValue::List(value)
    }
}

/// One cloud object that should exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Logical name, unique within the stack
    pub name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Property bag handed to the driver after references are resolved
    pub properties: BTreeMap<String, PropertyValue>,

    /// Tags attached to the cloud object
    pub tags: BTreeMap<String, String>,

    /// Explicit ordering edges that no property expresses
    pub depends_on: Vec<String>,
}

impl ResourceSpec {
    /// Field name the tag set is tracked under when diffing
    pub const TAGS: &'static str = "tags";

    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: BTreeMap::new(),
            tags: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Property bound to another resource's attribute
    pub fn reference(self, key: impl Into<String>, resource: &str, attribute: &str) -> Self {
        self.property(key, Reference::new(resource, attribute))
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, resource: impl Into<String>) -> Self {
        let resource = resource.into();
        if !self.depends_on.contains(&resource) {
            self.depends_on.push(resource);
        }
        self
    }

    /// Names of every resource this one consumes, implicit edges first
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        let implicit = self
            .properties
            .values()
            .flat_map(|v| v.references())
            .map(|r| r.resource.as_str());
        for name in implicit.chain(self.depends_on.iter().map(String::as_str)) {
            if !deps.contains(&name) {
                deps.push(name);
            }
        }
        deps
    }

    /// Resolve the property bag into plain JSON for a driver call
    pub fn resolve_properties<F>(&self, lookup: &F) -> Result<serde_json::Map<String, serde_json::Value>>
    where
        F: Fn(&Reference) -> Option<String>,
    {
        self.properties
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.resolve(lookup)?)))
            .collect()
    }

    /// SHA-256 over the declared kind, properties, and tags
    ///
    /// State stores this digest instead of the properties so values such as
    /// user data never reach the state file.
    pub fn digest(&self) -> String {
        sha256_hex(&serde_json::json!({
            "kind": self.kind,
            "properties": self.properties,
            "tags": self.tags,
        }))
    }

    /// One digest per property plus one for the tag set under [`Self::TAGS`]
    ///
    /// Lets the planner name the fields that changed without keeping values.
    pub fn property_digests(&self) -> BTreeMap<String, String> {
        let mut digests: BTreeMap<String, String> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), sha256_hex(&serde_json::json!(v))))
            .collect();
        digests.insert(Self::TAGS.to_string(), sha256_hex(&serde_json::json!(self.tags)));
        digests
    }

    /// Properties holding a reference to any of `resources`
    pub fn properties_referencing(&self, resources: &HashSet<&str>) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(_, v)| v.references().iter().any(|r| resources.contains(r.resource.as_str())))
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

fn sha256_hex(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Named result exported after apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBinding {
    pub name: String,
    pub reference: Reference,
}

/// Full desired-state description submitted in one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct StackDefinition {
    name: String,
    resources: Vec<ResourceSpec>,
    index: HashMap<String, usize>,
    outputs: Vec<OutputBinding>,
}

impl StackDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a resource; names must be unique
    pub fn add(&mut self, spec: ResourceSpec) -> Result<()> {
        if self.index.contains_key(&spec.name) {
            return Err(CloudError::DuplicateResource(spec.name));
        }
        self.index.insert(spec.name.clone(), self.resources.len());
        self.resources.push(spec);
        Ok(())
    }

    /// Bind a named output to a resource attribute
    pub fn output(&mut self, name: impl Into<String>, reference: Reference) {
        self.outputs.push(OutputBinding {
            name: name.into(),
            reference,
        });
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.index.get(name).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter()
    }

    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Check required properties, references, and cycles
    pub fn validate(&self) -> Result<()> {
        for spec in &self.resources {
            for property in spec.kind.required_properties() {
                if !spec.properties.contains_key(*property) {
                    return Err(CloudError::MissingProperty {
                        resource: spec.name.clone(),
                        kind: spec.kind.to_string(),
                        property: property.to_string(),
                    });
                }
            }
        }

        self.check_references()?;
        self.dependency_order()?;

        tracing::debug!(
            stack = %self.name,
            resources = self.resources.len(),
            outputs = self.outputs.len(),
            "Stack definition validated"
        );
        Ok(())
    }

    fn check_references(&self) -> Result<()> {
        for spec in &self.resources {
            for dep in spec.dependencies() {
                if !self.contains(dep) {
                    return Err(CloudError::DanglingReference {
                        resource: spec.name.clone(),
                        target: dep.to_string(),
                    });
                }
            }
        }
        for output in &self.outputs {
            if !self.contains(&output.reference.resource) {
                return Err(CloudError::DanglingReference {
                    resource: format!("output:{}", output.name),
                    target: output.reference.resource.clone(),
                });
            }
        }
        Ok(())
    }

    /// Producers before consumers; ties keep declaration order
    pub fn dependency_order(&self) -> Result<Vec<&ResourceSpec>> {
        self.check_references()?;
        let nodes: Vec<(&str, Vec<&str>)> = self
            .resources
            .iter()
            .map(|s| (s.name.as_str(), s.dependencies()))
            .collect();
        let order = topological_order(&nodes)?;
        Ok(order.into_iter().map(|i| &self.resources[i]).collect())
    }

    /// Reject tags whose value contains any of the given secret strings
    pub fn validate_tags(&self, secrets: &[&str]) -> Result<()> {
        for spec in &self.resources {
            for (key, value) in &spec.tags {
                let leaked = secrets
                    .iter()
                    .filter(|s| !s.is_empty())
                    .any(|s| value.contains(*s));
                if leaked {
                    return Err(CloudError::SecretInTags {
                        resource: spec.name.clone(),
                        tag: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Kahn's algorithm over `(name, dependencies)` pairs
///
/// Returns node indices, lowest index first among ready nodes. Dependencies
/// naming a node that is not in the list are ignored.
pub(crate) fn topological_order(nodes: &[(&str, Vec<&str>)]) -> Result<Vec<usize>> {
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (*name, i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, (_, deps)) in nodes.iter().enumerate() {
        for dep in deps {
            if let Some(&d) = position.get(dep) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = (0..nodes.len())
            .filter(|i| in_degree[*i] > 0)
            .map(|i| nodes[i].0)
            .collect();
        return Err(CloudError::CircularDependency(stuck.join(", ")));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_stack() -> StackDefinition {
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
    }

    #[test]
    fn test_valid_stack() {
        let stack = network_stack();
        assert!(stack.validate().is_ok());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut stack = network_stack();
        let err = stack
            .add(ResourceSpec::new("vpc", ResourceKind::Vpc).property("cidr_block", "10.1.0.0/16"))
            .unwrap_err();
        assert!(matches!(err, CloudError::DuplicateResource(name) if name == "vpc"));
    }

    #[test]
    fn test_dangling_reference_fails_validation() {
        let mut stack = network_stack();
        stack
            .add(
                ResourceSpec::new("igw", ResourceKind::InternetGateway)
                    .property("vpc_id", Reference::id("missing-vpc")),
            )
            .unwrap();

        match stack.validate() {
            Err(CloudError::DanglingReference { resource, target }) => {
                assert_eq!(resource, "igw");
                assert_eq!(target, "missing-vpc");
            }
            other => panic!("expected dangling reference, got {:?}", other),
        }
    }

    #[test]
    fn test_dangling_depends_on_fails_validation() {
        let mut stack = network_stack();
        stack
            .add(
                ResourceSpec::new("rt", ResourceKind::RouteTable)
                    .property("vpc_id", Reference::id("vpc"))
                    .depends_on("nowhere"),
            )
            .unwrap();
        assert!(matches!(
            stack.validate(),
            Err(CloudError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_dangling_output_fails_validation() {
        let mut stack = network_stack();
        stack.output("bucketName", Reference::id("bucket"));
        assert!(matches!(
            stack.validate(),
            Err(CloudError::DanglingReference { target, .. }) if target == "bucket"
        ));
    }

    #[test]
    fn test_missing_required_property() {
        let mut stack = StackDefinition::new("test");
        stack.add(ResourceSpec::new("vpc", ResourceKind::Vpc)).unwrap();
        match stack.validate() {
            Err(CloudError::MissingProperty { property, .. }) => assert_eq!(property, "cidr_block"),
            other => panic!("expected missing property, got {:?}", other),
        }
    }

    #[test]
    fn test_dependency_order_producers_first() {
        let mut stack = StackDefinition::new("test");
        // Declared consumer-first on purpose
        stack
            .add(
                ResourceSpec::new("subnet", ResourceKind::Subnet)
                    .property("vpc_id", Reference::id("vpc"))
                    .property("cidr_block", "10.0.1.0/24"),
            )
            .unwrap();
        stack
            .add(ResourceSpec::new("bucket", ResourceKind::Bucket).property("bucket", "b"))
            .unwrap();
        stack
            .add(ResourceSpec::new("vpc", ResourceKind::Vpc).property("cidr_block", "10.0.0.0/16"))
            .unwrap();

        let order: Vec<&str> = stack
            .dependency_order()
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(order, vec!["bucket", "vpc", "subnet"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut stack = StackDefinition::new("test");
        stack
            .add(
                ResourceSpec::new("a", ResourceKind::RouteTable)
                    .property("vpc_id", Reference::id("b")),
            )
            .unwrap();
        stack
            .add(
                ResourceSpec::new("b", ResourceKind::RouteTable)
                    .property("vpc_id", Reference::id("a")),
            )
            .unwrap();
        assert!(matches!(
            stack.validate(),
            Err(CloudError::CircularDependency(_))
        ));
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let spec = ResourceSpec::new("route", ResourceKind::Route)
            .property("route_table_id", Reference::id("rt"))
            .property("gateway_id", Reference::id("igw"))
            .property("destination_cidr_block", "0.0.0.0/0")
            .depends_on("igw")
            .depends_on("igw");
        assert_eq!(spec.dependencies(), vec!["igw", "rt"]);
        assert_eq!(spec.depends_on.len(), 1);
    }

    #[test]
    fn test_resolve_properties() {
        let spec = ResourceSpec::new("sg", ResourceKind::SecurityGroup)
            .property("vpc_id", Reference::id("vpc"))
            .property(
                "ids",
                vec![PropertyValue::from(Reference::id("vpc")), "literal".into()],
            );
        let lookup = |r: &Reference| (r.resource == "vpc").then(|| "vpc-123".to_string());
        let resolved = spec.resolve_properties(&lookup).unwrap();
        assert_eq!(resolved["vpc_id"], "vpc-123");
        assert_eq!(resolved["ids"], serde_json::json!(["vpc-123", "literal"]));

        let missing = |_: &Reference| -> Option<String> { None };
        assert!(matches!(
            spec.resolve_properties(&missing),
            Err(CloudError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_property_digests_name_changed_fields() {
        let before = ResourceSpec::new("i", ResourceKind::Instance)
            .property("ami", "ami-old")
            .property("subnet_id", Reference::id("subnet"))
            .tag("Name", "lab");
        let after = before.clone().property("ami", "ami-new");
        let retagged = before.clone().tag("Owner", "ops");

        let a = before.property_digests();
        let b = after.property_digests();
        let c = retagged.property_digests();
        assert_eq!(a.len(), 3);
        assert_ne!(a["ami"], b["ami"]);
        assert_eq!(a["subnet_id"], b["subnet_id"]);
        assert_eq!(a[ResourceSpec::TAGS], b[ResourceSpec::TAGS]);
        assert_ne!(a[ResourceSpec::TAGS], c[ResourceSpec::TAGS]);
        assert_eq!(a["ami"], c["ami"]);
    }

    #[test]
    fn test_properties_referencing() {
        let spec = ResourceSpec::new("i", ResourceKind::Instance)
            .property("subnet_id", Reference::id("subnet"))
            .property("iam_instance_profile", Reference::id("profile"))
            .property("ami", "ami-1")
            .depends_on("alias");
        let replaced: HashSet<&str> = ["subnet", "alias"].into_iter().collect();
        assert_eq!(spec.properties_referencing(&replaced), vec!["subnet_id"]);
    }

    #[test]
    fn test_digest_stable_and_sensitive() {
        let a = ResourceSpec::new("b", ResourceKind::Bucket)
            .property("bucket", "x")
            .tag("Name", "lab");
        let b = a.clone();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        let c = a.clone().tag("Name", "other");
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_validate_tags_rejects_secret() {
        let mut stack = StackDefinition::new("test");
        stack
            .add(
                ResourceSpec::new("bucket", ResourceKind::Bucket)
                    .property("bucket", "b")
                    .tag("PrivateKey", "prefix-MIIEvQ-suffix"),
            )
            .unwrap();
        assert!(matches!(
            stack.validate_tags(&["MIIEvQ"]),
            Err(CloudError::SecretInTags { tag, .. }) if tag == "PrivateKey"
        ));
        assert!(stack.validate_tags(&["unrelated", ""]).is_ok());
    }
}
