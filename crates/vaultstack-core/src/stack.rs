//! Stack builder
//!
//! Declares the complete environment as a [`StackDefinition`]. Building is
//! pure: the key material and image arrive already loaded, and nothing here
//! talks to the provider.

use crate::error::Result;
use crate::model::StackConfig;
use crate::secret::KeyMaterial;
use crate::userdata::{ImportScriptInputs, UserDataInputs, render_user_data};
use serde_json::json;
use vaultstack_cloud::{Image, PropertyValue, Reference, ResourceKind, ResourceSpec, StackDefinition};

pub const VPC: &str = "vpc";
pub const SUBNET: &str = "subnet";
pub const INTERNET_GATEWAY: &str = "internet-gateway";
pub const ROUTE_TABLE: &str = "route-table";
pub const DEFAULT_ROUTE: &str = "default-route";
pub const SUBNET_ROUTE_TABLE: &str = "subnet-route-table";
pub const SECURITY_GROUP: &str = "security-group";
pub const INSTANCE_ROLE: &str = "instance-role";
pub const S3_ACCESS: &str = "s3-access";
pub const KMS_ACCESS: &str = "kms-access";
pub const INSTANCE_PROFILE: &str = "instance-profile";
pub const BUCKET: &str = "bucket";
pub const KMS_KEY: &str = "kms-key";
pub const KMS_ALIAS: &str = "kms-alias";
pub const S3_ENDPOINT: &str = "s3-endpoint";
pub const INSTANCE: &str = "instance";

const S3_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3FullAccess";
const KMS_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AWSKeyManagementServicePowerUser";

/// Render the boot script for this stack
pub fn render_stack_user_data(config: &StackConfig, material: &KeyMaterial) -> Result<String> {
    render_user_data(&UserDataInputs {
        public_key: material.public_key().body(),
        private_key: material.private_key().body(),
        // the alias is known before apply, which keeps the rendering stable
        key_id: &config.kms.alias,
        import: ImportScriptInputs {
            region: &config.region,
            description: &config.kms.imported_description,
            alias_name: &config.kms.imported_alias,
        },
    })
}

/// Declare every resource of the environment and its outputs
pub fn build_stack(config: &StackConfig, material: &KeyMaterial, image: &Image) -> Result<StackDefinition> {
    let user_data = render_stack_user_data(config, material)?;
    let tagged = |spec: ResourceSpec, name: String| -> ResourceSpec {
        let spec = config
            .tags
            .iter()
            .fold(spec, |spec, (k, v)| spec.tag(k.as_str(), v.as_str()));
        spec.tag("Name", name)
    };

    let mut stack = StackDefinition::new(&config.name);

    // network
    stack.add(tagged(
        ResourceSpec::new(VPC, ResourceKind::Vpc)
            .property("cidr_block", config.network.vpc_cidr.as_str())
            .property("enable_dns_support", true)
            .property("enable_dns_hostnames", true),
        config.resource_name("vpc"),
    ))?;

    let mut subnet = ResourceSpec::new(SUBNET, ResourceKind::Subnet)
        .reference("vpc_id", VPC, "id")
        .property("cidr_block", config.network.subnet_cidr.as_str())
        .property("map_public_ip_on_launch", true);
    if let Some(zone) = &config.network.availability_zone {
        subnet = subnet.property("availability_zone", zone.as_str());
    }
    stack.add(tagged(subnet, config.resource_name("public-subnet")))?;

    stack.add(tagged(
        ResourceSpec::new(INTERNET_GATEWAY, ResourceKind::InternetGateway).reference("vpc_id", VPC, "id"),
        config.resource_name("igw"),
    ))?;

    stack.add(tagged(
        ResourceSpec::new(ROUTE_TABLE, ResourceKind::RouteTable).reference("vpc_id", VPC, "id"),
        config.resource_name("public-rt"),
    ))?;

    stack.add(
        ResourceSpec::new(DEFAULT_ROUTE, ResourceKind::Route)
            .reference("route_table_id", ROUTE_TABLE, "id")
            .property("destination_cidr_block", "0.0.0.0/0")
            .reference("gateway_id", INTERNET_GATEWAY, "id"),
    )?;

    stack.add(
        ResourceSpec::new(SUBNET_ROUTE_TABLE, ResourceKind::RouteTableAssociation)
            .reference("subnet_id", SUBNET, "id")
            .reference("route_table_id", ROUTE_TABLE, "id"),
    )?;

    stack.add(tagged(
        ResourceSpec::new(SECURITY_GROUP, ResourceKind::SecurityGroup)
            .reference("vpc_id", VPC, "id")
            .property("name", config.resource_name("sg"))
            .property("description", "SSH inbound, all outbound")
            .property(
                "ingress",
                json!([{
                    "protocol": "tcp",
                    "from_port": 22,
                    "to_port": 22,
                    "cidr_blocks": [config.network.ssh_cidr],
                }]),
            ),
        config.resource_name("sg"),
    ))?;

    // identity
    let assume_role_policy = json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "ec2.amazonaws.com" },
            "Action": "sts:AssumeRole",
        }],
    });
    stack.add(tagged(
        ResourceSpec::new(INSTANCE_ROLE, ResourceKind::IamRole)
            .property("name", config.resource_name("instance-role"))
            .property("assume_role_policy", assume_role_policy.to_string()),
        config.resource_name("instance-role"),
    ))?;

    for (name, policy) in [(S3_ACCESS, S3_POLICY_ARN), (KMS_ACCESS, KMS_POLICY_ARN)] {
        stack.add(
            ResourceSpec::new(name, ResourceKind::IamRolePolicyAttachment)
                .reference("role", INSTANCE_ROLE, "id")
                .property("policy_arn", policy),
        )?;
    }

    stack.add(
        ResourceSpec::new(INSTANCE_PROFILE, ResourceKind::IamInstanceProfile)
            .property("name", config.resource_name("instance-profile"))
            .reference("role", INSTANCE_ROLE, "id"),
    )?;

    // storage and keys
    stack.add(tagged(
        ResourceSpec::new(BUCKET, ResourceKind::Bucket).property("bucket", config.bucket.name.as_str()),
        config.bucket.name.clone(),
    ))?;

    stack.add(tagged(
        ResourceSpec::new(KMS_KEY, ResourceKind::KmsKey)
            .property("key_usage", "ENCRYPT_DECRYPT")
            .property("description", config.kms.description.as_str())
            .property("enable_key_rotation", config.kms.enable_key_rotation),
        config.resource_name("kms-key"),
    ))?;

    stack.add(
        ResourceSpec::new(KMS_ALIAS, ResourceKind::KmsAlias)
            .property("name", config.kms.alias.as_str())
            .reference("target_key_id", KMS_KEY, "id"),
    )?;

    stack.add(tagged(
        ResourceSpec::new(S3_ENDPOINT, ResourceKind::VpcEndpoint)
            .reference("vpc_id", VPC, "id")
            .property("service_name", format!("com.amazonaws.{}.s3", config.region))
            .property("vpc_endpoint_type", "Gateway")
            .property(
                "route_table_ids",
                vec![PropertyValue::from(Reference::id(ROUTE_TABLE))],
            ),
        config.resource_name("s3-endpoint"),
    ))?;

    // compute
    stack.add(tagged(
        ResourceSpec::new(INSTANCE, ResourceKind::Instance)
            .property("ami", image.id.as_str())
            .property("instance_type", config.instance.instance_type.as_str())
            .reference("subnet_id", SUBNET, "id")
            .property(
                "security_group_ids",
                vec![PropertyValue::from(Reference::id(SECURITY_GROUP))],
            )
            .reference("iam_instance_profile", INSTANCE_PROFILE, "id")
            .property("associate_public_ip", config.instance.associate_public_ip)
            .property("user_data", user_data)
            .depends_on(KMS_ALIAS)
            .depends_on(DEFAULT_ROUTE)
            .depends_on(S3_ACCESS)
            .depends_on(KMS_ACCESS),
        config.resource_name("instance"),
    ))?;

    stack.output("bucketName", Reference::id(BUCKET));
    stack.output("kmsKeyId", Reference::id(KMS_KEY));
    stack.output("vpcId", Reference::id(VPC));
    stack.output("subnetId", Reference::id(SUBNET));
    stack.output("instanceId", Reference::id(INSTANCE));
    stack.output("instancePublicIp", Reference::new(INSTANCE, "public_ip"));
    stack.output("instancePrivateIp", Reference::new(INSTANCE, "private_ip"));

    stack.validate()?;
    stack.validate_tags(&material.secrets())?;

    tracing::debug!(stack = %stack.name(), resources = stack.len(), image = %image.id, "Built stack");
    Ok(stack)
}
