//! AWS resource driver implementation

use crate::awscli::{AwsCli, args, ec2_tags, extract, kms_tags, push_tag_specifications};
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use std::io::Write;
use vaultstack_cloud::{
    AuthStatus, CloudError, DriverRequest, Image, ImageFilter, ImageSource, ProvisionedResource,
    ResourceDriver, ResourceKind, ResourceSpec,
};

/// Minimum waiting period KMS accepts for key deletion
const KMS_PENDING_WINDOW_DAYS: &str = "7";

const TAG_FIELDS: &[&str] = &[ResourceSpec::TAGS];
const KMS_KEY_FIELDS: &[&str] = &[ResourceSpec::TAGS, "description", "enable_key_rotation"];

/// Separator for ids composed from two provider values
const ID_SEPARATOR: char = '|';

/// AWS driver backed by the `aws` CLI
pub struct AwsCliDriver {
    cli: AwsCli,
}

impl AwsCliDriver {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            cli: AwsCli::new(region),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.cli = self.cli.with_profile(profile);
        self
    }

    pub fn region(&self) -> &str {
        self.cli.region()
    }

    async fn create_resource(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        match req.kind {
            ResourceKind::Vpc => self.create_vpc(req).await,
            ResourceKind::Subnet => self.create_subnet(req).await,
            ResourceKind::InternetGateway => self.create_internet_gateway(req).await,
            ResourceKind::RouteTable => self.create_route_table(req).await,
            ResourceKind::Route => self.create_route(req).await,
            ResourceKind::RouteTableAssociation => self.associate_route_table(req).await,
            ResourceKind::SecurityGroup => self.create_security_group(req).await,
            ResourceKind::IamRole => self.create_role(req).await,
            ResourceKind::IamRolePolicyAttachment => self.attach_role_policy(req).await,
            ResourceKind::IamInstanceProfile => self.create_instance_profile(req).await,
            ResourceKind::Instance => self.run_instance(req).await,
            ResourceKind::Bucket => self.create_bucket(req).await,
            ResourceKind::KmsKey => self.create_key(req).await,
            ResourceKind::KmsAlias => self.create_alias(req).await,
            ResourceKind::VpcEndpoint => self.create_vpc_endpoint(req).await,
        }
    }

    async fn update_resource(&self, id: &str, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        if let Some(field) = req
            .changed
            .iter()
            .find(|f| !updatable_fields(req.kind).contains(&f.as_str()))
        {
            return Err(CloudError::UpdateNotSupported {
                resource: req.name.to_string(),
                kind: req.kind.as_str().to_string(),
                field: field.clone(),
            }
            .into());
        }

        // tag calls add or overwrite keys; a removed key stays on the object
        let retag = req.changes(ResourceSpec::TAGS) && !req.tags.is_empty();
        match req.kind {
            ResourceKind::Bucket => {
                if retag {
                    self.tag_bucket(id, req).await?;
                }
            }
            ResourceKind::KmsKey => {
                if req.changes("description") {
                    let cmd = args(&[
                        "kms",
                        "update-key-description",
                        "--key-id",
                        id,
                        "--description",
                        req.str("description").unwrap_or_default(),
                    ]);
                    self.cli.run_command(&cmd).await?;
                }
                if req.changes("enable_key_rotation") {
                    let toggle = if req.flag("enable_key_rotation") {
                        "enable-key-rotation"
                    } else {
                        "disable-key-rotation"
                    };
                    self.cli.run_command(&args(&["kms", toggle, "--key-id", id])).await?;
                }
                if retag {
                    let mut cmd = args(&["kms", "tag-resource", "--key-id", id, "--tags"]);
                    cmd.push(kms_tags(req.tags).to_string());
                    self.cli.run_command(&cmd).await?;
                }
            }
            ResourceKind::IamRole if retag => {
                let mut cmd = args(&["iam", "tag-role", "--role-name", id, "--tags"]);
                cmd.push(ec2_tags(req.tags).to_string());
                self.cli.run_command(&cmd).await?;
            }
            ResourceKind::IamInstanceProfile if retag => {
                let mut cmd = args(&["iam", "tag-instance-profile", "--instance-profile-name", id, "--tags"]);
                cmd.push(ec2_tags(req.tags).to_string());
                self.cli.run_command(&cmd).await?;
            }
            ResourceKind::Vpc
            | ResourceKind::Subnet
            | ResourceKind::InternetGateway
            | ResourceKind::RouteTable
            | ResourceKind::SecurityGroup
            | ResourceKind::Instance
            | ResourceKind::VpcEndpoint
                if retag =>
            {
                let mut cmd = args(&["ec2", "create-tags", "--resources", id, "--tags"]);
                cmd.push(ec2_tags(req.tags).to_string());
                self.cli.run_command(&cmd).await?;
            }
            // routes, associations, attachments and aliases carry no provider-side tags
            _ => {}
        }
        Ok(ProvisionedResource::new(id))
    }

    async fn delete_resource(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let cmd = match kind {
            ResourceKind::Vpc => args(&["ec2", "delete-vpc", "--vpc-id", id]),
            ResourceKind::Subnet => args(&["ec2", "delete-subnet", "--subnet-id", id]),
            ResourceKind::InternetGateway => {
                self.detach_internet_gateway(id).await?;
                args(&["ec2", "delete-internet-gateway", "--internet-gateway-id", id])
            }
            ResourceKind::RouteTable => args(&["ec2", "delete-route-table", "--route-table-id", id]),
            ResourceKind::Route => {
                let (table, cidr) = split_id(id)?;
                args(&[
                    "ec2",
                    "delete-route",
                    "--route-table-id",
                    table,
                    "--destination-cidr-block",
                    cidr,
                ])
            }
            ResourceKind::RouteTableAssociation => {
                args(&["ec2", "disassociate-route-table", "--association-id", id])
            }
            ResourceKind::SecurityGroup => args(&["ec2", "delete-security-group", "--group-id", id]),
            ResourceKind::IamRole => args(&["iam", "delete-role", "--role-name", id]),
            ResourceKind::IamRolePolicyAttachment => {
                let (role, policy) = split_id(id)?;
                args(&["iam", "detach-role-policy", "--role-name", role, "--policy-arn", policy])
            }
            ResourceKind::IamInstanceProfile => {
                self.remove_profile_roles(id).await?;
                args(&["iam", "delete-instance-profile", "--instance-profile-name", id])
            }
            ResourceKind::Instance => {
                self.cli
                    .run_command(&args(&["ec2", "terminate-instances", "--instance-ids", id]))
                    .await?;
                // the security group and subnet stay in use until termination completes
                args(&["ec2", "wait", "instance-terminated", "--instance-ids", id])
            }
            ResourceKind::Bucket => {
                let target = format!("s3://{}", id);
                args(&["s3", "rb", &target, "--force"])
            }
            ResourceKind::KmsKey => args(&[
                "kms",
                "schedule-key-deletion",
                "--key-id",
                id,
                "--pending-window-in-days",
                KMS_PENDING_WINDOW_DAYS,
            ]),
            ResourceKind::KmsAlias => args(&["kms", "delete-alias", "--alias-name", id]),
            ResourceKind::VpcEndpoint => args(&["ec2", "delete-vpc-endpoints", "--vpc-endpoint-ids", id]),
        };
        self.cli.run_command(&cmd).await?;
        Ok(())
    }

    async fn create_vpc(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let mut cmd = args(&["ec2", "create-vpc", "--cidr-block", required(req, "cidr_block")?]);
        push_tag_specifications(&mut cmd, "vpc", req.tags);
        let value = self.cli.run_json(&cmd).await?;
        let vpc_id = extract(&value, "/Vpc/VpcId")?;

        for (property, flag) in [
            ("enable_dns_support", "--enable-dns-support"),
            ("enable_dns_hostnames", "--enable-dns-hostnames"),
        ] {
            if req.flag(property) {
                let cmd = args(&[
                    "ec2",
                    "modify-vpc-attribute",
                    "--vpc-id",
                    &vpc_id,
                    flag,
                    "{\"Value\":true}",
                ]);
                self.cli.run_command(&cmd).await?;
            }
        }
        Ok(ProvisionedResource::new(vpc_id))
    }

    async fn create_subnet(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let mut cmd = args(&[
            "ec2",
            "create-subnet",
            "--vpc-id",
            required(req, "vpc_id")?,
            "--cidr-block",
            required(req, "cidr_block")?,
        ]);
        if let Some(zone) = req.str("availability_zone") {
            cmd.push("--availability-zone".to_string());
            cmd.push(zone.to_string());
        }
        push_tag_specifications(&mut cmd, "subnet", req.tags);
        let value = self.cli.run_json(&cmd).await?;
        let subnet_id = extract(&value, "/Subnet/SubnetId")?;

        if req.flag("map_public_ip_on_launch") {
            let cmd = args(&[
                "ec2",
                "modify-subnet-attribute",
                "--subnet-id",
                &subnet_id,
                "--map-public-ip-on-launch",
            ]);
            self.cli.run_command(&cmd).await?;
        }
        let zone = extract(&value, "/Subnet/AvailabilityZone").unwrap_or_default();
        Ok(ProvisionedResource::new(subnet_id).with_attribute("availability_zone", zone))
    }

    async fn create_internet_gateway(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let mut cmd = args(&["ec2", "create-internet-gateway"]);
        push_tag_specifications(&mut cmd, "internet-gateway", req.tags);
        let value = self.cli.run_json(&cmd).await?;
        let igw_id = extract(&value, "/InternetGateway/InternetGatewayId")?;

        let attach = args(&[
            "ec2",
            "attach-internet-gateway",
            "--internet-gateway-id",
            &igw_id,
            "--vpc-id",
            required(req, "vpc_id")?,
        ]);
        self.cli.run_command(&attach).await?;
        Ok(ProvisionedResource::new(igw_id))
    }

    async fn detach_internet_gateway(&self, id: &str) -> Result<()> {
        let value = self
            .cli
            .run_json(&args(&["ec2", "describe-internet-gateways", "--internet-gateway-ids", id]))
            .await?;
        let attachments = value
            .pointer("/InternetGateways/0/Attachments")
            .and_then(|a| a.as_array())
            .cloned()
            .unwrap_or_default();
        for attachment in attachments {
            if let Some(vpc_id) = attachment.get("VpcId").and_then(|v| v.as_str()) {
                let cmd = args(&[
                    "ec2",
                    "detach-internet-gateway",
                    "--internet-gateway-id",
                    id,
                    "--vpc-id",
                    vpc_id,
                ]);
                self.cli.run_command(&cmd).await?;
            }
        }
        Ok(())
    }

    async fn create_route_table(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let mut cmd = args(&["ec2", "create-route-table", "--vpc-id", required(req, "vpc_id")?]);
        push_tag_specifications(&mut cmd, "route-table", req.tags);
        let value = self.cli.run_json(&cmd).await?;
        Ok(ProvisionedResource::new(extract(&value, "/RouteTable/RouteTableId")?))
    }

    async fn create_route(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let table = required(req, "route_table_id")?;
        let cidr = required(req, "destination_cidr_block")?;
        let cmd = args(&[
            "ec2",
            "create-route",
            "--route-table-id",
            table,
            "--destination-cidr-block",
            cidr,
            "--gateway-id",
            required(req, "gateway_id")?,
        ]);
        self.cli.run_command(&cmd).await?;
        Ok(ProvisionedResource::new(join_id(table, cidr)))
    }

    async fn associate_route_table(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let cmd = args(&[
            "ec2",
            "associate-route-table",
            "--route-table-id",
            required(req, "route_table_id")?,
            "--subnet-id",
            required(req, "subnet_id")?,
        ]);
        let value = self.cli.run_json(&cmd).await?;
        Ok(ProvisionedResource::new(extract(&value, "/AssociationId")?))
    }

    async fn create_security_group(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let mut cmd = args(&[
            "ec2",
            "create-security-group",
            "--group-name",
            required(req, "name")?,
            "--description",
            required(req, "description")?,
            "--vpc-id",
            required(req, "vpc_id")?,
        ]);
        push_tag_specifications(&mut cmd, "security-group", req.tags);
        let value = self.cli.run_json(&cmd).await?;
        let group_id = extract(&value, "/GroupId")?;

        // egress keeps the default allow-all rule AWS adds to new groups
        if let Some(permissions) = ingress_permissions(req) {
            let cmd = args(&[
                "ec2",
                "authorize-security-group-ingress",
                "--group-id",
                &group_id,
                "--ip-permissions",
                &permissions,
            ]);
            self.cli.run_command(&cmd).await?;
        }
        Ok(ProvisionedResource::new(group_id))
    }

    async fn create_role(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let name = required(req, "name")?;
        let mut cmd = args(&[
            "iam",
            "create-role",
            "--role-name",
            name,
            "--assume-role-policy-document",
            required(req, "assume_role_policy")?,
        ]);
        if !req.tags.is_empty() {
            cmd.push("--tags".to_string());
            cmd.push(ec2_tags(req.tags).to_string());
        }
        let value = self.cli.run_json(&cmd).await?;
        Ok(ProvisionedResource::new(name).with_attribute("arn", extract(&value, "/Role/Arn")?))
    }

    async fn attach_role_policy(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let role = required(req, "role")?;
        let policy = required(req, "policy_arn")?;
        let cmd = args(&["iam", "attach-role-policy", "--role-name", role, "--policy-arn", policy]);
        self.cli.run_command(&cmd).await?;
        Ok(ProvisionedResource::new(join_id(role, policy)))
    }

    async fn create_instance_profile(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let name = required(req, "name")?;
        let mut cmd = args(&["iam", "create-instance-profile", "--instance-profile-name", name]);
        if !req.tags.is_empty() {
            cmd.push("--tags".to_string());
            cmd.push(ec2_tags(req.tags).to_string());
        }
        let value = self.cli.run_json(&cmd).await?;
        let arn = extract(&value, "/InstanceProfile/Arn")?;

        let add = args(&[
            "iam",
            "add-role-to-instance-profile",
            "--instance-profile-name",
            name,
            "--role-name",
            required(req, "role")?,
        ]);
        self.cli.run_command(&add).await?;
        Ok(ProvisionedResource::new(name).with_attribute("arn", arn))
    }

    async fn remove_profile_roles(&self, name: &str) -> Result<()> {
        let value = self
            .cli
            .run_json(&args(&["iam", "get-instance-profile", "--instance-profile-name", name]))
            .await?;
        let roles = value
            .pointer("/InstanceProfile/Roles")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        for role in roles {
            if let Some(role_name) = role.get("RoleName").and_then(|v| v.as_str()) {
                let cmd = args(&[
                    "iam",
                    "remove-role-from-instance-profile",
                    "--instance-profile-name",
                    name,
                    "--role-name",
                    role_name,
                ]);
                self.cli.run_command(&cmd).await?;
            }
        }
        Ok(())
    }

    async fn run_instance(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let subnet = required(req, "subnet_id")?;
        let groups = req.strings("security_group_ids");
        if groups.is_empty() {
            return Err(missing(req, "security_group_ids"));
        }
        let profile = format!("Name={}", required(req, "iam_instance_profile")?);

        let mut cmd = args(&[
            "ec2",
            "run-instances",
            "--image-id",
            required(req, "ami")?,
            "--instance-type",
            required(req, "instance_type")?,
            "--subnet-id",
            subnet,
            "--iam-instance-profile",
            &profile,
            "--count",
            "1",
        ]);
        cmd.push("--security-group-ids".to_string());
        cmd.extend(groups);
        if req.flag("associate_public_ip") {
            cmd.push("--associate-public-ip-address".to_string());
        }
        push_tag_specifications(&mut cmd, "instance", req.tags);

        // user data goes through a file so it never shows up in the process list
        let user_data_file = match req.str("user_data") {
            Some(user_data) => {
                let mut file = tempfile::NamedTempFile::new()?;
                file.write_all(user_data.as_bytes())?;
                file.flush()?;
                cmd.push("--user-data".to_string());
                cmd.push(format!("file://{}", file.path().display()));
                Some(file)
            }
            None => None,
        };

        let value = self.cli.run_json(&cmd).await?;
        drop(user_data_file);
        let instance_id = extract(&value, "/Instances/0/InstanceId")?;
        tracing::info!(instance_id = %instance_id, "Waiting for instance to enter running state");

        self.cli
            .run_command(&args(&["ec2", "wait", "instance-running", "--instance-ids", &instance_id]))
            .await?;
        self.describe_instance(&instance_id).await
    }

    async fn describe_instance(&self, id: &str) -> Result<ProvisionedResource> {
        let value = self
            .cli
            .run_json(&args(&["ec2", "describe-instances", "--instance-ids", id]))
            .await?;
        let instance = value
            .pointer("/Reservations/0/Instances/0")
            .ok_or_else(|| AwsError::UnexpectedOutput(format!("instance {} not found", id)))?;

        let mut resource = ProvisionedResource::new(id);
        for (attribute, key) in [("public_ip", "PublicIpAddress"), ("private_ip", "PrivateIpAddress")] {
            if let Some(ip) = instance.get(key).and_then(|v| v.as_str()) {
                resource = resource.with_attribute(attribute, ip);
            }
        }
        Ok(resource)
    }

    async fn create_bucket(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let bucket = required(req, "bucket")?;
        let mut cmd = args(&["s3api", "create-bucket", "--bucket", bucket]);
        if let Some(constraint) = location_constraint(self.cli.region()) {
            cmd.push("--create-bucket-configuration".to_string());
            cmd.push(constraint);
        }
        self.cli.run_command(&cmd).await?;
        self.tag_bucket(bucket, req).await?;
        Ok(bucket_resource(bucket))
    }

    async fn tag_bucket(&self, bucket: &str, req: &DriverRequest<'_>) -> Result<()> {
        if req.tags.is_empty() {
            return Ok(());
        }
        let tagging = serde_json::json!({ "TagSet": ec2_tags(req.tags) }).to_string();
        let cmd = args(&["s3api", "put-bucket-tagging", "--bucket", bucket, "--tagging", &tagging]);
        self.cli.run_command(&cmd).await?;
        Ok(())
    }

    async fn create_key(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let mut cmd = args(&["kms", "create-key", "--key-usage", required(req, "key_usage")?]);
        if let Some(description) = req.str("description") {
            cmd.push("--description".to_string());
            cmd.push(description.to_string());
        }
        if !req.tags.is_empty() {
            cmd.push("--tags".to_string());
            cmd.push(kms_tags(req.tags).to_string());
        }
        let value = self.cli.run_json(&cmd).await?;
        let key_id = extract(&value, "/KeyMetadata/KeyId")?;
        let arn = extract(&value, "/KeyMetadata/Arn")?;

        if req.flag("enable_key_rotation") {
            self.cli
                .run_command(&args(&["kms", "enable-key-rotation", "--key-id", &key_id]))
                .await?;
        }
        Ok(ProvisionedResource::new(key_id).with_attribute("arn", arn))
    }

    async fn create_alias(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let name = required(req, "name")?;
        let cmd = args(&[
            "kms",
            "create-alias",
            "--alias-name",
            name,
            "--target-key-id",
            required(req, "target_key_id")?,
        ]);
        self.cli.run_command(&cmd).await?;
        Ok(ProvisionedResource::new(name))
    }

    async fn create_vpc_endpoint(&self, req: &DriverRequest<'_>) -> Result<ProvisionedResource> {
        let mut cmd = args(&[
            "ec2",
            "create-vpc-endpoint",
            "--vpc-id",
            required(req, "vpc_id")?,
            "--service-name",
            required(req, "service_name")?,
            "--vpc-endpoint-type",
            required(req, "vpc_endpoint_type")?,
        ]);
        let tables = req.strings("route_table_ids");
        if !tables.is_empty() {
            cmd.push("--route-table-ids".to_string());
            cmd.extend(tables);
        }
        push_tag_specifications(&mut cmd, "vpc-endpoint", req.tags);
        let value = self.cli.run_json(&cmd).await?;
        Ok(ProvisionedResource::new(extract(&value, "/VpcEndpoint/VpcEndpointId")?))
    }
}

#[async_trait]
impl ResourceDriver for AwsCliDriver {
    fn name(&self) -> &str {
        "aws"
    }

    async fn check_auth(&self) -> vaultstack_cloud::Result<AuthStatus> {
        match self.cli.check_auth().await {
            Ok(identity) => Ok(AuthStatus::ok(format!("{} ({})", identity.arn, identity.account))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn create(&self, request: &DriverRequest<'_>) -> vaultstack_cloud::Result<ProvisionedResource> {
        tracing::debug!(resource = %request.name, kind = %request.kind.as_str(), "Creating");
        Ok(self.create_resource(request).await?)
    }

    async fn update(
        &self,
        id: &str,
        request: &DriverRequest<'_>,
    ) -> vaultstack_cloud::Result<ProvisionedResource> {
        tracing::debug!(resource = %request.name, id = %id, "Updating");
        Ok(self.update_resource(id, request).await?)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> vaultstack_cloud::Result<()> {
        tracing::debug!(kind = %kind.as_str(), id = %id, "Deleting");
        Ok(self.delete_resource(kind, id).await?)
    }

    fn updatable_fields(&self, kind: ResourceKind) -> &'static [&'static str] {
        updatable_fields(kind)
    }
}

#[async_trait]
impl ImageSource for AwsCliDriver {
    async fn describe_images(&self, filter: &ImageFilter) -> vaultstack_cloud::Result<Vec<Image>> {
        Ok(self.cli.describe_images(filter).await?)
    }
}

/// Fields each kind accepts in place; anything else needs a new object
fn updatable_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::KmsKey => KMS_KEY_FIELDS,
        _ => TAG_FIELDS,
    }
}

fn missing(req: &DriverRequest<'_>, property: &str) -> AwsError {
    AwsError::MissingProperty {
        kind: req.kind.as_str().to_string(),
        property: property.to_string(),
    }
}

fn required<'a>(req: &'a DriverRequest<'_>, property: &str) -> Result<&'a str> {
    req.str(property).ok_or_else(|| missing(req, property))
}

fn join_id(first: &str, second: &str) -> String {
    format!("{}{}{}", first, ID_SEPARATOR, second)
}

fn split_id(id: &str) -> Result<(&str, &str)> {
    id.split_once(ID_SEPARATOR)
        .ok_or_else(|| AwsError::UnexpectedOutput(format!("malformed composite id '{}'", id)))
}

fn bucket_resource(bucket: &str) -> ProvisionedResource {
    ProvisionedResource::new(bucket).with_attribute("arn", format!("arn:aws:s3:::{}", bucket))
}

/// us-east-1 rejects an explicit location constraint
fn location_constraint(region: &str) -> Option<String> {
    if region == "us-east-1" {
        None
    } else {
        Some(format!("LocationConstraint={}", region))
    }
}

/// Translate `ingress` rules into the `--ip-permissions` JSON
fn ingress_permissions(req: &DriverRequest<'_>) -> Option<String> {
    let rules = req.properties.get("ingress")?.as_array()?;
    if rules.is_empty() {
        return None;
    }
    let permissions: Vec<serde_json::Value> = rules
        .iter()
        .map(|rule| {
            let ranges: Vec<serde_json::Value> = rule
                .get("cidr_blocks")
                .and_then(|c| c.as_array())
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter_map(|b| b.as_str())
                        .map(|cidr| serde_json::json!({ "CidrIp": cidr }))
                        .collect()
                })
                .unwrap_or_default();
            serde_json::json!({
                "IpProtocol": rule.get("protocol").cloned().unwrap_or_else(|| "tcp".into()),
                "FromPort": rule.get("from_port").cloned().unwrap_or(serde_json::Value::Null),
                "ToPort": rule.get("to_port").cloned().unwrap_or(serde_json::Value::Null),
                "IpRanges": ranges,
            })
        })
        .collect();
    Some(serde_json::Value::Array(permissions).to_string())
}
