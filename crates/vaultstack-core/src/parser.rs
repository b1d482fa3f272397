//! KDL parser for stack files
//!
//! ```kdl
//! stack "s3-encryption-lab" {
//!     region "ap-southeast-1"
//!     network {
//!         vpc-cidr "10.0.0.0/16"
//!         subnet-cidr "10.0.1.0/24"
//!     }
//!     instance {
//!         type "t3.micro"
//!         image { name "al2023-ami-2023.*-x86_64" }
//!     }
//!     bucket "s3-encryption-lab-bucket"
//!     keys {
//!         public "keys/public_key.pem"
//!         private "keys/private_key.pem"
//!     }
//! }
//! ```
//!
//! Anything not written keeps the default from [`StackConfig::named`].

use crate::error::{Result, StackError};
use crate::model::StackConfig;
use kdl::{KdlDocument, KdlNode};
use std::path::PathBuf;
use tracing::{debug, warn};
use vaultstack_cloud::ImageFilter;

/// Parse a stack file's contents
pub fn parse_stack_config(content: &str) -> Result<StackConfig> {
    let doc: KdlDocument = content.parse()?;

    let stacks: Vec<&KdlNode> = doc
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "stack")
        .collect();

    let node = match stacks.as_slice() {
        [node] => *node,
        [] => {
            return Err(StackError::InvalidConfig(
                "stack file must contain a `stack` node".to_string(),
            ));
        }
        _ => {
            return Err(StackError::InvalidConfig(
                "stack file must contain exactly one `stack` node".to_string(),
            ));
        }
    };

    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("stack requires a name".to_string()))?;
    let mut config = StackConfig::named(name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "region" => config.region = required_string(child, "region")?,
                "profile" => config.profile = first_string(child),
                "network" => parse_network(child, &mut config)?,
                "instance" => parse_instance(child, &mut config)?,
                "bucket" => config.bucket.name = required_string(child, "bucket")?,
                "kms" => parse_kms(child, &mut config)?,
                "keys" => parse_keys(child, &mut config)?,
                "tags" => {
                    if let Some(tags) = child.children() {
                        for tag in tags.nodes() {
                            let key = tag.name().value().to_string();
                            let value = required_string(tag, &format!("tag {}", key))?;
                            config.tags.insert(key, value);
                        }
                    }
                }
                other => warn!(node = %other, "Ignoring unknown stack setting"),
            }
        }
    }

    debug!(stack = %config.name, region = %config.region, "Parsed stack config");
    Ok(config)
}

fn parse_network(node: &KdlNode, config: &mut StackConfig) -> Result<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "vpc-cidr" | "vpc_cidr" => config.network.vpc_cidr = required_string(child, "vpc-cidr")?,
            "subnet-cidr" | "subnet_cidr" => {
                config.network.subnet_cidr = required_string(child, "subnet-cidr")?
            }
            "availability-zone" | "availability_zone" | "az" => {
                config.network.availability_zone = first_string(child)
            }
            "ssh-cidr" | "ssh_cidr" => config.network.ssh_cidr = required_string(child, "ssh-cidr")?,
            other => warn!(node = %other, "Ignoring unknown network setting"),
        }
    }
    Ok(())
}

fn parse_instance(node: &KdlNode, config: &mut StackConfig) -> Result<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "type" | "instance-type" | "instance_type" => {
                config.instance.instance_type = required_string(child, "instance type")?
            }
            "public-ip" | "public_ip" => {
                config.instance.associate_public_ip = required_bool(child, "public-ip")?
            }
            "image" => config.instance.image = parse_image(child)?,
            other => warn!(node = %other, "Ignoring unknown instance setting"),
        }
    }
    Ok(())
}

fn parse_image(node: &KdlNode) -> Result<ImageFilter> {
    let mut filter = ImageFilter::default();
    for child in child_nodes(node) {
        match child.name().value() {
            "owners" | "owner" => {
                filter.owners = child
                    .entries()
                    .iter()
                    .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
                    .collect();
            }
            "name" => filter.name_pattern = required_string(child, "image name")?,
            "architecture" | "arch" => filter.architecture = first_string(child),
            "virtualization" | "virtualization-type" => filter.virtualization_type = first_string(child),
            "root-device" | "root-device-type" => filter.root_device_type = first_string(child),
            other => warn!(node = %other, "Ignoring unknown image filter"),
        }
    }
    if filter.owners.is_empty() {
        return Err(StackError::InvalidConfig(
            "image requires at least one owner".to_string(),
        ));
    }
    Ok(filter)
}

fn parse_kms(node: &KdlNode, config: &mut StackConfig) -> Result<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "description" => config.kms.description = required_string(child, "kms description")?,
            "alias" => config.kms.alias = alias_name(required_string(child, "kms alias")?),
            "rotation" | "key-rotation" => {
                config.kms.enable_key_rotation = required_bool(child, "rotation")?
            }
            "imported-alias" | "imported_alias" => {
                config.kms.imported_alias = alias_name(required_string(child, "imported-alias")?)
            }
            "imported-description" | "imported_description" => {
                config.kms.imported_description = required_string(child, "imported-description")?
            }
            other => warn!(node = %other, "Ignoring unknown kms setting"),
        }
    }
    if config.kms.alias == config.kms.imported_alias {
        return Err(StackError::InvalidConfig(format!(
            "kms alias and imported-alias must differ (both are '{}')",
            config.kms.alias
        )));
    }
    Ok(())
}

fn parse_keys(node: &KdlNode, config: &mut StackConfig) -> Result<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "public" => config.keys.public = PathBuf::from(required_string(child, "public key")?),
            "private" => config.keys.private = PathBuf::from(required_string(child, "private key")?),
            other => warn!(node = %other, "Ignoring unknown keys setting"),
        }
    }
    Ok(())
}

/// KMS requires the `alias/` prefix
fn alias_name(name: String) -> String {
    if name.starts_with("alias/") {
        name
    } else {
        format!("alias/{}", name)
    }
}

fn child_nodes(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|c| c.nodes().iter())
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn required_string(node: &KdlNode, what: &str) -> Result<String> {
    first_string(node).ok_or_else(|| StackError::InvalidConfig(format!("{} requires a string value", what)))
}

fn required_bool(node: &KdlNode, what: &str) -> Result<bool> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_bool())
        .ok_or_else(|| StackError::InvalidConfig(format!("{} requires #true or #false", what)))
}
