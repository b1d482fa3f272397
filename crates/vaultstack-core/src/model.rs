//! Stack configuration model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vaultstack_cloud::ImageFilter;

pub const DEFAULT_STACK_NAME: &str = "s3-encryption-lab";
pub const DEFAULT_REGION: &str = "ap-southeast-1";
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";
pub const DEFAULT_SUBNET_CIDR: &str = "10.0.1.0/24";
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.micro";
pub const DEFAULT_PUBLIC_KEY_PATH: &str = "keys/public_key.pem";
pub const DEFAULT_PRIVATE_KEY_PATH: &str = "keys/private_key.pem";

/// Everything the builder needs to declare the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    pub region: String,
    /// aws CLI profile
    pub profile: Option<String>,
    pub network: NetworkConfig,
    pub instance: InstanceConfig,
    pub bucket: BucketConfig,
    pub kms: KmsConfig,
    pub keys: KeyPaths,
    /// Tags attached to every resource in addition to `Name`
    pub tags: BTreeMap<String, String>,
    /// Directory relative key paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub vpc_cidr: String,
    pub subnet_cidr: String,
    pub availability_zone: Option<String>,
    /// Source range allowed on port 22
    pub ssh_cidr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub instance_type: String,
    pub image: ImageFilter,
    pub associate_public_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmsConfig {
    pub description: String,
    pub alias: String,
    pub enable_key_rotation: bool,
    /// Alias the boot script gives the key it imports
    pub imported_alias: String,
    pub imported_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPaths {
    pub public: PathBuf,
    pub private: PathBuf,
}

impl StackConfig {
    /// Defaults for a stack with the given name
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            region: DEFAULT_REGION.to_string(),
            profile: None,
            network: NetworkConfig::default(),
            instance: InstanceConfig::default(),
            bucket: BucketConfig {
                name: format!("{}-bucket", name),
            },
            kms: KmsConfig::for_stack(&name),
            keys: KeyPaths::default(),
            tags: BTreeMap::new(),
            base_dir: PathBuf::from("."),
            name,
        }
    }

    pub fn public_key_path(&self) -> PathBuf {
        resolve(&self.base_dir, &self.keys.public)
    }

    pub fn private_key_path(&self) -> PathBuf {
        resolve(&self.base_dir, &self.keys.private)
    }

    /// `{stack}-{suffix}`, used for provider-side names
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name, suffix)
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::named(DEFAULT_STACK_NAME)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vpc_cidr: DEFAULT_VPC_CIDR.to_string(),
            subnet_cidr: DEFAULT_SUBNET_CIDR.to_string(),
            availability_zone: None,
            ssh_cidr: "0.0.0.0/0".to_string(),
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            image: ImageFilter::default(),
            associate_public_ip: true,
        }
    }
}

impl KmsConfig {
    fn for_stack(name: &str) -> Self {
        Self {
            description: "KMS key for S3 encryption client lab".to_string(),
            alias: format!("alias/{}", name),
            enable_key_rotation: true,
            imported_alias: format!("alias/{}-imported", name),
            imported_description: "Imported RSA key for S3 encryption client lab".to_string(),
        }
    }
}

impl Default for KeyPaths {
    fn default() -> Self {
        Self {
            public: PathBuf::from(DEFAULT_PUBLIC_KEY_PATH),
            private: PathBuf::from(DEFAULT_PRIVATE_KEY_PATH),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StackConfig::default();
        assert_eq!(config.region, "ap-southeast-1");
        assert_eq!(config.network.vpc_cidr, "10.0.0.0/16");
        assert_eq!(config.network.subnet_cidr, "10.0.1.0/24");
        assert_eq!(config.instance.instance_type, "t3.micro");
        assert_eq!(config.bucket.name, "s3-encryption-lab-bucket");
        assert_eq!(config.kms.alias, "alias/s3-encryption-lab");
    }

    #[test]
    fn test_key_paths_resolved_against_base_dir() {
        let mut config = StackConfig::default();
        config.base_dir = PathBuf::from("/srv/lab");
        assert_eq!(config.public_key_path(), PathBuf::from("/srv/lab/keys/public_key.pem"));

        config.keys.private = PathBuf::from("/etc/keys/private.pem");
        assert_eq!(config.private_key_path(), PathBuf::from("/etc/keys/private.pem"));
    }
}
