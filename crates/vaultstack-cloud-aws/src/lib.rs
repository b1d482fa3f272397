//! AWS driver for vaultstack
//!
//! This crate implements the `ResourceDriver` and `ImageSource` traits on top
//! of the `aws` CLI, so vaultstack can provision the VPC, IAM, EC2, S3, and
//! KMS resources of a stack.
//!
//! # Requirements
//!
//! - `aws` CLI v2 must be installed
//! - Credentials are resolved by the CLI (environment, profile, SSO)
//!
//! # Example
//!
//! ```ignore
//! use vaultstack_cloud::{ResourceDriver, StateEngine, StateManager};
//! use vaultstack_cloud_aws::AwsCliDriver;
//!
//! let driver = AwsCliDriver::new("ap-southeast-1");
//! let auth = driver.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! let engine = StateEngine::new(driver, StateManager::new(project_root));
//! ```

pub mod awscli;
pub mod driver;
pub mod error;

pub use awscli::{AwsCli, CallerIdentity};
pub use driver::AwsCliDriver;
pub use error::{AwsError, Result};
