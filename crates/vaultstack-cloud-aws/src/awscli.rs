//! aws CLI wrapper
//!
//! Wraps `aws` CLI commands. Every call runs with `--output json` and an
//! explicit `--region`.

use crate::error::{AwsError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use vaultstack_cloud::{Image, ImageFilter};

/// Substrings of stderr that mark a failure worth retrying
const TRANSIENT_MARKERS: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "InternalError",
    "Could not connect to the endpoint URL",
    "Connection reset",
    "Invalid IAM Instance Profile",
];

/// aws CLI wrapper
#[derive(Debug, Clone)]
pub struct AwsCli {
    region: String,
    profile: Option<String>,
}

/// Result of `aws sts get-caller-identity`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

impl AwsCli {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Check that the CLI is installed and has credentials
    pub async fn check_auth(&self) -> Result<CallerIdentity> {
        let which = Command::new("which").arg("aws").output().await?;
        if !which.status.success() {
            return Err(AwsError::CliNotFound);
        }

        let output = self
            .run_command(&args(&["sts", "get-caller-identity"]))
            .await
            .map_err(|e| AwsError::AuthenticationFailed(e.to_string()))?;
        let identity: CallerIdentity = serde_json::from_str(&output)?;
        Ok(identity)
    }

    /// Run an aws command and return stdout
    pub async fn run_command(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new("aws");
        cmd.arg("--region").arg(&self.region);
        cmd.arg("--output").arg("json");
        if let Some(profile) = &self.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let command = command_name(args);
        tracing::debug!(region = %self.region, command = %command, "Running aws CLI");

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(command, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command and parse stdout as JSON; empty output becomes `null`
    pub async fn run_json(&self, args: &[String]) -> Result<serde_json::Value> {
        let output = self.run_command(args).await?;
        if output.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// `aws ec2 describe-images` with the filter translated to CLI filters
    pub async fn describe_images(&self, filter: &ImageFilter) -> Result<Vec<Image>> {
        let value = self.run_json(&describe_images_args(filter)).await?;
        parse_images(&value)
    }
}

/// Build an owned argument list
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// "ec2 create-vpc" style name of a command for messages
fn command_name(args: &[String]) -> String {
    args.iter()
        .take_while(|a| !a.starts_with("--"))
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a failed invocation to a transient or permanent error
pub fn classify_failure(command: String, stderr: String) -> AwsError {
    if TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
        AwsError::Transient { command, stderr }
    } else {
        AwsError::CommandFailed { command, stderr }
    }
}

pub fn describe_images_args(filter: &ImageFilter) -> Vec<String> {
    let mut out = args(&["ec2", "describe-images"]);
    if !filter.owners.is_empty() {
        out.push("--owners".to_string());
        out.extend(filter.owners.iter().cloned());
    }
    out.push("--filters".to_string());
    out.push(format!("Name=name,Values={}", filter.name_pattern));
    if let Some(v) = &filter.virtualization_type {
        out.push(format!("Name=virtualization-type,Values={}", v));
    }
    if let Some(v) = &filter.root_device_type {
        out.push(format!("Name=root-device-type,Values={}", v));
    }
    if let Some(v) = &filter.architecture {
        out.push(format!("Name=architecture,Values={}", v));
    }
    out
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImagesOutput {
    #[serde(default)]
    images: Vec<RawImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawImage {
    image_id: String,
    #[serde(default)]
    name: String,
    owner_id: Option<String>,
    creation_date: String,
    virtualization_type: Option<String>,
    root_device_type: Option<String>,
    architecture: Option<String>,
}

/// Parse `describe-images` output
pub fn parse_images(value: &serde_json::Value) -> Result<Vec<Image>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let output: DescribeImagesOutput = serde_json::from_value(value.clone())?;
    output
        .images
        .into_iter()
        .map(|raw| {
            let creation_date = DateTime::parse_from_rfc3339(&raw.creation_date)
                .map_err(|e| {
                    AwsError::UnexpectedOutput(format!(
                        "image {} has invalid CreationDate '{}': {}",
                        raw.image_id, raw.creation_date, e
                    ))
                })?
                .with_timezone(&Utc);
            Ok(Image {
                id: raw.image_id,
                name: raw.name,
                owner_id: raw.owner_id,
                creation_date,
                virtualization_type: raw.virtualization_type,
                root_device_type: raw.root_device_type,
                architecture: raw.architecture,
            })
        })
        .collect()
}

/// `--tag-specifications` JSON for EC2 create calls
pub fn tag_specifications(resource_type: &str, tags: &BTreeMap<String, String>) -> String {
    serde_json::json!([{
        "ResourceType": resource_type,
        "Tags": ec2_tags(tags),
    }])
    .to_string()
}

/// Append `--tag-specifications` unless there are no tags to apply
pub fn push_tag_specifications(cmd: &mut Vec<String>, resource_type: &str, tags: &BTreeMap<String, String>) {
    if tags.is_empty() {
        return;
    }
    cmd.push("--tag-specifications".to_string());
    cmd.push(tag_specifications(resource_type, tags));
}

/// `[{"Key": .., "Value": ..}]` as EC2, S3, and IAM expect
pub fn ec2_tags(tags: &BTreeMap<String, String>) -> serde_json::Value {
    tags.iter()
        .map(|(k, v)| serde_json::json!({ "Key": k, "Value": v }))
        .collect()
}

/// `[{"TagKey": .., "TagValue": ..}]` as KMS expects
pub fn kms_tags(tags: &BTreeMap<String, String>) -> serde_json::Value {
    tags.iter()
        .map(|(k, v)| serde_json::json!({ "TagKey": k, "TagValue": v }))
        .collect()
}

/// String at a JSON pointer, or an error naming what was expected
pub fn extract(value: &serde_json::Value, pointer: &str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| AwsError::UnexpectedOutput(format!("missing {} in response", pointer)))
}
