//! Machine image lookup
//!
//! The lookup is a read-only query against the provider. Selection among the
//! returned images is done here so the tie-break is the same for every
//! provider: the latest `creation_date` wins, and a tie on that timestamp is
//! an error rather than an arbitrary pick.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filters an image must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFilter {
    /// Owner account ids or aliases (e.g. "amazon")
    pub owners: Vec<String>,

    /// Shell-glob pattern matched against the image name
    pub name_pattern: String,

    pub virtualization_type: Option<String>,

    pub root_device_type: Option<String>,

    pub architecture: Option<String>,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self {
            owners: vec!["amazon".to_string()],
            name_pattern: "al2023-ami-2023.*-x86_64".to_string(),
            virtualization_type: Some("hvm".to_string()),
            root_device_type: Some("ebs".to_string()),
            architecture: Some("x86_64".to_string()),
        }
    }
}

impl ImageFilter {
    /// Whether an image satisfies every filter that is set
    ///
    /// Owners are not checked here: providers resolve owner aliases such as
    /// "amazon" server-side.
    pub fn matches(&self, image: &Image) -> Result<bool> {
        let pattern = glob::Pattern::new(&self.name_pattern).map_err(|e| {
            CloudError::InvalidConfig(format!(
                "invalid image name pattern '{}': {}",
                self.name_pattern, e
            ))
        })?;

        let optional_eq = |want: &Option<String>, have: &Option<String>| match want {
            None => true,
            Some(w) => have.as_deref() == Some(w.as_str()),
        };

        Ok(pattern.matches(&image.name)
            && optional_eq(&self.virtualization_type, &image.virtualization_type)
            && optional_eq(&self.root_device_type, &image.root_device_type)
            && optional_eq(&self.architecture, &image.architecture))
    }
}

impl std::fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "name={} owners={}", self.name_pattern, self.owners.join(","))
    }
}

/// A machine image as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub virtualization_type: Option<String>,
    pub root_device_type: Option<String>,
    pub architecture: Option<String>,
}

/// Read-only image query against the provider
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Every image the provider returns for the filter
    async fn describe_images(&self, filter: &ImageFilter) -> Result<Vec<Image>>;
}

/// Pick the most recent image matching the filter
pub fn select_latest(filter: &ImageFilter, images: Vec<Image>) -> Result<Image> {
    let mut candidates = Vec::new();
    for image in images {
        if filter.matches(&image)? {
            candidates.push(image);
        }
    }

    let latest = candidates
        .iter()
        .map(|i| i.creation_date)
        .max()
        .ok_or_else(|| CloudError::ImageNotFound(filter.to_string()))?;

    let mut newest: Vec<Image> = candidates
        .into_iter()
        .filter(|i| i.creation_date == latest)
        .collect();

    if newest.len() > 1 {
        let ids: Vec<&str> = newest.iter().map(|i| i.id.as_str()).collect();
        return Err(CloudError::AmbiguousImage {
            count: newest.len(),
            ids: ids.join(", "),
        });
    }

    let image = newest.remove(0);
    tracing::debug!(image_id = %image.id, name = %image.name, "Selected image");
    Ok(image)
}

/// Query the source and select the latest match
pub async fn lookup_image(source: &dyn ImageSource, filter: &ImageFilter) -> Result<Image> {
    let images = source.describe_images(filter).await?;
    tracing::debug!(count = images.len(), filter = %filter, "Provider returned images");
    select_latest(filter, images)
}
