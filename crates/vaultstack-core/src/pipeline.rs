//! Build pipeline
//!
//! Load key material, look up the image, declare the stack. The steps run in
//! that order and each one needs the previous to have succeeded.

use crate::error::Result;
use crate::model::StackConfig;
use crate::secret::KeyMaterial;
use crate::stack::build_stack;
use tracing::{debug, info, instrument};
use vaultstack_cloud::{Image, ImageSource, StackDefinition, lookup_image};

/// Result of a successful build
#[derive(Debug)]
pub struct PreparedStack {
    pub stack: StackDefinition,
    pub image: Image,
    pub material: KeyMaterial,
}

/// Load keys, resolve the image, and build the stack definition
///
/// A missing key file returns before the image source is queried.
#[instrument(skip_all, fields(stack = %config.name))]
pub async fn prepare_stack(config: &StackConfig, images: &dyn ImageSource) -> Result<PreparedStack> {
    debug!("Step 1: Loading key material");
    let material = KeyMaterial::load(&config.public_key_path(), &config.private_key_path())?;
    prepare_with_keys(config, material, images).await
}

/// Resolve the image and build the stack around keys already loaded
#[instrument(skip_all, fields(stack = %config.name))]
pub async fn prepare_with_keys(
    config: &StackConfig,
    material: KeyMaterial,
    images: &dyn ImageSource,
) -> Result<PreparedStack> {
    debug!("Step 2: Looking up image");
    let image = lookup_image(images, &config.instance.image).await?;
    info!(image_id = %image.id, name = %image.name, "Resolved image");

    debug!("Step 3: Building stack");
    let stack = build_stack(config, &material, &image)?;

    Ok(PreparedStack {
        stack,
        image,
        material,
    })
}
