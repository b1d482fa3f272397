//! RSA key pair generation
//!
//! Writes the two PEM files the loader reads: an SPKI public key and a
//! PKCS#8 private key, both 64-column base64 with LF line endings.

use crate::error::{Result, StackError};
use crate::secret::KeyMaterial;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Modulus size of the imported KMS key spec (RSA_2048)
pub const KEY_BITS: usize = 2048;

/// Generate a fresh pair in memory
pub fn generate_key_pair() -> Result<KeyMaterial> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(|e| StackError::KeyGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| StackError::KeyGeneration(e.to_string()))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| StackError::KeyGeneration(e.to_string()))?;
    KeyMaterial::from_pem(&public_pem, private_pem.as_str())
}

/// Generate a pair and write it to `public_path` and `private_path`
///
/// Existing files are kept unless `overwrite` is set. The written files are
/// read back through the loader and checked before returning.
#[instrument(skip_all, fields(public = %public_path.display(), private = %private_path.display()))]
pub fn generate_key_files(public_path: &Path, private_path: &Path, overwrite: bool) -> Result<KeyMaterial> {
    if !overwrite {
        for (role, path) in [("public", public_path), ("private", private_path)] {
            if path.exists() {
                return Err(StackError::KeyFileExists {
                    role,
                    path: path.to_path_buf(),
                });
            }
        }
    }

    let material = generate_key_pair()?;
    write_key(public_path, &material.public_key().wrap(), false)?;
    write_key(private_path, &material.private_key().wrap(), true)?;

    let loaded = KeyMaterial::load(public_path, private_path)?;
    check_pair(&loaded)?;
    info!(bits = KEY_BITS, "Generated key pair");
    Ok(loaded)
}

/// Check that both keys decode, belong together, and have the KMS size
pub fn check_pair(material: &KeyMaterial) -> Result<()> {
    let private = RsaPrivateKey::from_pkcs8_der(&material.private_key().der()?)
        .map_err(|e| StackError::KeyPairMismatch(format!("private key: {}", e)))?;
    let public = RsaPublicKey::from_public_key_der(&material.public_key().der()?)
        .map_err(|e| StackError::KeyPairMismatch(format!("public key: {}", e)))?;

    if RsaPublicKey::from(&private) != public {
        return Err(StackError::KeyPairMismatch(
            "public key does not belong to the private key".to_string(),
        ));
    }
    let bits = public.size() * 8;
    if bits != KEY_BITS {
        return Err(StackError::KeyPairMismatch(format!(
            "key is {} bits, KMS import needs {}",
            bits, KEY_BITS
        )));
    }
    debug!("Key pair matches");
    Ok(())
}

fn write_key(path: &Path, pem: &str, secret: bool) -> Result<()> {
    let io_error = |e: std::io::Error| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if secret {
        owner_only(&mut options);
    }

    let mut file = options.open(path).map_err(io_error)?;
    file.write_all(pem.as_bytes()).map_err(io_error)?;
    Ok(())
}

#[cfg(unix)]
fn owner_only(options: &mut fs::OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only(_options: &mut fs::OpenOptions) {}
