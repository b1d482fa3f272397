//! Instance user data rendering
//!
//! The boot script is a versioned template with named slots. Slots are
//! filled with Tera; autoescaping is off and an undefined slot is an error,
//! so a renamed slot fails loudly instead of rendering an empty string.

use crate::error::{Result, StackError};
use tera::{Context, Tera};

/// Boot script, version 1
///
/// Slots: `public_key`, `private_key`, `import_script`, `key_id`,
/// `template_version`.
pub const BOOT_SCRIPT_V1: &str = r#"#!/bin/bash
# vaultstack boot script (template v{{ template_version }})
set -euo pipefail

install -d -m 0700 /opt/vaultstack/keys
umask 077

cat > /opt/vaultstack/keys/public_key.b64 <<'KEY_EOF'
{{ public_key }}
KEY_EOF

cat > /opt/vaultstack/keys/private_key.b64 <<'KEY_EOF'
{{ private_key }}
KEY_EOF

cat > /opt/vaultstack/import-key.sh <<'IMPORT_EOF'
{{ import_script }}
IMPORT_EOF
chmod 0700 /opt/vaultstack/import-key.sh

echo "KMS_KEY_ID={{ key_id }}" > /etc/vaultstack.env
chmod 0644 /etc/vaultstack.env

/opt/vaultstack/import-key.sh >> /var/log/vaultstack-import.log 2>&1
"#;

/// Key import script embedded in the boot script
///
/// Slots: `region`, `description`, `alias_name`.
pub const IMPORT_SCRIPT: &str = r#"#!/bin/bash
set -euo pipefail

export AWS_DEFAULT_REGION="{{ region }}"
WORK_DIR="$(mktemp -d)"
trap 'rm -rf "$WORK_DIR"' EXIT
cd "$WORK_DIR"

KEY_ID=$(aws kms create-key \
    --origin EXTERNAL \
    --key-spec RSA_2048 \
    --key-usage ENCRYPT_DECRYPT \
    --description "{{ description }}" \
    --query KeyMetadata.KeyId \
    --output text)

read -r IMPORT_TOKEN WRAPPING_KEY < <(aws kms get-parameters-for-import \
    --key-id "$KEY_ID" \
    --wrapping-algorithm RSA_AES_KEY_WRAP_SHA_256 \
    --wrapping-key-spec RSA_4096 \
    --query '[ImportToken,PublicKey]' \
    --output text)

echo "$IMPORT_TOKEN" | base64 -d > import_token.bin
echo "$WRAPPING_KEY" | base64 -d > wrapping_key.der
base64 -d /opt/vaultstack/keys/private_key.b64 > key_material.der

openssl rand -out aes_key.bin 32
AES_KEY_HEX=$(od -An -tx1 aes_key.bin | tr -d ' \n')
openssl enc -id-aes256-wrap-pad -K "$AES_KEY_HEX" -iv A65959A6 \
    -in key_material.der -out key_material_wrapped.bin
openssl pkeyutl -encrypt -pubin -inkey wrapping_key.der -keyform DER \
    -pkeyopt rsa_padding_mode:oaep \
    -pkeyopt rsa_oaep_md:sha256 \
    -pkeyopt rsa_mgf1_md:sha256 \
    -in aes_key.bin -out aes_key_wrapped.bin
cat aes_key_wrapped.bin key_material_wrapped.bin > encrypted_key_material.bin

aws kms import-key-material \
    --key-id "$KEY_ID" \
    --encrypted-key-material fileb://encrypted_key_material.bin \
    --import-token fileb://import_token.bin \
    --expiration-model KEY_MATERIAL_DOES_NOT_EXPIRE

aws kms create-alias --alias-name "{{ alias_name }}" --target-key-id "$KEY_ID"
echo "Imported key material into $KEY_ID"
"#;

/// Boot script template versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateVersion {
    #[default]
    V1,
}

impl TemplateVersion {
    pub fn number(&self) -> u32 {
        match self {
            TemplateVersion::V1 => 1,
        }
    }

    fn template_name(&self) -> &'static str {
        match self {
            TemplateVersion::V1 => "boot-v1",
        }
    }
}

/// Slots of the import script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportScriptInputs<'a> {
    pub region: &'a str,
    pub description: &'a str,
    pub alias_name: &'a str,
}

/// Everything the boot script is rendered from
#[derive(Clone, PartialEq, Eq)]
pub struct UserDataInputs<'a> {
    pub public_key: &'a str,
    pub private_key: &'a str,
    pub key_id: &'a str,
    pub import: ImportScriptInputs<'a>,
}

impl std::fmt::Debug for UserDataInputs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDataInputs")
            .field("public_key", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("key_id", &self.key_id)
            .field("import", &self.import)
            .finish()
    }
}

/// Renderer holding the registered templates
pub struct UserDataRenderer {
    tera: Tera,
}

impl UserDataRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(vec![
            (TemplateVersion::V1.template_name(), BOOT_SCRIPT_V1),
            ("import", IMPORT_SCRIPT),
        ])
        .map_err(|e| template_error("registry", e))?;
        Ok(Self { tera })
    }

    /// Render the key import script
    pub fn render_import_script(&self, inputs: &ImportScriptInputs<'_>) -> Result<String> {
        let mut context = Context::new();
        context.insert("region", inputs.region);
        context.insert("description", inputs.description);
        context.insert("alias_name", inputs.alias_name);
        self.render("import", &context)
    }

    /// Render the boot script for the given template version
    #[tracing::instrument(skip(self, inputs))]
    pub fn render_boot_script(&self, version: TemplateVersion, inputs: &UserDataInputs<'_>) -> Result<String> {
        let import_script = self.render_import_script(&inputs.import)?;

        let mut context = Context::new();
        context.insert("public_key", inputs.public_key);
        context.insert("private_key", inputs.private_key);
        context.insert("import_script", import_script.trim_end());
        context.insert("key_id", inputs.key_id);
        context.insert("template_version", &version.number());

        let rendered = self.render(version.template_name(), &context)?;
        tracing::debug!(bytes = rendered.len(), "Rendered user data");
        Ok(rendered)
    }

    fn render(&self, name: &str, context: &Context) -> Result<String> {
        self.tera
            .render(name, context)
            .map_err(|e| template_error(name, e))
    }
}

/// Render the current boot script version
pub fn render_user_data(inputs: &UserDataInputs<'_>) -> Result<String> {
    UserDataRenderer::new()?.render_boot_script(TemplateVersion::default(), inputs)
}

fn template_error(template: &str, error: tera::Error) -> StackError {
    // tera nests the useful message in the source chain
    let mut message = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(inner) = source {
        message = format!("{}: {}", message, inner);
        source = inner.source();
    }
    StackError::TemplateError {
        template: template.to_string(),
        message,
    }
}
