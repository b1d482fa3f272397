//! vaultstack core
//!
//! Stack configuration, key material, user data, and the builder that turns
//! them into a `StackDefinition`. `keygen` creates the key pair files.

pub mod error;
pub mod keygen;
pub mod loader;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod secret;
pub mod stack;
pub mod userdata;

pub use error::{Result, StackError};
pub use keygen::{KEY_BITS, check_pair, generate_key_files, generate_key_pair};
pub use loader::{find_stack_file, load_stack, load_stack_config, project_root};
pub use model::{BucketConfig, InstanceConfig, KeyPaths, KmsConfig, NetworkConfig, StackConfig};
pub use parser::parse_stack_config;
pub use pipeline::{PreparedStack, prepare_stack, prepare_with_keys};
pub use secret::{KeyMaterial, PemBlock, strip_pem};
pub use stack::{build_stack, render_stack_user_data};
pub use userdata::{
    ImportScriptInputs, TemplateVersion, UserDataInputs, UserDataRenderer, render_user_data,
};
