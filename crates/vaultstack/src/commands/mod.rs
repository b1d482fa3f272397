pub mod destroy;
pub mod keygen;
pub mod outputs;
pub mod plan;
pub mod up;
pub mod user_data;
pub mod validate;

use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use vaultstack_cloud::{ActionType, ApplyResult, Image, Plan, StackDefinition, StateEngine, StateManager};
use vaultstack_cloud_aws::AwsCliDriver;
use vaultstack_core::{KeyMaterial, StackConfig};

/// Stack file, parsed config, and the directory state lives in
pub struct Context {
    pub stack_file: PathBuf,
    pub config: StackConfig,
    pub project_root: PathBuf,
}

impl Context {
    pub fn load(explicit: Option<&Path>, region: Option<String>) -> anyhow::Result<Self> {
        let (stack_file, mut config) = vaultstack_core::load_stack(explicit)?;
        if let Some(region) = region {
            tracing::debug!(region = %region, "Region overridden from command line");
            config.region = region;
        }
        let project_root = vaultstack_core::project_root(&stack_file);
        Ok(Self {
            stack_file,
            config,
            project_root,
        })
    }

    pub fn driver(&self) -> AwsCliDriver {
        let driver = AwsCliDriver::new(&self.config.region);
        match &self.config.profile {
            Some(profile) => driver.with_profile(profile),
            None => driver,
        }
    }

    pub fn engine(&self) -> StateEngine<AwsCliDriver> {
        StateEngine::new(self.driver(), self.state_manager())
    }

    pub fn state_manager(&self) -> StateManager {
        StateManager::new(&self.project_root)
    }

    pub fn load_keys(&self) -> anyhow::Result<KeyMaterial> {
        Ok(KeyMaterial::load(
            &self.config.public_key_path(),
            &self.config.private_key_path(),
        )?)
    }

    /// Build the stack without querying the provider
    ///
    /// The image id is a placeholder, so the result is only good for
    /// validation and output bindings.
    pub fn offline_stack(&self, material: &KeyMaterial) -> anyhow::Result<StackDefinition> {
        let filter = &self.config.instance.image;
        let placeholder = Image {
            id: "ami-unresolved".to_string(),
            name: filter.name_pattern.clone(),
            owner_id: None,
            creation_date: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            virtualization_type: filter.virtualization_type.clone(),
            root_device_type: filter.root_device_type.clone(),
            architecture: filter.architecture.clone(),
        };
        Ok(vaultstack_core::build_stack(&self.config, material, &placeholder)?)
    }

    pub fn print_header(&self) {
        println!(
            "Stack: {} ({})",
            self.config.name.cyan(),
            self.config.region.cyan()
        );
        println!("Config: {}", self.stack_file.display().to_string().dimmed());
    }
}

pub fn print_plan(plan: &Plan) {
    println!();
    if !plan.has_changes {
        println!("{}", "✓ No changes. Infrastructure is up to date.".green());
        return;
    }

    println!("{}", "Planned changes:".bold());
    for action in plan.changes() {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Delete => "-".red(),
            ActionType::NoOp => " ".normal(),
        };
        println!(
            "  {} {} {} {}",
            marker,
            action.kind.to_string().dimmed(),
            action.resource.cyan(),
            format!("({})", action.reason).dimmed()
        );
    }
    println!();
    println!("Plan: {}", plan.summary().to_string().bold());
}

pub fn print_apply_result(result: &ApplyResult) {
    println!();
    for success in &result.succeeded {
        println!("  {} {}", "✓".green(), success.message);
    }
    for failure in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.resource.red().bold(),
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    for skipped in &result.skipped {
        println!("  {} {}", "-".dimmed(), format!("{} (skipped)", skipped).dimmed());
    }
    println!();
    println!(
        "{} succeeded, {} failed, {} skipped in {:.1}s",
        result.succeeded.len(),
        result.failed.len(),
        result.skipped.len(),
        result.duration_ms as f64 / 1000.0
    );
}

/// Ask for a y/N answer on stdin
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

/// Fail early with a readable message when the aws CLI cannot authenticate
pub async fn ensure_authenticated(engine: &StateEngine<AwsCliDriver>) -> anyhow::Result<()> {
    use vaultstack_cloud::ResourceDriver;

    let auth = engine.driver().check_auth().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "aws CLI is not authenticated: {}",
            auth.error.unwrap_or_default()
        );
    }
    if let Some(account) = auth.account_info {
        println!("Account: {}", account.dimmed());
    }
    Ok(())
}
