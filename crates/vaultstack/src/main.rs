mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vaultstack")]
#[command(about = "Declare it. Plan it. Keys included.", long_about = None)]
struct Cli {
    /// Stack file (defaults to ./stack.kdl or ./.vaultstack/stack.kdl)
    #[arg(short, long, global = true, env = "VAULTSTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Override the region from the stack file
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the stack file, key material, and resource graph
    Validate,
    /// Generate the RSA key pair the stack imports into KMS
    Keygen {
        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },
    /// Show what `up` would change
    Plan,
    /// Create or update the stack
    Up {
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every resource recorded in state
    Destroy {
        /// Destroy without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Print stack outputs from recorded state
    Outputs {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the rendered instance user data
    UserData {
        /// Print key material instead of <redacted>
        #[arg(long)]
        show_secrets: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // logs go to stderr so stdout stays clean for outputs and user data
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match cli.command {
        Commands::Version => {
            println!("vaultstack {}", env!("CARGO_PKG_VERSION"));
        }
        command => {
            let ctx = commands::Context::load(cli.config.as_deref(), cli.region)?;
            run(command, &ctx).await?;
        }
    }

    Ok(())
}

async fn run(command: Commands, ctx: &commands::Context) -> anyhow::Result<()> {
    match command {
        Commands::Validate => commands::validate::handle(ctx),
        Commands::Keygen { force } => commands::keygen::handle(ctx, force),
        Commands::Plan => commands::plan::handle(ctx).await,
        Commands::Up { yes } => commands::up::handle(ctx, yes).await,
        Commands::Destroy { yes } => commands::destroy::handle(ctx, yes).await,
        Commands::Outputs { json } => commands::outputs::handle(ctx, json).await,
        Commands::UserData { show_secrets } => commands::user_data::handle(ctx, show_secrets),
        Commands::Version => Ok(()),
    }
}
