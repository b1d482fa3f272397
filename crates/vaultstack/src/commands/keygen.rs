use super::Context;
use colored::Colorize;

pub fn handle(ctx: &Context, force: bool) -> anyhow::Result<()> {
    ctx.print_header();
    println!(
        "{}",
        format!("Generating RSA-{} key pair...", vaultstack_core::KEY_BITS).blue()
    );

    let material = vaultstack_core::generate_key_files(
        &ctx.config.public_key_path(),
        &ctx.config.private_key_path(),
        force,
    )?;

    println!();
    println!("{}", "✓ Key pair written".green());
    println!("  public:  {}", material.public_path().display());
    println!("  private: {}", material.private_path().display());
    println!("{}", "Keep the private key out of version control.".dimmed());
    Ok(())
}
