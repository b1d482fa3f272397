use super::{Context, confirm, ensure_authenticated, print_apply_result, print_plan};
use colored::Colorize;
use vaultstack_cloud::{ReconciliationEngine, export_outputs};

pub async fn handle(ctx: &Context, yes: bool) -> anyhow::Result<()> {
    println!("{}", "Bringing stack up...".blue());
    ctx.print_header();

    // local files are checked before anything reaches the provider
    let material = ctx.load_keys()?;

    let engine = ctx.engine();
    ensure_authenticated(&engine).await?;

    let prepared = vaultstack_core::prepare_with_keys(&ctx.config, material, engine.driver()).await?;
    println!("Image: {} ({})", prepared.image.id.cyan(), prepared.image.name);

    let plan = engine.plan(&prepared.stack).await?;
    print_plan(&plan);
    if !plan.has_changes {
        return Ok(());
    }

    println!();
    if !yes && !confirm("Apply these changes?")? {
        println!("{}", "Cancelled.".yellow());
        return Ok(());
    }

    let result = engine.apply(&plan).await?;
    print_apply_result(&result);
    result.ensure_success()?;

    let state = engine.state().await?;
    let outputs = export_outputs(&prepared.stack, &state)?;
    println!();
    println!("{}", "✓ Stack is up!".green().bold());
    println!();
    println!("{}", "Outputs:".bold());
    for (name, value) in &outputs {
        println!("  {} = {}", name.cyan(), value);
    }
    Ok(())
}
