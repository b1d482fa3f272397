use super::{Context, confirm, ensure_authenticated, print_apply_result, print_plan};
use colored::Colorize;
use vaultstack_cloud::ReconciliationEngine;

pub async fn handle(ctx: &Context, yes: bool) -> anyhow::Result<()> {
    println!("{}", "Destroying stack...".red());
    ctx.print_header();

    let engine = ctx.engine();
    let plan = engine.plan_destroy().await?;
    print_plan(&plan);
    if !plan.has_changes {
        return Ok(());
    }

    ensure_authenticated(&engine).await?;

    println!();
    let prompt = format!(
        "Delete {} resources? This cannot be undone.",
        plan.summary().delete
    );
    if !yes && !confirm(&prompt)? {
        println!("{}", "Cancelled.".yellow());
        return Ok(());
    }

    let result = engine.apply(&plan).await?;
    print_apply_result(&result);
    result.ensure_success()?;

    println!();
    println!("{}", "✓ Stack destroyed".green().bold());
    Ok(())
}
