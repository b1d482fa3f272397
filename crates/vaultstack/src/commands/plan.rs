use super::{Context, print_plan};
use colored::Colorize;
use vaultstack_cloud::ReconciliationEngine;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "Planning...".blue());
    ctx.print_header();

    let engine = ctx.engine();
    let prepared = vaultstack_core::prepare_stack(&ctx.config, engine.driver()).await?;
    println!("Image: {} ({})", prepared.image.id.cyan(), prepared.image.name);

    let plan = engine.plan(&prepared.stack).await?;
    print_plan(&plan);
    Ok(())
}
