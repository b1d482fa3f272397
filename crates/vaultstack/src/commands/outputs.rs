use super::Context;
use colored::Colorize;
use vaultstack_cloud::export_outputs;

pub async fn handle(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let material = ctx.load_keys()?;
    let stack = ctx.offline_stack(&material)?;
    let state = ctx.state_manager().load().await?;

    if state.is_empty() {
        anyhow::bail!(
            "no recorded state under {}; run `vaultstack up` first",
            ctx.project_root.display()
        );
    }

    let outputs = export_outputs(&stack, &state)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    ctx.print_header();
    println!();
    for (name, value) in &outputs {
        println!("  {} = {}", name.cyan(), value);
    }
    Ok(())
}
