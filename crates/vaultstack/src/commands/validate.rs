use super::Context;
use colored::Colorize;

pub fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "Validating stack...".blue());
    ctx.print_header();

    let material = ctx.load_keys()?;
    println!(
        "Keys: {}, {}",
        material.public_path().display().to_string().cyan(),
        material.private_path().display().to_string().cyan()
    );

    let stack = ctx.offline_stack(&material)?;
    let order = stack.dependency_order()?;

    println!("{}", "✓ Stack is valid!".green().bold());
    println!();
    println!("Summary:");
    println!("  Resources: {}", stack.len());
    for spec in order {
        println!("    - {} ({})", spec.name.cyan(), spec.kind);
    }
    println!("  Outputs: {}", stack.outputs().len());
    for output in stack.outputs() {
        println!("    - {} <- {}", output.name.cyan(), output.reference);
    }
    println!("  Image filter: {}", ctx.config.instance.image);
    Ok(())
}
