use super::Context;

pub fn handle(ctx: &Context, show_secrets: bool) -> anyhow::Result<()> {
    let material = ctx.load_keys()?;
    let script = vaultstack_core::render_stack_user_data(&ctx.config, &material)?;

    if show_secrets {
        print!("{}", script);
    } else {
        print!("{}", material.redact(&script));
    }
    Ok(())
}
