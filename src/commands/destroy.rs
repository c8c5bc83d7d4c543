use crate::Context;
use crate::cli::DestroyArgs;
use crate::progress::{PassProgress, plan_size};
use crate::ui;
use anyhow::Result;
use dialoguer::Confirm;
use waypointkit::destroy_plan;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    ui::header("Destroying Managed Resources");

    let (config, mut state) = super::load_lenient(ctx)?;
    if state.resources.is_empty() {
        ui::info("Nothing recorded; nothing to destroy");
        return Ok(());
    }

    for (key, record) in &state.resources {
        ui::dim(&format!("{key} ({})", record.identity.id));
    }
    println!();

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    } else if !args.yes && !confirm_proceed(state.resources.len())? {
        ui::info("Cancelled");
        return Ok(());
    }

    let plan = config.to_plan(&state)?;
    let client = super::client(ctx, &config);
    let opts = super::options(&config, args.jobs, args.dry_run, false);

    let progress = PassProgress::new(plan_size(&plan), ctx.quiet);
    let report = destroy_plan(&client, &plan, &opts, &progress)?;
    progress.finish();

    if !args.dry_run {
        state.absorb(&report);
        state.save()?;
    }

    super::report(ctx, &report)?;
    if !args.dry_run {
        ui::success("Destroy complete!");
    }
    Ok(())
}

/// Confirm with user
fn confirm_proceed(count: usize) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(format!("Delete {count} resource(s)?"))
        .default(false)
        .interact()?;

    Ok(confirmed)
}
