use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::{PassProgress, plan_size};
use crate::ui;
use anyhow::Result;
use waypointkit::apply_plan;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    ui::header("Applying Configuration");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let (config, mut state) = super::load(ctx)?;
    let plan = config.to_plan(&state)?;
    let client = super::client(ctx, &config);
    let opts = super::options(&config, args.jobs, args.dry_run, args.correct_drift);

    ui::kv("Projects", &plan.projects.len().to_string());
    if !plan.orphans.is_empty() {
        ui::kv("No longer declared", &plan.orphans.len().to_string());
    }
    println!();

    let progress = PassProgress::new(plan_size(&plan), ctx.quiet);
    let report = apply_plan(&client, &plan, &opts, &progress)?;
    progress.finish();

    if !args.dry_run {
        state.absorb(&report);
        state.save()?;
    }

    super::report(ctx, &report)?;
    if !args.dry_run {
        ui::success("Apply complete!");
    }
    Ok(())
}
