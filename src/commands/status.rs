use crate::Context;
use crate::cli::StatusArgs;
use crate::progress::{PassProgress, plan_size};
use crate::ui;
use anyhow::Result;
use waypointkit::apply_plan;

/// Read every declared resource and report drift, without writing anything.
pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    ui::header("Status");

    let (config, state) = super::load(ctx)?;
    let plan = config.to_plan(&state)?;
    let client = super::client(ctx, &config);
    let opts = super::options(&config, args.jobs, true, false);

    ui::kv("Recorded", &state.resources.len().to_string());
    if let Some(when) = state.last_updated {
        ui::kv("Last updated", &when.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    }
    println!();

    let progress = PassProgress::new(plan_size(&plan), ctx.quiet);
    let report = apply_plan(&client, &plan, &opts, &progress)?;
    progress.finish();

    super::report(ctx, &report)
}
