//! Progress indicators for wpsync CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use waypointkit::{ApplyResult, LifecycleState, Plan, ProgressCallback, ProjectTarget, ResourceKind};

/// Number of resources a pass over `plan` reports on.
pub fn plan_size(plan: &Plan) -> u64 {
    let resources: usize = plan
        .projects
        .iter()
        .map(|p| {
            let project = usize::from(matches!(p.target, ProjectTarget::Managed { .. }));
            project + p.actions.len() + p.templates.len() + p.applications.len()
        })
        .sum();
    (resources + plan.orphans.len()) as u64
}

/// Progress bar fed by executor callbacks from any worker thread.
pub struct PassProgress {
    bar: ProgressBar,
}

impl PassProgress {
    pub fn new(len: u64, quiet: bool) -> Self {
        let bar = if quiet { ProgressBar::hidden() } else { ProgressBar::new(len) };
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Remove the bar before printing the report
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for PassProgress {
    fn on_transition(&self, kind: ResourceKind, name: &str, _from: LifecycleState, to: LifecycleState) {
        self.bar.set_message(format!("{kind} {name}: {to}"));
    }

    fn on_resource_start(&self, key: &str) {
        self.bar.set_message(key.to_string());
    }

    fn on_resource_complete(&self, key: &str, result: &ApplyResult) {
        if !result.is_success() {
            self.bar.println(format!("  ✗ {key}"));
        }
        self.bar.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypointkit::{ProjectPlan, ProjectSpec};

    #[test]
    fn test_plan_size_counts_managed_projects() {
        let managed = ProjectPlan {
            key: "demo".to_string(),
            target: ProjectTarget::Managed {
                organization_id: "org-1".to_string(),
                spec: ProjectSpec::new("demo"),
                prior: None,
            },
            actions: Vec::new(),
            templates: Vec::new(),
            applications: Vec::new(),
        };
        let existing = ProjectPlan {
            key: "prj-1".to_string(),
            target: ProjectTarget::Existing {
                project_id: "prj-1".to_string(),
                organization_id: None,
            },
            ..managed.clone()
        };
        let plan = Plan {
            projects: vec![managed, existing],
            orphans: Vec::new(),
        };
        assert_eq!(plan_size(&plan), 1);
    }
}
