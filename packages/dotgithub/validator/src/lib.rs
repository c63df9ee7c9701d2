#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Pre-render validation of a [`WorkflowSet`].
//!
//! Every check runs on every call and all findings are returned together, so a
//! single pass shows every problem in the definitions. Checks run in a fixed
//! order:
//!
//! 1. Workflow name and id uniqueness across the set
//! 2. Job id uniqueness within each workflow
//! 3. Every secret expression in every step names a valid secret
//! 4. Runner labels are non-empty and on the allow-list (unknown labels warn)
//! 5. Sibling workflows do not overlap on the same include globs (warning)

mod diagnostic;

use std::collections::{BTreeMap, BTreeSet};

use dotgithub_ast::{Workflow, WorkflowSet, find_secret_refs};

pub use diagnostic::*;

/// Labels of the GitHub-hosted runners.
pub const HOSTED_RUNNER_LABELS: &[&str] = &[
    "ubuntu-latest",
    "ubuntu-24.04",
    "ubuntu-22.04",
    "ubuntu-24.04-arm",
    "ubuntu-22.04-arm",
    "windows-latest",
    "windows-2025",
    "windows-2022",
    "macos-latest",
    "macos-15",
    "macos-14",
    "macos-13",
];

/// Runner labels the validator recognizes without a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerAllowList {
    labels: BTreeSet<String>,
}

impl Default for RunnerAllowList {
    fn default() -> Self {
        Self {
            labels: HOSTED_RUNNER_LABELS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl RunnerAllowList {
    /// An allow-list with no labels at all.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            labels: BTreeSet::new(),
        }
    }

    /// Add a label, typically the name of a self-hosted runner group.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn extend<S: Into<String>>(&mut self, labels: impl IntoIterator<Item = S>) {
        self.labels.extend(labels.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub runners: RunnerAllowList,
    /// Skip the [`DiagnosticKind::UnknownRunnerLabel`] warning entirely
    pub allow_unknown_runners: bool,
}

/// Check a workflow set. An empty result means it is emittable as-is.
#[must_use]
pub fn validate(set: &WorkflowSet, config: &ValidatorConfig) -> Vec<Diagnostic> {
    let mut diagnostics = vec![];

    check_workflow_uniqueness(set, &mut diagnostics);
    check_job_uniqueness(set, &mut diagnostics);
    check_secret_refs(set, &mut diagnostics);
    check_runner_labels(set, config, &mut diagnostics);
    check_overlapping_filters(set, &mut diagnostics);

    log::debug!(
        "validate: {} workflow(s), {} diagnostic(s), fatal={}",
        set.len(),
        diagnostics.len(),
        has_fatal(&diagnostics)
    );

    diagnostics
}

/// Count occurrences, keeping first-seen order so output is stable.
fn duplicates<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut order = vec![];
    let mut counts = BTreeMap::new();

    for key in keys {
        let count = counts.entry(key).or_insert(0_usize);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter_map(|key| {
            let count = counts[key];
            (count > 1).then_some((key, count))
        })
        .collect()
}

fn check_workflow_uniqueness(set: &WorkflowSet, diagnostics: &mut Vec<Diagnostic>) {
    let workflows = set.workflows();

    for (name, count) in duplicates(workflows.iter().map(|(_, w)| w.name())) {
        let ids = workflows
            .iter()
            .filter(|(_, w)| w.name() == name)
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>();

        diagnostics.push(Diagnostic::new(
            DiagnosticKind::DuplicateWorkflowName,
            format!(
                "workflow name '{name}' is used {count} times (ids: {})",
                ids.join(", ")
            ),
        ));
    }

    for (id, count) in duplicates(workflows.iter().map(|(id, _)| id.as_str())) {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::DuplicateWorkflowId,
                format!("workflow id '{id}' is used {count} times"),
            )
            .in_workflow(id),
        );
    }
}

fn check_job_uniqueness(set: &WorkflowSet, diagnostics: &mut Vec<Diagnostic>) {
    for (workflow_id, workflow) in set.workflows() {
        for (job_id, count) in duplicates(workflow.jobs().iter().map(|(id, _)| id.as_str())) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::DuplicateJobId,
                    format!("job id '{job_id}' is used {count} times"),
                )
                .in_workflow(workflow_id)
                .in_job(job_id),
            );
        }
    }
}

fn check_secret_refs(set: &WorkflowSet, diagnostics: &mut Vec<Diagnostic>) {
    for (workflow_id, workflow) in set.workflows() {
        for (job_id, job) in workflow.jobs() {
            for (index, step) in job.steps().iter().enumerate() {
                for text in step.text_fields() {
                    for mention in find_secret_refs(text) {
                        if let Err(e) = mention.secret_ref() {
                            diagnostics.push(
                                Diagnostic::new(
                                    DiagnosticKind::UnresolvedSecretRef,
                                    format!("step {}: {e}", index + 1),
                                )
                                .in_workflow(workflow_id)
                                .in_job(job_id),
                            );
                        }
                    }
                }
            }
        }
    }
}

fn check_runner_labels(
    set: &WorkflowSet,
    config: &ValidatorConfig,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (workflow_id, workflow) in set.workflows() {
        for (job_id, job) in workflow.jobs() {
            let label = job.runs_on().trim();

            if label.is_empty() {
                diagnostics.push(
                    Diagnostic::new(DiagnosticKind::EmptyRunnerLabel, "runs-on is empty")
                        .in_workflow(workflow_id)
                        .in_job(job_id),
                );
            } else if !config.allow_unknown_runners && !config.runners.contains(label) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnknownRunnerLabel,
                        format!("runner label '{label}' is not on the allow-list"),
                    )
                    .in_workflow(workflow_id)
                    .in_job(job_id),
                );
            }
        }
    }
}

fn shared_include_globs<'a>(a: &'a Workflow, b: &Workflow) -> Vec<&'a str> {
    let (Some(left), Some(right)) = (a.trigger().paths().filter(), b.trigger().paths().filter())
    else {
        return vec![];
    };

    if left.is_complement_of(right) {
        return vec![];
    }

    left.include()
        .iter()
        .filter(|glob| right.include().contains(*glob))
        .map(String::as_str)
        .collect()
}

fn check_overlapping_filters(set: &WorkflowSet, diagnostics: &mut Vec<Diagnostic>) {
    let workflows = set.workflows();

    for (i, (left_id, left)) in workflows.iter().enumerate() {
        for (right_id, right) in &workflows[i + 1..] {
            if left_id == right_id || !left.trigger().shares_event_and_branch(right.trigger()) {
                continue;
            }

            let shared = shared_include_globs(left, right);
            if !shared.is_empty() {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::OverlappingPathFilters,
                        format!(
                            "workflows '{left_id}' and '{right_id}' both fire for {}",
                            shared.join(", ")
                        ),
                    )
                    .in_workflow(left_id),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use dotgithub_ast::{
        CheckoutOptions, EventTrigger, Job, ONLY_DOCS, PathFilterRegistry, PathScope, WITHOUT_DOCS,
        checkout_step, resolve, run_step,
    };

    use super::*;

    fn job(name: &str, runs_on: &str, command: &str) -> Job {
        Job::new(
            name,
            runs_on,
            vec![
                checkout_step(CheckoutOptions::default()),
                run_step(command).unwrap(),
            ],
        )
        .unwrap()
    }

    fn workflow(name: &str, paths: PathScope, jobs: Vec<(&str, Job)>) -> Workflow {
        jobs.into_iter()
            .fold(
                Workflow::builder(name)
                    .trigger(EventTrigger::push_and_pull_request("main", paths).unwrap()),
                |builder, (id, job)| builder.job(id, job),
            )
            .build()
            .unwrap()
    }

    fn docs_and_ci() -> WorkflowSet {
        let registry = PathFilterRegistry::with_builtins();
        let echo = format!("echo {}", resolve("NpmToken").unwrap());

        WorkflowSet::new()
            .with_workflow(
                "docs",
                workflow(
                    "Build and test documentation",
                    PathScope::Filtered(registry.get(ONLY_DOCS).unwrap().clone()),
                    vec![("build", job("Build Docs", "ubuntu-latest", &echo))],
                ),
            )
            .with_workflow(
                "ci",
                workflow(
                    "Build and test",
                    PathScope::Filtered(registry.get(WITHOUT_DOCS).unwrap().clone()),
                    vec![("build", job("Build Code", "ubuntu-latest", &echo))],
                ),
            )
    }

    fn kinds(diagnostics: &[Diagnostic]) -> Vec<DiagnosticKind> {
        diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test_log::test]
    fn test_docs_and_ci_scenario_is_clean() {
        let diagnostics = validate(&docs_and_ci(), &ValidatorConfig::default());
        assert_eq!(diagnostics, vec![]);
    }

    #[test_log::test]
    fn test_duplicate_workflow_name_does_not_suppress_others() {
        let set = WorkflowSet::new()
            .with_workflow(
                "a",
                workflow(
                    "Same",
                    PathScope::Any,
                    vec![("build", job("Build", "my-runner", "make"))],
                ),
            )
            .with_workflow(
                "b",
                workflow(
                    "Same",
                    PathScope::Any,
                    vec![("build", job("Build", "ubuntu-latest", "echo ${{ secrets.bad-name }}"))],
                ),
            );

        let diagnostics = validate(&set, &ValidatorConfig::default());

        assert_eq!(
            kinds(&diagnostics),
            vec![
                DiagnosticKind::DuplicateWorkflowName,
                DiagnosticKind::UnresolvedSecretRef,
                DiagnosticKind::UnknownRunnerLabel,
            ]
        );
        assert!(diagnostics[0].message.contains("ids: a, b"));
        assert!(has_fatal(&diagnostics));
    }

    #[test_log::test]
    fn test_duplicate_job_id_reported_once() {
        let set = WorkflowSet::new().with_workflow(
            "ci",
            workflow(
                "CI",
                PathScope::Any,
                vec![
                    ("build", job("One", "ubuntu-latest", "make")),
                    ("build", job("Two", "ubuntu-latest", "make")),
                    ("test", job("Test", "ubuntu-latest", "make test")),
                    ("build", job("Three", "ubuntu-latest", "make")),
                ],
            ),
        );

        let diagnostics = validate(&set, &ValidatorConfig::default());

        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::DuplicateJobId]);
        assert_eq!(diagnostics[0].job.as_deref(), Some("build"));
        assert!(diagnostics[0].message.contains("3 times"));
    }

    #[test_log::test]
    fn test_duplicate_workflow_id() {
        let make = || {
            workflow(
                "CI",
                PathScope::Any,
                vec![("build", job("Build", "ubuntu-latest", "make"))],
            )
        };
        let set = WorkflowSet::new()
            .with_workflow("ci", make())
            .with_workflow("ci", make());

        assert_eq!(
            kinds(&validate(&set, &ValidatorConfig::default())),
            vec![
                DiagnosticKind::DuplicateWorkflowName,
                DiagnosticKind::DuplicateWorkflowId,
            ]
        );
    }

    #[test_log::test]
    fn test_unknown_runner_is_warning_only() {
        let set = WorkflowSet::new().with_workflow(
            "ci",
            workflow(
                "CI",
                PathScope::Any,
                vec![("build", job("Build", "self-hosted-gpu", "make"))],
            ),
        );

        let diagnostics = validate(&set, &ValidatorConfig::default());
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnknownRunnerLabel]);
        assert!(!has_fatal(&diagnostics));

        let config = ValidatorConfig {
            runners: RunnerAllowList::default().with_label("self-hosted-gpu"),
            allow_unknown_runners: false,
        };
        assert_eq!(validate(&set, &config), vec![]);

        let config = ValidatorConfig {
            runners: RunnerAllowList::empty(),
            allow_unknown_runners: true,
        };
        assert_eq!(validate(&set, &config), vec![]);
    }

    #[test_log::test]
    fn test_empty_runner_is_fatal() {
        let set = WorkflowSet::new().with_workflow(
            "ci",
            workflow("CI", PathScope::Any, vec![("build", job("Build", "  ", "make"))]),
        );

        let diagnostics = validate(&set, &ValidatorConfig::default());
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::EmptyRunnerLabel]);
        assert!(has_fatal(&diagnostics));
    }

    #[test_log::test]
    fn test_secret_refs_in_env_are_checked() {
        let step = run_step("deploy")
            .unwrap()
            .with_env("KEY", "${{ secrets.9bad }}");
        let job = Job::new("Deploy", "ubuntu-latest", vec![step]).unwrap();
        let set = WorkflowSet::new().with_workflow(
            "deploy",
            workflow("Deploy", PathScope::Any, vec![("deploy", job)]),
        );

        let diagnostics = validate(&set, &ValidatorConfig::default());
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnresolvedSecretRef]);
        assert!(diagnostics[0].message.starts_with("step 1:"));
    }

    #[test_log::test]
    fn test_overlapping_independent_filters_warn() {
        let mut registry = PathFilterRegistry::new();
        let api = registry
            .define("api", vec!["api/**".to_string()], vec![])
            .unwrap();
        let api_and_docs = registry
            .define(
                "api-and-docs",
                vec!["api/**".to_string(), "docs/**".to_string()],
                vec![],
            )
            .unwrap();

        let set = WorkflowSet::new()
            .with_workflow(
                "api",
                workflow(
                    "API",
                    PathScope::Filtered(api),
                    vec![("build", job("Build", "ubuntu-latest", "make"))],
                ),
            )
            .with_workflow(
                "site",
                workflow(
                    "Site",
                    PathScope::Filtered(api_and_docs),
                    vec![("build", job("Build", "ubuntu-latest", "make"))],
                ),
            );

        let diagnostics = validate(&set, &ValidatorConfig::default());
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::OverlappingPathFilters]);
        assert!(diagnostics[0].message.contains("api/**"));
        assert!(!has_fatal(&diagnostics));
    }
}
