#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Deterministic YAML rendering of dotgithub workflows.
//!
//! The output layout is fixed so that regenerating an unchanged definition
//! never produces a diff:
//!
//! * top-level keys are `name`, `on`, `jobs`, in that order
//! * events follow [`EventKind`] declaration order
//! * branch patterns and globs keep the order they were registered in
//! * job ids are sorted, steps are emitted exactly as built
//!
//! [`parse`] reads a rendered manifest back into a [`Workflow`].

mod parse;

use std::collections::BTreeMap;

use dotgithub_ast::{EventKind, EventTrigger, Job, PathFilterSet, Step, Workflow, WorkflowSet};
use rayon::prelude::*;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

pub use parse::*;

/// Directory GitHub reads workflow manifests from, relative to the repository root.
pub const WORKFLOWS_DIR: &str = ".github/workflows";

/// Comment prepended to every rendered manifest.
pub const GENERATED_HEADER: &str =
    "# This file is generated by dotgithub. Do not edit it by hand.\n";

pub(crate) const NAME: &str = "name";
pub(crate) const ON: &str = "on";
pub(crate) const JOBS: &str = "jobs";
pub(crate) const BRANCHES: &str = "branches";
pub(crate) const PATHS: &str = "paths";
pub(crate) const PATHS_IGNORE: &str = "paths-ignore";
pub(crate) const RUNS_ON: &str = "runs-on";
pub(crate) const STEPS: &str = "steps";
pub(crate) const USES: &str = "uses";
pub(crate) const WITH: &str = "with";
pub(crate) const RUN: &str = "run";
pub(crate) const WORKING_DIRECTORY: &str = "working-directory";
pub(crate) const ENV: &str = "env";

pub(crate) const NEGATION: char = '!';

/// Errors raised while rendering manifests.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Two jobs in one workflow would map to the same YAML key
    #[error("Workflow '{workflow}' has more than one job with id '{job}'")]
    DuplicateJobId { workflow: String, job: String },
    /// Two workflows would write the same manifest file
    #[error("Workflow id '{0}' is used more than once")]
    DuplicateWorkflowId(String),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Render one workflow to a YAML document.
///
/// # Errors
///
/// * [`RenderError::DuplicateJobId`] if two jobs share an id
/// * [`RenderError::Yaml`] if serialization fails
pub fn render(workflow: &Workflow) -> Result<String, RenderError> {
    let mut root = Mapping::new();

    root.insert(key(NAME), Value::String(workflow.name().to_string()));
    root.insert(key(ON), trigger_value(workflow.trigger()));
    root.insert(key(JOBS), jobs_value(workflow)?);

    let body = serde_yaml::to_string(&Value::Mapping(root))?;
    log::trace!("render: workflow '{}' ({} bytes)", workflow.name(), body.len());

    Ok(format!("{GENERATED_HEADER}{body}"))
}

/// Render every workflow of a set in parallel, keyed by workflow id.
///
/// # Errors
///
/// * [`RenderError::DuplicateWorkflowId`] if two workflows share an id
/// * any error [`render`] returns for a single workflow
pub fn render_all(set: &WorkflowSet) -> Result<BTreeMap<String, String>, RenderError> {
    let workflows = set.workflows();

    for (i, (id, _)) in workflows.iter().enumerate() {
        if workflows[..i].iter().any(|(other, _)| other == id) {
            return Err(RenderError::DuplicateWorkflowId(id.clone()));
        }
    }

    log::debug!("render_all: rendering {} workflow(s)", workflows.len());

    workflows
        .par_iter()
        .map(|(id, workflow)| {
            log::trace!("render_all: rendering '{id}'");
            render(workflow).map(|text| (id.clone(), text))
        })
        .collect()
}

/// File name of the manifest for `workflow_id`.
#[must_use]
pub fn manifest_file_name(workflow_id: &str) -> String {
    format!("{workflow_id}.yml")
}

/// Repository-relative path of the manifest for `workflow_id`.
#[must_use]
pub fn manifest_path(workflow_id: &str) -> String {
    format!("{WORKFLOWS_DIR}/{}", manifest_file_name(workflow_id))
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn string_list(values: &[String]) -> Value {
    Value::Sequence(values.iter().cloned().map(Value::String).collect())
}

fn string_map(values: &BTreeMap<String, String>) -> Value {
    Value::Mapping(
        values
            .iter()
            .map(|(k, v)| (key(k), Value::String(v.clone())))
            .collect(),
    )
}

fn trigger_value(trigger: &EventTrigger) -> Value {
    let mut on = Mapping::new();

    for event in trigger.events() {
        on.insert(key(event.as_str()), event_value(*event, trigger));
    }

    Value::Mapping(on)
}

fn event_value(event: EventKind, trigger: &EventTrigger) -> Value {
    let mut config = Mapping::new();

    if event.supports_filters() {
        if !trigger.branches().is_empty() {
            config.insert(key(BRANCHES), string_list(trigger.branches()));
        }
        if let Some(filter) = trigger.paths().filter() {
            insert_path_filter(&mut config, filter);
        }
    }

    Value::Mapping(config)
}

fn insert_path_filter(config: &mut Mapping, filter: &PathFilterSet) {
    match (filter.include().is_empty(), filter.exclude().is_empty()) {
        (false, true) => {
            config.insert(key(PATHS), string_list(filter.include()));
        }
        (true, false) => {
            config.insert(key(PATHS_IGNORE), string_list(filter.exclude()));
        }
        _ => {
            let negated = filter
                .exclude()
                .iter()
                .map(|glob| format!("{NEGATION}{glob}"))
                .collect::<Vec<_>>();
            let paths = filter
                .include()
                .iter()
                .cloned()
                .chain(negated)
                .collect::<Vec<_>>();
            config.insert(key(PATHS), string_list(&paths));
        }
    }
}

fn jobs_value(workflow: &Workflow) -> Result<Value, RenderError> {
    let mut jobs = workflow.jobs().iter().collect::<Vec<_>>();
    jobs.sort_by(|(a, _), (b, _)| a.cmp(b));

    if let Some(pair) = jobs.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(RenderError::DuplicateJobId {
            workflow: workflow.name().to_string(),
            job: pair[0].0.clone(),
        });
    }

    Ok(Value::Mapping(
        jobs.into_iter()
            .map(|(id, job)| (key(id), job_value(job)))
            .collect(),
    ))
}

fn job_value(job: &Job) -> Value {
    let mut mapping = Mapping::new();

    mapping.insert(key(NAME), Value::String(job.name().to_string()));
    mapping.insert(key(RUNS_ON), Value::String(job.runs_on().to_string()));
    mapping.insert(
        key(STEPS),
        Value::Sequence(job.steps().iter().map(step_value).collect()),
    );

    Value::Mapping(mapping)
}

fn step_value(step: &Step) -> Value {
    let mut mapping = Mapping::new();

    if let Some(name) = step.name() {
        mapping.insert(key(NAME), Value::String(name.to_string()));
    }

    match step {
        Step::Action(action) => {
            mapping.insert(key(USES), Value::String(action.uses()));
            if !action.inputs().is_empty() {
                mapping.insert(key(WITH), string_map(action.inputs()));
            }
        }
        Step::Run(run) => {
            mapping.insert(key(RUN), Value::String(run.command().to_string()));
            if let Some(dir) = run.working_directory() {
                mapping.insert(key(WORKING_DIRECTORY), Value::String(dir.to_string()));
            }
        }
    }

    if !step.env().is_empty() {
        mapping.insert(key(ENV), string_map(step.env()));
    }

    Value::Mapping(mapping)
}
