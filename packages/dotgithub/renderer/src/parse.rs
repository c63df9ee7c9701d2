//! Reading rendered manifests back into the workflow model.
//!
//! Accepts everything [`render`](crate::render) produces plus the common
//! hand-written shorthands (`on: push`, `on: [push, pull_request]`). Path
//! filters are matched against a registry so sets keep their registered ids;
//! unknown glob combinations come back as anonymous sets.

use std::collections::BTreeMap;

use dotgithub_ast::{
    EventKind, EventTrigger, Job, PathFilterError, PathFilterRegistry, PathFilterSet, PathScope,
    Step, StepError, TriggerError, Workflow, WorkflowError, run_step, uses_step,
};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::{
    BRANCHES, ENV, JOBS, NAME, NEGATION, ON, PATHS, PATHS_IGNORE, RUN, RUNS_ON, STEPS, USES,
    WITH, WORKING_DIRECTORY,
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Missing required key '{0}'")]
    MissingKey(String),
    #[error("Key '{key}' has an unexpected shape: expected {expected}")]
    UnexpectedShape { key: String, expected: &'static str },
    #[error("Events disagree on their branch or path filters")]
    InconsistentEventFilters,
    #[error("Step {index} of job '{job}' has neither 'uses' nor 'run'")]
    UnknownStepKind { job: String, index: usize },
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    PathFilter(#[from] PathFilterError),
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Parse a manifest, resolving path filters against the global registry.
///
/// Calling this before [`PathFilterRegistry::install_global`] freezes the
/// builtins as the global registry. Use [`parse_with_registry`] to avoid that.
///
/// # Errors
///
/// * [`ParseError`] if the text is not a workflow manifest this crate understands
pub fn parse(text: &str) -> Result<Workflow, ParseError> {
    parse_with_registry(text, dotgithub_ast::global())
}

/// Parse a manifest, resolving path filters against `registry`.
///
/// # Errors
///
/// * [`ParseError`] if the text is not a workflow manifest this crate understands
pub fn parse_with_registry(
    text: &str,
    registry: &PathFilterRegistry,
) -> Result<Workflow, ParseError> {
    let document: Value = serde_yaml::from_str(text)?;
    let root = as_mapping(&document, "<root>")?;

    let name = required_string(root, NAME)?;
    // `on` is a boolean under YAML 1.1 and some emitters still write it that way
    let on = root
        .get(ON)
        .or_else(|| root.get(Value::Bool(true)))
        .ok_or_else(|| ParseError::MissingKey(ON.to_string()))?;

    let mut builder = Workflow::builder(name).trigger(parse_trigger(on, registry)?);

    let jobs = root
        .get(JOBS)
        .ok_or_else(|| ParseError::MissingKey(JOBS.to_string()))?;

    for (id, job) in as_mapping(jobs, JOBS)? {
        let id = scalar_string(id).ok_or_else(|| shape(JOBS, "string job ids"))?;
        let job = parse_job(&id, job)?;
        builder = builder.job(id, job);
    }

    let workflow = builder.build()?;
    log::debug!(
        "parse: workflow '{}' with {} job(s)",
        workflow.name(),
        workflow.jobs().len()
    );

    Ok(workflow)
}

fn shape(key: &str, expected: &'static str) -> ParseError {
    ParseError::UnexpectedShape {
        key: key.to_string(),
        expected,
    }
}

fn as_mapping<'a>(value: &'a Value, key: &str) -> Result<&'a Mapping, ParseError> {
    value.as_mapping().ok_or_else(|| shape(key, "a mapping"))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_string(mapping: &Mapping, key: &str) -> Result<String, ParseError> {
    let value = mapping
        .get(key)
        .ok_or_else(|| ParseError::MissingKey(key.to_string()))?;

    scalar_string(value).ok_or_else(|| shape(key, "a string"))
}

fn string_list(value: &Value, key: &str) -> Result<Vec<String>, ParseError> {
    let invalid = || shape(key, "a list of strings");

    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| scalar_string(item).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn string_map(value: &Value, key: &str) -> Result<BTreeMap<String, String>, ParseError> {
    as_mapping(value, key)?
        .iter()
        .map(|(k, v)| match (scalar_string(k), scalar_string(v)) {
            (Some(k), Some(v)) => Ok((k, v)),
            _ => Err(shape(key, "a mapping of strings")),
        })
        .collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
struct EventFilters {
    branches: Vec<String>,
    include: Vec<String>,
    exclude: Vec<String>,
}

fn parse_event_filters(value: &Value) -> Result<EventFilters, ParseError> {
    let mut filters = EventFilters::default();

    let config = match value {
        Value::Null => return Ok(filters),
        other => as_mapping(other, ON)?,
    };

    if let Some(branches) = config.get(BRANCHES) {
        filters.branches = string_list(branches, BRANCHES)?;
    }
    if let Some(paths) = config.get(PATHS) {
        for glob in string_list(paths, PATHS)? {
            match glob.strip_prefix(NEGATION) {
                Some(excluded) => filters.exclude.push(excluded.to_string()),
                None => filters.include.push(glob),
            }
        }
    }
    if let Some(ignored) = config.get(PATHS_IGNORE) {
        filters.exclude.extend(string_list(ignored, PATHS_IGNORE)?);
    }

    Ok(filters)
}

fn parse_trigger(on: &Value, registry: &PathFilterRegistry) -> Result<EventTrigger, ParseError> {
    let mut events = vec![];
    let mut shared: Option<EventFilters> = None;

    let entries = match on {
        Value::String(_) | Value::Sequence(_) => string_list(on, ON)?
            .into_iter()
            .map(|event| (event, Value::Null))
            .collect::<Vec<_>>(),
        Value::Mapping(mapping) => mapping
            .iter()
            .map(|(event, config)| {
                scalar_string(event)
                    .map(|event| (event, config.clone()))
                    .ok_or_else(|| shape(ON, "event names"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(shape(ON, "an event name, list or mapping")),
    };

    for (event, config) in entries {
        let kind = event.parse::<EventKind>()?;
        events.push(kind);

        if !kind.supports_filters() {
            continue;
        }

        let filters = parse_event_filters(&config)?;
        match &shared {
            Some(existing) if *existing != filters => {
                return Err(ParseError::InconsistentEventFilters);
            }
            Some(_) => {}
            None => shared = Some(filters),
        }
    }

    let filters = shared.unwrap_or_default();
    let paths = path_scope(filters.include, filters.exclude, registry)?;

    Ok(EventTrigger::builder()
        .events(events)
        .branches(filters.branches)
        .paths(paths)
        .build()?)
}

fn path_scope(
    include: Vec<String>,
    exclude: Vec<String>,
    registry: &PathFilterRegistry,
) -> Result<PathScope, ParseError> {
    if include.is_empty() && exclude.is_empty() {
        return Ok(PathScope::Any);
    }

    let parsed = PathFilterSet::anonymous(include, exclude)?;
    let set = registry
        .iter()
        .find(|registered| registered.same_globs(&parsed))
        .cloned()
        .unwrap_or(parsed);

    log::trace!("path_scope: resolved path filter '{}'", set.id());

    Ok(PathScope::Filtered(set))
}

fn parse_job(id: &str, value: &Value) -> Result<Job, ParseError> {
    let mapping = as_mapping(value, id)?;

    let name = match mapping.get(NAME) {
        Some(name) => scalar_string(name).ok_or_else(|| shape(NAME, "a string"))?,
        None => id.to_string(),
    };
    let runs_on = required_string(mapping, RUNS_ON)?;

    let steps = mapping
        .get(STEPS)
        .ok_or_else(|| ParseError::MissingKey(STEPS.to_string()))?
        .as_sequence()
        .ok_or_else(|| shape(STEPS, "a list"))?
        .iter()
        .enumerate()
        .map(|(index, step)| parse_step(id, index + 1, step))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Job::new(name, runs_on, steps)?)
}

fn parse_step(job: &str, index: usize, value: &Value) -> Result<Step, ParseError> {
    let mapping = as_mapping(value, STEPS)?;

    let mut step = if let Some(uses) = mapping.get(USES) {
        let uses = scalar_string(uses).ok_or_else(|| shape(USES, "a string"))?;
        let inputs = match mapping.get(WITH) {
            Some(with) => string_map(with, WITH)?,
            None => BTreeMap::new(),
        };
        uses_step(&uses, inputs)?
    } else if let Some(run) = mapping.get(RUN) {
        let command = scalar_string(run).ok_or_else(|| shape(RUN, "a string"))?;
        let mut step = run_step(command)?;
        if let Some(dir) = mapping.get(WORKING_DIRECTORY) {
            let dir = scalar_string(dir).ok_or_else(|| shape(WORKING_DIRECTORY, "a string"))?;
            step = step.with_working_directory(dir);
        }
        step
    } else {
        return Err(ParseError::UnknownStepKind {
            job: job.to_string(),
            index,
        });
    };

    if let Some(name) = mapping.get(NAME) {
        let name = scalar_string(name).ok_or_else(|| shape(NAME, "a string"))?;
        step = step.with_name(name);
    }
    if let Some(env) = mapping.get(ENV) {
        for (k, v) in string_map(env, ENV)? {
            step = step.with_env(k, v);
        }
    }

    Ok(step)
}
