//! Jobs, workflows and the workflow set handed to the validator and renderer.
//!
//! Job and workflow ids are stored as insertion-ordered entry lists rather than
//! maps. Adding an id twice keeps both entries so the validator can report the
//! collision instead of one definition silently replacing the other.

use serde::Serialize;
use thiserror::Error;

use crate::{EventTrigger, Step};

/// Errors raised while building jobs and workflows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// A job was built without steps
    #[error("Job '{0}' has no steps")]
    EmptyStepSequence(String),
    /// A workflow was built without jobs
    #[error("Workflow '{0}' has no jobs")]
    EmptyJobSet(String),
    /// A workflow was built without a trigger
    #[error("Workflow '{0}' has no trigger")]
    MissingTrigger(String),
}

/// A named group of ordered steps executed on one runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    name: String,
    runs_on: String,
    steps: Vec<Step>,
}

impl Job {
    /// Create a job running `steps` in order on `runs_on`.
    ///
    /// # Errors
    ///
    /// * [`WorkflowError::EmptyStepSequence`] if `steps` is empty
    pub fn new(
        name: impl Into<String>,
        runs_on: impl Into<String>,
        steps: Vec<Step>,
    ) -> Result<Self, WorkflowError> {
        let name = name.into();
        if steps.is_empty() {
            return Err(WorkflowError::EmptyStepSequence(name));
        }

        Ok(Self {
            name,
            runs_on: runs_on.into(),
            steps,
        })
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runner label, checked against the allow-list by the validator.
    #[must_use]
    pub fn runs_on(&self) -> &str {
        &self.runs_on
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// A named, independently triggerable CI pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workflow {
    name: String,
    trigger: EventTrigger,
    jobs: Vec<(String, Job)>,
}

impl Workflow {
    /// Start a workflow with a display name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            trigger: None,
            jobs: vec![],
        }
    }

    /// Display name shown by the CI provider.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn trigger(&self) -> &EventTrigger {
        &self.trigger
    }

    /// Jobs in insertion order, duplicates included.
    #[must_use]
    pub fn jobs(&self) -> &[(String, Job)] {
        &self.jobs
    }

    /// First job registered under `id`.
    #[must_use]
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs
            .iter()
            .find_map(|(job_id, job)| (job_id == id).then_some(job))
    }
}

/// Collects a trigger and jobs for a [`Workflow`].
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    name: String,
    trigger: Option<EventTrigger>,
    jobs: Vec<(String, Job)>,
}

impl WorkflowBuilder {
    /// Set the trigger, replacing any earlier one.
    #[must_use]
    pub fn trigger(mut self, trigger: EventTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Add a job. Adding an id twice keeps both entries for the validator to report.
    #[must_use]
    pub fn job(mut self, id: impl Into<String>, job: Job) -> Self {
        self.jobs.push((id.into(), job));
        self
    }

    /// Produce the workflow.
    ///
    /// # Errors
    ///
    /// * [`WorkflowError::MissingTrigger`] if no trigger was set
    /// * [`WorkflowError::EmptyJobSet`] if no job was added
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let Some(trigger) = self.trigger else {
            return Err(WorkflowError::MissingTrigger(self.name));
        };
        if self.jobs.is_empty() {
            return Err(WorkflowError::EmptyJobSet(self.name));
        }

        Ok(Workflow {
            name: self.name,
            trigger,
            jobs: self.jobs,
        })
    }
}

/// The root object: every workflow to emit, keyed by id.
///
/// The id becomes the manifest file name; the workflow name is what the CI
/// provider displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowSet {
    workflows: Vec<(String, Workflow)>,
}

impl WorkflowSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workflow under `id`, builder style.
    #[must_use]
    pub fn with_workflow(mut self, id: impl Into<String>, workflow: Workflow) -> Self {
        self.insert(id, workflow);
        self
    }

    /// Add a workflow under `id`. A repeated id keeps both entries.
    pub fn insert(&mut self, id: impl Into<String>, workflow: Workflow) {
        let id = id.into();
        log::trace!("insert: workflow '{id}' ({})", workflow.name);
        self.workflows.push((id, workflow));
    }

    /// Workflows in insertion order, duplicates included.
    #[must_use]
    pub fn workflows(&self) -> &[(String, Workflow)] {
        &self.workflows
    }

    /// First workflow registered under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Workflow> {
        self.workflows
            .iter()
            .find_map(|(workflow_id, workflow)| (workflow_id == id).then_some(workflow))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
