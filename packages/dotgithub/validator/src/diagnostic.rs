use std::fmt;

use serde::Serialize;
use strum_macros::AsRefStr;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Blocks manifest emission
    Error,
    /// Reported but does not block emission
    Warning,
}

/// What a diagnostic is about. Each kind has a fixed [`Severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, AsRefStr)]
pub enum DiagnosticKind {
    /// Two workflows share a display name
    DuplicateWorkflowName,
    /// Two workflows share an id, so their manifests would collide
    DuplicateWorkflowId,
    /// Two jobs in one workflow share an id
    DuplicateJobId,
    /// A text field holds a secret expression with an invalid name
    UnresolvedSecretRef,
    /// A job has no runner label
    EmptyRunnerLabel,
    /// A runner label is not on the allow-list
    UnknownRunnerLabel,
    /// Sibling workflows may both fire for the same change
    OverlappingPathFilters,
}

impl DiagnosticKind {
    /// Errors block emission, warnings do not.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::UnknownRunnerLabel | Self::OverlappingPathFilters => Severity::Warning,
            Self::DuplicateWorkflowName
            | Self::DuplicateWorkflowId
            | Self::DuplicateJobId
            | Self::UnresolvedSecretRef
            | Self::EmptyRunnerLabel => Severity::Error,
        }
    }
}

/// A single problem found in a workflow set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// A diagnostic with the kind's default severity and no location.
    #[must_use]
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            workflow: None,
            job: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn in_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }

    #[must_use]
    pub fn in_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Whether this diagnostic blocks emission.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.severity.as_ref(), self.kind.as_ref())?;

        match (&self.workflow, &self.job) {
            (Some(workflow), Some(job)) => write!(f, " {workflow}/{job}")?,
            (Some(workflow), None) => write!(f, " {workflow}")?,
            (None, Some(job)) => write!(f, " job {job}")?,
            (None, None) => {}
        }

        write!(f, ": {}", self.message)
    }
}

/// Whether any diagnostic blocks emission.
#[must_use]
pub fn has_fatal(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_fatal)
}
