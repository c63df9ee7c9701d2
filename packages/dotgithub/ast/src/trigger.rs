//! Event triggers: which events, on which branches, touching which files.
//!
//! Event kinds combine with OR semantics: the workflow runs when any of them
//! fires. The branch patterns and the [`PathScope`] then gate every event kind
//! that supports filtering.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    PathFilterSet,
    paths::{NEGATED_GLOB_MESSAGE, NEGATION, build_glob, glob_set},
};

/// Errors raised while building a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// The builder had no event kind
    #[error("A trigger needs at least one event kind")]
    EmptyEventKinds,
    /// A branch pattern was empty or blank
    #[error("Branch patterns must not be empty")]
    EmptyBranchPattern,
    /// A branch pattern does not compile or starts with `!`
    #[error("Invalid branch pattern '{pattern}': {message}")]
    InvalidBranchPattern { pattern: String, message: String },
    /// An event name the provider does not know
    #[error("Unknown event kind '{0}'")]
    UnknownEventKind(String),
}

/// CI events a workflow can react to.
///
/// The declaration order is the order events are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Commits pushed to a branch
    Push,
    /// Pull requests targeting a branch
    PullRequest,
    /// Pull requests targeting a branch, run in the context of the base branch
    PullRequestTarget,
    /// Manual runs from the UI or API
    WorkflowDispatch,
}

impl EventKind {
    /// Every event kind, in render order.
    pub const ALL: [Self; 4] = [
        Self::Push,
        Self::PullRequest,
        Self::PullRequestTarget,
        Self::WorkflowDispatch,
    ];

    /// The provider's event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::PullRequestTarget => "pull_request_target",
            Self::WorkflowDispatch => "workflow_dispatch",
        }
    }

    /// Whether `branches` and `paths` filters apply to this event.
    #[must_use]
    pub const fn supports_filters(self) -> bool {
        !matches!(self, Self::WorkflowDispatch)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TriggerError::UnknownEventKind(s.to_string()))
    }
}

/// File-based restriction applied on top of every filterable event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum PathScope {
    /// No path restriction: the trigger fires regardless of changed files.
    #[default]
    Any,
    /// Only fire when a changed file passes the filter set.
    Filtered(PathFilterSet),
}

impl PathScope {
    /// The filter set, if the scope is restricted.
    #[must_use]
    pub const fn filter(&self) -> Option<&PathFilterSet> {
        match self {
            Self::Any => None,
            Self::Filtered(set) => Some(set),
        }
    }

    /// Whether a change set passes the scope.
    #[must_use]
    pub fn permits<S: AsRef<str>>(&self, changed_files: &[S]) -> bool {
        match self {
            Self::Any => true,
            Self::Filtered(set) => set.matches_any(changed_files),
        }
    }
}

impl From<PathFilterSet> for PathScope {
    fn from(value: PathFilterSet) -> Self {
        Self::Filtered(value)
    }
}

/// The condition set under which a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTrigger {
    events: BTreeSet<EventKind>,
    branches: Vec<String>,
    paths: PathScope,
}

impl EventTrigger {
    /// Start an empty trigger.
    #[must_use]
    pub fn builder() -> EventTriggerBuilder {
        EventTriggerBuilder::default()
    }

    /// Fire on pushes to `base_branch` and on pull requests targeting it, both
    /// scoped to the same paths.
    ///
    /// # Errors
    ///
    /// * [`TriggerError::EmptyBranchPattern`] if `base_branch` is empty
    /// * [`TriggerError::InvalidBranchPattern`] if `base_branch` is not a valid pattern
    pub fn push_and_pull_request(
        base_branch: impl Into<String>,
        paths: impl Into<PathScope>,
    ) -> Result<Self, TriggerError> {
        Self::builder()
            .event(EventKind::Push)
            .event(EventKind::PullRequest)
            .branch(base_branch)
            .paths(paths)
            .build()
    }

    /// Event kinds, OR-combined.
    #[must_use]
    pub const fn events(&self) -> &BTreeSet<EventKind> {
        &self.events
    }

    /// Branch patterns in the order they were added. Empty means every branch.
    #[must_use]
    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    /// File restriction shared by every filterable event.
    #[must_use]
    pub const fn paths(&self) -> &PathScope {
        &self.paths
    }

    /// Evaluate whether an event on `branch` touching `changed_files` would start the workflow.
    #[must_use]
    pub fn fires_for<S: AsRef<str>>(
        &self,
        event: EventKind,
        branch: &str,
        changed_files: &[S],
    ) -> bool {
        if !self.events.contains(&event) {
            return false;
        }
        if !event.supports_filters() {
            return true;
        }

        let branch_matches = self.branches.is_empty() || glob_set(&self.branches).is_match(branch);

        branch_matches && self.paths.permits(changed_files)
    }

    /// Whether this trigger and `other` can fire for the same event on the same branch.
    #[must_use]
    pub fn shares_event_and_branch(&self, other: &Self) -> bool {
        let shared_event = self
            .events
            .intersection(&other.events)
            .any(|event| event.supports_filters());

        let shared_branch = self.branches.is_empty()
            || other.branches.is_empty()
            || self.branches.iter().any(|b| other.branches.contains(b));

        shared_event && shared_branch
    }
}

/// Accumulates events, branch patterns and a path scope for an [`EventTrigger`].
///
/// Nothing is checked until [`EventTriggerBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct EventTriggerBuilder {
    events: BTreeSet<EventKind>,
    branches: Vec<String>,
    paths: PathScope,
}

impl EventTriggerBuilder {
    /// Add one event kind. Adding a kind twice has no effect.
    #[must_use]
    pub fn event(mut self, kind: EventKind) -> Self {
        self.events.insert(kind);
        self
    }

    /// Add several event kinds.
    #[must_use]
    pub fn events(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.events.extend(kinds);
        self
    }

    /// Add a branch pattern. Repeated patterns keep their first position.
    #[must_use]
    pub fn branch(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if !self.branches.contains(&pattern) {
            self.branches.push(pattern);
        }
        self
    }

    /// Add several branch patterns in order.
    #[must_use]
    pub fn branches<S: Into<String>>(self, patterns: impl IntoIterator<Item = S>) -> Self {
        patterns
            .into_iter()
            .fold(self, |builder, pattern| builder.branch(pattern))
    }

    /// Set the path scope, replacing any earlier one.
    #[must_use]
    pub fn paths(mut self, paths: impl Into<PathScope>) -> Self {
        self.paths = paths.into();
        self
    }

    /// Check every pattern and produce the trigger.
    ///
    /// # Errors
    ///
    /// * [`TriggerError::EmptyEventKinds`] if no event kind was added
    /// * [`TriggerError::EmptyBranchPattern`] if a branch pattern is empty
    /// * [`TriggerError::InvalidBranchPattern`] if a branch pattern is not a valid glob
    pub fn build(self) -> Result<EventTrigger, TriggerError> {
        if self.events.is_empty() {
            return Err(TriggerError::EmptyEventKinds);
        }

        for pattern in &self.branches {
            if pattern.trim().is_empty() {
                return Err(TriggerError::EmptyBranchPattern);
            }
            if pattern.starts_with(NEGATION) {
                return Err(TriggerError::InvalidBranchPattern {
                    pattern: pattern.clone(),
                    message: NEGATED_GLOB_MESSAGE.to_string(),
                });
            }
            build_glob(pattern).map_err(|e| TriggerError::InvalidBranchPattern {
                pattern: pattern.clone(),
                message: e.kind().to_string(),
            })?;
        }

        Ok(EventTrigger {
            events: self.events,
            branches: self.branches,
            paths: self.paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{ONLY_DOCS, PathFilterRegistry, WITHOUT_DOCS};

    #[test_log::test]
    fn test_push_and_pull_request_composes_both_events() {
        let trigger = EventTrigger::push_and_pull_request("main", PathScope::Any).unwrap();

        assert_eq!(
            trigger.events().iter().copied().collect::<Vec<_>>(),
            vec![EventKind::Push, EventKind::PullRequest]
        );
        assert_eq!(trigger.branches(), &["main".to_string()]);
        assert_eq!(trigger.paths(), &PathScope::Any);
    }

    #[test_log::test]
    fn test_builder_requires_an_event() {
        assert_eq!(
            EventTrigger::builder().branch("main").build(),
            Err(TriggerError::EmptyEventKinds)
        );
    }

    #[test_log::test]
    fn test_builder_rejects_empty_branch() {
        assert_eq!(
            EventTrigger::push_and_pull_request("", PathScope::Any),
            Err(TriggerError::EmptyBranchPattern)
        );
    }

    #[test_log::test]
    fn test_builder_rejects_negated_branch() {
        let err = EventTrigger::builder()
            .event(EventKind::Push)
            .branches(["main", "!release/*"])
            .build()
            .unwrap_err();

        assert!(
            matches!(err, TriggerError::InvalidBranchPattern { ref pattern, .. } if pattern == "!release/*"),
            "{err:?}"
        );
    }

    #[test_log::test]
    fn test_builder_keeps_branch_order_and_dedupes() {
        let trigger = EventTrigger::builder()
            .event(EventKind::Push)
            .branches(["release/*", "main", "release/*"])
            .build()
            .unwrap();

        assert_eq!(
            trigger.branches(),
            &["release/*".to_string(), "main".to_string()]
        );
    }

    #[test_log::test]
    fn test_any_scope_fires_regardless_of_files() {
        let trigger = EventTrigger::push_and_pull_request("main", PathScope::Any).unwrap();

        assert!(trigger.fires_for(EventKind::Push, "main", &["docs/index.md"]));
        assert!(trigger.fires_for(EventKind::PullRequest, "main", &["src/lib.rs"]));
        assert!(trigger.fires_for::<&str>(EventKind::Push, "main", &[]));
    }

    #[test_log::test]
    fn test_event_kinds_are_or_and_paths_gate_each() {
        let registry = PathFilterRegistry::with_builtins();
        let only_docs = registry.get(ONLY_DOCS).unwrap().clone();
        let trigger = EventTrigger::push_and_pull_request("main", only_docs).unwrap();

        assert!(trigger.fires_for(EventKind::Push, "main", &["docs/a.md"]));
        assert!(trigger.fires_for(EventKind::PullRequest, "main", &["docs/a.md"]));
        assert!(!trigger.fires_for(EventKind::Push, "main", &["src/lib.rs"]));
        assert!(!trigger.fires_for(EventKind::PullRequest, "main", &["src/lib.rs"]));
        assert!(!trigger.fires_for(EventKind::Push, "develop", &["docs/a.md"]));
        assert!(!trigger.fires_for(EventKind::WorkflowDispatch, "main", &["docs/a.md"]));
    }

    #[test_log::test]
    fn test_docs_and_code_triggers_never_fire_for_the_same_file() {
        let registry = PathFilterRegistry::with_builtins();
        let docs = EventTrigger::push_and_pull_request(
            "main",
            registry.get(ONLY_DOCS).unwrap().clone(),
        )
        .unwrap();
        let code = EventTrigger::push_and_pull_request(
            "main",
            registry.get(WITHOUT_DOCS).unwrap().clone(),
        )
        .unwrap();

        for file in ["README.md", "docs/x/y.html", "src/lib.rs", "Cargo.lock"] {
            assert_ne!(
                docs.fires_for(EventKind::Push, "main", &[file]),
                code.fires_for(EventKind::Push, "main", &[file]),
                "{file}"
            );
        }
    }

    #[test_log::test]
    fn test_branch_globs_do_not_cross_separators() {
        let trigger = EventTrigger::builder()
            .event(EventKind::Push)
            .branch("release/*")
            .build()
            .unwrap();

        assert!(trigger.fires_for::<&str>(EventKind::Push, "release/1.0", &[]));
        assert!(!trigger.fires_for::<&str>(EventKind::Push, "release/1.0/hotfix", &[]));
    }

    #[test_log::test]
    fn test_event_kind_round_trips_through_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert_eq!(
            "schedule".parse::<EventKind>(),
            Err(TriggerError::UnknownEventKind("schedule".to_string()))
        );
    }
}
