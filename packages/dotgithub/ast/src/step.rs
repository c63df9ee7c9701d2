//! Step definitions and the factory functions that build them.
//!
//! A step either uses a published action (`uses: owner/repo@version`) or runs a
//! shell command. Text fields may already contain resolved secret expressions;
//! resolution always happens before a step is constructed.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::SecretRef;

/// Action used by [`checkout_step`].
pub const CHECKOUT_ACTION: &str = "actions/checkout";

/// Version of [`CHECKOUT_ACTION`] used when none is given.
pub const DEFAULT_CHECKOUT_VERSION: &str = "v4";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// A run step had a blank command
    #[error("Run step command is empty")]
    EmptyCommand,
    /// An action step had a blank action id
    #[error("Action step has no action id")]
    EmptyActionId,
}

/// A single unit of work within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Step {
    /// Step that uses a reusable, parameterized action
    Action(ActionStep),
    /// Step that runs a shell command
    Run(RunStep),
}

/// A step invoking a versioned action with string inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionStep {
    name: Option<String>,
    action_id: String,
    version: String,
    inputs: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
}

impl ActionStep {
    /// Action reference without the version, e.g. `actions/checkout`.
    #[must_use]
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The `with:` inputs, sorted by key.
    #[must_use]
    pub const fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    /// The `uses:` reference. Local actions have no version suffix.
    #[must_use]
    pub fn uses(&self) -> String {
        if self.version.is_empty() {
            self.action_id.clone()
        } else {
            format!("{}@{}", self.action_id, self.version)
        }
    }
}

/// A step running a shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStep {
    name: Option<String>,
    command: String,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl RunStep {
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Directory the command runs in, if not the workspace root.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

impl Step {
    /// Optional display name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Action(ActionStep { name, .. }) | Self::Run(RunStep { name, .. }) => {
                name.as_deref()
            }
        }
    }

    /// Step-level environment variables, sorted by key.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Action(ActionStep { env, .. }) | Self::Run(RunStep { env, .. }) => env,
        }
    }

    #[must_use]
    pub fn with_name(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Action(ActionStep { name, .. }) | Self::Run(RunStep { name, .. }) => {
                *name = Some(value.into());
            }
        }
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Action(ActionStep { env, .. }) | Self::Run(RunStep { env, .. }) => {
                env.insert(key.into(), value.into());
            }
        }
        self
    }

    /// Set the working directory of a run step. Action steps are returned unchanged.
    #[must_use]
    pub fn with_working_directory(mut self, value: impl Into<String>) -> Self {
        if let Self::Run(RunStep {
            working_directory, ..
        }) = &mut self
        {
            *working_directory = Some(value.into());
        }
        self
    }

    /// Every free-text field that may carry an expression, for scanning.
    #[must_use]
    pub fn text_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.name().into_iter().collect();

        match self {
            Self::Action(step) => {
                fields.extend(step.inputs.values().map(String::as_str));
            }
            Self::Run(step) => {
                fields.push(&step.command);
                fields.extend(step.working_directory.as_deref());
            }
        }

        fields.extend(self.env().values().map(String::as_str));
        fields
    }
}

/// Options for [`checkout_step`]. Everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Action version, defaults to [`DEFAULT_CHECKOUT_VERSION`]
    pub version: Option<String>,
    /// Branch, tag or SHA to check out
    pub reference: Option<String>,
    /// Number of commits to fetch; `0` fetches the full history
    pub fetch_depth: Option<u32>,
    /// Token used to fetch the repository
    pub token: Option<SecretRef>,
}

/// Check out the repository with `actions/checkout`.
#[must_use]
pub fn checkout_step(options: CheckoutOptions) -> Step {
    let mut inputs = BTreeMap::new();

    if let Some(reference) = options.reference {
        inputs.insert("ref".to_string(), reference);
    }
    if let Some(depth) = options.fetch_depth {
        inputs.insert("fetch-depth".to_string(), depth.to_string());
    }
    if let Some(token) = options.token {
        inputs.insert("token".to_string(), token.expression());
    }

    Step::Action(ActionStep {
        name: None,
        action_id: CHECKOUT_ACTION.to_string(),
        version: options
            .version
            .unwrap_or_else(|| DEFAULT_CHECKOUT_VERSION.to_string()),
        inputs,
        env: BTreeMap::new(),
    })
}

/// Use an arbitrary action. An empty `version` renders without an `@` suffix.
///
/// # Errors
///
/// * [`StepError::EmptyActionId`] if `action_id` is empty
pub fn action_step(
    action_id: impl Into<String>,
    version: impl Into<String>,
    inputs: BTreeMap<String, String>,
) -> Result<Step, StepError> {
    let action_id = action_id.into();
    if action_id.trim().is_empty() {
        return Err(StepError::EmptyActionId);
    }

    Ok(Step::Action(ActionStep {
        name: None,
        action_id,
        version: version.into(),
        inputs,
        env: BTreeMap::new(),
    }))
}

/// Parse a `uses:` reference like `actions/checkout@v4` into an action step.
///
/// # Errors
///
/// * [`StepError::EmptyActionId`] if the reference has no action id
pub fn uses_step(uses: &str, inputs: BTreeMap<String, String>) -> Result<Step, StepError> {
    let (action_id, version) = uses.rsplit_once('@').unwrap_or((uses, ""));
    action_step(action_id, version, inputs)
}

/// Run a shell command. Secret expressions must already be resolved into it.
///
/// # Errors
///
/// * [`StepError::EmptyCommand`] if the command is empty or only whitespace
pub fn run_step(command: impl Into<String>) -> Result<Step, StepError> {
    let command = command.into();
    if command.trim().is_empty() {
        return Err(StepError::EmptyCommand);
    }

    Ok(Step::Run(RunStep {
        name: None,
        command,
        env: BTreeMap::new(),
        working_directory: None,
    }))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::resolve;

    #[test_log::test]
    fn test_checkout_step_defaults() {
        let Step::Action(step) = checkout_step(CheckoutOptions::default()) else {
            panic!("checkout must be an action step");
        };

        assert_eq!(step.uses(), "actions/checkout@v4");
        assert!(step.inputs().is_empty());
    }

    #[test_log::test]
    fn test_checkout_step_with_options() {
        let Step::Action(step) = checkout_step(CheckoutOptions {
            version: Some("v3".to_string()),
            reference: Some("main".to_string()),
            fetch_depth: Some(0),
            token: Some(SecretRef::new("BOT_TOKEN").unwrap()),
        }) else {
            panic!("checkout must be an action step");
        };

        assert_eq!(step.uses(), "actions/checkout@v3");
        assert_eq!(
            step.inputs(),
            &BTreeMap::from([
                ("fetch-depth".to_string(), "0".to_string()),
                ("ref".to_string(), "main".to_string()),
                ("token".to_string(), "${{ secrets.BOT_TOKEN }}".to_string()),
            ])
        );
    }

    #[test_log::test]
    fn test_run_step_embeds_resolved_secret() {
        let step = run_step(format!("echo {}", resolve("NpmToken").unwrap())).unwrap();

        let Step::Run(run) = &step else {
            panic!("expected run step");
        };
        assert_eq!(run.command(), "echo ${{ secrets.NpmToken }}");
    }

    #[test_log::test]
    fn test_run_step_rejects_empty_command() {
        assert_eq!(run_step(""), Err(StepError::EmptyCommand));
        assert_eq!(run_step("  \n\t"), Err(StepError::EmptyCommand));
    }

    #[test_log::test]
    fn test_uses_step_splits_version() {
        let step = uses_step("actions/setup-node@v4", BTreeMap::new()).unwrap();
        let Step::Action(action) = step else {
            panic!("expected action step");
        };
        assert_eq!(action.action_id(), "actions/setup-node");
        assert_eq!(action.version(), "v4");

        let local = uses_step("./.github/actions/build", BTreeMap::new()).unwrap();
        let Step::Action(action) = local else {
            panic!("expected action step");
        };
        assert_eq!(action.uses(), "./.github/actions/build");
    }

    #[test_log::test]
    fn test_action_step_rejects_empty_id() {
        assert_eq!(
            action_step("", "v1", BTreeMap::new()),
            Err(StepError::EmptyActionId)
        );
    }

    #[test_log::test]
    fn test_text_fields_cover_every_value() {
        let step = run_step("make")
            .unwrap()
            .with_name("Build")
            .with_env("TOKEN", "${{ secrets.TOKEN }}")
            .with_working_directory("packages/core");

        assert_eq!(
            step.text_fields(),
            vec!["Build", "make", "packages/core", "${{ secrets.TOKEN }}"]
        );
    }

    #[test_log::test]
    fn test_working_directory_ignored_for_actions() {
        let step = checkout_step(CheckoutOptions::default()).with_working_directory("x");
        assert_eq!(step, checkout_step(CheckoutOptions::default()));
    }
}
