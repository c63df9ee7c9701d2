//! JSON5 workflow definition files.
//!
//! A definition file declares custom path filters and the workflows to emit:
//!
//! ```json5
//! {
//!   filters: { "api-only": { include: ["api/**"] } },
//!   workflows: {
//!     docs: {
//!       name: "Build and test documentation",
//!       on: { pushAndPullRequest: "main", paths: "only-docs" },
//!       jobs: {
//!         build: {
//!           name: "Build Docs",
//!           runsOn: "ubuntu-latest",
//!           steps: [{ checkout: {} }, { run: "echo ${secret:NpmToken}" }],
//!         },
//!       },
//!     },
//!   },
//! }
//! ```
//!
//! `${secret:NAME}` placeholders in step text are resolved to secret
//! expressions while loading. Duplicate keys inside a JSON5 object collapse
//! during parsing, the last one wins.

use std::{collections::BTreeMap, fs, path::Path};

use dotgithub_ast::{
    CheckoutOptions, EventKind, EventTrigger, Job, PathFilterError, PathFilterRegistry, PathScope,
    SecretError, SecretRef, Step, StepError, TriggerError, Workflow, WorkflowError, WorkflowSet,
    checkout_step, resolve, run_step, uses_step,
};
use serde::Deserialize;
use thiserror::Error;

const PLACEHOLDER_OPEN: &str = "${secret:";
const PLACEHOLDER_CLOSE: char = '}';

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read definition file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse definition file: {0}")]
    ParseError(#[from] json5::Error),
    #[error("Path filter '{0}' must set either globs or 'complementOf', not both")]
    ConflictingFilter(String),
    #[error("Step {index} of job '{job}' must set exactly one of 'checkout', 'uses' or 'run'")]
    AmbiguousStep { job: String, index: usize },
    #[error("Unterminated secret placeholder at byte {0}")]
    UnterminatedPlaceholder(usize),
    #[error("Workflow '{workflow}': {source}")]
    InWorkflow {
        workflow: String,
        #[source]
        source: Box<Self>,
    },
    #[error(transparent)]
    PathFilter(#[from] PathFilterError),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DefinitionFile {
    #[serde(default)]
    pub filters: BTreeMap<String, FilterDefinition>,
    pub workflows: BTreeMap<String, WorkflowDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilterDefinition {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Define this filter as the complement of another one
    pub complement_of: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkflowDefinition {
    pub name: String,
    pub on: TriggerDefinition,
    pub jobs: BTreeMap<String, JobDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TriggerDefinition {
    /// Shorthand for `push` and `pull_request` on one base branch
    pub push_and_pull_request: Option<String>,
    #[serde(default)]
    pub events: Vec<EventKind>,
    #[serde(default)]
    pub branches: Vec<String>,
    pub paths: Option<PathsDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PathsDefinition {
    /// Id of a registered filter
    Filter(String),
    /// Complement of a registered filter
    Complement {
        #[serde(rename = "complementOf")]
        complement_of: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobDefinition {
    /// Display name, defaults to the job id
    pub name: Option<String>,
    pub runs_on: String,
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StepDefinition {
    pub name: Option<String>,
    pub checkout: Option<CheckoutDefinition>,
    pub uses: Option<String>,
    #[serde(default)]
    pub with: BTreeMap<String, String>,
    pub run: Option<String>,
    pub working_directory: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckoutDefinition {
    pub version: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub fetch_depth: Option<u32>,
    /// Secret name, not a value
    pub token: Option<String>,
}

/// Everything a definition file produces.
#[derive(Debug, Clone)]
pub struct Definitions {
    /// Builtin filters plus every filter the file declares
    pub registry: PathFilterRegistry,
    pub workflows: WorkflowSet,
}

/// Replace every `${secret:NAME}` placeholder with its secret expression.
///
/// # Errors
///
/// * [`DefinitionError::Secret`] if a placeholder names an invalid secret
/// * [`DefinitionError::UnterminatedPlaceholder`] if a placeholder is never closed
pub fn expand_secrets(text: &str) -> Result<String, DefinitionError> {
    let mut expanded = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(PLACEHOLDER_OPEN) {
        let start = cursor + found;
        let name_start = start + PLACEHOLDER_OPEN.len();
        let Some(close) = text[name_start..].find(PLACEHOLDER_CLOSE) else {
            return Err(DefinitionError::UnterminatedPlaceholder(start));
        };
        let name = &text[name_start..name_start + close];

        expanded.push_str(&text[cursor..start]);
        expanded.push_str(&resolve(name.trim())?);
        cursor = name_start + close + 1;
    }

    expanded.push_str(&text[cursor..]);
    Ok(expanded)
}

fn expand_map(values: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, DefinitionError> {
    values
        .iter()
        .map(|(k, v)| expand_secrets(v).map(|v| (k.clone(), v)))
        .collect()
}

impl DefinitionFile {
    /// Build the filter registry and the workflow set.
    ///
    /// # Errors
    ///
    /// * [`DefinitionError`] if any filter, trigger, step, job or workflow is invalid
    pub fn build(&self) -> Result<Definitions, DefinitionError> {
        let registry = self.build_registry()?;
        let mut workflows = WorkflowSet::new();

        for (id, definition) in &self.workflows {
            let workflow =
                definition
                    .build(&registry)
                    .map_err(|e| DefinitionError::InWorkflow {
                        workflow: id.clone(),
                        source: Box::new(e),
                    })?;
            workflows.insert(id.clone(), workflow);
        }

        log::debug!(
            "build: {} filter(s), {} workflow(s)",
            registry.len(),
            workflows.len()
        );

        Ok(Definitions {
            registry,
            workflows,
        })
    }

    fn build_registry(&self) -> Result<PathFilterRegistry, DefinitionError> {
        let mut registry = PathFilterRegistry::with_builtins();
        let mut complements = vec![];

        for (id, filter) in &self.filters {
            match &filter.complement_of {
                Some(_) if !filter.include.is_empty() || !filter.exclude.is_empty() => {
                    return Err(DefinitionError::ConflictingFilter(id.clone()));
                }
                Some(of) => complements.push((id, of)),
                None => {
                    registry.define(id, filter.include.clone(), filter.exclude.clone())?;
                }
            }
        }

        // complements may build on each other, so keep going while progress is made
        while !complements.is_empty() {
            let before = complements.len();
            complements.retain(|(id, of)| {
                registry.get(of).is_none() || registry.define_complement(id, of).is_err()
            });

            if complements.len() == before {
                let (id, of) = complements[0];
                registry.define_complement(id, of)?;
            }
        }

        Ok(registry)
    }
}

impl WorkflowDefinition {
    fn build(&self, registry: &PathFilterRegistry) -> Result<Workflow, DefinitionError> {
        let mut builder = Workflow::builder(&self.name).trigger(self.on.build(registry)?);

        for (id, job) in &self.jobs {
            builder = builder.job(id, job.build(id)?);
        }

        Ok(builder.build()?)
    }
}

impl TriggerDefinition {
    fn build(&self, registry: &PathFilterRegistry) -> Result<EventTrigger, DefinitionError> {
        let mut builder = EventTrigger::builder();

        if let Some(base) = &self.push_and_pull_request {
            builder = builder
                .event(EventKind::Push)
                .event(EventKind::PullRequest)
                .branch(base);
        }

        let paths = match &self.paths {
            None => PathScope::Any,
            Some(PathsDefinition::Filter(id)) => PathScope::Filtered(registry.require(id)?.clone()),
            Some(PathsDefinition::Complement { complement_of }) => {
                PathScope::Filtered(registry.complement_of(complement_of)?)
            }
        };

        Ok(builder
            .events(self.events.iter().copied())
            .branches(self.branches.iter().cloned())
            .paths(paths)
            .build()?)
    }
}

impl JobDefinition {
    fn build(&self, id: &str) -> Result<Job, DefinitionError> {
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.build(id, index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Job::new(
            self.name.as_deref().unwrap_or(id),
            &self.runs_on,
            steps,
        )?)
    }
}

impl StepDefinition {
    fn build(&self, job: &str, index: usize) -> Result<Step, DefinitionError> {
        let mut step = match (&self.checkout, &self.uses, &self.run) {
            (Some(checkout), None, None) => checkout_step(CheckoutOptions {
                version: checkout.version.clone(),
                reference: checkout.reference.clone(),
                fetch_depth: checkout.fetch_depth,
                token: checkout.token.clone().map(SecretRef::new).transpose()?,
            }),
            (None, Some(uses), None) => uses_step(uses, expand_map(&self.with)?)?,
            (None, None, Some(run)) => {
                let step = run_step(expand_secrets(run)?)?;
                match &self.working_directory {
                    Some(dir) => step.with_working_directory(dir),
                    None => step,
                }
            }
            _ => {
                return Err(DefinitionError::AmbiguousStep {
                    job: job.to_string(),
                    index,
                });
            }
        };

        if let Some(name) = &self.name {
            step = step.with_name(name);
        }
        for (key, value) in expand_map(&self.env)? {
            step = step.with_env(key, value);
        }

        Ok(step)
    }
}

/// Parse and build a definition document.
///
/// # Errors
///
/// * [`DefinitionError::ParseError`] if the text is not a valid definition document
/// * [`DefinitionError`] if any definition inside it is invalid
pub fn parse_definitions(text: &str) -> Result<Definitions, DefinitionError> {
    let file: DefinitionFile = json5::from_str(text)?;
    file.build()
}

/// Load and build a definition file from disk.
///
/// # Errors
///
/// * [`DefinitionError::ReadError`] if the file cannot be read
/// * [`DefinitionError`] if the file is malformed or any definition is invalid
pub fn load_definitions(path: &Path) -> Result<Definitions, DefinitionError> {
    let content = fs::read_to_string(path)?;
    log::debug!("load_definitions: loading {}", path.display());
    parse_definitions(&content)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use dotgithub_ast::{ONLY_DOCS, WITHOUT_DOCS};

    use super::*;

    const DOCS_AND_CI: &str = r#"{
        workflows: {
            docs: {
                name: "Build and test documentation",
                on: { pushAndPullRequest: "main", paths: "only-docs" },
                jobs: {
                    build: {
                        name: "Build Docs",
                        runsOn: "ubuntu-latest",
                        steps: [{ checkout: {} }, { run: "echo ${secret:NpmToken}" }],
                    },
                },
            },
            ci: {
                name: "Build and test",
                on: { pushAndPullRequest: "main", paths: "without-docs" },
                jobs: {
                    build: {
                        name: "Build Code",
                        runsOn: "ubuntu-latest",
                        steps: [{ checkout: {} }, { run: "echo ${secret:NpmToken}" }],
                    },
                },
            },
        },
    }"#;

    #[test_log::test]
    fn test_expand_secrets() {
        assert_eq!(
            expand_secrets("echo ${secret:NpmToken} ${secret: DEPLOY }").unwrap(),
            "echo ${{ secrets.NpmToken }} ${{ secrets.DEPLOY }}"
        );
        assert_eq!(expand_secrets("no secrets").unwrap(), "no secrets");
        assert!(matches!(
            expand_secrets("echo ${secret:bad-name}"),
            Err(DefinitionError::Secret(SecretError::InvalidSecretName { .. }))
        ));
        assert!(matches!(
            expand_secrets("echo ${secret:NpmToken"),
            Err(DefinitionError::UnterminatedPlaceholder(5))
        ));
    }

    #[test_log::test]
    fn test_docs_and_ci_definitions() {
        let definitions = parse_definitions(DOCS_AND_CI).unwrap();
        let workflows = &definitions.workflows;

        assert_eq!(workflows.len(), 2);

        let docs = workflows.get("docs").unwrap();
        assert_eq!(docs.name(), "Build and test documentation");
        assert_eq!(docs.trigger().paths().filter().unwrap().id(), ONLY_DOCS);

        let ci = workflows.get("ci").unwrap();
        assert_eq!(ci.trigger().paths().filter().unwrap().id(), WITHOUT_DOCS);

        let Step::Run(run) = &ci.job("build").unwrap().steps()[1] else {
            panic!("expected run step");
        };
        assert_eq!(run.command(), "echo ${{ secrets.NpmToken }}");
    }

    #[test_log::test]
    fn test_custom_filters_and_complements() {
        let definitions = parse_definitions(
            r#"{
                filters: {
                    "not-api": { complementOf: "api" },
                    api: { include: ["api/**"] },
                },
                workflows: {
                    api: {
                        name: "API",
                        on: { events: ["push", "workflow_dispatch"], branches: ["main"], paths: "api" },
                        jobs: { test: { runsOn: "ubuntu-latest", steps: [{ run: "make test" }] } },
                    },
                    rest: {
                        name: "Rest",
                        on: { pushAndPullRequest: "main", paths: { complementOf: "api" } },
                        jobs: { test: { runsOn: "ubuntu-latest", steps: [{ run: "make" }] } },
                    },
                },
            }"#,
        )
        .unwrap();

        let not_api = definitions.registry.get("not-api").unwrap();
        assert_eq!(not_api.exclude(), &["api/**".to_string()]);

        let api = definitions.workflows.get("api").unwrap();
        assert_eq!(
            api.trigger().events().iter().copied().collect::<Vec<_>>(),
            vec![EventKind::Push, EventKind::WorkflowDispatch]
        );
        assert_eq!(api.job("test").unwrap().name(), "test");

        let rest = definitions.workflows.get("rest").unwrap();
        assert!(
            rest.trigger()
                .paths()
                .filter()
                .unwrap()
                .is_complement_of(definitions.registry.get("api").unwrap())
        );
    }

    #[test_log::test]
    fn test_steps_with_inputs_and_env() {
        let definitions = parse_definitions(
            r#"{
                workflows: {
                    release: {
                        name: "Release",
                        on: { events: ["workflow_dispatch"] },
                        jobs: {
                            publish: {
                                runsOn: "ubuntu-latest",
                                steps: [
                                    { checkout: { "ref": "main", fetchDepth: 0, token: "BOT_TOKEN" } },
                                    { uses: "actions/setup-node@v4", with: { "node-version": "22" } },
                                    {
                                        name: "Publish",
                                        run: "npm publish",
                                        workingDirectory: "web",
                                        env: { NODE_AUTH_TOKEN: "${secret:NpmToken}" },
                                    },
                                ],
                            },
                        },
                    },
                },
            }"#,
        )
        .unwrap();

        let steps = definitions
            .workflows
            .get("release")
            .unwrap()
            .job("publish")
            .unwrap()
            .steps()
            .to_vec();

        let Step::Action(checkout) = &steps[0] else {
            panic!("expected checkout");
        };
        assert_eq!(
            checkout.inputs().get("token").unwrap(),
            "${{ secrets.BOT_TOKEN }}"
        );
        assert_eq!(checkout.inputs().get("fetch-depth").unwrap(), "0");

        let Step::Action(setup) = &steps[1] else {
            panic!("expected action");
        };
        assert_eq!(setup.uses(), "actions/setup-node@v4");

        assert_eq!(steps[2].name(), Some("Publish"));
        assert_eq!(
            steps[2].env().get("NODE_AUTH_TOKEN").unwrap(),
            "${{ secrets.NpmToken }}"
        );
    }

    #[test_log::test]
    fn test_ambiguous_step_is_rejected() {
        let err = parse_definitions(
            r#"{
                workflows: {
                    ci: {
                        name: "CI",
                        on: { pushAndPullRequest: "main" },
                        jobs: { build: { runsOn: "ubuntu-latest", steps: [{ uses: "a/b@v1", run: "make" }] } },
                    },
                },
            }"#,
        )
        .unwrap_err();

        let DefinitionError::InWorkflow { workflow, source } = err else {
            panic!("expected workflow context");
        };
        assert_eq!(workflow, "ci");
        assert!(matches!(
            *source,
            DefinitionError::AmbiguousStep { index: 1, .. }
        ));
    }

    #[test_log::test]
    fn test_unknown_filter_is_rejected() {
        let err = parse_definitions(
            r#"{
                workflows: {
                    ci: {
                        name: "CI",
                        on: { pushAndPullRequest: "main", paths: "missing" },
                        jobs: { build: { runsOn: "ubuntu-latest", steps: [{ run: "make" }] } },
                    },
                },
            }"#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DefinitionError::InWorkflow { ref source, .. }
                if matches!(**source, DefinitionError::PathFilter(PathFilterError::UnknownFilterId(_)))
        ));
    }

    #[test_log::test]
    fn test_complement_of_unknown_filter_is_rejected() {
        let err = parse_definitions(
            r#"{
                filters: { orphan: { complementOf: "nowhere" } },
                workflows: {},
            }"#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DefinitionError::PathFilter(PathFilterError::UnknownFilterId(ref id)) if id == "nowhere"
        ));
    }
}
