//! The `compile`, `validate` and `render` commands, independent of argument parsing.

use std::path::{Path, PathBuf};

use dotgithub_validator::{Diagnostic, has_fatal, validate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CompileError, compile, compile_one,
    config::{Config, ConfigError, load_config, load_config_file},
    definition::{DefinitionError, load_definitions},
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{} manifest(s) are out of date", .0.len())]
    OutOfDate(Vec<PathBuf>),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// How `validate` prints its diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One line per diagnostic
    Raw,
    /// A JSON array of diagnostics
    Json,
}

/// Result of the `validate` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
    /// The diagnostics formatted for printing
    pub output: String,
}

impl ValidationReport {
    #[must_use]
    pub fn failed(&self) -> bool {
        has_fatal(&self.diagnostics)
    }
}

/// Load the config at `config`, or else from the directory holding `definitions`.
///
/// # Errors
///
/// * [`ConfigError`] if the config file cannot be read or parsed
pub fn resolve_config(definitions: &Path, config: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = config {
        return load_config_file(path);
    }

    let dir = definitions
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    load_config(dir)
}

/// Compile `definitions` and write every manifest, or with `check` only
/// compare them against what is on disk.
///
/// Returns the written paths, or nothing when checking.
///
/// # Errors
///
/// * [`CommandError::OutOfDate`] if `check` is set and a manifest is missing or differs
/// * [`CommandError::Compile`] if validation fails or a manifest cannot be written
/// * [`CommandError::Config`] or [`CommandError::Definition`] if an input cannot be loaded
pub fn compile_command(
    definitions: &Path,
    config: Option<&Path>,
    out_dir: Option<&Path>,
    check: bool,
) -> Result<Vec<PathBuf>, CommandError> {
    let config = resolve_config(definitions, config)?;
    let loaded = load_definitions(definitions)?;
    let compiled = compile(&loaded.workflows, &config.validator_config())?;
    let out_dir = out_dir.map_or_else(|| config.output_dir(), Path::to_path_buf);

    if check {
        let stale = compiled.out_of_date(&out_dir)?;
        if !stale.is_empty() {
            return Err(CommandError::OutOfDate(stale));
        }
        log::info!("All manifests in {} are up to date", out_dir.display());
        return Ok(vec![]);
    }

    Ok(compiled.write_to(&out_dir)?)
}

/// Validate `definitions` and format every diagnostic.
///
/// A fatal diagnostic is not an error here; check [`ValidationReport::failed`].
///
/// # Errors
///
/// * [`CommandError::Json`] if JSON output cannot be serialized
/// * [`CommandError::Config`] or [`CommandError::Definition`] if an input cannot be loaded
pub fn validate_command(
    definitions: &Path,
    config: Option<&Path>,
    format: OutputFormat,
) -> Result<ValidationReport, CommandError> {
    let config = resolve_config(definitions, config)?;
    let loaded = load_definitions(definitions)?;
    let diagnostics = validate(&loaded.workflows, &config.validator_config());

    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&diagnostics)?,
        OutputFormat::Raw => diagnostics
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
    };

    Ok(ValidationReport {
        diagnostics,
        output,
    })
}

/// Render the manifest of a single workflow after validating the whole set.
///
/// # Errors
///
/// * [`CommandError::Compile`] if validation fails, the workflow is unknown or rendering fails
/// * [`CommandError::Config`] or [`CommandError::Definition`] if an input cannot be loaded
pub fn render_command(
    definitions: &Path,
    config: Option<&Path>,
    workflow_id: &str,
) -> Result<String, CommandError> {
    let config = resolve_config(definitions, config)?;
    let loaded = load_definitions(definitions)?;

    Ok(compile_one(
        &loaded.workflows,
        workflow_id,
        &config.validator_config(),
    )?)
}
