use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use dotgithub_ast::WorkflowSet;
use dotgithub_renderer::{RenderError, manifest_file_name, render, render_all};
use dotgithub_validator::{Diagnostic, ValidatorConfig, has_fatal, validate};
use thiserror::Error;

/// Errors raised while compiling a workflow set.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Validation found at least one fatal diagnostic; every diagnostic is kept
    #[error("Validation failed with {} diagnostic(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Unknown workflow '{0}'")]
    UnknownWorkflow(String),
    #[error("Failed to write manifest: {0}")]
    WriteError(#[from] std::io::Error),
}

/// Rendered manifests plus the warnings that did not block them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    /// Manifest text keyed by workflow id
    pub manifests: BTreeMap<String, String>,
    pub warnings: Vec<Diagnostic>,
}

/// Validate a workflow set and render every workflow.
///
/// Nothing is rendered when any diagnostic is fatal; the error then carries
/// every diagnostic, warnings included.
///
/// # Errors
///
/// * [`CompileError::Diagnostics`] if validation produced a fatal diagnostic
/// * [`CompileError::Render`] if rendering failed
pub fn compile(set: &WorkflowSet, config: &ValidatorConfig) -> Result<Compiled, CompileError> {
    let warnings = check(set, config)?;

    let manifests = render_all(set)?;
    log::info!("compile: rendered {} manifest(s)", manifests.len());

    Ok(Compiled {
        manifests,
        warnings,
    })
}

/// Validate the whole set, then render only `workflow_id`.
///
/// Diagnostics in sibling workflows block emission too, since overlap and
/// uniqueness are properties of the set.
///
/// # Errors
///
/// * [`CompileError::Diagnostics`] if validation produced a fatal diagnostic
/// * [`CompileError::UnknownWorkflow`] if the set has no workflow `workflow_id`
/// * [`CompileError::Render`] if rendering failed
pub fn compile_one(
    set: &WorkflowSet,
    workflow_id: &str,
    config: &ValidatorConfig,
) -> Result<String, CompileError> {
    let workflow = set
        .get(workflow_id)
        .ok_or_else(|| CompileError::UnknownWorkflow(workflow_id.to_string()))?;

    check(set, config)?;

    Ok(render(workflow)?)
}

/// Run the validator, logging every diagnostic. Returns the warnings when
/// nothing is fatal.
fn check(set: &WorkflowSet, config: &ValidatorConfig) -> Result<Vec<Diagnostic>, CompileError> {
    let diagnostics = validate(set, config);

    if has_fatal(&diagnostics) {
        for diagnostic in &diagnostics {
            log::error!("{diagnostic}");
        }
        return Err(CompileError::Diagnostics(diagnostics));
    }

    for warning in &diagnostics {
        log::warn!("{warning}");
    }

    Ok(diagnostics)
}

impl Compiled {
    /// Write every manifest into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// * If the directory cannot be created or a file cannot be written
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, CompileError> {
        fs::create_dir_all(dir)?;

        self.manifests
            .iter()
            .map(|(id, text)| -> Result<PathBuf, CompileError> {
                let path = dir.join(manifest_file_name(id));
                fs::write(&path, text)?;
                log::debug!("write_to: wrote {}", path.display());
                Ok(path)
            })
            .collect()
    }

    /// Manifests in `dir` that are missing or differ from the compiled text.
    ///
    /// # Errors
    ///
    /// * If an existing manifest cannot be read
    pub fn out_of_date(&self, dir: &Path) -> Result<Vec<PathBuf>, CompileError> {
        let mut stale = vec![];

        for (id, text) in &self.manifests {
            let path = dir.join(manifest_file_name(id));
            let current = match fs::read_to_string(&path) {
                Ok(current) => Some(current),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };

            if current.as_deref() != Some(text.as_str()) {
                log::debug!("out_of_date: {} differs", path.display());
                stale.push(path);
            }
        }

        Ok(stale)
    }
}
