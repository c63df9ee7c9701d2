//! Secret references and their GitHub Actions expression syntax.
//!
//! A secret is only ever referenced by name. [`resolve`] turns a name into the
//! `${{ secrets.NAME }}` placeholder that the CI runtime substitutes at execution
//! time; the value itself never passes through this crate.

use std::{fmt, ops::Range, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix GitHub reserves for its own secrets and variables.
const RESERVED_PREFIX: &str = "GITHUB_";

/// The one reserved name that workflows may reference.
const AUTOMATIC_TOKEN: &str = "GITHUB_TOKEN";

const EXPRESSION_OPEN: &str = "${{";
const EXPRESSION_CLOSE: &str = "}}";
const SECRETS_CONTEXT: &str = "secrets.";

static SECRET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid secret name regex"));

/// Errors produced while naming or scanning secret references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    /// The name violates the provider's secret naming grammar.
    #[error("Invalid secret name '{name}': {reason}")]
    InvalidSecretName {
        /// The rejected name
        name: String,
        /// Which rule was violated
        reason: &'static str,
    },
    /// A `${{ secrets.` expression was never closed.
    #[error("Unterminated secret expression starting at byte {offset}")]
    UnterminatedExpression {
        /// Byte offset of the opening `${{`
        offset: usize,
    },
}

/// A symbolic reference to a repository or organization secret.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretRef {
    name: String,
}

impl SecretRef {
    /// Create a reference after checking the name against the naming grammar.
    ///
    /// # Errors
    ///
    /// * [`SecretError::InvalidSecretName`] if the name is empty, starts with a digit,
    ///   contains anything other than ASCII letters, digits and underscores, or uses
    ///   the reserved `GITHUB_` prefix
    pub fn new(name: impl Into<String>) -> Result<Self, SecretError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The interpolation expression the CI runtime replaces with the secret value.
    #[must_use]
    pub fn expression(&self) -> String {
        format!("{EXPRESSION_OPEN} {SECRETS_CONTEXT}{} {EXPRESSION_CLOSE}", self.name)
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

impl TryFrom<String> for SecretRef {
    type Error = SecretError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SecretRef> for String {
    fn from(value: SecretRef) -> Self {
        value.name
    }
}

fn validate_name(name: &str) -> Result<(), SecretError> {
    let invalid = |reason| {
        Err(SecretError::InvalidSecretName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return invalid("name starts with a digit");
    }
    if !SECRET_NAME.is_match(name) {
        return invalid("only ASCII letters, digits and underscores are allowed");
    }
    if name.to_ascii_uppercase().starts_with(RESERVED_PREFIX)
        && !name.eq_ignore_ascii_case(AUTOMATIC_TOKEN)
    {
        return invalid("the GITHUB_ prefix is reserved");
    }

    Ok(())
}

/// Resolve a secret name into its `${{ secrets.NAME }}` expression.
///
/// Referentially transparent: the same name always yields the same string.
///
/// # Errors
///
/// * [`SecretError::InvalidSecretName`] if the name violates the naming grammar
pub fn resolve(name: &str) -> Result<String, SecretError> {
    SecretRef::new(name).map(|secret| secret.expression())
}

/// A `${{ secrets.* }}` expression found inside step text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMention {
    /// Name as written, which may not satisfy the naming grammar
    pub name: String,
    /// Byte range of the whole expression within the scanned text
    pub span: Range<usize>,
    /// Whether the closing `}}` was found
    pub terminated: bool,
}

impl SecretMention {
    /// Check that the mention refers to a well-formed secret.
    ///
    /// # Errors
    ///
    /// * [`SecretError::UnterminatedExpression`] if the expression was never closed
    /// * [`SecretError::InvalidSecretName`] if the name violates the naming grammar
    pub fn secret_ref(&self) -> Result<SecretRef, SecretError> {
        if !self.terminated {
            return Err(SecretError::UnterminatedExpression {
                offset: self.span.start,
            });
        }
        SecretRef::new(self.name.clone())
    }
}

/// Find every expression in `text` that reads from the `secrets` context.
///
/// Expressions referencing other contexts (`github.sha`, `matrix.os`, ...) are
/// skipped. An opening `${{` without a matching `}}` is reported as an
/// unterminated mention when it targets `secrets`.
#[must_use]
pub fn find_secret_refs(text: &str) -> Vec<SecretMention> {
    let mut mentions = vec![];
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(EXPRESSION_OPEN) {
        let start = cursor + found;
        let body_start = start + EXPRESSION_OPEN.len();

        let (body, end, terminated) = text[body_start..].find(EXPRESSION_CLOSE).map_or_else(
            || (&text[body_start..], text.len(), false),
            |close| {
                let end = body_start + close + EXPRESSION_CLOSE.len();
                (&text[body_start..body_start + close], end, true)
            },
        );

        if let Some(name) = body.trim().strip_prefix(SECRETS_CONTEXT) {
            log::trace!("find_secret_refs: found secret mention '{name}' at {start}");
            mentions.push(SecretMention {
                name: name.trim().to_string(),
                span: start..end,
                terminated,
            });
        }

        cursor = end;
    }

    mentions
}
