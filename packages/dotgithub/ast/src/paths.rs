//! Named path filter sets and the registry that owns them.
//!
//! A [`PathFilterSet`] gates a trigger on the files a commit touches. Sets are
//! registered once under an id and never change afterwards. Mutually exclusive
//! pairs, like "only docs" and "without docs", are built with
//! [`PathFilterRegistry::define_complement`] so their disjointness holds by
//! construction instead of by convention.

use std::{collections::BTreeMap, sync::OnceLock};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use thiserror::Error;

/// Id of the builtin filter matching documentation changes.
pub const ONLY_DOCS: &str = "only-docs";

/// Id of the builtin filter matching everything except documentation changes.
pub const WITHOUT_DOCS: &str = "without-docs";

/// Globs that identify documentation files.
pub const DOCS_GLOBS: &[&str] = &["docs/**", "**/*.md"];

/// Leading character GitHub reads as a negated pattern.
pub(crate) const NEGATION: char = '!';

pub(crate) const NEGATED_GLOB_MESSAGE: &str =
    "patterns must not start with '!', use exclude or a complement instead";

static GLOBAL_REGISTRY: OnceLock<PathFilterRegistry> = OnceLock::new();

/// Errors raised while defining or looking up path filters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathFilterError {
    /// An id was registered twice
    #[error("Path filter '{0}' is already registered")]
    DuplicateFilterId(String),
    /// A lookup or complement named an id that was never registered
    #[error("Path filter '{0}' is not registered")]
    UnknownFilterId(String),
    /// Both glob lists were empty
    #[error("Path filter '{0}' has no include or exclude globs")]
    EmptyFilterSet(String),
    /// A pattern does not compile or starts with `!`
    #[error("Invalid glob '{glob}' in path filter '{id}': {message}")]
    InvalidGlob {
        id: String,
        glob: String,
        message: String,
    },
    /// [`PathFilterRegistry::install_global`] ran after a global registry existed
    #[error("The global path filter registry is already installed")]
    AlreadyInstalled,
}

/// Include/exclude glob rules restricting a trigger to commits touching matching files.
///
/// An empty include list means "every file"; exclusions are applied on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathFilterSet {
    id: String,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl PathFilterSet {
    fn new(
        id: impl Into<String>,
        include: Vec<String>,
        exclude: Vec<String>,
    ) -> Result<Self, PathFilterError> {
        let id = id.into();

        if include.is_empty() && exclude.is_empty() {
            return Err(PathFilterError::EmptyFilterSet(id));
        }

        for glob in include.iter().chain(&exclude) {
            compile_glob(&id, glob)?;
        }

        Ok(Self {
            id,
            include,
            exclude,
        })
    }

    /// Rebuild a filter set from globs read back out of a rendered manifest.
    ///
    /// # Errors
    ///
    /// * [`PathFilterError::EmptyFilterSet`] if both lists are empty
    /// * [`PathFilterError::InvalidGlob`] if a pattern does not compile
    pub fn anonymous(include: Vec<String>, exclude: Vec<String>) -> Result<Self, PathFilterError> {
        Self::new(String::new(), include, exclude)
    }

    /// Registered id, empty for anonymous sets.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Globs a changed file must match, in registration order.
    #[must_use]
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Globs that reject a changed file even when it is included.
    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// The same rules with include and exclude swapped.
    #[must_use]
    pub fn complement(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            include: self.exclude.clone(),
            exclude: self.include.clone(),
        }
    }

    /// Whether `other` is this set with include and exclude swapped.
    #[must_use]
    pub fn is_complement_of(&self, other: &Self) -> bool {
        self.include == other.exclude && self.exclude == other.include
    }

    /// Whether both sets carry the same globs, regardless of their ids.
    #[must_use]
    pub fn same_globs(&self, other: &Self) -> bool {
        self.include == other.include && self.exclude == other.exclude
    }

    /// Whether a single changed file passes the filter.
    #[must_use]
    pub fn matches_file(&self, path: &str) -> bool {
        let included = self.include.is_empty() || glob_set(&self.include).is_match(path);
        included && !glob_set(&self.exclude).is_match(path)
    }

    /// Whether any file in a change set passes the filter.
    #[must_use]
    pub fn matches_any<S: AsRef<str>>(&self, paths: &[S]) -> bool {
        let include = glob_set(&self.include);
        let exclude = glob_set(&self.exclude);

        paths.iter().map(AsRef::as_ref).any(|path| {
            (self.include.is_empty() || include.is_match(path)) && !exclude.is_match(path)
        })
    }
}

/// GitHub's dialect: `*` stops at `/`, `**` crosses directories.
pub(crate) fn build_glob(glob: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(glob).literal_separator(true).build()
}

fn compile_glob(id: &str, glob: &str) -> Result<Glob, PathFilterError> {
    if glob.starts_with(NEGATION) {
        return Err(PathFilterError::InvalidGlob {
            id: id.to_string(),
            glob: glob.to_string(),
            message: NEGATED_GLOB_MESSAGE.to_string(),
        });
    }

    build_glob(glob).map_err(|e| PathFilterError::InvalidGlob {
        id: id.to_string(),
        glob: glob.to_string(),
        message: e.kind().to_string(),
    })
}

/// Globs are checked when a set is built, so compilation cannot fail here.
pub(crate) fn glob_set(globs: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        if let Ok(glob) = build_glob(glob) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Named, write-once storage for [`PathFilterSet`]s.
#[derive(Debug, Clone, Default)]
pub struct PathFilterRegistry {
    sets: BTreeMap<String, PathFilterSet>,
}

impl PathFilterRegistry {
    /// An empty registry, without the builtins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with [`ONLY_DOCS`] and its complement [`WITHOUT_DOCS`].
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let docs = DOCS_GLOBS.iter().map(ToString::to_string).collect();

        registry
            .define(ONLY_DOCS, docs, vec![])
            .and_then(|_| registry.define_complement(WITHOUT_DOCS, ONLY_DOCS))
            .expect("builtin path filters are valid");

        registry
    }

    /// Register a new filter set.
    ///
    /// # Errors
    ///
    /// * [`PathFilterError::DuplicateFilterId`] if `id` is already registered
    /// * [`PathFilterError::EmptyFilterSet`] if both glob lists are empty
    /// * [`PathFilterError::InvalidGlob`] if a pattern does not compile
    pub fn define(
        &mut self,
        id: &str,
        include: Vec<String>,
        exclude: Vec<String>,
    ) -> Result<PathFilterSet, PathFilterError> {
        if self.sets.contains_key(id) {
            return Err(PathFilterError::DuplicateFilterId(id.to_string()));
        }

        let set = PathFilterSet::new(id, include, exclude)?;
        log::debug!(
            "define: registered path filter '{id}' include={:?} exclude={:?}",
            set.include,
            set.exclude
        );
        self.sets.insert(id.to_string(), set.clone());

        Ok(set)
    }

    /// The complement of a registered set, without registering it.
    ///
    /// The returned set is named `!<id>`.
    ///
    /// # Errors
    ///
    /// * [`PathFilterError::UnknownFilterId`] if `id` is not registered
    pub fn complement_of(&self, id: &str) -> Result<PathFilterSet, PathFilterError> {
        self.get(id)
            .map(|set| set.complement(format!("!{id}")))
            .ok_or_else(|| PathFilterError::UnknownFilterId(id.to_string()))
    }

    /// Register the complement of `of` under a new id.
    ///
    /// # Errors
    ///
    /// * [`PathFilterError::UnknownFilterId`] if `of` is not registered
    /// * [`PathFilterError::DuplicateFilterId`] if `id` is already registered
    pub fn define_complement(&mut self, id: &str, of: &str) -> Result<PathFilterSet, PathFilterError> {
        let base = self.complement_of(of)?;
        self.define(id, base.include, base.exclude)
    }

    /// Look up a registered set.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PathFilterSet> {
        self.sets.get(id)
    }

    /// Look up a set, failing with [`PathFilterError::UnknownFilterId`].
    ///
    /// # Errors
    ///
    /// * [`PathFilterError::UnknownFilterId`] if `id` is not registered
    pub fn require(&self, id: &str) -> Result<&PathFilterSet, PathFilterError> {
        self.get(id)
            .ok_or_else(|| PathFilterError::UnknownFilterId(id.to_string()))
    }

    /// Every registered set, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &PathFilterSet> {
        self.sets.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Freeze this registry as the process-wide instance.
    ///
    /// Must happen once at startup, before anything calls [`global`]. The
    /// first [`global`] call (made by `dotgithub_renderer::parse`, for one)
    /// installs the builtins when nothing was installed yet, and every later
    /// `install_global` then fails.
    ///
    /// # Errors
    ///
    /// * [`PathFilterError::AlreadyInstalled`] if a global registry already exists
    pub fn install_global(self) -> Result<&'static Self, PathFilterError> {
        GLOBAL_REGISTRY
            .set(self)
            .map_err(|_| PathFilterError::AlreadyInstalled)?;
        Ok(global())
    }
}

/// The process-wide registry.
///
/// If none was installed yet, the builtins are installed permanently, so a
/// later [`PathFilterRegistry::install_global`] returns
/// [`PathFilterError::AlreadyInstalled`].
pub fn global() -> &'static PathFilterRegistry {
    GLOBAL_REGISTRY.get_or_init(|| {
        log::warn!("global: no path filter registry installed, using the builtins");
        PathFilterRegistry::with_builtins()
    })
}
