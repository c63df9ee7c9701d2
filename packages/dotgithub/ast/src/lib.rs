#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! # dotgithub AST
//!
//! Typed building blocks for GitHub Actions workflow definitions.
//!
//! Workflows are assembled from immutable value objects: named path filter sets,
//! event triggers, secret references, steps and jobs. Constructors validate their
//! own invariants and fail fast, so a malformed object never exists in memory.
//! Cross-object rules (name uniqueness, runner labels) are checked by the
//! `dotgithub_validator` crate, and manifests are produced by `dotgithub_renderer`.
//!
//! # Examples
//!
//! ```
//! use dotgithub_ast::{
//!     EventTrigger, Job, PathFilterRegistry, PathScope, Workflow, checkout_step, resolve,
//!     run_step,
//! };
//!
//! let registry = PathFilterRegistry::with_builtins();
//! let only_docs = registry.get("only-docs").unwrap().clone();
//!
//! let job = Job::new(
//!     "Build Docs",
//!     "ubuntu-latest",
//!     vec![
//!         checkout_step(Default::default()),
//!         run_step(format!("echo {}", resolve("NpmToken").unwrap())).unwrap(),
//!     ],
//! )
//! .unwrap();
//!
//! let workflow = Workflow::builder("Build and test documentation")
//!     .trigger(EventTrigger::push_and_pull_request("main", PathScope::Filtered(only_docs)).unwrap())
//!     .job("build", job)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(workflow.jobs().len(), 1);
//! ```

mod paths;
mod secret;
mod step;
mod trigger;
mod workflow;

pub use paths::*;
pub use secret::*;
pub use step::*;
pub use trigger::*;
pub use workflow::*;
