#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! # dotgithub
//!
//! Typed GitHub Actions workflow compiler. Workflows are built from checked
//! pieces (path filters, triggers, secret references and steps), validated as a
//! whole and rendered to deterministic YAML manifests.
//!
//! ## Features
//!
//! * Named path filters with complements that are disjoint by construction
//! * Secret references that only ever carry names, never values
//! * Cross-workflow validation that reports every problem in one pass
//! * JSON5 definition files and project configuration

pub mod command;
pub mod config;
pub mod definition;

mod compile;

pub use compile::*;

/// Workflow model types and builders.
pub use dotgithub_ast as ast;

/// YAML manifest rendering and parsing.
pub use dotgithub_renderer as renderer;

/// Pre-render validation.
pub use dotgithub_validator as validator;
