#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic usage example for the `dotgithub_ast` crate.
//!
//! Builds a documentation workflow and a code workflow from the builtin
//! complementary path filters, renders both and shows which one a change to a
//! given file would start.

use dotgithub_ast::{
    CheckoutOptions, EventKind, EventTrigger, Job, ONLY_DOCS, PathFilterRegistry, WITHOUT_DOCS,
    Workflow, WorkflowSet, checkout_step, resolve, run_step,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== dotgithub_ast Basic Usage Example ===\n");

    let registry = PathFilterRegistry::with_builtins();
    let set = build_workflows(&registry)?;

    for (id, workflow) in set.workflows() {
        println!("--- {} ---", dotgithub_renderer::manifest_path(id));
        println!("{}", dotgithub_renderer::render(workflow)?);
    }

    println!("--- Which workflow runs? ---");
    for file in ["docs/guide.md", "README.md", "src/lib.rs", "Cargo.toml"] {
        let running = set
            .workflows()
            .iter()
            .filter(|(_, w)| w.trigger().fires_for(EventKind::Push, "main", &[file]))
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>();
        println!("  {file:<16} -> {}", running.join(", "));
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}

fn build_job(name: &str) -> Result<Job, Box<dyn std::error::Error>> {
    Ok(Job::new(
        name,
        "ubuntu-latest",
        vec![
            checkout_step(CheckoutOptions::default()),
            run_step(format!("echo {}", resolve("NpmToken")?))?,
        ],
    )?)
}

fn build_workflows(registry: &PathFilterRegistry) -> Result<WorkflowSet, Box<dyn std::error::Error>> {
    let docs = Workflow::builder("Build and test documentation")
        .trigger(EventTrigger::push_and_pull_request(
            "main",
            registry.require(ONLY_DOCS)?.clone(),
        )?)
        .job("build", build_job("Build Docs")?)
        .build()?;

    let ci = Workflow::builder("Build and test")
        .trigger(EventTrigger::push_and_pull_request(
            "main",
            registry.require(WITHOUT_DOCS)?.clone(),
        )?)
        .job("build", build_job("Build Code")?)
        .build()?;

    Ok(WorkflowSet::new()
        .with_workflow("docs", docs)
        .with_workflow("ci", ci))
}
