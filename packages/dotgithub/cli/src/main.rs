#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dotgithub::command::{
    CommandError, OutputFormat, compile_command, render_command, validate_command,
};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "DOTGITHUB_LOG";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "kebab_case")]
pub enum OutputType {
    Json,
    Raw,
}

impl From<OutputType> for OutputFormat {
    fn from(value: OutputType) -> Self {
        match value {
            OutputType::Json => Self::Json,
            OutputType::Raw => Self::Raw,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Validate definitions and write one manifest per workflow
    Compile {
        #[arg(index = 1)]
        definitions: PathBuf,

        /// Config file, defaults to dotgithub.json5 next to the definitions
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides the configured output directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Fail if the manifests on disk are missing or out of date instead of writing them
        #[arg(long)]
        check: bool,
    },
    /// Report every diagnostic without writing anything
    Validate {
        #[arg(index = 1)]
        definitions: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t=OutputType::Raw)]
        output: OutputType,
    },
    /// Print the manifest of a single workflow
    Render {
        #[arg(index = 1)]
        definitions: PathBuf,

        #[arg(index = 2)]
        workflow_id: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or(LOG_ENV, "info")).init();

    let args = Args::parse();

    log::debug!("main: {:?}", args.cmd);

    match args.cmd {
        Commands::Compile {
            definitions,
            config,
            out_dir,
            check,
        } => match compile_command(&definitions, config.as_deref(), out_dir.as_deref(), check) {
            Ok(written) => {
                for path in written {
                    println!("{}", path.display());
                }
            }
            Err(CommandError::OutOfDate(stale)) => {
                for path in &stale {
                    println!("{}", path.display());
                }
                return Err(CommandError::OutOfDate(stale).into());
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Validate {
            definitions,
            config,
            output,
        } => {
            let report = validate_command(&definitions, config.as_deref(), output.into())?;

            if !report.output.is_empty() {
                println!("{}", report.output);
            }

            if report.failed() {
                return Err("validation failed".into());
            }
        }
        Commands::Render {
            definitions,
            workflow_id,
            config,
        } => {
            print!(
                "{}",
                render_command(&definitions, config.as_deref(), &workflow_id)?
            );
        }
    }

    Ok(())
}
