//! Buildscript CLI - Command-line interface for build script files
//!
//! Provides subcommands for formatting scripts, converting between the text
//! form and build expressions, listing requirements, and merging.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use buildscript::buildscript::merge::is_auto_merge_possible;
use buildscript::buildscript::project::Project;
use buildscript::{BuildScript, MergeStrategy, RequirementKind, ScriptConfig};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "buildscript")]
#[command(about = "Format, convert and merge build scripts", long_about = None)]
struct Cli {
    /// Emitter configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reformat a build script
    Fmt {
        /// Build script file
        file: PathBuf,

        /// Rewrite the file instead of printing
        #[arg(short, long)]
        write: bool,
    },

    /// Print the build expression of a build script
    ToExpression {
        /// Build script file
        file: PathBuf,
    },

    /// Print the build script of a build expression
    FromExpression {
        /// Build expression file (JSON)
        file: PathBuf,

        /// Override the solve timestamp (RFC3339)
        #[arg(long)]
        at_time: Option<String>,
    },

    /// List the requirements of a build script
    Requirements {
        /// Build script file
        file: PathBuf,
    },

    /// Merge a remote build script into a project's local one
    Merge {
        /// Project directory holding the local build script
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Remote build script file
        remote: PathBuf,

        /// Merge strategy (JSON)
        #[arg(long)]
        strategy: Option<PathBuf>,
    },
}

fn read_script(path: &Path) -> Result<BuildScript> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    BuildScript::from_text(&text).with_context(|| format!("parsing {:?}", path))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            ScriptConfig::load(path).with_context(|| format!("loading config {:?}", path))?
        }
        None => ScriptConfig::default(),
    };

    match cli.command {
        Commands::Fmt { file, write } => {
            let script = read_script(&file)?;
            let text = script.to_text_with(&config);
            if write {
                fs::write(&file, text).with_context(|| format!("writing {:?}", file))?;
                println!("Formatted {:?}", file);
            } else {
                println!("{}", text);
            }
        }

        Commands::ToExpression { file } => {
            let script = read_script(&file)?;
            println!("{}", script.to_build_expression()?);
        }

        Commands::FromExpression { file, at_time } => {
            let data = fs::read(&file).with_context(|| format!("reading {:?}", file))?;
            let at_time = at_time
                .map(|ts| buildscript::buildscript::parse_timestamp(&ts))
                .transpose()?;
            let script = BuildScript::from_build_expression(&data, at_time)
                .with_context(|| format!("decoding {:?}", file))?;
            println!("{}", script.to_text_with(&config));
        }

        Commands::Requirements { file } => {
            let script = read_script(&file)?;
            for requirement in script.all_requirements()? {
                match requirement {
                    RequirementKind::Dependency(req) => {
                        let version = req
                            .version_requirement
                            .map(|constraints| {
                                constraints
                                    .iter()
                                    .map(ToString::to_string)
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            })
                            .unwrap_or_else(|| "any".to_string());
                        println!("{}/{} {}", req.namespace, req.name, version);
                    }
                    RequirementKind::Revision { name, revision_id } => {
                        println!("{} @ {}", name, revision_id);
                    }
                    RequirementKind::Unknown { name, value } => {
                        println!("{}({})", name, value);
                    }
                }
            }
        }

        Commands::Merge {
            project,
            remote,
            strategy,
        } => {
            let project = Project::new(project, config);
            let Some(mut local) = project.read()? else {
                bail!("no build script at {:?}", project.script_path());
            };
            let remote = read_script(&remote)?;
            let strategy: MergeStrategy = match strategy {
                Some(path) => {
                    let data =
                        fs::read(&path).with_context(|| format!("reading {:?}", path))?;
                    serde_json::from_slice(&data)
                        .with_context(|| format!("parsing strategy {:?}", path))?
                }
                None => MergeStrategy::default(),
            };

            if !is_auto_merge_possible(&local, &remote) {
                project.write_conflict_diff(&local, &remote)?;
                bail!(
                    "build scripts cannot be merged automatically; conflicts written to {:?}",
                    project.script_path()
                );
            }
            local.merge(&remote, &strategy)?;
            project.write(&local)?;
            println!("Merged into {:?}", project.script_path());
        }
    }

    Ok(())
}
