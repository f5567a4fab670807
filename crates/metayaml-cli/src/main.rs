//! metayaml CLI - Lint, inspect and edit conda `meta.yaml` recipes

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use metayaml_recipe::{Platform, RequirementSection};
use std::path::PathBuf;

mod add;
mod check;
mod deps;
mod init;
mod logging;
mod remove;
mod render;
mod settings;

#[derive(Parser)]
#[command(name = "metayaml")]
#[command(version)]
#[command(about = "Lint and edit conda meta.yaml recipes", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check recipes for structural problems
    Check {
        /// Recipe files or directories to search (defaults to the recipe above the current directory)
        paths: Vec<PathBuf>,

        /// Platform to check (repeatable, replaces the configured list)
        #[arg(short, long)]
        platform: Vec<Platform>,

        /// Fail on warnings as well as errors
        #[arg(long)]
        deny_warnings: bool,

        /// Use this config file instead of metayaml.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the dependency specs of a recipe
    Deps {
        /// Recipe file or directory
        path: Option<PathBuf>,

        /// Platform to render for (defaults to the host)
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Only list one section (build, host, run or test)
        #[arg(short, long)]
        section: Option<RequirementSection>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a recipe with selectors and template variables applied
    Render {
        /// Recipe file or directory
        path: Option<PathBuf>,

        /// Platform to render for (defaults to the host)
        #[arg(short, long)]
        platform: Option<Platform>,
    },

    /// Add a requirement to meta.yaml
    Add {
        /// Dependency spec, e.g. "psi4::psi4" or "numpy=1.15.4"
        spec: String,

        /// Add to requirements.build
        #[arg(long, conflicts_with = "host")]
        build: bool,

        /// Add to requirements.host
        #[arg(long)]
        host: bool,

        /// Recipe file or directory
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Remove a requirement from meta.yaml
    Remove {
        /// Package name to remove
        package: String,

        /// Remove from requirements.build
        #[arg(long, conflicts_with_all = ["host", "run"])]
        build: bool,

        /// Remove from requirements.host
        #[arg(long, conflicts_with = "run")]
        host: bool,

        /// Remove from requirements.run
        #[arg(long)]
        run: bool,

        /// Recipe file or directory
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Create recipe/meta.yaml in the current directory
    Init {
        /// Set the package name (defaults to directory name)
        #[arg(long)]
        name: Option<String>,

        /// Set the package version
        #[arg(long)]
        version: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Check {
            paths,
            platform,
            deny_warnings,
            config,
        } => {
            let options = check::CheckOptions {
                paths,
                platforms: platform,
                deny_warnings,
                config,
            };
            check::check(&options)?;
        }

        Commands::Deps {
            path,
            platform,
            section,
            json,
        } => {
            let options = deps::DepsOptions {
                path,
                platform,
                section,
                json,
            };
            deps::list_dependencies(&options)?;
        }

        Commands::Render { path, platform } => {
            print!("{}", render::render_recipe(path.as_deref(), platform)?);
        }

        Commands::Add {
            spec,
            build,
            host,
            path,
        } => {
            let section = if build {
                RequirementSection::Build
            } else if host {
                RequirementSection::Host
            } else {
                RequirementSection::Run
            };

            let options = add::AddOptions {
                spec,
                section,
                path,
            };
            add::add_dependency(&options)?;
        }

        Commands::Remove {
            package,
            build,
            host,
            run,
            path,
        } => {
            let section = if build {
                Some(RequirementSection::Build)
            } else if host {
                Some(RequirementSection::Host)
            } else if run {
                Some(RequirementSection::Run)
            } else {
                None // Search all sections
            };

            let options = remove::RemoveOptions {
                package,
                section,
                path,
            };
            remove::remove_dependency(&options)?;
        }

        Commands::Init { name, version } => {
            init::init_recipe(&init::InitOptions { name, version })?;
        }

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "metayaml", &mut std::io::stdout());
        }
    }

    Ok(())
}
