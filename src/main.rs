//! CLI entry point for stencil

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stencil::{commands, EngineConfig, Environment};

#[derive(Parser)]
#[command(name = "stencil")]
#[command(version)]
#[command(about = "Render Django-style templates from the command line", long_about = None)]
struct Cli {
    /// Config file (defaults to ./stencil.yml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Template directory, overriding the config
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template
    #[command(alias = "r")]
    Render {
        /// Template name, relative to the template directory
        name: String,

        /// JSON or YAML file with the render context
        #[arg(short = 'x', long)]
        context: Option<PathBuf>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile every template and report syntax errors
    Check,

    /// List templates
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "stencil=debug,info"
    } else {
        "stencil=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = EngineConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.dir {
        config.template_dir = dir;
    }
    tracing::debug!("Using templates from {:?}", config.template_dir);

    let env = Environment::with_config(&config);

    match cli.command {
        Commands::Render {
            name,
            context,
            output,
        } => {
            commands::render::run(&env, &config, &name, context.as_deref(), output.as_deref())?;
        }

        Commands::Check => {
            commands::check::run(&env, &config)?;
        }

        Commands::List => {
            commands::list::run(&config)?;
        }
    }

    Ok(())
}
