use std::path::{Path, PathBuf};

mod compile;
mod layers;
mod terminal;
mod validate;

use atlas::Config;
use clap::ArgAction;
use compile::Compile;
use layers::Layers;
use validate::Validate;

/// The configuration file picked up from the working directory when no
/// `--config` is given.
const DEFAULT_CONFIG: &str = "atlas.toml";

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the configuration file [default: atlas.toml, if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let config = load_config(self.config.as_deref())?;

        self.command
            .unwrap_or_else(|| Command::Compile(Compile::default()))
            .run(config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

/// Loads the configuration named on the command line, or `atlas.toml` when it
/// exists, falling back to the defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).is_file() => Path::new(DEFAULT_CONFIG),
        None => {
            tracing::debug!("No {DEFAULT_CONFIG} found, using default configuration");
            return Ok(Config::default());
        }
    };
    tracing::debug!("Loading configuration from {}", path.display());
    Config::load(path).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Compile the matrix to YAML and JSON (default)
    Compile(Compile),

    /// Compile in memory and report schema violations
    ///
    /// Exits with status 2 if any violation is found.
    Validate(Validate),

    /// Write ATT&CK Navigator layers for the compiled matrix
    Layers(Layers),
}

impl Command {
    fn run(self, config: Config) -> anyhow::Result<()> {
        match self {
            Self::Compile(command) => command.run(config)?,
            Self::Validate(command) => command.run(config)?,
            Self::Layers(command) => command.run(config)?,
        }
        Ok(())
    }
}
