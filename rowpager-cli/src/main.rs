//! # rowpager CLI
//!
//! Command-line interface for exercising the rowpager paging engine against
//! an in-memory table that is mutated while it is being scrolled.

mod commands;
mod scenario;

use clap::{Parser, Subcommand, ValueEnum};
use rowpager_core::ReadStrategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rowpager")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a simulation configuration file (defaults apply when omitted)
    #[arg(long, env = "ROWPAGER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scroll a table with pagers while a writer thread mutates it
    Simulate {
        /// Override the number of rows the table starts with
        #[arg(long)]
        rows: Option<u64>,

        /// Override the number of writes the writer performs
        #[arg(long)]
        writes: Option<usize>,

        /// Override the read strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Resolve an initial window without touching any store
    Window {
        /// Rows matching the predicate
        #[arg(long)]
        total: usize,

        /// Requested start position
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Requested window size
        #[arg(long)]
        size: usize,

        /// Page size used for alignment
        #[arg(long, default_value_t = 20)]
        page_size: usize,

        /// Align the start to a page boundary
        #[arg(long)]
        align: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Emit JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Copy, Clone, ValueEnum)]
pub enum StrategyArg {
    Optimistic,
    Transactional,
}

impl From<StrategyArg> for ReadStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Optimistic => ReadStrategy::Optimistic,
            StrategyArg::Transactional => ReadStrategy::Transactional,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Simulate {
            rows,
            writes,
            strategy,
            json,
        } => {
            let opts = commands::SimulateOptions {
                rows,
                writes,
                strategy: strategy.map(Into::into),
                json,
            };
            commands::simulate(cli.config.as_deref(), opts)
        }
        Commands::Window {
            total,
            start,
            size,
            page_size,
            align,
            json,
        } => {
            let opts = commands::WindowOptions {
                total,
                start,
                size,
                page_size,
                align,
                json,
            };
            commands::resolve_window(opts)
        }
        Commands::Config { json } => commands::show_config(cli.config.as_deref(), json),
    }
}
