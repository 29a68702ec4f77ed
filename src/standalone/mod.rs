use clap::{ArgAction, Parser, Subcommand, ValueEnum};

pub mod config;
pub mod engine;
pub mod shuffle;

use config::EngineConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v, -vv, -vvv). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job on this machine
    Submit {
        /// Glob spec for the input files
        #[arg(short, long)]
        input: String,

        // Name of the workload
        #[arg(short, long)]
        workload: String,

        /// Output directory. Results go to stdout when omitted.
        #[arg(short, long)]
        output: Option<String>,

        /// How results are written
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Maximum concurrent map calls (defaults to the number of CPUs)
        #[arg(long)]
        map_workers: Option<usize>,

        /// Maximum concurrent reduce calls (defaults to the number of CPUs)
        #[arg(long)]
        reduce_workers: Option<usize>,

        /// Fail the job when an input cannot be read
        #[arg(long)]
        strict: bool,

        /// Auxiliary arguments to pass to the MapReduce application.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub workload: String,
    pub output: Option<String>,
    pub format: Format,
    pub config: EngineConfig,
    pub args: Vec<String>,
}

impl Job {
    /// Builds the job described by a `submit` command.
    pub fn from_command(command: Commands) -> Self {
        match command {
            Commands::Submit {
                input,
                workload,
                output,
                format,
                map_workers,
                reduce_workers,
                strict,
                args,
            } => {
                let mut config = EngineConfig::default().with_strict_inputs(strict);
                if let Some(n) = map_workers {
                    config = config.with_map_workers(n);
                }
                if let Some(n) = reduce_workers {
                    config = config.with_reduce_workers(n);
                }
                Job {
                    input,
                    workload,
                    output,
                    format,
                    config,
                    args,
                }
            }
        }
    }
}
