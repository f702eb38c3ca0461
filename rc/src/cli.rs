//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::StepType;
use crate::stepqueue::DrainOrder;

/// RunControl - debugger step coordination
#[derive(Parser)]
#[command(
    name = "rc",
    about = "Debugger run-control step queue and timeout supervision",
    version,
    after_help = "Logs are written to: ~/.local/share/runcontrol/logs/runcontrol.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Simulate holding down a step key against an in-memory back end
    Simulate {
        /// Number of step key presses
        #[arg(short, long, default_value = "10")]
        presses: u32,

        /// Milliseconds between presses
        #[arg(short, long, default_value = "20")]
        interval_ms: u64,

        /// Step kind
        #[arg(short, long, default_value = "over", value_parser = parse_step_type)]
        step_type: StepType,

        /// Issue instruction-level steps
        #[arg(long)]
        instruction: bool,

        /// Override the configured per-context queue depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Override the configured drain order
        #[arg(long, value_enum)]
        order: Option<OrderArg>,

        /// Override the simulated step latency in milliseconds
        #[arg(short, long)]
        latency_ms: Option<u64>,

        /// Make the first step hang so the stepping timeout fires
        #[arg(long)]
        hang: bool,

        /// Output format for the final metrics
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Drain order as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OrderArg {
    Fifo,
    Lifo,
}

impl From<OrderArg> for DrainOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Fifo => DrainOrder::Fifo,
            OrderArg::Lifo => DrainOrder::Lifo,
        }
    }
}

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn parse_step_type(s: &str) -> Result<StepType, String> {
    s.parse()
}
