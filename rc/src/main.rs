//! RunControl - debugger step coordination
//!
//! CLI entry point for simulating step bursts and inspecting configuration.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use runcontrol::cli::{Cli, Command, OrderArg, OutputFormat};
use runcontrol::config::Config;
use runcontrol::domain::StepType;
use runcontrol::events::{EventKind, RunControlEvent};
use runcontrol::runcontrol::{RunControl, SimulatedRunControl};
use runcontrol::session::Session;
use runcontrol::stepqueue::{StepQueueManager, StepQueueMetrics};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runcontrol")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("runcontrol.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

/// Upper bound on how long `simulate` waits for queued steps to play out
const MAX_DRAIN: Duration = Duration::from_secs(60);

/// Time for a full queue plus the in-flight step to finish, capped at [`MAX_DRAIN`]
fn drain_window(latency: Duration, depth: usize) -> Duration {
    let rounds = u32::try_from(depth).unwrap_or(u32::MAX).saturating_add(2);
    latency.checked_mul(rounds).unwrap_or(MAX_DRAIN).min(MAX_DRAIN)
}

/// Knobs for one `simulate` run
struct SimulateOptions {
    presses: u32,
    interval: Duration,
    step_type: StepType,
    instruction: bool,
    depth: Option<usize>,
    order: Option<OrderArg>,
    latency_ms: Option<u64>,
    hang: bool,
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "RunControl loaded config: queue-depth={}, stepping-timeout-ms={}",
        config.step_queue.queue_depth, config.step_queue.stepping_timeout_ms
    );

    match cli.command {
        Command::Simulate {
            presses,
            interval_ms,
            step_type,
            instruction,
            depth,
            order,
            latency_ms,
            hang,
            format,
        } => {
            let options = SimulateOptions {
                presses,
                interval: Duration::from_millis(interval_ms),
                step_type,
                instruction,
                depth,
                order,
                latency_ms,
                hang,
                format,
            };
            cmd_simulate(&config, options).await
        }
        Command::Config => cmd_config(&config),
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

fn print_event(event: &RunControlEvent) {
    let label = match event.kind() {
        EventKind::Suspended => "suspended".green(),
        EventKind::Resumed => "resumed".cyan(),
        EventKind::SteppingTimedOut => "timed out".red().bold(),
    };
    match event.reason() {
        Some(reason) => println!("  {} {} ({})", label, event.context(), reason),
        None => println!("  {} {}", label, event.context()),
    }
}

fn print_metrics(metrics: &StepQueueMetrics, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(metrics)?);
        }
        OutputFormat::Text => {
            println!("{}", "Step queue metrics".bold());
            println!("  dispatched:          {}", metrics.dispatched);
            println!("  queued:              {}", metrics.queued);
            println!("  dropped:             {}", metrics.dropped);
            println!("  flushed:             {}", metrics.flushed);
            println!("  timeouts:            {}", metrics.timeouts);
            println!("  protocol violations: {}", metrics.protocol_violations);
        }
    }
    Ok(())
}

/// Press the step key `presses` times against a simulated thread
async fn cmd_simulate(config: &Config, options: SimulateOptions) -> Result<()> {
    let mut queue_config = config.step_queue.clone();
    if let Some(depth) = options.depth {
        queue_config.queue_depth = depth;
    }
    if let Some(order) = options.order {
        queue_config.drain_order = order.into();
    }
    let mut sim_config = config.simulation.clone();
    if let Some(latency_ms) = options.latency_ms {
        sim_config.step_latency_ms = latency_ms;
    }
    let latency = sim_config.step_latency();

    let session = Session::open();
    let (registration, mut events) = session.bus().forward(&EventKind::ALL);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let sim = Arc::new(SimulatedRunControl::new(session.clone(), sim_config));
    let thread = sim.add_thread("1");
    if options.hang {
        sim.hang_next_step(&thread);
    }
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), queue_config.clone());

    println!(
        "{} {} presses of step {}{} (depth {}, {:?}, latency {:?})",
        "Simulating".bold(),
        options.presses,
        options.step_type,
        if options.instruction { " (instruction)" } else { "" },
        queue_config.queue_depth,
        queue_config.drain_order,
        latency
    );

    for press in 1..=options.presses {
        let accepted = if options.instruction {
            handle
                .can_enqueue_instruction_step(&thread, options.step_type)
                .await?
        } else {
            handle.can_enqueue_step(&thread, options.step_type).await?
        };
        let verdict = if accepted { "accepted".green() } else { "ignored".yellow() };
        println!("press {:>3}: {}", press, verdict);

        if options.instruction {
            handle.enqueue_instruction_step(&thread, options.step_type)?;
        } else {
            handle.enqueue_step(&thread, options.step_type)?;
        }
        tokio::time::sleep(options.interval).await;
    }

    if options.hang {
        tokio::time::sleep(queue_config.stepping_timeout() + Duration::from_millis(50)).await;
        let timed_out = handle.is_stepping_timed_out(&thread).await?;
        println!("stepping timed out: {}", timed_out);
        // Unstick the hung step so the queue can drain
        sim.hit_breakpoint(&thread);
    }

    // Let queued steps play out, bounded by the queue depth
    let deadline = tokio::time::Instant::now() + drain_window(latency, queue_config.queue_depth);
    while tokio::time::Instant::now() < deadline {
        if handle.pending_step_count(&thread).await? == 0 && sim.is_suspended(&thread) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let metrics = handle.metrics().await?;
    handle.shutdown()?;
    session.close();
    drop(registration);
    let _ = printer.await;

    println!();
    println!(
        "steps executed: {}",
        sim.steps_taken(&thread) + sim.instruction_steps_taken(&thread)
    );
    print_metrics(&metrics, options.format)
}
