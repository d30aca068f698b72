//! Battery Bench
//!
//! Drives a battery characterization bench over a serial link: sends the
//! discharge current setpoint to the controller board, then echoes and logs
//! the telemetry it streams back until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Interactive run (prompts for current and battery name)
//! battery-bench run -p /dev/ttyUSB0
//!
//! # Scripted run: 1.5A, logged to logs/LiPo_1.5.csv
//! battery-bench run -p /dev/ttyUSB0 --current 1.5 --battery LiPo
//!
//! # List available serial ports
//! battery-bench ports
//!
//! # Write the default configuration
//! battery-bench config -o bench.toml
//! ```

mod bench;
mod config;
mod error;
mod serial;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bench::{Current, Presets, Prompter, Session};
use config::BenchConfig;
use serial::monitor::StreamSummary;
use serial::{PortConfig, SerialConnection, StopReason};

/// Battery Bench
///
/// Discharge-current setpoint and telemetry logger for the characterization bench
#[derive(Parser)]
#[command(name = "battery-bench")]
#[command(version = "0.1.0")]
#[command(about = "Battery characterization bench runner")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a discharge setpoint and stream telemetry until Ctrl+C
    Run(RunArgs),

    /// List available serial ports
    Ports,

    /// Print or write the default configuration file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Serial port path (e.g., /dev/ttyUSB0, COM35)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Discharge current in amperes (skips the prompt)
    #[arg(short, long, value_parser = parse_current)]
    current: Option<Current>,

    /// Battery type used to name the log (skips the prompt)
    #[arg(short = 'n', long, conflicts_with = "no_log")]
    battery: Option<String>,

    /// Do not log telemetry (skips the prompt)
    #[arg(long)]
    no_log: bool,

    /// Directory for telemetry logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prefix echoed telemetry with a timestamp
    #[arg(long)]
    timestamps: bool,
}

fn parse_current(s: &str) -> Result<Current, String> {
    Current::parse_input(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Run(args) => handle_run(args),
        Commands::Ports => serial::port::print_ports(),
        Commands::Config { output } => handle_config(output),
    }
}

/// Apply command-line overrides on top of the loaded configuration
fn resolve_config(args: &RunArgs) -> Result<BenchConfig> {
    let mut config = BenchConfig::load_or_default(args.config.as_deref())?;

    if let Some(ref port) = args.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(ref dir) = args.log_dir {
        config.session.log_dir = dir.clone();
    }
    if args.timestamps {
        config.session.show_timestamps = true;
    }

    Ok(config)
}

fn handle_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;

    let port_config = PortConfig::from_section(&config.serial);
    let mut connection = SerialConnection::open(port_config)
        .with_context(|| "Failed to connect to the bench controller")?;

    println!(
        "{} Connected to {} at {} baud",
        "[OK]".green().bold(),
        connection.config().port_path.white().bold(),
        connection.config().baud_rate
    );

    if let Err(e) = connection.clear_input() {
        log::warn!("could not clear stale serial input: {}", e);
    }

    let presets = Presets {
        current: args.current,
        battery: args.battery,
        no_log: args.no_log,
    };

    let mut session = Session::new(connection, config.session.clone());
    {
        let stdin = io::stdin();
        let mut prompter = Prompter::new(stdin.lock(), io::stdout());
        session.configure(&mut prompter, presets)?;
    }

    let command = session.send_command()?;
    println!(
        "{} Sent setpoint {}A (command byte {})",
        "[TX]".cyan().bold(),
        session
            .settings()
            .map(|s| s.current.to_string())
            .unwrap_or_default(),
        command
    );

    let log_file = session.log_path().map(|p| p.to_path_buf());
    if let Some(ref path) = log_file {
        println!(
            "{} Logging to: {}",
            "[LOG]".cyan().bold(),
            path.display().to_string().white()
        );
    }

    let running = ctrlc_handler()?;
    println!("{}", "Press Ctrl+C to stop\n".yellow());

    let summary = session.stream(io::stdout(), running)?;
    log::debug!("session finished in state {:?}", session.state());
    print_summary(&summary, log_file.as_ref());

    match summary.stop {
        StopReason::Cancelled => Ok(()),
        StopReason::Failed(e) if e.is_disconnect() => {
            log::error!("bench controller disconnected: {}", e);
            Err(e).with_context(|| "Serial link to the bench controller was lost")
        }
        StopReason::Failed(e) => {
            log::error!("telemetry stream stopped: {}", e);
            Err(e).with_context(|| "Telemetry stream stopped")
        }
    }
}

/// Setup Ctrl+C handler; the returned flag goes false on interrupt
fn ctrlc_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);

    // stdout is busy with telemetry; report on stderr
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
        eprintln!("\n{}", "Stopping run...".yellow());
    })
    .with_context(|| "Failed to set Ctrl+C handler")?;

    Ok(running)
}

/// Print summary statistics
fn print_summary(summary: &StreamSummary, log_file: Option<&PathBuf>) {
    println!("\n{}", "=".repeat(70).dimmed());
    println!("{}", "--- Run Summary ---".cyan().bold());
    println!("Telemetry lines: {}", summary.lines);
    if summary.skipped > 0 {
        println!("Skipped lines: {}", summary.skipped.to_string().yellow());
    }
    match summary.stop {
        StopReason::Cancelled => println!("Stopped by: {}", "operator".green()),
        StopReason::Failed(ref e) => println!("Stopped by: {}", e.to_string().red()),
    }
    if let Some(path) = log_file {
        println!("Log saved to: {}", path.display().to_string().white());
    }
    println!("{}", "=".repeat(70).dimmed());
}

fn handle_config(output: Option<PathBuf>) -> Result<()> {
    let rendered = BenchConfig::default().to_toml()?;

    if let Some(path) = output {
        std::fs::write(&path, &rendered)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        println!(
            "{} Default config written to {}",
            "[OK]".green().bold(),
            path.display()
        );
    } else {
        println!("{}", rendered);
    }

    Ok(())
}
