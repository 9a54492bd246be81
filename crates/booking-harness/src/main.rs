//! Booking timeout harness.
//!
//! Drives the booking server and client binaries through the functional,
//! client-timeout and server-timeout scenarios.
//!
//! # Usage
//!
//! Run everything against `bin/server` and `bin/client`:
//! ```bash
//! booking-harness
//! ```
//!
//! Run one scenario with a compressed time scale:
//! ```bash
//! booking-harness --scenario client-timeout --time-unit-ms 100
//! ```
//!
//! # Exit Codes
//!
//! - 0: Every selected scenario passed
//! - 1: At least one scenario did not pass
//! - 2: Usage or configuration error

use std::path::PathBuf;
use std::time::Duration;

use booking_harness::config::{DEFAULT_PORT, parse_env_pair};
use booking_harness::logging::{self, LogSink};
use booking_harness::scenarios::{self, Scenario};
use booking_harness::{HarnessConfig, Orchestrator, Timings};
use clap::{Parser, ValueEnum};
use facet::Facet;
use owo_colors::OwoColorize;

#[derive(Parser, Debug)]
#[command(name = "booking-harness")]
#[command(about = "Timeout harness for the ticket-booking server and client")]
struct Args {
    /// Path to the server binary (".exe" is tried as a fallback)
    #[arg(long, default_value = "bin/server")]
    server_bin: PathBuf,

    /// Path to the client binary (".exe" is tried as a fallback)
    #[arg(long, default_value = "bin/client")]
    client_bin: PathBuf,

    /// Service port shared by the server and the mock server
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// File that collects server stdout and stderr
    #[arg(long, default_value = "server_output.log")]
    output_log: PathBuf,

    /// Extra environment for every spawned process (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Length of one time unit in milliseconds
    #[arg(long, default_value_t = 1000)]
    time_unit_ms: u64,

    /// Fail the contest if more bookings than this succeed
    #[arg(long)]
    seat_capacity: Option<u32>,

    /// Client threads in the booking contest
    #[arg(long, default_value_t = 10)]
    contest_threads: u32,

    /// Client threads in the query stress pass
    #[arg(long, default_value_t = 100)]
    stress_threads: u32,

    /// Run only the named scenario (repeatable)
    #[arg(long = "scenario")]
    scenarios: Vec<String>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// JSON output for a scenario listing.
#[derive(Facet)]
struct ScenarioJson {
    name: String,
    objective: String,
}

fn main() {
    let args = Args::parse();

    let sink = match args.format {
        Format::Text => LogSink::Stdout,
        Format::Json => LogSink::Stderr,
    };
    logging::init(&args.log_level, sink);

    if args.list {
        list_scenarios(args.format);
        return;
    }

    let selected = match select(&args.scenarios) {
        Ok(selected) => selected,
        Err(unknown) => {
            eprintln!("unknown scenario: {}", unknown);
            eprintln!("Run `booking-harness --list` to see the available scenarios");
            std::process::exit(2);
        }
    };

    let config = HarnessConfig {
        server_bin: args.server_bin.clone(),
        client_bin: args.client_bin.clone(),
        port: args.port,
        output_log: args.output_log.clone(),
        child_env: args.env.clone(),
        timings: Timings::from_unit(Duration::from_millis(args.time_unit_ms)),
        contest_threads: args.contest_threads,
        stress_threads: args.stress_threads,
        seat_capacity: args.seat_capacity,
        ..HarnessConfig::default()
    };

    let orchestrator = match Orchestrator::new(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create runtime: {}", e);
            std::process::exit(2);
        }
    };

    let text = args.format == Format::Text;
    let result = rt.block_on(orchestrator.run(&selected, |report| {
        if text {
            println!("{}", report.render());
        }
    }));

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if text {
        let line = summary.tally();
        if summary.all_passed() {
            println!("\n{}", line.green());
        } else {
            println!("\n{}", line.red());
        }
    } else {
        println!("{}", summary.to_json());
    }

    std::process::exit(if summary.all_passed() { 0 } else { 1 });
}

/// Resolve scenario names, keeping execution order. Empty means all.
fn select(names: &[String]) -> Result<Vec<&'static Scenario>, String> {
    if let Some(unknown) = names.iter().find(|n| scenarios::find(n).is_none()) {
        return Err(unknown.clone());
    }
    Ok(scenarios::all()
        .iter()
        .filter(|s| names.is_empty() || names.iter().any(|n| n == s.name))
        .collect())
}

fn list_scenarios(format: Format) {
    let all = scenarios::all();
    match format {
        Format::Json => {
            let output: Vec<ScenarioJson> = all
                .iter()
                .map(|s| ScenarioJson {
                    name: s.name.to_string(),
                    objective: s.objective.to_string(),
                })
                .collect();
            println!("{}", facet_json::to_string(&output));
        }
        Format::Text => {
            println!("Available scenarios:\n");
            for scenario in all {
                println!("  {:<16} {}", scenario.name, scenario.objective);
            }
        }
    }
}
