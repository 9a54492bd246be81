//! Stand-in booking client.
//!
//! ```bash
//! booking-client <threads> query
//! booking-client <threads> book <tickets>
//! ```
//!
//! # Exit Codes
//!
//! - 0: Every request got a response
//! - 1: At least one request failed or timed out
//! - 2: Usage error or invalid environment

use booking_e2e::client::{self, Action};
use booking_e2e::settings::ClientSettings;
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "booking-client")]
#[command(about = "Stand-in ticket-booking client")]
struct Args {
    /// Number of concurrent requests
    threads: u32,

    /// What each request does
    #[arg(value_enum)]
    action: ActionArg,

    /// Tickets per booking (book only)
    tickets: Option<u32>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionArg {
    Query,
    Book,
}

fn main() {
    booking_e2e::init_logging(std::io::stderr);
    let args = Args::parse();

    let action = match (args.action, args.tickets) {
        (ActionArg::Query, None) => Action::Query,
        (ActionArg::Book, Some(tickets)) if tickets > 0 => Action::Book { tickets },
        (ActionArg::Query, Some(_)) => usage("query takes no arguments"),
        (ActionArg::Book, _) => usage("number of tickets must be a positive integer"),
    };
    if args.threads == 0 {
        usage("thread count must be at least 1");
    }

    let settings = match ClientSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => usage(&e.to_string()),
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = rt.block_on(async {
        let outcome = client::run(args.threads, action, &settings).await;
        if let Some(delay) = settings.exit_delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    });

    if !outcome.all_completed() {
        eprintln!(
            "{} of {} requests failed",
            outcome.failed,
            outcome.failed + outcome.completed
        );
        if !settings.ignore_errors {
            std::process::exit(1);
        }
    }
}

fn usage(msg: &str) -> ! {
    eprintln!("{}", msg);
    eprintln!("Usage: booking-client <threads> query | booking-client <threads> book <tickets>");
    std::process::exit(2);
}
