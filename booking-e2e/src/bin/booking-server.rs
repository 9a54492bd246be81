//! Stand-in booking server.
//!
//! Listens on `BOOKING_PORT` and answers query and booking requests until it
//! receives SIGTERM. See [`booking_e2e::settings`] for the other knobs.
//!
//! # Exit Codes
//!
//! - 0: Terminated on request
//! - 1: I/O error while serving
//! - 2: Invalid environment
//! - 3: Startup failure requested via `BOOKING_FAIL_STARTUP`

use booking_e2e::server;
use booking_e2e::settings::{FAIL_STARTUP_VAR, ServerSettings};
use tracing::error;

fn main() {
    booking_e2e::init_logging(std::io::stdout);

    let settings = match ServerSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if settings.fail_startup {
        eprintln!("{} is set, refusing to start", FAIL_STARTUP_VAR);
        std::process::exit(3);
    }

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

    if let Err(e) = rt.block_on(server::run(settings)) {
        error!("server failed: {}", e);
        std::process::exit(1);
    }
}
