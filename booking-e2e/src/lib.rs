//! Stand-in booking server and client used to exercise the harness.
//!
//! Both binaries speak the real wire protocol and can be told, through
//! environment variables, to misbehave in the ways the harness must detect:
//! a server that never evicts idle connections or ignores termination, and a
//! client that never gives up, hangs after giving up, or always exits 0.

pub mod client;
pub mod server;
pub mod settings;

/// Install a plain fmt subscriber writing to the given sink.
pub fn init_logging<W>(writer: W)
where
    W: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
}
