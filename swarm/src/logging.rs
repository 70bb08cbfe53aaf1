//! Diagnostic tracing for the swarm CLI.
//!
//! Tracing is for humans debugging a run and goes to stderr only. The product
//! output of every file operation is its `OperationResult`, which is printed
//! regardless of `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose { "warn,swarm=debug" } else { "warn" }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` turns on debug output for
/// this crate. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=swarm::io::sandbox=debug swarm validate ../a.py
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
