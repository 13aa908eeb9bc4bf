/// bitlab — an interactive Bitcoin mainnet peer client.
///
/// Discovers peers, dials them, performs the `version`/`verack` handshake,
/// and maintains long-lived sessions exchanging the wire-protocol subset
/// listed in [`wire`]. A REPL (out of this crate's scope) drives the client
/// through the command surface in [`cli`].
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod headers_store;
pub mod operations;
pub mod peer_queue;
pub mod random;
pub mod registry;
pub mod session;
pub mod wire;

pub use error::{BitlabError, BitlabResult};

/// Library version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the `tracing` subscriber: `info` by default, `debug` under
/// `-v`/`--verbose`. Mirrors the teacher's `fmt().with_max_level(...).init()`
/// call from `main.rs`.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();
}
