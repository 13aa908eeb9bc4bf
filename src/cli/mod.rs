/// Command orchestration (C8)
///
/// The REPL hands each submitted line to [`handlers::CliHandler::execute`];
/// everything about how that line was edited, completed, or recalled by the
/// operator belongs to the REPL host, not this module (§1 Out of scope).
pub mod commands;
pub mod handlers;
pub mod state;

#[cfg(test)]
mod tests;

pub use commands::{CliLine, Commands, PeerDiscoveryArgs};
pub use handlers::CliHandler;
pub use state::ProgramState;
