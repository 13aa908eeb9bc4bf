/// Entry point: wires up the shared handles, spawns the discovery worker,
/// and drives a line-oriented REPL loop against [`bitlab::cli::CliHandler`].
///
/// The REPL itself — line editing, history recall, tab-completion — is out
/// of this crate's scope (§1); this loop is the thinnest possible external
/// collaborator, reading one line of stdin at a time.
use bitlab::cli::{CliHandler, ProgramState};
use bitlab::config::Config;
use bitlab::discovery::{DiscoveryEngine, DiscoveryHandle};
use bitlab::headers_store::HeadersStore;
use bitlab::peer_queue::PeerQueue;
use bitlab::registry::ConnectionRegistry;
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "bitlab", about = "Interactive Bitcoin mainnet peer client")]
struct StartupArgs {
    /// Widen logging to debug level.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = StartupArgs::parse();
    let started_with_cli_params = std::env::args().len() > 1;

    bitlab::init_logging(args.verbose);

    let config = Arc::new(Config::load(args.verbose)?);
    config.ensure_directories()?;

    let queue = Arc::new(PeerQueue::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let headers = Arc::new(HeadersStore::new(config.headers_path()));
    let discovery = DiscoveryHandle::new();

    // Restore the operator's last-used discovery mode, if one was saved and
    // still validates (the top-level `daemon`/`hardcoded_seeds`/`dns_lookup`
    // exclusivity invariant may have been edited out-of-band).
    let persisted = config.load_discovery_config().await;
    if persisted.validate().is_ok() {
        discovery.arm(persisted).await;
    }

    let state = Arc::new(ProgramState::new(started_with_cli_params));

    let discovery_engine = DiscoveryEngine::new(discovery.clone(), queue.clone());
    let engine_exit_flag = state.exit_flag.clone();
    let discovery_task =
        tokio::spawn(async move { discovery_engine.run(engine_exit_flag).await });

    let handler = CliHandler::new(
        config.clone(),
        state.clone(),
        queue,
        registry,
        headers,
        discovery,
    );

    println!(
        "bitlab {} — mainnet peer client. Type 'help' for the command list.",
        bitlab::VERSION
    );

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    'repl: loop {
        if state.should_exit() {
            break;
        }
        print!("bitlab> ");
        std::io::stdout().flush().ok();

        let line = loop {
            tokio::select! {
                result = lines.next_line() => break result?,
                _ = tokio::time::sleep(EXIT_POLL_INTERVAL) => {
                    if state.should_exit() {
                        break 'repl;
                    }
                }
            }
        };

        let Some(line) = line else {
            break; // stdin closed (EOF)
        };
        if line.trim().is_empty() {
            continue;
        }

        match handler.execute(&line).await {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{output}");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    discovery_task.abort();
    Ok(())
}
