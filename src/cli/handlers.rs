/// Command orchestration (C8)
///
/// Holds the shared handles to every other component and dispatches a
/// parsed [`Commands`] to the matching operation, under the single-flight
/// command lock. Command handlers never touch `println!` directly except
/// for the final response text — matching the ambient-stack rule that
/// direct command output is the one place `println!` still belongs, with
/// everything else logged through `tracing`.
use crate::cli::commands::{Commands, PeerDiscoveryArgs};
use crate::cli::state::ProgramState;
use crate::config::Config;
use crate::discovery::{DiscoveryConfig, DiscoveryHandle};
use crate::error::{CommandError, CommandResult};
use crate::headers_store::HeadersStore;
use crate::operations;
use crate::peer_queue::PeerQueue;
use crate::registry::ConnectionRegistry;
use crate::session;
use clap::{CommandFactory, Parser};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_GETIP_URL: &str = "ifconfig.me";
const DEFAULT_PING_COUNT: u32 = 4;
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct CliHandler {
    pub config: Arc<Config>,
    pub state: Arc<ProgramState>,
    pub queue: Arc<PeerQueue>,
    pub registry: Arc<ConnectionRegistry>,
    pub headers: Arc<HeadersStore>,
    pub discovery: DiscoveryHandle,
}

impl CliHandler {
    pub fn new(
        config: Arc<Config>,
        state: Arc<ProgramState>,
        queue: Arc<PeerQueue>,
        registry: Arc<ConnectionRegistry>,
        headers: Arc<HeadersStore>,
        discovery: DiscoveryHandle,
    ) -> Self {
        Self {
            config,
            state,
            queue,
            registry,
            headers,
            discovery,
        }
    }

    /// Tokenize and parse `line`, then dispatch it. Holds the single-flight
    /// command lock for the whole call, per §5's "two commands cannot
    /// interleave." A usage error is returned before the lock is touched
    /// for history so it carries no side effects, per §7.
    pub async fn execute(&self, line: &str) -> CommandResult<String> {
        let tokens = crate::cli::commands::tokenize(line);
        if tokens.is_empty() {
            return Ok(String::new());
        }
        let parsed = crate::cli::commands::CliLine::try_parse_from(tokens.clone())
            .map_err(|e| CommandError::Usage(e.to_string()))?;

        let _guard = self.state.lock_command().await;
        self.state.record(line).await;

        match parsed.command {
            Commands::Exit { force } => self.handle_exit(force),
            Commands::Clear => Ok(Self::handle_clear()),
            Commands::Echo { text } => Ok(text.join(" ")),
            Commands::Help { command } => Ok(Self::handle_help(command)),
            Commands::History => self.handle_history().await,
            Commands::Info => self.handle_info().await,
            Commands::Whoami { force } => Ok(self.handle_whoami(force)),
            Commands::Getip { urls } => self.handle_getip(urls).await,
            Commands::Ping { count, ip } => self.handle_ping(count, ip).await,
            Commands::Peerdiscovery(args) => self.handle_peerdiscovery(args).await,
            Commands::Connect { ip } => self.handle_connect(ip).await,
            Commands::Disconnect { idx } => self.handle_disconnect(idx).await,
            Commands::List => self.handle_list().await,
            Commands::Getaddr { idx } => self.handle_getaddr(idx).await,
            Commands::Getheaders { idx } => self.handle_getheaders(idx).await,
        }
    }

    fn handle_exit(&self, force: bool) -> CommandResult<String> {
        if force {
            std::process::exit(0);
        }
        self.state.request_exit();
        Ok("exiting".to_string())
    }

    fn handle_clear() -> String {
        "\x1B[2J\x1B[1;1H".to_string()
    }

    fn handle_help(command: Option<String>) -> String {
        let mut cmd = crate::cli::commands::CliLine::command_for_update();
        if let Some(name) = command {
            match cmd.find_subcommand_mut(&name) {
                Some(sub) => sub.render_help().to_string(),
                None => format!("no such command: {name}"),
            }
        } else {
            cmd.render_help().to_string()
        }
    }

    async fn handle_history(&self) -> CommandResult<String> {
        Ok(self.state.history().await.join("\n"))
    }

    async fn handle_info(&self) -> CommandResult<String> {
        let connected = self.registry.snapshot().await.len();
        let queued = self.queue.len().await;
        let (enabled, in_progress, succeeded) = self.discovery.snapshot().await;
        Ok(format!(
            "pid: {}\nuptime: {:?}\nstarted with CLI parameters: {}\nconnected peers: {connected}\nqueued candidates: {queued}\ndiscovery: enabled={enabled} in_progress={in_progress} succeeded={succeeded:?}",
            self.state.pid,
            self.state.uptime(),
            self.state.started_with_cli_params,
        ))
    }

    fn handle_whoami(&self, force: bool) -> String {
        if crate::config::is_root_user(&self.config.user) && !force {
            format!(
                "{}\nwarning: running as root",
                self.config.user
            )
        } else {
            self.config.user.clone()
        }
    }

    async fn handle_getip(&self, urls: Vec<String>) -> CommandResult<String> {
        let urls = if urls.is_empty() {
            vec![DEFAULT_GETIP_URL.to_string()]
        } else {
            urls
        };
        let mut lines = Vec::with_capacity(urls.len());
        for url in urls {
            let output = tokio::process::Command::new("curl")
                .args(["-s", &url])
                .output()
                .await
                .map_err(|e| CommandError::Failed(format!("curl {url} failed: {e}")))?;
            lines.push(format!(
                "{url}: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn handle_ping(&self, count: Option<u32>, ip: String) -> CommandResult<String> {
        let count = count.unwrap_or(DEFAULT_PING_COUNT).to_string();
        let output = tokio::process::Command::new("ping")
            .args(["-c", &count, &ip])
            .output()
            .await
            .map_err(|e| CommandError::Failed(format!("ping failed: {e}")))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn handle_peerdiscovery(&self, args: PeerDiscoveryArgs) -> CommandResult<String> {
        let (_enabled, in_progress, succeeded) = self.discovery.snapshot().await;

        if !args.has_arguments() {
            if succeeded == Some(true) {
                return Ok(self.format_queue().await);
            }
            return Err(CommandError::Usage(
                "peerdiscovery: pass -h (hardcoded seeds) or -l [domain] (DNS) to start discovery"
                    .to_string(),
            ));
        }

        if in_progress {
            if args.daemon {
                return Err(CommandError::AlreadyInProgress);
            }
            self.wait_for_completion().await;
            return Ok(self.format_queue().await);
        }

        let config = DiscoveryConfig {
            daemon: args.daemon,
            hardcoded_seeds: args.hardcoded,
            dns_lookup: args.lookup,
            custom_domain: args.domain.clone(),
        };
        config
            .validate()
            .map_err(|e| CommandError::Usage(e.to_string()))?;

        self.discovery.arm(config.clone()).await;
        let _ = self.config.save_discovery_config(&config).await;

        if args.daemon {
            return Ok("peer discovery started in the background".to_string());
        }
        self.wait_for_completion().await;
        Ok(self.format_queue().await)
    }

    /// Poll until the background [`crate::discovery::DiscoveryEngine`] has
    /// latched a result for the attempt just armed. `arm` always resets
    /// `succeeded` to `None` first, so waiting for it to become `Some(_)`
    /// (rather than for `in_progress` to go false) avoids racing the
    /// worker's 100ms poll tick — `in_progress` can still read `false` in
    /// the instant right after arming, before the worker has picked it up.
    async fn wait_for_completion(&self) {
        loop {
            let (_, _, succeeded) = self.discovery.snapshot().await;
            if succeeded.is_some() {
                return;
            }
            tokio::time::sleep(DISCOVERY_POLL_INTERVAL).await;
        }
    }

    async fn format_queue(&self) -> String {
        let snapshot = self.queue.snapshot().await;
        if snapshot.is_empty() {
            return "peer queue is empty".to_string();
        }
        snapshot
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn handle_connect(&self, ip: String) -> CommandResult<String> {
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| CommandError::Usage(format!("not a valid IPv4 address: {ip}")))?;
        let idx = session::connect(
            ip,
            crate::wire::MAINNET_PORT,
            self.registry.clone(),
            self.queue.clone(),
            self.headers.clone(),
            self.config.clone(),
        )
        .await
        .map_err(|e| CommandError::Failed(e.to_string()))?;
        info!(%ip, idx, "connected");
        Ok(format!("connected, peer index {idx}"))
    }

    async fn handle_disconnect(&self, idx: usize) -> CommandResult<String> {
        self.registry
            .disconnect(idx)
            .await
            .map_err(|_| CommandError::NotConnected(idx))?;
        Ok(format!("disconnected peer {idx}"))
    }

    async fn handle_list(&self) -> CommandResult<String> {
        let snapshot = self.registry.snapshot().await;
        if snapshot.is_empty() {
            return Ok("no connected peers".to_string());
        }
        Ok(snapshot
            .iter()
            .map(|(idx, ip, port, connected)| format!("{idx}: {ip}:{port} connected={connected}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn handle_getaddr(&self, idx: usize) -> CommandResult<String> {
        let enqueued = operations::send_getaddr_and_wait(&self.registry, &self.queue, idx)
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?;
        Ok(format!("enqueued {enqueued} new peer candidates"))
    }

    async fn handle_getheaders(&self, idx: usize) -> CommandResult<String> {
        let appended = operations::send_getheaders_and_wait(&self.registry, &self.headers, idx)
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?;
        let tip = self
            .headers
            .latest_hash()
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?;
        Ok(format!(
            "appended {appended} headers, tip is now {}",
            hex::encode(tip)
        ))
    }
}
