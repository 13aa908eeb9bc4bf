/// REPL command grammar (C8)
///
/// Each line the operator submits is tokenized like `argv` and parsed with
/// the same `clap` derive machinery the teacher used for its top-level CLI
/// — here applied per-line (`no_binary_name`) instead of once at process
/// start, since the REPL itself (editing, history, tab-completion) is an
/// out-of-scope external collaborator and the core only needs "parse a
/// line into a command."
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bitlab", no_binary_name = true)]
pub struct CliLine {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Set the exit flag, or terminate immediately with `--force`.
    Exit {
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
    /// Clear the terminal screen.
    Clear,
    /// Print the given words back to stdout.
    Echo { text: Vec<String> },
    /// Print the general command list, or one command's usage.
    Help { command: Option<String> },
    /// Print previously submitted commands.
    History,
    /// Print process and runtime information.
    Info,
    /// Print the configured user; warn if running as root.
    Whoami {
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
    /// Print this host's public IP, via the configured lookup URLs.
    Getip { urls: Vec<String> },
    /// Shell out to the system `ping` utility against `ip`.
    Ping {
        #[arg(short = 'c', long = "count")]
        count: Option<u32>,
        ip: String,
    },
    /// Arm or inspect peer discovery.
    Peerdiscovery(PeerDiscoveryArgs),
    /// Dial a peer and perform the handshake.
    Connect { ip: String },
    /// Close a connected peer's session.
    Disconnect { idx: usize },
    /// List live peer sessions.
    List,
    /// Issue `getaddr` against a connected peer and wait for the response.
    Getaddr { idx: usize },
    /// Issue `getheaders` against a connected peer and wait for the response.
    Getheaders { idx: usize },
}

#[derive(Args, Debug, Clone)]
#[command(disable_help_flag = true)]
pub struct PeerDiscoveryArgs {
    #[arg(short = 'd', long = "daemon")]
    pub daemon: bool,
    #[arg(short = 'h', long = "hardcoded")]
    pub hardcoded: bool,
    #[arg(short = 'l', long = "lookup")]
    pub lookup: bool,
    pub domain: Option<String>,
}

impl PeerDiscoveryArgs {
    pub fn has_arguments(&self) -> bool {
        self.daemon || self.hardcoded || self.lookup || self.domain.is_some()
    }
}

/// Split a submitted line into `argv`-style tokens. Quoting is not
/// supported — out of scope for a REPL whose line editor is itself an
/// external collaborator (§1).
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
