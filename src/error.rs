/// Crate-wide error types
///
/// One `thiserror`-derived enum per subsystem, composed into a top-level
/// error so callers at the command layer can match on a single type while
/// lower layers keep precise variants.
use thiserror::Error;

/// Wire codec errors (C1): framing, checksum, and payload decode failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("checksum mismatch: expected {expected:08x}, got {got:08x}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("{what} count {got} exceeds maximum {max}")]
    CountExceeded {
        what: &'static str,
        max: usize,
        got: usize,
    },

    #[error("invalid network address record")]
    InvalidAddress,

    #[error("command name longer than 12 bytes: {0:?}")]
    CommandTooLong(String),
}

/// Peer queue errors (C2).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("peer queue is full")]
    Full,

    #[error("invalid peer endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Connection registry errors (C3).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connection registry is full")]
    Full,

    #[error("no peer at index {0}")]
    NotFound(usize),

    #[error("peer {0} has an operation already in progress")]
    SlotBusy(usize),
}

/// Peer-session errors (C4).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("timed out waiting for peer")]
    Timeout,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    PeerClosed,
}

/// Operation-request errors (C5): synchronous request/response against a peer.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("operation timed out after {0} attempts")]
    RetriesExhausted(u32),

    #[error("peer {0} is not connected")]
    NotConnected(usize),
}

/// Discovery errors (C7).
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no peer candidates were discovered")]
    NoCandidates,

    #[error("invalid discovery configuration: {0}")]
    InvalidConfig(String),

    #[error("DNS resolution failed: {0}")]
    Resolve(String),
}

/// Command-dispatch errors (C8).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("peer {0} is not connected")]
    NotConnected(usize),

    #[error("an operation is already in progress")]
    AlreadyInProgress,

    #[error("{0}")]
    Failed(String),
}

/// Top-level crate error.
#[derive(Debug, Error)]
pub enum BitlabError {
    #[error("wire codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("peer queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("connection registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("peer session error: {0}")]
    Session(#[from] SessionError),

    #[error("operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("command error: {0}")]
    Command(#[from] CommandError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read entropy from the OS CSPRNG")]
    Random,
}

pub type BitlabResult<T> = Result<T, BitlabError>;
pub type CodecResult<T> = Result<T, CodecError>;
pub type QueueResult<T> = Result<T, QueueError>;
pub type RegistryResult<T> = Result<T, RegistryError>;
pub type SessionResult<T> = Result<T, SessionError>;
pub type OperationResult<T> = Result<T, OperationError>;
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
pub type CommandResult<T> = Result<T, CommandError>;
