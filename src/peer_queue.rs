/// Peer discovery queue (C2)
///
/// A fixed-capacity FIFO of candidate `(ip, port)` pairs waiting to be
/// dialed. Discovery (DNS/hardcoded) pushes into it; `connect` and the
/// discovery worker itself pop from it. Deduplication is a linear scan
/// over the populated window, deliberate: the queue is small and insert
/// frequency is bounded by how fast peers answer `getaddr`.
use crate::error::{QueueError, QueueResult};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use tokio::sync::Mutex;
use tracing::info;

/// Maximum number of pending candidates held at once.
pub const PEER_QUEUE_CAPACITY: usize = 10_000;

/// A candidate peer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl std::fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Thread-safe FIFO of discovered peer candidates.
#[derive(Debug)]
pub struct PeerQueue {
    inner: Mutex<VecDeque<PeerEndpoint>>,
}

impl PeerQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(PEER_QUEUE_CAPACITY)),
        }
    }

    /// Push a peer, parsed from either `ip` with an explicit non-zero
    /// `port`, or from the `"ip:port"` hardcoded-seed shorthand (signaled
    /// by `port == 0` and a colon present in `raw_ip`).
    ///
    /// Duplicates are dropped silently at info level and count as success —
    /// they are not invalid input. A full queue or an unparseable endpoint
    /// is reported to the caller as [`QueueError::Full`] /
    /// [`QueueError::InvalidEndpoint`] so discovery can log which candidates
    /// it failed to enqueue instead of the error vanishing silently.
    pub async fn push(&self, raw_ip: &str, port: u16) -> QueueResult<()> {
        let (ip_str, port) = if port == 0 {
            match raw_ip.rsplit_once(':') {
                Some((ip, port_str)) => match port_str.parse::<u16>() {
                    Ok(p) => (ip, p),
                    Err(_) => return Err(QueueError::InvalidEndpoint(raw_ip.to_string())),
                },
                None => return Err(QueueError::InvalidEndpoint(raw_ip.to_string())),
            }
        } else {
            (raw_ip, port)
        };

        let ip = ip_str
            .parse::<Ipv4Addr>()
            .map_err(|_| QueueError::InvalidEndpoint(raw_ip.to_string()))?;
        let endpoint = PeerEndpoint::new(ip, port);

        let mut queue = self.inner.lock().await;
        if queue.iter().any(|p| *p == endpoint) {
            info!(%endpoint, "duplicate peer, not added");
            return Ok(());
        }
        if queue.len() >= PEER_QUEUE_CAPACITY {
            return Err(QueueError::Full);
        }
        queue.push_back(endpoint);
        Ok(())
    }

    /// Pop the oldest candidate, if any.
    pub async fn pop(&self) -> Option<PeerEndpoint> {
        self.inner.lock().await.pop_front()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// A point-in-time copy of the queue contents, for printing.
    pub async fn snapshot(&self) -> Vec<PeerEndpoint> {
        self.inner.lock().await.iter().copied().collect()
    }
}

impl Default for PeerQueue {
    fn default() -> Self {
        Self::new()
    }
}
