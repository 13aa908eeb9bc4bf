/// Connection registry (C3)
///
/// A fixed-capacity table of live peer sessions. `connect` allocates the
/// first free slot; lookup by IP and by index is linear. The spec leaves
/// the locking strategy to the implementer as long as no slot transitions
/// in parallel with a read of the same slot; here the whole table sits
/// behind one `tokio::sync::Mutex` rather than per-slot synchronization,
/// which is simpler and cheap at this scale (at most 100 entries).
use crate::error::{RegistryError, RegistryResult};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// Maximum number of simultaneously live peer sessions.
pub const REGISTRY_CAPACITY: usize = 100;

/// A connected peer's socket, wrapped for the `operation_in_progress`
/// baton: the receive loop and an operation both need exclusive access to
/// the same stream, never at once.
pub type SharedSocket = Arc<AsyncMutex<TcpStream>>;

/// One live peer session.
pub struct PeerSlot {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub socket: SharedSocket,
    pub connected: bool,
    pub operation_in_progress: Arc<std::sync::atomic::AtomicBool>,
    pub compact_blocks: Option<CompactBlocksInfo>,
    pub fee_rate: Option<u64>,
    pub connected_at: Instant,
    /// Handle of the background receive-loop task; aborted on `disconnect`.
    pub task: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy)]
pub struct CompactBlocksInfo {
    pub announce: bool,
    pub version: u64,
}

impl PeerSlot {
    fn new(ip: Ipv4Addr, port: u16, socket: TcpStream) -> Self {
        Self {
            ip,
            port,
            socket: Arc::new(AsyncMutex::new(socket)),
            connected: true,
            operation_in_progress: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            compact_blocks: None,
            fee_rate: None,
            connected_at: Instant::now(),
            task: None,
        }
    }
}

/// The fixed-capacity table of live peer sessions.
pub struct ConnectionRegistry {
    slots: AsyncMutex<Vec<Option<PeerSlot>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(REGISTRY_CAPACITY);
        slots.resize_with(REGISTRY_CAPACITY, || None);
        Self {
            slots: AsyncMutex::new(slots),
        }
    }

    /// Allocate a free slot for a freshly handshaken peer, returning its
    /// index. A slot is free either because it was never used (`None`) or
    /// because its previous occupant dropped on its own and `receive_loop`
    /// marked it `connected=false` without freeing it (§4.4.3: "the slot
    /// becomes reusable the next time an operation observes
    /// `connected==false`") — this is that observation. The stale task, if
    /// still present, is aborted before the slot is overwritten.
    pub async fn insert(
        &self,
        ip: Ipv4Addr,
        port: u16,
        socket: TcpStream,
    ) -> RegistryResult<usize> {
        let mut slots = self.slots.lock().await;
        let idx = slots
            .iter()
            .position(|s| matches!(s, None | Some(PeerSlot { connected: false, .. })))
            .ok_or(RegistryError::Full)?;
        if let Some(stale) = slots[idx].take().and_then(|s| s.task) {
            stale.abort();
        }
        slots[idx] = Some(PeerSlot::new(ip, port, socket));
        Ok(idx)
    }

    /// Attach the session task's `JoinHandle` to a slot after it has been
    /// spawned (the handle does not exist until after `insert`).
    pub async fn set_task(&self, idx: usize, task: JoinHandle<()>) -> RegistryResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(idx)
            .and_then(|s| s.as_mut())
            .ok_or(RegistryError::NotFound(idx))?;
        slot.task = Some(task);
        Ok(())
    }

    /// Linear lookup by IP among currently populated slots.
    pub async fn index_of_ip(&self, ip: Ipv4Addr) -> Option<usize> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .position(|s| matches!(s, Some(slot) if slot.ip == ip))
    }

    pub async fn is_connected(&self, idx: usize) -> bool {
        let slots = self.slots.lock().await;
        matches!(slots.get(idx), Some(Some(slot)) if slot.connected)
    }

    /// Shared handle to a connected peer's socket and baton flag, used by
    /// C5 operations without holding the whole-registry lock across I/O.
    pub async fn socket_handle(
        &self,
        idx: usize,
    ) -> RegistryResult<(SharedSocket, Arc<std::sync::atomic::AtomicBool>)> {
        let slots = self.slots.lock().await;
        let slot = slots
            .get(idx)
            .and_then(|s| s.as_ref())
            .ok_or(RegistryError::NotFound(idx))?;
        if !slot.connected {
            return Err(RegistryError::NotFound(idx));
        }
        Ok((slot.socket.clone(), slot.operation_in_progress.clone()))
    }

    pub async fn mark_disconnected(&self, idx: usize) -> RegistryResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(idx)
            .and_then(|s| s.as_mut())
            .ok_or(RegistryError::NotFound(idx))?;
        slot.connected = false;
        Ok(())
    }

    pub async fn set_compact_blocks(&self, idx: usize, info: CompactBlocksInfo) -> RegistryResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(idx)
            .and_then(|s| s.as_mut())
            .ok_or(RegistryError::NotFound(idx))?;
        slot.compact_blocks = Some(info);
        Ok(())
    }

    pub async fn set_fee_rate(&self, idx: usize, fee_rate: u64) -> RegistryResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(idx)
            .and_then(|s| s.as_mut())
            .ok_or(RegistryError::NotFound(idx))?;
        slot.fee_rate = Some(fee_rate);
        Ok(())
    }

    /// Close the socket and abort the session task. The slot itself is
    /// freed (set to `None`) so it can be reused by a future `connect`.
    pub async fn disconnect(&self, idx: usize) -> RegistryResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(idx)
            .ok_or(RegistryError::NotFound(idx))?
            .take()
            .ok_or(RegistryError::NotFound(idx))?;
        if let Some(task) = slot.task {
            task.abort();
        }
        Ok(())
    }

    /// A point-in-time snapshot for `list`, `(index, ip, port, connected)`.
    pub async fn snapshot(&self) -> Vec<(usize, Ipv4Addr, u16, bool)> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|s| (idx, s.ip, s.port, s.connected)))
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
