/// Operation requests (C5)
///
/// Synchronous request/response exchanges against a specific peer, issued
/// from the command thread. Each acquires the `operation_in_progress`
/// baton for the duration of the exchange so the peer's receive loop (C4)
/// yields the socket instead of racing it.
use crate::config::Config;
use crate::error::{OperationError, OperationResult, RegistryError, SessionError};
use crate::headers_store::HeadersStore;
use crate::peer_queue::PeerQueue;
use crate::registry::{ConnectionRegistry, SharedSocket};
use crate::wire::{
    self, build_getdata_payload, build_getheaders_payload, build_inv_payload, build_message,
    decode_block_transactions, parse_addr_payload, parse_header, parse_inv_payload,
    verify_checksum, DecodedTransaction, Inventory, InventoryType, MessageHeader,
};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

const GETADDR_RECV_TIMEOUT: Duration = Duration::from_secs(3);
const GETADDR_MAX_RETRIES: u32 = 4;
const GETHEADERS_WAIT: Duration = Duration::from_secs(10);
const GETBLOCKS_WAIT: Duration = Duration::from_secs(10);
const GETDATA_WAIT: Duration = Duration::from_secs(10);
const GETDATA_MAX_RETRIES: u32 = 4;
const INV_WAIT: Duration = Duration::from_secs(10);

/// Holds the `operation_in_progress` flag true for its lifetime, clearing
/// it unconditionally on drop — covers the timeout-abort and early-return
/// paths the same way the happy path is covered.
struct OperationBaton(Arc<AtomicBool>);

impl OperationBaton {
    /// Atomically claim the flag, failing with `SlotBusy` if another
    /// operation already holds it, rather than stomping over it with an
    /// unconditional store.
    fn try_acquire(idx: usize, flag: Arc<AtomicBool>) -> Result<Self, RegistryError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| RegistryError::SlotBusy(idx))
    }
}

impl Drop for OperationBaton {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn read_one(stream: &mut TcpStream, timeout: Duration) -> Result<(MessageHeader, Vec<u8>), SessionError> {
    let fut = async {
        let mut header_bytes = [0u8; wire::HEADER_SIZE];
        stream.read_exact(&mut header_bytes).await?;
        let header = parse_header(&header_bytes)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header"))?;
        let mut payload = vec![0u8; header.length as usize];
        stream.read_exact(&mut payload).await?;
        Ok::<_, std::io::Error>((header, payload))
    };
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SessionError::PeerClosed),
        Ok(Err(e)) => Err(SessionError::Io(e)),
        Err(_) => Err(SessionError::Timeout),
    }
}

/// Acquire the baton and the peer's shared socket in one step, mapping a
/// missing/disconnected slot onto [`OperationError::NotConnected`] and an
/// already-busy slot onto [`OperationError::Registry`]`(`[`RegistryError::SlotBusy`]`)`.
async fn acquire(
    registry: &ConnectionRegistry,
    idx: usize,
) -> OperationResult<(SharedSocket, OperationBaton)> {
    let (socket, flag) = registry
        .socket_handle(idx)
        .await
        .map_err(|_| OperationError::NotConnected(idx))?;
    let baton = OperationBaton::try_acquire(idx, flag)?;
    Ok((socket, baton))
}

/// `getaddr` then wait for the `addr` response, enqueueing every
/// v4-mapped, non-private, non-`0.0.0.0` IPv4 record into `queue`.
pub async fn send_getaddr_and_wait(
    registry: &ConnectionRegistry,
    queue: &PeerQueue,
    idx: usize,
) -> OperationResult<usize> {
    let (socket, _baton) = acquire(registry, idx).await?;
    let mut stream = socket.lock().await;

    stream
        .write_all(&build_message("getaddr", &[]))
        .await
        .map_err(SessionError::Io)?;

    for _ in 0..GETADDR_MAX_RETRIES {
        match read_one(&mut stream, GETADDR_RECV_TIMEOUT).await {
            Ok((header, payload)) if header.command_str() == "addr" => {
                if verify_checksum(&payload, header.checksum).is_err() {
                    continue;
                }
                let records = parse_addr_payload(&payload)?;
                let mut enqueued = 0usize;
                for record in &records {
                    if let Some(ip) = record.ipv4() {
                        if !wire::is_in_private_network(&ip) && !ip.is_unspecified() {
                            match queue.push(&ip.to_string(), record.port).await {
                                Ok(()) => enqueued += 1,
                                Err(e) => warn!(%ip, error = %e, "failed to enqueue peer candidate"),
                            }
                        }
                    }
                }
                return Ok(enqueued);
            }
            Ok(_) => continue,
            Err(SessionError::Timeout) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(OperationError::RetriesExhausted(GETADDR_MAX_RETRIES))
}

/// `getheaders` built from the latest known hash (or the genesis sentinel),
/// then wait up to 10s and append any received headers to `headers`.
pub async fn send_getheaders_and_wait(
    registry: &ConnectionRegistry,
    headers: &HeadersStore,
    idx: usize,
) -> OperationResult<usize> {
    let (socket, _baton) = acquire(registry, idx).await?;
    let mut stream = socket.lock().await;

    let locator_hash = headers.latest_hash().await.map_err(SessionError::Io)?;
    let payload = build_getheaders_payload(&[locator_hash], [0u8; 32]);
    stream
        .write_all(&build_message("getheaders", &payload))
        .await
        .map_err(SessionError::Io)?;

    let deadline = Instant::now() + GETHEADERS_WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(OperationError::Session(SessionError::Timeout));
        }
        match read_one(&mut stream, remaining).await {
            Ok((header, payload)) if header.command_str() == "headers" => {
                if verify_checksum(&payload, header.checksum).is_err() {
                    return Err(OperationError::Session(SessionError::Timeout));
                }
                let decoded = wire::parse_headers_payload(&payload)?;
                for h in &decoded {
                    headers.append(h).await.map_err(SessionError::Io)?;
                }
                return Ok(decoded.len());
            }
            Ok(_) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// `getblocks` built the same way as `getheaders`; the raw response is
/// persisted to `blocks.dat` verbatim and, best-effort, parsed as an `inv`
/// payload for display.
pub async fn send_getblocks_and_wait(
    registry: &ConnectionRegistry,
    headers: &HeadersStore,
    config: &Config,
    idx: usize,
) -> OperationResult<Option<Vec<Inventory>>> {
    let (socket, _baton) = acquire(registry, idx).await?;
    let mut stream = socket.lock().await;

    let locator_hash = headers.latest_hash().await.map_err(SessionError::Io)?;
    let payload = build_getheaders_payload(&[locator_hash], [0u8; 32]);
    stream
        .write_all(&build_message("getblocks", &payload))
        .await
        .map_err(SessionError::Io)?;

    let (_header, payload) = read_one(&mut stream, GETBLOCKS_WAIT)
        .await
        .map_err(OperationError::Session)?;

    tokio::fs::write(config.blocks_scratch_path(), &payload)
        .await
        .map_err(SessionError::Io)?;

    Ok(parse_inv_payload(&payload).ok())
}

/// `getdata` for each of `hashes` as a block-type inventory vector; reads
/// `block` messages until one has arrived for every requested hash (or the
/// retry budget on non-`block` replies runs out), decoding the transactions
/// of each.
pub async fn send_getdata_and_wait(
    registry: &ConnectionRegistry,
    idx: usize,
    hashes: &[[u8; 32]],
) -> OperationResult<Vec<DecodedTransaction>> {
    let (socket, _baton) = acquire(registry, idx).await?;
    let mut stream = socket.lock().await;

    let inventory: Vec<Inventory> = hashes.iter().map(|h| Inventory::block(*h)).collect();
    let payload = build_getdata_payload(&inventory);
    stream
        .write_all(&build_message("getdata", &payload))
        .await
        .map_err(SessionError::Io)?;

    let mut all_txs = Vec::new();
    let mut blocks_received = 0usize;
    let mut retries_left = GETDATA_MAX_RETRIES;
    while blocks_received < hashes.len() && retries_left > 0 {
        match read_one(&mut stream, GETDATA_WAIT).await {
            Ok((header, payload)) if header.command_str() == "block" => {
                if verify_checksum(&payload, header.checksum).is_err() {
                    retries_left -= 1;
                    continue;
                }
                match decode_block_transactions(&payload) {
                    Ok(txs) => all_txs.extend(txs),
                    Err(e) => warn!(idx, error = %e, "failed to decode block transactions"),
                }
                blocks_received += 1;
            }
            Ok(_) => {
                retries_left -= 1;
            }
            Err(SessionError::Timeout) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(all_txs)
}

/// Advertise `inventory` via `inv`, then wait for the peer's `inv` response
/// and re-dispatch it the same way the receive loop would: block-type
/// items trigger a follow-up `getdata`.
pub async fn send_inv_and_wait(
    registry: &ConnectionRegistry,
    idx: usize,
    inventory: &[Inventory],
) -> OperationResult<Vec<Inventory>> {
    let (socket, _baton) = acquire(registry, idx).await?;
    let mut stream = socket.lock().await;

    let payload = build_inv_payload(inventory);
    stream
        .write_all(&build_message("inv", &payload))
        .await
        .map_err(SessionError::Io)?;

    let (header, payload) = read_one(&mut stream, INV_WAIT)
        .await
        .map_err(OperationError::Session)?;
    if header.command_str() != "inv" {
        return Ok(Vec::new());
    }
    verify_checksum(&payload, header.checksum).map_err(OperationError::Codec)?;
    let items = parse_inv_payload(&payload)?;

    let block_hashes: Vec<Inventory> = items
        .iter()
        .filter(|i| i.kind == InventoryType::Block)
        .copied()
        .collect();
    if !block_hashes.is_empty() {
        let response = build_getdata_payload(&block_hashes);
        stream
            .write_all(&build_message("getdata", &response))
            .await
            .map_err(SessionError::Io)?;
    }
    Ok(items)
}

/// Frame and send a `tx` message; fire-and-forget, no response expected.
pub async fn send_tx(
    registry: &ConnectionRegistry,
    idx: usize,
    raw_tx: &[u8],
) -> OperationResult<()> {
    let (socket, _baton) = acquire(registry, idx).await?;
    let mut stream = socket.lock().await;
    stream
        .write_all(&build_message("tx", raw_tx))
        .await
        .map_err(SessionError::Io)?;
    Ok(())
}
