/// Peer-session task (C4)
///
/// Per-peer handshake, receive loop, and keep-alive. The handshake runs on
/// the command thread inside `connect`; once it completes, the receive
/// loop is spawned as its own `tokio` task and detached, mutating only its
/// own registry slot from then on.
use crate::config::Config;
use crate::error::{OperationError, SessionError, SessionResult};
use crate::headers_store::HeadersStore;
use crate::peer_queue::PeerQueue;
use crate::random::random_u64;
use crate::registry::{CompactBlocksInfo, ConnectionRegistry};
use crate::wire::{
    self, build_message, build_version_payload, dsha256, parse_feefilter_payload, parse_header,
    parse_inv_payload, parse_sendcmpct_payload, parse_version_payload, verify_checksum, Inventory,
    InventoryType, MessageHeader, NetAddr, VersionFields,
};
use socket2::{Domain, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_MAX_ITERATIONS: u32 = 4;
const SESSION_RECV_TIMEOUT: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(5);
const OPERATION_YIELD_SLEEP: Duration = Duration::from_millis(50);

/// Dial `(ip, port)` with a 3-second connect timeout, setting `TCP_NODELAY`
/// at the socket level via `socket2`; the resulting stream is handed back
/// nonblocking so `tokio` can drive it.
async fn connect_with_timeout(ip: Ipv4Addr, port: u16) -> SessionResult<TcpStream> {
    let addr = SocketAddr::from((ip, port));
    let std_stream = tokio::task::spawn_blocking(move || -> std::io::Result<std::net::TcpStream> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_nodelay(true)?;
        socket.connect_timeout(&addr.into(), HANDSHAKE_TIMEOUT)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    })
    .await
    .map_err(|e| SessionError::Handshake(e.to_string()))?
    .map_err(SessionError::Io)?;
    TcpStream::from_std(std_stream).map_err(SessionError::Io)
}

/// Read one complete framed message off `stream`, bounded by `timeout`.
/// `read_exact` naturally loops through partial reads; once the 24-byte
/// header is in hand the payload length is known and read in full before
/// returning.
async fn read_framed(
    stream: &mut TcpStream,
    timeout: Duration,
) -> SessionResult<(MessageHeader, Vec<u8>)> {
    let fut = async {
        let mut header_bytes = [0u8; wire::HEADER_SIZE];
        stream.read_exact(&mut header_bytes).await?;
        let header = parse_header(&header_bytes).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header")
        })?;
        let mut payload = vec![0u8; header.length as usize];
        stream.read_exact(&mut payload).await?;
        Ok::<_, std::io::Error>((header, payload))
    };
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok((header, payload))) => Ok((header, payload)),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SessionError::PeerClosed),
        Ok(Err(e)) => Err(SessionError::Io(e)),
        Err(_) => Err(SessionError::Timeout),
    }
}

fn our_version_payload(ip: Ipv4Addr, port: u16) -> Vec<u8> {
    let fields = VersionFields {
        protocol_version: wire::PROTOCOL_VERSION,
        services: 0,
        timestamp: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
        addr_recv: NetAddr::new(ip, port, 0),
        addr_from: NetAddr::new(Ipv4Addr::UNSPECIFIED, 0, 0),
        nonce: random_u64().unwrap_or(0),
        user_agent: wire::USER_AGENT.to_string(),
        start_height: 0,
        relay: false,
    };
    build_version_payload(&fields)
}

/// Perform the `version`/`verack` handshake against `(ip, port)` and, on
/// success, register the session and spawn its receive-loop task.
pub async fn connect(
    ip: Ipv4Addr,
    port: u16,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<PeerQueue>,
    headers: Arc<HeadersStore>,
    config: Arc<Config>,
) -> SessionResult<usize> {
    let mut stream = connect_with_timeout(ip, port).await?;

    let version_payload = our_version_payload(ip, port);
    stream
        .write_all(&build_message("version", &version_payload))
        .await
        .map_err(SessionError::Io)?;

    let mut saw_version = false;
    let mut handshake_done = false;
    for _ in 0..HANDSHAKE_MAX_ITERATIONS {
        match read_framed(&mut stream, HANDSHAKE_TIMEOUT).await {
            Ok((header, payload)) => {
                if verify_checksum(&payload, header.checksum).is_err() {
                    continue;
                }
                match header.command_str().as_str() {
                    "version" => {
                        if parse_version_payload(&payload).is_ok() {
                            saw_version = true;
                            stream
                                .write_all(&build_message("verack", &[]))
                                .await
                                .map_err(SessionError::Io)?;
                        }
                    }
                    "verack" => {
                        handshake_done = true;
                        break;
                    }
                    _ => continue,
                }
            }
            Err(SessionError::Timeout) => continue,
            Err(e) => return Err(e),
        }
    }

    if !handshake_done {
        let reason = if saw_version {
            "peer never sent verack"
        } else {
            "peer never sent version"
        };
        return Err(SessionError::Handshake(reason.to_string()));
    }

    let idx = registry
        .insert(ip, port, stream)
        .await
        .map_err(|e| SessionError::Handshake(e.to_string()))?;

    let task_registry = registry.clone();
    let task = tokio::spawn(async move {
        receive_loop(idx, task_registry, queue, headers, config).await;
    });
    registry
        .set_task(idx, task)
        .await
        .map_err(|e| SessionError::Handshake(e.to_string()))?;

    info!(%ip, port, idx, "peer handshake complete");
    Ok(idx)
}

/// The receive-loop task body: owns no state of its own beyond `last_ping`
/// and a batch buffer for `inv`; everything else lives in the registry
/// slot it was handed.
async fn receive_loop(
    idx: usize,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<PeerQueue>,
    headers: Arc<HeadersStore>,
    config: Arc<Config>,
) {
    let (socket, operation_in_progress) = match registry.socket_handle(idx).await {
        Ok(handle) => handle,
        Err(_) => return,
    };

    let mut last_ping = tokio::time::Instant::now();

    loop {
        if operation_in_progress.load(Ordering::Acquire) {
            tokio::time::sleep(OPERATION_YIELD_SLEEP).await;
            continue;
        }

        if last_ping.elapsed() >= PING_INTERVAL {
            let nonce = random_u64().unwrap_or(0);
            let mut guard = socket.lock().await;
            if guard
                .write_all(&build_message("ping", &nonce.to_le_bytes()))
                .await
                .is_err()
            {
                break;
            }
            drop(guard);
            last_ping = tokio::time::Instant::now();
        }

        let frame = {
            let mut guard = socket.lock().await;
            read_framed(&mut guard, SESSION_RECV_TIMEOUT).await
        };

        match frame {
            Ok((header, payload)) => {
                if verify_checksum(&payload, header.checksum).is_err() {
                    warn!(idx, "checksum mismatch, dropping message");
                    continue;
                }
                if let Err(e) =
                    dispatch(idx, &header, &payload, &registry, &queue, &headers, &config, &socket)
                        .await
                {
                    warn!(idx, error = %e, "error handling inbound message");
                }
            }
            Err(SessionError::Timeout) => continue,
            Err(SessionError::PeerClosed) => {
                info!(idx, "peer closed connection");
                let _ = registry.mark_disconnected(idx).await;
                break;
            }
            Err(e) => {
                warn!(idx, error = %e, "fatal session error");
                let _ = registry.mark_disconnected(idx).await;
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    idx: usize,
    header: &MessageHeader,
    payload: &[u8],
    registry: &Arc<ConnectionRegistry>,
    queue: &Arc<PeerQueue>,
    headers: &Arc<HeadersStore>,
    config: &Arc<Config>,
    socket: &crate::registry::SharedSocket,
) -> Result<(), OperationError> {
    match header.command_str().as_str() {
        "ping" => {
            let nonce = crate::wire::parse_nonce_payload(payload)?;
            let mut guard = socket.lock().await;
            guard
                .write_all(&build_message("pong", &crate::wire::build_pong_payload(nonce)))
                .await
                .map_err(SessionError::Io)?;
        }
        "getaddr" => {
            let snapshot = queue.snapshot().await;
            let addrs: Vec<NetAddr> = snapshot
                .iter()
                .take(wire::MAX_ADDR_RECORDS)
                .map(|p| NetAddr::new(p.ip, p.port, 0))
                .collect();
            let payload = crate::wire::build_addr_payload(&addrs);
            let mut guard = socket.lock().await;
            guard
                .write_all(&build_message("addr", &payload))
                .await
                .map_err(SessionError::Io)?;
        }
        "getheaders" => {
            let locator = crate::wire::parse_locator_payload(payload)?;
            let start = locator.locator.first().copied().unwrap_or([0u8; 32]);
            let found = headers
                .range(start, locator.stop)
                .await
                .map_err(SessionError::Io)?;
            let response = crate::wire::build_headers_payload(&found);
            let mut guard = socket.lock().await;
            guard
                .write_all(&build_message("headers", &response))
                .await
                .map_err(SessionError::Io)?;
        }
        "getblocks" => {
            reply_with_scratch_file_or_notfound(socket, &config.blocks_scratch_path(), "getblocks")
                .await?;
        }
        "getdata" => {
            reply_with_scratch_file_or_notfound(socket, &config.data_scratch_path(), "getdata")
                .await?;
        }
        "inv" => {
            let items = parse_inv_payload(payload)?;
            let block_hashes: Vec<[u8; 32]> = items
                .iter()
                .filter(|i| i.kind == InventoryType::Block)
                .map(|i| i.hash)
                .collect();
            if !block_hashes.is_empty() {
                let getdata_items: Vec<Inventory> =
                    block_hashes.iter().map(|h| Inventory::block(*h)).collect();
                let response = crate::wire::build_getdata_payload(&getdata_items);
                let mut guard = socket.lock().await;
                guard
                    .write_all(&build_message("getdata", &response))
                    .await
                    .map_err(SessionError::Io)?;
            }
        }
        "sendcmpct" => {
            let fields = parse_sendcmpct_payload(payload)?;
            registry
                .set_compact_blocks(
                    idx,
                    CompactBlocksInfo {
                        announce: fields.announce,
                        version: fields.version,
                    },
                )
                .await
                .ok();
        }
        "feefilter" => {
            let fee_rate = parse_feefilter_payload(payload)?;
            registry.set_fee_rate(idx, fee_rate).await.ok();
        }
        other => {
            debug!(idx, command = other, "unhandled inbound command, ignoring");
        }
    }
    Ok(())
}

async fn reply_with_scratch_file_or_notfound(
    socket: &crate::registry::SharedSocket,
    path: &std::path::Path,
    command: &str,
) -> Result<(), OperationError> {
    let mut guard = socket.lock().await;
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            guard
                .write_all(&build_message(command, &bytes))
                .await
                .map_err(SessionError::Io)?;
        }
        Err(_) => {
            guard
                .write_all(&build_message("notfound", &[]))
                .await
                .map_err(SessionError::Io)?;
        }
    }
    Ok(())
}

/// The block hash as actually computed (`dsha256`), exposed for callers
/// that need to cross-check a header against the headers store.
pub fn block_hash(header: &[u8; wire::BLOCK_HEADER_SIZE]) -> [u8; 32] {
    dsha256(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::build_ping_payload;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn read_framed_reassembles_a_message_delivered_in_two_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let msg = build_message("ping", &build_ping_payload(123));
        let writer = tokio::spawn({
            let msg = msg.clone();
            async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream.write_all(&msg[..10]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                stream.write_all(&msg[10..]).await.unwrap();
            }
        });
        let (mut server, _) = listener.accept().await.unwrap();
        let (header, payload) = read_framed(&mut server, Duration::from_secs(1)).await.unwrap();
        assert_eq!(header.command_str(), "ping");
        assert_eq!(payload, build_ping_payload(123));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn read_framed_times_out_when_nothing_arrives() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();
        let result = read_framed(&mut server, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SessionError::Timeout)));
    }

    #[tokio::test]
    async fn handshake_completes_against_a_simulated_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let fake_peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (header, _payload) = read_framed(&mut stream, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(header.command_str(), "version");

            let their_version = our_version_payload(Ipv4Addr::new(127, 0, 0, 1), addr.port());
            stream
                .write_all(&build_message("version", &their_version))
                .await
                .unwrap();
            let (header, _) = read_framed(&mut stream, Duration::from_secs(1)).await.unwrap();
            assert_eq!(header.command_str(), "verack");
            stream.write_all(&build_message("verack", &[])).await.unwrap();
        });

        let registry = Arc::new(ConnectionRegistry::new());
        let queue = Arc::new(PeerQueue::new());
        let dir = tempfile::tempdir().unwrap();
        let headers = Arc::new(HeadersStore::new(dir.path().join("headers.dat")));
        let config = Arc::new(Config {
            home: dir.path().to_path_buf(),
            data_dir: dir.path().to_path_buf(),
            logs_dir: dir.path().to_path_buf(),
            history_dir: dir.path().to_path_buf(),
            verbose: false,
            user: "test".to_string(),
        });

        let idx = connect(
            Ipv4Addr::new(127, 0, 0, 1),
            addr.port(),
            registry.clone(),
            queue,
            headers,
            config,
        )
        .await
        .unwrap();

        assert!(registry.is_connected(idx).await);
        fake_peer.await.unwrap();
        registry.disconnect(idx).await.unwrap();
    }
}
