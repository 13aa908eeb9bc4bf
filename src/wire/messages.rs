/// Payload builders and parsers for every command this client speaks.
use crate::error::{CodecError, CodecResult};
use crate::wire::addr::{read_version_addr, write_version_addr, NetAddr};
use crate::wire::varint::{read_var_int, write_var_int};
use crate::wire::{Inventory, InventoryType, BLOCK_HEADER_SIZE, MAX_HEADERS, MAX_INV_VECTORS};

/// `version` payload, fixed-layout fields followed by a `var_str` user agent
/// and a trailing 4-byte start height and relay flag.
pub struct VersionFields {
    pub protocol_version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub addr_recv: NetAddr,
    pub addr_from: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

/// Write a Bitcoin `var_str`: a `var_int` byte-length followed by UTF-8 bytes.
fn write_var_str(out: &mut Vec<u8>, s: &str) {
    write_var_int(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn read_var_str(buf: &[u8], cursor: &mut usize) -> CodecResult<String> {
    let len = read_var_int(buf, cursor)? as usize;
    if buf.len() < *cursor + len {
        return Err(CodecError::Truncated {
            need: *cursor + len,
            have: buf.len(),
        });
    }
    let s = String::from_utf8_lossy(&buf[*cursor..*cursor + len]).into_owned();
    *cursor += len;
    Ok(s)
}

pub fn build_version_payload(fields: &VersionFields) -> Vec<u8> {
    let mut out = Vec::with_capacity(90 + fields.user_agent.len());
    out.extend_from_slice(&fields.protocol_version.to_le_bytes());
    out.extend_from_slice(&fields.services.to_le_bytes());
    out.extend_from_slice(&fields.timestamp.to_le_bytes());
    write_version_addr(&mut out, &fields.addr_recv);
    write_version_addr(&mut out, &fields.addr_from);
    out.extend_from_slice(&fields.nonce.to_le_bytes());
    write_var_str(&mut out, &fields.user_agent);
    out.extend_from_slice(&fields.start_height.to_le_bytes());
    out.push(fields.relay as u8);
    out
}

pub fn parse_version_payload(payload: &[u8]) -> CodecResult<VersionFields> {
    let mut cursor = 0usize;
    let need = |cursor: usize, n: usize| -> CodecResult<()> {
        if payload.len() < cursor + n {
            Err(CodecError::Truncated {
                need: cursor + n,
                have: payload.len(),
            })
        } else {
            Ok(())
        }
    };

    need(cursor, 4)?;
    let protocol_version =
        i32::from_le_bytes(payload[cursor..cursor + 4].try_into().unwrap());
    cursor += 4;

    need(cursor, 8)?;
    let services = u64::from_le_bytes(payload[cursor..cursor + 8].try_into().unwrap());
    cursor += 8;

    need(cursor, 8)?;
    let timestamp = i64::from_le_bytes(payload[cursor..cursor + 8].try_into().unwrap());
    cursor += 8;

    let addr_recv = read_version_addr(payload, &mut cursor)?;
    let addr_from = read_version_addr(payload, &mut cursor)?;

    need(cursor, 8)?;
    let nonce = u64::from_le_bytes(payload[cursor..cursor + 8].try_into().unwrap());
    cursor += 8;

    let user_agent = read_var_str(payload, &mut cursor)?;

    need(cursor, 4)?;
    let start_height = i32::from_le_bytes(payload[cursor..cursor + 4].try_into().unwrap());
    cursor += 4;

    need(cursor, 1)?;
    let relay = payload[cursor] != 0;

    Ok(VersionFields {
        protocol_version,
        services,
        timestamp,
        addr_recv,
        addr_from,
        nonce,
        user_agent,
        start_height,
        relay,
    })
}

/// `ping`/`pong` share an 8-byte nonce payload.
pub fn build_ping_payload(nonce: u64) -> Vec<u8> {
    nonce.to_le_bytes().to_vec()
}

pub fn build_pong_payload(nonce: u64) -> Vec<u8> {
    nonce.to_le_bytes().to_vec()
}

pub fn parse_nonce_payload(payload: &[u8]) -> CodecResult<u64> {
    if payload.len() < 8 {
        return Err(CodecError::Truncated {
            need: 8,
            have: payload.len(),
        });
    }
    Ok(u64::from_le_bytes(payload[0..8].try_into().unwrap()))
}

/// An empty payload, used for `verack` and `getaddr`.
pub fn empty_payload() -> Vec<u8> {
    Vec::new()
}

/// `getheaders`/`getblocks` share a locator-based payload: protocol version,
/// `var_int` hash count, that many 32-byte hashes, then a single stop hash.
pub fn build_locator_payload(
    protocol_version: i32,
    locator: &[[u8; 32]],
    stop: [u8; 32],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&protocol_version.to_le_bytes());
    write_var_int(&mut out, locator.len() as u64);
    for hash in locator {
        out.extend_from_slice(hash);
    }
    out.extend_from_slice(&stop);
    out
}

pub fn build_getheaders_payload(locator: &[[u8; 32]], stop: [u8; 32]) -> Vec<u8> {
    build_locator_payload(crate::wire::PROTOCOL_VERSION, locator, stop)
}

pub fn build_getblocks_payload(locator: &[[u8; 32]], stop: [u8; 32]) -> Vec<u8> {
    build_locator_payload(crate::wire::PROTOCOL_VERSION, locator, stop)
}

pub struct LocatorFields {
    pub protocol_version: i32,
    pub locator: Vec<[u8; 32]>,
    pub stop: [u8; 32],
}

pub fn parse_locator_payload(payload: &[u8]) -> CodecResult<LocatorFields> {
    let mut cursor = 0usize;
    if payload.len() < cursor + 4 {
        return Err(CodecError::Truncated {
            need: cursor + 4,
            have: payload.len(),
        });
    }
    let protocol_version =
        i32::from_le_bytes(payload[cursor..cursor + 4].try_into().unwrap());
    cursor += 4;

    let count = read_var_int(payload, &mut cursor)?;
    let mut locator = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if payload.len() < cursor + 32 {
            return Err(CodecError::Truncated {
                need: cursor + 32,
                have: payload.len(),
            });
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&payload[cursor..cursor + 32]);
        locator.push(hash);
        cursor += 32;
    }

    if payload.len() < cursor + 32 {
        return Err(CodecError::Truncated {
            need: cursor + 32,
            have: payload.len(),
        });
    }
    let mut stop = [0u8; 32];
    stop.copy_from_slice(&payload[cursor..cursor + 32]);

    Ok(LocatorFields {
        protocol_version,
        locator,
        stop,
    })
}

/// `inv`/`getdata`/`notfound` payload: `var_int` count then that many
/// inventory vectors.
pub fn build_inv_payload(inventory: &[Inventory]) -> Vec<u8> {
    let mut out = Vec::new();
    write_var_int(&mut out, inventory.len() as u64);
    for item in inventory {
        out.extend_from_slice(&item.kind.to_u32().to_le_bytes());
        out.extend_from_slice(&item.hash);
    }
    out
}

pub fn build_getdata_payload(inventory: &[Inventory]) -> Vec<u8> {
    build_inv_payload(inventory)
}

pub fn parse_inv_payload(payload: &[u8]) -> CodecResult<Vec<Inventory>> {
    let mut cursor = 0usize;
    let count = read_var_int(payload, &mut cursor)?;
    if count as usize > MAX_INV_VECTORS {
        return Err(CodecError::CountExceeded {
            what: "inventory vectors",
            max: MAX_INV_VECTORS,
            got: count as usize,
        });
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if payload.len() < cursor + 36 {
            return Err(CodecError::Truncated {
                need: cursor + 36,
                have: payload.len(),
            });
        }
        let kind = InventoryType::from_u32(u32::from_le_bytes(
            payload[cursor..cursor + 4].try_into().unwrap(),
        ));
        cursor += 4;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&payload[cursor..cursor + 32]);
        cursor += 32;
        out.push(Inventory { kind, hash });
    }
    Ok(out)
}

/// `headers` payload: `var_int` count then, per header, 80 bytes followed
/// by a `var_int` transaction count (always `0` on the wire for this
/// message, since the block bodies are not sent).
pub fn build_headers_payload(headers: &[[u8; BLOCK_HEADER_SIZE]]) -> Vec<u8> {
    let mut out = Vec::new();
    write_var_int(&mut out, headers.len() as u64);
    for header in headers {
        out.extend_from_slice(header);
        write_var_int(&mut out, 0);
    }
    out
}

pub fn parse_headers_payload(payload: &[u8]) -> CodecResult<Vec<[u8; BLOCK_HEADER_SIZE]>> {
    let mut cursor = 0usize;
    let count = read_var_int(payload, &mut cursor)?;
    if count as usize > MAX_HEADERS {
        return Err(CodecError::CountExceeded {
            what: "headers",
            max: MAX_HEADERS,
            got: count as usize,
        });
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if payload.len() < cursor + BLOCK_HEADER_SIZE {
            return Err(CodecError::Truncated {
                need: cursor + BLOCK_HEADER_SIZE,
                have: payload.len(),
            });
        }
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header.copy_from_slice(&payload[cursor..cursor + BLOCK_HEADER_SIZE]);
        cursor += BLOCK_HEADER_SIZE;
        let _tx_count = read_var_int(payload, &mut cursor)?;
        out.push(header);
    }
    Ok(out)
}

/// `sendcmpct` payload: a single announce-flag byte then a little-endian
/// `u64` version.
pub struct SendCmpctFields {
    pub announce: bool,
    pub version: u64,
}

pub fn parse_sendcmpct_payload(payload: &[u8]) -> CodecResult<SendCmpctFields> {
    if payload.len() < 9 {
        return Err(CodecError::Truncated {
            need: 9,
            have: payload.len(),
        });
    }
    Ok(SendCmpctFields {
        announce: payload[0] != 0,
        version: u64::from_le_bytes(payload[1..9].try_into().unwrap()),
    })
}

pub fn build_sendcmpct_payload(fields: &SendCmpctFields) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(fields.announce as u8);
    out.extend_from_slice(&fields.version.to_le_bytes());
    out
}

/// `feefilter` payload: a single little-endian `u64` fee rate, satoshis/kvB.
pub fn parse_feefilter_payload(payload: &[u8]) -> CodecResult<u64> {
    if payload.len() < 8 {
        return Err(CodecError::Truncated {
            need: 8,
            have: payload.len(),
        });
    }
    Ok(u64::from_le_bytes(payload[0..8].try_into().unwrap()))
}

pub fn build_feefilter_payload(fee_rate: u64) -> Vec<u8> {
    fee_rate.to_le_bytes().to_vec()
}

/// A minimal non-segwit transaction decode, enough to report txid and
/// input/output counts. Segwit-flagged transactions are rejected rather
/// than mis-parsed (segwit parsing is out of scope).
pub struct DecodedTransaction {
    pub version: i32,
    pub input_count: u64,
    pub output_count: u64,
    pub lock_time: u32,
    pub txid: [u8; 32],
}

pub fn decode_transaction(raw: &[u8]) -> CodecResult<DecodedTransaction> {
    let (tx, _) = decode_transaction_at(raw, 0)?;
    Ok(tx)
}

/// As [`decode_transaction`], but starting at `start` and returning the
/// cursor position just past the transaction, so callers can decode a
/// sequence of transactions packed back to back (as in a `block` payload).
pub fn decode_transaction_at(raw: &[u8], start: usize) -> CodecResult<(DecodedTransaction, usize)> {
    let mut cursor = start;
    if raw.len() < cursor + 4 {
        return Err(CodecError::Truncated {
            need: cursor + 4,
            have: raw.len(),
        });
    }
    let version = i32::from_le_bytes(raw[cursor..cursor + 4].try_into().unwrap());
    cursor += 4;

    if raw.len() > cursor + 1 && raw[cursor] == 0x00 && raw[cursor + 1] != 0x00 {
        return Err(CodecError::InvalidAddress);
    }

    let input_count = read_var_int(raw, &mut cursor)?;
    for _ in 0..input_count {
        if raw.len() < cursor + 36 {
            return Err(CodecError::Truncated {
                need: cursor + 36,
                have: raw.len(),
            });
        }
        cursor += 36; // previous outpoint: 32-byte txid + 4-byte index
        let script_len = read_var_int(raw, &mut cursor)? as usize;
        if raw.len() < cursor + script_len + 4 {
            return Err(CodecError::Truncated {
                need: cursor + script_len + 4,
                have: raw.len(),
            });
        }
        cursor += script_len + 4; // scriptSig + sequence
    }

    let output_count = read_var_int(raw, &mut cursor)?;
    for _ in 0..output_count {
        if raw.len() < cursor + 8 {
            return Err(CodecError::Truncated {
                need: cursor + 8,
                have: raw.len(),
            });
        }
        cursor += 8; // value
        let script_len = read_var_int(raw, &mut cursor)? as usize;
        if raw.len() < cursor + script_len {
            return Err(CodecError::Truncated {
                need: cursor + script_len,
                have: raw.len(),
            });
        }
        cursor += script_len;
    }

    if raw.len() < cursor + 4 {
        return Err(CodecError::Truncated {
            need: cursor + 4,
            have: raw.len(),
        });
    }
    let lock_time = u32::from_le_bytes(raw[cursor..cursor + 4].try_into().unwrap());
    cursor += 4;

    let txid = crate::wire::header::dsha256(&raw[start..cursor]);

    Ok((
        DecodedTransaction {
            version,
            input_count,
            output_count,
            lock_time,
            txid,
        },
        cursor,
    ))
}

/// Decode a `block` payload: an 80-byte header followed by a `var_int`
/// transaction count and that many transactions, back to back.
pub fn decode_block_transactions(raw: &[u8]) -> CodecResult<Vec<DecodedTransaction>> {
    if raw.len() < BLOCK_HEADER_SIZE {
        return Err(CodecError::Truncated {
            need: BLOCK_HEADER_SIZE,
            have: raw.len(),
        });
    }
    let mut cursor = BLOCK_HEADER_SIZE;
    let tx_count = read_var_int(raw, &mut cursor)?;
    let mut txs = Vec::with_capacity(tx_count as usize);
    for _ in 0..tx_count {
        let (tx, next) = decode_transaction_at(raw, cursor)?;
        cursor = next;
        txs.push(tx);
    }
    Ok(txs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_version() -> VersionFields {
        VersionFields {
            protocol_version: 70015,
            services: 0,
            timestamp: 1_700_000_000,
            addr_recv: NetAddr::new(Ipv4Addr::new(1, 2, 3, 4), 8333, 0),
            addr_from: NetAddr::new(Ipv4Addr::new(0, 0, 0, 0), 0, 0),
            nonce: 0x1122_3344_5566_7788,
            user_agent: "/Satoshi:0.1.0/".to_string(),
            start_height: 0,
            relay: false,
        }
    }

    #[test]
    fn version_round_trips() {
        let fields = sample_version();
        let payload = build_version_payload(&fields);
        let parsed = parse_version_payload(&payload).unwrap();
        assert_eq!(parsed.protocol_version, fields.protocol_version);
        assert_eq!(parsed.nonce, fields.nonce);
        assert_eq!(parsed.user_agent, fields.user_agent);
        assert_eq!(parsed.addr_recv.ipv4(), fields.addr_recv.ipv4());
        assert!(!parsed.relay);
    }

    #[test]
    fn getheaders_round_trips_with_empty_locator() {
        let payload = build_getheaders_payload(&[], [0u8; 32]);
        let parsed = parse_locator_payload(&payload).unwrap();
        assert_eq!(parsed.protocol_version, crate::wire::PROTOCOL_VERSION);
        assert!(parsed.locator.is_empty());
        assert_eq!(parsed.stop, [0u8; 32]);
    }

    #[test]
    fn getheaders_round_trips_with_one_hash_locator() {
        let mut hash = [0u8; 32];
        hash[0] = 0xAB;
        let payload = build_getheaders_payload(&[hash], [0xFFu8; 32]);
        let parsed = parse_locator_payload(&payload).unwrap();
        assert_eq!(parsed.locator, vec![hash]);
        assert_eq!(parsed.stop, [0xFFu8; 32]);
    }

    #[test]
    fn inv_round_trips() {
        let items = vec![Inventory::block([1u8; 32]), Inventory::tx([2u8; 32])];
        let payload = build_inv_payload(&items);
        let parsed = parse_inv_payload(&payload).unwrap();
        assert_eq!(parsed, items);
    }

    #[test]
    fn headers_payload_round_trips() {
        let headers = vec![[7u8; BLOCK_HEADER_SIZE], [9u8; BLOCK_HEADER_SIZE]];
        let payload = build_headers_payload(&headers);
        let parsed = parse_headers_payload(&payload).unwrap();
        assert_eq!(parsed, headers);
    }

    #[test]
    fn ping_pong_nonce_round_trips() {
        let payload = build_ping_payload(42);
        assert_eq!(parse_nonce_payload(&payload).unwrap(), 42);
        let payload = build_pong_payload(42);
        assert_eq!(parse_nonce_payload(&payload).unwrap(), 42);
    }

    #[test]
    fn sendcmpct_round_trips() {
        let fields = SendCmpctFields {
            announce: true,
            version: 2,
        };
        let payload = build_sendcmpct_payload(&fields);
        let parsed = parse_sendcmpct_payload(&payload).unwrap();
        assert!(parsed.announce);
        assert_eq!(parsed.version, 2);
    }

    #[test]
    fn feefilter_round_trips() {
        let payload = build_feefilter_payload(1000);
        assert_eq!(parse_feefilter_payload(&payload).unwrap(), 1000);
    }

    #[test]
    fn decode_simple_coinbase_like_transaction() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes()); // version
        write_var_int(&mut raw, 1); // one input
        raw.extend_from_slice(&[0u8; 32]); // prev txid
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // prev index
        write_var_int(&mut raw, 0); // empty scriptSig
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // sequence
        write_var_int(&mut raw, 1); // one output
        raw.extend_from_slice(&5_000_000_000u64.to_le_bytes()); // value
        write_var_int(&mut raw, 0); // empty scriptPubKey
        raw.extend_from_slice(&0u32.to_le_bytes()); // locktime

        let decoded = decode_transaction(&raw).unwrap();
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.input_count, 1);
        assert_eq!(decoded.output_count, 1);
        assert_eq!(decoded.lock_time, 0);
    }

    #[test]
    fn segwit_marker_is_rejected() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes());
        raw.push(0x00); // marker
        raw.push(0x01); // flag
        assert!(decode_transaction(&raw).is_err());
    }

    fn simple_coinbase_like_tx() -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes());
        write_var_int(&mut raw, 1);
        raw.extend_from_slice(&[0u8; 32]);
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        write_var_int(&mut raw, 0);
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        write_var_int(&mut raw, 1);
        raw.extend_from_slice(&5_000_000_000u64.to_le_bytes());
        write_var_int(&mut raw, 0);
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw
    }

    #[test]
    fn decode_block_transactions_decodes_every_packed_transaction() {
        let mut raw = vec![0u8; BLOCK_HEADER_SIZE];
        write_var_int(&mut raw, 2);
        raw.extend_from_slice(&simple_coinbase_like_tx());
        raw.extend_from_slice(&simple_coinbase_like_tx());

        let txs = decode_block_transactions(&raw).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].txid, txs[1].txid);
    }
}
