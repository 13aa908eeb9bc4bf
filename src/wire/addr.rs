/// Network address records, as carried in `version`, `addr`, and the
/// peer queue's on-wire representation.
///
/// The 16-byte address field is an IPv4-mapped IPv6 address
/// (`::ffff:a.b.c.d`) regardless of whether the peer is actually reachable
/// over IPv6; the port is big-endian, unlike every other multi-byte field
/// in the protocol.
use crate::error::{CodecError, CodecResult};
use crate::wire::varint::{read_var_int, write_var_int};
use crate::wire::MAX_ADDR_RECORDS;
use std::net::Ipv4Addr;
use tracing::debug;

/// A single network address record (time + services + address + port).
///
/// The 16-byte address is kept in its raw on-wire form rather than
/// projected to `Ipv4Addr` eagerly: a native (non-v4-mapped) IPv6 record is
/// a valid `addr` entry that this client simply does not dial (see §1
/// Non-goals), so decoding it must not fail the whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddr {
    /// Unix timestamp the peer was last seen, absent from `version` payloads.
    pub time: Option<u32>,
    pub services: u64,
    pub addr: [u8; 16],
    pub port: u16,
}

const V4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

impl NetAddr {
    pub fn new(ip: Ipv4Addr, port: u16, services: u64) -> Self {
        let mut addr = [0u8; 16];
        addr[0..12].copy_from_slice(&V4_MAPPED_PREFIX);
        addr[12..16].copy_from_slice(&ip.octets());
        Self {
            time: None,
            services,
            addr,
            port,
        }
    }

    /// The IPv4 address this record carries, if it is v4-mapped.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.addr[0..12] == V4_MAPPED_PREFIX {
            Some(Ipv4Addr::new(
                self.addr[12],
                self.addr[13],
                self.addr[14],
                self.addr[15],
            ))
        } else {
            None
        }
    }

    fn write(&self, out: &mut Vec<u8>, with_time: bool) {
        if with_time {
            out.extend_from_slice(&self.time.unwrap_or(0).to_le_bytes());
        }
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.addr);
        out.extend_from_slice(&self.port.to_be_bytes());
    }

    fn read(buf: &[u8], cursor: &mut usize, with_time: bool) -> CodecResult<Self> {
        let need = |cursor: usize, n: usize| -> CodecResult<()> {
            if buf.len() < cursor + n {
                Err(CodecError::Truncated {
                    need: cursor + n,
                    have: buf.len(),
                })
            } else {
                Ok(())
            }
        };

        let time = if with_time {
            need(*cursor, 4)?;
            let t = u32::from_le_bytes(buf[*cursor..*cursor + 4].try_into().unwrap());
            *cursor += 4;
            Some(t)
        } else {
            None
        };

        need(*cursor, 26)?;
        let services = u64::from_le_bytes(buf[*cursor..*cursor + 8].try_into().unwrap());
        *cursor += 8;
        let mut addr = [0u8; 16];
        addr.copy_from_slice(&buf[*cursor..*cursor + 16]);
        *cursor += 16;
        let port = u16::from_be_bytes(buf[*cursor..*cursor + 2].try_into().unwrap());
        *cursor += 2;

        Ok(NetAddr {
            time,
            services,
            addr,
            port,
        })
    }
}

/// Build an `addr` message payload: a `var_int` count followed by that
/// many time-prefixed records.
pub fn build_addr_payload(addrs: &[NetAddr]) -> Vec<u8> {
    let mut out = Vec::new();
    write_var_int(&mut out, addrs.len() as u64);
    for addr in addrs {
        addr.write(&mut out, true);
    }
    out
}

/// Parse an `addr` message payload, rejecting more than [`MAX_ADDR_RECORDS`].
///
/// Every record decodes regardless of address family; it is the caller's
/// job (see [`NetAddr::ipv4`]) to decide which records are usable, logging
/// and skipping native IPv6 entries rather than failing the whole message.
pub fn parse_addr_payload(payload: &[u8]) -> CodecResult<Vec<NetAddr>> {
    let mut cursor = 0usize;
    let count = read_var_int(payload, &mut cursor)?;
    if count as usize > MAX_ADDR_RECORDS {
        return Err(CodecError::CountExceeded {
            what: "addr records",
            max: MAX_ADDR_RECORDS,
            got: count as usize,
        });
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let record = NetAddr::read(payload, &mut cursor, true)?;
        if record.ipv4().is_none() {
            debug!(addr = ?record.addr, "native IPv6 addr record, not dialable, keeping for display only");
        }
        out.push(record);
    }
    Ok(out)
}

/// Encode the address field of a `version` message, which has no leading
/// `time` field.
pub fn write_version_addr(out: &mut Vec<u8>, addr: &NetAddr) {
    addr.write(out, false);
}

/// Decode a `version` message's address field (no `time` field).
pub fn read_version_addr(buf: &[u8], cursor: &mut usize) -> CodecResult<NetAddr> {
    NetAddr::read(buf, cursor, false)
}

/// Whether `ip` falls in one of the RFC 1918 private ranges
/// (`10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16`).
pub fn is_in_private_network(ip: &Ipv4Addr) -> bool {
    let [b1, b2, ..] = ip.octets();
    (b1 == 10) || (b1 == 172 && (16..=31).contains(&b2)) || (b1 == 192 && b2 == 168)
}

/// Whether `addr` is a dotted-quad IPv4 literal rather than a hostname.
pub fn is_numeric_address(addr: &str) -> bool {
    addr.parse::<Ipv4Addr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_round_trips_with_time() {
        let mut first = NetAddr::new(Ipv4Addr::new(93, 184, 216, 34), 8333, 1);
        first.time = Some(1_700_000_000);
        let addrs = vec![first, NetAddr::new(Ipv4Addr::new(1, 2, 3, 4), 8333, 0)];
        let payload = build_addr_payload(&addrs);
        let parsed = parse_addr_payload(&payload).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].ipv4(), addrs[0].ipv4());
        assert_eq!(parsed[0].time, addrs[0].time);
        assert_eq!(parsed[1].port, 8333);
    }

    #[test]
    fn version_addr_has_no_time_field() {
        let addr = NetAddr::new(Ipv4Addr::new(8, 8, 8, 8), 8333, 0);
        let mut buf = Vec::new();
        write_version_addr(&mut buf, &addr);
        assert_eq!(buf.len(), 26);
        let mut cursor = 0;
        let back = read_version_addr(&buf, &mut cursor).unwrap();
        assert_eq!(back.ipv4(), addr.ipv4());
        assert_eq!(back.time, None);
    }

    #[test]
    fn rejects_addr_count_over_max() {
        let mut payload = Vec::new();
        write_var_int(&mut payload, (MAX_ADDR_RECORDS + 1) as u64);
        assert!(parse_addr_payload(&payload).is_err());
    }

    #[test]
    fn mixed_v4_and_native_v6_records_both_decode() {
        let v4 = NetAddr::new(Ipv4Addr::new(8, 8, 8, 8), 8333, 0);
        let mut v6 = v4;
        v6.addr = [
            0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
        ];
        let payload = build_addr_payload(&[v4, v6]);
        let parsed = parse_addr_payload(&payload).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].ipv4(), Some(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(parsed[1].ipv4(), None);
    }

    #[test]
    fn private_network_ranges() {
        assert!(is_in_private_network(&Ipv4Addr::new(192, 168, 1, 1)));
        assert!(is_in_private_network(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(is_in_private_network(&Ipv4Addr::new(172, 20, 0, 1)));
        assert!(!is_in_private_network(&Ipv4Addr::new(172, 15, 0, 1)));
        assert!(!is_in_private_network(&Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn numeric_vs_hostname() {
        assert!(is_numeric_address("127.0.0.1"));
        assert!(!is_numeric_address("dnsseed.bitcoin.dashjr.org"));
    }
}
