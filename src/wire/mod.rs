/// Bitcoin P2P wire codec
///
/// Exact framing of the 24-byte message header, double-SHA256 checksums,
/// `var_int`, and the payload layouts for every message this client speaks.
/// Every multi-byte field is little-endian on the wire except the 16-bit
/// port inside a network address record, which is big-endian; each
/// encoder/decoder below is explicit about which rule applies rather than
/// relying on host endianness.
pub mod addr;
pub mod header;
pub mod messages;
pub mod varint;

#[cfg(test)]
mod tests;

pub use addr::{
    build_addr_payload, is_in_private_network, is_numeric_address, parse_addr_payload, NetAddr,
};
pub use header::{build_message, dsha256, parse_header, verify_checksum, MessageHeader};
pub use messages::*;
pub use varint::{read_var_int, write_var_int};

/// Bitcoin mainnet magic bytes.
pub const MAINNET_MAGIC: u32 = 0xD9B4_BEF9;

/// Default Bitcoin mainnet TCP port.
pub const MAINNET_PORT: u16 = 8333;

/// Protocol version advertised in our `version` message.
pub const PROTOCOL_VERSION: i32 = 70015;

/// User agent advertised in our `version` message.
pub const USER_AGENT: &str = "/Satoshi:0.1.0/";

/// Checksum of an empty payload: first 4 bytes of `dsha256(b"")`.
pub const EMPTY_PAYLOAD_CHECKSUM: u32 = 0xE2E0_F65D;

/// Size in bytes of a serialized message header.
pub const HEADER_SIZE: usize = 24;

/// Size in bytes of a block header record (no transaction count).
pub const BLOCK_HEADER_SIZE: usize = 80;

/// Inventory type tags (`inv`/`getdata`/`notfound`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CompactBlock,
    Other(u32),
}

impl InventoryType {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => InventoryType::Error,
            1 => InventoryType::Tx,
            2 => InventoryType::Block,
            3 => InventoryType::FilteredBlock,
            4 => InventoryType::CompactBlock,
            other => InventoryType::Other(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            InventoryType::Error => 0,
            InventoryType::Tx => 1,
            InventoryType::Block => 2,
            InventoryType::FilteredBlock => 3,
            InventoryType::CompactBlock => 4,
            InventoryType::Other(v) => v,
        }
    }
}

/// A single inventory vector: 4-byte type tag + 32-byte hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inventory {
    pub kind: InventoryType,
    pub hash: [u8; 32],
}

impl Inventory {
    pub fn block(hash: [u8; 32]) -> Self {
        Self {
            kind: InventoryType::Block,
            hash,
        }
    }

    pub fn tx(hash: [u8; 32]) -> Self {
        Self {
            kind: InventoryType::Tx,
            hash,
        }
    }
}

/// Maximum `addr` records accepted in one message (§8 boundary behavior).
pub const MAX_ADDR_RECORDS: usize = 1000;

/// Maximum inventory vectors accepted in one `inv`/`getdata` message.
pub const MAX_INV_VECTORS: usize = 50_000;

/// Maximum headers accepted/returned in one `headers`/`getheaders` exchange.
pub const MAX_HEADERS: usize = 2000;
