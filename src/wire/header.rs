/// The 24-byte Bitcoin P2P message header and payload checksum.
use crate::error::{CodecError, CodecResult};
use crate::wire::{EMPTY_PAYLOAD_CHECKSUM, HEADER_SIZE, MAINNET_MAGIC};
use sha2::{Digest, Sha256};

/// Double-SHA256 of `data`.
pub fn dsha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// A parsed 24-byte message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub magic: u32,
    pub command: [u8; 12],
    pub length: u32,
    pub checksum: u32,
}

impl MessageHeader {
    /// The command name with trailing zero padding stripped.
    pub fn command_str(&self) -> String {
        let end = self
            .command
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.command.len());
        String::from_utf8_lossy(&self.command[..end]).into_owned()
    }
}

fn pack_command(command: &str) -> CodecResult<[u8; 12]> {
    if command.len() > 12 {
        return Err(CodecError::CommandTooLong(command.to_string()));
    }
    let mut packed = [0u8; 12];
    packed[..command.len()].copy_from_slice(command.as_bytes());
    Ok(packed)
}

/// Compute the 4-byte checksum (first 4 bytes of `dsha256(payload)`) as a
/// little-endian `u32`, matching how it sits in the header.
pub fn payload_checksum(payload: &[u8]) -> u32 {
    if payload.is_empty() {
        return EMPTY_PAYLOAD_CHECKSUM;
    }
    let hash = dsha256(payload);
    u32::from_le_bytes(hash[0..4].try_into().unwrap())
}

/// Verify that `expected` matches the checksum of `payload`.
pub fn verify_checksum(payload: &[u8], expected: u32) -> CodecResult<()> {
    let got = payload_checksum(payload);
    if got == expected {
        Ok(())
    } else {
        Err(CodecError::ChecksumMismatch { expected, got })
    }
}

/// Build a complete message: 24-byte header followed by `payload` verbatim.
///
/// A `command` longer than 12 bytes is a programmer error (never a runtime
/// one per the design) and is truncated rather than rejected at this layer;
/// callers that construct commands from data should use [`pack_command`]
/// directly if they need the truncation-vs-error distinction.
pub fn build_message(command: &str, payload: &[u8]) -> Vec<u8> {
    let mut command_bytes = [0u8; 12];
    let truncated = &command.as_bytes()[..command.len().min(12)];
    command_bytes[..truncated.len()].copy_from_slice(truncated);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAINNET_MAGIC.to_le_bytes());
    out.extend_from_slice(&command_bytes);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload_checksum(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Build a message, returning an error if `command` does not fit in 12
/// bytes instead of silently truncating. Used where the command comes from
/// something other than a fixed string literal.
pub fn build_message_checked(command: &str, payload: &[u8]) -> CodecResult<Vec<u8>> {
    pack_command(command)?;
    Ok(build_message(command, payload))
}

/// Parse the first 24 bytes of `buf` as a message header.
pub fn parse_header(buf: &[u8]) -> CodecResult<MessageHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(CodecError::Truncated {
            need: HEADER_SIZE,
            have: buf.len(),
        });
    }

    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let mut command = [0u8; 12];
    command.copy_from_slice(&buf[4..16]);
    let length = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    let checksum = u32::from_le_bytes(buf[20..24].try_into().unwrap());

    Ok(MessageHeader {
        magic,
        command,
        length,
        checksum,
    })
}
