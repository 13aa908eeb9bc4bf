/// Bitcoin's compact variable-length unsigned integer encoding.
///
/// A single byte `< 0xFD` is the value itself. `0xFD` prefixes a `u16`,
/// `0xFE` a `u32`, `0xFF` a `u64`, each little-endian. Encoded length is
/// always one of `{1, 3, 5, 9}` bytes.
use crate::error::{CodecError, CodecResult};

/// Read a `var_int` from `buf` starting at `*cursor`, advancing `*cursor`
/// past the bytes consumed.
pub fn read_var_int(buf: &[u8], cursor: &mut usize) -> CodecResult<u64> {
    let need = |n: usize| -> CodecResult<()> {
        if buf.len() < *cursor + n {
            Err(CodecError::Truncated {
                need: *cursor + n,
                have: buf.len(),
            })
        } else {
            Ok(())
        }
    };

    need(1)?;
    let prefix = buf[*cursor];
    *cursor += 1;

    match prefix {
        0xFD => {
            need(2)?;
            let v = u16::from_le_bytes(buf[*cursor..*cursor + 2].try_into().unwrap());
            *cursor += 2;
            Ok(v as u64)
        }
        0xFE => {
            need(4)?;
            let v = u32::from_le_bytes(buf[*cursor..*cursor + 4].try_into().unwrap());
            *cursor += 4;
            Ok(v as u64)
        }
        0xFF => {
            need(8)?;
            let v = u64::from_le_bytes(buf[*cursor..*cursor + 8].try_into().unwrap());
            *cursor += 8;
            Ok(v)
        }
        small => Ok(small as u64),
    }
}

/// Encode `value` as a `var_int`, appending the bytes to `out`.
pub fn write_var_int(out: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        out.push(value as u8);
    } else if value <= u16::MAX as u64 {
        out.push(0xFD);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= u32::MAX as u64 {
        out.push(0xFE);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xFF);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Encoded length in bytes of `value` as a `var_int`.
pub fn var_int_len(value: u64) -> usize {
    if value < 0xFD {
        1
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_round_trips_and_lengths() {
        let cases: &[(u64, usize)] = &[
            (0, 1),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ];

        for &(value, expected_len) in cases {
            let mut buf = Vec::new();
            write_var_int(&mut buf, value);
            assert_eq!(buf.len(), expected_len, "length mismatch for {value}");
            assert_eq!(var_int_len(value), expected_len);

            let mut cursor = 0;
            let decoded = read_var_int(&buf, &mut cursor).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(cursor, expected_len);
        }
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut cursor = 0;
        assert!(read_var_int(&[0xFD, 0x01], &mut cursor).is_err());
    }
}
