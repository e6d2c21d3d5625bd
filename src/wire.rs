//! TFTP (RFC 1350) wire codec.
//!
//! Encoders write into a caller-owned 516-byte buffer and return the
//! written length; they never allocate. Decoders are free functions over a
//! received byte slice, matching the length-bound table in the
//! specification exactly.

use crate::error::{Result, TftpError};

pub const OPCODE_RRQ: u16 = 1;
pub const OPCODE_WRQ: u16 = 2;
pub const OPCODE_DATA: u16 = 3;
pub const OPCODE_ACK: u16 = 4;
pub const OPCODE_ERROR: u16 = 5;

/// Maximum payload per DATA packet (RFC 1350).
pub const BLOCK_SIZE: usize = 512;

/// 4-byte header + 512-byte payload: the largest datagram this client ever
/// sends or accepts.
pub const MAX_MSG_SIZE: usize = 4 + BLOCK_SIZE;

/// A decoded TFTP packet, built on top of the free decode functions below.
/// Used by tests and logging; the hot dispatch path in `engine.rs` calls
/// `decode_opcode`/`decode_blkno`/`decode_data`/`decode_error` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Packet<'a> {
    RRQ { filename: &'a str, mode: &'a str },
    WRQ { filename: &'a str, mode: &'a str },
    DATA { block_num: u16, data: &'a [u8] },
    ACK { block_num: u16 },
    ERROR { code: u16, message: &'a [u8] },
}

impl<'a> Packet<'a> {
    pub fn from_bytes(buf: &'a [u8]) -> Result<Self> {
        let opcode = decode_opcode(buf)?;
        match opcode {
            OPCODE_RRQ | OPCODE_WRQ => {
                let (filename, mode) = decode_request(buf)?;
                Ok(if opcode == OPCODE_RRQ {
                    Packet::RRQ { filename, mode }
                } else {
                    Packet::WRQ { filename, mode }
                })
            }
            OPCODE_DATA => Ok(Packet::DATA {
                block_num: decode_blkno(buf)?,
                data: decode_data(buf)?,
            }),
            OPCODE_ACK => Ok(Packet::ACK {
                block_num: decode_blkno(buf)?,
            }),
            OPCODE_ERROR => {
                let (code, message) = decode_error(buf)?;
                Ok(Packet::ERROR { code, message })
            }
            _ => Err(TftpError::Malformed("unknown opcode")),
        }
    }
}

/// Encode an RRQ or WRQ into `out`. Returns the written length.
pub fn encode_request(out: &mut [u8; MAX_MSG_SIZE], opcode: u16, filename: &str, mode: &str) -> Result<usize> {
    let needed = 2 + filename.len() + 1 + mode.len() + 1;
    if needed > out.len() {
        return Err(TftpError::EncodingTooLarge);
    }
    out[0..2].copy_from_slice(&opcode.to_be_bytes());
    let mut p = 2;
    out[p..p + filename.len()].copy_from_slice(filename.as_bytes());
    p += filename.len();
    out[p] = 0;
    p += 1;
    out[p..p + mode.len()].copy_from_slice(mode.as_bytes());
    p += mode.len();
    out[p] = 0;
    p += 1;
    Ok(p)
}

/// Encode a DATA packet carrying `data` (0..=512 bytes) for `block_num`.
pub fn encode_data(out: &mut [u8; MAX_MSG_SIZE], block_num: u16, data: &[u8]) -> Result<usize> {
    if 4 + data.len() > out.len() {
        return Err(TftpError::EncodingTooLarge);
    }
    out[0..2].copy_from_slice(&OPCODE_DATA.to_be_bytes());
    out[2..4].copy_from_slice(&block_num.to_be_bytes());
    out[4..4 + data.len()].copy_from_slice(data);
    Ok(4 + data.len())
}

/// Encode an ACK for `block_num`.
pub fn encode_ack(out: &mut [u8; MAX_MSG_SIZE], block_num: u16) -> Result<usize> {
    out[0..2].copy_from_slice(&OPCODE_ACK.to_be_bytes());
    out[2..4].copy_from_slice(&block_num.to_be_bytes());
    Ok(4)
}

/// Encode an ERROR packet: `code` is the TFTP error code, `message` the
/// human-readable text.
pub fn encode_error(out: &mut [u8; MAX_MSG_SIZE], code: u16, message: &str) -> Result<usize> {
    let needed = 4 + message.len() + 1;
    if needed > out.len() {
        return Err(TftpError::EncodingTooLarge);
    }
    out[0..2].copy_from_slice(&OPCODE_ERROR.to_be_bytes());
    out[2..4].copy_from_slice(&code.to_be_bytes());
    out[4..4 + message.len()].copy_from_slice(message.as_bytes());
    out[4 + message.len()] = 0;
    Ok(needed)
}

/// Decode the 2-byte opcode. Requires `buf.len() >= 2`.
pub fn decode_opcode(buf: &[u8]) -> Result<u16> {
    if buf.len() < 2 {
        return Err(TftpError::Malformed("buffer too short for opcode"));
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

/// Decode the 2-byte block number (or error code) at offset 2. Requires
/// `buf.len() >= 4`.
pub fn decode_blkno(buf: &[u8]) -> Result<u16> {
    if buf.len() < 4 {
        return Err(TftpError::Malformed("buffer too short for block number"));
    }
    Ok(u16::from_be_bytes([buf[2], buf[3]]))
}

/// Decode the DATA payload: everything from offset 4 onward. Requires
/// `buf.len() >= 4`; a zero-length result is legal (end-of-file marker).
pub fn decode_data(buf: &[u8]) -> Result<&[u8]> {
    if buf.len() < 4 {
        return Err(TftpError::Malformed("buffer too short for data header"));
    }
    Ok(&buf[4..])
}

/// Decode an ERROR packet's code and NUL-terminated message. Requires
/// `buf.len() >= 5` and the message region to contain a NUL byte. The
/// message is returned as raw bytes: RFC 1350 never mandates UTF-8 for
/// error text, so a non-UTF-8 message from a conforming server must still
/// decode (callers that need a displayable string convert lossily).
pub fn decode_error(buf: &[u8]) -> Result<(u16, &[u8])> {
    if buf.len() < 5 {
        return Err(TftpError::Malformed("buffer too short for error packet"));
    }
    let code = decode_blkno(buf)?;
    let msg_region = &buf[4..];
    let end = msg_region
        .iter()
        .position(|&b| b == 0)
        .ok_or(TftpError::Malformed("error message is not NUL-terminated"))?;
    Ok((code, &msg_region[..end]))
}

fn decode_request(buf: &[u8]) -> Result<(&str, &str)> {
    let payload = &buf[2..];
    let mut fields = payload.splitn(3, |&b| b == 0);
    let filename = fields.next().ok_or(TftpError::Malformed("missing filename"))?;
    let mode = fields.next().ok_or(TftpError::Malformed("missing mode"))?;
    let filename =
        std::str::from_utf8(filename).map_err(|_| TftpError::Malformed("filename is not valid UTF-8"))?;
    let mode = std::str::from_utf8(mode).map_err(|_| TftpError::Malformed("mode is not valid UTF-8"))?;
    Ok((filename, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_rrq() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let len = encode_request(&mut buf, OPCODE_RRQ, "hello.txt", "octet").unwrap();
        match Packet::from_bytes(&buf[..len]).unwrap() {
            Packet::RRQ { filename, mode } => {
                assert_eq!(filename, "hello.txt");
                assert_eq!(mode, "octet");
            }
            other => panic!("expected RRQ, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_wrq() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let len = encode_request(&mut buf, OPCODE_WRQ, "hello.txt", "octet").unwrap();
        match Packet::from_bytes(&buf[..len]).unwrap() {
            Packet::WRQ { filename, mode } => {
                assert_eq!(filename, "hello.txt");
                assert_eq!(mode, "octet");
            }
            other => panic!("expected WRQ, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_data() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let payload = [1u8, 2, 3];
        let len = encode_data(&mut buf, 42, &payload).unwrap();
        match Packet::from_bytes(&buf[..len]).unwrap() {
            Packet::DATA { block_num, data } => {
                assert_eq!(block_num, 42);
                assert_eq!(data, &payload);
            }
            other => panic!("expected DATA, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_ack() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let len = encode_ack(&mut buf, 7).unwrap();
        match Packet::from_bytes(&buf[..len]).unwrap() {
            Packet::ACK { block_num } => assert_eq!(block_num, 7),
            other => panic!("expected ACK, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_error() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let len = encode_error(&mut buf, 1, "not found").unwrap();
        match Packet::from_bytes(&buf[..len]).unwrap() {
            Packet::ERROR { code, message } => {
                assert_eq!(code, 1);
                assert_eq!(message, b"not found");
            }
            other => panic!("expected ERROR, got {other:?}"),
        }
    }

    #[test]
    fn encoding_too_large_at_517_bytes() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let data = vec![0u8; 513];
        assert!(matches!(
            encode_data(&mut buf, 1, &data),
            Err(TftpError::EncodingTooLarge)
        ));
    }

    #[test]
    fn exactly_516_bytes_succeeds() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let data = vec![0u8; 512];
        assert_eq!(encode_data(&mut buf, 1, &data).unwrap(), 516);
    }

    #[test]
    fn filename_too_long_is_encoding_too_large() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let filename = "a".repeat(600);
        assert!(matches!(
            encode_request(&mut buf, OPCODE_RRQ, &filename, "octet"),
            Err(TftpError::EncodingTooLarge)
        ));
    }

    #[test]
    fn decode_opcode_rejects_short_buffers() {
        for len in 0..2 {
            let buf = vec![0u8; len];
            assert!(matches!(decode_opcode(&buf), Err(TftpError::Malformed(_))));
        }
    }

    #[test]
    fn decode_blkno_rejects_short_buffers() {
        for len in 0..4 {
            let buf = vec![0u8; len];
            assert!(matches!(decode_blkno(&buf), Err(TftpError::Malformed(_))));
        }
    }

    #[test]
    fn decode_data_zero_length_payload_is_legal() {
        let mut buf = [0u8; MAX_MSG_SIZE];
        let len = encode_data(&mut buf, 3, &[]).unwrap();
        let data = decode_data(&buf[..len]).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn decode_error_without_nul_is_malformed() {
        let mut buf = vec![0u8; 8];
        buf[0..2].copy_from_slice(&OPCODE_ERROR.to_be_bytes());
        buf[2..4].copy_from_slice(&1u16.to_be_bytes());
        // bytes 4..8 contain no NUL byte.
        buf[4..8].copy_from_slice(b"oops");
        assert!(matches!(decode_error(&buf), Err(TftpError::Malformed(_))));
    }

    #[test]
    fn decode_error_requires_five_bytes() {
        let buf = vec![0u8; 4];
        assert!(matches!(decode_error(&buf), Err(TftpError::Malformed(_))));
    }

    #[test]
    fn decode_error_accepts_non_utf8_message() {
        // RFC 1350 never mandates UTF-8 for error text; a Latin-1 byte like
        // 0xE9 ("é") must still decode rather than being dropped as
        // malformed.
        let mut buf = vec![0u8; 7];
        buf[0..2].copy_from_slice(&OPCODE_ERROR.to_be_bytes());
        buf[2..4].copy_from_slice(&1u16.to_be_bytes());
        buf[4..6].copy_from_slice(&[b'r', 0xE9]);
        buf[6] = 0;
        let (code, message) = decode_error(&buf).unwrap();
        assert_eq!(code, 1);
        assert_eq!(message, &[b'r', 0xE9]);
    }
}
