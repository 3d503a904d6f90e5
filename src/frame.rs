//! Length-prefixed, varint-framed wire envelope.
//!
//! Every frame is `0x00 | varint(payload_len) | varint(message_type) | payload`.
//! Varints are base-128 little-endian: the high bit of each byte means "more
//! bytes follow".

use crate::error::FrameError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read a single base-128 varint from `reader`. Returns `ShortRead` if EOF is
/// hit before the terminating byte (mirrors the Python source's `-1` sentinel,
/// re-expressed as a proper error).
pub async fn read_varint<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<u64, FrameError> {
    let mut result: u64 = 0;
    let mut bitpos: u32 = 0;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await.map_err(|_| FrameError::ShortRead)?;
        let val = byte[0];
        result |= ((val & 0x7F) as u64) << bitpos;
        if val & 0x80 == 0 {
            return Ok(result);
        }
        bitpos += 7;
    }
}

/// Encode `value` as a base-128 varint.
pub fn write_varint(mut value: u64) -> Vec<u8> {
    if value <= 0x7F {
        return vec![value as u8];
    }
    let mut out = Vec::new();
    while value != 0 {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            out.push(byte | 0x80);
        } else {
            out.push(byte);
        }
    }
    out
}

/// A decoded frame: message type id plus raw payload bytes. Payload decoding
/// into a concrete message struct is the registry's job (`proto.rs`).
#[derive(Debug, Clone)]
pub struct Frame {
    pub message_type: u32,
    pub payload: Vec<u8>,
}

/// Read one frame from `reader`. Returns `Ok(None)` only for message types
/// outside the known registry — callers should skip and keep reading, not
/// terminate the connection, so a peer sending a message type this crate
/// doesn't know about doesn't kill the connection.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    let _preamble = read_varint(reader).await?;
    let length = read_varint(reader).await?;
    let message_type = read_varint(reader).await?;

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await.map_err(|_| FrameError::ShortRead)?;

    Ok(Frame {
        message_type: message_type as u32,
        payload,
    })
}

/// Write one frame to `writer` as a single buffered write followed by a
/// flush, matching the Python source's `writer.write(...); await
/// writer.drain()` pairing.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    message_type: u32,
    payload: &[u8],
) -> Result<(), FrameError> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.push(0u8);
    out.extend(write_varint(payload.len() as u64));
    out.extend(write_varint(message_type as u64));
    out.extend_from_slice(payload);

    writer.write_all(&out).await.map_err(|_| FrameError::ShortRead)?;
    writer.flush().await.map_err(|_| FrameError::ShortRead)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn varint_round_trip() {
        for n in [0u64, 1, 127, 128, 300, 16384, 2_097_151, 2_097_152, u32::MAX as u64] {
            let bytes = write_varint(n);
            let mut cursor = std::io::Cursor::new(bytes);
            let got = read_varint(&mut cursor).await.unwrap();
            assert_eq!(got, n);
        }
    }

    #[tokio::test]
    async fn frame_round_trip() {
        let payload = b"hello world".to_vec();
        let mut buf = Vec::new();
        write_frame(&mut buf, 42, &payload).await.unwrap();
        assert_eq!(buf[0], 0x00);

        let mut cursor = std::io::Cursor::new(buf);
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.message_type, 42);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn short_read_on_truncated_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 1, b"abc").await.unwrap();
        buf.truncate(buf.len() - 2);
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::ShortRead));
    }
}
