use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Fragment header: total length (2) + fragment offset (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Smallest chunk that carries a header and one payload byte.
pub const MIN_CHUNK_SIZE: usize = HEADER_SIZE + 1;

/// Header that prefixes the first link-level write of every fragment.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────────┬──────────────────┐
/// │ Length (2B)  │ Offset (2B)   │ Fragment bytes   │
/// │ big-endian   │ big-endian    │                  │
/// └──────────────┴───────────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Total payload length of the message.
    pub total_len: u16,
    /// Offset of this fragment inside the payload.
    pub offset: u16,
}

impl FragmentHeader {
    /// Parse the header at the start of `src`.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::MalformedHeader { len: src.len() });
        }
        Ok(Self {
            total_len: u16::from_be_bytes([src[0], src[1]]),
            offset: u16::from_be_bytes([src[2], src[3]]),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(self.total_len);
        dst.put_u16(self.offset);
    }
}

/// Split `payload` into header-prefixed fragments of at most `chunk_size` bytes.
///
/// Feeding the fragments, in order and at link offset 0, into a
/// [`Reassembler`](crate::Reassembler) yields `payload` again.
pub fn fragment(payload: &[u8], chunk_size: usize) -> Result<Vec<Bytes>> {
    if chunk_size < MIN_CHUNK_SIZE {
        return Err(FrameError::ChunkTooSmall {
            size: chunk_size,
            min: MIN_CHUNK_SIZE,
        });
    }
    if payload.is_empty() {
        return Err(FrameError::EmptyMessage);
    }
    if payload.len() > u16::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        });
    }

    let total_len = payload.len() as u16;
    let body = chunk_size - HEADER_SIZE;
    let mut out = Vec::with_capacity(payload.len().div_ceil(body));

    for (idx, piece) in payload.chunks(body).enumerate() {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + piece.len());
        FragmentHeader {
            total_len,
            offset: (idx * body) as u16,
        }
        .encode(&mut buf);
        buf.put_slice(piece);
        out.push(buf.freeze());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian() {
        let mut buf = BytesMut::new();
        FragmentHeader {
            total_len: 0x0102,
            offset: 0x0304,
        }
        .encode(&mut buf);
        assert_eq!(buf.as_ref(), &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(
            FragmentHeader::parse(&buf).unwrap(),
            FragmentHeader {
                total_len: 0x0102,
                offset: 0x0304
            }
        );
    }

    #[test]
    fn short_header_rejected() {
        let err = FragmentHeader::parse(&[0x00, 0x10, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader { len: 3 }));
    }

    #[test]
    fn fragments_respect_chunk_size() {
        let payload = vec![7u8; 100];
        let chunks = fragment(&payload, 20).unwrap();

        assert_eq!(chunks.len(), 7);
        assert!(chunks.iter().all(|c| c.len() <= 20));
        assert_eq!(&chunks[1][..4], &[0x00, 100, 0x00, 16]);
        assert_eq!(chunks[6].len(), HEADER_SIZE + 4);
    }

    #[test]
    fn single_fragment_when_it_fits() {
        let chunks = fragment(b"hello", 64).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref(), b"\x00\x05\x00\x00hello");
    }

    #[test]
    fn chunk_size_below_minimum_rejected() {
        let err = fragment(b"hello", 4).unwrap_err();
        assert!(matches!(err, FrameError::ChunkTooSmall { size: 4, min: 5 }));
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0u8; u16::MAX as usize + 1];
        let err = fragment(&payload, 512).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }
}
