use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{FrameError, Result};

/// gzip member magic (RFC 1952).
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Returns true if `data` starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= GZIP_MAGIC.len() && data[..2] == GZIP_MAGIC
}

/// Decompress a gzip buffer, refusing output larger than `max_len`.
pub fn gunzip(data: &[u8], max_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).min(max_len));
    let limit = (max_len as u64).saturating_add(1);
    GzDecoder::new(data)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(FrameError::Decompress)?;

    if out.len() > max_len {
        return Err(FrameError::PayloadTooLarge {
            size: out.len(),
            max: max_len,
        });
    }
    Ok(out)
}

/// Compress `data` with default gzip settings.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
