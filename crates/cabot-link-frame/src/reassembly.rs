use bytes::Bytes;
use tracing::{debug, trace};

use crate::compress::{gunzip, is_gzip};
use crate::error::{FrameError, Result};
use crate::fragment::{FragmentHeader, HEADER_SIZE};

/// Default cap on a decompressed payload: 1 MiB.
pub const DEFAULT_MAX_DECOMPRESSED: usize = 1024 * 1024;

/// Configuration for per-channel reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyConfig {
    /// Maximum size of a payload after gunzip.
    pub max_decompressed_size: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED,
        }
    }
}

/// Rebuilds one logical payload from the writes of a single channel.
///
/// Writes must be pushed in arrival order. A reassembler is owned by exactly
/// one channel and never shared.
#[derive(Debug)]
pub struct Reassembler {
    buf: Vec<u8>,
    /// Which bytes of `buf` have been written; repeats count once.
    filled: Vec<bool>,
    total_len: usize,
    received: usize,
    /// Fragment offset from the last header seen.
    fragment_offset: usize,
    active: bool,
    config: ReassemblyConfig,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_config(ReassemblyConfig::default())
    }

    pub fn with_config(config: ReassemblyConfig) -> Self {
        Self {
            buf: Vec::new(),
            filled: Vec::new(),
            total_len: 0,
            received: 0,
            fragment_offset: 0,
            active: false,
            config,
        }
    }

    /// Feed one link-level write.
    ///
    /// Returns `Ok(Some(payload))` once every byte of the message has been
    /// written, gunzipped if needed. `Ok(None)` means more writes are expected.
    /// A repeated fragment overwrites what it covers and adds nothing.
    ///
    /// A write too short to carry a header is rejected without touching the
    /// message in progress. Any other error abandons the message in progress.
    pub fn push(&mut self, link_offset: usize, data: &[u8]) -> Result<Option<Bytes>> {
        if data.is_empty() {
            return Ok(None);
        }

        let result = if link_offset == 0 {
            self.push_first(data)
        } else {
            self.push_continuation(link_offset, data)
        };

        match result {
            Ok(()) => {}
            Err(err @ FrameError::MalformedHeader { .. }) => return Err(err),
            Err(err) => {
                self.reset();
                return Err(err);
            }
        }

        if self.received < self.total_len {
            trace!(
                received = self.received,
                total = self.total_len,
                "fragment stored"
            );
            return Ok(None);
        }

        let payload = std::mem::take(&mut self.buf);
        self.reset();
        self.finish(payload).map(Some)
    }

    fn push_first(&mut self, data: &[u8]) -> Result<()> {
        let header = FragmentHeader::parse(data)?;
        let total = header.total_len as usize;
        let offset = header.offset as usize;

        if total == 0 {
            return Err(FrameError::EmptyMessage);
        }

        if offset == 0 {
            self.buf = vec![0; total];
            self.filled = vec![false; total];
            self.total_len = total;
            self.received = 0;
            self.active = true;
        } else if !self.active {
            return Err(FrameError::NoActiveMessage);
        } else if total != self.total_len {
            return Err(FrameError::LengthMismatch {
                expected: self.total_len,
                got: total,
            });
        }

        self.fragment_offset = offset;
        self.copy_at(offset, &data[HEADER_SIZE..])
    }

    fn push_continuation(&mut self, link_offset: usize, data: &[u8]) -> Result<()> {
        if !self.active {
            return Err(FrameError::NoActiveMessage);
        }
        // The link offset counts the header bytes of the fragment's first write.
        let at = (self.fragment_offset + link_offset)
            .checked_sub(HEADER_SIZE)
            .ok_or(FrameError::OutOfBounds {
                offset: self.fragment_offset + link_offset,
                len: data.len(),
                total: self.total_len,
            })?;
        self.copy_at(at, data)
    }

    fn copy_at(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        let end = at.checked_add(bytes.len()).filter(|end| *end <= self.buf.len());
        let Some(end) = end else {
            return Err(FrameError::OutOfBounds {
                offset: at,
                len: bytes.len(),
                total: self.total_len,
            });
        };
        self.buf[at..end].copy_from_slice(bytes);
        let filled = &mut self.filled[at..end];
        self.received += filled.iter().filter(|done| !**done).count();
        filled.fill(true);
        Ok(())
    }

    fn finish(&self, payload: Vec<u8>) -> Result<Bytes> {
        if is_gzip(&payload) {
            let inflated = gunzip(&payload, self.config.max_decompressed_size)?;
            debug!(
                compressed = payload.len(),
                inflated = inflated.len(),
                "gunzipped reassembled payload"
            );
            return Ok(Bytes::from(inflated));
        }
        Ok(Bytes::from(payload))
    }

    /// Abandon the message in progress without delivering it.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.filled.clear();
        self.total_len = 0;
        self.received = 0;
        self.fragment_offset = 0;
        self.active = false;
    }

    /// True while a message is partially assembled.
    pub fn in_progress(&self) -> bool {
        self.active
    }

    /// Distinct bytes received for the message in progress.
    pub fn received(&self) -> usize {
        self.received
    }
}
