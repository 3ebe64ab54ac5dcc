//! Splits the inbound byte stream into newline-delimited frames.
//!
//! TCP delivers bytes, not messages: one read may hold half a message or
//! several. [`Framer`] buffers across reads, hands back every completed
//! frame, and trips a flood guard when a peer streams too many bytes
//! without ever sending a delimiter.

/// How many undelimited bytes a peer may buffer before the connection is
/// considered hostile or broken.
pub const MAX_BUFFERED: usize = 10_000;

/// Per-connection frame splitter.
///
/// Feed it chunks as they arrive with [`extend`](Framer::extend); it
/// returns completed frames and keeps any trailing partial frame for the
/// next chunk.
#[derive(Debug)]
pub struct Framer {
    buf: Vec<u8>,
    limit: usize,
}

impl Framer {
    /// A framer with the standard [`MAX_BUFFERED`] limit.
    pub fn new() -> Self {
        Self::with_limit(MAX_BUFFERED)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Appends one chunk and returns every frame it completes, in order,
    /// with the delimiter stripped.
    ///
    /// The flood check runs after extraction, so a chunk of any size is
    /// fine as long as what remains undelimited stays within the limit.
    ///
    /// # Errors
    /// Returns [`FloodError`] when the undelimited remainder exceeds the
    /// limit. The connection must be closed; the framer keeps the
    /// offending bytes only so the caller can report the count.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FloodError> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut frame: Vec<u8> = self.buf.drain(..=pos).collect();
            frame.pop();
            frames.push(frame);
        }

        if self.buf.len() > self.limit {
            return Err(FloodError {
                buffered: self.buf.len(),
                limit: self.limit,
            });
        }
        Ok(frames)
    }

    /// Bytes currently held for an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// The flood guard tripped: too many bytes without a delimiter.
///
/// Unlike the parse errors in [`ProtocolError`](crate::ProtocolError),
/// this is fatal to the connection, which is why it is its own type.
#[derive(Debug, thiserror::Error)]
#[error("flooded: {buffered} bytes buffered without a delimiter (limit {limit})")]
pub struct FloodError {
    pub buffered: usize,
    pub limit: usize,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_partial_frame_returns_nothing() {
        let mut framer = Framer::new();
        let frames = framer.extend(b"{\"msgt\":").unwrap();
        assert!(frames.is_empty());
        assert_eq!(framer.buffered(), 8);
    }

    #[test]
    fn test_extend_completes_frame_across_chunks() {
        let mut framer = Framer::new();
        assert!(framer.extend(b"hel").unwrap().is_empty());
        let frames = framer.extend(b"lo\n").unwrap();
        assert_eq!(frames, vec![b"hello".to_vec()]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_extend_drains_every_complete_frame_in_order() {
        // Two pipelined messages in one read must both come out.
        let mut framer = Framer::new();
        let frames = framer.extend(b"one\ntwo\nthr").unwrap();
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(framer.buffered(), 3);
    }

    #[test]
    fn test_extend_strips_the_delimiter() {
        let mut framer = Framer::new();
        let frames = framer.extend(b"abc\n").unwrap();
        assert_eq!(frames[0], b"abc");
    }

    #[test]
    fn test_extend_yields_empty_frames_for_bare_delimiters() {
        let mut framer = Framer::new();
        let frames = framer.extend(b"\n\n").unwrap();
        assert_eq!(frames, vec![Vec::<u8>::new(), Vec::<u8>::new()]);
    }

    #[test]
    fn test_buffered_at_limit_is_not_a_flood() {
        let mut framer = Framer::new();
        let frames = framer.extend(&[b'x'; MAX_BUFFERED]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(framer.buffered(), MAX_BUFFERED);
    }

    #[test]
    fn test_buffered_over_limit_is_a_flood() {
        let mut framer = Framer::new();
        let err = framer.extend(&[b'x'; MAX_BUFFERED + 1]).unwrap_err();
        assert_eq!(err.buffered, MAX_BUFFERED + 1);
        assert_eq!(err.limit, MAX_BUFFERED);
    }

    #[test]
    fn test_flood_accumulates_across_chunks() {
        let mut framer = Framer::with_limit(10);
        assert!(framer.extend(b"123456").unwrap().is_empty());
        assert!(framer.extend(b"78901").is_err());
    }

    #[test]
    fn test_completed_frames_do_not_count_toward_limit() {
        // A large chunk made of complete frames is fine; only the
        // undelimited tail matters.
        let mut framer = Framer::with_limit(10);
        let mut chunk = Vec::new();
        for _ in 0..100 {
            chunk.extend_from_slice(b"yyyyyyyy\n");
        }
        chunk.extend_from_slice(b"tail");
        let frames = framer.extend(&chunk).unwrap();
        assert_eq!(frames.len(), 100);
        assert_eq!(framer.buffered(), 4);
    }

    #[test]
    fn test_frame_completing_after_large_buffer_drains_it() {
        let mut framer = Framer::with_limit(100);
        assert!(framer.extend(&[b'z'; 90]).unwrap().is_empty());
        let frames = framer.extend(b"z\n").unwrap();
        assert_eq!(frames[0].len(), 91);
        assert_eq!(framer.buffered(), 0);
    }
}
