//! Stream framing: turning a byte stream into `#`…`!` frames.
//!
//! TCP delivers bytes, not messages. One `recv` may hold half a frame,
//! three frames, or a frame followed by the first few bytes of the next.
//! [`FrameReassembler`] keeps the leftover bytes between reads and hands
//! out complete frames as soon as their terminator arrives.
//!
//! ```text
//!  recv #1: "xx#abc"      → []            buffer: "xx#abc"
//!  recv #2: "def!#g"      → ["#abcdef!"]  buffer: "#g"
//!  recv #3: "h!"          → ["#gh!"]      buffer: ""
//! ```
//!
//! Bytes in front of the start marker are noise and are thrown away.
//! The buffer is capped: a peer that never sends a terminator cannot make
//! it grow without bound. Once the cap is exceeded everything accumulated
//! so far is dropped and framing picks up again at the next `#`.

use bytes::{BufMut, Bytes, BytesMut};

/// Start-of-frame marker.
pub const FRAME_START: u8 = b'#';

/// End-of-frame marker.
pub const FRAME_END: u8 = b'!';

/// One complete `#`…`!` frame, markers included.
///
/// Frames are immutable once extracted; `Bytes` makes clones cheap so a
/// frame can be decoded several ways without copying.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(Bytes);

impl Frame {
    /// Wraps raw bytes that already form a frame.
    ///
    /// Returns `None` unless `raw` starts with `#` and ends with `!`.
    pub fn from_wire(raw: impl Into<Bytes>) -> Option<Self> {
        let raw = raw.into();
        let framed = raw.len() >= 2
            && raw[0] == FRAME_START
            && raw[raw.len() - 1] == FRAME_END;
        framed.then_some(Self(raw))
    }

    /// The whole frame, markers included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The bytes between the markers.
    pub fn body(&self) -> &[u8] {
        &self.0[1..self.0.len() - 1]
    }

    /// Length of the whole frame in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A frame always carries its two markers, so it is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Accumulates stream bytes and extracts frames.
///
/// Each session owns two of these, one per protocol phase, with separate
/// caps (the handshake is tiny; in-game messages can carry larger bodies).
#[derive(Debug)]
pub struct FrameReassembler {
    buf: BytesMut,
    cap: usize,
    overflows: u64,
}

impl FrameReassembler {
    /// Creates an empty reassembler that holds at most `cap` pending bytes.
    pub fn new(cap: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(cap.min(4096)),
            cap,
            overflows: 0,
        }
    }

    /// Appends `data` and returns every frame it completed, oldest first.
    ///
    /// The result does not depend on how the stream was chunked: feeding
    /// a byte sequence all at once or one byte at a time yields the same
    /// frames, because the cap is applied at each byte position.
    pub fn feed(&mut self, mut data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        while !data.is_empty() {
            match data.iter().position(|&b| b == FRAME_END) {
                Some(end) => {
                    self.append_capped(&data[..end]);
                    self.close_candidate(&mut frames);
                    data = &data[end + 1..];
                }
                None => {
                    self.append_capped(data);
                    break;
                }
            }
        }

        frames
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Discards all pending bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// The configured cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// How many times the cap was exceeded and the buffer dropped.
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    /// Appends a run that contains no terminator, dropping the buffer
    /// each time it would grow past the cap.
    ///
    /// Invariant: `self.buf.len() <= self.cap` on return.
    fn append_capped(&mut self, mut run: &[u8]) {
        while !run.is_empty() {
            // The byte at index `room - 1` is the one that would push the
            // buffer to `cap + 1`.
            let room = self.cap + 1 - self.buf.len();
            if run.len() < room {
                self.buf.extend_from_slice(run);
                return;
            }
            run = &run[room..];
            self.buf.clear();
            self.overflows += 1;
            tracing::debug!(
                cap = self.cap,
                "frame buffer exceeded its cap, dropping pending bytes"
            );
        }
    }

    /// A terminator arrived: turn the buffer into a frame if it holds a
    /// start marker, otherwise discard it as noise.
    fn close_candidate(&mut self, frames: &mut Vec<Frame>) {
        let mut candidate = self.buf.split();

        // The last `#` wins. Encoded bodies never contain `#`, so an
        // earlier one can only belong to a frame whose tail was lost.
        match candidate.iter().rposition(|&b| b == FRAME_START) {
            Some(start) => {
                let mut frame = candidate.split_off(start);
                frame.put_u8(FRAME_END);
                frames.push(Frame(frame.freeze()));
            }
            None => {
                if !candidate.is_empty() {
                    tracing::debug!(
                        len = candidate.len(),
                        "discarding terminator without start marker"
                    );
                }
            }
        }
    }
}
