// crates/chat-protocol/src/line_codec.rs

//! Line framing.
//!
//! Inbound lines may end with `\n`, `\r`, or `\r\n`. The decoder is
//! incremental: feed it whatever the socket returned and pull complete
//! lines out of it. A `\r\n` pair split across two reads still counts
//! as a single terminator.
//!
//! Outbound lines are encoded with an explicit [`LineEnding`]; the
//! server always uses [`LineEnding::Lf`].

use bytes::{Buf, BytesMut};

use crate::charset;

/// Line terminator used when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::Cr => b"\r",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// Encode `text` as one Latin-1 line terminated by `ending`.
pub fn encode_line(text: &str, ending: LineEnding) -> Vec<u8> {
    let terminator = ending.as_bytes();
    let mut out = Vec::with_capacity(text.len() + terminator.len());
    charset::encode_into(text, &mut out);
    out.extend_from_slice(terminator);
    out
}

/// Incremental decoder turning a byte stream into Latin-1 lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
    // Bytes at the front of `buffer` already known to hold no terminator.
    scanned: usize,
    // Set after a bare `\r`; a directly following `\n` belongs to it.
    skip_lf: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        LineDecoder {
            buffer: BytesMut::with_capacity(1024),
            scanned: 0,
            skip_lf: false,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete line, without its terminator.
    ///
    /// Returns `None` when no full line is buffered yet.
    pub fn next_line(&mut self) -> Option<String> {
        if self.skip_lf {
            if self.buffer.is_empty() {
                return None;
            }
            if self.buffer[0] == b'\n' {
                self.buffer.advance(1);
            }
            self.skip_lf = false;
        }

        let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        else {
            self.scanned = self.buffer.len();
            return None;
        };

        let line = self.buffer.split_to(self.scanned + offset);
        self.scanned = 0;
        if self.buffer.get_u8() == b'\r' {
            self.skip_lf = true;
        }

        Some(charset::decode(&line))
    }

    /// Flush whatever is left once the stream has ended.
    ///
    /// A trailing line without a terminator is still a line.
    pub fn finish(&mut self) -> Option<String> {
        self.skip_lf = false;
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(charset::decode(&rest))
    }
}
