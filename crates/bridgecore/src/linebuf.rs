//! Line assembly for the upstream byte stream
//!
//! Reads arrive in arbitrary chunks; complete LF-terminated lines are handed
//! out as text and the partial tail stays buffered until the next read.

/// Receive buffer holding an incomplete trailing line across ticks
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and drain every complete line
    ///
    /// Lines split on LF; a trailing CR is stripped. Bytes decode lossily as
    /// UTF-8, no other encoding is assumed.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop(); // the LF
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        lines
    }

    /// Number of buffered bytes awaiting a line terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line, e.g. when the upstream is re-dialed
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
