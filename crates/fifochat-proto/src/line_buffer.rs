//! Line reassembly across partial reads.

/// Accumulates raw bytes from channel reads and yields complete lines.
///
/// FIFO reads have no framing: one read may carry several envelopes, or an
/// envelope may be split across reads. `push` appends a chunk; `drain_lines`
/// removes and returns every complete `\n`-terminated line in arrival order,
/// carrying any trailing partial line over to the next read.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of raw bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Drains every complete line, without its terminator.
    ///
    /// Non-UTF-8 bytes are replaced rather than rejected; the decoder
    /// downstream decides whether the line is a valid envelope.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(nl) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=nl).collect();
            line.pop(); // the `\n`
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Returns true if a partial line is being carried over.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}
