/// Parse a single SSE line.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event:") {
        Some(SseParsed::Event(event_type.trim_start().to_string()))
    } else {
        line.strip_prefix("data:")
            .map(|data| SseParsed::Data(data.trim_start().to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
///
/// Bytes are buffered until a `\n` arrives, so multi-byte UTF-8 sequences
/// split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk and return every complete, non-blank line (trimmed).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left after the stream ended without a trailing newline.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}
