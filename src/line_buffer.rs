//! Byte accumulator that hands out complete lines.
//!
//! Reads from the monitored file end wherever the writer happened to be, so a
//! chunk may stop mid-line or even mid-character. Bytes are held until a
//! `\n` arrives. Because `\n` never occurs inside a multi-byte UTF-8
//! sequence, a complete line always holds complete characters; invalid bytes
//! are replaced rather than rejected.

/// Buffer for newline-delimited line reconstruction.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append raw bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Drain every newline-terminated line.
    ///
    /// Lines are returned without their terminator (`\n` or `\r\n`). A
    /// trailing partial line stays buffered for the next call.
    pub fn drain_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete
            .split(|&b| b == b'\n')
            // the final split segment is the empty tail after the last '\n'
            .take(complete.iter().filter(|&&b| b == b'\n').count())
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Discard any buffered partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Buffered bytes not yet forming a complete line.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_ascii_line() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"Hello World\n");

        assert_eq!(buffer.drain_complete_lines(), vec!["Hello World"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn complete_line_with_accents() {
        let mut buffer = LineBuffer::new();
        buffer.push("Café crème été\n".as_bytes());

        assert_eq!(buffer.drain_complete_lines(), vec!["Café crème été"]);
    }

    #[test]
    fn partial_line_is_held_back() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"first\nsecond par");

        assert_eq!(buffer.drain_complete_lines(), vec!["first"]);
        assert_eq!(buffer.len(), "second par".len());

        buffer.push(b"t\n");
        assert_eq!(buffer.drain_complete_lines(), vec!["second part"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn no_newline_yields_nothing() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"no terminator yet");
        assert!(buffer.drain_complete_lines().is_empty());
        assert!(!buffer.is_empty());
    }

    #[test]
    fn character_split_across_chunks() {
        // "é" is C3 A9
        let mut buffer = LineBuffer::new();
        buffer.push(&[b'c', b'a', b'f', 0xC3]);
        assert!(buffer.drain_complete_lines().is_empty());

        buffer.push(&[0xA9, b'\n']);
        assert_eq!(buffer.drain_complete_lines(), vec!["café"]);
    }

    #[test]
    fn crlf_is_trimmed() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"windows\r\nunix\n");
        assert_eq!(buffer.drain_complete_lines(), vec!["windows", "unix"]);
    }

    #[test]
    fn empty_lines_are_kept() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"a\n\nb\n");
        assert_eq!(buffer.drain_complete_lines(), vec!["a", "", "b"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::new();
        buffer.push(&[b'o', b'k', 0xFF, b'\n']);
        assert_eq!(buffer.drain_complete_lines(), vec!["ok\u{FFFD}"]);
    }

    #[test]
    fn clear_drops_partial_line() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"dangling");
        buffer.clear();
        buffer.push(b"fresh\n");
        assert_eq!(buffer.drain_complete_lines(), vec!["fresh"]);
    }
}
