//! Line assembly for NDJSON response streams
//!
//! Network chunks split JSON lines arbitrarily. The buffer re-assembles
//! complete lines and hands back whatever remains when the stream ends.

use anyhow::Result;

#[derive(Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk and return the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(chunk)?;
        let mut lines = Vec::new();
        for ch in text.chars() {
            if ch == '\n' {
                if !self.buffer.is_empty() {
                    lines.push(std::mem::take(&mut self.buffer));
                }
            } else {
                self.buffer.push(ch);
            }
        }
        Ok(lines)
    }

    /// The trailing partial line, if the stream ended without a newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LineBuffer;

    #[test]
    fn reassembles_lines_split_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"a\":").unwrap().is_empty());
        assert_eq!(buffer.push(b"1}\n{\"b\":2}\n").unwrap(), vec![
            "{\"a\":1}".to_string(),
            "{\"b\":2}".to_string(),
        ]);
        assert_eq!(buffer.take_remainder(), None);
    }

    #[test]
    fn remainder_survives_a_missing_trailing_newline() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"{\"done\":true}").unwrap();
        assert_eq!(buffer.take_remainder().as_deref(), Some("{\"done\":true}"));
        assert_eq!(buffer.take_remainder(), None);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"\n\na\n\n").unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&[0xff, 0xfe]).is_err());
    }
}
