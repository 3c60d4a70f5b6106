//! Splits an incoming byte stream into lines.

use crate::FrameError;

/// Accumulates received bytes and yields complete lines.
///
/// Reads may end anywhere: in the middle of a line, or after several
/// lines at once. Whatever follows the last `\n` stays buffered until the
/// next [`extend`](Self::extend).
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes already scanned for a terminator without finding one.
    scanned: usize,
    max_line_len: Option<usize>,
    /// Set after an oversized partial line; cleared at its terminator.
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that refuses lines longer than `limit` bytes.
    pub fn with_max_line_len(limit: usize) -> Self {
        Self {
            max_line_len: Some(limit),
            ..Self::default()
        }
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Removes and returns the next complete line, without its `\n`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the JSON layer
    /// reports anything that matters.
    ///
    /// # Errors
    /// [`FrameError::LineTooLong`] when no terminator appears within the
    /// limit. The oversized line is discarded up to and including its
    /// terminator, so the following line is read normally.
    pub fn next_line(&mut self) -> Result<Option<String>, FrameError> {
        if self.discarding {
            match self.buf.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.buf.drain(..=end);
                    self.discarding = false;
                }
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }
        }

        let found = self.buf[self.scanned..].iter().position(|&b| b == b'\n');
        match found {
            Some(offset) => {
                let end = self.scanned + offset;
                self.scanned = 0;
                if let Some(limit) = self.max_line_len {
                    if end > limit {
                        self.buf.drain(..=end);
                        return Err(FrameError::LineTooLong { limit });
                    }
                }
                let line: Vec<u8> = self.buf.drain(..=end).collect();
                Ok(Some(String::from_utf8_lossy(&line[..end]).into_owned()))
            }
            None => {
                self.scanned = self.buf.len();
                if let Some(limit) = self.max_line_len {
                    if self.buf.len() > limit {
                        // Drop the rest of this line as it arrives.
                        self.buf.clear();
                        self.scanned = 0;
                        self.discarding = true;
                        return Err(FrameError::LineTooLong { limit });
                    }
                }
                Ok(None)
            }
        }
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_line_yields_multiple_lines_from_one_read() {
        let mut buf = LineBuffer::new();
        buf.extend(b"cmd1 []\ncmd2 []\n");
        assert_eq!(buf.next_line().unwrap().as_deref(), Some("cmd1 []"));
        assert_eq!(buf.next_line().unwrap().as_deref(), Some("cmd2 []"));
        assert_eq!(buf.next_line().unwrap(), None);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_next_line_keeps_partial_line_across_reads() {
        let mut buf = LineBuffer::new();
        buf.extend(b"add [2,");
        assert_eq!(buf.next_line().unwrap(), None);
        buf.extend(b"3]\n0 ");
        assert_eq!(buf.next_line().unwrap().as_deref(), Some("add [2,3]"));
        assert_eq!(buf.next_line().unwrap(), None);
        assert_eq!(buf.pending(), 2);
    }

    #[test]
    fn test_next_line_empty_line_is_returned_empty() {
        let mut buf = LineBuffer::new();
        buf.extend(b"\n");
        assert_eq!(buf.next_line().unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_next_line_over_limit_without_terminator_fails_and_resets() {
        let mut buf = LineBuffer::with_max_line_len(4);
        buf.extend(b"abcdef");
        assert_eq!(
            buf.next_line().unwrap_err(),
            FrameError::LineTooLong { limit: 4 }
        );
        assert_eq!(buf.pending(), 0);

        // The tail of the oversized line is dropped, not parsed.
        buf.extend(b"gh\nok\n");
        assert_eq!(buf.next_line().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_next_line_over_limit_with_terminator_skips_that_line() {
        let mut buf = LineBuffer::with_max_line_len(4);
        buf.extend(b"toolong\nok\n");
        assert!(buf.next_line().is_err());
        assert_eq!(buf.next_line().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_next_line_multibyte_utf8_split_across_reads() {
        let mut buf = LineBuffer::new();
        let text = "[\"é\"]\n".as_bytes();
        buf.extend(&text[..3]);
        assert_eq!(buf.next_line().unwrap(), None);
        buf.extend(&text[3..]);
        assert_eq!(buf.next_line().unwrap().as_deref(), Some("[\"é\"]"));
    }
}
