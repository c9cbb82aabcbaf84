//! Line framing
//!
//! Splits a raw byte stream into protocol lines and writes lines back,
//! enforcing the maximum line length in both directions.
//!
//! ## Framing rules
//!
//! - Terminator is a bare `\n`; a preceding `\r` is stripped.
//! - A line longer than the configured maximum (terminator excluded) is
//!   a framing error, detected while accumulating so an abusive peer
//!   cannot force unbounded buffering.
//! - EOF at a line boundary is a clean end of stream; EOF mid-line is
//!   an incomplete-line error, reported under its own wire code.

use std::io::{BufRead, Write};

use crate::error::{AssuanError, Result};
use crate::protocol::escape;

/// Reads length-limited protocol lines from a buffered stream
pub struct LineReader<R> {
    inner: R,
    max_line_len: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R, max_line_len: usize) -> Self {
        Self {
            inner,
            max_line_len,
        }
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` on a clean EOF at a line boundary.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line: Vec<u8> = Vec::new();
        // one extra byte so "content + CR" is not rejected early
        let budget = self.max_line_len + 1;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AssuanError::Io(e)),
            };
            if available.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                return Err(AssuanError::IncompleteLine(
                    "stream closed before line terminator".into(),
                ));
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    if line.len() + pos > budget {
                        self.inner.consume(pos + 1);
                        return Err(AssuanError::Framing(format!(
                            "line exceeds {} bytes",
                            self.max_line_len
                        )));
                    }
                    line.extend_from_slice(&available[..pos]);
                    self.inner.consume(pos + 1);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.len() > self.max_line_len {
                        return Err(AssuanError::Framing(format!(
                            "line exceeds {} bytes",
                            self.max_line_len
                        )));
                    }
                    tracing::trace!(len = line.len(), "read line");
                    return Ok(Some(line));
                }
                None => {
                    let n = available.len();
                    if line.len() + n > budget {
                        // over-length with no terminator in sight: the
                        // session can no longer be re-synchronized
                        return Err(AssuanError::Framing(format!(
                            "line exceeds {} bytes",
                            self.max_line_len
                        )));
                    }
                    line.extend_from_slice(available);
                    self.inner.consume(n);
                }
            }
        }
    }
}

/// Writes protocol lines, appending the terminator and flushing
pub struct LineWriter<W> {
    inner: W,
    max_line_len: usize,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W, max_line_len: usize) -> Self {
        Self {
            inner,
            max_line_len,
        }
    }

    /// Write one line (terminator excluded from `line` and the limit)
    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        if line.len() > self.max_line_len {
            return Err(AssuanError::Framing(format!(
                "outgoing line of {} bytes exceeds {}",
                line.len(),
                self.max_line_len
            )));
        }
        self.inner.write_all(line)?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        tracing::trace!(len = line.len(), "wrote line");
        Ok(())
    }

    /// Write `payload` as a sequence of `D` lines.
    ///
    /// Each line stays within the length limit and a `%XX` escape is
    /// never split across two lines. Empty payloads produce a single
    /// empty data line so the receiver still observes the transfer.
    pub fn write_data(&mut self, payload: &[u8], extra_escape: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return self.write_line(b"D");
        }

        let mut line: Vec<u8> = b"D ".to_vec();
        for &byte in payload {
            let encoded_len = if escape::needs_escape(byte, extra_escape) {
                3
            } else {
                1
            };
            if line.len() + encoded_len > self.max_line_len {
                self.write_line(&line)?;
                line.truncate(2); // keep the "D " prefix
            }
            escape::push_escaped(&mut line, byte, extra_escape);
        }
        if line.len() > 2 {
            self.write_line(&line)?;
        }
        Ok(())
    }
}
