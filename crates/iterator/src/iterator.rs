// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This library provides a BytesLines iterator for the treeherder log parser.
//!
//! The goals of this iterator are:
//!
//! - Work with Read object, such as gzip decoders or network endpoints.
//! - Zero copy [Bytes] slices, the buffer only grows to the longest line.
//! - Stable 1-based line numbers, never reset.
//!
//! Here is an example usage:
//!
//! ```rust
//! use treeherder_iterator::BytesLines;
//! // Create a test in-memory reader.
//! let reader = std::io::Cursor::new("first\r\nsecond\nlast");
//!
//! // Creates the iterator and unwrap error for assert_eq!.
//! let mut lines_iter = BytesLines::new(reader).map(|l| l.unwrap());
//! assert_eq!(lines_iter.next(), Some(("first".into(), 1)));
//! assert_eq!(lines_iter.next(), Some(("second".into(), 2)));
//! assert_eq!(lines_iter.next(), Some(("last".into(), 3)));
//! assert_eq!(lines_iter.next(), None);
//! ```
//!
//! Use [bytes_to_string] to convert a line into text, invalid UTF-8 is replaced with U+FFFD.

use bytes::{Buf, Bytes, BytesMut};
use std::io::{ErrorKind, Read, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    // We reached the end of the reader, or it failed.
    EoF,
    // We are processing the buffer.
    Scanning,
}

/// The BytesLines struct holds a single buffer to store the read data and it yields immutable memory slice.
///
// Here is the main sequence diagram:
//
//     ⭩- the buffer starts here.
// A: [                          ]          < the buffer is empty, we read a chunk.
// B: [aaaaaaaaaaaa\nbbbbb\nccccc]          < there is a line separator.
// C:  ╰-----------⮡ next slice
// D:               ⭨
// B: [              bbbbb\nccccc]
// C:                ╰----⮡ next slice
// D:                      ⭨
// E: [                     ccccc]          < the line is incomplete, `scanned` remembers where to resume.
// F:       ⭩ we reserve more space and move the left-overs at the begining of the buffer.
// G: [ccccc                           ]    < we read another chunk after the left-overs.
// B: [ccccccc\ndddddddddddddd\neeeeeee]
// ...
// H: [eeeeeeeee                       ]    < we reach the end of file.
// H   ╰--------⮡ the last slice
//
// Long lines are never dropped: performance payloads can be very long and the
// caller decides how much of each line it keeps.
pub struct BytesLines<R: Read> {
    reader: R,
    buf: BytesMut,
    state: State,
    // How much of the buffer is known to be free of separator.
    scanned: usize,
    line_count: usize,
    chunk_size: usize,
}

/// Logline is a tuple (content, line number).
pub type LogLine = (Bytes, usize);

impl<R: Read> Iterator for BytesLines<R> {
    type Item = Result<LogLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state == State::EoF {
                return None;
            }
            // Step B: We found the end of the line, we can return it now.
            if let Some(pos) = self.find_next_line() {
                return Some(Ok(self.split_line(pos, 1)));
            }
            // Step E: We haven't found the end of the line, we need more data.
            match self.read_chunk() {
                Ok(true) => continue,
                // Step H: We reached the end of the reader, but we have left-overs.
                Ok(false) if !self.buf.is_empty() => {
                    self.state = State::EoF;
                    let pos = self.buf.len();
                    return Some(Ok(self.split_line(pos, 0)));
                }
                // We reached the end of the reader, this is the end.
                Ok(false) => {
                    self.state = State::EoF;
                    return None;
                }
                // There was a reading error, we return it and stop.
                Err(e) => {
                    self.state = State::EoF;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: Read> BytesLines<R> {
    /// Creates a new BytesLines.
    pub fn new(reader: R) -> BytesLines<R> {
        BytesLines::with_chunk_size(reader, 8192)
    }

    /// Creates a new BytesLines reading `chunk_size` bytes at a time.
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> BytesLines<R> {
        let chunk_size = chunk_size.max(1);
        BytesLines {
            reader,
            chunk_size,
            state: State::Scanning,
            buf: BytesMut::with_capacity(chunk_size),
            scanned: 0,
            line_count: 0,
        }
    }

    // Read a new chunk after the left-overs, returns false on end of file.
    fn read_chunk(&mut self) -> Result<bool> {
        let pos = self.buf.len();
        // Step F: resize() will attempt to reclaim the consumed space in the buffer.
        self.buf.resize(pos + self.chunk_size, 0);
        loop {
            match self.reader.read(&mut self.buf[pos..]) {
                Ok(n) => {
                    self.buf.truncate(pos + n);
                    return Ok(n > 0);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(pos);
                    return Err(e);
                }
            }
        }
    }

    // Find the next line separator position, starting after the already scanned bytes.
    fn find_next_line(&mut self) -> Option<usize> {
        match self.buf[self.scanned..].iter().position(|c| *c == b'\n') {
            Some(pos) => Some(self.scanned + pos),
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    // Step C: split_to() creates a new zero copy reference to the buffer.
    fn split_line(&mut self, pos: usize, sep_len: usize) -> LogLine {
        let mut line = self.buf.split_to(pos);
        // Step D: advance the starting position
        self.buf.advance(sep_len);
        self.scanned = 0;
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        self.line_count += 1;
        (line.freeze(), self.line_count)
    }
}

/// Convert a line to a String, replacing invalid UTF-8 sequences with U+FFFD.
pub fn bytes_to_string(bytes: &Bytes) -> String {
    String::from_utf8_lossy(&bytes[..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_lines(reader: &'static str, chunk_size: usize) -> Vec<LogLine> {
        let lines: Result<Vec<LogLine>> =
            BytesLines::with_chunk_size(std::io::Cursor::new(reader), chunk_size).collect();
        lines.unwrap()
    }

    #[test]
    fn test_iterator() {
        for chunk_size in [1, 3, 8192] {
            let lines = get_lines("first\nsecond\n\nfourth\r\nfifth", chunk_size);
            assert_eq!(
                lines,
                vec![
                    ("first".into(), 1),
                    ("second".into(), 2),
                    ("".into(), 3),
                    ("fourth".into(), 4),
                    ("fifth".into(), 5),
                ]
            );
        }
    }

    #[test]
    fn test_trailing_newline() {
        assert_eq!(get_lines("first\n", 2), vec![("first".into(), 1)]);
        assert_eq!(get_lines("", 2), vec![]);
    }

    #[test]
    fn test_long_line() {
        let long = "x".repeat(100_000);
        let input: &'static str = Box::leak(format!("{}\nshort", long).into_boxed_str());
        let lines = get_lines(input, 8192);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0.len(), 100_000);
        assert_eq!(lines[1], ("short".into(), 2));
    }

    #[test]
    fn test_lossy_conversion() {
        let bytes = Bytes::from_static(b"caf\xe9 ok");
        assert_eq!(bytes_to_string(&bytes), "caf\u{FFFD} ok");
    }

    struct FailingReader(bool);
    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.0 {
                Err(std::io::Error::new(ErrorKind::Other, "boom"))
            } else {
                self.0 = true;
                buf[..4].copy_from_slice(b"a\nbc");
                Ok(4)
            }
        }
    }

    #[test]
    fn test_read_error_stops() {
        let mut lines = BytesLines::new(FailingReader(false));
        assert_eq!(lines.next().unwrap().unwrap(), ("a".into(), 1));
        assert!(lines.next().unwrap().is_err());
        assert!(lines.next().is_none());
    }
}
