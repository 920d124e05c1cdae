//! Rewindable wrapper around the caller's byte stream.
//!
//! Prescan needs to look at a bounded prefix of the input without consuming
//! it. `peek` reads ahead and then re-chains the consumed bytes in front of
//! the remaining stream, so the next reader always observes the stream from
//! byte zero, on the error paths too.

use std::io::{self, Read};

pub struct Input {
    stream: Box<dyn Read + Send>,
}

impl Input {
    pub fn new(reader: impl Read + Send + 'static) -> Input {
        Input {
            stream: Box::new(reader),
        }
    }

    /// Reads up to `limit` bytes and returns them, leaving the stream
    /// positioned back at byte zero.
    pub fn peek(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let mut bytes = vec![0u8; limit];
        let mut filled = 0;
        while filled < limit {
            let n = self.stream.read(&mut bytes[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        bytes.truncate(filled);
        let rest = std::mem::replace(&mut self.stream, Box::new(io::empty()));
        self.stream = Box::new(io::Cursor::new(bytes.clone()).chain(rest));
        Ok(bytes)
    }

    pub fn into_stream(self) -> Box<dyn Read + Send> {
        self.stream
    }

    pub fn into_buffered_stream(self, capacity: usize) -> io::BufReader<Box<dyn Read + Send>> {
        io::BufReader::with_capacity(capacity, self.stream)
    }
}
