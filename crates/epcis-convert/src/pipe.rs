//! Bounded in-process byte pipe connecting pipeline legs.
//!
//! Built on a bounded crossbeam channel of chunks: a stalled reader blocks
//! the writer at the channel send, which is the pipeline's backpressure. A
//! dropped reader surfaces as a broken pipe on the writer; a dropped writer
//! is end-of-stream for the reader.

use std::io::{self, Read, Write};

use crossbeam_channel::{bounded, Receiver, Sender};

pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded(capacity);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: io::Cursor::new(Vec::new()),
        },
    )
}

pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx.send(buf.to_vec()).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader disconnected")
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    current: io::Cursor<Vec<u8>>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.current.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            match self.rx.recv() {
                Ok(chunk) => self.current = io::Cursor::new(chunk),
                // all writers gone: end of stream
                Err(_) => return Ok(0),
            }
        }
    }
}
