//! Reader adapters for exercising I/O edge cases

use std::io::{self, Read};

/// Returns at most `chunk` bytes per read call
pub struct ChunkedReader<R> {
    inner: R,
    chunk: usize,
}

impl<R: Read> ChunkedReader<R> {
    /// Wrap `inner`; a chunk of 0 is treated as 1
    pub fn new(inner: R, chunk: usize) -> Self {
        Self {
            inner,
            chunk: chunk.max(1),
        }
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = buf.len().min(self.chunk);
        self.inner.read(&mut buf[..limit])
    }
}

/// Yields `prefix`, then fails every subsequent read
pub struct FailingReader {
    prefix: Vec<u8>,
    pos: usize,
    kind: io::ErrorKind,
}

impl FailingReader {
    /// Fail with `kind` once `prefix` is exhausted
    pub fn new(prefix: impl Into<Vec<u8>>, kind: io::ErrorKind) -> Self {
        Self {
            prefix: prefix.into(),
            pos: 0,
            kind,
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.prefix.len() {
            let n = buf.len().min(self.prefix.len() - self.pos);
            buf[..n].copy_from_slice(&self.prefix[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        Err(io::Error::new(self.kind, "injected read failure"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn chunked_reader_limits_each_read() {
        let mut reader = ChunkedReader::new(Cursor::new(vec![7u8; 10]), 3);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
    }

    #[test]
    fn failing_reader_fails_after_prefix() {
        let mut reader = FailingReader::new(b"[1,".to_vec(), io::ErrorKind::BrokenPipe);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(
            reader.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
