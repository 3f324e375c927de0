//! Pull-based upload source for a single send.

use std::io::{self, Read};

/// Rendered message bytes plus a read cursor.
///
/// A transfer pulls the body through [`Payload::next_chunk`] (or `Read`) in
/// whatever sizes it likes. Each send creates its own payload, so the cursor
/// always starts at zero.
#[derive(Debug, Clone)]
pub struct Payload {
    data: Vec<u8>,
    position: usize,
}

impl Payload {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    /// Next slice of at most `max` bytes, or `None` once everything was handed out.
    pub fn next_chunk(&mut self, max: usize) -> Option<&[u8]> {
        if max == 0 || self.position >= self.data.len() {
            return None;
        }
        let start = self.position;
        let end = (start + max).min(self.data.len());
        self.position = end;
        Some(&self.data[start..end])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.next_chunk(buf.len()) {
            Some(chunk) => {
                let n = chunk.len();
                buf[..n].copy_from_slice(chunk);
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_reassemble() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        for size in [1, 7, 64, 999, 1000, 4096] {
            let mut payload = Payload::new(data.clone());
            let mut collected = Vec::new();
            while let Some(chunk) = payload.next_chunk(size) {
                assert!(chunk.len() <= size);
                collected.extend_from_slice(chunk);
            }
            assert_eq!(collected, data);
            assert_eq!(payload.remaining(), 0);
        }
    }

    #[test]
    fn test_end_and_rewind() {
        let mut payload = Payload::new(b"abc".to_vec());
        assert_eq!(payload.next_chunk(0), None);
        assert_eq!(payload.next_chunk(2), Some(&b"ab"[..]));
        assert_eq!(payload.position(), 2);
        assert_eq!(payload.next_chunk(2), Some(&b"c"[..]));
        assert_eq!(payload.next_chunk(2), None);

        payload.rewind();
        assert_eq!(payload.remaining(), 3);
    }

    #[test]
    fn test_read_impl() {
        let mut payload = Payload::new(b"hello world".to_vec());
        let mut out = String::new();
        payload.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_empty_payload() {
        let mut payload = Payload::new(Vec::new());
        assert!(payload.is_empty());
        assert_eq!(payload.next_chunk(16), None);
    }
}
