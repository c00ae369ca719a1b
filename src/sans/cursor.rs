//! Bounded reads from a packet buffer.

use thiserror::Error;

/// Unexpectedly reached the end of the buffer.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unexpectedly reached the end of the buffer ({needed} needed, {available} available).")]
pub struct EndOfSlice {
    pub needed: usize,
    pub available: usize,
}

/// A read position within a borrowed byte buffer.
///
/// The position never exceeds the buffer length.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Take an exact number of bytes, advancing the position.
    pub fn take<const N: usize>(&mut self) -> Result<[u8; N], EndOfSlice> {
        let (head, _) = self.bytes[self.position..]
            .split_first_chunk::<N>()
            .ok_or(EndOfSlice {
                needed: N,
                available: self.remaining(),
            })?;

        self.position += N;

        Ok(*head)
    }

    /// Take a run of bytes, advancing the position.
    pub fn take_slice(&mut self, len: usize) -> Result<&'a [u8], EndOfSlice> {
        if len > self.remaining() {
            Err(EndOfSlice {
                needed: len,
                available: self.remaining(),
            })?;
        }

        let s = self.position;
        self.position += len;

        Ok(&self.bytes[s..self.position])
    }

    /// Move to an absolute position, clamped to the end of the buffer.
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.bytes.len());
    }

    /// Peek at the next two bytes as a big-endian integer.
    pub fn peek_u16(&self) -> Option<u16> {
        self.bytes[self.position..]
            .first_chunk::<2>()
            .map(|b| u16::from_be_bytes(*b))
    }
}
