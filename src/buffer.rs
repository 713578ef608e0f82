//! Byte cursors for the little-endian wire format.
//!
//! `BufferReader` walks a borrowed slice and never reads past its end;
//! `BufferWriter` appends into an owned, pre-sized `Vec<u8>`. Both track the
//! current offset so callers can hand sub-slices to nested decoders and
//! advance by the exact number of bytes consumed.

use thiserror::Error;

/// Errors produced by the byte cursors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// A read needed more bytes than remain in the buffer.
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A length prefix does not fit in this platform's `usize`.
    #[error("length prefix {0} does not fit in memory")]
    LengthOverflow(u64),
}

/// Variable-length integer (CompactSize) helpers.
pub mod varint {
    /// Number of bytes needed to encode `n` as a var-int.
    pub fn encoding_length(n: u64) -> usize {
        match n {
            0..=0xfc => 1,
            0xfd..=0xffff => 3,
            0x1_0000..=0xffff_ffff => 5,
            _ => 9,
        }
    }
}

/// Encoded size of a length-prefixed byte slice.
pub fn var_slice_size(slice: &[u8]) -> usize {
    varint::encoding_length(slice.len() as u64) + slice.len()
}

/// Encoded size of a count-prefixed list of length-prefixed byte slices.
pub fn vector_size(items: &[Vec<u8>]) -> usize {
    varint::encoding_length(items.len() as u64)
        + items.iter().map(|i| var_slice_size(i)).sum::<usize>()
}

/// Read cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> BufferReader<'a> {
    /// Cursor positioned at the start of `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Current read position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buffer[self.offset..]
    }

    /// Advance the cursor by `n` bytes without interpreting them.
    pub fn skip(&mut self, n: usize) -> Result<(), BufferError> {
        self.read_slice(n).map(|_| ())
    }

    /// Read the next `n` bytes as a borrowed slice.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], BufferError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(BufferError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let out = &self.buffer[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    /// Read the next `N` bytes into a fixed array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_slice(N)?);
        Ok(arr)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, BufferError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a CompactSize integer. Non-minimal encodings are accepted.
    pub fn read_var_int(&mut self) -> Result<u64, BufferError> {
        match self.read_u8()? {
            0xfd => self.read_u16().map(u64::from),
            0xfe => self.read_u32().map(u64::from),
            0xff => self.read_u64(),
            n => Ok(u64::from(n)),
        }
    }

    /// Read a var-int used as a length or count.
    pub fn read_var_len(&mut self) -> Result<usize, BufferError> {
        let n = self.read_var_int()?;
        usize::try_from(n)
            .map_err(|_| BufferError::LengthOverflow(n))
    }

    /// Read a var-int length followed by that many bytes.
    pub fn read_var_slice(&mut self) -> Result<&'a [u8], BufferError> {
        let len = self.read_var_len()?;
        self.read_slice(len)
    }

    /// Read a var-int count followed by that many var-slices.
    pub fn read_vector(&mut self) -> Result<Vec<Vec<u8>>, BufferError> {
        let count = self.read_var_len()?;
        // Each item needs at least its one-byte length prefix.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(self.read_var_slice()?.to_vec());
        }
        Ok(items)
    }
}

/// Append cursor over an owned buffer.
#[derive(Debug, Default)]
pub struct BufferWriter {
    buffer: Vec<u8>,
}

impl BufferWriter {
    /// Writer whose buffer is pre-sized to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// The written bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Append raw bytes.
    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buffer.push(v);
    }

    /// Append a little-endian `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.write_slice(&v.to_le_bytes());
    }

    /// Append a little-endian `u32`.
    pub fn write_u32(&mut self, v: u32) {
        self.write_slice(&v.to_le_bytes());
    }

    /// Append a little-endian `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.write_slice(&v.to_le_bytes());
    }

    /// Write `n` in its minimal CompactSize form.
    pub fn write_var_int(&mut self, n: u64) {
        match varint::encoding_length(n) {
            1 => self.write_u8(n as u8),
            3 => {
                self.write_u8(0xfd);
                self.write_slice(&(n as u16).to_le_bytes());
            }
            5 => {
                self.write_u8(0xfe);
                self.write_u32(n as u32);
            }
            _ => {
                self.write_u8(0xff);
                self.write_u64(n);
            }
        }
    }

    /// Append a var-int length followed by the bytes.
    pub fn write_var_slice(&mut self, bytes: &[u8]) {
        self.write_var_int(bytes.len() as u64);
        self.write_slice(bytes);
    }

    /// Append a var-int count followed by each item as a var-slice.
    pub fn write_vector(&mut self, items: &[Vec<u8>]) {
        self.write_var_int(items.len() as u64);
        for item in items {
            self.write_var_slice(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_int_boundaries() {
        for (n, len) in [
            (0u64, 1),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x1_0000, 5),
            (0xffff_ffff, 5),
            (0x1_0000_0000, 9),
        ] {
            let mut w = BufferWriter::default();
            w.write_var_int(n);
            let bytes = w.into_inner();
            assert_eq!(bytes.len(), len, "length for {n:#x}");
            assert_eq!(varint::encoding_length(n), len);
            assert_eq!(BufferReader::new(&bytes).read_var_int().unwrap(), n);
        }
    }

    #[test]
    fn var_int_accepts_non_minimal() {
        let bytes = [0xfd, 0x01, 0x00];
        let mut r = BufferReader::new(&bytes);
        assert_eq!(r.read_var_int().unwrap(), 1);
        assert_eq!(r.offset(), 3);
    }

    #[test]
    fn little_endian_integers() {
        let bytes = hex::decode("ffffffff0100000002000000000000007f").unwrap();
        let mut r = BufferReader::new(&bytes);
        assert_eq!(r.read_i32().unwrap(), -1);
        assert_eq!(r.read_u32().unwrap(), 1);
        assert_eq!(r.read_u64().unwrap(), 2);
        assert_eq!(r.remaining(), 1);
        assert_eq!(r.rest(), &[0x7f]);
    }

    #[test]
    fn read_past_end_fails() {
        let bytes = [1u8, 2, 3];
        let mut r = BufferReader::new(&bytes);
        assert_eq!(
            r.read_u32().unwrap_err(),
            BufferError::UnexpectedEof {
                needed: 4,
                remaining: 3,
            }
        );
        // a failed read does not move the cursor
        assert_eq!(r.offset(), 0);
        assert_eq!(r.read_slice(3).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn vector_layout() {
        let items = vec![vec![], vec![0xaa; 3]];
        let mut w = BufferWriter::default();
        w.write_vector(&items);
        let bytes = w.into_inner();
        assert_eq!(bytes, vec![2, 0, 3, 0xaa, 0xaa, 0xaa]);
        assert_eq!(vector_size(&items), bytes.len());
        assert_eq!(BufferReader::new(&bytes).read_vector().unwrap(), items);
    }

    #[test]
    fn truncated_vector_fails() {
        // claims two items, provides one
        let bytes = [2u8, 1, 0xaa];
        assert!(matches!(
            BufferReader::new(&bytes).read_vector(),
            Err(BufferError::UnexpectedEof { .. })
        ));
    }
}
