//! Byte buffer with an explicit read cursor.
//!
//! The handshake engine stages exactly one in-flight handshake message in a
//! `Buffer`, and the record layer stages record headers and payloads the same
//! way. The buffer tracks written bytes, a read cursor over them, and a
//! `wiped` flag that distinguishes "never filled" from "filled and fully
//! drained" -- the distinction that lets a blocked write be retried without
//! re-encoding the message.

/// Growable byte buffer with separate write and read positions.
#[derive(Debug, Clone)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    wiped: bool,
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            read_pos: 0,
            wiped: true,
        }
    }

    /// Whether the buffer has not been written to since the last wipe.
    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Total bytes written since the last wipe.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if no bytes have been written since the last wipe.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes written but not yet read.
    pub fn available(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// All bytes written since the last wipe, including already-read ones.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The unread bytes.
    pub fn peek(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    /// Append bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.wiped = false;
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
        self.wiped = false;
    }

    /// Append a big-endian u16.
    pub fn write_u16(&mut self, value: u16) {
        self.write(&value.to_be_bytes());
    }

    /// Append a 24-bit big-endian length.
    pub fn write_u24(&mut self, value: u32) {
        self.write(&[
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
        ]);
    }

    /// Overwrite previously written bytes at `pos`. Used to backfill length
    /// fields once a message body is complete.
    pub fn overwrite(&mut self, pos: usize, bytes: &[u8]) {
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
    }

    /// Read one byte, advancing the cursor.
    pub fn read_u8(&mut self) -> Option<u8> {
        let bytes = self.read_bytes(1)?;
        Some(bytes[0])
    }

    /// Read a big-endian u16, advancing the cursor.
    pub fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.read_bytes(2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a 24-bit big-endian length, advancing the cursor.
    pub fn read_u24(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(3)?;
        Some(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
    }

    /// Read exactly `n` bytes, or `None` if fewer are available.
    pub fn read_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.available() < n {
            return None;
        }
        let bytes = self.data[self.read_pos..self.read_pos + n].to_vec();
        self.read_pos += n;
        Some(bytes)
    }

    /// Read up to `n` bytes, advancing the cursor past whatever was taken.
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.available());
        let bytes = self.data[self.read_pos..self.read_pos + n].to_vec();
        self.read_pos += n;
        bytes
    }

    /// Reset the read cursor to the start without discarding data.
    pub fn reread(&mut self) {
        self.read_pos = 0;
    }

    /// Discard all contents. The buffer reports wiped until written again.
    pub fn wipe(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.wiped = true;
    }

    /// Wipe and release the backing allocation.
    pub fn resize(&mut self, capacity: usize) {
        self.data = Vec::with_capacity(capacity);
        self.read_pos = 0;
        self.wiped = true;
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read() {
        let mut buf = Buffer::new();
        assert!(buf.is_wiped());

        buf.write(&[1, 2, 3, 4]);
        assert!(!buf.is_wiped());
        assert_eq!(buf.available(), 4);

        assert_eq!(buf.read_u8(), Some(1));
        assert_eq!(buf.read_bytes(2), Some(vec![2, 3]));
        assert_eq!(buf.available(), 1);
        assert_eq!(buf.read_bytes(2), None);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_take_is_bounded() {
        let mut buf = Buffer::new();
        buf.write(&[5, 6, 7]);
        assert_eq!(buf.take(10), vec![5, 6, 7]);
        assert_eq!(buf.take(10), Vec::<u8>::new());
    }

    #[test]
    fn test_reread() {
        let mut buf = Buffer::new();
        buf.write(&[1, 2, 3]);
        assert_eq!(buf.read_u8(), Some(1));
        buf.reread();
        assert_eq!(buf.available(), 3);
        assert_eq!(buf.read_u8(), Some(1));
    }

    #[test]
    fn test_wipe_resets_state() {
        let mut buf = Buffer::new();
        buf.write(&[1, 2]);
        buf.wipe();
        assert!(buf.is_wiped());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.available(), 0);
    }

    #[test]
    fn test_u16_u24_roundtrip() {
        let mut buf = Buffer::new();
        buf.write_u16(0x0303);
        buf.write_u24(0x012345);
        assert_eq!(buf.read_u16(), Some(0x0303));
        assert_eq!(buf.read_u24(), Some(0x012345));
    }

    #[test]
    fn test_overwrite() {
        let mut buf = Buffer::new();
        buf.write(&[1, 0, 0, 0, 9]);
        buf.overwrite(1, &[7, 8, 9]);
        assert_eq!(buf.as_slice(), &[1, 7, 8, 9, 9]);
    }
}
