//! Bounds-checked forward-only reader over a section buffer.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::CursorError;
use crate::time;

/// Result type for cursor primitives.
pub type CursorResult<T> = Result<T, CursorError>;

/// A forward-only reader over an immutable byte buffer.
///
/// Every primitive checks the remaining length first and returns
/// [`CursorError::Overflow`] instead of reading past the end. The end can
/// be pulled in with [`truncate_to`](Self::truncate_to), which is how the
/// section length field bounds the table decoders.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            end: buf.len(),
        }
    }

    /// Current read offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the (possibly truncated) end.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.end
    }

    /// Move the end of the readable window to absolute offset `n`.
    ///
    /// `n` must lie strictly after the current position and must not exceed
    /// the current end.
    pub fn truncate_to(&mut self, n: usize) -> CursorResult<()> {
        if n <= self.pos || n > self.end {
            return Err(CursorError::Overflow {
                offset: self.pos,
                wanted: n.saturating_sub(self.pos),
                available: self.remaining(),
            });
        }
        self.end = n;
        Ok(())
    }

    fn take(&mut self, n: usize) -> CursorResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CursorError::Overflow {
                offset: self.pos,
                wanted: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CursorResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> CursorResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Big-endian 16-bit read.
    pub fn u16(&mut self) -> CursorResult<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// Big-endian 24-bit read.
    pub fn u24(&mut self) -> CursorResult<u32> {
        let [a, b, c] = self.array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Big-endian 32-bit read.
    pub fn u32(&mut self) -> CursorResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn bytes(&mut self, n: usize) -> CursorResult<&'a [u8]> {
        self.take(n)
    }

    /// A new cursor over the next `n` bytes; this cursor skips past them.
    pub fn sub(&mut self, n: usize) -> CursorResult<ByteCursor<'a>> {
        self.take(n).map(ByteCursor::new)
    }

    /// 5-byte MJD + BCD UTC field. `None` is the all-0xFF "unknown" value.
    pub fn date_time(&mut self) -> CursorResult<Option<DateTime<Utc>>> {
        time::decode_date_time(self.array()?)
    }

    /// 3-byte BCD `hh:mm:ss` field.
    pub fn duration(&mut self) -> CursorResult<Duration> {
        Ok(time::decode_duration(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x01, 0x02];
        let mut cur = ByteCursor::new(&data);

        assert_eq!(cur.u8().unwrap(), 0x12);
        assert_eq!(cur.u16().unwrap(), 0x3456);
        assert_eq!(cur.u24().unwrap(), 0x789ABC);
        assert_eq!(cur.u32().unwrap(), 0xDEF00102);
        assert!(cur.is_eof());
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn test_overflow() {
        let data = [0x01, 0x02, 0x03];
        let mut cur = ByteCursor::new(&data);

        assert_eq!(cur.bytes(2).unwrap(), &[0x01, 0x02]);
        let err = cur.u16().unwrap_err();
        assert_eq!(
            err,
            CursorError::Overflow {
                offset: 2,
                wanted: 2,
                available: 1
            }
        );
        // A failed read does not move the cursor.
        assert_eq!(cur.position(), 2);
        assert_eq!(cur.u8().unwrap(), 0x03);
        assert!(cur.u8().is_err());
    }

    #[test]
    fn test_truncate_to() {
        let data = [0u8; 10];
        let mut cur = ByteCursor::new(&data);
        cur.bytes(3).unwrap();

        // Not strictly past the position.
        assert!(cur.truncate_to(2).is_err());
        assert!(cur.truncate_to(3).is_err());
        // Past the buffer.
        assert!(cur.truncate_to(11).is_err());

        cur.truncate_to(5).unwrap();
        assert_eq!(cur.remaining(), 2);
        assert!(cur.bytes(3).is_err());
        assert_eq!(cur.bytes(2).unwrap().len(), 2);
        assert!(cur.is_eof());

        // A truncated window cannot be widened again.
        let mut cur = ByteCursor::new(&data);
        cur.truncate_to(4).unwrap();
        assert!(cur.truncate_to(6).is_err());
    }

    #[test]
    fn test_sub_cursor() {
        let data = [0xAA, 0x01, 0x02, 0xBB];
        let mut cur = ByteCursor::new(&data);
        cur.u8().unwrap();

        let mut sub = cur.sub(2).unwrap();
        assert_eq!(sub.position(), 0);
        assert_eq!(sub.u16().unwrap(), 0x0102);
        assert!(sub.is_eof());
        assert_eq!(cur.u8().unwrap(), 0xBB);

        assert!(cur.sub(1).is_err());
    }

    #[test]
    fn test_date_time_and_duration() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x30, 0x00];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(cur.date_time().unwrap(), None);
        assert_eq!(cur.duration().unwrap(), Duration::from_secs(30 * 60));

        let mut short = ByteCursor::new(&data[..4]);
        assert!(matches!(
            short.date_time(),
            Err(CursorError::Overflow { .. })
        ));
    }
}
