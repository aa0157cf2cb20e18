//! Endian-aware payload writer and bounds-checked reader.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtoError;
use crate::packet::Endian;

/// Builds a payload in a fixed byte order.
#[derive(Debug)]
pub struct WireWriter {
    buf: BytesMut,
    endian: Endian,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
            endian,
        }
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        match self.endian {
            Endian::Little => self.buf.put_u16_le(v),
            Endian::Big => self.buf.put_u16(v),
        }
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        match self.endian {
            Endian::Little => self.buf.put_u32_le(v),
            Endian::Big => self.buf.put_u32(v),
        }
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.put_u32(v as u32)
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        match self.endian {
            Endian::Little => self.buf.put_u64_le(v),
            Endian::Big => self.buf.put_u64(v),
        }
        self
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    /// Append `s` followed by a NUL byte.
    pub fn put_cstr(&mut self, s: &str) -> &mut Self {
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
        self
    }

    /// Pad with zero bytes up to a multiple of `align`.
    pub fn pad_to(&mut self, align: usize) -> &mut Self {
        while self.buf.len() % align != 0 {
            self.buf.put_u8(0);
        }
        self
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and hand out the payload.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Reads fields off a payload, failing instead of panicking on short input.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    total: usize,
    endian: Endian,
    what: &'static str,
}

impl<'a> WireReader<'a> {
    /// Wrap `buf`; `what` names the structure in error messages.
    pub fn new(buf: &'a [u8], endian: Endian, what: &'static str) -> Self {
        Self {
            buf,
            total: buf.len(),
            endian,
            what,
        }
    }

    fn need(&self, n: usize) -> Result<(), ProtoError> {
        if self.buf.len() < n {
            return Err(ProtoError::Truncated {
                what: self.what,
                need: n,
                have: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Offset of the next unread byte from the start of the payload.
    pub fn position(&self) -> usize {
        self.total - self.buf.len()
    }

    pub fn u8(&mut self) -> Result<u8, ProtoError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, ProtoError> {
        self.need(2)?;
        Ok(match self.endian {
            Endian::Little => self.buf.get_u16_le(),
            Endian::Big => self.buf.get_u16(),
        })
    }

    pub fn u32(&mut self) -> Result<u32, ProtoError> {
        self.need(4)?;
        Ok(match self.endian {
            Endian::Little => self.buf.get_u32_le(),
            Endian::Big => self.buf.get_u32(),
        })
    }

    pub fn i32(&mut self) -> Result<i32, ProtoError> {
        self.u32().map(|v| v as i32)
    }

    pub fn u64(&mut self) -> Result<u64, ProtoError> {
        self.need(8)?;
        Ok(match self.endian {
            Endian::Little => self.buf.get_u64_le(),
            Endian::Big => self.buf.get_u64(),
        })
    }

    /// Take exactly `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Take everything that is left.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// Read a NUL-terminated string, replacing invalid UTF-8.
    pub fn cstr(&mut self) -> Result<String, ProtoError> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or(ProtoError::UnterminatedString(self.what))?;
        let s = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf = &self.buf[end + 1..];
        Ok(s)
    }

    /// Skip padding so the next read starts on a multiple of `align`
    /// (relative to the payload start).
    pub fn align(&mut self, align: usize) {
        let pad = (align - self.position() % align) % align;
        let pad = pad.min(self.buf.len());
        self.buf = &self.buf[pad..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_little_endian_layout() {
        let mut w = WireWriter::new(Endian::Little);
        w.put_u16(0x0102).put_u32(0x03040506).put_i32(-1);
        assert_eq!(
            w.into_vec(),
            vec![0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn writer_big_endian_layout() {
        let mut w = WireWriter::new(Endian::Big);
        w.put_u64(0x0102030405060708);
        assert_eq!(w.into_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn reader_follows_endianness() {
        let data = [0x00, 0x00, 0x01, 0x00];
        assert_eq!(WireReader::new(&data, Endian::Little, "t").u32().unwrap(), 0x0001_0000);
        assert_eq!(WireReader::new(&data, Endian::Big, "t").u32().unwrap(), 0x0000_0100);
    }

    #[test]
    fn reader_short_input_is_an_error() {
        let mut r = WireReader::new(&[1, 2, 3], Endian::Little, "memrd");
        let err = r.u64().unwrap_err();
        assert_eq!(
            err,
            ProtoError::Truncated {
                what: "memrd",
                need: 8,
                have: 3
            }
        );
    }

    #[test]
    fn reader_cstr_and_align() {
        let mut w = WireWriter::new(Endian::Little);
        w.put_i32(5).put_cstr("init").pad_to(4).put_u32(99);
        let data = w.into_vec();

        let mut r = WireReader::new(&data, Endian::Little, "page");
        assert_eq!(r.i32().unwrap(), 5);
        assert_eq!(r.cstr().unwrap(), "init");
        r.align(4);
        assert_eq!(r.position(), 12);
        assert_eq!(r.u32().unwrap(), 99);
        assert!(r.is_empty());
    }

    #[test]
    fn reader_unterminated_string() {
        let mut r = WireReader::new(b"abc", Endian::Little, "exec");
        assert_eq!(r.cstr().unwrap_err(), ProtoError::UnterminatedString("exec"));
    }
}
