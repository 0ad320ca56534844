//! Byte-level plumbing shared by every decoder and encoder stage.
//!
//! # Reader
//! [`Reader`] is a forward-only, big-endian cursor over a borrowed byte
//! slice.  Each section hands sub-regions to its children as *windows*:
//! a window is a new `Reader` over exactly the declared length, so a child
//! can never read past its parent's bounds and the parent can check that the
//! child consumed everything.  The reader remembers which [`Section`] it is
//! decoding and its absolute offset in the document, which is all a fault
//! needs to become a user-visible [`PsdError`].
//!
//! # Strings
//! Three string encodings appear throughout the format:
//!
//! | kind      | prefix                | payload                                   |
//! |-----------|-----------------------|-------------------------------------------|
//! | Pascal    | u8 byte count         | bytes (a zero count still costs one byte) |
//! | Unicode   | u32 code-unit count   | UTF-16BE code units                       |
//! | Dynamic   | u32 byte count        | bytes, or a 4-byte tag when the count is 0 |
//!
//! # Writers
//! The `write_*` functions are the encode-side counterparts and operate on
//! any [`Write`].  Lengths that do not fit their field are rejected with
//! `InvalidInput` rather than silently truncated.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Fault, PsdError, Result, Section};
use crate::tag::Tag;

// ── Reader ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf:     &'a [u8],
    pos:     usize,
    /// Absolute offset of `buf[0]` within the whole document.
    base:    u64,
    section: Section,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, base: 0, section: Section::Header }
    }

    /// A reader over a detached payload that still reports absolute offsets.
    pub fn at(buf: &'a [u8], base: u64, section: Section) -> Self {
        Self { buf, pos: 0, base, section }
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn section(&self) -> Section {
        self.section
    }

    /// Switch the section reported in faults; returns the previous one.
    pub fn set_section(&mut self, section: Section) -> Section {
        std::mem::replace(&mut self.section, section)
    }

    /// Attach the current section and offset to `fault`.
    pub fn fault(&self, fault: Fault) -> PsdError {
        PsdError::new(self.section, self.position(), fault)
    }

    /// Consume `n` bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.fault(Fault::Truncated {
                needed:    n as u64,
                remaining: self.remaining() as u64,
            }));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Consume `n` bytes where `n` comes from a wide length field.
    pub fn bytes_u64(&mut self, n: u64) -> Result<&'a [u8]> {
        let n = self.checked_len(n, false)?;
        self.bytes(n)
    }

    /// Consume everything left.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.bytes_u64(n).map(|_| ())
    }

    /// Carve off a window of `len` bytes.  A length larger than what remains
    /// is a `Bounds` fault: the declared size itself is wrong.
    pub fn window(&mut self, len: u64, section: Section) -> Result<Reader<'a>> {
        let n = self.checked_len(len, true)?;
        let base = self.position();
        let buf = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(Reader { buf, pos: 0, base, section })
    }

    fn checked_len(&self, len: u64, bounds: bool) -> Result<usize> {
        let remaining = self.remaining() as u64;
        if len > remaining {
            let fault = if bounds {
                Fault::Bounds { declared: len, available: remaining }
            } else {
                Fault::Truncated { needed: len, remaining }
            };
            return Err(self.fault(fault));
        }
        Ok(len as usize)
    }

    // ── Fixed-width primitives ──────────────────────────────────────────────

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.bytes(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.bytes(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.bytes(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.bytes(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.bytes(8)?))
    }

    pub fn read_tag(&mut self) -> Result<Tag> {
        let b = self.bytes(4)?;
        Ok(Tag([b[0], b[1], b[2], b[3]]))
    }

    /// A length field that is 8 bytes wide in large documents, 4 otherwise.
    pub fn read_length(&mut self, wide: bool) -> Result<u64> {
        if wide {
            self.read_u64()
        } else {
            Ok(self.read_u32()? as u64)
        }
    }

    /// Read a tag and require it to be one of `accepted`.
    pub fn expect_tag(&mut self, what: &'static str, accepted: &[Tag]) -> Result<Tag> {
        let start = self.position();
        let tag = self.read_tag()?;
        if accepted.contains(&tag) {
            return Ok(tag);
        }
        let expected = accepted
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(PsdError::new(
            self.section,
            start,
            Fault::Format { what, expected, found: tag.to_string() },
        ))
    }

    // ── Strings ─────────────────────────────────────────────────────────────

    pub fn read_pascal_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let raw = self.bytes(len)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Pascal string whose total size, length byte included, is padded to a
    /// multiple of `align`.
    pub fn read_padded_pascal_string(&mut self, align: usize) -> Result<String> {
        let start = self.pos;
        let s = self.read_pascal_string()?;
        let used = self.pos - start;
        self.skip(padding(used, align) as u64)?;
        Ok(s)
    }

    pub fn read_unicode_string(&mut self) -> Result<String> {
        let units = self.read_u32()? as u64;
        let raw = self.bytes_u64(units * 2)?;
        let code_units = raw.chunks_exact(2).map(BigEndian::read_u16);
        Ok(char::decode_utf16(code_units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }

    /// Length 0 means a literal four-character tag follows.  Each byte
    /// becomes one char in `U+0000..=U+00FF` so keys re-encode exactly.
    pub fn read_dynamic_string(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        let raw = if len == 0 { self.bytes(4)? } else { self.bytes_u64(len as u64)? };
        Ok(raw.iter().map(|&b| char::from(b)).collect())
    }
}

/// Bytes needed to round `len` up to a multiple of `align`.
#[inline]
pub fn padding(len: usize, align: usize) -> usize {
    if align <= 1 {
        return 0;
    }
    (align - len % align) % align
}

// ── Writers ──────────────────────────────────────────────────────────────────

fn too_long(what: &str, len: usize) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{what} of {len} bytes does not fit its length field"))
}

pub fn write_tag<W: Write>(w: &mut W, tag: Tag) -> io::Result<()> {
    w.write_all(&tag.0)
}

pub fn write_length<W: Write>(w: &mut W, len: u64, wide: bool) -> io::Result<()> {
    if wide {
        w.write_u64::<BigEndian>(len)
    } else {
        let len = u32::try_from(len).map_err(|_| too_long("section", len as usize))?;
        w.write_u32::<BigEndian>(len)
    }
}

pub fn write_zeros<W: Write>(w: &mut W, n: usize) -> io::Result<()> {
    const ZEROS: [u8; 16] = [0; 16];
    let mut left = n;
    while left > 0 {
        let step = left.min(ZEROS.len());
        w.write_all(&ZEROS[..step])?;
        left -= step;
    }
    Ok(())
}

/// Pascal string truncated to 255 bytes on a char boundary, then padded so
/// its total size is a multiple of `align`.  Returns the bytes written.
pub fn write_pascal_string<W: Write>(w: &mut W, s: &str, align: usize) -> io::Result<usize> {
    let mut end = s.len().min(255);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let raw = &s.as_bytes()[..end];
    w.write_u8(raw.len() as u8)?;
    w.write_all(raw)?;
    let pad = padding(1 + raw.len(), align);
    write_zeros(w, pad)?;
    Ok(1 + raw.len() + pad)
}

pub fn write_unicode_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let count = u32::try_from(units.len()).map_err(|_| too_long("unicode string", units.len()))?;
    w.write_u32::<BigEndian>(count)?;
    for u in units {
        w.write_u16::<BigEndian>(u)?;
    }
    Ok(())
}

/// Four-byte strings use the tag form; anything else is length-prefixed.
/// Inverse of [`Reader::read_dynamic_string`]; chars above `U+00FF` have
/// no byte form.
pub fn write_dynamic_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let raw = s
        .chars()
        .map(u8::try_from)
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("dynamic string {s:?} is not single-byte")))?;
    if raw.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "dynamic string cannot be empty"));
    }
    if raw.len() == 4 {
        w.write_u32::<BigEndian>(0)?;
    } else {
        let len = u32::try_from(raw.len()).map_err(|_| too_long("dynamic string", raw.len()))?;
        w.write_u32::<BigEndian>(len)?;
    }
    w.write_all(&raw)
}
