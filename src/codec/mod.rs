//! Pixel-plane compression methods.
//!
//! Every channel of every layer, and the merged image at the end of the
//! document, starts with a u16 compression method:
//!
//! | id | method                      | support               |
//! |----|-----------------------------|-----------------------|
//! | 0  | raw                         | decode + encode       |
//! | 1  | RLE (PackBits per scanline) | decode + encode       |
//! | 2  | ZIP                         | recognised only       |
//! | 3  | ZIP with prediction         | recognised only       |
//!
//! # RLE layout
//! An RLE payload is a table of compressed scanline sizes (u16 each, u32 in
//! large documents) for every row of every plane, followed by all scanlines
//! back to back.  A layer channel holds one plane; the merged image holds
//! `channels` planes sharing one table.

pub mod packbits;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Fault, PsdError, Result};
use crate::io_stream::Reader;

// ── Compression id ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Compression {
    Raw           = 0,
    Rle           = 1,
    Zip           = 2,
    ZipPrediction = 3,
}

impl Compression {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Compression::Raw),
            1 => Some(Compression::Rle),
            2 => Some(Compression::Zip),
            3 => Some(Compression::ZipPrediction),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::Raw           => "raw",
            Compression::Rle           => "rle",
            Compression::Zip           => "zip",
            Compression::ZipPrediction => "zip-prediction",
        }
    }

    /// Read the method field, rejecting unknown ids.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let start = r.position();
        let v = r.read_u16()?;
        Compression::from_u16(v).ok_or_else(|| {
            PsdError::new(
                r.section(),
                start,
                Fault::Format {
                    what:     "compression method",
                    expected: "0, 1, 2 or 3".into(),
                    found:    v.to_string(),
                },
            )
        })
    }
}

// ── Plane geometry ───────────────────────────────────────────────────────────

/// Shape of the planes a payload decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub planes:    usize,
    pub rows:      usize,
    pub row_bytes: usize,
    /// Large-document RLE tables use u32 counts.
    pub wide:      bool,
}

impl PlaneLayout {
    pub fn plane_len(&self) -> Option<usize> {
        self.rows.checked_mul(self.row_bytes)
    }

    fn total_len(&self) -> Option<usize> {
        self.plane_len()?.checked_mul(self.planes)
    }
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait PlaneCodec: Send + Sync {
    fn compression(&self) -> Compression;

    /// Decode the payload that follows the method field into
    /// `layout.planes` buffers.
    fn decode(&self, r: &mut Reader<'_>, layout: PlaneLayout) -> Result<Vec<Vec<u8>>>;

    /// Encode `planes` (each `rows * row_bytes` long); the method field is
    /// written by the caller.
    fn encode(&self, planes: &[&[u8]], layout: PlaneLayout, out: &mut Vec<u8>) -> io::Result<()>;
}

fn dimension_fault(r: &Reader<'_>, layout: PlaneLayout) -> PsdError {
    r.fault(Fault::Bounds {
        declared:  (layout.planes as u64)
            .saturating_mul(layout.rows as u64)
            .saturating_mul(layout.row_bytes as u64),
        available: r.remaining() as u64,
    })
}

fn check_plane<'p>(plane: &'p [u8], layout: PlaneLayout) -> io::Result<&'p [u8]> {
    if Some(plane.len()) != layout.plane_len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "plane holds {} bytes, expected {} rows of {}",
                plane.len(),
                layout.rows,
                layout.row_bytes
            ),
        ));
    }
    Ok(plane)
}

// ── Raw ──────────────────────────────────────────────────────────────────────

pub struct RawCodec;

impl PlaneCodec for RawCodec {
    fn compression(&self) -> Compression { Compression::Raw }

    fn decode(&self, r: &mut Reader<'_>, layout: PlaneLayout) -> Result<Vec<Vec<u8>>> {
        let plane_len = layout.plane_len().ok_or_else(|| dimension_fault(r, layout))?;
        match layout.total_len() {
            Some(total) if total <= r.remaining() => {}
            _ => return Err(dimension_fault(r, layout)),
        }
        let mut planes = Vec::with_capacity(layout.planes);
        for _ in 0..layout.planes {
            planes.push(r.bytes(plane_len)?.to_vec());
        }
        Ok(planes)
    }

    fn encode(&self, planes: &[&[u8]], layout: PlaneLayout, out: &mut Vec<u8>) -> io::Result<()> {
        for plane in planes {
            out.write_all(check_plane(plane, layout)?)?;
        }
        Ok(())
    }
}

// ── RLE ──────────────────────────────────────────────────────────────────────

pub struct RleCodec;

/// Worst-case PackBits expansion: two bytes yield 128.
const MAX_EXPANSION: u64 = 64;

impl RleCodec {
    fn read_counts(r: &mut Reader<'_>, entries: usize, wide: bool) -> Result<Vec<usize>> {
        let width = if wide { 4 } else { 2 };
        let table_len = (entries as u64).saturating_mul(width);
        let table = r.bytes_u64(table_len)?;
        Ok(table
            .chunks_exact(width as usize)
            .map(|c| if wide { BigEndian::read_u32(c) as usize } else { BigEndian::read_u16(c) as usize })
            .collect())
    }
}

impl PlaneCodec for RleCodec {
    fn compression(&self) -> Compression { Compression::Rle }

    fn decode(&self, r: &mut Reader<'_>, layout: PlaneLayout) -> Result<Vec<Vec<u8>>> {
        let entries = layout
            .planes
            .checked_mul(layout.rows)
            .ok_or_else(|| dimension_fault(r, layout))?;
        let counts = Self::read_counts(r, entries, layout.wide)?;

        let compressed: u64 = counts.iter().map(|&c| c as u64).sum();
        if compressed > r.remaining() as u64 {
            return Err(r.fault(Fault::Bounds {
                declared:  compressed,
                available: r.remaining() as u64,
            }));
        }
        // Bound the allocation by what the compressed bytes could possibly
        // expand to.
        let plane_len = layout.plane_len().ok_or_else(|| dimension_fault(r, layout))?;
        let decoded = (plane_len as u64).saturating_mul(layout.planes as u64);
        if decoded > compressed.saturating_mul(MAX_EXPANSION) {
            return Err(r.fault(Fault::Bounds { declared: decoded, available: compressed }));
        }

        let mut planes = Vec::with_capacity(layout.planes);
        for plane_counts in counts.chunks(layout.rows.max(1)).take(layout.planes) {
            let mut plane = vec![0u8; plane_len];
            for (row, &n) in plane.chunks_mut(layout.row_bytes.max(1)).zip(plane_counts) {
                let start = r.position();
                let src = r.bytes(n)?;
                packbits::decode_scanline(src, row)
                    .map_err(|f| PsdError::new(r.section(), start, f))?;
            }
            planes.push(plane);
        }
        // Zero-row planes never enter the loop above.
        planes.resize_with(layout.planes, Vec::new);
        Ok(planes)
    }

    fn encode(&self, planes: &[&[u8]], layout: PlaneLayout, out: &mut Vec<u8>) -> io::Result<()> {
        let mut all_counts = Vec::with_capacity(planes.len() * layout.rows);
        let mut body = Vec::new();
        for plane in planes {
            let plane = check_plane(plane, layout)?;
            if layout.row_bytes == 0 {
                all_counts.extend(std::iter::repeat(0).take(layout.rows));
                continue;
            }
            let (counts, packed) = packbits::encode_rows(plane, layout.row_bytes);
            all_counts.extend(counts);
            body.extend(packed);
        }
        for n in all_counts {
            if layout.wide {
                let n = u32::try_from(n)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "scanline too long"))?;
                out.write_u32::<BigEndian>(n)?;
            } else {
                let n = u16::try_from(n)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "scanline too long"))?;
                out.write_u16::<BigEndian>(n)?;
            }
        }
        out.write_all(&body)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a compression method to its codec.  ZIP methods are recognised
/// but have no codec in this build.
pub fn get_codec(method: Compression) -> Result<Box<dyn PlaneCodec>, Fault> {
    match method {
        Compression::Raw => Ok(Box::new(RawCodec)),
        Compression::Rle => Ok(Box::new(RleCodec)),
        Compression::Zip | Compression::ZipPrediction => Err(Fault::Unsupported(format!(
            "{} compressed pixel data",
            method.name()
        ))),
    }
}
