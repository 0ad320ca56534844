//! Mask and blending-range sub-records of a layer record, and the global
//! layer mask that follows layer info.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Fault, PsdError, Result, Section};
use crate::io_stream::{write_length, Reader};

use super::Rect;

/// Flag bit announcing that mask parameters follow.
const FLAG_HAS_PARAMETERS: u8 = 0x10;
/// Bytes of a real-mask tail: flags, background, rect.
const REAL_MASK_LEN: usize = 18;

fn read_background(r: &mut Reader<'_>, what: &'static str) -> Result<u8> {
    let start = r.position();
    let v = r.read_u8()?;
    if v != 0 && v != 255 {
        return Err(PsdError::new(
            r.section(),
            start,
            Fault::Format { what, expected: "0 or 255".into(), found: v.to_string() },
        ));
    }
    Ok(v)
}

// ── Layer mask ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaskParameters {
    pub user_density:   Option<u8>,
    pub user_feather:   Option<f64>,
    pub vector_density: Option<u8>,
    pub vector_feather: Option<f64>,
}

impl MaskParameters {
    fn read(r: &mut Reader<'_>) -> Result<Self> {
        let flags = r.read_u8()?;
        let mut p = MaskParameters::default();
        if flags & 1 != 0 { p.user_density = Some(r.read_u8()?); }
        if flags & 2 != 0 { p.user_feather = Some(r.read_f64()?); }
        if flags & 4 != 0 { p.vector_density = Some(r.read_u8()?); }
        if flags & 8 != 0 { p.vector_feather = Some(r.read_f64()?); }
        Ok(p)
    }

    fn write(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let flags = self.user_density.is_some() as u8
            | (self.user_feather.is_some() as u8) << 1
            | (self.vector_density.is_some() as u8) << 2
            | (self.vector_feather.is_some() as u8) << 3;
        out.write_u8(flags)?;
        if let Some(v) = self.user_density { out.write_u8(v)?; }
        if let Some(v) = self.user_feather { out.write_f64::<BigEndian>(v)?; }
        if let Some(v) = self.vector_density { out.write_u8(v)?; }
        if let Some(v) = self.vector_feather { out.write_f64::<BigEndian>(v)?; }
        Ok(())
    }
}

/// The mask actually applied when both a user and a vector mask exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealMask {
    pub flags:      u8,
    pub background: u8,
    pub rect:       Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub rect:          Rect,
    /// 0 or 255.
    pub default_color: u8,
    /// bit 0 position relative to layer, bit 1 disabled, bit 3 from
    /// rendering data, bit 4 parameters present.
    pub flags:         u8,
    pub parameters:    Option<MaskParameters>,
    pub real:          Option<RealMask>,
}

impl Mask {
    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.flags & 2 != 0
    }

    /// Read the length-prefixed mask sub-record; a zero length means none.
    pub fn read(r: &mut Reader<'_>) -> Result<Option<Self>> {
        let len = r.read_u32()? as u64;
        if len == 0 {
            return Ok(None);
        }
        let mut w = r.window(len, r.section())?;
        let rect = Rect::read(&mut w)?;
        let default_color = read_background(&mut w, "mask default color")?;
        let flags = w.read_u8()?;
        let parameters = if flags & FLAG_HAS_PARAMETERS != 0 {
            Some(MaskParameters::read(&mut w)?)
        } else {
            None
        };
        let real = if w.remaining() >= REAL_MASK_LEN {
            let flags = w.read_u8()?;
            let background = read_background(&mut w, "real mask background")?;
            let rect = Rect::read(&mut w)?;
            Some(RealMask { flags, background, rect })
        } else {
            None
        };
        // Two bytes of padding, or filler from newer writers.
        w.rest();
        Ok(Some(Mask { rect, default_color, flags, parameters, real }))
    }

    /// Write the sub-record with its length prefix; `None` writes a zero
    /// length.
    pub fn write_opt<W: Write>(mask: Option<&Mask>, mut writer: W) -> io::Result<()> {
        let Some(mask) = mask else {
            return write_length(&mut writer, 0, false);
        };
        let mut body = Vec::with_capacity(36);
        mask.rect.write(&mut body)?;
        body.write_u8(mask.default_color)?;
        let flags = match mask.parameters {
            Some(_) => mask.flags | FLAG_HAS_PARAMETERS,
            None    => mask.flags & !FLAG_HAS_PARAMETERS,
        };
        body.write_u8(flags)?;
        if let Some(p) = &mask.parameters {
            p.write(&mut body)?;
        }
        match &mask.real {
            Some(real) => {
                body.write_u8(real.flags)?;
                body.write_u8(real.background)?;
                real.rect.write(&mut body)?;
            }
            None => body.write_u16::<BigEndian>(0)?,
        }
        write_length(&mut writer, body.len() as u64, false)?;
        writer.write_all(&body)
    }
}

// ── Blending ranges ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangePair {
    pub source:      u32,
    pub destination: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlendingRanges {
    pub composite: RangePair,
    pub channels:  Vec<RangePair>,
}

impl BlendingRanges {
    pub fn read(r: &mut Reader<'_>) -> Result<Option<Self>> {
        let start = r.position();
        let len = r.read_u32()? as u64;
        if len == 0 {
            return Ok(None);
        }
        if len % 8 != 0 {
            return Err(PsdError::new(
                r.section(),
                start,
                Fault::Size { what: "blending ranges length", found: len },
            ));
        }
        let mut w = r.window(len, r.section())?;
        let mut pairs = Vec::with_capacity((len / 8) as usize);
        while !w.is_empty() {
            pairs.push(RangePair { source: w.read_u32()?, destination: w.read_u32()? });
        }
        let composite = pairs.remove(0);
        Ok(Some(BlendingRanges { composite, channels: pairs }))
    }

    pub fn write_opt<W: Write>(ranges: Option<&BlendingRanges>, mut writer: W) -> io::Result<()> {
        let Some(ranges) = ranges else {
            return write_length(&mut writer, 0, false);
        };
        let len = 8 * (1 + ranges.channels.len()) as u64;
        write_length(&mut writer, len, false)?;
        for pair in std::iter::once(&ranges.composite).chain(&ranges.channels) {
            writer.write_u32::<BigEndian>(pair.source)?;
            writer.write_u32::<BigEndian>(pair.destination)?;
        }
        Ok(())
    }
}

// ── Global layer mask ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlobalLayerMask {
    pub color_space: u16,
    pub components:  [u16; 4],
    /// 0 (transparent) to 100 (opaque).
    pub opacity:     u16,
    /// 0 color selected, 1 color protected, 128 per-layer.
    pub kind:        u8,
    pub filler:      Vec<u8>,
}

impl GlobalLayerMask {
    pub fn read(r: &mut Reader<'_>) -> Result<Option<Self>> {
        let prev = r.set_section(Section::GlobalLayerMask);
        let len = r.read_u32()? as u64;
        log::debug!("global layer mask: {} bytes", len);
        let mask = if len == 0 {
            None
        } else {
            let mut w = r.window(len, Section::GlobalLayerMask)?;
            let color_space = w.read_u16()?;
            let mut components = [0u16; 4];
            for c in components.iter_mut() {
                *c = w.read_u16()?;
            }
            let opacity = w.read_u16()?;
            let kind = w.read_u8()?;
            let filler = w.rest().to_vec();
            Some(GlobalLayerMask { color_space, components, opacity, kind, filler })
        };
        r.set_section(prev);
        Ok(mask)
    }

    pub fn write_opt<W: Write>(mask: Option<&GlobalLayerMask>, mut writer: W) -> io::Result<()> {
        let Some(mask) = mask else {
            return write_length(&mut writer, 0, false);
        };
        write_length(&mut writer, 13 + mask.filler.len() as u64, false)?;
        writer.write_u16::<BigEndian>(mask.color_space)?;
        for c in mask.components {
            writer.write_u16::<BigEndian>(c)?;
        }
        writer.write_u16::<BigEndian>(mask.opacity)?;
        writer.write_u8(mask.kind)?;
        writer.write_all(&mask.filler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(top: i32, left: i32, bottom: i32, right: i32) -> Rect {
        Rect { top, left, bottom, right }
    }

    #[test]
    fn plain_mask_round_trips() {
        let mask = Mask {
            rect:          rect(1, 2, 11, 22),
            default_color: 255,
            flags:         0x02,
            parameters:    None,
            real:          None,
        };
        let mut out = Vec::new();
        Mask::write_opt(Some(&mask), &mut out).unwrap();
        assert_eq!(out.len(), 4 + 20);
        let mut r = Reader::new(&out);
        assert_eq!(Mask::read(&mut r).unwrap(), Some(mask.clone()));
        assert!(r.is_empty());
        assert!(mask.is_disabled());
    }

    #[test]
    fn mask_with_parameters_and_real_rect() {
        let mask = Mask {
            rect:          rect(0, 0, 4, 4),
            default_color: 0,
            flags:         FLAG_HAS_PARAMETERS,
            parameters:    Some(MaskParameters {
                user_density:   Some(200),
                user_feather:   None,
                vector_density: None,
                vector_feather: Some(2.5),
            }),
            real:          Some(RealMask { flags: 1, background: 255, rect: rect(-1, -1, 5, 5) }),
        };
        let mut out = Vec::new();
        Mask::write_opt(Some(&mask), &mut out).unwrap();
        let mut r = Reader::new(&out);
        assert_eq!(Mask::read(&mut r).unwrap(), Some(mask));
        assert!(r.is_empty());
    }

    #[test]
    fn mask_default_color_is_checked() {
        let mut data = 20u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[0; 16]);
        data.extend_from_slice(&[7, 0, 0, 0]);
        let err = Mask::read(&mut Reader::new(&data)).unwrap_err();
        assert_eq!(err.offset(), Some(20));
        assert!(matches!(err.fault(), Some(Fault::Format { what: "mask default color", .. })));
    }

    #[test]
    fn zero_length_mask_is_absent() {
        let mut r = Reader::new(&[0, 0, 0, 0]);
        assert_eq!(Mask::read(&mut r).unwrap(), None);
        assert!(r.is_empty());
    }

    #[test]
    fn blending_ranges_split_composite() {
        let ranges = BlendingRanges {
            composite: RangePair { source: 0x0000_ffff, destination: 0x0000_ffff },
            channels:  vec![RangePair { source: 1, destination: 2 }; 3],
        };
        let mut out = Vec::new();
        BlendingRanges::write_opt(Some(&ranges), &mut out).unwrap();
        assert_eq!(out.len(), 4 + 32);
        assert_eq!(BlendingRanges::read(&mut Reader::new(&out)).unwrap(), Some(ranges));
    }

    #[test]
    fn blending_ranges_length_must_be_pairs() {
        let mut data = 12u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[0; 12]);
        assert!(matches!(
            BlendingRanges::read(&mut Reader::new(&data)).unwrap_err().fault(),
            Some(Fault::Size { found: 12, .. })
        ));
    }

    #[test]
    fn global_mask_round_trips() {
        let mask = GlobalLayerMask {
            color_space: 0,
            components:  [65535, 0, 0, 0],
            opacity:     50,
            kind:        128,
            filler:      vec![0; 3],
        };
        let mut out = Vec::new();
        GlobalLayerMask::write_opt(Some(&mask), &mut out).unwrap();
        let mut r = Reader::new(&out);
        assert_eq!(GlobalLayerMask::read(&mut r).unwrap(), Some(mask));
        assert!(r.is_empty());
    }
}
