use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;
use std::io::{self, Write};

use crate::error::{Fault, PsdError, Result, Section};
use crate::io_stream::Reader;

pub const MAGIC: &[u8; 4] = b"8BPS";
pub const HEADER_SIZE: usize = 26;

/// Standard document.
pub const VERSION_PSD: u16 = 1;
/// Large-document variant: wider length fields, larger dimensions.
pub const VERSION_PSB: u16 = 2;

pub const MAX_CHANNELS: u16 = 56;
pub const MAX_DIMENSION_PSD: u32 = 30_000;
pub const MAX_DIMENSION_PSB: u32 = 300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ColorMode {
    Bitmap       = 0,
    Grayscale    = 1,
    Indexed      = 2,
    Rgb          = 3,
    Cmyk         = 4,
    Multichannel = 7,
    Duotone      = 8,
    Lab          = 9,
}

impl ColorMode {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(ColorMode::Bitmap),
            1 => Some(ColorMode::Grayscale),
            2 => Some(ColorMode::Indexed),
            3 => Some(ColorMode::Rgb),
            4 => Some(ColorMode::Cmyk),
            7 => Some(ColorMode::Multichannel),
            8 => Some(ColorMode::Duotone),
            9 => Some(ColorMode::Lab),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorMode::Bitmap       => "Bitmap",
            ColorMode::Grayscale    => "Grayscale",
            ColorMode::Indexed      => "Indexed",
            ColorMode::Rgb          => "RGB",
            ColorMode::Cmyk         => "CMYK",
            ColorMode::Multichannel => "Multichannel",
            ColorMode::Duotone      => "Duotone",
            ColorMode::Lab          => "Lab",
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The fixed 26-byte file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version:    u16,
    pub channels:   u16,
    pub height:     u32,
    pub width:      u32,
    pub depth:      u16,
    pub color_mode: ColorMode,
}

impl Header {
    pub fn new(channels: u16, height: u32, width: u32, depth: u16, color_mode: ColorMode) -> Self {
        Self { version: VERSION_PSD, channels, height, width, depth, color_mode }
    }

    /// True for the large-document variant.
    #[inline]
    pub fn is_large(&self) -> bool {
        self.version == VERSION_PSB
    }

    pub fn max_dimension(&self) -> u32 {
        if self.is_large() { MAX_DIMENSION_PSB } else { MAX_DIMENSION_PSD }
    }

    /// Bytes in one scanline of `width` samples at this depth.
    pub fn row_bytes(&self, width: usize) -> Option<usize> {
        width
            .checked_mul(self.depth as usize)
            .map(|bits| (bits + 7) / 8)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u16::<BigEndian>(self.version)?;
        writer.write_all(&[0u8; 6])?;
        writer.write_u16::<BigEndian>(self.channels)?;
        writer.write_u32::<BigEndian>(self.height)?;
        writer.write_u32::<BigEndian>(self.width)?;
        writer.write_u16::<BigEndian>(self.depth)?;
        writer.write_u16::<BigEndian>(self.color_mode as u16)?;
        Ok(())
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        r.set_section(Section::Header);
        let start = r.position();
        let fail = |at: u64, fault: Fault| PsdError::new(Section::Header, start + at, fault);

        let sig = r.read_tag()?;
        if &sig.0 != MAGIC {
            return Err(fail(0, Fault::Format {
                what:     "file signature",
                expected: "8BPS".into(),
                found:    sig.to_string(),
            }));
        }
        let version = r.read_u16()?;
        if version != VERSION_PSD && version != VERSION_PSB {
            return Err(fail(4, Fault::Version { what: "file", found: version as i64 }));
        }
        r.skip(6)?;

        let channels = r.read_u16()?;
        if !(1..=MAX_CHANNELS).contains(&channels) {
            return Err(fail(12, Fault::Size { what: "channel count", found: channels as u64 }));
        }

        let limit = if version == VERSION_PSB { MAX_DIMENSION_PSB } else { MAX_DIMENSION_PSD };
        let height = r.read_u32()?;
        if !(1..=limit).contains(&height) {
            return Err(fail(14, Fault::Size { what: "image height", found: height as u64 }));
        }
        let width = r.read_u32()?;
        if !(1..=limit).contains(&width) {
            return Err(fail(18, Fault::Size { what: "image width", found: width as u64 }));
        }

        let depth = r.read_u16()?;
        if !matches!(depth, 1 | 8 | 16 | 32) {
            return Err(fail(22, Fault::Size { what: "bit depth", found: depth as u64 }));
        }

        let mode = r.read_u16()?;
        let color_mode = ColorMode::from_u16(mode).ok_or_else(|| {
            fail(24, Fault::Format {
                what:     "color mode",
                expected: "0-4 or 7-9".into(),
                found:    mode.to_string(),
            })
        })?;

        Ok(Self { version, channels, height, width, depth, color_mode })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RGB_100: [u8; 26] = [
        b'8', b'B', b'P', b'S', 0, 1, 0, 0, 0, 0, 0, 0, 0, 3,
        0, 0, 0, 100, 0, 0, 0, 100, 0, 8, 0, 3,
    ];

    #[test]
    fn decodes_rgb_header() {
        let mut r = Reader::new(&RGB_100);
        let h = Header::read(&mut r).unwrap();
        assert_eq!(h, Header::new(3, 100, 100, 8, ColorMode::Rgb));
        assert!(!h.is_large());
        assert!(r.is_empty());
    }

    #[test]
    fn write_matches_source_bytes() {
        let h = Header::new(3, 100, 100, 8, ColorMode::Rgb);
        let mut out = Vec::new();
        h.write(&mut out).unwrap();
        assert_eq!(out, RGB_100);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = RGB_100;
        bytes[0] = b'9';
        let err = Header::read(&mut Reader::new(&bytes)).unwrap_err();
        assert!(matches!(err.fault(), Some(Fault::Format { .. })));
        assert_eq!(err.section(), Some(Section::Header));
    }

    #[test]
    fn rejects_version_three() {
        let mut bytes = RGB_100;
        bytes[5] = 3;
        let err = Header::read(&mut Reader::new(&bytes)).unwrap_err();
        assert_eq!(err.fault(), Some(&Fault::Version { what: "file", found: 3 }));
        assert_eq!(err.offset(), Some(4));
    }

    #[test]
    fn dimension_limit_depends_on_version() {
        let mut bytes = RGB_100;
        // width 40000
        bytes[18..22].copy_from_slice(&40_000u32.to_be_bytes());
        assert!(Header::read(&mut Reader::new(&bytes)).is_err());
        bytes[5] = 2;
        let h = Header::read(&mut Reader::new(&bytes)).unwrap();
        assert!(h.is_large());
        assert_eq!(h.width, 40_000);
    }

    #[test]
    fn rejects_depth_and_mode() {
        let mut bytes = RGB_100;
        bytes[23] = 4;
        assert!(matches!(
            Header::read(&mut Reader::new(&bytes)).unwrap_err().fault(),
            Some(Fault::Size { what: "bit depth", found: 4 })
        ));
        let mut bytes = RGB_100;
        bytes[25] = 5;
        assert!(matches!(
            Header::read(&mut Reader::new(&bytes)).unwrap_err().fault(),
            Some(Fault::Format { what: "color mode", .. })
        ));
    }

    #[test]
    fn row_bytes_rounds_up_bits() {
        let mut h = Header::new(1, 1, 1, 1, ColorMode::Bitmap);
        assert_eq!(h.row_bytes(10), Some(2));
        h.depth = 16;
        assert_eq!(h.row_bytes(10), Some(20));
    }
}
