//! `vmsk` / `vsms` vector masks and the 26-byte path resource records they
//! carry.
//!
//! Every record starts with a u16 selector and fills exactly 24 more bytes.
//! Coordinates are 8.24 signed fixed point, vertical component first, as a
//! fraction of the document height/width.

use crate::error::{Fault, PsdError, Result};
use crate::io_stream::Reader;

use super::Block;

pub const VECTOR_MASK_VERSION: u32 = 3;
pub const PATH_RECORD_LEN: usize = 26;

/// A point in path space: (vertical, horizontal).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathPoint {
    pub vertical:   f64,
    pub horizontal: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knot {
    pub closed:    bool,
    pub linked:    bool,
    pub preceding: PathPoint,
    pub anchor:    PathPoint,
    pub leaving:   PathPoint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathRecord {
    /// Selector 0 (closed) or 3 (open): number of knots that follow.
    SubpathLength { closed: bool, knots: u16 },
    /// Selectors 1, 2 (closed) and 4, 5 (open); 1 and 4 are linked.
    Knot(Knot),
    /// Selector 6.
    FillRule,
    /// Selector 7.
    Clipboard { top: f64, left: f64, bottom: f64, right: f64, resolution: f64 },
    /// Selector 8.
    InitialFill(u16),
    /// Any other selector; payload skipped.
    Unknown(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMask {
    pub invert:     bool,
    pub not_linked: bool,
    pub disabled:   bool,
    pub paths:      Vec<PathRecord>,
}

fn read_fixed(r: &mut Reader<'_>) -> Result<f64> {
    Ok(r.read_i32()? as f64 / (1u32 << 24) as f64)
}

fn read_point(r: &mut Reader<'_>) -> Result<PathPoint> {
    let vertical = read_fixed(r)?;
    let horizontal = read_fixed(r)?;
    Ok(PathPoint { vertical, horizontal })
}

impl PathRecord {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let selector = r.read_u16()?;
        let record = match selector {
            0 | 3 => {
                let knots = r.read_u16()?;
                r.skip(22)?;
                PathRecord::SubpathLength { closed: selector == 0, knots }
            }
            1 | 2 | 4 | 5 => PathRecord::Knot(Knot {
                closed:    selector <= 2,
                linked:    selector == 1 || selector == 4,
                preceding: read_point(r)?,
                anchor:    read_point(r)?,
                leaving:   read_point(r)?,
            }),
            6 => {
                r.skip(24)?;
                PathRecord::FillRule
            }
            7 => {
                let top = read_fixed(r)?;
                let left = read_fixed(r)?;
                let bottom = read_fixed(r)?;
                let right = read_fixed(r)?;
                let resolution = read_fixed(r)?;
                r.skip(4)?;
                PathRecord::Clipboard { top, left, bottom, right, resolution }
            }
            8 => {
                let fill = r.read_u16()?;
                r.skip(22)?;
                PathRecord::InitialFill(fill)
            }
            other => {
                r.skip(24)?;
                PathRecord::Unknown(other)
            }
        };
        Ok(record)
    }
}

pub(super) fn vector_mask(r: &mut Reader<'_>) -> Result<Block> {
    let start = r.position();
    let version = r.read_u32()?;
    if version != VECTOR_MASK_VERSION {
        return Err(PsdError::new(
            r.section(),
            start,
            Fault::Version { what: "vector mask", found: version as i64 },
        ));
    }
    let flags = r.read_u32()?;
    let count = r.remaining() / PATH_RECORD_LEN;
    let mut paths = Vec::with_capacity(count);
    for _ in 0..count {
        paths.push(PathRecord::read(r)?);
    }
    Ok(Block::VectorMask(VectorMask {
        invert:     flags & 1 != 0,
        not_linked: flags & 2 != 0,
        disabled:   flags & 4 != 0,
        paths,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Section;
    use crate::tag::Tag;

    fn fixed(v: f64) -> [u8; 4] {
        ((v * (1u32 << 24) as f64) as i32).to_be_bytes()
    }

    #[test]
    fn decodes_flags_and_records() {
        let mut data = 3u32.to_be_bytes().to_vec();
        data.extend_from_slice(&5u32.to_be_bytes()); // invert + disabled
        // fill rule
        data.extend_from_slice(&6u16.to_be_bytes());
        data.extend_from_slice(&[0; 24]);
        // closed subpath of one knot
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0; 22]);
        // linked closed knot
        data.extend_from_slice(&1u16.to_be_bytes());
        for v in [0.25, 0.5, 0.25, 0.5, -0.125, 1.0] {
            data.extend_from_slice(&fixed(v));
        }
        // trailing padding shorter than a record
        data.extend_from_slice(&[0; 2]);

        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"vmsk")));
        let Block::VectorMask(mask) = vector_mask(&mut r).unwrap() else {
            panic!("expected vector mask");
        };
        assert!(mask.invert && mask.disabled && !mask.not_linked);
        assert_eq!(mask.paths.len(), 3);
        assert_eq!(mask.paths[0], PathRecord::FillRule);
        assert_eq!(mask.paths[1], PathRecord::SubpathLength { closed: true, knots: 1 });
        let PathRecord::Knot(k) = mask.paths[2] else { panic!("expected knot") };
        assert!(k.closed && k.linked);
        assert_eq!(k.anchor, PathPoint { vertical: 0.25, horizontal: 0.5 });
        assert_eq!(k.leaving, PathPoint { vertical: -0.125, horizontal: 1.0 });
    }

    #[test]
    fn rejects_other_versions() {
        let data = [0, 0, 0, 2, 0, 0, 0, 0];
        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"vmsk")));
        assert!(matches!(
            vector_mask(&mut r).unwrap_err().fault(),
            Some(Fault::Version { found: 2, .. })
        ));
    }
}
