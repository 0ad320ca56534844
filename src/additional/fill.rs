//! Descriptor-backed fill settings and the object-effects wrapper.

use crate::descriptor::Descriptor;
use crate::error::{Fault, PsdError, Result};
use crate::io_stream::Reader;

use super::Block;

/// RGB color as stored in descriptors (`Rd  `, `Grn `, `Bl  `, 0.0..=255.0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgb {
    pub red:   f64,
    pub green: f64,
    pub blue:  f64,
}

impl Rgb {
    /// Missing components read as zero.
    pub fn from_descriptor(d: &Descriptor) -> Self {
        Self {
            red:   d.get_f64("Rd  ").unwrap_or_default(),
            green: d.get_f64("Grn ").unwrap_or_default(),
            blue:  d.get_f64("Bl  ").unwrap_or_default(),
        }
    }
}

/// `SoCo`
#[derive(Debug, Clone, PartialEq)]
pub struct SolidColor {
    pub color:      Option<Rgb>,
    pub descriptor: Descriptor,
}

/// `lfx2`
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEffects {
    pub version:    u32,
    pub descriptor: Descriptor,
}

pub(super) fn solid_color(r: &mut Reader<'_>) -> Result<Block> {
    let descriptor = Descriptor::read_versioned(r)?;
    // The color sits in the first nested object, normally keyed `Clr `.
    let color = descriptor
        .get_descriptor("Clr ")
        .or_else(|| {
            descriptor.items.values().find_map(|item| match item {
                crate::descriptor::Item::Descriptor(d) => Some(d),
                _ => None,
            })
        })
        .map(Rgb::from_descriptor);
    Ok(Block::SolidColor(SolidColor { color, descriptor }))
}

pub(super) fn gradient_fill(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::GradientFill(Descriptor::read_versioned(r)?))
}

pub(super) fn pattern_fill(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::PatternFill(Descriptor::read_versioned(r)?))
}

pub(super) fn object_effects(r: &mut Reader<'_>) -> Result<Block> {
    let start = r.position();
    let version = r.read_u32()?;
    if version != 0 {
        return Err(PsdError::new(
            r.section(),
            start,
            Fault::Version { what: "object effects", found: version as i64 },
        ));
    }
    let descriptor = Descriptor::read_versioned(r)?;
    Ok(Block::ObjectEffects(ObjectEffects { version, descriptor }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Item;
    use crate::error::Section;
    use crate::tag::Tag;

    fn rgb_descriptor() -> Descriptor {
        let clr = Descriptor::new("", "RGBC")
            .with("Rd  ", Item::Double(255.0))
            .with("Grn ", Item::Double(128.0))
            .with("Bl  ", Item::Double(0.0));
        Descriptor::new("", "null").with("Clr ", Item::Descriptor(clr))
    }

    #[test]
    fn solid_color_extracts_rgb() {
        let mut data = Vec::new();
        rgb_descriptor().write_versioned(&mut data).unwrap();
        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"SoCo")));
        let Block::SolidColor(fill) = solid_color(&mut r).unwrap() else {
            panic!("expected solid color");
        };
        assert_eq!(fill.color, Some(Rgb { red: 255.0, green: 128.0, blue: 0.0 }));
    }

    #[test]
    fn object_effects_checks_both_versions() {
        let mut data = 0u32.to_be_bytes().to_vec();
        rgb_descriptor().write_versioned(&mut data).unwrap();
        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"lfx2")));
        assert!(matches!(object_effects(&mut r).unwrap(), Block::ObjectEffects(_)));

        data[3] = 1;
        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"lfx2")));
        let err = object_effects(&mut r).unwrap_err();
        assert_eq!(err.fault(), Some(&Fault::Version { what: "object effects", found: 1 }));
    }
}
