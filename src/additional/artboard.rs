use crate::descriptor::Descriptor;
use crate::error::{Fault, PsdError, Result};
use crate::io_stream::Reader;

use super::fill::Rgb;
use super::Block;

/// Artboard bounds in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArtboardRect {
    pub top:    f64,
    pub left:   f64,
    pub bottom: f64,
    pub right:  f64,
}

/// `artb` / `artd` / `abdd`
#[derive(Debug, Clone, PartialEq)]
pub struct Artboard {
    pub preset_name:     Option<String>,
    pub background_type: Option<i32>,
    pub rect:            Option<ArtboardRect>,
    pub color:           Option<Rgb>,
    pub descriptor:      Descriptor,
}

pub(super) fn artboard(r: &mut Reader<'_>) -> Result<Block> {
    let start = r.position();
    let descriptor = Descriptor::read_versioned(r)?;
    if descriptor.class_id != "artboard" {
        return Err(PsdError::new(
            r.section(),
            start,
            Fault::Format {
                what:     "artboard descriptor class",
                expected: "artboard".into(),
                found:    descriptor.class_id.clone(),
            },
        ));
    }

    let rect = descriptor.get_descriptor("artboardRect").map(|d| ArtboardRect {
        top:    d.get_f64("Top ").unwrap_or_default(),
        left:   d.get_f64("Left").unwrap_or_default(),
        bottom: d.get_f64("Btom").unwrap_or_default(),
        right:  d.get_f64("Rght").unwrap_or_default(),
    });

    Ok(Block::Artboard(Artboard {
        preset_name:     descriptor.get_text("artboardPresetName").map(str::to_owned),
        background_type: descriptor.get_i32("artboardBackgroundType"),
        rect,
        color:           descriptor.get_descriptor("Clr ").map(Rgb::from_descriptor),
        descriptor,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Item;
    use crate::error::Section;
    use crate::tag::Tag;

    #[test]
    fn extracts_geometry_and_color() {
        let rect = Descriptor::new("", "classFloatRect")
            .with("Top ", Item::Double(0.0))
            .with("Left", Item::Double(-1200.0))
            .with("Btom", Item::Double(1334.0))
            .with("Rght", Item::Double(-450.0));
        let color = Descriptor::new("", "RGBC")
            .with("Rd  ", Item::Double(255.0))
            .with("Grn ", Item::Double(255.0))
            .with("Bl  ", Item::Double(255.0));
        let desc = Descriptor::new("", "artboard")
            .with("artboardPresetName", Item::Text("iPhone 6\0".into()))
            .with("artboardBackgroundType", Item::Integer(1))
            .with("artboardRect", Item::Descriptor(rect))
            .with("Clr ", Item::Descriptor(color))
            .with("guideIndeces", Item::List(vec![]));

        let mut data = Vec::new();
        desc.write_versioned(&mut data).unwrap();
        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"artb")));
        let Block::Artboard(a) = artboard(&mut r).unwrap() else {
            panic!("expected artboard");
        };
        assert_eq!(a.preset_name.as_deref(), Some("iPhone 6\0"));
        assert_eq!(a.background_type, Some(1));
        assert_eq!(
            a.rect,
            Some(ArtboardRect { top: 0.0, left: -1200.0, bottom: 1334.0, right: -450.0 })
        );
        assert_eq!(a.color, Some(Rgb { red: 255.0, green: 255.0, blue: 255.0 }));
    }

    #[test]
    fn wrong_class_is_format_fault() {
        let mut data = Vec::new();
        Descriptor::new("", "null").write_versioned(&mut data).unwrap();
        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"artb")));
        assert!(matches!(artboard(&mut r).unwrap_err().fault(), Some(Fault::Format { .. })));
    }
}
