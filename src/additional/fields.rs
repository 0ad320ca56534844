//! Fixed-layout leaf records: ids, names, flags and other small settings.

use crate::error::{Fault, PsdError, Result};
use crate::io_stream::Reader;
use crate::tag::{Tag, SIG_8BIM};

use super::Block;

// ── Protection ───────────────────────────────────────────────────────────────

/// `lspf` lock bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection {
    pub bits: u32,
}

impl Protection {
    pub const TRANSPARENCY: u32 = 1 << 0;
    pub const COMPOSITE:    u32 = 1 << 1;
    pub const POSITION:     u32 = 1 << 2;
    pub const ALL:          u32 = 1 << 31;

    pub fn all(&self) -> bool {
        self.bits & Self::ALL != 0
    }

    pub fn transparency(&self) -> bool {
        self.all() || self.bits & Self::TRANSPARENCY != 0
    }

    pub fn composite(&self) -> bool {
        self.all() || self.bits & Self::COMPOSITE != 0
    }

    pub fn position(&self) -> bool {
        self.all() || self.bits & Self::POSITION != 0
    }
}

// ── Section divider ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DividerKind {
    Other           = 0,
    OpenFolder      = 1,
    ClosedFolder    = 2,
    BoundingDivider = 3,
}

/// `lsct` / `lsdk`: marks group boundaries in the flat layer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDivider {
    pub kind:       DividerKind,
    pub blend_mode: Option<Tag>,
    pub sub_type:   Option<u32>,
}

impl SectionDivider {
    pub fn is_group_start(&self) -> bool {
        matches!(self.kind, DividerKind::OpenFolder | DividerKind::ClosedFolder)
    }
}

// ── Sheet color ──────────────────────────────────────────────────────────────

/// `lclr`: the layer's label color, stored as two 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetColor(pub u32, pub u32);

impl SheetColor {
    /// Palette index of the label (0 = none, 1 = red … 7 = gray).
    pub fn label(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

// ── Decoders ─────────────────────────────────────────────────────────────────

pub(super) fn layer_id(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::LayerId(r.read_u32()?))
}

pub(super) fn unicode_name(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::UnicodeName(r.read_unicode_string()?))
}

pub(super) fn name_source(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::NameSource(r.read_tag()?))
}

/// One flag byte followed by three bytes of padding.
fn flag(r: &mut Reader<'_>) -> Result<bool> {
    Ok(r.read_u8()? != 0)
}

pub(super) fn blend_interior(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::BlendInterior(flag(r)?))
}

pub(super) fn blend_clipping(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::BlendClipping(flag(r)?))
}

pub(super) fn knockout(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::Knockout(flag(r)?))
}

pub(super) fn transparency_shapes(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::TransparencyShapes(flag(r)?))
}

pub(super) fn fill_opacity(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::FillOpacity(r.read_u8()?))
}

pub(super) fn locked(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::Locked(Protection { bits: r.read_u32()? }))
}

pub(super) fn section_divider(r: &mut Reader<'_>) -> Result<Block> {
    let start = r.position();
    let raw = r.read_u32()?;
    let kind = match raw {
        0 => DividerKind::Other,
        1 => DividerKind::OpenFolder,
        2 => DividerKind::ClosedFolder,
        3 => DividerKind::BoundingDivider,
        _ => {
            return Err(PsdError::new(
                r.section(),
                start,
                Fault::Format { what: "section divider type", expected: "0-3".into(), found: raw.to_string() },
            ))
        }
    };
    let mut divider = SectionDivider { kind, blend_mode: None, sub_type: None };
    if r.remaining() >= 8 {
        r.expect_tag("section divider signature", &[SIG_8BIM])?;
        divider.blend_mode = Some(r.read_tag()?);
    }
    if r.remaining() >= 4 {
        divider.sub_type = Some(r.read_u32()?);
    }
    Ok(Block::SectionDivider(divider))
}

pub(super) fn sheet_color(r: &mut Reader<'_>) -> Result<Block> {
    let first = r.read_u32()?;
    let second = r.read_u32()?;
    Ok(Block::SheetColor(SheetColor(first, second)))
}

pub(super) fn layer_version(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block::LayerVersion(r.read_u32()?))
}

pub(super) fn reference_point(r: &mut Reader<'_>) -> Result<Block> {
    let x = r.read_f64()?;
    let y = r.read_f64()?;
    Ok(Block::ReferencePoint { x, y })
}
