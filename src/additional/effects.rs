//! `lrFX`: the legacy layer-effects stack.
//!
//! The block is a u16 version (0), a u16 effect count (6 or 7), then that
//! many sub-blocks:
//!
//! ```text
//! "8BIM"  key:tag  size:u32  { version:u32  fields… }   (size bytes)
//! ```
//!
//! Each kind admits only a few (size, version) combinations:
//!
//! | key         | sizes    | versions |
//! |-------------|----------|----------|
//! | cmnS        | 7        | 0        |
//! | dsdw, isdw  | 41, 51   | 0, 2     |
//! | oglw        | 32, 42   | 0, 2     |
//! | iglw        | 33, 43   | 0, 2     |
//! | bevl        | 58, 78   | 0, 2     |
//! | sofi        | 34       | 2        |
//!
//! The declared size bounds each sub-block; unread trailing bytes inside it
//! are skipped.  Version 2 adds the "native color" tails.

use crate::error::{Fault, PsdError, Result};
use crate::io_stream::Reader;
use crate::tag::{Tag, SIG_8BIM};

use super::Block;

/// Color space id plus four 16-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectColor {
    pub space:      u16,
    pub components: [u16; 4],
}

impl EffectColor {
    fn read(r: &mut Reader<'_>) -> Result<Self> {
        let space = r.read_u16()?;
        let mut components = [0u16; 4];
        for c in &mut components {
            *c = r.read_u16()?;
        }
        Ok(Self { space, components })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shadow {
    pub version:          u32,
    pub blur:             i32,
    pub intensity:        i32,
    pub angle:            i32,
    pub distance:         i32,
    pub color:            EffectColor,
    pub blend_mode:       Tag,
    pub enabled:          bool,
    pub use_global_angle: bool,
    pub opacity:          u8,
    pub native_color:     Option<EffectColor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glow {
    pub version:      u32,
    pub blur:         i32,
    pub intensity:    i32,
    pub color:        EffectColor,
    pub blend_mode:   Tag,
    pub enabled:      bool,
    pub opacity:      u8,
    /// Inner glows of version 2 only.
    pub invert:       Option<bool>,
    pub native_color: Option<EffectColor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bevel {
    pub version:           u32,
    pub angle:             i32,
    pub strength:          i32,
    pub blur:              i32,
    pub highlight_blend:   Tag,
    pub shadow_blend:      Tag,
    pub highlight_color:   EffectColor,
    pub shadow_color:      EffectColor,
    pub style:             u8,
    pub highlight_opacity: u8,
    pub shadow_opacity:    u8,
    pub enabled:           bool,
    pub use_global_angle:  bool,
    pub up:                bool,
    pub real_highlight:    Option<EffectColor>,
    pub real_shadow:       Option<EffectColor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidFill {
    pub version:      u32,
    pub blend_mode:   Tag,
    pub color:        EffectColor,
    pub opacity:      u8,
    pub enabled:      bool,
    pub native_color: EffectColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Common { visible: bool },
    DropShadow(Shadow),
    InnerShadow(Shadow),
    OuterGlow(Glow),
    InnerGlow(Glow),
    Bevel(Bevel),
    SolidFill(SolidFill),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effects {
    pub version: u16,
    pub effects: Vec<Effect>,
}

struct Allowed {
    key:      &'static [u8; 4],
    sizes:    &'static [u32],
    versions: &'static [u32],
}

const ALLOWED: [Allowed; 7] = [
    Allowed { key: b"cmnS", sizes: &[7],      versions: &[0] },
    Allowed { key: b"dsdw", sizes: &[41, 51], versions: &[0, 2] },
    Allowed { key: b"isdw", sizes: &[41, 51], versions: &[0, 2] },
    Allowed { key: b"oglw", sizes: &[32, 42], versions: &[0, 2] },
    Allowed { key: b"iglw", sizes: &[33, 43], versions: &[0, 2] },
    Allowed { key: b"bevl", sizes: &[58, 78], versions: &[0, 2] },
    Allowed { key: b"sofi", sizes: &[34],     versions: &[2] },
];

fn blend(r: &mut Reader<'_>) -> Result<Tag> {
    r.expect_tag("effect blend signature", &[SIG_8BIM])?;
    r.read_tag()
}

fn flag(r: &mut Reader<'_>) -> Result<bool> {
    Ok(r.read_u8()? != 0)
}

fn read_shadow(r: &mut Reader<'_>, version: u32) -> Result<Shadow> {
    Ok(Shadow {
        version,
        blur:             r.read_i32()?,
        intensity:        r.read_i32()?,
        angle:            r.read_i32()?,
        distance:         r.read_i32()?,
        color:            EffectColor::read(r)?,
        blend_mode:       blend(r)?,
        enabled:          flag(r)?,
        use_global_angle: flag(r)?,
        opacity:          r.read_u8()?,
        native_color:     if version == 2 { Some(EffectColor::read(r)?) } else { None },
    })
}

fn read_glow(r: &mut Reader<'_>, version: u32, inner: bool) -> Result<Glow> {
    let blur = r.read_i32()?;
    let intensity = r.read_i32()?;
    let color = EffectColor::read(r)?;
    let blend_mode = blend(r)?;
    let enabled = flag(r)?;
    let opacity = r.read_u8()?;
    let invert = if inner && version == 2 { Some(flag(r)?) } else { None };
    let native_color = if version == 2 { Some(EffectColor::read(r)?) } else { None };
    Ok(Glow { version, blur, intensity, color, blend_mode, enabled, opacity, invert, native_color })
}

fn read_bevel(r: &mut Reader<'_>, version: u32) -> Result<Bevel> {
    Ok(Bevel {
        version,
        angle:             r.read_i32()?,
        strength:          r.read_i32()?,
        blur:              r.read_i32()?,
        highlight_blend:   blend(r)?,
        shadow_blend:      blend(r)?,
        highlight_color:   EffectColor::read(r)?,
        shadow_color:      EffectColor::read(r)?,
        style:             r.read_u8()?,
        highlight_opacity: r.read_u8()?,
        shadow_opacity:    r.read_u8()?,
        enabled:           flag(r)?,
        use_global_angle:  flag(r)?,
        up:                flag(r)?,
        real_highlight:    if version == 2 { Some(EffectColor::read(r)?) } else { None },
        real_shadow:       if version == 2 { Some(EffectColor::read(r)?) } else { None },
    })
}

fn read_solid_fill(r: &mut Reader<'_>, version: u32) -> Result<SolidFill> {
    Ok(SolidFill {
        version,
        blend_mode:   blend(r)?,
        color:        EffectColor::read(r)?,
        opacity:      r.read_u8()?,
        enabled:      flag(r)?,
        native_color: EffectColor::read(r)?,
    })
}

fn read_effect(r: &mut Reader<'_>) -> Result<Effect> {
    r.expect_tag("effect signature", &[SIG_8BIM])?;
    let key_at = r.position();
    let key = r.read_tag()?;
    let allowed = ALLOWED.iter().find(|a| key == a.key).ok_or_else(|| {
        PsdError::new(
            r.section(),
            key_at,
            Fault::Format {
                what:     "effect key",
                expected: "cmnS, dsdw, isdw, oglw, iglw, bevl or sofi".into(),
                found:    key.to_string(),
            },
        )
    })?;

    let size_at = r.position();
    let size = r.read_u32()?;
    if !allowed.sizes.contains(&size) {
        return Err(PsdError::new(r.section(), size_at, Fault::Size { what: "effect size", found: size as u64 }));
    }
    let mut body = r.window(size as u64, r.section())?;
    let version = body.read_u32()?;
    if !allowed.versions.contains(&version) {
        return Err(PsdError::new(
            r.section(),
            size_at + 4,
            Fault::Version { what: "effect", found: version as i64 },
        ));
    }

    let b = &mut body;
    Ok(match &key.0 {
        b"cmnS" => Effect::Common { visible: flag(b)? },
        b"dsdw" => Effect::DropShadow(read_shadow(b, version)?),
        b"isdw" => Effect::InnerShadow(read_shadow(b, version)?),
        b"oglw" => Effect::OuterGlow(read_glow(b, version, false)?),
        b"iglw" => Effect::InnerGlow(read_glow(b, version, true)?),
        b"bevl" => Effect::Bevel(read_bevel(b, version)?),
        _       => Effect::SolidFill(read_solid_fill(b, version)?),
    })
}

pub(super) fn effects(r: &mut Reader<'_>) -> Result<Block> {
    let start = r.position();
    let version = r.read_u16()?;
    if version != 0 {
        return Err(PsdError::new(r.section(), start, Fault::Version { what: "effects layer", found: version as i64 }));
    }
    let count = r.read_u16()?;
    if count != 6 && count != 7 {
        return Err(PsdError::new(r.section(), start + 2, Fault::Size { what: "effect count", found: count as u64 }));
    }
    let mut list = Vec::with_capacity(count as usize);
    for _ in 0..count {
        list.push(read_effect(r)?);
    }
    Ok(Block::Effects(Effects { version, effects: list }))
}
