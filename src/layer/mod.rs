//! Layer info: layer records followed by the pixel data of every channel.
//!
//! # Layout
//! ```text
//! length:u32|u64
//! count:i16                       negative → first alpha holds merged transparency
//! record × |count|
//!   rect:4×i32  channels:u16  (id:i16 length:u32|u64) × channels
//!   "8BIM"  blend:tag  opacity:u8  clipping:u8  flags:u8  filler:u8
//!   extra:u32 → mask, blending ranges, name (pascal, pad 4), additional info
//! channel data × Σ channels       same order as the records
//! padding                          up to 3 bytes
//! ```
//!
//! Records are parsed first; only then is the byte range of each channel
//! known.  All ranges are carved out of the section up front, so the pixel
//! pass works on isolated windows and may run one task per layer.

pub mod channel;
pub mod mask;

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

use crate::additional::{self, Block, InfoMap};
use crate::document::DecodeOptions;
use crate::error::{Fault, Result, Section};
use crate::header::Header;
use crate::io_stream::{padding, write_length, write_pascal_string, write_tag, write_zeros, Reader};
use crate::tag::{Tag, SIG_8BIM};

pub use channel::{Channel, PlaneData};
pub use mask::{BlendingRanges, GlobalLayerMask, Mask, MaskParameters, RangePair, RealMask};

// ── Rect ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub top:    i32,
    pub left:   i32,
    pub bottom: i32,
    pub right:  i32,
}

impl Rect {
    pub fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self { top, left, bottom, right }
    }

    /// Zero for inverted rectangles.
    pub fn width(&self) -> u32 {
        (self.right as i64 - self.left as i64).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom as i64 - self.top as i64).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            top:    r.read_i32()?,
            left:   r.read_i32()?,
            bottom: r.read_i32()?,
            right:  r.read_i32()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<BigEndian>(self.top)?;
        writer.write_i32::<BigEndian>(self.left)?;
        writer.write_i32::<BigEndian>(self.bottom)?;
        writer.write_i32::<BigEndian>(self.right)
    }
}

// ── Layer ────────────────────────────────────────────────────────────────────

pub const BLEND_NORMAL: Tag = Tag(*b"norm");
pub const BLEND_PASS_THROUGH: Tag = Tag(*b"pass");

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub rect:            Rect,
    pub channels:        Vec<Channel>,
    pub blend_mode:      Tag,
    pub opacity:         u8,
    /// 0 base, 1 clipped to the layer below.
    pub clipping:        u8,
    pub flags:           u8,
    pub mask:            Option<Mask>,
    pub blending_ranges: Option<BlendingRanges>,
    /// Pascal-string name; superseded by the `luni` block when present.
    pub legacy_name:     String,
    pub additional:      InfoMap,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            rect:            Rect::default(),
            channels:        Vec::new(),
            blend_mode:      BLEND_NORMAL,
            opacity:         255,
            clipping:        0,
            flags:           0,
            mask:            None,
            blending_ranges: None,
            legacy_name:     String::new(),
            additional:      InfoMap::new(),
        }
    }
}

impl Layer {
    /// The Unicode name if present, else the legacy name.
    pub fn name(&self) -> &str {
        match self.block(Tag(*b"luni")) {
            Some(Block::UnicodeName(name)) => name,
            _ => &self.legacy_name,
        }
    }

    /// The decoded leaf record stored under `key`.
    pub fn block(&self, key: Tag) -> Option<&Block> {
        self.additional.get(&key).map(|info| &info.block)
    }

    pub fn channel(&self, id: i16) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Decoded samples of channel `id`.
    pub fn pixels(&self, id: i16) -> Option<&[u8]> {
        self.channel(id).and_then(|c| c.pixels())
    }

    #[inline] pub fn is_visible(&self) -> bool { self.flags & 0x02 == 0 }
    #[inline] pub fn is_transparency_protected(&self) -> bool { self.flags & 0x01 != 0 }
    #[inline] pub fn is_obsolete(&self) -> bool { self.flags & 0x04 != 0 }
    #[inline] pub fn is_pixel_data_irrelevant(&self) -> bool { self.flags & 0x18 == 0x18 }

    /// Group open/close markers carry an `lsct` block.
    pub fn section_divider(&self) -> Option<&additional::SectionDivider> {
        match self.block(Tag(*b"lsct")).or_else(|| self.block(Tag(*b"lsdk"))) {
            Some(Block::SectionDivider(d)) => Some(d),
            _ => None,
        }
    }

    /// Rectangle covered by channel `id`: masks have their own.
    pub fn channel_rect(&self, id: i16) -> Option<Rect> {
        match id {
            -2 => self.mask.as_ref().map(|m| m.rect),
            -3 => self.mask.as_ref().and_then(|m| m.real).map(|real| real.rect),
            _  => Some(self.rect),
        }
    }

    fn read_record(r: &mut Reader<'_>, large: bool, strict: bool) -> Result<Self> {
        r.set_section(Section::LayerRecord);
        let rect = Rect::read(r)?;
        let count = r.read_u16()?;
        let mut channels = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = r.read_i16()?;
            let length = r.read_length(large)?;
            channels.push(Channel::new(id, length));
        }
        r.expect_tag("blend mode signature", &[SIG_8BIM])?;
        let blend_mode = r.read_tag()?;
        let opacity = r.read_u8()?;
        let clipping = r.read_u8()?;
        let flags = r.read_u8()?;
        r.skip(1)?;

        let extra_len = r.read_u32()? as u64;
        let mut extra = r.window(extra_len, Section::LayerRecord)?;
        let mask = Mask::read(&mut extra)?;
        let blending_ranges = BlendingRanges::read(&mut extra)?;
        let legacy_name = extra.read_padded_pascal_string(4)?;
        let additional = additional::read_blocks(&mut extra, large, strict)?;

        let layer = Layer {
            rect,
            channels,
            blend_mode,
            opacity,
            clipping,
            flags,
            mask,
            blending_ranges,
            legacy_name,
            additional,
        };
        log::trace!(
            "layer '{}': {}x{}, {} channels, {} info blocks",
            layer.name(),
            rect.width(),
            rect.height(),
            layer.channels.len(),
            layer.additional.len()
        );
        Ok(layer)
    }

    /// Write the record; channel lengths come from `lengths`, which holds
    /// the size of each channel's encoded data in order.
    fn write_record<W: Write>(&self, mut writer: W, lengths: &[u64], large: bool) -> io::Result<()> {
        self.rect.write(&mut writer)?;
        let count = u16::try_from(self.channels.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many channels in layer"))?;
        writer.write_u16::<BigEndian>(count)?;
        for (channel, &len) in self.channels.iter().zip(lengths) {
            writer.write_i16::<BigEndian>(channel.id)?;
            write_length(&mut writer, len, large)?;
        }
        write_tag(&mut writer, SIG_8BIM)?;
        write_tag(&mut writer, self.blend_mode)?;
        writer.write_all(&[self.opacity, self.clipping, self.flags, 0])?;

        let mut extra = Vec::new();
        Mask::write_opt(self.mask.as_ref(), &mut extra)?;
        BlendingRanges::write_opt(self.blending_ranges.as_ref(), &mut extra)?;
        write_pascal_string(&mut extra, &self.legacy_name, 4)?;
        additional::write_blocks(&mut extra, &self.additional, large)?;
        write_length(&mut writer, extra.len() as u64, false)?;
        writer.write_all(&extra)
    }
}

// ── Layer info ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerInfo {
    /// The stored layer count was negative: the first alpha channel of the
    /// merged image holds its transparency.
    pub merged_alpha: bool,
    pub layers:       Vec<Layer>,
}

/// Slack allowed after the last channel's data.
const MAX_TRAILING_PAD: usize = 3;

impl LayerInfo {
    pub fn read(r: &mut Reader<'_>, header: &Header, opts: &DecodeOptions) -> Result<Self> {
        r.set_section(Section::LayerInfo);
        let large = header.is_large();
        let len = r.read_length(large)?;
        log::debug!("layer info: {} bytes at offset {}", len, r.position());
        if len == 0 {
            return Ok(Self::default());
        }
        let mut w = r.window(len, Section::LayerInfo)?;

        let count = w.read_i16()?;
        let merged_alpha = count < 0;
        let n = count.unsigned_abs() as usize;
        let mut layers = Vec::with_capacity(n);
        for _ in 0..n {
            channel::check_cancel(&w, opts)?;
            layers.push(Layer::read_record(&mut w, large, opts.strict_blocks)?);
        }

        w.set_section(Section::ChannelData);
        channel::read_channel_data(&mut w, &mut layers, header, opts)?;

        if w.remaining() > MAX_TRAILING_PAD {
            return Err(w.fault(Fault::Bounds {
                declared:  len,
                available: len - w.remaining() as u64,
            }));
        }
        Ok(Self { merged_alpha, layers })
    }

    pub fn write<W: Write>(&self, writer: W, header: &Header) -> io::Result<()> {
        write_layers(writer, &self.layers, self.merged_alpha, header)
    }
}

/// Write a layer-info section holding `layers`; channel data is encoded
/// first so the records can carry its exact lengths.
///
/// The merged-alpha flag is carried by the sign of the layer count, so it
/// is dropped when there are no layers.
pub fn write_layers<W: Write>(
    mut writer: W,
    layers: &[Layer],
    merged_alpha: bool,
    header: &Header,
) -> io::Result<()> {
    let large = header.is_large();
    if layers.is_empty() {
        if merged_alpha {
            log::debug!("layer info: merged alpha flag dropped without layers");
        }
        return write_length(&mut writer, 0, large);
    }
    let n = i16::try_from(layers.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many layers"))?;

    let mut encoded = Vec::with_capacity(layers.len());
    for layer in layers {
        encoded.push(channel::encode_channels(layer, header)?);
    }

    let mut body = Vec::new();
    body.write_i16::<BigEndian>(if merged_alpha { -n } else { n })?;
    for (layer, channels) in layers.iter().zip(&encoded) {
        let lengths: Vec<u64> = channels.iter().map(|c| c.len() as u64).collect();
        layer.write_record(&mut body, &lengths, large)?;
    }
    for data in encoded.iter().flatten() {
        body.write_all(data)?;
    }
    let pad = padding(body.len(), 2);
    write_length(&mut writer, (body.len() + pad) as u64, large)?;
    writer.write_all(&body)?;
    write_zeros(&mut writer, pad)
}
