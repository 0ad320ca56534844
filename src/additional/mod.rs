//! Additional layer information: keyed metadata blocks attached to layers
//! and to the document.
//!
//! # Framing
//! ```text
//! signature:tag ("8BIM" | "8B64")  key:tag  length:u32|u64  payload
//! ```
//! The length is 8 bytes wide in large documents when the key is one of
//! [`WIDE_KEYS`] or the signature is `8B64`.  Two keys carry extra bytes
//! beyond their declared length (`Txt2`, `LMsk`); those are folded into the
//! payload before it is handed on.
//!
//! # Dispatch
//! The payload is always retained verbatim in [`AdditionalInfo::data`].  The
//! key is then looked up in a static registry of leaf decoders; a hit yields
//! a typed [`Block`], a miss yields [`Block::Opaque`].  A leaf decoder that
//! rejects its payload fails only that block: the fault is stored in
//! [`AdditionalInfo::failure`] and the block stays opaque, unless strict
//! mode asks for the fault to abort the decode.

pub mod artboard;
pub mod effects;
pub mod fields;
pub mod fill;
pub mod metadata;
pub mod typetool;
pub mod vector_mask;

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::descriptor::Descriptor;
use crate::error::{Fault, Result, Section};
use crate::io_stream::{write_length, write_tag, write_zeros, Reader};
use crate::tag::{Tag, SIG_8B64, SIG_8BIM};

pub use artboard::{Artboard, ArtboardRect};
pub use effects::{Effect, Effects};
pub use fields::{DividerKind, Protection, SectionDivider, SheetColor};
pub use fill::{ObjectEffects, Rgb, SolidColor};
pub use metadata::MetadataEntry;
pub use typetool::TypeTool;
pub use vector_mask::{PathRecord, VectorMask};

/// Keys whose length field is 8 bytes in large documents.
pub const WIDE_KEYS: [&[u8; 4]; 13] = [
    b"LMsk", b"Lr16", b"Lr32", b"Layr", b"Mt16", b"Mt32", b"Mtrn",
    b"Alph", b"FMsk", b"lnk2", b"FEid", b"FXid", b"PxSD",
];

/// Decoded leaf record of an additional-info block.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Artboard(Artboard),
    LayerId(u32),
    UnicodeName(String),
    NameSource(Tag),
    BlendInterior(bool),
    BlendClipping(bool),
    Knockout(bool),
    TransparencyShapes(bool),
    FillOpacity(u8),
    Locked(Protection),
    SectionDivider(SectionDivider),
    SheetColor(SheetColor),
    Metadata(Vec<MetadataEntry>),
    SolidColor(SolidColor),
    GradientFill(Descriptor),
    PatternFill(Descriptor),
    VectorMask(VectorMask),
    TypeTool(TypeTool),
    Effects(Effects),
    ObjectEffects(ObjectEffects),
    LayerVersion(u32),
    ReferencePoint { x: f64, y: f64 },
    /// Unknown key, or a payload its decoder rejected.
    Opaque,
}

// ── Registry ─────────────────────────────────────────────────────────────────

pub type LeafDecoder = fn(&mut Reader<'_>) -> Result<Block>;

static REGISTRY: &[(&[u8; 4], LeafDecoder)] = &[
    (b"artb", artboard::artboard),
    (b"artd", artboard::artboard),
    (b"abdd", artboard::artboard),
    (b"lyid", fields::layer_id),
    (b"luni", fields::unicode_name),
    (b"lnsr", fields::name_source),
    (b"infx", fields::blend_interior),
    (b"clbl", fields::blend_clipping),
    (b"knko", fields::knockout),
    (b"tsly", fields::transparency_shapes),
    (b"iOpa", fields::fill_opacity),
    (b"lspf", fields::locked),
    (b"lsct", fields::section_divider),
    (b"lsdk", fields::section_divider),
    (b"lclr", fields::sheet_color),
    (b"shmd", metadata::metadata),
    (b"SoCo", fill::solid_color),
    (b"GdFl", fill::gradient_fill),
    (b"PtFl", fill::pattern_fill),
    (b"vmsk", vector_mask::vector_mask),
    (b"vsms", vector_mask::vector_mask),
    (b"TySh", typetool::type_tool),
    (b"lrFX", effects::effects),
    (b"lfx2", fill::object_effects),
    (b"lyvr", fields::layer_version),
    (b"fxrp", fields::reference_point),
];

/// Look up the leaf decoder registered for `key`.
pub fn decoder_for(key: Tag) -> Option<LeafDecoder> {
    REGISTRY.iter().find(|(k, _)| key == *k).map(|(_, f)| *f)
}

/// Decode `data` as the payload of a `key` block located at `offset`.
/// Unknown keys decode to [`Block::Opaque`].
pub fn decode_leaf(key: Tag, data: &[u8], offset: u64) -> Result<Block> {
    match decoder_for(key) {
        Some(decode) => decode(&mut Reader::at(data, offset, Section::AdditionalInfo(key))),
        None => Ok(Block::Opaque),
    }
}

// ── Framing ──────────────────────────────────────────────────────────────────

fn is_wide(signature: Tag, key: Tag, large: bool) -> bool {
    large && (signature == SIG_8B64 || WIDE_KEYS.iter().any(|k| key == *k))
}

/// Payload bytes that follow a block declaring `declared` bytes.
fn payload_len(key: Tag, declared: u64) -> u64 {
    match &key.0 {
        b"Txt2" => declared + declared % 2 + 2,
        b"LMsk" => declared + 2,
        _ => declared,
    }
}

/// Inverse of [`payload_len`] for re-encoding.
fn declared_len(key: Tag, payload: u64) -> u64 {
    match &key.0 {
        b"Txt2" | b"LMsk" => payload.saturating_sub(2),
        _ => payload,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalInfo {
    pub signature: Tag,
    pub key:       Tag,
    /// Payload exactly as stored, per-key extra bytes included.
    pub data:      Vec<u8>,
    pub block:     Block,
    /// Why the leaf decoder rejected the payload, if it did.
    pub failure:   Option<Fault>,
}

impl AdditionalInfo {
    /// A block whose payload is decoded on construction.
    pub fn new(key: Tag, data: Vec<u8>) -> Self {
        let (block, failure) = match decode_leaf(key, &data, 0) {
            Ok(block) => (block, None),
            Err(e) => (Block::Opaque, e.fault().cloned()),
        };
        Self { signature: SIG_8BIM, key, data, block, failure }
    }

    /// Read one framed block and dispatch its payload.
    pub fn read(r: &mut Reader<'_>, large: bool, strict: bool) -> Result<Self> {
        let signature = r.expect_tag("additional info signature", &[SIG_8BIM, SIG_8B64])?;
        let key = r.read_tag()?;
        let declared = r.read_length(is_wide(signature, key, large))?;
        let len = payload_len(key, declared);
        let offset = r.position();
        let data = r.window(len, Section::AdditionalInfo(key))?.rest();
        log::trace!("additional info '{}': {} bytes at offset {}", key, len, offset);

        let (block, failure) = match decode_leaf(key, data, offset) {
            Ok(block) => (block, None),
            Err(e) if strict => return Err(e),
            Err(e) => {
                log::warn!("keeping additional info '{}' opaque: {}", key, e);
                (Block::Opaque, e.fault().cloned())
            }
        };
        Ok(Self { signature, key, data: data.to_vec(), block, failure })
    }

    pub fn write<W: Write>(&self, mut writer: W, large: bool) -> io::Result<()> {
        let declared = declared_len(self.key, self.data.len() as u64);
        let total = payload_len(self.key, declared);
        write_tag(&mut writer, self.signature)?;
        write_tag(&mut writer, self.key)?;
        write_length(&mut writer, declared, is_wide(self.signature, self.key, large))?;
        writer.write_all(&self.data)?;
        write_zeros(&mut writer, (total - self.data.len() as u64) as usize)
    }
}

/// Additional-info blocks keyed by their 4-byte key; a repeated key keeps
/// the last block read.
pub type InfoMap = BTreeMap<Tag, AdditionalInfo>;

/// Smallest framed block: signature, key, 4-byte length.
const MIN_FRAME: usize = 12;

/// Read blocks until `r` is exhausted.  A zero tail too short to frame a
/// block is alignment padding and ends the sequence.
pub fn read_blocks(r: &mut Reader<'_>, large: bool, strict: bool) -> Result<InfoMap> {
    let mut map = InfoMap::new();
    while !r.is_empty() {
        if r.remaining() < MIN_FRAME && r.clone().rest().iter().all(|&b| b == 0) {
            log::debug!("additional info: {} pad bytes at offset {}", r.remaining(), r.position());
            break;
        }
        let info = AdditionalInfo::read(r, large, strict)?;
        map.insert(info.key, info);
    }
    Ok(map)
}

pub fn write_blocks<W: Write>(mut writer: W, blocks: &InfoMap, large: bool) -> io::Result<()> {
    for info in blocks.values() {
        info.write(&mut writer, large)?;
    }
    Ok(())
}
