//! Whole-document decode and encode.
//!
//! # Sections
//! ```text
//! ┌──────────────────────────┐
//! │ header            26 B   │
//! │ color mode data   u32 +  │
//! │ image resources   u32 +  │
//! │ layer and mask    u32|u64│  layer info, global mask, additional info
//! │ image data        rest   │  merged composite, optional
//! └──────────────────────────┘
//! ```
//! Every section is length-prefixed and decoded through its own window, so
//! a section can never read into the next one.  A fault in any of them
//! aborts the decode; only additional-info leaf records are allowed to fail
//! on their own (see [`DecodeOptions::strict_blocks`]).

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::additional::{self, InfoMap};
use crate::codec::{get_codec, Compression, PlaneLayout};
use crate::error::{Fault, PsdError, Result, Section};
use crate::header::{ColorMode, Header};
use crate::io_stream::{write_length, Reader};
use crate::layer::{self, channel, GlobalLayerMask, Layer, LayerInfo, PlaneData, Rect};
use crate::manifest::Manifest;
use crate::resources::{read_image_resources, write_image_resources, ColorModeData, ImageResourceBlock};

// ── Options ──────────────────────────────────────────────────────────────────

/// Decode behaviour.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Abort on the first additional-info block whose leaf decoder fails
    /// instead of keeping it opaque.
    pub strict_blocks:   bool,
    /// When false, pixel data is bounds-checked and skipped.
    pub decode_pixels:   bool,
    /// Keep ZIP payloads as stored rather than failing with `Unsupported`.
    pub keep_compressed: bool,
    /// Decode layer channels on the rayon pool (`parallel` feature).
    pub parallel:        bool,
    /// Polled between layers; once set the decode fails with `Cancelled`.
    pub cancel:          Option<Arc<AtomicBool>>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict_blocks:   false,
            decode_pixels:   true,
            keep_compressed: false,
            parallel:        true,
            cancel:          None,
        }
    }
}

// ── Merged image data ────────────────────────────────────────────────────────

/// The flattened composite stored after layer and mask info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub compression: Compression,
    /// When decoded: one plane per header channel, back to back.
    pub data:        PlaneData,
}

impl ImageData {
    fn layout(header: &Header) -> Option<PlaneLayout> {
        Some(PlaneLayout {
            planes:    header.channels as usize,
            rows:      header.height as usize,
            row_bytes: header.row_bytes(header.width as usize)?,
            wide:      header.is_large(),
        })
    }

    /// Plane `index` of the decoded composite.
    pub fn plane(&self, header: &Header, index: usize) -> Option<&[u8]> {
        let len = Self::layout(header)?.plane_len()?;
        match &self.data {
            PlaneData::Decoded(all) => all.get(index.checked_mul(len)?..(index + 1).checked_mul(len)?),
            _ => None,
        }
    }

    fn read(r: &mut Reader<'_>, header: &Header, opts: &DecodeOptions) -> Result<Option<Self>> {
        r.set_section(Section::ImageData);
        if r.is_empty() {
            return Ok(None);
        }
        channel::check_cancel(r, opts)?;
        let start = r.position();
        let compression = Compression::read(r)?;
        log::debug!("image data: {} at offset {}", compression.name(), start);
        if !opts.decode_pixels {
            r.rest();
            return Ok(Some(Self { compression, data: PlaneData::Skipped }));
        }
        let codec = match get_codec(compression) {
            Ok(codec) => codec,
            Err(_) if opts.keep_compressed => {
                return Ok(Some(Self { compression, data: PlaneData::Compressed(r.rest().to_vec()) }));
            }
            Err(fault) => return Err(PsdError::new(Section::ImageData, start, fault)),
        };
        let layout = Self::layout(header).ok_or_else(|| {
            r.fault(Fault::Bounds { declared: u64::MAX, available: r.remaining() as u64 })
        })?;
        let planes = codec.decode(r, layout)?;
        if !r.is_empty() {
            log::debug!("image data: {} trailing bytes ignored", r.remaining());
            r.rest();
        }
        Ok(Some(Self { compression, data: PlaneData::Decoded(planes.concat()) }))
    }

    fn write<W: Write>(&self, mut writer: W, header: &Header) -> io::Result<()> {
        writer.write_u16::<BigEndian>(self.compression.as_u16())?;
        match &self.data {
            PlaneData::Compressed(bytes) => writer.write_all(bytes),
            PlaneData::Skipped => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "image data pixels were not decoded",
            )),
            PlaneData::Decoded(all) => {
                let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidInput, msg);
                let layout = Self::layout(header).ok_or_else(|| invalid("image too large".into()))?;
                let plane_len = layout.plane_len().ok_or_else(|| invalid("image too large".into()))?;
                if Some(all.len()) != plane_len.checked_mul(layout.planes) {
                    return Err(invalid(format!(
                        "image data holds {} bytes, expected {} planes of {}",
                        all.len(),
                        layout.planes,
                        plane_len
                    )));
                }
                let planes: Vec<&[u8]> = if plane_len == 0 {
                    vec![&[][..]; layout.planes]
                } else {
                    all.chunks(plane_len).collect()
                };
                let codec = get_codec(self.compression).map_err(|f| invalid(f.to_string()))?;
                let mut out = Vec::new();
                codec.encode(&planes, layout, &mut out)?;
                writer.write_all(&out)
            }
        }
    }
}

// ── Pixel collaborator view ──────────────────────────────────────────────────

/// One decoded channel plane handed to the pixel module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRaster<'a> {
    pub id:      i16,
    pub rect:    Rect,
    pub samples: &'a [u8],
}

/// A layer's decoded planes with what is needed to interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRaster<'a> {
    pub index:      usize,
    pub depth:      u16,
    pub color_mode: ColorMode,
    pub channels:   Vec<ChannelRaster<'a>>,
}

// ── Document ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub header:          Header,
    pub color_mode_data: ColorModeData,
    pub resources:       Vec<ImageResourceBlock>,
    /// Bottom-most first, as stored.
    pub layers:          Vec<Layer>,
    pub merged_alpha:    bool,
    pub global_mask:     Option<GlobalLayerMask>,
    /// Additional info attached to the document rather than a layer.
    pub additional:      InfoMap,
    pub image_data:      Option<ImageData>,
}

impl Document {
    /// An empty document for `header`.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            color_mode_data: ColorModeData::default(),
            resources:       Vec::new(),
            layers:          Vec::new(),
            merged_alpha:    false,
            global_mask:     None,
            additional:      InfoMap::new(),
            image_data:      None,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_with(data, &DecodeOptions::default())
    }

    pub fn decode_with(data: &[u8], opts: &DecodeOptions) -> Result<Self> {
        let mut r = Reader::new(data);
        let header = Header::read(&mut r)?;
        log::debug!(
            "{} document {}x{}, {} channels at depth {}, {}",
            if header.is_large() { "PSB" } else { "PSD" },
            header.width,
            header.height,
            header.channels,
            header.depth,
            header.color_mode
        );
        let color_mode_data = ColorModeData::read(&mut r, &header)?;
        let resources = read_image_resources(&mut r)?;

        let mut doc = Document { color_mode_data, resources, ..Document::new(header) };
        doc.read_layer_and_mask(&mut r, opts)?;
        doc.image_data = ImageData::read(&mut r, &doc.header, opts)?;
        Ok(doc)
    }

    /// Decode from a stream, buffering it whole.
    pub fn read<R: Read>(mut reader: R, opts: &DecodeOptions) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::decode_with(&data, opts)
    }

    fn read_layer_and_mask(&mut self, r: &mut Reader<'_>, opts: &DecodeOptions) -> Result<()> {
        r.set_section(Section::LayerAndMask);
        let large = self.header.is_large();
        let len = r.read_length(large)?;
        log::debug!("layer and mask info: {} bytes at offset {}", len, r.position());
        let mut w = r.window(len, Section::LayerAndMask)?;
        if w.is_empty() {
            return Ok(());
        }

        let info = LayerInfo::read(&mut w, &self.header, opts)?;
        self.layers = info.layers;
        self.merged_alpha = info.merged_alpha;

        if w.remaining() >= 4 {
            self.global_mask = GlobalLayerMask::read(&mut w)?;
        }
        w.set_section(Section::LayerAndMask);
        // Writers pad the section with zeros.
        if w.clone().rest().iter().any(|&b| b != 0) {
            self.additional = additional::read_blocks(&mut w, large, opts.strict_blocks)?;
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.header.write(&mut writer)?;
        self.color_mode_data.write(&mut writer)?;
        write_image_resources(&mut writer, &self.resources)?;
        self.write_layer_and_mask(&mut writer)?;
        if let Some(image) = &self.image_data {
            image.write(&mut writer, &self.header)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    fn write_layer_and_mask<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let large = self.header.is_large();
        let empty = self.layers.is_empty()
            && self.global_mask.is_none()
            && self.additional.is_empty();
        if empty {
            return write_length(&mut writer, 0, large);
        }
        let mut body = Vec::new();
        layer::write_layers(&mut body, &self.layers, self.merged_alpha, &self.header)?;
        GlobalLayerMask::write_opt(self.global_mask.as_ref(), &mut body)?;
        additional::write_blocks(&mut body, &self.additional, large)?;
        write_length(&mut writer, body.len() as u64, large)?;
        writer.write_all(&body)
    }

    /// Decoded layer planes for the pixel module, skipping channels without
    /// decoded samples.
    pub fn rasters(&self) -> Vec<LayerRaster<'_>> {
        self.layers
            .iter()
            .enumerate()
            .map(|(index, layer)| LayerRaster {
                index,
                depth:      self.header.depth,
                color_mode: self.header.color_mode,
                channels:   layer
                    .channels
                    .iter()
                    .filter_map(|c| {
                        Some(ChannelRaster { id: c.id, rect: layer.channel_rect(c.id)?, samples: c.pixels()? })
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::from_document(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(width: u32, height: u32) -> Header {
        Header::new(3, height, width, 8, ColorMode::Rgb)
    }

    #[test]
    fn minimal_document_round_trips() {
        let mut doc = Document::new(rgb(2, 2));
        doc.image_data = Some(ImageData {
            compression: Compression::Rle,
            data:        PlaneData::Decoded((0..12).collect()),
        });
        let bytes = doc.encode().unwrap();
        let back = Document::decode(&bytes).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.image_data.as_ref().and_then(|i| i.plane(&back.header, 2)), Some(&[8u8, 9, 10, 11][..]));
    }

    #[test]
    fn missing_image_data_is_none() {
        let doc = Document::new(rgb(1, 1));
        let bytes = doc.encode().unwrap();
        // header + three empty length fields
        assert_eq!(bytes.len(), 26 + 12);
        assert_eq!(Document::decode(&bytes).unwrap().image_data, None);
    }

    #[test]
    fn zip_image_data_kept_on_request() {
        let mut bytes = Document::new(rgb(1, 1)).encode().unwrap();
        bytes.extend_from_slice(&[0, 3, 1, 2, 3]);
        let err = Document::decode(&bytes).unwrap_err();
        assert_eq!(err.section(), Some(Section::ImageData));
        assert!(matches!(err.fault(), Some(Fault::Unsupported(_))));

        let opts = DecodeOptions { keep_compressed: true, ..DecodeOptions::default() };
        let doc = Document::decode_with(&bytes, &opts).unwrap();
        let image = doc.image_data.unwrap();
        assert_eq!(image.compression, Compression::ZipPrediction);
        assert_eq!(image.data, PlaneData::Compressed(vec![1, 2, 3]));
    }

    #[test]
    fn layer_and_mask_length_overrun_is_bounds() {
        let mut bytes = Document::new(rgb(1, 1)).encode().unwrap();
        bytes[26 + 8..26 + 12].copy_from_slice(&100u32.to_be_bytes());
        let err = Document::decode(&bytes).unwrap_err();
        assert_eq!(err.section(), Some(Section::LayerAndMask));
        assert_eq!(err.fault(), Some(&Fault::Bounds { declared: 100, available: 0 }));
    }

    #[test]
    fn trailing_zero_padding_in_layer_and_mask_is_ignored() {
        let mut doc = Document::new(rgb(1, 1));
        doc.global_mask = Some(GlobalLayerMask::default());
        let mut bytes = doc.encode().unwrap();
        let len_at = 26 + 8;
        let len = u32::from_be_bytes([bytes[len_at], bytes[len_at + 1], bytes[len_at + 2], bytes[len_at + 3]]);
        bytes[len_at..len_at + 4].copy_from_slice(&(len + 2).to_be_bytes());
        bytes.extend_from_slice(&[0, 0]);
        let back = Document::decode(&bytes).unwrap();
        assert!(back.additional.is_empty());
        assert_eq!(back.global_mask, doc.global_mask);
    }
}
