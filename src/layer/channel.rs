//! Channel pixel data: the second pass over layer info.
//!
//! Each channel's bytes start with a compression method, followed by one
//! plane covering the channel's rectangle (the layer rect, or the mask's).
//! The whole range is carved out of the layer-info section before anything
//! is decoded, so a length that overruns the section fails before any
//! pixel buffer is allocated.

use byteorder::{BigEndian, WriteBytesExt};
use std::io;
use std::sync::atomic::Ordering;

use crate::codec::{get_codec, Compression, PlaneLayout};
use crate::document::DecodeOptions;
use crate::error::{Fault, PsdError, Result, Section};
use crate::header::Header;
use crate::io_stream::Reader;

use super::Layer;

/// Samples of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaneData {
    /// Pixel decoding was turned off; the bytes were only bounds-checked.
    #[default]
    Skipped,
    /// `rows × row_bytes` samples, row-major.
    Decoded(Vec<u8>),
    /// Payload kept as stored because no codec handles its method.
    Compressed(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// -1 transparency, -2 user mask, -3 real user mask, 0.. color.
    pub id:          i16,
    /// Declared length of the channel's data, method field included.
    pub length:      u64,
    /// `None` for an empty channel, which stores no method.
    pub compression: Option<Compression>,
    pub data:        PlaneData,
}

impl Channel {
    /// A channel known only from its record entry.
    pub fn new(id: i16, length: u64) -> Self {
        Self { id, length, compression: None, data: PlaneData::Skipped }
    }

    /// A channel holding decoded samples, to be encoded with `compression`.
    pub fn decoded(id: i16, compression: Compression, samples: Vec<u8>) -> Self {
        Self { id, length: 0, compression: Some(compression), data: PlaneData::Decoded(samples) }
    }

    pub fn pixels(&self) -> Option<&[u8]> {
        match &self.data {
            PlaneData::Decoded(v) => Some(v),
            _ => None,
        }
    }
}

pub(crate) fn check_cancel(r: &Reader<'_>, opts: &DecodeOptions) -> Result<()> {
    match &opts.cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(r.fault(Fault::Cancelled)),
        _ => Ok(()),
    }
}

/// Shape of channel `id`'s plane in `layer`.
fn plane_layout(layer: &Layer, id: i16, header: &Header) -> Option<PlaneLayout> {
    let rect = layer.channel_rect(id)?;
    Some(PlaneLayout {
        planes:    1,
        rows:      rect.height() as usize,
        row_bytes: header.row_bytes(rect.width() as usize)?,
        wide:      header.is_large(),
    })
}

// ── Decode ───────────────────────────────────────────────────────────────────

type Decoded = (Option<Compression>, PlaneData);

fn decode_channel(
    mut w: Reader<'_>,
    layer: &Layer,
    id: i16,
    header: &Header,
    opts: &DecodeOptions,
) -> Result<Decoded> {
    if w.is_empty() {
        return Ok((None, PlaneData::Decoded(Vec::new())));
    }
    let start = w.position();
    let compression = Compression::read(&mut w)?;
    if !opts.decode_pixels {
        w.rest();
        return Ok((Some(compression), PlaneData::Skipped));
    }

    let layout = plane_layout(layer, id, header).ok_or_else(|| {
        PsdError::new(Section::ChannelData, start, Fault::Bounds { declared: w.remaining() as u64, available: 0 })
    })?;
    let codec = match get_codec(compression) {
        Ok(codec) => codec,
        Err(_) if opts.keep_compressed => {
            return Ok((Some(compression), PlaneData::Compressed(w.rest().to_vec())));
        }
        Err(fault) => return Err(PsdError::new(Section::ChannelData, start, fault)),
    };

    if compression == Compression::Raw {
        let expected = layout.plane_len().unwrap_or(usize::MAX);
        if expected != w.remaining() {
            return Err(w.fault(Fault::Bounds {
                declared:  expected as u64,
                available: w.remaining() as u64,
            }));
        }
    }
    let plane = codec.decode(&mut w, layout)?.into_iter().next().unwrap_or_default();
    if !w.is_empty() {
        return Err(w.fault(Fault::Bounds {
            declared:  w.remaining() as u64,
            available: 0,
        }));
    }
    Ok((Some(compression), PlaneData::Decoded(plane)))
}

fn decode_layer<'a>(
    layer: &Layer,
    windows: Vec<Reader<'a>>,
    header: &Header,
    opts: &DecodeOptions,
) -> Result<Vec<Decoded>> {
    if let Some(first) = windows.first() {
        check_cancel(first, opts)?;
    }
    windows
        .into_iter()
        .zip(&layer.channels)
        .map(|(w, channel)| decode_channel(w, layer, channel.id, header, opts))
        .collect()
}

/// Carve out every channel's window in record order, then decode them,
/// one task per layer when parallel decoding is available.
pub(crate) fn read_channel_data(
    r: &mut Reader<'_>,
    layers: &mut [Layer],
    header: &Header,
    opts: &DecodeOptions,
) -> Result<()> {
    let mut windows = Vec::with_capacity(layers.len());
    for layer in layers.iter() {
        let mut per_layer = Vec::with_capacity(layer.channels.len());
        for channel in &layer.channels {
            per_layer.push(r.window(channel.length, Section::ChannelData)?);
        }
        windows.push(per_layer);
    }
    log::debug!("channel data: {} layers, {} bytes left", layers.len(), r.remaining());

    let results = decode_all(layers, windows, header, opts)?;
    for (layer, decoded) in layers.iter_mut().zip(results) {
        for (channel, (compression, data)) in layer.channels.iter_mut().zip(decoded) {
            channel.compression = compression;
            channel.data = data;
        }
    }
    Ok(())
}

fn decode_all<'a>(
    layers: &[Layer],
    windows: Vec<Vec<Reader<'a>>>,
    header: &Header,
    opts: &DecodeOptions,
) -> Result<Vec<Vec<Decoded>>> {
    #[cfg(feature = "parallel")]
    {
        if opts.parallel {
            use rayon::prelude::*;

            return layers
                .par_iter()
                .zip(windows.into_par_iter())
                .map(|(layer, w)| decode_layer(layer, w, header, opts))
                .collect();
        }
    }

    layers
        .iter()
        .zip(windows)
        .map(|(layer, w)| decode_layer(layer, w, header, opts))
        .collect()
}

// ── Encode ───────────────────────────────────────────────────────────────────

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

/// Encode each channel of `layer`, method field included, in record order.
pub(crate) fn encode_channels(layer: &Layer, header: &Header) -> io::Result<Vec<Vec<u8>>> {
    let mut out = Vec::with_capacity(layer.channels.len());
    for channel in &layer.channels {
        let mut buf = Vec::new();
        match (&channel.data, channel.compression) {
            (_, None) => {}
            (PlaneData::Compressed(bytes), Some(c)) => {
                buf.write_u16::<BigEndian>(c.as_u16())?;
                buf.extend_from_slice(bytes);
            }
            (PlaneData::Decoded(samples), Some(c)) => {
                let layout = plane_layout(layer, channel.id, header)
                    .ok_or_else(|| invalid(format!("channel {} has no rectangle", channel.id)))?;
                let codec = get_codec(c).map_err(|f| invalid(f.to_string()))?;
                buf.write_u16::<BigEndian>(c.as_u16())?;
                codec.encode(&[samples.as_slice()], layout, &mut buf)?;
            }
            (PlaneData::Skipped, Some(_)) => {
                return Err(invalid(format!("channel {} pixels were not decoded", channel.id)));
            }
        }
        out.push(buf);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ColorMode;
    use crate::layer::{Mask, Rect};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn layer_with(channels: Vec<Channel>) -> Layer {
        Layer { rect: Rect::new(0, 0, 2, 3), channels, ..Layer::default() }
    }

    fn run(layer: &mut Layer, data: &[u8], opts: &DecodeOptions) -> Result<()> {
        let header = Header::new(3, 2, 3, 8, ColorMode::Rgb);
        let mut r = Reader::new(data);
        read_channel_data(&mut r, std::slice::from_mut(layer), &header, opts)
    }

    #[test]
    fn raw_and_rle_channels_decode() {
        let mut data = vec![0, 0, 1, 2, 3, 4, 5, 6];
        // rle: two rows of "2 repeats 3" (-2 → 3 copies)
        data.extend_from_slice(&[0, 1, 0, 2, 0, 2, 0xFE, 9, 0xFE, 7]);
        let mut layer = layer_with(vec![Channel::new(0, 8), Channel::new(1, 10)]);
        run(&mut layer, &data, &DecodeOptions::default()).unwrap();
        assert_eq!(layer.pixels(0), Some(&[1u8, 2, 3, 4, 5, 6][..]));
        assert_eq!(layer.pixels(1), Some(&[9u8, 9, 9, 7, 7, 7][..]));
        assert_eq!(layer.channels[1].compression, Some(Compression::Rle));
    }

    #[test]
    fn raw_length_must_match_rect() {
        let data = [0, 0, 1, 2, 3];
        let mut layer = layer_with(vec![Channel::new(0, 5)]);
        let err = run(&mut layer, &data, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err.fault(), Some(&Fault::Bounds { declared: 6, available: 3 }));
        assert_eq!(err.section(), Some(Section::ChannelData));
    }

    #[test]
    fn channel_length_beyond_section_fails_before_decode() {
        let mut layer = layer_with(vec![Channel::new(0, 1000)]);
        let err = run(&mut layer, &[0, 0, 1], &DecodeOptions::default()).unwrap_err();
        assert_eq!(err.fault(), Some(&Fault::Bounds { declared: 1000, available: 3 }));
    }

    #[test]
    fn zip_is_unsupported_unless_kept() {
        let data = [0, 2, 0x78, 0x9c, 1, 2];
        let mut layer = layer_with(vec![Channel::new(0, 6)]);
        let err = run(&mut layer, &data, &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err.fault(), Some(Fault::Unsupported(_))));
        assert_eq!(err.offset(), Some(0));

        let opts = DecodeOptions { keep_compressed: true, ..DecodeOptions::default() };
        let mut layer = layer_with(vec![Channel::new(0, 6)]);
        run(&mut layer, &data, &opts).unwrap();
        assert_eq!(layer.channels[0].data, PlaneData::Compressed(vec![0x78, 0x9c, 1, 2]));
        assert_eq!(layer.channels[0].compression, Some(Compression::Zip));
    }

    #[test]
    fn metadata_only_decode_skips_pixels() {
        let opts = DecodeOptions { decode_pixels: false, ..DecodeOptions::default() };
        let mut layer = layer_with(vec![Channel::new(0, 8)]);
        run(&mut layer, &[0, 0, 1, 2, 3, 4, 5, 6], &opts).unwrap();
        assert_eq!(layer.channels[0].data, PlaneData::Skipped);
        assert_eq!(layer.channels[0].compression, Some(Compression::Raw));
    }

    #[test]
    fn user_mask_uses_mask_rect() {
        let mut layer = layer_with(vec![Channel::new(-2, 2 + 4)]);
        layer.mask = Some(Mask {
            rect:          Rect::new(0, 0, 2, 2),
            default_color: 0,
            flags:         0,
            parameters:    None,
            real:          None,
        });
        run(&mut layer, &[0, 0, 255, 0, 0, 255], &DecodeOptions::default()).unwrap();
        assert_eq!(layer.pixels(-2), Some(&[255u8, 0, 0, 255][..]));

        // no real mask for -3
        let mut layer = layer_with(vec![Channel::new(-3, 3)]);
        assert!(run(&mut layer, &[0, 0, 1], &DecodeOptions::default()).is_err());
    }

    #[test]
    fn cancellation_stops_between_layers() {
        let flag = Arc::new(AtomicBool::new(true));
        let opts = DecodeOptions { cancel: Some(flag), ..DecodeOptions::default() };
        let mut layer = layer_with(vec![Channel::new(0, 8)]);
        let err = run(&mut layer, &[0, 0, 1, 2, 3, 4, 5, 6], &opts).unwrap_err();
        assert_eq!(err.fault(), Some(&Fault::Cancelled));
    }

    #[test]
    fn encode_skipped_channel_is_rejected() {
        let header = Header::new(3, 2, 3, 8, ColorMode::Rgb);
        let mut layer = layer_with(vec![Channel::new(0, 8)]);
        layer.channels[0].compression = Some(Compression::Raw);
        assert!(encode_channels(&layer, &header).is_err());

        layer.channels[0].data = PlaneData::Decoded(vec![1; 6]);
        let out = encode_channels(&layer, &header).unwrap();
        assert_eq!(out[0], vec![0, 0, 1, 1, 1, 1, 1, 1]);
    }
}
