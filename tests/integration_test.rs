use psdcodec::additional::AdditionalInfo;
use psdcodec::descriptor::{Descriptor, Item};
use psdcodec::document::ImageData;
use psdcodec::layer::{Mask, Rect};
use psdcodec::resources::ImageResourceBlock;
use psdcodec::{
    Block, Channel, ColorMode, Compression, DecodeOptions, Document, Fault, Header, Layer, Manifest,
    PlaneData, Section, Tag,
};
use std::fs::File;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn info(key: &[u8; 4], data: Vec<u8>) -> AdditionalInfo {
    AdditionalInfo::new(Tag(*key), data)
}

fn luni_payload() -> Vec<u8> {
    vec![0, 0, 0, 6, 48, 236, 48, 164, 48, 228, 48, 252, 0, 32, 0, 48]
}

fn paint_layer(name: &str, rect: Rect, compression: Compression, seed: u8) -> Layer {
    let len = (rect.width() * rect.height()) as usize;
    let channels = [-1i16, 0, 1, 2]
        .iter()
        .map(|&id| {
            let samples = (0..len).map(|i| seed.wrapping_add((i / 3) as u8).wrapping_add(id as u8)).collect();
            Channel::decoded(id, compression, samples)
        })
        .collect();
    Layer { rect, channels, legacy_name: name.into(), ..Layer::default() }
}

fn sample_document() -> Document {
    let header = Header::new(3, 8, 6, 8, ColorMode::Rgb);
    let mut doc = Document::new(header);
    doc.resources.push(ImageResourceBlock::new(1005, vec![0, 72, 0, 0, 0, 1, 0, 1]));
    doc.resources.push(ImageResourceBlock { name: "slices".into(), ..ImageResourceBlock::new(1050, vec![7; 5]) });

    let background = paint_layer("Background", Rect::new(0, 0, 8, 6), Compression::Raw, 10);

    let mut text = paint_layer("Layer 1", Rect::new(2, 1, 5, 5), Compression::Rle, 200);
    text.opacity = 128;
    text.channels.push(Channel::decoded(-2, Compression::Rle, vec![255, 0, 0, 255]));
    text.mask = Some(Mask {
        rect:          Rect::new(2, 1, 4, 3),
        default_color: 0,
        flags:         0,
        parameters:    None,
        real:          None,
    });
    for block in [
        info(b"luni", luni_payload()),
        info(b"lyid", 7u32.to_be_bytes().to_vec()),
        info(b"zzzz", vec![1, 2, 3, 4]),
    ] {
        text.additional.insert(block.key, block);
    }

    let mut fill = Vec::new();
    fill.extend_from_slice(&16u32.to_be_bytes());
    Descriptor::new("", "null")
        .with(
            "Clr ",
            Item::Descriptor(
                Descriptor::new("", "RGBC")
                    .with("Rd  ", Item::Double(255.0))
                    .with("Grn ", Item::Double(0.0))
                    .with("Bl  ", Item::Double(64.0)),
            ),
        )
        .write(&mut fill)
        .unwrap();
    let mut adjustment = paint_layer("Color Fill 1", Rect::new(0, 0, 0, 0), Compression::Raw, 0);
    let soco = info(b"SoCo", fill);
    adjustment.additional.insert(soco.key, soco);

    doc.layers = vec![background, text, adjustment];
    doc.merged_alpha = true;
    let patt = info(b"Patt", vec![0; 8]);
    doc.additional.insert(patt.key, patt);
    doc.image_data = Some(ImageData {
        compression: Compression::Rle,
        data:        PlaneData::Decoded((0..3 * 8 * 6).map(|i| (i % 7) as u8).collect()),
    });
    doc
}

#[test]
fn test_document_roundtrip() {
    let doc = sample_document();
    let bytes = doc.encode().unwrap();
    let back = Document::decode(&bytes).unwrap();

    assert_eq!(back.header, doc.header);
    assert_eq!(back.resources, doc.resources);
    assert!(back.merged_alpha);
    assert_eq!(back.layers.len(), 3);
    assert_eq!(back.image_data, doc.image_data);
    assert_eq!(back.additional, doc.additional);

    for (got, want) in back.layers.iter().zip(&doc.layers) {
        assert_eq!(got.name(), want.name());
        assert_eq!(got.rect, want.rect);
        assert_eq!(got.additional, want.additional);
        for channel in &want.channels {
            assert_eq!(got.pixels(channel.id), channel.pixels(), "channel {}", channel.id);
        }
    }
    assert_eq!(back.layers[1].name(), "レイヤー 0");
    assert_eq!(back.layers[1].block(Tag(*b"lyid")), Some(&Block::LayerId(7)));
    assert_eq!(back.layers[1].block(Tag(*b"zzzz")), Some(&Block::Opaque));
    match back.layers[2].block(Tag(*b"SoCo")) {
        Some(Block::SolidColor(fill)) => {
            let color = fill.color.expect("color");
            assert_eq!((color.red, color.green, color.blue), (255.0, 0.0, 64.0));
        }
        other => panic!("unexpected {:?}", other),
    }

    // Re-encoding the decoded document is stable.
    assert_eq!(back.encode().unwrap(), bytes);
}

#[test]
fn test_large_document_roundtrip() {
    let mut doc = sample_document();
    doc.header.version = 2;
    let lr16 = info(b"Lr16", vec![0; 6]);
    doc.additional.insert(lr16.key, lr16);
    let bytes = doc.encode().unwrap();
    let back = Document::decode(&bytes).unwrap();
    assert!(back.header.is_large());
    assert_eq!(back.layers[1].pixels(0), doc.layers[1].pixels(0));
    assert_eq!(back.additional[&Tag(*b"Lr16")].data, vec![0; 6]);
    assert_eq!(back.encode().unwrap(), bytes);
}

#[test]
fn test_read_from_file() {
    let doc = sample_document();
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(&doc.encode().unwrap()).unwrap();
    temp_file.flush().unwrap();

    let file = File::open(temp_file.path()).unwrap();
    let back = Document::read(file, &DecodeOptions::default()).unwrap();
    assert_eq!(back.layers.len(), 3);
    assert_eq!(back.layers[0].name(), "Background");
}

#[test]
fn test_header_scenario() {
    let mut bytes = vec![
        0x38, 0x42, 0x50, 0x53, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0x00, 0x03, 0x00, 0x00, 0x00, 0x64,
        0x00, 0x00, 0x00, 0x64, 0x00, 0x08, 0x00, 0x03,
    ];
    bytes.extend_from_slice(&[0; 12]);
    let doc = Document::decode(&bytes).unwrap();
    assert_eq!(doc.header, Header::new(3, 100, 100, 8, ColorMode::Rgb));
    assert!(doc.layers.is_empty());
    assert!(doc.image_data.is_none());
}

#[test]
fn test_negative_layer_count() {
    let mut doc = sample_document();
    doc.merged_alpha = false;
    doc.layers.truncate(2);
    let mut bytes = doc.encode().unwrap();
    let resources_len = u32::from_be_bytes([bytes[30], bytes[31], bytes[32], bytes[33]]) as usize;
    // header, color mode length, resources, layer-and-mask length, layer info length
    let count_at = 26 + 4 + 4 + resources_len + 4 + 4;
    assert_eq!(&bytes[count_at..count_at + 2], &[0, 2]);
    bytes[count_at..count_at + 2].copy_from_slice(&[0xFF, 0xFE]);

    let back = Document::decode(&bytes).unwrap();
    assert_eq!(back.layers.len(), 2);
    assert!(back.merged_alpha);
}

#[test]
fn test_padded_document_blocks() {
    let mut doc = Document::new(Header::new(1, 2, 2, 8, ColorMode::Grayscale));
    let patt = info(b"Patt", vec![1, 2, 3, 4, 5, 6]);
    doc.additional.insert(patt.key, patt);
    let mut bytes = doc.encode().unwrap();

    // header, empty color mode data, empty resources
    let len_at = 26 + 4 + 4;
    let len = u32::from_be_bytes([bytes[len_at], bytes[len_at + 1], bytes[len_at + 2], bytes[len_at + 3]]);
    assert_eq!(bytes.len(), len_at + 4 + len as usize);
    bytes[len_at..len_at + 4].copy_from_slice(&(len + 2).to_be_bytes());
    bytes.extend_from_slice(&[0, 0]);

    let back = Document::decode(&bytes).unwrap();
    assert_eq!(back.additional.len(), 1);
    assert_eq!(back.additional[&Tag(*b"Patt")].data, vec![1, 2, 3, 4, 5, 6]);
    assert!(back.image_data.is_none());
}

#[test]
fn test_resource_overrun_is_bounds_error() {
    let mut bytes = Vec::new();
    Header::new(1, 1, 1, 8, ColorMode::Grayscale).write(&mut bytes).unwrap();
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&12u32.to_be_bytes());
    bytes.extend_from_slice(b"8BIM");
    bytes.extend_from_slice(&1000u16.to_be_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&1000u32.to_be_bytes());

    let err = Document::decode(&bytes).unwrap_err();
    assert_eq!(err.section(), Some(Section::ImageResources));
    assert_eq!(err.offset(), Some(46));
    assert_eq!(err.fault(), Some(&Fault::Bounds { declared: 1000, available: 0 }));
}

#[test]
fn test_zip_channel() {
    let mut doc = sample_document();
    doc.layers[0].channels[0] = Channel {
        id:          -1,
        length:      0,
        compression: Some(Compression::Zip),
        data:        PlaneData::Compressed(vec![0x78, 0x9c, 3, 0]),
    };
    let bytes = doc.encode().unwrap();

    let err = Document::decode(&bytes).unwrap_err();
    assert_eq!(err.section(), Some(Section::ChannelData));
    assert!(matches!(err.fault(), Some(Fault::Unsupported(_))));

    let opts = DecodeOptions { keep_compressed: true, ..DecodeOptions::default() };
    let back = Document::decode_with(&bytes, &opts).unwrap();
    assert_eq!(back.layers[0].channels[0].data, PlaneData::Compressed(vec![0x78, 0x9c, 3, 0]));
    assert_eq!(back.layers[0].pixels(0), doc.layers[0].pixels(0));
}

#[test]
fn test_metadata_only_decode() {
    let bytes = sample_document().encode().unwrap();
    let opts = DecodeOptions { decode_pixels: false, ..DecodeOptions::default() };
    let doc = Document::decode_with(&bytes, &opts).unwrap();
    assert_eq!(doc.layers[1].name(), "レイヤー 0");
    assert!(doc.layers.iter().flat_map(|l| &l.channels).all(|c| c.data == PlaneData::Skipped || c.compression.is_none()));
    assert_eq!(doc.image_data.map(|i| i.data), Some(PlaneData::Skipped));
}

#[test]
fn test_cancelled_decode() {
    let bytes = sample_document().encode().unwrap();
    let opts = DecodeOptions { cancel: Some(Arc::new(AtomicBool::new(true))), ..DecodeOptions::default() };
    let err = Document::decode_with(&bytes, &opts).unwrap_err();
    assert_eq!(err.fault(), Some(&Fault::Cancelled));
}

#[test]
fn test_failed_leaf_is_kept_unless_strict() {
    let mut doc = sample_document();
    let vmsk = info(b"vmsk", vec![0, 0, 0, 9, 0, 0, 0, 0]);
    assert!(vmsk.failure.is_some());
    doc.layers[0].additional.insert(vmsk.key, vmsk);
    let bytes = doc.encode().unwrap();

    let back = Document::decode(&bytes).unwrap();
    let kept = &back.layers[0].additional[&Tag(*b"vmsk")];
    assert_eq!(kept.block, Block::Opaque);
    assert!(matches!(kept.failure, Some(Fault::Version { found: 9, .. })));

    let strict = DecodeOptions { strict_blocks: true, ..DecodeOptions::default() };
    let err = Document::decode_with(&bytes, &strict).unwrap_err();
    assert_eq!(err.section(), Some(Section::AdditionalInfo(Tag(*b"vmsk"))));
}

#[test]
fn test_manifest_and_rasters() {
    let doc = Document::decode(&sample_document().encode().unwrap()).unwrap();

    let manifest = doc.manifest();
    assert_eq!(manifest.layers.len(), 3);
    assert_eq!(manifest.layers[1].name, "レイヤー 0");
    assert_eq!(manifest.layers[1].opacity, 128);
    assert_eq!(manifest.resources[1].name, "slices");
    assert_eq!(manifest.image_data.as_deref(), Some("rle"));
    let json = manifest.to_json().unwrap();
    assert_eq!(Manifest::from_json(&json).unwrap(), manifest);

    let rasters = doc.rasters();
    assert_eq!(rasters.len(), 3);
    let mask = rasters[1].channels.iter().find(|c| c.id == -2).expect("mask plane");
    assert_eq!(mask.rect, Rect::new(2, 1, 4, 3));
    assert_eq!(mask.samples, &[255, 0, 0, 255]);
    assert!(rasters.iter().all(|r| r.depth == 8 && r.color_mode == ColorMode::Rgb));
}
