use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Fault, Result, Section};
use crate::header::{ColorMode, Header};
use crate::io_stream::{padding, write_length, write_pascal_string, write_tag, write_zeros, Reader};
use crate::tag::{Tag, SIG_8BIM};

/// Palette size required for indexed documents: 256 RGB triples.
pub const INDEXED_PALETTE_LEN: usize = 768;

const RESOURCE_SIGNATURES: [Tag; 5] = [
    SIG_8BIM,
    Tag(*b"MeSa"),
    Tag(*b"PHUT"),
    Tag(*b"AgHg"),
    Tag(*b"DCSR"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorModeData {
    pub data: Vec<u8>,
}

impl ColorModeData {
    pub fn read(r: &mut Reader<'_>, header: &Header) -> Result<Self> {
        r.set_section(Section::ColorModeData);
        let len = r.read_u32()? as u64;
        log::debug!("color mode data: {} bytes", len);
        if header.color_mode == ColorMode::Indexed && len != INDEXED_PALETTE_LEN as u64 {
            return Err(r.fault(Fault::Size { what: "indexed palette length", found: len }));
        }
        let data = r.bytes_u64(len)?.to_vec();
        Ok(Self { data })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_length(&mut writer, self.data.len() as u64, false)?;
        writer.write_all(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResourceBlock {
    pub signature: Tag,
    pub id:        u16,
    pub name:      String,
    pub data:      Vec<u8>,
}

impl ImageResourceBlock {
    pub fn new(id: u16, data: Vec<u8>) -> Self {
        Self { signature: SIG_8BIM, id, name: String::new(), data }
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let signature = r.expect_tag("image resource signature", &RESOURCE_SIGNATURES)?;
        let id = r.read_u16()?;
        let name = r.read_padded_pascal_string(2)?;
        let size = r.read_u32()? as u64;
        let mut body = r.window(size, Section::ImageResources)?;
        let data = body.rest().to_vec();
        // Some writers omit the pad byte after the last block.
        r.skip(padding(data.len(), 2).min(r.remaining()) as u64)?;
        Ok(Self { signature, id, name, data })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_tag(&mut writer, self.signature)?;
        writer.write_u16::<BigEndian>(self.id)?;
        write_pascal_string(&mut writer, &self.name, 2)?;
        write_length(&mut writer, self.data.len() as u64, false)?;
        writer.write_all(&self.data)?;
        write_zeros(&mut writer, padding(self.data.len(), 2))
    }
}

/// Read the image resources section: a u32 length followed by blocks that
/// must fill it exactly.
pub fn read_image_resources(r: &mut Reader<'_>) -> Result<Vec<ImageResourceBlock>> {
    r.set_section(Section::ImageResources);
    let len = r.read_u32()? as u64;
    log::debug!("image resources: {} bytes at offset {}", len, r.position());
    let mut section = r.window(len, Section::ImageResources)?;
    let mut blocks = Vec::new();
    while !section.is_empty() {
        blocks.push(ImageResourceBlock::read(&mut section)?);
    }
    Ok(blocks)
}

pub fn write_image_resources<W: Write>(mut writer: W, blocks: &[ImageResourceBlock]) -> io::Result<()> {
    let mut body = Vec::new();
    for block in blocks {
        block.write(&mut body)?;
    }
    write_length(&mut writer, body.len() as u64, false)?;
    writer.write_all(&body)
}

/// Look up a resource by id.
pub fn find_resource(blocks: &[ImageResourceBlock], id: u16) -> Option<&ImageResourceBlock> {
    blocks.iter().find(|b| b.id == id)
}
