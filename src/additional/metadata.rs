use crate::descriptor::{Descriptor, DESCRIPTOR_VERSION};
use crate::error::Result;
use crate::io_stream::Reader;
use crate::tag::{Tag, SIG_8B64, SIG_8BIM};

use super::Block;

/// One entry of a `shmd` metadata list.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub signature:         Tag,
    pub key:               Tag,
    pub copy_on_duplicate: bool,
    /// Present when the payload is a versioned descriptor.
    pub descriptor:        Option<Descriptor>,
    pub data:              Vec<u8>,
}

pub(super) fn metadata(r: &mut Reader<'_>) -> Result<Block> {
    let count = r.read_u32()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let signature = r.expect_tag("metadata signature", &[SIG_8BIM, SIG_8B64])?;
        let key = r.read_tag()?;
        let copy_on_duplicate = r.read_u8()? != 0;
        r.skip(3)?;
        let len = r.read_u32()? as u64;
        let mut body = r.window(len, r.section())?;
        let data = body.clone().rest().to_vec();

        let descriptor = if len >= 4 && body.clone().read_u32()? == DESCRIPTOR_VERSION {
            Some(Descriptor::read_versioned(&mut body)?)
        } else {
            None
        };
        entries.push(MetadataEntry { signature, key, copy_on_duplicate, descriptor, data });
    }
    Ok(Block::Metadata(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Item;
    use crate::error::Section;

    #[test]
    fn reads_entries_with_and_without_descriptor() {
        let desc = Descriptor::new("", "metadata").with("layerTime", Item::Double(1_500_000_000.5));
        let mut payload = Vec::new();
        desc.write_versioned(&mut payload).unwrap();

        let mut data = 2u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"8BIMcust");
        data.extend_from_slice(&[1, 0, 0, 0]);
        data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        data.extend_from_slice(&payload);
        data.extend_from_slice(b"8BIMmlst");
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&0u32.to_be_bytes());

        let mut r = Reader::at(&data, 0, Section::AdditionalInfo(Tag(*b"shmd")));
        let Block::Metadata(entries) = metadata(&mut r).unwrap() else {
            panic!("expected metadata");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, Tag(*b"cust"));
        assert!(entries[0].copy_on_duplicate);
        assert_eq!(
            entries[0].descriptor.as_ref().and_then(|d| d.get_f64("layerTime")),
            Some(1_500_000_000.5)
        );
        assert_eq!(entries[0].data, payload);
        assert!(entries[1].descriptor.is_none());
        assert!(r.is_empty());
    }
}
