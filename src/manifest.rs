use serde::{Deserialize, Serialize};

use crate::additional::{AdditionalInfo, Block, InfoMap};
use crate::document::Document;

/// Summary of one additional-info block.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InfoEntry {
    pub key:     String,
    pub size:    usize,
    /// A leaf decoder produced a typed record.
    pub decoded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl From<&AdditionalInfo> for InfoEntry {
    fn from(info: &AdditionalInfo) -> Self {
        InfoEntry {
            key:     info.key.as_string(),
            size:    info.data.len(),
            decoded: info.block != Block::Opaque,
            failure: info.failure.as_ref().map(|f| f.to_string()),
        }
    }
}

fn entries(map: &InfoMap) -> Vec<InfoEntry> {
    map.values().map(InfoEntry::from).collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub id:   u16,
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub id:          i16,
    pub length:      u64,
    /// Method name, absent for empty channels.
    pub compression: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LayerEntry {
    pub name:       String,
    /// top, left, bottom, right
    pub rect:       [i32; 4],
    pub blend_mode: String,
    pub opacity:    u8,
    pub visible:    bool,
    pub channels:   Vec<ChannelEntry>,
    #[serde(default)]
    pub additional: Vec<InfoEntry>,
}

/// Structure of a decoded document without its pixels.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version:      u16,
    pub channels:     u16,
    pub height:       u32,
    pub width:        u32,
    pub depth:        u16,
    pub color_mode:   String,
    pub resources:    Vec<ResourceEntry>,
    pub layers:       Vec<LayerEntry>,
    pub merged_alpha: bool,
    #[serde(default)]
    pub additional:   Vec<InfoEntry>,
    /// Compression of the merged image, if present.
    pub image_data:   Option<String>,
}

impl Manifest {
    pub fn from_document(doc: &Document) -> Self {
        let h = &doc.header;
        Manifest {
            version:      h.version,
            channels:     h.channels,
            height:       h.height,
            width:        h.width,
            depth:        h.depth,
            color_mode:   h.color_mode.name().to_string(),
            resources:    doc
                .resources
                .iter()
                .map(|b| ResourceEntry { id: b.id, name: b.name.clone(), size: b.data.len() })
                .collect(),
            layers:       doc
                .layers
                .iter()
                .map(|l| LayerEntry {
                    name:       l.name().to_string(),
                    rect:       [l.rect.top, l.rect.left, l.rect.bottom, l.rect.right],
                    blend_mode: l.blend_mode.as_string(),
                    opacity:    l.opacity,
                    visible:    l.is_visible(),
                    channels:   l
                        .channels
                        .iter()
                        .map(|c| ChannelEntry {
                            id:          c.id,
                            length:      c.length,
                            compression: c.compression.map(|m| m.name().to_string()),
                        })
                        .collect(),
                    additional: entries(&l.additional),
                })
                .collect(),
            merged_alpha: doc.merged_alpha,
            additional:   entries(&doc.additional),
            image_data:   doc.image_data.as_ref().map(|i| i.compression.name().to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
