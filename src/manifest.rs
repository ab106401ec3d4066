use serde::Serialize;

use crate::entry::{EntryDescriptor, ResolvedEntry};
use crate::parser::ParsedImage;

/// Contents of `image_info.json`. Field names are consumed by other tooling.
#[derive(Debug, Serialize, PartialEq)]
pub struct Manifest {
    pub image_version: i32,
    pub image_dt_count: i32,
    pub image_dts: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ManifestEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    pub dtb_size: i32,
    pub dtb_offset: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrl_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrl_offset: Option<i32>,
    pub compressed: bool,
}

impl From<&ResolvedEntry> for ManifestEntry {
    fn from(entry: &ResolvedEntry) -> Self {
        let (vrl_size, vrl_offset) = match &entry.descriptor {
            EntryDescriptor::Direct(_) => (None, None),
            EntryDescriptor::Scanned(e) => (Some(e.vrl_size), Some(e.vrl_offset)),
        };
        Self {
            board_id: entry.board_id(),
            dtb_size: entry.descriptor.dtb_size(),
            dtb_offset: entry.descriptor.dtb_offset(),
            vrl_size,
            vrl_offset,
            compressed: entry.compressed,
        }
    }
}

impl From<&ParsedImage> for Manifest {
    fn from(image: &ParsedImage) -> Self {
        Self {
            image_version: image.header.version,
            image_dt_count: image.header.entry_count,
            image_dts: image.entries.iter().map(ManifestEntry::from).collect(),
        }
    }
}

impl Manifest {
    /// Pretty JSON with four space indentation.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        Ok(out)
    }
}
