use std::borrow::Cow;

use crate::compression::{decompress, is_compressed};
use crate::error::{ParseError, Result};

pub const HSDT_MAGIC: &[u8; 4] = b"HSDT";

/// magic[4] | version:i32 | entry_count:i32
pub const HEADER_SIZE: usize = 12;

/// Both entry layouts occupy the same number of bytes.
pub const ENTRY_SIZE: usize = 40;

/// Which container layout the image uses. Chosen by the caller, never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Header at offset 0, absolute payload offsets.
    Direct,
    /// Header somewhere inside the image, entries carry a board id and a VRL blob.
    Scanned,
}

fn le_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn array<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: [u8; 4],
    pub version: i32,
    pub entry_count: i32,
}

impl ContainerHeader {
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: array(buf, 0),
            version: le_i32(buf, 4),
            entry_count: le_i32(buf, 8),
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        &self.magic == HSDT_MAGIC
    }
}

/// A byte range inside the image, relative to the payload base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: u64,
    pub size: usize,
}

/// Direct layout:
/// reserved0[8] | dtb_size | reserved1 | dtb_offset | reserved2 | reserved3[8] | reserved4[8]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectEntry {
    #[allow(dead_code)]
    pub reserved0: [u8; 8],
    pub dtb_size: i32,
    #[allow(dead_code)]
    pub reserved1: [u8; 4],
    pub dtb_offset: i32,
    #[allow(dead_code)]
    pub reserved2: [u8; 4],
    #[allow(dead_code)]
    pub reserved3: [u8; 8],
    #[allow(dead_code)]
    pub reserved4: [u8; 8],
}

/// Scanned layout:
/// board_id[4] | reserved[4] | dtb_size | vrl_size | dtb_offset | vrl_offset | dtb_file:u64 | vrl_file:u64
///
/// `dtb_file` and `vrl_file` are carried through as raw bytes; nothing reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub board_id: [u8; 4],
    #[allow(dead_code)]
    pub reserved: [u8; 4],
    pub dtb_size: i32,
    pub vrl_size: i32,
    pub dtb_offset: i32,
    pub vrl_offset: i32,
    #[allow(dead_code)]
    pub dtb_file: [u8; 8],
    #[allow(dead_code)]
    pub vrl_file: [u8; 8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDescriptor {
    Direct(DirectEntry),
    Scanned(ScannedEntry),
}

fn span(index: usize, offset: (&'static str, i32), size: (&'static str, i32)) -> Result<Span> {
    for (field, value) in [offset, size] {
        if value < 0 {
            return Err(ParseError::InvalidEntry {
                index,
                field,
                value,
            });
        }
    }
    Ok(Span {
        offset: offset.1 as u64,
        size: size.1 as usize,
    })
}

impl EntryDescriptor {
    pub fn from_bytes(variant: Variant, buf: &[u8; ENTRY_SIZE]) -> Self {
        match variant {
            Variant::Direct => EntryDescriptor::Direct(DirectEntry {
                reserved0: array(buf, 0),
                dtb_size: le_i32(buf, 8),
                reserved1: array(buf, 12),
                dtb_offset: le_i32(buf, 16),
                reserved2: array(buf, 20),
                reserved3: array(buf, 24),
                reserved4: array(buf, 32),
            }),
            Variant::Scanned => EntryDescriptor::Scanned(ScannedEntry {
                board_id: array(buf, 0),
                reserved: array(buf, 4),
                dtb_size: le_i32(buf, 8),
                vrl_size: le_i32(buf, 12),
                dtb_offset: le_i32(buf, 16),
                vrl_offset: le_i32(buf, 20),
                dtb_file: array(buf, 24),
                vrl_file: array(buf, 32),
            }),
        }
    }

    pub fn dtb_size(&self) -> i32 {
        match self {
            EntryDescriptor::Direct(e) => e.dtb_size,
            EntryDescriptor::Scanned(e) => e.dtb_size,
        }
    }

    pub fn dtb_offset(&self) -> i32 {
        match self {
            EntryDescriptor::Direct(e) => e.dtb_offset,
            EntryDescriptor::Scanned(e) => e.dtb_offset,
        }
    }

    pub fn dtb_span(&self, index: usize) -> Result<Span> {
        span(
            index,
            ("dtb_offset", self.dtb_offset()),
            ("dtb_size", self.dtb_size()),
        )
    }

    /// `None` for the direct layout, and for scanned entries whose `vrl_offset`
    /// is zero (offset 0 is the header, so it marks "no VRL").
    pub fn vrl_span(&self, index: usize) -> Result<Option<Span>> {
        match self {
            EntryDescriptor::Direct(_) => Ok(None),
            EntryDescriptor::Scanned(e) if e.vrl_offset == 0 => Ok(None),
            EntryDescriptor::Scanned(e) => span(
                index,
                ("vrl_offset", e.vrl_offset),
                ("vrl_size", e.vrl_size),
            )
            .map(Some),
        }
    }

    /// Board id as text, trailing NULs stripped.
    pub fn board_id(&self) -> Option<String> {
        match self {
            EntryDescriptor::Direct(_) => None,
            EntryDescriptor::Scanned(e) => {
                let end = e
                    .board_id
                    .iter()
                    .rposition(|&b| b != 0)
                    .map_or(0, |p| p + 1);
                Some(String::from_utf8_lossy(&e.board_id[..end]).into_owned())
            }
        }
    }
}

/// An entry together with the payload bytes read for it.
#[derive(Debug)]
pub struct ResolvedEntry {
    pub descriptor: EntryDescriptor,
    /// Raw DTB payload, still gzip-compressed if `compressed` is set.
    pub dtb_bytes: Vec<u8>,
    pub vrl_bytes: Option<Vec<u8>>,
    pub compressed: bool,
}

impl ResolvedEntry {
    pub fn new(descriptor: EntryDescriptor, dtb_bytes: Vec<u8>, vrl_bytes: Option<Vec<u8>>) -> Self {
        let compressed = is_compressed(&dtb_bytes);
        Self {
            descriptor,
            dtb_bytes,
            vrl_bytes,
            compressed,
        }
    }

    /// The DTB contents, decompressed when needed.
    ///
    /// Not memoized: every call on a compressed entry inflates the payload again.
    pub fn dtb(&self) -> Result<Cow<'_, [u8]>> {
        if self.compressed {
            decompress(&self.dtb_bytes).map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(&self.dtb_bytes))
        }
    }

    pub fn board_id(&self) -> Option<String> {
        self.descriptor.board_id()
    }
}
