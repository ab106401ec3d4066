use std::io::{self, Read, Seek, SeekFrom};

use log::{debug, info, warn};

use crate::entry::{
    ContainerHeader, EntryDescriptor, ResolvedEntry, Span, Variant, ENTRY_SIZE, HEADER_SIZE,
    HSDT_MAGIC,
};
use crate::error::{ParseError, Result};

/// Granularity of the magic scan, the smallest page size the images are aligned to.
pub const SCAN_BLOCK_SIZE: usize = 2048;

/// Where scanned-variant payload offsets are counted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseOffset {
    /// Twice the located page boundary, as the existing unpacker computes it.
    #[default]
    Legacy,
    /// The exact position of the container header.
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub variant: Variant,
    pub base_offset: BaseOffset,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            variant: Variant::Direct,
            base_offset: BaseOffset::Legacy,
        }
    }
}

/// Result of the page-aligned magic scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicLocation {
    /// Page boundary preceding the block the magic was seen in.
    pub boundary: u64,
    /// Exact byte position of the magic.
    pub magic_offset: u64,
}

/// A fully parsed image: header, where it was found and every resolved entry.
#[derive(Debug)]
pub struct ParsedImage {
    pub header: ContainerHeader,
    pub header_position: u64,
    pub base_position: u64,
    pub entries: Vec<ResolvedEntry>,
}

/// Read up to `len` bytes starting at `position`. Returns fewer on end of stream.
fn read_at<R: Read + Seek>(stream: &mut R, position: u64, len: usize) -> io::Result<Vec<u8>> {
    stream.seek(SeekFrom::Start(position))?;
    let mut buf = Vec::new();
    stream.by_ref().take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Decode the fixed 12 byte header at `position`.
///
/// The direct layout checks the magic here; the scanned layout already found
/// it while locating the header.
pub fn decode_header<R: Read + Seek>(
    stream: &mut R,
    position: u64,
    variant: Variant,
) -> Result<ContainerHeader> {
    let data = read_at(stream, position, HEADER_SIZE)?;
    let buf: &[u8; HEADER_SIZE] = match data.as_slice().try_into() {
        Ok(buf) => buf,
        Err(_) => {
            return Err(ParseError::MalformedHeader {
                position,
                reason: format!("need {} bytes, got {}", HEADER_SIZE, data.len()),
            })
        }
    };

    let header = ContainerHeader::from_bytes(buf);

    if variant == Variant::Direct && !header.has_valid_magic() {
        return Err(ParseError::MalformedHeader {
            position,
            reason: format!("bad magic {:02x?}", header.magic),
        });
    }
    if header.entry_count < 0 {
        return Err(ParseError::MalformedHeader {
            position,
            reason: format!("negative entry count {}", header.entry_count),
        });
    }

    Ok(header)
}

/// Byte length of a table of `count` entries, `None` if it overflows `usize`.
fn table_size(count: usize) -> Option<usize> {
    count.checked_mul(ENTRY_SIZE)
}

/// Decode `header.entry_count` records starting at `position`, in table order.
pub fn decode_entries<R: Read + Seek>(
    stream: &mut R,
    position: u64,
    header: &ContainerHeader,
    variant: Variant,
) -> Result<Vec<EntryDescriptor>> {
    let count = header.entry_count.max(0) as usize;
    let expected = table_size(count).ok_or_else(|| ParseError::MalformedHeader {
        position,
        reason: format!("entry table of {} entries does not fit in memory", count),
    })?;
    let table = read_at(stream, position, expected)?;

    if table.len() < expected {
        let index = table.len() / ENTRY_SIZE;
        return Err(ParseError::TruncatedTable {
            index,
            count,
            position: position + (index * ENTRY_SIZE) as u64,
            expected: ENTRY_SIZE,
            available: table.len() % ENTRY_SIZE,
        });
    }

    let entries = table
        .chunks_exact(ENTRY_SIZE)
        .map(|record| {
            let mut buf = [0u8; ENTRY_SIZE];
            buf.copy_from_slice(record);
            EntryDescriptor::from_bytes(variant, &buf)
        })
        .collect();

    Ok(entries)
}

/// Scan the stream in non-overlapping pages for the HSDT magic.
///
/// The magic is only recognised when it lies entirely within one page; a
/// signature straddling two pages is not seen.
pub fn locate_magic<R: Read + Seek>(stream: &mut R) -> Result<MagicLocation> {
    stream.seek(SeekFrom::Start(0))?;

    let mut block = Vec::with_capacity(SCAN_BLOCK_SIZE);
    let mut block_start = 0u64;

    loop {
        block.clear();
        let n = stream
            .by_ref()
            .take(SCAN_BLOCK_SIZE as u64)
            .read_to_end(&mut block)?;
        if n == 0 {
            return Err(ParseError::MagicNotFound {
                scanned: block_start,
            });
        }

        if let Some(at) = block.windows(HSDT_MAGIC.len()).position(|w| w == HSDT_MAGIC) {
            let location = MagicLocation {
                boundary: block_start.saturating_sub(SCAN_BLOCK_SIZE as u64),
                magic_offset: block_start + at as u64,
            };
            debug!(
                "Found magic at {:#x} (page boundary {:#x})",
                location.magic_offset, location.boundary
            );
            return Ok(location);
        }

        block_start += n as u64;
    }
}

fn read_payload<R: Read + Seek>(
    stream: &mut R,
    kind: &'static str,
    base_position: u64,
    span: Span,
) -> Result<Vec<u8>> {
    let position = base_position.saturating_add(span.offset);
    let data = read_at(stream, position, span.size)?;
    if data.len() < span.size {
        return Err(ParseError::TruncatedPayload {
            kind,
            position,
            expected: span.size,
            available: data.len(),
        });
    }
    Ok(data)
}

/// Read the payload(s) an entry points at, relative to `base_position`.
pub fn resolve<R: Read + Seek>(
    stream: &mut R,
    base_position: u64,
    index: usize,
    entry: EntryDescriptor,
) -> Result<ResolvedEntry> {
    let dtb_span = entry.dtb_span(index)?;
    let dtb_bytes = read_payload(stream, "DTB", base_position, dtb_span)?;

    let vrl_bytes = match entry.vrl_span(index)? {
        Some(span) => Some(read_payload(stream, "VRL", base_position, span)?),
        None => None,
    };

    let resolved = ResolvedEntry::new(entry, dtb_bytes, vrl_bytes);
    debug!(
        "Entry {}: dtb {:#x}+{} compressed={} vrl={}",
        index,
        dtb_span.offset,
        dtb_span.size,
        resolved.compressed,
        resolved.vrl_bytes.as_ref().map_or(0, |v| v.len())
    );
    Ok(resolved)
}

/// Parse a whole image: locate (scanned only), header, entry table, payloads.
///
/// All or nothing: the first failure aborts the parse and no entries are returned.
pub fn parse<R: Read + Seek>(stream: &mut R, options: ParseOptions) -> Result<ParsedImage> {
    let (header_position, base_position) = match options.variant {
        Variant::Direct => (0, 0),
        Variant::Scanned => {
            let location = locate_magic(stream)?;
            let base = match options.base_offset {
                BaseOffset::Legacy => location.boundary * 2,
                BaseOffset::Header => location.magic_offset,
            };
            if options.base_offset == BaseOffset::Legacy
                && location.magic_offset % SCAN_BLOCK_SIZE as u64 != 0
            {
                warn!(
                    "Magic at {:#x} is not page aligned, the legacy base may be wrong",
                    location.magic_offset
                );
            }
            debug!(
                "Payload base {:#x}, header at {:#x}",
                base, location.magic_offset
            );
            (location.magic_offset, base)
        }
    };

    let header = decode_header(stream, header_position, options.variant)?;
    info!(
        "HSDT version {} with {} entries at {:#x}",
        header.version, header.entry_count, header_position
    );

    let descriptors = decode_entries(
        stream,
        header_position + HEADER_SIZE as u64,
        &header,
        options.variant,
    )?;

    let entries = descriptors
        .into_iter()
        .enumerate()
        .map(|(index, entry)| resolve(stream, base_position, index, entry))
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedImage {
        header,
        header_position,
        base_position,
        entries,
    })
}
