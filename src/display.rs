use std::collections::BTreeMap;

use crate::entry::ResolvedEntry;

/// Hex rows for the first `max_lines * 16` bytes of a payload, addressed by
/// image offset (`base` is where the payload starts in the image)
pub fn hexdump_lines(data: &[u8], base: u64, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = data
        .chunks(16)
        .take(max_lines)
        .enumerate()
        .map(|(row, chunk)| {
            let hex: Vec<String> = (0..16)
                .map(|i| chunk.get(i).map_or("  ".to_string(), |b| format!("{:02x}", b)))
                .collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            format!(
                "{:08x}  {}  {}  |{}|",
                base + (row * 16) as u64,
                hex[..8].join(" "),
                hex[8..].join(" "),
                ascii
            )
        })
        .collect();

    if data.len() > max_lines * 16 {
        lines.push(format!("... ({} more bytes)", data.len() - max_lines * 16));
    }
    lines
}

/// Print the start of an entry's DTB payload under its one-line description
pub fn print_entry_preview(
    entry: &ResolvedEntry,
    base_position: u64,
    max_lines: usize,
    indent: &str,
) {
    let start = base_position + entry.descriptor.dtb_offset().max(0) as u64;
    for line in hexdump_lines(&entry.dtb_bytes, start, max_lines) {
        println!("{}  {}", indent, line);
    }
}

/// One line describing an entry: offset, size, compression and board id
pub fn describe_entry(index: usize, entry: &ResolvedEntry) -> String {
    let mut line = format!(
        "[{}] dtb @ {:#x} ({} bytes){}",
        index,
        entry.descriptor.dtb_offset(),
        entry.dtb_bytes.len(),
        if entry.compressed { " [gzip]" } else { "" }
    );
    if let Some(board) = entry.board_id() {
        line.push_str(&format!(" board {:?}", board));
    }
    if let Some(vrl) = &entry.vrl_bytes {
        line.push_str(&format!(" + vrl ({} bytes)", vrl.len()));
    }
    line
}

/// Count entries per board id and compression state
pub fn summarize_entries(entries: &[ResolvedEntry], indent: &str) {
    let mut counts: BTreeMap<(String, bool), usize> = BTreeMap::new();

    for entry in entries {
        let board = entry.board_id().unwrap_or("<none>".to_string());
        *counts.entry((board, entry.compressed)).or_insert(0) += 1;
    }

    println!();
    println!("{}=== Board + Compression Summary ===", indent);
    for ((board, compressed), count) in counts {
        let kind = if compressed { "gzip" } else { "raw" };
        println!("{}{} + {} → {}", indent, board, kind, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryDescriptor, Variant, ENTRY_SIZE};

    #[test]
    fn test_describe_scanned_entry() {
        let mut record = [0u8; ENTRY_SIZE];
        record[0..4].copy_from_slice(b"X7\0\0");
        record[16..20].copy_from_slice(&0x400i32.to_le_bytes());
        let entry = ResolvedEntry::new(
            EntryDescriptor::from_bytes(Variant::Scanned, &record),
            vec![0x1f, 0x8b, 0x08],
            Some(vec![0; 5]),
        );

        assert_eq!(
            describe_entry(2, &entry),
            "[2] dtb @ 0x400 (3 bytes) [gzip] board \"X7\" + vrl (5 bytes)"
        );
    }

    #[test]
    fn test_hexdump_addresses_image_offsets() {
        let mut data = b"HSDT".to_vec();
        data.extend(0u8..20);

        let lines = hexdump_lines(&data, 0x800, 1);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "00000800  48 53 44 54 00 01 02 03  04 05 06 07 08 09 0a 0b  |HSDT............|"
        );
        assert_eq!(lines[1], "... (8 more bytes)");

        let lines = hexdump_lines(&data, 0x800, 4);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "00000810  0c 0d 0e 0f 10 11 12 13                           |........|"
        );
    }

    #[test]
    fn test_hexdump_empty_payload() {
        assert!(hexdump_lines(&[], 0, 3).is_empty());
    }

    #[test]
    fn test_describe_direct_entry() {
        let mut record = [0u8; ENTRY_SIZE];
        record[16..20].copy_from_slice(&52i32.to_le_bytes());
        let entry = ResolvedEntry::new(
            EntryDescriptor::from_bytes(Variant::Direct, &record),
            vec![0xde, 0xad],
            None,
        );

        assert_eq!(describe_entry(0, &entry), "[0] dtb @ 0x34 (2 bytes)");
    }
}
