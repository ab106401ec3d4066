use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::display::{describe_entry, print_entry_preview, summarize_entries};
use crate::entry::{EntryDescriptor, ResolvedEntry};
use crate::manifest::Manifest;
use crate::parser::{parse, ParseOptions};

pub const MANIFEST_NAME: &str = "image_info.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub parse: ParseOptions,
    /// Keep gzip payloads compressed on disk.
    pub preserve: bool,
    pub verbose: bool,
}

/// Create `path`, failing if it already exists.
fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut out_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    out_file
        .write_all(data)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write one entry's DTB (and VRL, when present) into `output_dir`
pub fn write_entry(entry: &ResolvedEntry, output_dir: &Path, preserve: bool) -> Result<()> {
    let dtb_path = output_dir.join(format!("{}.dtb", entry.descriptor.dtb_offset()));
    if preserve {
        write_new(&dtb_path, &entry.dtb_bytes)?;
    } else {
        let dtb = entry
            .dtb()
            .with_context(|| format!("Failed to decompress {}", dtb_path.display()))?;
        write_new(&dtb_path, &dtb)?;
    }

    if let (Some(vrl), EntryDescriptor::Scanned(e)) = (&entry.vrl_bytes, &entry.descriptor) {
        write_new(&output_dir.join(format!("{}.vrl", e.vrl_offset)), vrl)?;
    }

    Ok(())
}

/// Parse an HSDT image and dump its payloads plus `image_info.json` into `output_dir`
pub fn process_image(input: &Path, output_dir: &Path, options: &ExtractOptions) -> Result<Manifest> {
    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let mut reader = BufReader::new(file);

    let image = parse(&mut reader, options.parse)
        .with_context(|| format!("Failed to parse {}", input.display()))?;

    println!(
        "[HSDT v{}] {} ({} entries, header @ {:#x}, payload base {:#x})",
        image.header.version,
        input.display(),
        image.header.entry_count,
        image.header_position,
        image.base_position
    );

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    for (i, entry) in image.entries.iter().enumerate() {
        println!("  {}", describe_entry(i, entry));
        if options.verbose {
            print_entry_preview(entry, image.base_position, 2, "  ");
        }
        write_entry(entry, output_dir, options.preserve)?;
    }

    if options.verbose {
        summarize_entries(&image.entries, "");
    }

    let manifest = Manifest::from(&image);
    let json = manifest.to_json().context("Failed to serialize manifest")?;
    write_new(&output_dir.join(MANIFEST_NAME), &json)?;
    info!("Wrote manifest to {}", output_dir.join(MANIFEST_NAME).display());

    println!("Successfully dumped {} dtbs.", image.header.entry_count);

    Ok(manifest)
}
