mod compression;
mod display;
mod entry;
mod error;
mod manifest;
mod parser;
mod processor;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use entry::Variant;
use parser::{BaseOffset, ParseOptions};
use processor::{process_image, ExtractOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    /// Header at the start of the image, absolute offsets
    Direct,
    /// Header found by page scan, entries with board id and VRL
    Scanned,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BaseOffsetArg {
    /// Twice the page boundary before the magic
    Legacy,
    /// The header position
    Header,
}

#[derive(Debug, Parser)]
#[command(about = "Extract DTB images from an HSDT container")]
struct Cli {
    /// DTS image to extract.
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory where extracted images are placed.
    #[arg(short, long, default_value = "dtb")]
    output: PathBuf,

    /// If image is gzipped, don't decompress.
    #[arg(short, long)]
    preserve: bool,

    /// Container layout of the image.
    #[arg(long, value_enum, default_value_t = VariantArg::Direct)]
    variant: VariantArg,

    /// Where scanned-variant payload offsets are counted from.
    #[arg(long, value_enum, default_value_t = BaseOffsetArg::Legacy)]
    base_offset: BaseOffsetArg,

    /// Log debug output and show a hexdump of each payload.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            parse: ParseOptions {
                variant: match self.variant {
                    VariantArg::Direct => Variant::Direct,
                    VariantArg::Scanned => Variant::Scanned,
                },
                base_offset: match self.base_offset {
                    BaseOffsetArg::Legacy => BaseOffset::Legacy,
                    BaseOffsetArg::Header => BaseOffset::Header,
                },
            },
            preserve: self.preserve,
            verbose: self.verbose,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(default_filter));

    process_image(&cli.input, &cli.output, &cli.extract_options())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::decompress;
    use crate::parser::parse;
    use clap::CommandFactory;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn build_test_image(payload: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::new();

        // Header: magic, version, entry count
        buffer.extend_from_slice(b"HSDT");
        buffer.extend_from_slice(&1i32.to_le_bytes());
        buffer.extend_from_slice(&1i32.to_le_bytes());

        // Entry: reserved0, dtb_size, reserved1, dtb_offset, reserved2..4
        buffer.extend_from_slice(&[0u8; 8]);
        buffer.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        buffer.extend_from_slice(&[0u8; 4]);
        buffer.extend_from_slice(&52i32.to_le_bytes());
        buffer.extend_from_slice(&[0u8; 20]);

        buffer.extend_from_slice(payload);
        buffer
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_help_describes_every_flag() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("Container layout of the image"));
        assert!(help.contains("Log debug output and show a hexdump of each payload"));
        assert!(help.contains("Where scanned-variant payload offsets are counted from"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["dtsunpack", "-i", "dts.img"]).unwrap();
        assert_eq!(cli.output, PathBuf::from("dtb"));
        let options = cli.extract_options();
        assert_eq!(options.parse, ParseOptions::default());
        assert!(!options.preserve);

        let cli = Cli::try_parse_from([
            "dtsunpack",
            "-i",
            "dts.img",
            "-p",
            "--variant",
            "scanned",
            "--base-offset",
            "header",
        ])
        .unwrap();
        let options = cli.extract_options();
        assert_eq!(options.parse.variant, Variant::Scanned);
        assert_eq!(options.parse.base_offset, BaseOffset::Header);
        assert!(options.preserve);
    }

    #[test]
    fn test_parse_raw_image() {
        let image = build_test_image(&[0xde, 0xad]);
        let parsed = parse(&mut Cursor::new(image), ParseOptions::default()).unwrap();

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].dtb_bytes, vec![0xde, 0xad]);
        assert!(!parsed.entries[0].compressed);
        assert_eq!(&*parsed.entries[0].dtb().unwrap(), &[0xdeu8, 0xad][..]);
    }

    #[test]
    fn test_parse_gzip_image() {
        let tree = b"\xd0\x0d\xfe\xed/ { compatible = \"hisilicon\"; };".to_vec();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&tree).unwrap();
        let packed = encoder.finish().unwrap();

        let image = build_test_image(&packed);
        let parsed = parse(&mut Cursor::new(image), ParseOptions::default()).unwrap();

        let entry = &parsed.entries[0];
        assert!(entry.compressed);
        assert_eq!(entry.dtb_bytes, packed);
        assert_eq!(entry.dtb().unwrap().into_owned(), tree);
        assert_eq!(decompress(&entry.dtb_bytes).unwrap(), tree);
    }
}
