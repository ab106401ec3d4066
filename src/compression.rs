use std::io::{self, Read};

use flate2::bufread::GzDecoder;

use crate::error::{ParseError, Result};

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True iff the payload starts with the gzip magic.
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 2 && data[0..2] == GZIP_MAGIC
}

/// Inflate a gzip payload. Pure: the input is never modified or cached.
///
/// Back to back members are concatenated and zero padding between or after
/// them is skipped. Anything else following a member is an error.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        if !is_compressed(rest) {
            return Err(ParseError::DecompressionError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} trailing bytes at {:#x} are not a gzip member",
                    rest.len(),
                    data.len() - rest.len()
                ),
            )));
        }

        let mut decoder = GzDecoder::new(rest);
        decoder
            .read_to_end(&mut out)
            .map_err(ParseError::DecompressionError)?;
        rest = decoder.into_inner();

        let padding = rest.iter().position(|&b| b != 0).unwrap_or(rest.len());
        rest = &rest[padding..];
    }

    Ok(out)
}
