//! ZIP (16 lines/block) and ZIPS (1 line/block): a raw zlib payload followed by
//! the same predictor and interleave inverse used by RLE.
// see https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfZipCompressor.cpp

use crate::error::{Error, Result};
use crate::meta::{ChannelList, Window};
use super::{ByteVec, Bytes, differences_to_samples, interleave_byte_blocks};

pub fn decompress_bytes(
    _channels: &ChannelList,
    compressed: Bytes<'_>,
    _rectangle: Window,
    expected_byte_size: usize,
    pedantic: bool,
) -> Result<ByteVec> {
    let mut decompressed = zune_inflate::DeflateDecoder::new(compressed)
        .decode_zlib()
        .map_err(|error| Error::invalid(format!("zlib stream: {}", error)))?;

    if decompressed.len() != expected_byte_size {
        if pedantic || decompressed.len() < expected_byte_size {
            return Err(Error::invalid("decompressed zlib stream has unexpected length"));
        }

        decompressed.truncate(expected_byte_size);
    }

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);
    Ok(decompressed)
}
