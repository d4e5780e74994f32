//! The `NONE` codec: the chunk payload is already a dense, little-endian byte block.

use crate::error::{Error, Result};
use super::{ByteVec, Bytes};

pub fn decompress_bytes(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    if compressed.len() != expected_byte_size {
        return Err(Error::invalid("uncompressed chunk size does not match expected byte size"));
    }

    Ok(compressed.to_vec())
}
