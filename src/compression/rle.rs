//! Run-length codec: a stream of signed run markers, followed by the common
//! byte predictor and even/odd interleave shared with ZIP.
// ported from https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfRle.cpp

use crate::error::{Error, Result};
use crate::meta::{ChannelList, Window};
use super::{ByteVec, differences_to_samples, interleave_byte_blocks};

pub fn decompress_bytes(
    _channels: &ChannelList,
    compressed: ByteVec,
    _rectangle: Window,
    expected_byte_size: usize,
    pedantic: bool,
) -> Result<ByteVec> {
    let mut remaining = compressed.as_slice();
    let mut decompressed = Vec::with_capacity(expected_byte_size.min(8 * 2048));

    while !remaining.is_empty() && decompressed.len() != expected_byte_size {
        let count = take_1(&mut remaining)? as i8 as i32;

        if count < 0 {
            // take the next '-count' bytes as-is
            let values = take_n(&mut remaining, (-count) as usize)?;
            decompressed.extend_from_slice(values);
        } else {
            // repeat the next value 'count + 1' times
            let value = take_1(&mut remaining)?;
            decompressed.resize(decompressed.len() + count as usize + 1, value);
        }
    }

    if decompressed.len() != expected_byte_size {
        return Err(Error::invalid("run-length stream ended before filling the expected byte size"));
    }

    if pedantic && !remaining.is_empty() {
        return Err(Error::invalid("run-length stream has trailing data"));
    }

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);
    Ok(decompressed)
}

fn take_1(slice: &mut &[u8]) -> Result<u8> {
    if !slice.is_empty() {
        let result = slice[0];
        *slice = &slice[1..];
        Ok(result)
    } else {
        Err(Error::invalid("run-length stream truncated"))
    }
}

fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Result<&'s [u8]> {
    if n <= slice.len() {
        let (front, back) = slice.split_at(n);
        *slice = back;
        Ok(front)
    } else {
        Err(Error::invalid("run-length stream truncated"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::{ChannelInfo, SampleType};

    fn channels() -> ChannelList {
        ChannelList::new(vec![ChannelInfo {
            name: "U".into(), pixel_type: SampleType::Uint,
            p_linear: false, x_sampling: 1, y_sampling: 1,
        }])
    }

    fn window() -> Window {
        Window { x_min: 0, y_min: 0, x_max: 15, y_max: 0 }
    }

    #[test]
    fn invalid_run_is_rejected() {
        // first byte 127 means "repeat the next byte 128 times", but no byte follows
        let compressed = vec![127_u8];
        let result = decompress_bytes(&channels(), compressed, window(), 16 * 4, true);
        assert!(result.is_err());
    }

    #[test]
    fn single_run_fills_expected_size() {
        let compressed = vec![15_u8, 128];
        let decompressed = decompress_bytes(&channels(), compressed, window(), 16, false).unwrap();
        assert_eq!(decompressed.len(), 16);
    }
}
