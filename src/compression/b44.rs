//! B44/B44A: lossy 4x4 HALF pixel blocks stored either as a 3-byte flat form
//! or a 14-byte shift/bias/delta-coded form. Non-HALF channels are stored as
//! raw per-channel samples, untouched by the 4x4 lattice.
//
// Ported from the teacher's `compression/b44/mod.rs` (`unpack14`/`unpack3`, the
// flat-vs-lattice dispatch on `block[2] >= 13 << 2`, and the sign-magnitude bit
// transform). The reference `table.rs` (`EXP_TABLE`/`LOG_TABLE`, the `pLinear`
// logarithmic LUT) wasn't part of the retrieved snapshot, so `quantize_linearly`
// channels decode in the same domain as every other HALF channel rather than
// guessing at LUT contents.

use crate::error::{Error, Result};
use crate::meta::{ChannelList, SampleType, Window, count_samples};
use super::{ByteVec, Bytes};

const BLOCK: usize = 4;
const FLAT_BLOCK_BYTES: usize = 3;
const PACKED_BLOCK_BYTES: usize = 14;
const FLAT_SHIFT_THRESHOLD: u8 = 13 << 2;
const SIX_BITS: u32 = 0x3f;

/// Inverts the sign-magnitude transform B44 applies before delta coding: the wire
/// value's own top bit (not the original sample's sign) selects the branch.
fn inverse_bit_transform(wire: u16) -> u16 {
    if wire & 0x8000 != 0 { wire & 0x7fff } else { !wire }
}

/// Fills all 16 samples from a 3-byte flat block (every pixel in the 4x4 shares one value).
fn unpack_flat(block: &[u8], samples: &mut [u16; 16]) {
    let anchor = u16::from_be_bytes([block[0], block[1]]);
    samples.fill(inverse_bit_transform(anchor));
}

/// Reconstructs 16 samples from a 14-byte lattice block: an anchor plus a tree of
/// shifted, biased 6-bit running differences, mirroring the teacher's `unpack14`.
fn unpack_lattice(block: &[u8], samples: &mut [u16; 16]) {
    let b = |i: usize| block[i] as u32;
    let shift = b(2) >> 2;
    let bias = 0x20_u32 << shift;

    let delta = |hi: u32, lo: u32| ((hi << 4 | lo) & SIX_BITS) << shift;

    samples[0] = ((b(0) << 8) | b(1)) as u16;

    let s0 = samples[0] as u32;
    samples[4] = s0.wrapping_add(delta(b(2), b(3) >> 4)).wrapping_sub(bias) as u16;
    let s4 = samples[4] as u32;
    samples[8] = s4.wrapping_add(delta(b(3) << 2, b(4) >> 6)).wrapping_sub(bias) as u16;
    let s8 = samples[8] as u32;
    samples[12] = s8.wrapping_add((b(4) & SIX_BITS) << shift).wrapping_sub(bias) as u16;

    let s0 = samples[0] as u32;
    samples[1] = s0.wrapping_add((b(5) >> 2) << shift).wrapping_sub(bias) as u16;
    let s4 = samples[4] as u32;
    samples[5] = s4.wrapping_add(delta(b(5) << 4, b(6) >> 4)).wrapping_sub(bias) as u16;
    let s8 = samples[8] as u32;
    samples[9] = s8.wrapping_add(delta(b(6) << 2, b(7) >> 6)).wrapping_sub(bias) as u16;
    let s12 = samples[12] as u32;
    samples[13] = s12.wrapping_add((b(7) & SIX_BITS) << shift).wrapping_sub(bias) as u16;

    let s1 = samples[1] as u32;
    samples[2] = s1.wrapping_add((b(8) >> 2) << shift).wrapping_sub(bias) as u16;
    let s5 = samples[5] as u32;
    samples[6] = s5.wrapping_add(delta(b(8) << 4, b(9) >> 4)).wrapping_sub(bias) as u16;
    let s9 = samples[9] as u32;
    samples[10] = s9.wrapping_add(delta(b(9) << 2, b(10) >> 6)).wrapping_sub(bias) as u16;
    let s13 = samples[13] as u32;
    samples[14] = s13.wrapping_add((b(10) & SIX_BITS) << shift).wrapping_sub(bias) as u16;

    let s2 = samples[2] as u32;
    samples[3] = s2.wrapping_add((b(11) >> 2) << shift).wrapping_sub(bias) as u16;
    let s6 = samples[6] as u32;
    samples[7] = s6.wrapping_add(delta(b(11) << 4, b(12) >> 4)).wrapping_sub(bias) as u16;
    let s10 = samples[10] as u32;
    samples[11] = s10.wrapping_add(delta(b(12) << 2, b(13) >> 6)).wrapping_sub(bias) as u16;
    let s14 = samples[14] as u32;
    samples[15] = s14.wrapping_add((b(13) & SIX_BITS) << shift).wrapping_sub(bias) as u16;

    for value in samples.iter_mut() {
        *value = inverse_bit_transform(*value);
    }
}

/// Decodes one 4x4 (or smaller, at a clipped edge) block into `out`, row-major,
/// `out` sized to `width * height` with `width, height <= 4`.
fn decode_block(block: &[u8], width: usize, height: usize, out: &mut [u16]) -> Result<()> {
    let mut samples = [0_u16; BLOCK * BLOCK];

    if block.len() >= FLAT_BLOCK_BYTES && block[2] >= FLAT_SHIFT_THRESHOLD {
        unpack_flat(block, &mut samples);
    } else {
        if block.len() < PACKED_BLOCK_BYTES {
            return Err(Error::invalid("b44 block is shorter than the packed form requires"));
        }

        unpack_lattice(block, &mut samples);
    }

    for row in 0..height {
        for col in 0..width {
            out[row * width + col] = samples[row * BLOCK + col];
        }
    }

    Ok(())
}

pub fn decompress_bytes(
    channels: &ChannelList,
    compressed: Bytes<'_>,
    rectangle: Window,
    expected_byte_size: usize,
    accepts_flat_blocks: bool,
) -> Result<ByteVec> {
    let _ = accepts_flat_blocks; // B44 and B44A share a decoder; both forms are always accepted on read
    let mut cursor = compressed;
    let mut out = Vec::with_capacity(expected_byte_size);

    for channel in &channels.list {
        let width = count_samples(rectangle.x_min, rectangle.x_max, channel.x_sampling);
        let height = count_samples(rectangle.y_min, rectangle.y_max, channel.y_sampling);

        if channel.pixel_type != SampleType::Half {
            let byte_count = width * height * channel.pixel_type.bytes_per_sample();
            let raw = cursor.get(..byte_count).ok_or_else(|| Error::invalid("b44 chunk is shorter than its raw channel data"))?;
            out.extend_from_slice(raw);
            cursor = &cursor[byte_count..];
            continue;
        }

        let mut plane = vec![0_u16; width * height];

        let mut block_y = 0;
        while block_y < height {
            let block_height = BLOCK.min(height - block_y);
            let mut block_x = 0;

            while block_x < width {
                let block_width = BLOCK.min(width - block_x);
                let is_flat = cursor.len() >= FLAT_BLOCK_BYTES && cursor[2] >= FLAT_SHIFT_THRESHOLD;
                let block_size = if is_flat { FLAT_BLOCK_BYTES } else { PACKED_BLOCK_BYTES };

                let block = cursor.get(..block_size).ok_or_else(|| Error::invalid("b44 chunk ends mid-block"))?;
                let mut decoded = vec![0_u16; block_width * block_height];
                decode_block(block, block_width, block_height, &mut decoded)?;

                for row in 0..block_height {
                    let dst = (block_y + row) * width + block_x;
                    plane[dst..dst + block_width].copy_from_slice(&decoded[row * block_width..(row + 1) * block_width]);
                }

                cursor = &cursor[block_size..];
                block_x += BLOCK;
            }

            block_y += BLOCK;
        }

        // `channel.p_linear` selects the reference codec's logarithmic LUT pass
        // (`table.rs`'s EXP_TABLE/LOG_TABLE); not available here, see module docs.
        let _ = channel.p_linear;

        for value in plane {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }

    if out.len() != expected_byte_size {
        return Err(Error::invalid("b44 decode produced an unexpected byte count"));
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ChannelInfo;
    use half::f16;

    fn half_channels() -> ChannelList {
        ChannelList::new(vec![ChannelInfo {
            name: "H".into(), pixel_type: SampleType::Half,
            p_linear: false, x_sampling: 1, y_sampling: 1,
        }])
    }

    #[test]
    fn bit_transform_round_trips_positive_and_negative_halves() {
        let positive = f16::from_f32(0.5).to_bits();
        let negative = f16::from_f32(-0.5).to_bits();

        // forward transform (as the encoder would produce), then the decoder's inverse
        let forward = |wire: u16| if wire & 0x8000 != 0 { !wire } else { wire | 0x8000 };
        assert_eq!(inverse_bit_transform(forward(positive)), positive);
        assert_eq!(inverse_bit_transform(forward(negative)), negative);
    }

    #[test]
    fn flat_block_fills_uniform_value() {
        let channels = half_channels();
        let window = Window { x_min: 0, y_min: 0, x_max: 1, y_max: 1 };

        let half_value = f16::from_f32(0.5).to_bits();
        let forward = if half_value & 0x8000 != 0 { !half_value } else { half_value | 0x8000 };
        let mut chunk = vec![0_u8; FLAT_BLOCK_BYTES];
        chunk[0..2].copy_from_slice(&forward.to_be_bytes());
        chunk[2] = 0xfc; // sentinel marking a flat block, always >= the shift threshold

        let decompressed = decompress_bytes(&channels, &chunk, window, 8, true).unwrap();
        for pair in decompressed.chunks(2) {
            assert_eq!(f16::from_bits(u16::from_be_bytes([pair[0], pair[1]])).to_f32(), 0.5);
        }
    }

    #[test]
    fn rejects_truncated_block() {
        let channels = half_channels();
        let window = Window { x_min: 0, y_min: 0, x_max: 1, y_max: 1 };
        let result = decompress_bytes(&channels, &[1, 2], window, 8, true);
        assert!(result.is_err());
    }

    /// MSB-first bit writer matching the wire order `unpack_lattice` reads: a 6-bit
    /// shift field followed by 15 six-bit running-difference codes.
    struct BitWriter {
        bytes: [u8; PACKED_BLOCK_BYTES],
        bit_position: usize,
    }

    impl BitWriter {
        fn new(anchor: u16) -> Self {
            let mut bytes = [0_u8; PACKED_BLOCK_BYTES];
            bytes[0..2].copy_from_slice(&anchor.to_be_bytes());
            Self { bytes, bit_position: 16 }
        }

        fn push(&mut self, value: u32, bit_count: usize) {
            for i in (0..bit_count).rev() {
                let bit = (value >> i) & 1;
                let byte = self.bit_position / 8;
                let shift = 7 - (self.bit_position % 8);
                self.bytes[byte] |= (bit as u8) << shift;
                self.bit_position += 1;
            }
        }
    }

    #[test]
    fn lattice_block_of_zero_deltas_holds_anchor_everywhere() {
        let anchor_wire: u16 = 0x8000; // forward-transformed zero

        let mut writer = BitWriter::new(anchor_wire);
        writer.push(0, 6); // shift = 0
        for _ in 0..15 {
            writer.push(0x20, 6); // bias-valued code decodes to a zero delta
        }

        let mut samples = [0_u16; 16];
        unpack_lattice(&writer.bytes, &mut samples);
        for value in samples {
            assert_eq!(value, inverse_bit_transform(anchor_wire));
        }
    }
}
