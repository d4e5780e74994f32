//! The 2-D Haar-like wavelet transform PIZ applies to each channel's u16 planes.
// ported from https://github.com/AcademySoftwareFoundation/openexr/blob/8cd1b9210855fa4f6923c1b94df8a86166be19b1/OpenEXR/IlmImf/ImfWav.cpp

use crate::error::IoResult;
use crate::math::Vec2;

/// Only used by `#[cfg(test)]` fixtures below, to build inputs for `decode` round-trips.
#[cfg(test)]
pub fn encode(
    buffer: &mut [u16],
    Vec2(count_x, count_y): Vec2<usize>,
    Vec2(offset_x, offset_y): Vec2<usize>,
    max: u16,
) -> IoResult<()> {
    let is_14_bit = max < (1 << 14);
    let count = count_x.min(count_y);
    let mut p: usize = 1;
    let mut p2: usize = 2;

    while p2 <= count {
        let mut position_y = 0;
        let end_y = offset_y * (count_y - p2);
        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;
                let p10 = position_x + offset1_y;
                let p11 = p10 + offset1_x;

                if is_14_bit {
                    let (i00, i01) = encode_14bit(buffer[position_x], buffer[p01]);
                    let (i10, i11) = encode_14bit(buffer[p10], buffer[p11]);
                    let (px_, p10_) = encode_14bit(i00, i10);
                    let (p01_, p11_) = encode_14bit(i01, i11);

                    buffer[position_x] = px_;
                    buffer[p10] = p10_;
                    buffer[p01] = p01_;
                    buffer[p11] = p11_;
                } else {
                    let (i00, i01) = encode_16bit(buffer[position_x], buffer[p01]);
                    let (i10, i11) = encode_16bit(buffer[p10], buffer[p11]);
                    let (px_, p10_) = encode_16bit(i00, i10);
                    let (p01_, p11_) = encode_16bit(i01, i11);

                    buffer[position_x] = px_;
                    buffer[p10] = p10_;
                    buffer[p01] = p01_;
                    buffer[p11] = p11_;
                }

                position_x += offset2_x;
            }

            if count_x & p != 0 {
                let p10 = position_x + offset1_y;
                let (i00, p10_) = {
                    if is_14_bit { encode_14bit(buffer[position_x], buffer[p10]) }
                    else { encode_16bit(buffer[position_x], buffer[p10]) }
                };

                buffer[position_x] = i00;
                buffer[p10] = p10_;
            }

            position_y += offset2_y;
        }

        if count_y & p != 0 {
            let mut position_x = position_y;
            let end_x = position_y + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;

                let (px_, p01_) = {
                    if is_14_bit { encode_14bit(buffer[position_x], buffer[p01]) }
                    else { encode_16bit(buffer[position_x], buffer[p01]) }
                };

                buffer[p01] = p01_;
                buffer[position_x] = px_;

                position_x += offset2_x;
            }
        }

        p = p2;
        p2 <<= 1;
    }

    Ok(())
}

/// Inverse hierarchical 2-D wavelet transform over a strided `count_x`×`count_y` plane.
pub fn decode(
    buffer: &mut [u16], // contains input and output
    Vec2(count_x, count_y): Vec2<usize>, // (nx, ny)
    Vec2(offset_x, offset_y): Vec2<usize>, // (ox, oy)
    max: u16 // maximum buffer[x][y] value
) -> IoResult<()> {
    let is_14_bit = max < (1 << 14);
    let count = count_x.min(count_y);
    let mut p: usize = 1;
    let mut p2: usize;

    while p <= count {
        p <<= 1;
    }

    p >>= 1;
    p2 = p;
    p >>= 1;

    while p >= 1 {
        let mut position_y = 0;
        let end_y = offset_y * (count_y - p2);

        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        debug_assert_ne!(offset_x, 0);
        debug_assert_ne!(offset_y, 0);

        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;
                let p10 = position_x + offset1_y;
                let p11 = p10 + offset1_x;

                assert!(position_x < buffer.len());
                assert!(p01 < buffer.len());
                assert!(p10 < buffer.len());
                assert!(p11 < buffer.len());

                if is_14_bit {
                    let (i00, i10) = decode_14bit(buffer[position_x], buffer[p10]);
                    let (i01, i11) = decode_14bit(buffer[p01], buffer[p11]);

                    let (px_, p01_) = decode_14bit(i00, i01);
                    let (p10_, p11_) = decode_14bit(i10, i11);

                    buffer[position_x] = px_;
                    buffer[p10] = p10_;
                    buffer[p01] = p01_;
                    buffer[p11] = p11_;
                } else {
                    let (i00, i10) = decode_16bit(buffer[position_x], buffer[p10]);
                    let (i01, i11) = decode_16bit(buffer[p01], buffer[p11]);
                    let (px_, p01_) = decode_16bit(i00, i01);
                    let (p10_, p11_) = decode_16bit(i10, i11);

                    buffer[position_x] = px_;
                    buffer[p10] = p10_;
                    buffer[p01] = p01_;
                    buffer[p11] = p11_;
                }

                position_x += offset2_x;
            }

            if count_x & p != 0 {
                let p10 = position_x + offset1_y;
                let (px_, p10_) = {
                    if is_14_bit { decode_14bit(buffer[position_x], buffer[p10]) }
                    else { decode_16bit(buffer[position_x], buffer[p10]) }
                };

                buffer[position_x] = px_;
                buffer[p10] = p10_;
            }

            position_y += offset2_y;
        }

        if count_y & p != 0 {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;

                let (px_, p01_) = {
                    if is_14_bit { decode_14bit(buffer[position_x], buffer[p01]) }
                    else { decode_16bit(buffer[position_x], buffer[p01]) }
                };

                buffer[position_x] = px_;
                buffer[p01] = p01_;

                position_x += offset2_x;
            }
        }

        p2 = p;
        p >>= 1;
    }

    Ok(())
}

// Wavelet basis functions without modulo arithmetic; best compression ratio,
// but only valid for 14-bit data (untransformed values must be < 1 << 14).
#[cfg(test)]
fn encode_14bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i16, b as i16);
    let m = (a + b) >> 1;
    let d = a - b;
    (m as u16, d as u16)
}

#[inline]
fn decode_14bit(l: u16, h: u16) -> (u16, u16) {
    let (l, h) = (l as i16, h as i16);

    let hi = h as i32;
    let ai = l as i32 + (hi & 1) + (hi >> 1);

    let a = ai as i16;
    let b = (ai - hi) as i16;

    (a as u16, b as u16)
}

// Wavelet basis functions with modulo arithmetic; work for full 16-bit data,
// at a slightly worse compression ratio once Huffman-encoded.
const BIT_COUNT: i32 = 16;
const OFFSET_A: i32 = 1 << (BIT_COUNT - 1);
const OFFSET_M: i32 = 1 << (BIT_COUNT - 1);
const MOD_MASK: i32 = (1 << BIT_COUNT) - 1;

#[cfg(test)]
fn encode_16bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i32, b as i32);

    let a_offset = (a + OFFSET_A) & MOD_MASK;
    let mut m = (a_offset + b) >> 1;
    let d = a_offset - b;

    if d < 0 { m = (m + OFFSET_M) & MOD_MASK; }
    let d = d & MOD_MASK;

    (m as u16, d as u16)
}

#[inline]
fn decode_16bit(l: u16, h: u16) -> (u16, u16) {
    let (m, d) = (l as i32, h as i32);

    let b = (m - (d >> 1)) & MOD_MASK;
    let a = (d + b - OFFSET_A) & MOD_MASK;

    (a as u16, b as u16)
}

#[cfg(test)]
mod test {
    use crate::math::Vec2;

    #[test]
    fn roundtrip_14_bit_values() {
        let data = [
            (13, 54), (3, 123), (423, 53), (1, 23), (23, 515), (513, 43),
            (16374, 16381), (16284, 3), (2, 1), (0, 0), (0, 4), (3, 0)
        ];

        for &values in &data {
            let (l, h) = super::encode_14bit(values.0, values.1);
            let result = super::decode_14bit(l, h);
            assert_eq!(values, result);
        }
    }

    #[test]
    fn roundtrip_16_bit_values() {
        let data = [
            (13, 54), (3, 123), (423, 53), (1, 23), (23, 515), (513, 43),
            (16385, 56384), (18384, 36384), (2, 1), (0, 0), (0, 4), (3, 0)
        ];

        for &values in &data {
            let (l, h) = super::encode_16bit(values.0, values.1);
            let result = super::decode_16bit(l, h);
            assert_eq!(values, result);
        }
    }

    #[test]
    fn roundtrip_14bit_image() {
        let data: [u16; 6 * 4] = [
            13, 54, 3, 123, 423, 53,
            1, 23, 23, 515, 513, 43,
            16374, 16381, 16284, 3, 2, 1,
            0, 0, 0, 4, 3, 0,
        ];

        let max = *data.iter().max().unwrap();
        let mut transformed = data;

        super::encode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();
        super::decode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();

        assert_eq!(data, transformed);
    }

    #[test]
    fn roundtrip_16bit_image() {
        let data: [u16; 6 * 4] = [
            13, 54, 3, 123, 423, 53,
            1, 23, 23, 515, 513, 43,
            16385, 56384, 18384, 36384, 2, 1,
            0, 0, 0, 4, 3, 0,
        ];

        let max = *data.iter().max().unwrap();
        let mut transformed = data;

        super::encode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();
        super::decode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();

        assert_eq!(data, transformed);
    }
}
