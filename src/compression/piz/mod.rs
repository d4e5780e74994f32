//! The PIZ compression method is a wavelet compression, based on the PIZ image
//! format, customized for OpenEXR.
// inspired by https://github.com/AcademySoftwareFoundation/openexr/blob/master/OpenEXR/IlmImf/ImfPizCompressor.cpp

pub(crate) mod huffman;
mod wavelet;

use crate::error::{Error, Result, usize_to_u16};
use crate::io::Data;
use crate::math::{Vec2, mod_p};
use crate::meta::{ChannelList, SampleType, Window, count_samples, first_sample, is_sampled};
use super::{ByteVec, Bytes};

const U16_RANGE: usize = 1 << 16;
const BITMAP_SIZE: usize = U16_RANGE >> 3;

#[derive(Debug)]
struct ChannelData {
    tmp_start_index: usize,
    tmp_end_index: usize,
    resolution: Vec2<usize>,
    y_sampling: i32,
    samples_per_pixel: usize,
}

pub fn decompress(
    channels: &ChannelList,
    compressed: Bytes<'_>,
    rectangle: Window,
    expected_byte_size: usize,
    pedantic: bool,
) -> Result<ByteVec> {
    let expected_value_count = expected_byte_size / 2;

    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let mut channel_data: Vec<ChannelData> = Vec::with_capacity(channels.list.len());
    let mut tmp_read_index = 0;

    for channel in &channels.list {
        let width = count_samples(rectangle.x_min, rectangle.x_max, channel.x_sampling);
        let height = count_samples(rectangle.y_min, rectangle.y_max, channel.y_sampling);
        let samples_per_pixel = channel.pixel_type.bytes_per_sample() / SampleType::Half.bytes_per_sample();
        let resolution = Vec2(width, height);

        let data = ChannelData {
            tmp_start_index: tmp_read_index,
            tmp_end_index: tmp_read_index,
            resolution,
            y_sampling: channel.y_sampling,
            samples_per_pixel,
        };

        tmp_read_index += resolution.area() * samples_per_pixel;
        channel_data.push(data);
    }

    if tmp_read_index != expected_value_count {
        return Err(Error::invalid("piz channel layout does not match the expected byte size"));
    }

    let mut bitmap = vec![0_u8; BITMAP_SIZE];
    let mut remaining_input = compressed;

    let min_non_zero = u16::read(&mut remaining_input)? as usize;
    let max_non_zero = u16::read(&mut remaining_input)? as usize;

    if max_non_zero >= BITMAP_SIZE || min_non_zero >= BITMAP_SIZE {
        return Err(Error::invalid("piz bitmap bounds are out of range"));
    }

    if min_non_zero <= max_non_zero {
        u8::read_slice(&mut remaining_input, &mut bitmap[min_non_zero..=max_non_zero])?;
    }

    let (lookup_table, max_value) = reverse_lookup_table_from_bitmap(&bitmap);

    let huffman_byte_size = i32::read(&mut remaining_input)?;
    if pedantic && huffman_byte_size as i64 != remaining_input.len() as i64 {
        return Err(Error::invalid("piz huffman payload size does not match the remaining chunk"));
    }

    let mut tmp_u16_buffer = huffman::decompress(remaining_input, expected_value_count)?;

    for channel in &channel_data {
        let u16_count = channel.resolution.area() * channel.samples_per_pixel;
        let u16s = &mut tmp_u16_buffer[channel.tmp_start_index..channel.tmp_start_index + u16_count];

        for offset in 0..channel.samples_per_pixel {
            wavelet::decode(
                &mut u16s[offset..],
                channel.resolution,
                Vec2(channel.samples_per_pixel, channel.resolution.x() * channel.samples_per_pixel),
                max_value,
            )?;
        }
    }

    apply_lookup_table(&mut tmp_u16_buffer, &lookup_table);

    let mut out = Vec::with_capacity(expected_byte_size);

    for y in rectangle.y_min..=rectangle.y_max {
        for channel in &mut channel_data {
            let origin = first_sample(rectangle.y_min, channel.y_sampling);
            if !is_sampled(y, origin, channel.y_sampling) {
                continue;
            }

            let u16s_per_line = channel.resolution.x() * channel.samples_per_pixel;
            let next_tmp_end_index = channel.tmp_end_index + u16s_per_line;

            if next_tmp_end_index > tmp_u16_buffer.len() {
                return Err(Error::invalid("piz decode overran its temporary sample buffer"));
            }

            let values = &tmp_u16_buffer[channel.tmp_end_index..next_tmp_end_index];
            channel.tmp_end_index = next_tmp_end_index;

            for value in values {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }

    if out.len() != expected_byte_size {
        return Err(Error::invalid("piz decode produced an unexpected byte count"));
    }

    Ok(out)
}

fn reverse_lookup_table_from_bitmap(bitmap: &[u8]) -> (Vec<u16>, u16) {
    let mut table = Vec::with_capacity(U16_RANGE);

    for index in 0..U16_RANGE {
        if index == 0 || (bitmap[index >> 3] as usize & (1 << (index & 7))) != 0 {
            table.push(usize_to_u16(index).unwrap_or(u16::MAX));
        }
    }

    let max_value = usize_to_u16(table.len().saturating_sub(1)).unwrap_or(u16::MAX);
    table.resize(U16_RANGE, 0);

    (table, max_value)
}

fn apply_lookup_table(data: &mut [u16], table: &[u16]) {
    for value in data {
        *value = table[*value as usize];
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ChannelInfo;

    #[test]
    fn rejects_empty_bitmap_range_gracefully() {
        let channels = ChannelList::new(vec![ChannelInfo {
            name: "H".into(), pixel_type: SampleType::Half,
            p_linear: false, x_sampling: 1, y_sampling: 1,
        }]);

        let result = decompress(&channels, &[], Window { x_min: 0, y_min: 0, x_max: 1, y_max: 1 }, 8, true);
        assert_eq!(result.unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_truncated_header() {
        let channels = ChannelList::new(vec![ChannelInfo {
            name: "H".into(), pixel_type: SampleType::Half,
            p_linear: false, x_sampling: 1, y_sampling: 1,
        }]);

        let result = decompress(&channels, &[0, 0], Window { x_min: 0, y_min: 0, x_max: 1, y_max: 1 }, 8, true);
        assert!(result.is_err());
    }
}
