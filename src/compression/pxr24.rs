//! PXR24: zlib-compressed, byte-plane-separated delta coding. Lossless for HALF and
//! UINT; lossy for FLOAT, which keeps only the top 3 bytes of the IEEE bit pattern.
// ported from https://github.com/AcademySoftwareFoundation/openexr/blob/main/src/lib/OpenEXR/ImfPxr24Compressor.cpp

use crate::error::{Error, Result};
use crate::meta::{ChannelList, SampleType, Window, count_samples, is_sampled};
use super::{ByteVec, Bytes};

fn wire_byte_size(pixel_type: SampleType) -> usize {
    match pixel_type {
        SampleType::Half => 2,
        SampleType::Float => 3, // mantissa LSB byte is discarded on encode
        SampleType::Uint => 4,
    }
}

pub fn decompress_bytes(
    channels: &ChannelList,
    compressed: Bytes<'_>,
    rectangle: Window,
    expected_byte_size: usize,
) -> Result<ByteVec> {
    let planar = miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
        .map_err(|error| Error::invalid(format!("zlib stream: {:?}", error)))?;

    let mut out = Vec::with_capacity(expected_byte_size);
    let mut cursor = 0_usize;

    for y in rectangle.y_min..=rectangle.y_max {
        for channel in &channels.list {
            if !is_sampled(y, crate::meta::first_sample(rectangle.y_min, channel.y_sampling), channel.y_sampling) {
                continue;
            }

            let sampled_width = count_samples(rectangle.x_min, rectangle.x_max, channel.x_sampling);
            let plane_count = wire_byte_size(channel.pixel_type);
            let row_bytes = plane_count * sampled_width;

            if cursor + row_bytes > planar.len() {
                return Err(Error::invalid("pxr24 planar buffer is shorter than the header implies"));
            }

            let planes = &planar[cursor..cursor + row_bytes];
            cursor += row_bytes;

            match channel.pixel_type {
                SampleType::Half => {
                    let mut pixel: u16 = 0;
                    for x in 0..sampled_width {
                        let diff = ((planes[x] as u16) << 8) | planes[sampled_width + x] as u16;
                        pixel = pixel.wrapping_add(diff);
                        out.extend_from_slice(&pixel.to_le_bytes());
                    }
                }

                SampleType::Uint => {
                    let mut pixel: u32 = 0;
                    for x in 0..sampled_width {
                        let diff = (planes[x] as u32) << 24
                            | (planes[sampled_width + x] as u32) << 16
                            | (planes[2 * sampled_width + x] as u32) << 8
                            | planes[3 * sampled_width + x] as u32;
                        pixel = pixel.wrapping_add(diff);
                        out.extend_from_slice(&pixel.to_le_bytes());
                    }
                }

                SampleType::Float => {
                    let mut pixel: u32 = 0;
                    for x in 0..sampled_width {
                        let diff = (planes[x] as u32) << 24
                            | (planes[sampled_width + x] as u32) << 16
                            | (planes[2 * sampled_width + x] as u32) << 8;
                        pixel = pixel.wrapping_add(diff);
                        out.extend_from_slice(&pixel.to_le_bytes());
                    }
                }
            }
        }
    }

    if out.len() != expected_byte_size {
        return Err(Error::invalid("pxr24 decode produced an unexpected byte count"));
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ChannelInfo;

    #[test]
    fn wire_sizes_match_spec() {
        assert_eq!(wire_byte_size(SampleType::Half), 2);
        assert_eq!(wire_byte_size(SampleType::Uint), 4);
        assert_eq!(wire_byte_size(SampleType::Float), 3);
    }

    #[test]
    fn rejects_truncated_planar_buffer() {
        let channels = ChannelList::new(vec![ChannelInfo {
            name: "Z".into(), pixel_type: SampleType::Float,
            p_linear: false, x_sampling: 1, y_sampling: 1,
        }]);

        let window = Window { x_min: 0, y_min: 0, x_max: 3, y_max: 0 };
        let empty_zlib = miniz_oxide::deflate::compress_to_vec_zlib(&[], 6);
        let result = decompress_bytes(&channels, &empty_zlib, window, 16);
        assert!(result.is_err());
    }
}
