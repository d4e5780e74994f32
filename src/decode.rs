//! The decode driver (C7): walks a part's offset table and chunks, invokes the
//! compression dispatch, and assembles dense-per-sample `f32` channel planes.

use half::f16;

use crate::error::{Error, ErrorCode, Event, Level, Phase, Result};
use crate::meta::{ChannelInfo, SampleType, Structure, Window, count_samples, first_sample, is_sampled};

/// One decoded, sample-space (not yet dense-expanded) channel plane.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannel {
    pub pixel_type: SampleType,
    pub x_sampling: i32,
    pub y_sampling: i32,
    pub sampled_width: usize,
    pub sampled_height: usize,
    pub sample_origin_x: i32,
    pub sample_origin_y: i32,
    pub data: Vec<f32>,
}

/// A fully decoded scanline part.
#[derive(Debug, Clone)]
pub struct DecodedPart {
    pub width: usize,
    pub height: usize,
    pub channels: std::collections::HashMap<String, DecodedChannel>,
}

/// Parses the structural metadata of an in-memory EXR byte buffer. Thin wrapper over
/// [`crate::meta::parse_structure`], kept here so callers only need `crate::decode`.
pub fn parse(buffer: &[u8]) -> Result<Structure> {
    crate::meta::parse_structure(buffer)
}

fn u32_to_usize(value: u32) -> usize { value as usize }

/// Byte offset, from the start of the buffer, of `part_id`'s offset table: `headerEndOffset`
/// advanced past every prior part's `chunkCount * 8` bytes (offset tables are always
/// `u64[chunkCount]`, independent of single- vs multi-part).
fn offset_table_start(structure: &Structure, part_id: usize) -> Result<u64> {
    let mut offset = structure.header_end_offset;

    for prior in &structure.parts[..part_id] {
        let chunk_count = chunk_count_for(prior)?;
        offset += chunk_count as u64 * 8;
    }

    Ok(offset)
}

fn chunk_count_for(part: &crate::meta::Part) -> Result<usize> {
    let lines_per_block = part.compression.lines_per_block();
    let height = part.data_window.height();
    Ok((height + lines_per_block - 1) / lines_per_block.max(1))
}

/// Decodes `part_id` out of `buffer` per `structure`, with strict bounds pedantry on.
pub fn decode(buffer: &[u8], structure: &Structure, part_id: usize) -> Result<DecodedPart> {
    decode_with_pedantry(buffer, structure, part_id, true)
}

pub fn decode_with_pedantry(buffer: &[u8], structure: &Structure, part_id: usize, pedantic: bool) -> Result<DecodedPart> {
    let part = structure.part(part_id)?;

    if part.is_unsupported_type() {
        return Err(Error::new(ErrorCode::UnsupportedPartType,
            format!("part type {:?} is not a decodable scanline image", part.part_type)).with("part_id", part_id));
    }

    let window = part.data_window;
    let width = window.width();
    let height = window.height();
    let lines_per_block = part.compression.lines_per_block();
    let chunk_count = chunk_count_for(part)?;

    Event::new(Phase::Decode, Level::Info, "decode.setup", "computed chunk layout for part")
        .with("part_id", part_id).with("chunk_count", chunk_count).with("lines_per_block", lines_per_block as i64)
        .emit();

    let table_start = offset_table_start(structure, part_id)?;
    let table_end = table_start + chunk_count as u64 * 8;
    if table_end > buffer.len() as u64 {
        return Err(Error::new(ErrorCode::MalformedOffsetTable, "offset table extends past the end of the buffer")
            .with("part_id", part_id));
    }

    let mut chunk_offsets = Vec::with_capacity(chunk_count);
    for index in 0..chunk_count {
        let at = (table_start + index as u64 * 8) as usize;
        let bytes: [u8; 8] = buffer[at..at + 8].try_into().unwrap();
        let chunk_offset = u64::from_le_bytes(bytes);

        if chunk_offset >= buffer.len() as u64 {
            return Err(Error::new(ErrorCode::MalformedOffsetTable, "chunk offset points outside the buffer")
                .with("part_id", part_id).with("chunk_index", index));
        }

        chunk_offsets.push(chunk_offset);
    }

    let mut channels: std::collections::HashMap<String, DecodedChannel> = part.channels.list.iter().map(|channel| {
        let sample_origin_x = first_sample(window.x_min, channel.x_sampling);
        let sample_origin_y = first_sample(window.y_min, channel.y_sampling);
        let sampled_width = count_samples(window.x_min, window.x_max, channel.x_sampling);
        let sampled_height = count_samples(window.y_min, window.y_max, channel.y_sampling);

        (channel.name.clone(), DecodedChannel {
            pixel_type: channel.pixel_type, x_sampling: channel.x_sampling, y_sampling: channel.y_sampling,
            sampled_width, sampled_height, sample_origin_x, sample_origin_y,
            data: vec![0.0_f32; sampled_width * sampled_height],
        })
    }).collect();

    for (chunk_index, &chunk_offset) in chunk_offsets.iter().enumerate() {
        let mut cursor = chunk_offset as usize;

        if structure.is_multipart {
            let part_number = read_i32(buffer, &mut cursor)?;
            if u32_to_usize(part_number as u32) != part_id {
                Event::new(Phase::Decode, Level::Warn, "decode.chunk.skipped", "chunk belongs to a different part")
                    .with("part_id", part_id).with("chunk_index", chunk_index).emit();
                continue;
            }
        }

        let y = read_i32(buffer, &mut cursor)?;
        let data_size = read_i32(buffer, &mut cursor)?;

        if data_size < 0 {
            return Err(Error::new(ErrorCode::MalformedChunk, "chunk declares a negative data size")
                .with("part_id", part_id).with("chunk_index", chunk_index));
        }

        let data_size = data_size as usize;
        let data_start = cursor;
        let data_end = data_start.checked_add(data_size)
            .ok_or_else(|| Error::new(ErrorCode::MalformedChunk, "chunk data size overflows"))?;

        if data_end > buffer.len() {
            return Err(Error::new(ErrorCode::MalformedChunk, "chunk data extends past the end of the buffer")
                .with("part_id", part_id).with("chunk_index", chunk_index));
        }

        let lines_in_chunk = lines_per_block.min((window.y_max - y + 1).max(0) as usize);
        let chunk_window = Window { x_min: window.x_min, y_min: y, x_max: window.x_max, y_max: y + lines_in_chunk as i32 - 1 };

        let expected_uncompressed_size: usize = part.channels.list.iter().map(|channel| {
            let rows = count_samples(chunk_window.y_min, chunk_window.y_max, channel.y_sampling);
            let row_width = count_samples(window.x_min, window.x_max, channel.x_sampling);
            rows * row_width * channel.pixel_type.bytes_per_sample()
        }).sum();

        let payload = &buffer[data_start..data_end];

        let block: std::borrow::Cow<'_, [u8]> = if data_size == expected_uncompressed_size {
            std::borrow::Cow::Borrowed(payload)
        } else {
            std::borrow::Cow::Owned(part.compression.decompress(&part.channels, payload, chunk_window, expected_uncompressed_size, pedantic)?)
        };

        write_chunk_into_channels(&block, part.channels.list.iter(), &mut channels, chunk_window, window)?;
    }

    Ok(DecodedPart { width, height, channels })
}

fn read_i32(buffer: &[u8], cursor: &mut usize) -> Result<i32> {
    let bytes = buffer.get(*cursor..*cursor + 4)
        .ok_or_else(|| Error::new(ErrorCode::MalformedChunk, "chunk header is truncated"))?;
    *cursor += 4;
    Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Channel-major-per-row copy of one chunk's decompressed bytes into the part's per-channel
/// `f32` planes, converting HALF via table lookup, FLOAT by raw copy, UINT by normalisation.
fn write_chunk_into_channels<'c>(
    block: &[u8],
    channel_infos: impl Iterator<Item = &'c ChannelInfo> + Clone,
    channels: &mut std::collections::HashMap<String, DecodedChannel>,
    chunk_window: Window,
    data_window: Window,
) -> Result<()> {
    let mut cursor = 0_usize;

    for y in chunk_window.y_min..=chunk_window.y_max {
        for channel_info in channel_infos.clone() {
            let origin = first_sample(data_window.y_min, channel_info.y_sampling);
            if !is_sampled(y, origin, channel_info.y_sampling) {
                continue;
            }

            let decoded = channels.get_mut(&channel_info.name).expect("channel plane missing for a known channel");
            let sampled_row = ((y - decoded.sample_origin_y) / channel_info.y_sampling) as usize;
            let row_bytes = decoded.sampled_width * channel_info.pixel_type.bytes_per_sample();

            let row = block.get(cursor..cursor + row_bytes)
                .ok_or_else(|| Error::new(ErrorCode::MalformedChunk, "decoded chunk is shorter than the row it should hold"))?;
            cursor += row_bytes;

            let dst = &mut decoded.data[sampled_row * decoded.sampled_width..(sampled_row + 1) * decoded.sampled_width];

            match channel_info.pixel_type {
                SampleType::Half => {
                    for (slot, pair) in dst.iter_mut().zip(row.chunks_exact(2)) {
                        *slot = f16::from_bits(u16::from_le_bytes([pair[0], pair[1]])).to_f32();
                    }
                }
                SampleType::Float => {
                    for (slot, quad) in dst.iter_mut().zip(row.chunks_exact(4)) {
                        *slot = f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
                    }
                }
                SampleType::Uint => {
                    for (slot, quad) in dst.iter_mut().zip(row.chunks_exact(4)) {
                        let value = u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
                        *slot = value as f32 / u32::MAX as f32;
                    }
                }
            }
        }
    }

    if cursor < block.len() {
        Event::new(Phase::Decode, Level::Warn, "decode.chunk.trailing_bytes", "decoded chunk had unconsumed trailing bytes")
            .with("trailing", block.len() - cursor).emit();
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::{AttributeValue, Part};
    use crate::compression::Compression;

    fn sample_part(compression: Compression, channels: Vec<ChannelInfo>, window: Window) -> Structure {
        let mut attributes = std::collections::HashMap::new();
        attributes.insert("channels".into(), AttributeValue::Channels(crate::meta::ChannelList::new(channels.clone())));
        attributes.insert("dataWindow".into(), AttributeValue::Box2I(window));
        attributes.insert("compression".into(), AttributeValue::Compression(match compression {
            Compression::None => 0, _ => unreachable!(),
        }));

        let part = Part { id: 0, attributes, channels: crate::meta::ChannelList::new(channels), data_window: window, display_window: None, compression, part_type: None };
        Structure { magic: crate::meta::MAGIC, version: 2, flags: 0, is_multipart: false, parts: vec![part], header_end_offset: 0 }
    }

    #[test]
    fn decodes_none_compressed_half_plane() {
        let _ = env_logger::try_init(); // run with `cargo test -- --nocapture` to see decode.* events

        let channels = vec![ChannelInfo { name: "H".into(), pixel_type: SampleType::Half, p_linear: false, x_sampling: 1, y_sampling: 1 }];
        let window = Window { x_min: 0, y_min: 0, x_max: 1, y_max: 1 };
        let mut structure = sample_part(Compression::None, channels, window);

        // file layout: [offset table (1 entry)] [chunk: i32 y, i32 dataSize, payload]
        let table_pos = 8_u64;
        let chunk_pos = table_pos + 8;

        let half_values: [u16; 4] = [0, 15360, 15360, 0]; // 0.0, 1.0, 1.0, 0.0
        let payload: Vec<u8> = half_values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let mut file = vec![0_u8; table_pos as usize];
        file.extend_from_slice(&chunk_pos.to_le_bytes());
        file.extend_from_slice(&0_i32.to_le_bytes()); // y
        file.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        file.extend_from_slice(&payload);

        structure.header_end_offset = table_pos;

        let decoded = decode(&file, &structure, 0).unwrap();
        let channel = &decoded.channels["H"];
        assert_eq!(channel.data, vec![0.0, 1.0, 1.0, 0.0]);
    }
}
