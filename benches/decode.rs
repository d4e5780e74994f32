#[macro_use]
extern crate bencher;

use bencher::Bencher;

use exr_frame_core::meta::{AttributeValue, ChannelInfo, ChannelList, Part, SampleType, Structure, Window, MAGIC};
use exr_frame_core::compression::Compression;
use exr_frame_core::decode::decode;

/// Builds an in-memory NONE-compressed single-part HALF scanline buffer, `size × size`.
fn synthetic_half_plane(size: usize) -> (Vec<u8>, Structure) {
    let channels = vec![ChannelInfo { name: "H".into(), pixel_type: SampleType::Half, p_linear: false, x_sampling: 1, y_sampling: 1 }];
    let window = Window { x_min: 0, y_min: 0, x_max: size as i32 - 1, y_max: size as i32 - 1 };

    let mut attributes = std::collections::HashMap::new();
    attributes.insert("channels".into(), AttributeValue::Channels(ChannelList::new(channels.clone())));
    attributes.insert("dataWindow".into(), AttributeValue::Box2I(window));
    attributes.insert("compression".into(), AttributeValue::Compression(0));

    let part = Part {
        id: 0, attributes, channels: ChannelList::new(channels),
        data_window: window, display_window: None, compression: Compression::None, part_type: None,
    };

    let mut structure = Structure { magic: MAGIC, version: 2, flags: 0, is_multipart: false, parts: vec![part], header_end_offset: 8 };

    let payload: Vec<u8> = (0..size * size).flat_map(|_| 0_u16.to_le_bytes()).collect();

    let mut file = vec![0_u8; 8];
    let chunk_pos = 16_u64;
    file.extend_from_slice(&chunk_pos.to_le_bytes());
    file.extend_from_slice(&0_i32.to_le_bytes()); // y
    file.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    file.extend_from_slice(&payload);

    structure.header_end_offset = 8;
    (file, structure)
}

fn decode_small_uncompressed(bench: &mut Bencher) {
    let (file, structure) = synthetic_half_plane(64);
    bench.iter(|| {
        let decoded = decode(&file, &structure, 0).unwrap();
        bencher::black_box(decoded);
    })
}

fn decode_large_uncompressed(bench: &mut Bencher) {
    let (file, structure) = synthetic_half_plane(512);
    bench.iter(|| {
        let decoded = decode(&file, &structure, 0).unwrap();
        bencher::black_box(decoded);
    })
}

benchmark_group!(decode_bench, decode_small_uncompressed, decode_large_uncompressed);
benchmark_main!(decode_bench);
