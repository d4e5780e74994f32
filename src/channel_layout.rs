//! Nearest-neighbour expansion of a sampled channel into a dense, full-resolution plane.

use std::borrow::Cow;
use crate::meta::{Window, first_sample, count_samples};

/// Expands `data` (row-major, `sampled_width × sampled_height`) into a dense plane covering
/// the whole `data_window`. When the channel is already 1:1 and aligned with the data window's
/// origin, the sampled buffer already *is* the dense plane, and is returned without copying.
pub fn expand_to_dense_plane<'d>(
    data: &'d [f32],
    sampled_width: usize,
    sampled_height: usize,
    x_sampling: i32,
    y_sampling: i32,
    sample_origin_x: i32,
    sample_origin_y: i32,
    data_window: Window,
) -> Cow<'d, [f32]> {
    let width = data_window.width();
    let height = data_window.height();

    if x_sampling == 1 && y_sampling == 1
        && sample_origin_x == data_window.x_min && sample_origin_y == data_window.y_min
        && sampled_width == width && sampled_height == height
    {
        return Cow::Borrowed(data);
    }

    let x_indices: Vec<usize> = (0..width).map(|x| {
        let world_x = data_window.x_min + x as i32;
        let index = (world_x - sample_origin_x) as f32 / x_sampling as f32;
        (index.floor() as i64).clamp(0, sampled_width as i64 - 1) as usize
    }).collect();

    let y_indices: Vec<usize> = (0..height).map(|y| {
        let world_y = data_window.y_min + y as i32;
        let index = (world_y - sample_origin_y) as f32 / y_sampling as f32;
        (index.floor() as i64).clamp(0, sampled_height as i64 - 1) as usize
    }).collect();

    let mut dense = vec![0.0_f32; width * height];

    for (dst_y, &src_y) in y_indices.iter().enumerate() {
        let src_row = &data[src_y * sampled_width..(src_y + 1) * sampled_width];
        let dst_row = &mut dense[dst_y * width..(dst_y + 1) * width];

        for (dst_x, &src_x) in x_indices.iter().enumerate() {
            dst_row[dst_x] = src_row[src_x];
        }
    }

    Cow::Owned(dense)
}

/// Convenience overload matching the C6 sampling-helper signatures directly, for callers
/// that only have a channel's sampling factors and the part's data window.
pub fn expand_channel(
    data: &[f32],
    x_sampling: i32,
    y_sampling: i32,
    data_window: Window,
) -> Cow<'_, [f32]> {
    let sample_origin_x = first_sample(data_window.x_min, x_sampling);
    let sample_origin_y = first_sample(data_window.y_min, y_sampling);
    let sampled_width = count_samples(data_window.x_min, data_window.x_max, x_sampling);
    let sampled_height = count_samples(data_window.y_min, data_window.y_max, y_sampling);

    expand_to_dense_plane(
        data, sampled_width, sampled_height, x_sampling, y_sampling,
        sample_origin_x, sample_origin_y, data_window,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aliases_when_already_dense() {
        let window = Window { x_min: 0, y_min: 0, x_max: 1, y_max: 1 };
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let expanded = expand_channel(&data, 1, 1, window);
        assert!(matches!(expanded, Cow::Borrowed(_)));
        assert_eq!(&*expanded, &data[..]);
    }

    #[test]
    fn subsampled_4x4_matches_spec_example() {
        // valueAt(x,y) = x + 10y, sampling 2 -> sampled plane [0, 2, 20, 22]
        let window = Window { x_min: 0, y_min: 0, x_max: 3, y_max: 3 };
        let sampled = vec![0.0, 2.0, 20.0, 22.0];
        let expanded = expand_to_dense_plane(&sampled, 2, 2, 2, 2, 0, 0, window);

        assert_eq!(expanded.len(), 16);
        assert_eq!(expanded[0], 0.0);
        assert_eq!(expanded[1], 0.0);
        assert_eq!(expanded[2], 2.0);
        assert_eq!(expanded[3], 2.0);
        assert_eq!(expanded[2 * 4], 20.0);
        assert_eq!(expanded[2 * 4 + 2], 22.0);
    }
}
