//! The renderer boundary (C11): tone-maps dense decoded planes into `[0,1]` RGBA
//! and derives a luminance histogram. This crate stops at tone-mapped floats; turning
//! them into pixels on screen is the embedder's job.

use std::time::Duration;

/// Names the channel feeding each of R, G, B, A. An empty slot falls back to the
/// per-channel default described in [`tone_map_pixel`].
#[derive(Debug, Clone, Default)]
pub struct ChannelMapping {
    pub r: Option<String>,
    pub g: Option<String>,
    pub b: Option<String>,
    pub a: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    pub exposure: f32,
    pub gamma: f32,
}

const GAMMA_EPSILON: f32 = 1e-4;
const HISTOGRAM_BINS: usize = 64;

/// Applies the exposure/gamma tone-map to one linear value.
pub fn tone_map_value(value: f32, exposure: f32, gamma: f32) -> f32 {
    let exposed = (value * 2f32.powf(exposure)).max(0.0);
    let inverse_gamma = 1.0 / gamma.max(GAMMA_EPSILON);
    exposed.powf(inverse_gamma).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba { pub r: f32, pub g: f32, pub b: f32, pub a: f32 }

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub pixels: Vec<Rgba>,
    pub histogram: [u32; HISTOGRAM_BINS],
    pub backend: &'static str,
    pub render_time: Duration,
}

fn channel_plane<'d>(planes: &'d std::collections::HashMap<String, Vec<f32>>, name: &Option<String>) -> Option<&'d [f32]> {
    name.as_ref().and_then(|name| planes.get(name)).map(Vec::as_slice)
}

/// Tone-maps `planes` (each a dense, full-resolution row-major buffer of the same
/// `width * height` length) into RGBA pixels plus a 64-bin luminance histogram.
pub fn render(
    planes: &std::collections::HashMap<String, Vec<f32>>,
    width: usize,
    height: usize,
    mapping: &ChannelMapping,
    params: RenderParams,
) -> RenderOutput {
    let started = std::time::Instant::now();
    let pixel_count = width * height;

    let r_plane = channel_plane(planes, &mapping.r);
    let g_plane = channel_plane(planes, &mapping.g);
    let b_plane = channel_plane(planes, &mapping.b);
    let a_plane = channel_plane(planes, &mapping.a);

    let mut pixels = Vec::with_capacity(pixel_count);
    let mut histogram = [0_u32; HISTOGRAM_BINS];

    for index in 0..pixel_count {
        let raw_r = r_plane.map_or(0.0, |plane| plane[index]);
        let raw_g = g_plane.map_or(0.0, |plane| plane[index]);
        let raw_b = b_plane.map_or(0.0, |plane| plane[index]);
        let raw_a = a_plane.map_or(1.0, |plane| plane[index]);

        let r = tone_map_value(raw_r, params.exposure, params.gamma);
        let g = tone_map_value(raw_g, params.exposure, params.gamma);
        let b = tone_map_value(raw_b, params.exposure, params.gamma);
        let a = tone_map_value(raw_a, params.exposure, params.gamma);

        let luminance = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let bin = ((luminance * HISTOGRAM_BINS as f32) as usize).min(HISTOGRAM_BINS - 1);
        histogram[bin] += 1;

        pixels.push(Rgba { r, g, b, a });
    }

    RenderOutput { pixels, histogram, backend: "cpu", render_time: started.elapsed() }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tone_map_clamps_negative_input_to_zero() {
        assert_eq!(tone_map_value(-1.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn tone_map_identity_at_zero_exposure_unit_gamma() {
        assert!((tone_map_value(0.5, 0.0, 1.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tone_map_clamps_values_above_one() {
        assert_eq!(tone_map_value(10.0, 0.0, 1.0), 1.0);
    }

    #[test]
    fn tone_map_degenerate_gamma_does_not_divide_by_zero() {
        assert!(tone_map_value(0.5, 0.0, 0.0).is_finite());
    }

    #[test]
    fn missing_channels_default_to_black_opaque() {
        let planes = std::collections::HashMap::new();
        let mapping = ChannelMapping::default();
        let output = render(&planes, 1, 1, &mapping, RenderParams { exposure: 0.0, gamma: 1.0 });

        assert_eq!(output.pixels[0], Rgba { r: 0.0, g: 0.0, b: 0.0, a: 1.0 });
        assert_eq!(output.histogram[0], 1);
    }

    #[test]
    fn white_pixel_lands_in_last_histogram_bin() {
        let mut planes = std::collections::HashMap::new();
        planes.insert("R".to_string(), vec![1.0]);
        planes.insert("G".to_string(), vec![1.0]);
        planes.insert("B".to_string(), vec![1.0]);

        let mapping = ChannelMapping {
            r: Some("R".to_string()), g: Some("G".to_string()), b: Some("B".to_string()), a: None,
        };

        let output = render(&planes, 1, 1, &mapping, RenderParams { exposure: 0.0, gamma: 1.0 });
        assert_eq!(output.histogram[HISTOGRAM_BINS - 1], 1);
    }
}
