#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    trivial_numeric_casts,
    redundant_semicolon
)]

#![forbid(unsafe_code)]

//! A streaming OpenEXR scanline decoder core, plus the frame cache and prefetch
//! planner that sit around it in an interactive viewer.
//!
//! The pipeline is [`meta::parse_structure`] (header + offset tables) followed by
//! [`decode::decode`] (chunks → dense per-channel `f32` planes), with
//! [`channel_layout`] handling subsampled channels and [`compression`] housing the
//! per-chunk codecs. [`cache`] and [`prefetch`] are the surrounding playback
//! machinery; [`render`] is the tone-mapping boundary toward pixels on screen.

pub mod io; // public to allow for custom attribute byte parsing

pub mod math;
pub mod error;
pub mod meta;
pub mod compression;
pub mod channel_layout;
pub mod decode;
pub mod cache;
pub mod prefetch;
pub mod render;

/// Re-exports of the types most callers need for a basic parse → decode → render pass.
pub mod prelude {
    pub use crate::meta::{Structure, Part, ChannelInfo, ChannelList, SampleType, Window};
    pub use crate::decode::{DecodedPart, DecodedChannel, parse, decode};
    pub use crate::cache::{FrameCache, FrameBundle, EvictionPolicy, CacheStats};
    pub use crate::prefetch::{Planner, PlannerConfig, FrameSource, Strategy};
    pub use crate::render::{render, ChannelMapping, RenderParams, RenderOutput};
    pub use crate::error::{Error, ErrorCode, Event, Result};

    pub use half::f16;
}
