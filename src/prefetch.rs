//! The prefetch planner (C9): a generational, cooperatively-cancellable worker pool
//! that walks a strategy-ordered queue of frame indices and warms the frame cache
//! ahead of playback.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::unbounded;

use crate::cache::{FrameBundle, FrameCache};
use crate::decode;
use crate::error::{Event, Level, Phase};

/// Opens the raw bytes for one frame. Boxed so callers can close over whatever file
/// handle or network source backs a given frame id.
pub type FileBytesOpener = Arc<dyn Fn() -> std::io::Result<Vec<u8>> + Send + Sync>;

#[derive(Clone)]
pub struct FrameSource {
    pub id: String,
    pub open: FileBytesOpener,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    OnDemand,
    Forward,
    Bidirectional,
    FullRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage { Read, Parse, Decode, Done, Skipped }

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub index: usize,
    pub frame_id: String,
    pub stage: Stage,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

pub struct PlannerConfig {
    pub cache: Arc<Mutex<FrameCache>>,
    pub frames: Vec<FrameSource>,
    pub current_index: usize,
    pub strategy: Strategy,
    pub concurrency: usize,
    pub recent_indices: Vec<usize>,
    pub on_progress: Option<ProgressCallback>,
}

/// Builds the priority-ordered queue of frame indices for a strategy (spec §4.8).
/// `current_index` and every index in `recent_indices` must be `< length`.
fn build_queue(strategy: Strategy, current_index: usize, length: usize, recent_indices: &[usize]) -> Vec<usize> {
    if length == 0 {
        return Vec::new();
    }

    let mut queue = Vec::with_capacity(length);
    let mut seen = vec![false; length];

    let mut push = |queue: &mut Vec<usize>, seen: &mut [bool], index: usize| {
        if !seen[index] {
            seen[index] = true;
            queue.push(index);
        }
    };

    match strategy {
        Strategy::OnDemand => {
            push(&mut queue, &mut seen, current_index);
            for &index in recent_indices.iter().rev() {
                if index < length {
                    push(&mut queue, &mut seen, index);
                }
            }
        }
        Strategy::Forward => {
            for step in 0..length {
                push(&mut queue, &mut seen, (current_index + step) % length);
            }
        }
        Strategy::Bidirectional => {
            push(&mut queue, &mut seen, current_index);
            for radius in 1..length {
                let forward = (current_index + radius) % length;
                push(&mut queue, &mut seen, forward);
                let backward = (current_index + length - radius % length) % length;
                push(&mut queue, &mut seen, backward);
            }
        }
        Strategy::FullRange => {
            for step in 0..length {
                push(&mut queue, &mut seen, (current_index + step) % length);
            }
        }
    }

    queue
}

pub struct Planner {
    generation: Arc<AtomicU64>,
    active_workers: Arc<AtomicUsize>,
}

impl Default for Planner {
    fn default() -> Self { Self::new() }
}

impl Planner {
    pub fn new() -> Self {
        Self { generation: Arc::new(AtomicU64::new(0)), active_workers: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn is_busy(&self) -> bool {
        self.active_workers.load(Ordering::Acquire) > 0
    }

    /// Invalidates any in-flight generation. Workers notice at their next suspension
    /// point and return; this call itself does not block.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn start(&self, config: PlannerConfig) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let frame_count = config.frames.len();
        let queue = build_queue(config.strategy, config.current_index.min(frame_count.saturating_sub(1)), frame_count, &config.recent_indices);

        let concurrency = config.concurrency.clamp(1, 8).min(queue.len().max(1));
        let (sender, receiver) = unbounded::<usize>();

        for index in queue {
            let _ = sender.send(index);
        }
        drop(sender);

        let frames = Arc::new(config.frames);
        let cache = config.cache;
        let on_progress = config.on_progress;

        for _ in 0..concurrency {
            let receiver = receiver.clone();
            let frames = Arc::clone(&frames);
            let cache = Arc::clone(&cache);
            let on_progress = on_progress.clone();
            let generation_counter = Arc::clone(&self.generation);
            let active_workers = Arc::clone(&self.active_workers);

            active_workers.fetch_add(1, Ordering::AcqRel);

            std::thread::spawn(move || {
                for index in receiver.iter() {
                    if generation_counter.load(Ordering::SeqCst) != generation {
                        break;
                    }

                    run_one(index, &frames, &cache, generation, &generation_counter, on_progress.as_ref());
                }

                active_workers.fetch_sub(1, Ordering::AcqRel);
            });
        }
    }
}

fn emit_progress(on_progress: Option<&ProgressCallback>, index: usize, frame_id: &str, stage: Stage) {
    if let Some(callback) = on_progress {
        callback(ProgressEvent { index, frame_id: frame_id.to_owned(), stage });
    }
}

fn generation_current(generation: u64, counter: &AtomicU64) -> bool {
    std::thread::yield_now();
    counter.load(Ordering::SeqCst) == generation
}

fn run_one(
    index: usize,
    frames: &[FrameSource],
    cache: &Arc<Mutex<FrameCache>>,
    generation: u64,
    generation_counter: &AtomicU64,
    on_progress: Option<&ProgressCallback>,
) {
    let Some(source) = frames.get(index) else { return };

    if cache.lock().unwrap().has_frame(&source.id) {
        emit_progress(on_progress, index, &source.id, Stage::Skipped);
        return;
    }

    let raw = match (source.open)() {
        Ok(bytes) => Arc::new(bytes),
        Err(error) => {
            Event::new(Phase::Decode, Level::Warn, "prefetch.read.failed", error.to_string())
                .with("frame_id", source.id.clone())
                .emit();
            return;
        }
    };

    emit_progress(on_progress, index, &source.id, Stage::Read);
    cache.lock().unwrap().set_buffer(source.id.clone(), Arc::clone(&raw));

    if !generation_current(generation, generation_counter) {
        return;
    }

    let structure = match decode::parse(&raw) {
        Ok(structure) => Arc::new(structure),
        Err(error) => {
            Event::new(Phase::Parse, Level::Warn, "prefetch.parse.failed", error.to_string())
                .with("frame_id", source.id.clone())
                .emit();
            return;
        }
    };

    emit_progress(on_progress, index, &source.id, Stage::Parse);

    if !generation_current(generation, generation_counter) {
        return;
    }

    let decoded = match decode::decode(&raw, &structure, 0) {
        Ok(decoded) => Arc::new(decoded),
        Err(error) => {
            Event::new(Phase::Decode, Level::Warn, "prefetch.decode.failed", error.to_string())
                .with("frame_id", source.id.clone())
                .emit();
            return;
        }
    };

    if !generation_current(generation, generation_counter) {
        return;
    }

    cache.lock().unwrap().set_frame(source.id.clone(), FrameBundle { structure, part_id: 0, decoded });
    emit_progress(on_progress, index, &source.id, Stage::Done);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn on_demand_orders_current_then_recent_most_recent_first() {
        let queue = build_queue(Strategy::OnDemand, 3, 6, &[0, 1, 2]);
        assert_eq!(queue, vec![3, 2, 1, 0]);
    }

    #[test]
    fn forward_wraps_modulo_length() {
        let queue = build_queue(Strategy::Forward, 4, 6, &[]);
        assert_eq!(queue, vec![4, 5, 0, 1, 2, 3]);
    }

    #[test]
    fn bidirectional_alternates_around_current() {
        let queue = build_queue(Strategy::Bidirectional, 2, 5, &[]);
        assert_eq!(queue[0], 2);
        assert_eq!(queue[1], 3);
        assert_eq!(queue[2], 1);
    }

    #[test]
    fn full_range_covers_every_index_once() {
        let queue = build_queue(Strategy::FullRange, 1, 4, &[]);
        let mut sorted = queue.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
        assert_eq!(queue[0], 1);
    }

    #[test]
    fn stop_bumps_generation_so_stale_workers_observe_mismatch() {
        let planner = Planner::new();
        let before = planner.generation.load(Ordering::SeqCst);
        planner.stop();
        assert!(planner.generation.load(Ordering::SeqCst) > before);
    }
}
