//! The frame cache (C8): three bounded LRU maps (raw file buffers, decoded parts,
//! decoded frame bundles) with unique-byte accounting and a pluggable eviction policy.
//!
//! Not thread-safe by contract (see spec §5): concurrent access from multiple
//! [`crate::prefetch`] workers must be serialised by the embedder, typically by
//! wrapping a `FrameCache` in a `Mutex`.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::decode::DecodedPart;
use crate::meta::Structure;

/// A fully decoded frame: the structure it was parsed from, which part was decoded,
/// and the decoded planes themselves.
#[derive(Debug, Clone)]
pub struct FrameBundle {
    pub structure: Arc<Structure>,
    pub part_id: usize,
    pub decoded: Arc<DecodedPart>,
}

/// Which entries `prune` prefers to evict once the cache exceeds its byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict buffer-cache, then frame-cache, then part-cache, oldest first.
    Lru,
    /// Evict the cached frame farthest from the current playhead, provided it is
    /// farther than `distance`; falls back to plain LRU once no such frame remains.
    DistanceFromPlayhead { distance: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub part_cache_bytes: usize,
    pub frame_cache_bytes: usize,
    pub buffer_cache_bytes: usize,
    pub unique_cache_bytes: usize,
    pub part_count: usize,
    pub frame_count: usize,
    pub buffer_count: usize,
}

fn decoded_part_bytes(part: &DecodedPart) -> usize {
    part.channels.values().map(|channel| channel.data.len() * std::mem::size_of::<f32>()).sum()
}

pub struct FrameCache {
    buffers: LruCache<String, Arc<Vec<u8>>>,
    parts: LruCache<usize, Arc<DecodedPart>>,
    frames: LruCache<String, FrameBundle>,
    policy: EvictionPolicy,
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("buffers", &self.buffers.len())
            .field("parts", &self.parts.len())
            .field("frames", &self.frames.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl FrameCache {
    pub fn new(policy: EvictionPolicy) -> Self {
        let unbounded = NonZeroUsize::new(usize::MAX).unwrap();
        Self {
            buffers: LruCache::new(unbounded),
            parts: LruCache::new(unbounded),
            frames: LruCache::new(unbounded),
            policy,
        }
    }

    pub fn get_buffer(&mut self, id: &str) -> Option<Arc<Vec<u8>>> {
        self.buffers.get(id).cloned()
    }

    pub fn set_buffer(&mut self, id: impl Into<String>, bytes: Arc<Vec<u8>>) {
        self.buffers.put(id.into(), bytes);
    }

    pub fn get_part(&mut self, part_id: usize) -> Option<Arc<DecodedPart>> {
        self.parts.get(&part_id).cloned()
    }

    pub fn set_part(&mut self, part_id: usize, part: Arc<DecodedPart>) {
        self.parts.put(part_id, part);
    }

    pub fn get_frame(&mut self, id: &str) -> Option<&FrameBundle> {
        self.frames.get(id)
    }

    pub fn has_frame(&self, id: &str) -> bool {
        self.frames.contains(id)
    }

    pub fn set_frame(&mut self, id: impl Into<String>, frame: FrameBundle) {
        self.frames.put(id.into(), frame);
    }

    pub fn clear_all(&mut self) {
        self.buffers.clear();
        self.parts.clear();
        self.frames.clear();
    }

    /// `current_raw`, if given, is counted once even if it also appears in `buffers`
    /// (matching the "unique underlying allocation" rule from spec §4.7).
    pub fn compute_stats(&self, current_raw: Option<&Arc<Vec<u8>>>) -> CacheStats {
        let mut unique_pointers: std::collections::HashSet<usize> = std::collections::HashSet::new();

        let mut buffer_cache_bytes = 0;
        for (_, bytes) in self.buffers.iter() {
            buffer_cache_bytes += bytes.len();
            unique_pointers.insert(Arc::as_ptr(bytes) as usize);
        }

        let mut part_cache_bytes = 0;
        for (_, part) in self.parts.iter() {
            part_cache_bytes += decoded_part_bytes(part);
            unique_pointers.insert(Arc::as_ptr(part) as usize);
        }

        let mut frame_cache_bytes = 0;
        for (_, frame) in self.frames.iter() {
            frame_cache_bytes += decoded_part_bytes(&frame.decoded);
            unique_pointers.insert(Arc::as_ptr(&frame.decoded) as usize);
        }

        let mut unique_cache_bytes: usize = buffer_cache_bytes + part_cache_bytes + frame_cache_bytes;

        if let Some(raw) = current_raw {
            let pointer = Arc::as_ptr(raw) as usize;
            if unique_pointers.insert(pointer) {
                unique_cache_bytes += raw.len();
            }
        }

        CacheStats {
            part_cache_bytes, frame_cache_bytes, buffer_cache_bytes, unique_cache_bytes,
            part_count: self.parts.len(), frame_count: self.frames.len(), buffer_count: self.buffers.len(),
        }
    }

    /// No-ops while `unique_cache_bytes <= max_bytes`. Once over budget, evicts down
    /// to `min_bytes` rather than stopping right at `max_bytes`, so a cache that's
    /// just over the line doesn't evict-then-immediately-refill on the next insert.
    /// `current_frame_index` and `frame_order` (the sequence's frame ids, in playback
    /// order) are only consulted under [`EvictionPolicy::DistanceFromPlayhead`].
    /// Returns whether anything was evicted.
    pub fn prune(&mut self, current_frame_index: Option<usize>, frame_order: &[String], min_bytes: usize, max_bytes: usize) -> bool {
        if self.compute_stats(None).unique_cache_bytes <= max_bytes {
            return false;
        }

        let target_bytes = min_bytes.min(max_bytes);
        let mut evicted_anything = false;

        while self.compute_stats(None).unique_cache_bytes > target_bytes {
            if !self.evict_one(current_frame_index, frame_order) {
                break;
            }
            evicted_anything = true;
        }

        evicted_anything
    }

    fn evict_one(&mut self, current_frame_index: Option<usize>, frame_order: &[String]) -> bool {
        if let EvictionPolicy::DistanceFromPlayhead { distance } = self.policy {
            if let Some(current) = current_frame_index {
                if let Some(farthest_id) = self.farthest_cached_frame(current, distance, frame_order) {
                    self.frames.pop(&farthest_id);
                    return true;
                }
            }
        }

        if self.buffers.pop_lru().is_some() { return true; }
        if self.frames.pop_lru().is_some() { return true; }
        if self.parts.pop_lru().is_some() { return true; }

        false
    }

    fn farthest_cached_frame(&self, current: usize, distance: usize, frame_order: &[String]) -> Option<String> {
        frame_order.iter().enumerate()
            .filter(|(_, id)| self.frames.contains(id.as_str()))
            .map(|(index, id)| (index.abs_diff(current), id))
            .filter(|(gap, _)| *gap > distance)
            .max_by_key(|(gap, _)| *gap)
            .map(|(_, id)| id.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::SampleType;
    use crate::decode::DecodedChannel;

    fn part_with_bytes(float_count: usize) -> DecodedPart {
        let mut channels = std::collections::HashMap::new();
        channels.insert("Y".to_string(), DecodedChannel {
            pixel_type: SampleType::Float, x_sampling: 1, y_sampling: 1,
            sampled_width: float_count, sampled_height: 1,
            sample_origin_x: 0, sample_origin_y: 0,
            data: vec![0.0; float_count],
        });
        DecodedPart { width: float_count, height: 1, channels }
    }

    #[test]
    fn prune_respects_max_bytes_under_lru() {
        let mut cache = FrameCache::new(EvictionPolicy::Lru);

        for index in 0..4 {
            cache.set_part(index, Arc::new(part_with_bytes(1024)));
        }

        assert!(cache.compute_stats(None).unique_cache_bytes > 2048);
        cache.prune(None, &[], 2048, 2048);
        assert!(cache.compute_stats(None).unique_cache_bytes <= 2048);
    }

    #[test]
    fn distance_policy_keeps_frames_near_playhead() {
        let mut cache = FrameCache::new(EvictionPolicy::DistanceFromPlayhead { distance: 1 });
        let order: Vec<String> = (0..5).map(|i| i.to_string()).collect();

        for id in &order {
            cache.set_frame(id.clone(), FrameBundle {
                structure: Arc::new(Structure { magic: crate::meta::MAGIC, version: 2, flags: 0, is_multipart: false, parts: vec![], header_end_offset: 0 }),
                part_id: 0,
                decoded: Arc::new(part_with_bytes(4096)),
            });
        }

        cache.prune(Some(2), &order, 4096 * 2, 4096 * 2);

        assert!(cache.has_frame("2"));
        assert!(cache.has_frame("1") || cache.has_frame("3"));
    }
}
