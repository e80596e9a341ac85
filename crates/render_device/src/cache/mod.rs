//! Content-addressed caches for native objects
//!
//! Each cache maps the hash of a semantic description to the native object
//! built from it. The full description is stored next to the object and
//! compared on every hit, so a hash collision between two different
//! descriptions produces a second entry instead of a wrong object.
//!
//! Entries are never evicted; `clear` destroys everything and is only used at
//! device shutdown.

mod descriptor_set_layout;
mod image_view;
mod pipeline;
mod pipeline_layout;
mod ray_trace_pipeline;
mod render_pass;

pub use descriptor_set_layout::DescriptorSetLayoutCache;
pub use image_view::{ImageViewCache, ImageViewDesc};
pub use pipeline::PipelineCache;
pub use pipeline_layout::PipelineLayoutCache;
pub use ray_trace_pipeline::{RayTracePipelineCache, ShaderBindingTable};
pub use render_pass::RenderPassCache;

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::DeviceResult;
use crate::hash::content_hash;

/// Hit/miss counters of one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that built a new object
    pub misses: u64,
    /// Hash matches whose descriptions differed
    pub collisions: u64,
}

/// Generic description → value memo table
pub struct ContentCache<D, V> {
    name: &'static str,
    buckets: HashMap<u64, Vec<(D, V)>>,
    stats: CacheStats,
}

impl<D, V> ContentCache<D, V>
where
    D: Hash + Eq + Clone,
    V: Copy + std::fmt::Debug,
{
    /// Empty cache; `name` only appears in logs
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            buckets: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Look up `desc`, building it with `create` on a miss
    ///
    /// Failures are returned and not memoized.
    pub fn fetch_or_create<F>(&mut self, desc: &D, create: F) -> DeviceResult<V>
    where
        F: FnOnce(&D) -> DeviceResult<V>,
    {
        let key = content_hash(desc);

        if let Some(bucket) = self.buckets.get(&key) {
            if let Some((_, value)) = bucket.iter().find(|(stored, _)| stored == desc) {
                self.stats.hits += 1;
                log::trace!("{} cache hit {:#018x} -> {:?}", self.name, key, value);
                return Ok(*value);
            }
            self.stats.collisions += 1;
            log::warn!(
                "{} cache hash collision on {:#018x}; storing a separate entry",
                self.name,
                key
            );
        }

        let value = create(desc)?;
        self.stats.misses += 1;
        self.stats.entries += 1;
        log::debug!("{} cache miss {:#018x}, created {:?}", self.name, key, value);
        self.buckets.entry(key).or_default().push((desc.clone(), value));
        Ok(value)
    }

    /// Cached value for `desc`, without creating anything
    pub fn get(&self, desc: &D) -> Option<V> {
        self.buckets
            .get(&content_hash(desc))?
            .iter()
            .find(|(stored, _)| stored == desc)
            .map(|&(_, value)| value)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.stats.entries
    }

    /// Whether the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.stats.entries == 0
    }

    /// Counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Remove every entry, handing each value to `destroy`
    pub fn clear_with<F: FnMut(V)>(&mut self, mut destroy: F) {
        let count = self.stats.entries;
        for (_, bucket) in self.buckets.drain() {
            for (_, value) in bucket {
                destroy(value);
            }
        }
        self.stats.entries = 0;
        if count > 0 {
            log::debug!("{} cache cleared ({} entries)", self.name, count);
        }
    }

    /// Insert under an explicit hash; only used to exercise collision handling
    #[cfg(test)]
    pub(crate) fn fetch_or_create_with_key<F>(&mut self, key: u64, desc: &D, create: F) -> DeviceResult<V>
    where
        F: FnOnce(&D) -> DeviceResult<V>,
    {
        if let Some(bucket) = self.buckets.get(&key) {
            if let Some((_, value)) = bucket.iter().find(|(stored, _)| stored == desc) {
                self.stats.hits += 1;
                return Ok(*value);
            }
            self.stats.collisions += 1;
        }
        let value = create(desc)?;
        self.stats.misses += 1;
        self.stats.entries += 1;
        self.buckets.entry(key).or_default().push((desc.clone(), value));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use ash::vk;

    #[test]
    fn test_hit_returns_same_value_without_creating() {
        let mut cache: ContentCache<(u32, u32), u64> = ContentCache::new("test");
        let mut created = 0;

        let a = cache
            .fetch_or_create(&(1, 2), |_| {
                created += 1;
                Ok(10)
            })
            .unwrap();
        let b = cache
            .fetch_or_create(&(1, 2), |_| {
                created += 1;
                Ok(20)
            })
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(created, 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_collision_gets_its_own_entry() {
        let mut cache: ContentCache<&'static str, u64> = ContentCache::new("test");

        // two different descriptions forced onto the same key
        let first = cache.fetch_or_create_with_key(7, &"gbuffer", |_| Ok(1)).unwrap();
        let second = cache.fetch_or_create_with_key(7, &"ssao", |_| Ok(2)).unwrap();
        let again = cache.fetch_or_create_with_key(7, &"gbuffer", |_| Ok(3)).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(again, 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().collisions, 1);
    }

    #[test]
    fn test_failures_are_not_memoized() {
        let mut cache: ContentCache<u32, u64> = ContentCache::new("test");

        let result = cache.fetch_or_create(&5, |_| Err(DeviceError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY)));
        assert!(result.is_err());
        assert!(cache.is_empty());

        assert_eq!(cache.fetch_or_create(&5, |_| Ok(9)).unwrap(), 9);
    }

    #[test]
    fn test_clear_destroys_every_entry() {
        let mut cache: ContentCache<u32, u64> = ContentCache::new("test");
        for i in 0..4 {
            cache.fetch_or_create(&i, |d| Ok(u64::from(*d) + 100)).unwrap();
        }

        let mut destroyed = Vec::new();
        cache.clear_with(|v| destroyed.push(v));
        destroyed.sort_unstable();

        assert_eq!(destroyed, vec![100, 101, 102, 103]);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&1), None);
    }
}
