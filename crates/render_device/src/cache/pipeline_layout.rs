//! Pipeline layout cache

use ash::vk;

use super::{CacheStats, ContentCache};
use crate::builders::{PipelineLayoutBuilder, PipelineLayoutDesc};
use crate::error::DeviceResult;
use crate::native::NativeDevice;

/// Shares pipeline layouts between pipelines with the same bind-set shapes
pub struct PipelineLayoutCache {
    cache: ContentCache<PipelineLayoutDesc, vk::PipelineLayout>,
}

impl PipelineLayoutCache {
    /// Empty cache
    pub fn new() -> Self {
        Self {
            cache: ContentCache::new("PipelineLayout"),
        }
    }

    /// Layout for `desc`, created on first request
    pub fn fetch<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        desc: &PipelineLayoutDesc,
    ) -> DeviceResult<vk::PipelineLayout> {
        self.cache
            .fetch_or_create(desc, |desc| PipelineLayoutBuilder::from_desc(desc).build(native))
    }

    /// Number of distinct layouts
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no layout was created yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Destroy every layout
    pub fn clear<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        self.cache.clear_with(|layout| native.destroy_pipeline_layout(layout));
    }
}

impl Default for PipelineLayoutCache {
    fn default() -> Self {
        Self::new()
    }
}
