//! Graphics pipeline cache

use ash::vk;

use super::{CacheStats, ContentCache};
use crate::builders::{GraphicsPipelineBuilder, GraphicsPipelineDesc};
use crate::error::DeviceResult;
use crate::native::NativeDevice;

/// One native pipeline per distinct full pipeline state
///
/// The key holds the render-pass compatibility class rather than a concrete
/// pass, so a pipeline built against one pass is reused with every compatible
/// one.
pub struct PipelineCache {
    cache: ContentCache<GraphicsPipelineDesc, vk::Pipeline>,
}

impl PipelineCache {
    /// Empty cache
    pub fn new() -> Self {
        Self {
            cache: ContentCache::new("Pipeline"),
        }
    }

    /// Pipeline for `desc`; `render_pass` is only used on a miss
    pub fn fetch<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        desc: &GraphicsPipelineDesc,
        render_pass: vk::RenderPass,
    ) -> DeviceResult<vk::Pipeline> {
        self.cache.fetch_or_create(desc, |desc| {
            GraphicsPipelineBuilder::from_desc(desc, render_pass).build(native)
        })
    }

    /// Number of distinct pipelines
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no pipeline was created yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Destroy every pipeline
    pub fn clear<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        self.cache.clear_with(|pipeline| native.destroy_pipeline(pipeline));
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}
