//! Render pass cache

use ash::vk;

use super::{CacheStats, ContentCache};
use crate::builders::{RenderPassBuilder, RenderPassDescription};
use crate::error::DeviceResult;
use crate::native::NativeDevice;

/// One native render pass per distinct attachment description
pub struct RenderPassCache {
    cache: ContentCache<RenderPassDescription, vk::RenderPass>,
}

impl RenderPassCache {
    /// Empty cache
    pub fn new() -> Self {
        Self {
            cache: ContentCache::new("RenderPass"),
        }
    }

    /// Native render pass for `desc`, created on first request
    pub fn fetch<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        desc: &RenderPassDescription,
    ) -> DeviceResult<vk::RenderPass> {
        self.cache.fetch_or_create(desc, |desc| {
            desc.validate()?;
            RenderPassBuilder::from_desc(desc).build(native)
        })
    }

    /// Number of distinct passes
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no pass was created yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Destroy every pass
    pub fn clear<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        self.cache.clear_with(|pass| native.destroy_render_pass(pass));
    }
}

impl Default for RenderPassCache {
    fn default() -> Self {
        Self::new()
    }
}
