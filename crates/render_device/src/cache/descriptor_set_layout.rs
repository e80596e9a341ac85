//! Descriptor set layout cache

use ash::vk;

use super::{CacheStats, ContentCache};
use crate::builders::{DescriptorSetLayoutBuilder, DescriptorSetLayoutDesc};
use crate::error::DeviceResult;
use crate::native::NativeDevice;

/// Shares one native layout between all bind sets of the same shape
pub struct DescriptorSetLayoutCache {
    cache: ContentCache<DescriptorSetLayoutDesc, vk::DescriptorSetLayout>,
}

impl DescriptorSetLayoutCache {
    /// Empty cache
    pub fn new() -> Self {
        Self {
            cache: ContentCache::new("DescriptorSetLayout"),
        }
    }

    /// Layout for `desc`, created on first request
    pub fn fetch<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        desc: &DescriptorSetLayoutDesc,
    ) -> DeviceResult<vk::DescriptorSetLayout> {
        self.cache.fetch_or_create(desc, |desc| {
            DescriptorSetLayoutBuilder::new().add_bindings(desc).build(native)
        })
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
        self.cache
            .clear_with(|layout| native.destroy_descriptor_set_layout(layout));
    }
}

impl Default for DescriptorSetLayoutCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::LayoutBinding;
    use crate::native::recording::RecordingDevice;
    use crate::types::{BindingType, ShaderStages};

    fn desc(stages: ShaderStages) -> DescriptorSetLayoutDesc {
        DescriptorSetLayoutDesc {
            bindings: vec![
                LayoutBinding { slot: 0, ty: BindingType::UniformBuffer, stages },
                LayoutBinding { slot: 1, ty: BindingType::SampledTexture, stages },
            ],
        }
    }

    #[test]
    fn test_equal_descriptions_share_one_layout() {
        let native = RecordingDevice::new();
        let mut cache = DescriptorSetLayoutCache::new();

        let a = cache.fetch(&native, &desc(ShaderStages::FRAGMENT)).unwrap();
        let b = cache.fetch(&native, &desc(ShaderStages::FRAGMENT)).unwrap();

        assert_eq!(a, b);
        assert_eq!(native.calls("create_descriptor_set_layout"), 1);
    }

    #[test]
    fn test_visibility_is_part_of_the_key() {
        let native = RecordingDevice::new();
        let mut cache = DescriptorSetLayoutCache::new();

        let a = cache.fetch(&native, &desc(ShaderStages::FRAGMENT)).unwrap();
        let b = cache.fetch(&native, &desc(ShaderStages::VERTEX)).unwrap();

        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);

        cache.clear(&native);
        assert_eq!(native.calls("destroy_descriptor_set_layout"), 2);
        assert!(cache.is_empty());
    }
}
