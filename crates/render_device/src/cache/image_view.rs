//! Per-texture image view cache

use ash::vk;

use super::{CacheStats, ContentCache};
use crate::error::DeviceResult;
use crate::native::NativeDevice;
use crate::types::Format;

/// Which part of an image a view exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageViewDesc {
    /// View dimensionality
    pub view_type: vk::ImageViewType,
    /// View format
    pub format: Format,
    /// Aspects visible through the view
    pub aspect: vk::ImageAspectFlags,
    /// First mip level
    pub base_mip: u32,
    /// Number of mip levels
    pub mip_count: u32,
    /// First array layer
    pub base_layer: u32,
    /// Number of array layers
    pub layer_count: u32,
}

/// Views of a single image, keyed by [`ImageViewDesc`]
pub struct ImageViewCache {
    image: vk::Image,
    cache: ContentCache<ImageViewDesc, vk::ImageView>,
}

impl ImageViewCache {
    /// Empty cache for `image`
    pub fn new(image: vk::Image) -> Self {
        Self {
            image,
            cache: ContentCache::new("ImageView"),
        }
    }

    /// View for `desc`, created on first request
    pub fn fetch<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        desc: &ImageViewDesc,
    ) -> DeviceResult<vk::ImageView> {
        let image = self.image;
        self.cache.fetch_or_create(desc, |desc| {
            let info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(desc.view_type)
                .format(desc.format.to_vk())
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: desc.aspect,
                    base_mip_level: desc.base_mip,
                    level_count: desc.mip_count,
                    base_array_layer: desc.base_layer,
                    layer_count: desc.layer_count,
                });
            native.create_image_view(&info).map_err(|e| {
                log::error!("Failed to create image view {:?}: {}", desc, e);
                e
            })
        })
    }

    /// Number of views
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no view was created yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Destroy every view
    pub fn clear<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        self.cache.clear_with(|view| native.destroy_image_view(view));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::RecordingDevice;
    use ash::vk::Handle;

    fn mip_view(base_mip: u32) -> ImageViewDesc {
        ImageViewDesc {
            view_type: vk::ImageViewType::TYPE_2D,
            format: Format::Rgba8Unorm,
            aspect: vk::ImageAspectFlags::COLOR,
            base_mip,
            mip_count: 1,
            base_layer: 0,
            layer_count: 1,
        }
    }

    #[test]
    fn test_one_view_per_subresource() {
        let native = RecordingDevice::new();
        let mut cache = ImageViewCache::new(vk::Image::from_raw(99));

        let mip0 = cache.fetch(&native, &mip_view(0)).unwrap();
        let mip1 = cache.fetch(&native, &mip_view(1)).unwrap();
        let mip0_again = cache.fetch(&native, &mip_view(0)).unwrap();

        assert_eq!(mip0, mip0_again);
        assert_ne!(mip0, mip1);
        assert_eq!(native.calls("create_image_view"), 2);

        cache.clear(&native);
        assert_eq!(native.calls("destroy_image_view"), 2);
    }
}
