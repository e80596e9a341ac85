//! Swap-chain surface selection, native swap chain and image-available ring

use ash::vk;

use crate::config::{PresentMode, SwapChainConfig};
use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::resources::{FrameBufferHandle, RenderPassHandle, TextureHandle};
use crate::types::{Format, SampleCount};

/// Surface parameters picked for one swap-chain (re)creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfaceChoice {
    pub surface_format: vk::SurfaceFormatKHR,
    pub format: Format,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceChoice {
    /// Query the surface and pick format, present mode, extent and image count
    pub fn query<N: NativeDevice + ?Sized>(
        native: &N,
        config: &SwapChainConfig,
        width: u32,
        height: u32,
    ) -> DeviceResult<Self> {
        let caps = native.surface_capabilities()?;
        let formats = native.surface_formats()?;
        let modes = native.surface_present_modes()?;

        let (surface_format, format) = choose_surface_format(&formats, config.prefer_srgb)?;
        Ok(Self {
            surface_format,
            format,
            present_mode: choose_present_mode(&modes, config.present_mode),
            extent: choose_extent(&caps, width, height),
            image_count: choose_image_count(&caps),
            transform: caps.current_transform,
        })
    }
}

/// First surface format we can describe, sRGB or UNORM per preference
pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    prefer_srgb: bool,
) -> DeviceResult<(vk::SurfaceFormatKHR, Format)> {
    let known: Vec<(vk::SurfaceFormatKHR, Format)> = formats
        .iter()
        .filter_map(|sf| Format::from_vk(sf.format).map(|f| (*sf, f)))
        .collect();

    known
        .iter()
        .find(|(sf, f)| f.is_srgb() == prefer_srgb && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| known.first())
        .copied()
        .ok_or_else(|| {
            log::error!("Surface offers no usable format: {:?}", formats);
            DeviceError::InitializationFailed("no supported surface format".to_string())
        })
}

/// Requested present mode when supported, FIFO otherwise
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR], preferred: PresentMode) -> vk::PresentModeKHR {
    let wanted = match preferred {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };
    if modes.contains(&wanted) {
        wanted
    } else {
        log::info!("Present mode {:?} unavailable, using FIFO", preferred);
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the requested size clamped to the surface limits
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, bounded by the maximum when there is one
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

/// Native swap chain with its images and views
pub(crate) struct NativeSwapChain {
    pub handle: vk::SwapchainKHR,
    pub format: Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

impl NativeSwapChain {
    /// Create the swap chain, retiring `old` if given
    pub fn create<N: NativeDevice + ?Sized>(
        native: &N,
        choice: &SurfaceChoice,
        old: vk::SwapchainKHR,
    ) -> DeviceResult<Self> {
        let (graphics, present) = native.queue_family_indices();
        let families = [graphics, present];
        let mut info = vk::SwapchainCreateInfoKHR::builder()
            .surface(native.surface())
            .min_image_count(choice.image_count)
            .image_format(choice.surface_format.format)
            .image_color_space(choice.surface_format.color_space)
            .image_extent(choice.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(choice.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(choice.present_mode)
            .clipped(true)
            .old_swapchain(old);
        info = if graphics == present {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        };

        let handle = native.create_swapchain(&info).map_err(|e| {
            log::error!(
                "Failed to create {}x{} swap chain: {}",
                choice.extent.width,
                choice.extent.height,
                e
            );
            e
        })?;

        let images = match native.swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                log::error!("Failed to query swap-chain images: {}", e);
                native.destroy_swapchain(handle);
                return Err(e);
            }
        };

        let mut swap_chain = Self {
            handle,
            format: choice.format,
            extent: choice.extent,
            images: Vec::new(),
            views: Vec::with_capacity(images.len()),
        };
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(choice.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            match native.create_image_view(&view_info) {
                Ok(view) => swap_chain.views.push(view),
                Err(e) => {
                    log::error!("Failed to create swap-chain image view: {}", e);
                    swap_chain.destroy(native);
                    return Err(e);
                }
            }
        }
        swap_chain.images = images;

        log::info!(
            "Swap chain {}x{} {:?}, {} images, {:?}",
            choice.extent.width,
            choice.extent.height,
            choice.format,
            swap_chain.images.len(),
            choice.present_mode
        );
        Ok(swap_chain)
    }

    /// Destroy views and the swap chain
    pub fn destroy<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        for view in self.views.drain(..) {
            native.destroy_image_view(view);
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            native.destroy_swapchain(self.handle);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

/// Ring of "image available" semaphores, one per swap-chain image
pub(crate) struct FrameRing {
    semaphores: Vec<vk::Semaphore>,
    cursor: usize,
}

impl FrameRing {
    pub fn create<N: NativeDevice + ?Sized>(native: &N, count: usize) -> DeviceResult<Self> {
        let mut ring = Self {
            semaphores: Vec::with_capacity(count),
            cursor: 0,
        };
        ring.resize(native, count)?;
        Ok(ring)
    }

    /// Grow or shrink to `count` semaphores, keeping the existing ones
    pub fn resize<N: NativeDevice + ?Sized>(&mut self, native: &N, count: usize) -> DeviceResult<()> {
        while self.semaphores.len() > count {
            if let Some(semaphore) = self.semaphores.pop() {
                native.destroy_semaphore(semaphore);
            }
        }
        while self.semaphores.len() < count {
            let semaphore = native.create_semaphore().map_err(|e| {
                log::error!("Failed to create image-available semaphore: {}", e);
                e
            })?;
            self.semaphores.push(semaphore);
        }
        self.cursor %= count.max(1);
        Ok(())
    }

    /// Move to the next slot and return its semaphore
    pub fn advance(&mut self) -> vk::Semaphore {
        self.cursor = (self.cursor + 1) % self.semaphores.len().max(1);
        self.current()
    }

    /// Semaphore of the current slot
    pub fn current(&self) -> vk::Semaphore {
        self.semaphores
            .get(self.cursor)
            .copied()
            .unwrap_or_else(vk::Semaphore::null)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.semaphores.len()
    }

    pub fn destroy<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        for semaphore in self.semaphores.drain(..) {
            native.destroy_semaphore(semaphore);
        }
        self.cursor = 0;
    }
}

/// Swap chain owned by the device
///
/// Render pass, frame buffers and scratch textures are ordinary device
/// resources referenced by handle.
pub(crate) struct SwapChain {
    pub native: NativeSwapChain,
    pub samples: SampleCount,
    pub depth_format: Option<Format>,
    pub render_pass: RenderPassHandle,
    pub frame_buffers: Vec<FrameBufferHandle>,
    pub depth: Option<TextureHandle>,
    pub msaa_color: Option<TextureHandle>,
    pub ring: FrameRing,
    pub current_image: Option<u32>,
    /// The current image-available semaphore was already waited on
    pub acquire_consumed: bool,
}

impl SwapChain {
    /// Frame buffer of the acquired image
    pub fn current_frame_buffer(&self) -> DeviceResult<FrameBufferHandle> {
        self.current_image
            .and_then(|index| self.frame_buffers.get(index as usize).copied())
            .ok_or_else(|| {
                log::error!("No swap-chain image acquired");
                DeviceError::invalid_state("no swap-chain image acquired")
            })
    }
}

/// Whether an acquire/present error means the swap chain must be rebuilt
pub(crate) fn is_stale(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR | vk::Result::TIMEOUT | vk::Result::NOT_READY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::RecordingDevice;

    fn caps(min: u32, max: u32, current: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current,
                height: current,
            },
            min_image_extent: vk::Extent2D { width: 16, height: 16 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_image_count_respects_maximum() {
        assert_eq!(choose_image_count(&caps(2, 0, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 2, 0)), 2);
        assert_eq!(choose_image_count(&caps(3, 8, 0)), 4);
    }

    #[test]
    fn test_extent_follows_surface_or_clamps_request() {
        let fixed = choose_extent(&caps(2, 3, 800), 1024, 768);
        assert_eq!((fixed.width, fixed.height), (800, 800));

        let free = choose_extent(&caps(2, 3, u32::MAX), 8000, 4);
        assert_eq!((free.width, free.height), (4096, 16));
    }

    #[test]
    fn test_surface_format_preference() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats, true).unwrap().1, Format::Bgra8Srgb);
        assert_eq!(choose_surface_format(&formats, false).unwrap().1, Format::Bgra8Unorm);

        let unknown = [vk::SurfaceFormatKHR {
            format: vk::Format::G8_B8R8_2PLANE_420_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert!(choose_surface_format(&unknown, true).is_err());
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, PresentMode::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, PresentMode::Immediate), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_ring_wraps_after_full_cycle() {
        let native = RecordingDevice::new();
        let mut ring = FrameRing::create(&native, 3).unwrap();
        let start = ring.cursor();

        let seen: Vec<_> = (0..3).map(|_| ring.advance()).collect();
        assert_eq!(ring.cursor(), start);
        assert_eq!(seen[2], ring.current());
        assert_ne!(seen[0], seen[1]);

        ring.resize(&native, 2).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(native.calls("destroy_semaphore"), 1);
    }

    #[test]
    fn test_native_swap_chain_views_per_image() {
        let native = RecordingDevice::new();
        let choice = SurfaceChoice::query(&native, &SwapChainConfig::default(), 640, 480).unwrap();
        let mut swap_chain = NativeSwapChain::create(&native, &choice, vk::SwapchainKHR::null()).unwrap();

        assert_eq!(choice.image_count, 3);
        assert_eq!(swap_chain.views.len(), 3);
        assert_eq!(swap_chain.format, Format::Bgra8Srgb);

        swap_chain.destroy(&native);
        assert_eq!(native.calls("destroy_image_view"), 3);
        assert_eq!(native.calls("destroy_swapchain"), 1);
    }
}
