//! Texture records

use ash::vk;

use crate::cache::{ImageViewCache, ImageViewDesc};
use crate::error::{DeviceError, DeviceResult};
use crate::native::{DeviceLimits, NativeDevice};
use crate::types::{AddressMode, CompareOp, Filter, Format, ImageLayout, ImageTiling, SampleCount, TextureUsage};

/// Sampler owned by a texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Minification filter
    pub min_filter: Filter,
    /// Magnification filter
    pub mag_filter: Filter,
    /// Filter between mip levels
    pub mip_filter: Filter,
    /// Wrapping along U
    pub address_u: AddressMode,
    /// Wrapping along V
    pub address_v: AddressMode,
    /// Wrapping along W
    pub address_w: AddressMode,
    /// Requested anisotropy, `1.0` or less disables it
    pub anisotropy: f32,
    /// Depth comparison for shadow sampling
    pub compare: Option<CompareOp>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            anisotropy: 1.0,
            compare: None,
        }
    }
}

impl SamplerDesc {
    /// Clamp-to-edge sampler, typical for render targets
    pub fn clamped(filter: Filter) -> Self {
        Self {
            min_filter: filter,
            mag_filter: filter,
            mip_filter: filter,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            ..Self::default()
        }
    }

    fn to_vk(self, limits: &DeviceLimits, mip_count: u32) -> vk::SamplerCreateInfo {
        let anisotropy = self.anisotropy.min(limits.max_sampler_anisotropy);
        vk::SamplerCreateInfo::builder()
            .min_filter(self.min_filter.to_vk())
            .mag_filter(self.mag_filter.to_vk())
            .mipmap_mode(self.mip_filter.to_vk_mipmap())
            .address_mode_u(self.address_u.to_vk())
            .address_mode_v(self.address_v.to_vk())
            .address_mode_w(self.address_w.to_vk())
            .anisotropy_enable(anisotropy > 1.0)
            .max_anisotropy(anisotropy.max(1.0))
            .compare_enable(self.compare.is_some())
            .compare_op(self.compare.map_or(vk::CompareOp::ALWAYS, CompareOp::to_vk))
            .min_lod(0.0)
            .max_lod(mip_count as f32)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .build()
    }
}

/// Immutable shape of a texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureDescription {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels, `1` for 2D textures
    pub depth: u32,
    /// Texel format
    pub format: Format,
    /// Number of mip levels
    pub mips: u32,
    /// Number of array layers; `6` makes a cube map
    pub layers: u32,
    /// Multisample count
    pub samples: SampleCount,
    /// Memory tiling
    pub tiling: ImageTiling,
    /// Intended usage
    pub usage: TextureUsage,
    /// Owned sampler configuration
    pub sampler: SamplerDesc,
}

impl TextureDescription {
    /// Single-mip sampled 2D texture
    pub fn new_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            depth: 1,
            format,
            mips: 1,
            layers: 1,
            samples: SampleCount::X1,
            tiling: ImageTiling::Optimal,
            usage: TextureUsage::SAMPLED,
            sampler: SamplerDesc::default(),
        }
    }

    /// Render target usable as an attachment and sampled afterwards
    pub fn render_target(width: u32, height: u32, format: Format, samples: SampleCount) -> Self {
        let attachment = if format.is_depth() {
            TextureUsage::DEPTH_STENCIL_ATTACHMENT
        } else {
            TextureUsage::COLOR_ATTACHMENT
        };
        Self {
            samples,
            usage: attachment | TextureUsage::SAMPLED,
            sampler: SamplerDesc::clamped(Filter::Linear),
            ..Self::new_2d(width, height, format)
        }
    }

    /// Six-layer cube map
    pub fn cube(size: u32, format: Format) -> Self {
        Self {
            layers: 6,
            ..Self::new_2d(size, size, format)
        }
    }

    /// Override the mip count
    pub fn with_mips(mut self, mips: u32) -> Self {
        self.mips = mips;
        self
    }

    /// Use every mip level down to 1x1
    pub fn full_mip_chain(mut self) -> Self {
        self.mips = self.max_mips();
        self
    }

    /// Override usage
    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Override the sampler
    pub fn with_sampler(mut self, sampler: SamplerDesc) -> Self {
        self.sampler = sampler;
        self
    }

    /// Whether the texture is created cube-compatible
    pub fn is_cube(&self) -> bool {
        self.layers == 6
    }

    /// Longest possible mip chain for the extent
    pub fn max_mips(&self) -> u32 {
        let largest = self.width.max(self.height).max(self.depth).max(1);
        u32::BITS - largest.leading_zeros()
    }

    /// Size of mip 0 of one layer in bytes
    pub fn layer_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.depth) * self.format.texel_size()
    }

    /// Check for impossible combinations
    pub fn validate(&self) -> DeviceResult<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(DeviceError::invalid_operation("texture extent must be non-zero"));
        }
        if self.format == Format::Undefined {
            return Err(DeviceError::invalid_operation("texture format is undefined"));
        }
        if self.mips == 0 || self.mips > self.max_mips() {
            return Err(DeviceError::invalid_operation(format!(
                "{} mips requested, extent allows 1..={}",
                self.mips,
                self.max_mips()
            )));
        }
        if self.layers == 0 {
            return Err(DeviceError::invalid_operation("texture needs at least one layer"));
        }
        if self.is_cube() && self.width != self.height {
            return Err(DeviceError::invalid_operation("cube faces must be square"));
        }
        if self.depth > 1 && self.layers > 1 {
            return Err(DeviceError::invalid_operation("3D textures cannot have layers"));
        }
        if self.samples != SampleCount::X1 && self.mips > 1 {
            return Err(DeviceError::invalid_operation("multisampled textures cannot have mips"));
        }
        Ok(())
    }

    fn image_type(&self) -> vk::ImageType {
        if self.depth > 1 {
            vk::ImageType::TYPE_3D
        } else {
            vk::ImageType::TYPE_2D
        }
    }

    fn view_type(&self) -> vk::ImageViewType {
        if self.depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else if self.is_cube() {
            vk::ImageViewType::CUBE
        } else if self.layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        }
    }

    fn image_usage(&self) -> vk::ImageUsageFlags {
        let mut usage = self.usage.to_vk();
        if self.usage.contains(TextureUsage::SAMPLED) && self.samples == SampleCount::X1 {
            // sampled textures can be uploaded and mip-mapped
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
            if self.mips > 1 {
                usage |= vk::ImageUsageFlags::TRANSFER_SRC;
            }
        }
        usage
    }
}

/// Texture with its memory, sampler and views
pub(crate) struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub sampler: vk::Sampler,
    pub desc: TextureDescription,
    pub views: ImageViewCache,
}

impl Texture {
    /// Create the image, bind device-local memory and build the sampler
    ///
    /// Contents are undefined until uploaded or transitioned.
    pub fn create<N: NativeDevice + ?Sized>(native: &N, desc: TextureDescription) -> DeviceResult<Self> {
        desc.validate().map_err(|e| {
            log::error!("Rejected texture {:?}: {}", desc, e);
            e
        })?;

        let flags = if desc.is_cube() {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(desc.image_type())
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
            })
            .mip_levels(desc.mips)
            .array_layers(desc.layers)
            .format(desc.format.to_vk())
            .tiling(desc.tiling.to_vk())
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.image_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(desc.samples.to_vk());

        let image = native.create_image(&info).map_err(|e| {
            log::error!("Failed to create {}x{} {:?} image: {}", desc.width, desc.height, desc.format, e);
            e
        })?;

        let memory = match native.allocate_image_memory(image, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(memory) => memory,
            Err(e) => {
                log::error!("Failed to allocate image memory: {}", e);
                native.destroy_image(image);
                return Err(e);
            }
        };

        let sampler_info = desc.sampler.to_vk(&native.limits(), desc.mips);
        let sampler = match native.create_sampler(&sampler_info) {
            Ok(sampler) => sampler,
            Err(e) => {
                log::error!("Failed to create sampler {:?}: {}", desc.sampler, e);
                native.destroy_image(image);
                native.free_memory(memory);
                return Err(e);
            }
        };

        log::debug!(
            "Created texture {}x{}x{} {:?}, {} mips, {} layers",
            desc.width,
            desc.height,
            desc.depth,
            desc.format,
            desc.mips,
            desc.layers
        );

        Ok(Self {
            image,
            memory,
            sampler,
            desc,
            views: ImageViewCache::new(image),
        })
    }

    /// Layout the texture rests in between passes
    pub fn resting_layout(&self) -> ImageLayout {
        if self.desc.usage.contains(TextureUsage::STORAGE) {
            ImageLayout::General
        } else if self.desc.format.is_depth() {
            ImageLayout::DepthStencilReadOnly
        } else {
            ImageLayout::ShaderReadOnly
        }
    }

    /// Every subresource of the image
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.desc.format.aspect(),
            base_mip_level: 0,
            level_count: self.desc.mips,
            base_array_layer: 0,
            layer_count: self.desc.layers,
        }
    }

    /// View over all mips and layers, as seen by samplers
    pub fn sampled_view<N: NativeDevice + ?Sized>(&mut self, native: &N) -> DeviceResult<vk::ImageView> {
        // depth/stencil images are sampled through the depth aspect only
        let aspect = if self.desc.format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let desc = ImageViewDesc {
            view_type: self.desc.view_type(),
            format: self.desc.format,
            aspect,
            base_mip: 0,
            mip_count: self.desc.mips,
            base_layer: 0,
            layer_count: self.desc.layers,
        };
        self.views.fetch(native, &desc)
    }

    /// Single-mip view over every layer, for storage image access
    pub fn storage_view<N: NativeDevice + ?Sized>(&mut self, native: &N, mip: u32) -> DeviceResult<vk::ImageView> {
        self.check_subresource(mip, 0)?;
        let view_type = match self.desc.view_type() {
            vk::ImageViewType::CUBE => vk::ImageViewType::TYPE_2D_ARRAY,
            other => other,
        };
        let desc = ImageViewDesc {
            view_type,
            format: self.desc.format,
            aspect: self.desc.format.aspect(),
            base_mip: mip,
            mip_count: 1,
            base_layer: 0,
            layer_count: self.desc.layers,
        };
        self.views.fetch(native, &desc)
    }

    /// Single mip of a single layer, for use as a frame-buffer attachment
    pub fn attachment_view<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        mip: u32,
        layer: u32,
    ) -> DeviceResult<vk::ImageView> {
        self.check_subresource(mip, layer)?;
        let desc = ImageViewDesc {
            view_type: vk::ImageViewType::TYPE_2D,
            format: self.desc.format,
            aspect: self.desc.format.aspect(),
            base_mip: mip,
            mip_count: 1,
            base_layer: layer,
            layer_count: 1,
        };
        self.views.fetch(native, &desc)
    }

    /// Extent of mip level `mip`
    pub fn mip_extent(&self, mip: u32) -> (u32, u32) {
        let shrink = |size: u32| size.checked_shr(mip).unwrap_or(0).max(1);
        (shrink(self.desc.width), shrink(self.desc.height))
    }

    fn check_subresource(&self, mip: u32, layer: u32) -> DeviceResult<()> {
        if mip >= self.desc.mips || layer >= self.desc.layers {
            log::error!(
                "Subresource mip {} layer {} outside {} mips x {} layers",
                mip,
                layer,
                self.desc.mips,
                self.desc.layers
            );
            return Err(DeviceError::OutOfBounds {
                reason: format!("mip {} layer {}", mip, layer),
            });
        }
        Ok(())
    }

    /// Release views, sampler, image and memory
    pub fn destroy<N: NativeDevice + ?Sized>(mut self, native: &N) {
        self.views.clear(native);
        native.destroy_sampler(self.sampler);
        native.destroy_image(self.image);
        native.free_memory(self.memory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::RecordingDevice;

    #[test]
    fn test_six_layers_sets_cube_flag() {
        let native = RecordingDevice::new();
        let cube = Texture::create(&native, TextureDescription::cube(64, Format::Rgba16Float)).unwrap();
        let flat = Texture::create(&native, TextureDescription::new_2d(64, 64, Format::Rgba16Float)).unwrap();

        assert!(native.image_flags(cube.image).contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
        assert!(!native.image_flags(flat.image).contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
        assert_eq!(cube.desc.view_type(), vk::ImageViewType::CUBE);
    }

    #[test]
    fn test_mip_chain_and_validation() {
        let desc = TextureDescription::new_2d(256, 64, Format::Rgba8Unorm).full_mip_chain();
        assert_eq!(desc.mips, 9);
        assert!(desc.validate().is_ok());

        assert!(desc.with_mips(10).validate().is_err());
        assert!(TextureDescription::new_2d(0, 4, Format::R8Unorm).validate().is_err());

        let mut uneven_cube = TextureDescription::cube(32, Format::Rgba8Unorm);
        uneven_cube.height = 16;
        assert!(uneven_cube.validate().is_err());
    }

    #[test]
    fn test_views_are_cached_per_subresource() {
        let native = RecordingDevice::new();
        let mut texture =
            Texture::create(&native, TextureDescription::new_2d(16, 16, Format::Rgba8Unorm).full_mip_chain()).unwrap();

        let a = texture.attachment_view(&native, 1, 0).unwrap();
        let b = texture.attachment_view(&native, 1, 0).unwrap();
        let full = texture.sampled_view(&native).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, full);
        assert_eq!(native.calls("create_image_view"), 2);
        assert!(texture.attachment_view(&native, 5, 0).is_err());
        assert_eq!(texture.mip_extent(2), (4, 4));

        texture.destroy(&native);
        assert_eq!(native.calls("destroy_image_view"), 2);
        assert_eq!(native.calls("destroy_sampler"), 1);
        assert_eq!(native.calls("free_memory"), 1);
    }

    #[test]
    fn test_sampler_failure_releases_image() {
        let native = RecordingDevice::new();
        native.fail_next("create_sampler");

        assert!(Texture::create(&native, TextureDescription::new_2d(4, 4, Format::Rgba8Unorm)).is_err());
        assert_eq!(native.calls("destroy_image"), 1);
        assert_eq!(native.calls("free_memory"), 1);
    }
}
