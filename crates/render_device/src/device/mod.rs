//! Device façade
//!
//! [`Device`] owns every resource and cache and is the only way to create,
//! bind, record and present. Resources are addressed by generation-checked
//! handles; a destroyed handle fails with [`DeviceError::InvalidHandle`].
//!
//! A frame goes `acquire → begin_command_buffer → begin_render_pass → draw* →
//! end_render_pass → end_command_buffer → submit_synced → present`. Stale swap
//! chains are reported as `Ok(false)` from `acquire`/`present`; the caller
//! then calls `reinit`.

mod commands;
mod resources;
mod swapchain;
mod upload;

#[cfg(test)]
mod tests;

use ash::vk;
use slotmap::{Key, SlotMap};

use crate::cache::{
    CacheStats, DescriptorSetLayoutCache, PipelineCache, PipelineLayoutCache, RayTracePipelineCache, RenderPassCache,
};
use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::native::{DeviceLimits, NativeDevice, SurfaceSource, VulkanDevice};
use crate::resources::{
    BindSet, BindSetHandle, Buffer, CommandBuffer, CommandBufferHandle, CommandBufferState, FrameBuffer,
    FrameBufferHandle, GraphicsPipeline, IndexBuffer, IndexBufferHandle, PipelineHandle, RayTracePipeline,
    RayTracePipelineHandle, RenderPass, RenderPassHandle, Shader, ShaderHandle, SwapChainHandle, Texture,
    TextureHandle, UniformBufferHandle, VertexBufferHandle,
};
use crate::swapchain::SwapChain;

/// Counters of the device-wide caches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCacheStats {
    /// Descriptor set layouts
    pub set_layouts: CacheStats,
    /// Pipeline layouts
    pub pipeline_layouts: CacheStats,
    /// Graphics pipelines
    pub pipelines: CacheStats,
    /// Ray-trace pipelines
    pub ray_trace_pipelines: CacheStats,
    /// Render passes
    pub render_passes: CacheStats,
}

/// The graphics device
pub struct Device<N: NativeDevice = VulkanDevice> {
    config: DeviceConfig,

    textures: SlotMap<TextureHandle, Texture>,
    vertex_buffers: SlotMap<VertexBufferHandle, Buffer>,
    index_buffers: SlotMap<IndexBufferHandle, IndexBuffer>,
    uniform_buffers: SlotMap<UniformBufferHandle, Buffer>,
    shaders: SlotMap<ShaderHandle, Shader>,
    bind_sets: SlotMap<BindSetHandle, BindSet>,
    pipelines: SlotMap<PipelineHandle, GraphicsPipeline>,
    ray_trace_pipelines: SlotMap<RayTracePipelineHandle, RayTracePipeline>,
    render_passes: SlotMap<RenderPassHandle, RenderPass>,
    frame_buffers: SlotMap<FrameBufferHandle, FrameBuffer>,
    command_buffers: SlotMap<CommandBufferHandle, CommandBuffer>,
    swap_chains: SlotMap<SwapChainHandle, SwapChain>,

    set_layouts: DescriptorSetLayoutCache,
    pipeline_layouts: PipelineLayoutCache,
    pipeline_cache: PipelineCache,
    ray_trace_cache: RayTracePipelineCache,
    render_pass_cache: RenderPassCache,

    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    shut_down: bool,

    // dropped last, after `Drop` released everything created from it
    native: N,
}

impl Device<VulkanDevice> {
    /// Bring up Vulkan on the window described by `surface`
    pub fn new(config: DeviceConfig, surface: &dyn SurfaceSource) -> DeviceResult<Self> {
        config.validate().map_err(|e| {
            log::error!("Invalid device configuration: {}", e);
            DeviceError::Config(e)
        })?;
        let native = VulkanDevice::new(&config, surface)?;
        Self::with_native(native, config)
    }
}

impl<N: NativeDevice> Device<N> {
    /// Wrap an already created native device
    pub fn with_native(native: N, config: DeviceConfig) -> DeviceResult<Self> {
        config.validate().map_err(|e| {
            log::error!("Invalid device configuration: {}", e);
            DeviceError::Config(e)
        })?;

        let command_pool = native.create_command_pool().map_err(|e| {
            log::error!("Failed to create command pool: {}", e);
            e
        })?;

        let descriptor_pool = match Self::create_descriptor_pool(&native, &config) {
            Ok(pool) => pool,
            Err(e) => {
                native.destroy_command_pool(command_pool);
                return Err(e);
            }
        };

        log::info!("Device ready ({})", config.application_name);

        Ok(Self {
            config,
            textures: SlotMap::with_key(),
            vertex_buffers: SlotMap::with_key(),
            index_buffers: SlotMap::with_key(),
            uniform_buffers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            bind_sets: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            ray_trace_pipelines: SlotMap::with_key(),
            render_passes: SlotMap::with_key(),
            frame_buffers: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            swap_chains: SlotMap::with_key(),
            set_layouts: DescriptorSetLayoutCache::new(),
            pipeline_layouts: PipelineLayoutCache::new(),
            pipeline_cache: PipelineCache::new(),
            ray_trace_cache: RayTracePipelineCache::new(),
            render_pass_cache: RenderPassCache::new(),
            command_pool,
            descriptor_pool,
            shut_down: false,
            native,
        })
    }

    fn create_descriptor_pool(native: &N, config: &DeviceConfig) -> DeviceResult<vk::DescriptorPool> {
        let sizes = &config.descriptor_pool;
        let mut pool_sizes = vec![
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: sizes.uniform_buffers.max(1),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: sizes.sampled_textures.max(1),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: sizes.storage_images.max(1),
            },
        ];
        if native.limits().ray_tracing && sizes.acceleration_structures > 0 {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                descriptor_count: sizes.acceleration_structures,
            });
        }

        let info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(sizes.max_sets)
            .pool_sizes(&pool_sizes);

        native.create_descriptor_pool(&info).map_err(|e| {
            log::error!("Failed to create descriptor pool ({} sets): {}", sizes.max_sets, e);
            e
        })
    }

    /// Native device
    pub fn native(&self) -> &N {
        &self.native
    }

    /// Configuration the device was created with
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Device limits
    pub fn limits(&self) -> DeviceLimits {
        self.native.limits()
    }

    /// Counters of every cache
    pub fn cache_stats(&self) -> DeviceCacheStats {
        DeviceCacheStats {
            set_layouts: self.set_layouts.stats(),
            pipeline_layouts: self.pipeline_layouts.stats(),
            pipelines: self.pipeline_cache.stats(),
            ray_trace_pipelines: self.ray_trace_cache.stats(),
            render_passes: self.render_pass_cache.stats(),
        }
    }

    /// Block until the GPU is idle; every submitted command buffer is then complete
    pub fn wait_idle(&mut self) -> DeviceResult<()> {
        self.native.wait_idle().map_err(|e| {
            log::error!("Device wait idle failed: {}", e);
            e
        })?;
        for cb in self.command_buffers.values_mut() {
            if cb.state == CommandBufferState::Submitted {
                cb.state = CommandBufferState::Executable;
            }
        }
        Ok(())
    }

    /// Block until every listed command buffer finished executing
    pub fn wait_for(&mut self, command_buffers: &[CommandBufferHandle]) -> DeviceResult<()> {
        let fences = command_buffers
            .iter()
            .map(|&handle| lookup(&self.command_buffers, handle, "command buffer").map(|cb| cb.fence))
            .collect::<DeviceResult<Vec<_>>>()?;
        if fences.is_empty() {
            return Ok(());
        }

        self.native
            .wait_for_fences(&fences, self.config.fence_timeout_ns)
            .map_err(|e| {
                log::error!("Waiting for {} command buffers failed: {}", fences.len(), e);
                e
            })?;

        for &handle in command_buffers {
            if let Some(cb) = self.command_buffers.get_mut(handle) {
                if cb.state == CommandBufferState::Submitted {
                    cb.state = CommandBufferState::Executable;
                }
            }
        }
        Ok(())
    }

    /// Destroy every resource and cache; the device is unusable afterwards
    ///
    /// Called automatically on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(e) = self.native.wait_idle() {
            log::error!("Wait idle before shutdown failed: {}", e);
        }

        let native = &self.native;
        for (_, cb) in self.command_buffers.drain() {
            cb.destroy(native, self.command_pool);
        }
        for (_, mut swap_chain) in self.swap_chains.drain() {
            swap_chain.ring.destroy(native);
            swap_chain.native.destroy(native);
        }
        for (_, mut framebuffer) in self.frame_buffers.drain() {
            framebuffer.destroy(native);
        }
        self.bind_sets.clear();
        for (_, texture) in self.textures.drain() {
            texture.destroy(native);
        }
        for (_, buffer) in self.vertex_buffers.drain() {
            buffer.destroy(native);
        }
        for (_, buffer) in self.uniform_buffers.drain() {
            buffer.destroy(native);
        }
        for (_, index_buffer) in self.index_buffers.drain() {
            index_buffer.buffer.destroy(native);
        }
        for (_, shader) in self.shaders.drain() {
            native.destroy_shader_module(shader.module);
        }
        self.pipelines.clear();
        self.ray_trace_pipelines.clear();
        self.render_passes.clear();

        let stats = self.cache_stats();
        log::debug!(
            "Clearing caches: {} set layouts, {} pipeline layouts, {} pipelines, {} ray-trace pipelines, {} render passes",
            stats.set_layouts.entries,
            stats.pipeline_layouts.entries,
            stats.pipelines.entries,
            stats.ray_trace_pipelines.entries,
            stats.render_passes.entries
        );
        self.pipeline_cache.clear(native);
        self.ray_trace_cache.clear(native);
        self.pipeline_layouts.clear(native);
        self.set_layouts.clear(native);
        self.render_pass_cache.clear(native);

        native.destroy_descriptor_pool(self.descriptor_pool);
        native.destroy_command_pool(self.command_pool);
        self.shut_down = true;
        log::info!("Device shut down");
    }

    fn check_alive(&self) -> DeviceResult<()> {
        if self.shut_down {
            log::error!("Device used after shutdown");
            return Err(DeviceError::invalid_state("device was shut down"));
        }
        Ok(())
    }
}

impl<N: NativeDevice> Drop for Device<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolve `handle` or log and fail
fn lookup<'a, K: Key, V>(map: &'a SlotMap<K, V>, handle: K, kind: &'static str) -> DeviceResult<&'a V> {
    map.get(handle).ok_or_else(|| {
        log::error!("Stale or unknown {} handle {:?}", kind, handle);
        DeviceError::InvalidHandle { kind }
    })
}

/// Mutable [`lookup`]
fn lookup_mut<'a, K: Key, V>(
    map: &'a mut SlotMap<K, V>,
    handle: K,
    kind: &'static str,
) -> DeviceResult<&'a mut V> {
    map.get_mut(handle).ok_or_else(|| {
        log::error!("Stale or unknown {} handle {:?}", kind, handle);
        DeviceError::InvalidHandle { kind }
    })
}
