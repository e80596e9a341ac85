//! Native graphics API seam
//!
//! [`NativeDevice`] is the set of low-level object-creation and recording
//! primitives the rest of the crate is written against. Arguments are the
//! plain `ash::vk` structures; implementations may assume every pointer inside
//! them is valid for the duration of the call.
//!
//! [`VulkanDevice`] is the production implementation. Unit tests use a
//! recording double that hands out synthetic handles.

mod surface;
mod vulkan;

#[cfg(test)]
pub(crate) mod recording;

pub use surface::{RawWindowSurface, SurfaceSource};
pub use vulkan::VulkanDevice;

use ash::vk;

use crate::error::DeviceResult;

/// Device properties the upper layers care about
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLimits {
    /// Largest anisotropy a sampler may request, `1.0` when unsupported
    pub max_sampler_anisotropy: f32,
    /// Alignment required for uniform-buffer binding offsets
    pub min_uniform_buffer_offset_alignment: u64,
    /// Whether acceleration structures and ray-trace pipelines can be used
    pub ray_tracing: bool,
    /// Bytes of one shader group handle
    pub shader_group_handle_size: u32,
    /// Stride alignment of shader binding table records
    pub shader_group_handle_alignment: u32,
    /// Start alignment of each shader binding table region
    pub shader_group_base_alignment: u32,
}

/// Shader binding table regions of one trace
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderBindingRegions {
    /// Ray-generation record; size equals stride
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    /// Miss records
    pub miss: vk::StridedDeviceAddressRegionKHR,
    /// Hit-group records
    pub hit: vk::StridedDeviceAddressRegionKHR,
    /// Callable records, empty when unused
    pub callable: vk::StridedDeviceAddressRegionKHR,
}

/// Low-level object creation, recording and submission
pub trait NativeDevice {
    /// Device limits captured at creation
    fn limits(&self) -> DeviceLimits;

    /// Optimal-tiling feature flags of `format`
    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;

    // Layouts, pipelines and passes

    /// Create a descriptor set layout
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> DeviceResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// Create a pipeline layout
    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> DeviceResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Create one graphics pipeline
    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> DeviceResult<vk::Pipeline>;
    /// Create one ray-trace pipeline
    fn create_ray_tracing_pipeline(
        &self,
        info: &vk::RayTracingPipelineCreateInfoKHR,
    ) -> DeviceResult<vk::Pipeline>;
    /// Opaque handles of the first `group_count` shader groups, tightly packed
    fn ray_tracing_shader_group_handles(&self, pipeline: vk::Pipeline, group_count: u32) -> DeviceResult<Vec<u8>>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// Create a render pass
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> DeviceResult<vk::RenderPass>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    /// Create a framebuffer
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> DeviceResult<vk::Framebuffer>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Images, buffers and memory

    /// Create an image without memory
    fn create_image(&self, info: &vk::ImageCreateInfo) -> DeviceResult<vk::Image>;
    /// Destroy an image
    fn destroy_image(&self, image: vk::Image);

    /// Create an image view
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> DeviceResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Create a sampler
    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> DeviceResult<vk::Sampler>;
    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    /// Create a buffer without memory
    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> DeviceResult<vk::Buffer>;
    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: vk::Buffer);

    /// Allocate memory matching `image`'s requirements and bind it
    fn allocate_image_memory(
        &self,
        image: vk::Image,
        properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<vk::DeviceMemory>;

    /// Allocate memory matching `buffer`'s requirements and bind it
    fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<vk::DeviceMemory>;

    /// GPU address of a buffer created with `SHADER_DEVICE_ADDRESS`
    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress;

    /// Free a memory allocation
    fn free_memory(&self, memory: vk::DeviceMemory);

    /// Map host-visible memory
    fn map_memory(&self, memory: vk::DeviceMemory, offset: u64, size: u64) -> DeviceResult<*mut u8>;
    /// Unmap previously mapped memory
    fn unmap_memory(&self, memory: vk::DeviceMemory);

    // Shaders and synchronization

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> DeviceResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    /// Create a binary semaphore
    fn create_semaphore(&self) -> DeviceResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Create a fence
    fn create_fence(&self, signaled: bool) -> DeviceResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);

    /// Block until all `fences` are signaled or `timeout_ns` elapses
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> DeviceResult<()>;
    /// Return `fences` to the unsignaled state
    fn reset_fences(&self, fences: &[vk::Fence]) -> DeviceResult<()>;
    /// Non-blocking fence query
    fn fence_signaled(&self, fence: vk::Fence) -> DeviceResult<bool>;

    /// Block until the device is idle
    fn wait_idle(&self) -> DeviceResult<()>;

    // Descriptors

    /// Create a descriptor pool
    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo,
    ) -> DeviceResult<vk::DescriptorPool>;
    /// Destroy a descriptor pool and every set allocated from it
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate one descriptor set
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> DeviceResult<vk::DescriptorSet>;
    /// Return one descriptor set to its pool
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> DeviceResult<()>;

    /// Apply descriptor writes in one call
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    // Command buffers

    /// Create a resettable command pool on the graphics queue family
    fn create_command_pool(&self) -> DeviceResult<vk::CommandPool>;
    /// Destroy a command pool
    fn destroy_command_pool(&self, pool: vk::CommandPool);

    /// Allocate one primary command buffer
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> DeviceResult<vk::CommandBuffer>;
    /// Free one command buffer
    fn free_command_buffer(&self, pool: vk::CommandPool, buffer: vk::CommandBuffer);

    /// Begin recording
    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> DeviceResult<()>;
    /// Finish recording
    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> DeviceResult<()>;
    /// Return a command buffer to the initial state
    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> DeviceResult<()>;

    /// Record a render-pass begin with inline contents
    fn cmd_begin_render_pass(&self, buffer: vk::CommandBuffer, info: &vk::RenderPassBeginInfo);
    /// Record a render-pass end
    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer);
    /// Bind a pipeline
    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    /// Bind descriptor sets
    fn cmd_bind_descriptor_sets(
        &self,
        buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    /// Bind vertex buffers
    fn cmd_bind_vertex_buffers(
        &self,
        buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    /// Bind an index buffer
    fn cmd_bind_index_buffer(
        &self,
        buffer: vk::CommandBuffer,
        index_buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    /// Upload push constants
    fn cmd_push_constants(
        &self,
        buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    /// Set the dynamic viewport
    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport);
    /// Set the dynamic scissor
    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D);
    /// Non-indexed draw
    fn cmd_draw(
        &self,
        buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    /// Indexed draw
    fn cmd_draw_indexed(
        &self,
        buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    /// Launch a ray-generation grid through the bound ray-trace pipeline
    fn cmd_trace_rays(
        &self,
        buffer: vk::CommandBuffer,
        regions: &ShaderBindingRegions,
        width: u32,
        height: u32,
        depth: u32,
    );
    /// Clear attachments inside the current pass
    fn cmd_clear_attachments(
        &self,
        buffer: vk::CommandBuffer,
        attachments: &[vk::ClearAttachment],
        rects: &[vk::ClearRect],
    );
    /// Pipeline barrier with buffer and image memory barriers
    fn cmd_pipeline_barrier(
        &self,
        buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    );
    /// Buffer to buffer copy
    fn cmd_copy_buffer(
        &self,
        buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );
    /// Buffer to image copy, image in `TRANSFER_DST_OPTIMAL`
    fn cmd_copy_buffer_to_image(
        &self,
        buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        regions: &[vk::BufferImageCopy],
    );
    /// Image blit from `TRANSFER_SRC_OPTIMAL` to `TRANSFER_DST_OPTIMAL`
    fn cmd_blit_image(
        &self,
        buffer: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        region: &vk::ImageBlit,
        filter: vk::Filter,
    );

    /// Submit to the graphics queue
    fn queue_submit(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> DeviceResult<()>;

    // Presentation

    /// Graphics and present queue family indices
    fn queue_family_indices(&self) -> (u32, u32);

    /// Surface the device presents to
    fn surface(&self) -> vk::SurfaceKHR;
    /// Current surface capabilities
    fn surface_capabilities(&self) -> DeviceResult<vk::SurfaceCapabilitiesKHR>;
    /// Supported surface formats
    fn surface_formats(&self) -> DeviceResult<Vec<vk::SurfaceFormatKHR>>;
    /// Supported present modes
    fn surface_present_modes(&self) -> DeviceResult<Vec<vk::PresentModeKHR>>;

    /// Create a swap chain
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> DeviceResult<vk::SwapchainKHR>;
    /// Destroy a swap chain
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Presentable images owned by the swap chain
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> DeviceResult<Vec<vk::Image>>;

    /// Acquire the next presentable image, returning `(index, suboptimal)`
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> DeviceResult<(u32, bool)>;

    /// Queue a present on the present queue, returning `suboptimal`
    fn queue_present(&self, info: &vk::PresentInfoKHR) -> DeviceResult<bool>;
}
