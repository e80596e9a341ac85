//! In-memory [`NativeDevice`] for unit tests
//!
//! Hands out synthetic non-null handles, counts every call by method name and
//! keeps just enough state (fences, binary semaphores, mapped memory,
//! swap-chain images, descriptor writes) for the upper layers to be tested
//! without a GPU. Submitted work completes immediately unless fences are held.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use ash::vk::{self, Handle};

use super::{DeviceLimits, NativeDevice, ShaderBindingRegions};
use crate::error::{DeviceError, DeviceResult};

#[derive(Default)]
pub(crate) struct RecordingDevice {
    next_handle: Cell<u64>,
    calls: RefCell<HashMap<&'static str, usize>>,
    failures: RefCell<HashSet<&'static str>>,
    descriptor_updates: RefCell<Vec<Vec<(vk::DescriptorSet, u32)>>>,
    fences: RefCell<HashMap<u64, bool>>,
    semaphores: RefCell<HashMap<u64, bool>>,
    semaphore_misuse: Cell<usize>,
    present_waits: RefCell<Vec<vk::Semaphore>>,
    hold_fences: Cell<bool>,
    buffer_sizes: RefCell<HashMap<u64, u64>>,
    memory: RefCell<HashMap<u64, Vec<u8>>>,
    image_flags: RefCell<HashMap<u64, vk::ImageCreateFlags>>,
    swapchains: RefCell<HashMap<u64, u32>>,
    next_image: Cell<u32>,
    acquire_error: Cell<Option<vk::Result>>,
    present_error: Cell<Option<vk::Result>>,
    bound_pipelines: RefCell<Vec<(vk::PipelineBindPoint, vk::Pipeline)>>,
    traces: RefCell<Vec<ShaderBindingRegions>>,
}

impl RecordingDevice {
    pub(crate) fn new() -> Self {
        Self {
            next_handle: Cell::new(1),
            ..Self::default()
        }
    }

    /// Number of times `method` was called
    pub(crate) fn calls(&self, method: &str) -> usize {
        self.calls.borrow().get(method).copied().unwrap_or(0)
    }

    /// Make the next call to `method` fail with `ERROR_OUT_OF_DEVICE_MEMORY`
    pub(crate) fn fail_next(&self, method: &'static str) {
        self.failures.borrow_mut().insert(method);
    }

    /// Bindings written by each `update_descriptor_sets` call, in call order
    pub(crate) fn descriptor_updates(&self) -> Vec<Vec<u32>> {
        self.descriptor_updates
            .borrow()
            .iter()
            .map(|batch| batch.iter().map(|&(_, binding)| binding).collect())
            .collect()
    }

    pub(crate) fn clear_descriptor_updates(&self) {
        self.descriptor_updates.borrow_mut().clear();
    }

    /// Keep submitted fences unsignaled until [`Self::complete_all`]
    pub(crate) fn hold_fences(&self, hold: bool) {
        self.hold_fences.set(hold);
    }

    /// Signal every fence
    pub(crate) fn complete_all(&self) {
        for signaled in self.fences.borrow_mut().values_mut() {
            *signaled = true;
        }
    }

    /// Signals of an already signaled semaphore plus waits on an unsignaled one
    pub(crate) fn semaphore_misuse(&self) -> usize {
        self.semaphore_misuse.get()
    }

    /// Semaphores the last present waited on
    pub(crate) fn present_waits(&self) -> Vec<vk::Semaphore> {
        self.present_waits.borrow().clone()
    }

    pub(crate) fn set_acquire_error(&self, error: Option<vk::Result>) {
        self.acquire_error.set(error);
    }

    pub(crate) fn set_present_error(&self, error: Option<vk::Result>) {
        self.present_error.set(error);
    }

    pub(crate) fn image_flags(&self, image: vk::Image) -> vk::ImageCreateFlags {
        self.image_flags
            .borrow()
            .get(&image.as_raw())
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn memory_contents(&self, memory: vk::DeviceMemory) -> Vec<u8> {
        self.memory
            .borrow()
            .get(&memory.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    /// Graphics pipelines bound so far, in bind order
    pub(crate) fn bound_pipelines(&self) -> Vec<vk::Pipeline> {
        self.bound_pipelines
            .borrow()
            .iter()
            .filter(|(point, _)| *point == vk::PipelineBindPoint::GRAPHICS)
            .map(|&(_, pipeline)| pipeline)
            .collect()
    }

    /// Binding table regions of every recorded trace
    pub(crate) fn traces(&self) -> Vec<ShaderBindingRegions> {
        self.traces.borrow().clone()
    }

    fn signal(&self, semaphore: vk::Semaphore) {
        let mut states = self.semaphores.borrow_mut();
        if states.insert(semaphore.as_raw(), true) == Some(true) {
            self.semaphore_misuse.set(self.semaphore_misuse.get() + 1);
        }
    }

    fn wait(&self, semaphore: vk::Semaphore) {
        let mut states = self.semaphores.borrow_mut();
        if states.insert(semaphore.as_raw(), false) != Some(true) {
            self.semaphore_misuse.set(self.semaphore_misuse.get() + 1);
        }
    }

    fn record(&self, method: &'static str) {
        *self.calls.borrow_mut().entry(method).or_insert(0) += 1;
    }

    fn create<H: Handle>(&self, method: &'static str) -> DeviceResult<H> {
        self.record(method);
        if self.failures.borrow_mut().remove(method) {
            return Err(DeviceError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        Ok(H::from_raw(raw))
    }

    fn check(&self, method: &'static str) -> DeviceResult<()> {
        self.record(method);
        if self.failures.borrow_mut().remove(method) {
            return Err(DeviceError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        Ok(())
    }
}

impl NativeDevice for RecordingDevice {
    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_sampler_anisotropy: 16.0,
            min_uniform_buffer_offset_alignment: 256,
            ray_tracing: true,
            shader_group_handle_size: 32,
            shader_group_handle_alignment: 32,
            shader_group_base_alignment: 64,
        }
    }

    fn format_features(&self, _format: vk::Format) -> vk::FormatFeatureFlags {
        vk::FormatFeatureFlags::SAMPLED_IMAGE
            | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
            | vk::FormatFeatureFlags::BLIT_SRC
            | vk::FormatFeatureFlags::BLIT_DST
            | vk::FormatFeatureFlags::STORAGE_IMAGE
            | vk::FormatFeatureFlags::COLOR_ATTACHMENT
            | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
    }

    fn create_descriptor_set_layout(
        &self,
        _info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> DeviceResult<vk::DescriptorSetLayout> {
        self.create("create_descriptor_set_layout")
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.record("destroy_descriptor_set_layout");
    }

    fn create_pipeline_layout(&self, _info: &vk::PipelineLayoutCreateInfo) -> DeviceResult<vk::PipelineLayout> {
        self.create("create_pipeline_layout")
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.record("destroy_pipeline_layout");
    }

    fn create_graphics_pipeline(&self, _info: &vk::GraphicsPipelineCreateInfo) -> DeviceResult<vk::Pipeline> {
        self.create("create_graphics_pipeline")
    }

    fn create_ray_tracing_pipeline(
        &self,
        _info: &vk::RayTracingPipelineCreateInfoKHR,
    ) -> DeviceResult<vk::Pipeline> {
        self.create("create_ray_tracing_pipeline")
    }

    fn ray_tracing_shader_group_handles(&self, _pipeline: vk::Pipeline, group_count: u32) -> DeviceResult<Vec<u8>> {
        self.check("ray_tracing_shader_group_handles")?;
        let size = self.limits().shader_group_handle_size as usize;
        // every byte of a handle is its group index
        Ok((0..group_count).flat_map(|group| vec![group as u8; size]).collect())
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        self.record("destroy_pipeline");
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo) -> DeviceResult<vk::RenderPass> {
        self.create("create_render_pass")
    }

    fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {
        self.record("destroy_render_pass");
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo) -> DeviceResult<vk::Framebuffer> {
        self.create("create_framebuffer")
    }

    fn destroy_framebuffer(&self, _framebuffer: vk::Framebuffer) {
        self.record("destroy_framebuffer");
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> DeviceResult<vk::Image> {
        let image: vk::Image = self.create("create_image")?;
        self.image_flags.borrow_mut().insert(image.as_raw(), info.flags);
        Ok(image)
    }

    fn destroy_image(&self, _image: vk::Image) {
        self.record("destroy_image");
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> DeviceResult<vk::ImageView> {
        self.create("create_image_view")
    }

    fn destroy_image_view(&self, _view: vk::ImageView) {
        self.record("destroy_image_view");
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo) -> DeviceResult<vk::Sampler> {
        self.create("create_sampler")
    }

    fn destroy_sampler(&self, _sampler: vk::Sampler) {
        self.record("destroy_sampler");
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> DeviceResult<vk::Buffer> {
        let buffer: vk::Buffer = self.create("create_buffer")?;
        self.buffer_sizes.borrow_mut().insert(buffer.as_raw(), info.size);
        Ok(buffer)
    }

    fn destroy_buffer(&self, _buffer: vk::Buffer) {
        self.record("destroy_buffer");
    }

    fn allocate_image_memory(
        &self,
        _image: vk::Image,
        _properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<vk::DeviceMemory> {
        let memory: vk::DeviceMemory = self.create("allocate_image_memory")?;
        self.memory.borrow_mut().insert(memory.as_raw(), Vec::new());
        Ok(memory)
    }

    fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        _properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<vk::DeviceMemory> {
        let memory: vk::DeviceMemory = self.create("allocate_buffer_memory")?;
        let size = self
            .buffer_sizes
            .borrow()
            .get(&buffer.as_raw())
            .copied()
            .unwrap_or(0);
        self.memory
            .borrow_mut()
            .insert(memory.as_raw(), vec![0; size as usize]);
        Ok(memory)
    }

    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        self.record("buffer_device_address");
        buffer.as_raw() << 16
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.record("free_memory");
        self.memory.borrow_mut().remove(&memory.as_raw());
    }

    fn map_memory(&self, memory: vk::DeviceMemory, offset: u64, size: u64) -> DeviceResult<*mut u8> {
        self.check("map_memory")?;
        let mut allocations = self.memory.borrow_mut();
        let bytes = allocations
            .get_mut(&memory.as_raw())
            .ok_or(DeviceError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        if offset + size > bytes.len() as u64 {
            return Err(DeviceError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        // the Vec's heap buffer does not move while the map entry is alive
        Ok(unsafe { bytes.as_mut_ptr().add(offset as usize) })
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {
        self.record("unmap_memory");
    }

    fn create_shader_module(&self, _code: &[u32]) -> DeviceResult<vk::ShaderModule> {
        self.create("create_shader_module")
    }

    fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        self.record("destroy_shader_module");
    }

    fn create_semaphore(&self) -> DeviceResult<vk::Semaphore> {
        let semaphore: vk::Semaphore = self.create("create_semaphore")?;
        self.semaphores.borrow_mut().insert(semaphore.as_raw(), false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record("destroy_semaphore");
        self.semaphores.borrow_mut().remove(&semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> DeviceResult<vk::Fence> {
        let fence: vk::Fence = self.create("create_fence")?;
        self.fences.borrow_mut().insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.record("destroy_fence");
        self.fences.borrow_mut().remove(&fence.as_raw());
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _timeout_ns: u64) -> DeviceResult<()> {
        self.check("wait_for_fences")?;
        let all_signaled = fences
            .iter()
            .all(|fence| self.fences.borrow().get(&fence.as_raw()).copied().unwrap_or(true));
        if all_signaled {
            Ok(())
        } else {
            Err(DeviceError::Api(vk::Result::TIMEOUT))
        }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> DeviceResult<()> {
        self.check("reset_fences")?;
        let mut states = self.fences.borrow_mut();
        for fence in fences {
            states.insert(fence.as_raw(), false);
        }
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> DeviceResult<bool> {
        self.record("fence_signaled");
        Ok(self.fences.borrow().get(&fence.as_raw()).copied().unwrap_or(false))
    }

    fn wait_idle(&self) -> DeviceResult<()> {
        self.check("wait_idle")?;
        self.complete_all();
        Ok(())
    }

    fn create_descriptor_pool(&self, _info: &vk::DescriptorPoolCreateInfo) -> DeviceResult<vk::DescriptorPool> {
        self.create("create_descriptor_pool")
    }

    fn destroy_descriptor_pool(&self, _pool: vk::DescriptorPool) {
        self.record("destroy_descriptor_pool");
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> DeviceResult<vk::DescriptorSet> {
        self.create("allocate_descriptor_set")
    }

    fn free_descriptor_set(&self, _pool: vk::DescriptorPool, _set: vk::DescriptorSet) -> DeviceResult<()> {
        self.check("free_descriptor_set")
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        self.record("update_descriptor_sets");
        self.descriptor_updates.borrow_mut().push(
            writes
                .iter()
                .map(|write| (write.dst_set, write.dst_binding))
                .collect(),
        );
    }

    fn create_command_pool(&self) -> DeviceResult<vk::CommandPool> {
        self.create("create_command_pool")
    }

    fn destroy_command_pool(&self, _pool: vk::CommandPool) {
        self.record("destroy_command_pool");
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> DeviceResult<vk::CommandBuffer> {
        self.create("allocate_command_buffer")
    }

    fn free_command_buffer(&self, _pool: vk::CommandPool, _buffer: vk::CommandBuffer) {
        self.record("free_command_buffer");
    }

    fn begin_command_buffer(
        &self,
        _buffer: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> DeviceResult<()> {
        self.check("begin_command_buffer")
    }

    fn end_command_buffer(&self, _buffer: vk::CommandBuffer) -> DeviceResult<()> {
        self.check("end_command_buffer")
    }

    fn reset_command_buffer(&self, _buffer: vk::CommandBuffer) -> DeviceResult<()> {
        self.check("reset_command_buffer")
    }

    fn cmd_begin_render_pass(&self, _buffer: vk::CommandBuffer, _info: &vk::RenderPassBeginInfo) {
        self.record("cmd_begin_render_pass");
    }

    fn cmd_end_render_pass(&self, _buffer: vk::CommandBuffer) {
        self.record("cmd_end_render_pass");
    }

    fn cmd_bind_pipeline(&self, _buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.record("cmd_bind_pipeline");
        self.bound_pipelines.borrow_mut().push((bind_point, pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        _first_set: u32,
        _sets: &[vk::DescriptorSet],
    ) {
        self.record("cmd_bind_descriptor_sets");
    }

    fn cmd_bind_vertex_buffers(
        &self,
        _buffer: vk::CommandBuffer,
        _first_binding: u32,
        _buffers: &[vk::Buffer],
        _offsets: &[vk::DeviceSize],
    ) {
        self.record("cmd_bind_vertex_buffers");
    }

    fn cmd_bind_index_buffer(
        &self,
        _buffer: vk::CommandBuffer,
        _index_buffer: vk::Buffer,
        _offset: vk::DeviceSize,
        _index_type: vk::IndexType,
    ) {
        self.record("cmd_bind_index_buffer");
    }

    fn cmd_push_constants(
        &self,
        _buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        _offset: u32,
        _data: &[u8],
    ) {
        self.record("cmd_push_constants");
    }

    fn cmd_set_viewport(&self, _buffer: vk::CommandBuffer, _viewport: vk::Viewport) {
        self.record("cmd_set_viewport");
    }

    fn cmd_set_scissor(&self, _buffer: vk::CommandBuffer, _scissor: vk::Rect2D) {
        self.record("cmd_set_scissor");
    }

    fn cmd_draw(
        &self,
        _buffer: vk::CommandBuffer,
        _vertex_count: u32,
        _instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.record("cmd_draw");
    }

    fn cmd_draw_indexed(
        &self,
        _buffer: vk::CommandBuffer,
        _index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.record("cmd_draw_indexed");
    }

    fn cmd_trace_rays(
        &self,
        _buffer: vk::CommandBuffer,
        regions: &ShaderBindingRegions,
        _width: u32,
        _height: u32,
        _depth: u32,
    ) {
        self.record("cmd_trace_rays");
        self.traces.borrow_mut().push(*regions);
    }

    fn cmd_clear_attachments(
        &self,
        _buffer: vk::CommandBuffer,
        _attachments: &[vk::ClearAttachment],
        _rects: &[vk::ClearRect],
    ) {
        self.record("cmd_clear_attachments");
    }

    fn cmd_pipeline_barrier(
        &self,
        _buffer: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        _buffer_barriers: &[vk::BufferMemoryBarrier],
        _image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        self.record("cmd_pipeline_barrier");
    }

    fn cmd_copy_buffer(
        &self,
        _buffer: vk::CommandBuffer,
        _src: vk::Buffer,
        _dst: vk::Buffer,
        _regions: &[vk::BufferCopy],
    ) {
        self.record("cmd_copy_buffer");
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _buffer: vk::CommandBuffer,
        _src: vk::Buffer,
        _dst: vk::Image,
        _regions: &[vk::BufferImageCopy],
    ) {
        self.record("cmd_copy_buffer_to_image");
    }

    fn cmd_blit_image(
        &self,
        _buffer: vk::CommandBuffer,
        _src: vk::Image,
        _dst: vk::Image,
        _region: &vk::ImageBlit,
        _filter: vk::Filter,
    ) {
        self.record("cmd_blit_image");
    }

    fn queue_submit(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> DeviceResult<()> {
        self.check("queue_submit")?;
        for submit in submits {
            for &semaphore in raw_slice(submit.p_wait_semaphores, submit.wait_semaphore_count) {
                self.wait(semaphore);
            }
            for &semaphore in raw_slice(submit.p_signal_semaphores, submit.signal_semaphore_count) {
                self.signal(semaphore);
            }
        }
        if fence != vk::Fence::null() {
            self.fences
                .borrow_mut()
                .insert(fence.as_raw(), !self.hold_fences.get());
        }
        Ok(())
    }

    fn queue_family_indices(&self) -> (u32, u32) {
        (0, 0)
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0xdead_0001)
    }

    fn surface_capabilities(&self) -> DeviceResult<vk::SurfaceCapabilitiesKHR> {
        self.check("surface_capabilities")?;
        Ok(vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 16384,
                height: 16384,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
        })
    }

    fn surface_formats(&self) -> DeviceResult<Vec<vk::SurfaceFormatKHR>> {
        self.check("surface_formats")?;
        Ok(vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ])
    }

    fn surface_present_modes(&self) -> DeviceResult<Vec<vk::PresentModeKHR>> {
        self.check("surface_present_modes")?;
        Ok(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX])
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> DeviceResult<vk::SwapchainKHR> {
        let swapchain: vk::SwapchainKHR = self.create("create_swapchain")?;
        self.swapchains
            .borrow_mut()
            .insert(swapchain.as_raw(), info.min_image_count);
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.record("destroy_swapchain");
        self.swapchains.borrow_mut().remove(&swapchain.as_raw());
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> DeviceResult<Vec<vk::Image>> {
        self.check("swapchain_images")?;
        let count = self
            .swapchains
            .borrow()
            .get(&swapchain.as_raw())
            .copied()
            .ok_or(DeviceError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))?;
        (0..count).map(|_| self.create("swapchain_image")).collect()
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> DeviceResult<(u32, bool)> {
        self.record("acquire_next_image");
        if let Some(error) = self.acquire_error.get() {
            return Err(DeviceError::Api(error));
        }
        let count = self
            .swapchains
            .borrow()
            .get(&swapchain.as_raw())
            .copied()
            .unwrap_or(1);
        let index = self.next_image.get() % count.max(1);
        self.next_image.set(index + 1);
        self.signal(semaphore);
        Ok((index, false))
    }

    fn queue_present(&self, info: &vk::PresentInfoKHR) -> DeviceResult<bool> {
        self.record("queue_present");
        let waits = raw_slice(info.p_wait_semaphores, info.wait_semaphore_count).to_vec();
        for &semaphore in &waits {
            self.wait(semaphore);
        }
        *self.present_waits.borrow_mut() = waits;
        match self.present_error.get() {
            Some(vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Some(error) => Err(DeviceError::Api(error)),
            None => Ok(false),
        }
    }
}

/// View a `(pointer, count)` pair of a create or submit info
fn raw_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        return &[];
    }
    // callers pass infos whose pointers are valid for the call
    unsafe { std::slice::from_raw_parts(ptr, count as usize) }
}
