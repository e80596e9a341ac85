//! Resource creation, destruction and binding

use ash::vk;

use super::{lookup, lookup_mut, Device};
use crate::builders::RenderPassDescription;
use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::resources::{
    spirv_words, BindSet, BindSetHandle, BoundResource, Buffer, BufferUsage, FrameBuffer, FrameBufferAttachment,
    FrameBufferDescription, FrameBufferHandle, GraphicsPipeline, IndexBuffer, IndexBufferHandle, PipelineHandle,
    RayTracePipeline, RayTracePipelineHandle, RenderPass, RenderPassHandle, ResourceRef, Shader, ShaderHandle, Texture,
    TextureDescription, TextureHandle, UniformBufferHandle, VertexBufferHandle,
};
use crate::types::{BindingType, ImageLayout, IndexFormat, ShaderIl, ShaderStage, ShaderStages, TextureUsage};

impl<N: NativeDevice> Device<N> {
    // Shaders

    /// Create a shader module for `stage` from an intermediate representation
    pub fn create_shader_from_il(&mut self, stage: ShaderStage, il: ShaderIl, data: &[u8]) -> DeviceResult<ShaderHandle> {
        self.check_alive()?;
        let words = match il {
            ShaderIl::SpirV => spirv_words(data)?,
        };
        let module = self.native.create_shader_module(&words).map_err(|e| {
            log::error!("Failed to create {:?} shader module: {}", stage, e);
            e
        })?;
        log::debug!("Created {:?} shader ({} words)", stage, words.len());
        Ok(self.shaders.insert(Shader { stage, module }))
    }

    /// Destroy a shader; pipelines already built from it keep working
    pub fn destroy_shader(&mut self, handle: ShaderHandle) -> DeviceResult<()> {
        let shader = self.shaders.remove(handle).ok_or_else(|| stale("shader"))?;
        self.native.destroy_shader_module(shader.module);
        Ok(())
    }

    // Buffers

    fn create_buffer_with(
        &self,
        flags: vk::BufferUsageFlags,
        usage: BufferUsage,
        size: u64,
        data: Option<&[u8]>,
    ) -> DeviceResult<Buffer> {
        let buffer = Buffer::create(&self.native, size, flags, usage)?;
        let filled = match data {
            Some(bytes) => self.fill_buffer(&buffer, 0, bytes),
            None => Ok(()),
        };
        match filled {
            Ok(()) => Ok(buffer),
            Err(e) => {
                buffer.destroy(&self.native);
                Err(e)
            }
        }
    }

    /// Write `data` at `offset`, directly for dynamic buffers, staged for static ones
    fn fill_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> DeviceResult<()> {
        match buffer.usage {
            BufferUsage::Dynamic => {
                if buffer.mapped {
                    log::error!("Buffer {:?} is mapped; unmap it before updating", buffer.buffer);
                    return Err(DeviceError::invalid_state("buffer is mapped"));
                }
                buffer.write(&self.native, offset, data)
            }
            BufferUsage::Static => self.upload_buffer(buffer, offset, data),
        }
    }

    /// Create a vertex buffer of `size` bytes, optionally filled with `data`
    pub fn create_vertex_buffer(
        &mut self,
        usage: BufferUsage,
        size: u64,
        data: Option<&[u8]>,
    ) -> DeviceResult<VertexBufferHandle> {
        self.check_alive()?;
        let buffer = self.create_buffer_with(vk::BufferUsageFlags::VERTEX_BUFFER, usage, size, data)?;
        Ok(self.vertex_buffers.insert(buffer))
    }

    /// Create an index buffer of `size` bytes holding `format` indices
    pub fn create_index_buffer(
        &mut self,
        usage: BufferUsage,
        format: IndexFormat,
        size: u64,
        data: Option<&[u8]>,
    ) -> DeviceResult<IndexBufferHandle> {
        self.check_alive()?;
        if size % format.size() != 0 {
            log::error!("Index buffer size {} is not a multiple of {:?}", size, format);
            return Err(DeviceError::invalid_operation(format!(
                "index buffer size {} not a multiple of {}",
                size,
                format.size()
            )));
        }
        let buffer = self.create_buffer_with(vk::BufferUsageFlags::INDEX_BUFFER, usage, size, data)?;
        Ok(self.index_buffers.insert(IndexBuffer { buffer, format }))
    }

    /// Create a uniform buffer of `size` bytes
    pub fn create_uniform_buffer(
        &mut self,
        usage: BufferUsage,
        size: u64,
        data: Option<&[u8]>,
    ) -> DeviceResult<UniformBufferHandle> {
        self.check_alive()?;
        let buffer = self.create_buffer_with(vk::BufferUsageFlags::UNIFORM_BUFFER, usage, size, data)?;
        Ok(self.uniform_buffers.insert(buffer))
    }

    /// Destroy a vertex buffer
    pub fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle) -> DeviceResult<()> {
        let buffer = self.vertex_buffers.remove(handle).ok_or_else(|| stale("vertex buffer"))?;
        buffer.destroy(&self.native);
        Ok(())
    }

    /// Destroy an index buffer
    pub fn destroy_index_buffer(&mut self, handle: IndexBufferHandle) -> DeviceResult<()> {
        let index_buffer = self.index_buffers.remove(handle).ok_or_else(|| stale("index buffer"))?;
        index_buffer.buffer.destroy(&self.native);
        Ok(())
    }

    /// Destroy a uniform buffer; bind sets still referencing it fail their next flush
    pub fn destroy_uniform_buffer(&mut self, handle: UniformBufferHandle) -> DeviceResult<()> {
        let buffer = self.uniform_buffers.remove(handle).ok_or_else(|| stale("uniform buffer"))?;
        buffer.destroy(&self.native);
        Ok(())
    }

    /// Map a dynamic vertex buffer
    ///
    /// The pointer covers the whole buffer and stays valid until the matching unmap.
    pub fn map_vertex_buffer(&mut self, handle: VertexBufferHandle) -> DeviceResult<*mut u8> {
        lookup_mut(&mut self.vertex_buffers, handle, "vertex buffer")?.map(&self.native)
    }

    /// Unmap a dynamic vertex buffer
    pub fn unmap_vertex_buffer(&mut self, handle: VertexBufferHandle) -> DeviceResult<()> {
        lookup_mut(&mut self.vertex_buffers, handle, "vertex buffer")?.unmap(&self.native)
    }

    /// Map a dynamic index buffer
    pub fn map_index_buffer(&mut self, handle: IndexBufferHandle) -> DeviceResult<*mut u8> {
        lookup_mut(&mut self.index_buffers, handle, "index buffer")?
            .buffer
            .map(&self.native)
    }

    /// Unmap a dynamic index buffer
    pub fn unmap_index_buffer(&mut self, handle: IndexBufferHandle) -> DeviceResult<()> {
        lookup_mut(&mut self.index_buffers, handle, "index buffer")?
            .buffer
            .unmap(&self.native)
    }

    /// Map a dynamic uniform buffer
    pub fn map_uniform_buffer(&mut self, handle: UniformBufferHandle) -> DeviceResult<*mut u8> {
        lookup_mut(&mut self.uniform_buffers, handle, "uniform buffer")?.map(&self.native)
    }

    /// Unmap a dynamic uniform buffer
    pub fn unmap_uniform_buffer(&mut self, handle: UniformBufferHandle) -> DeviceResult<()> {
        lookup_mut(&mut self.uniform_buffers, handle, "uniform buffer")?.unmap(&self.native)
    }

    /// Overwrite part of a vertex buffer
    pub fn update_vertex_buffer(&mut self, handle: VertexBufferHandle, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let buffer = lookup(&self.vertex_buffers, handle, "vertex buffer")?;
        self.fill_buffer(buffer, offset, data)
    }

    /// Overwrite part of an index buffer
    pub fn update_index_buffer(&mut self, handle: IndexBufferHandle, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let index_buffer = lookup(&self.index_buffers, handle, "index buffer")?;
        self.fill_buffer(&index_buffer.buffer, offset, data)
    }

    /// Overwrite part of a uniform buffer
    pub fn update_uniform_buffer(
        &mut self,
        handle: UniformBufferHandle,
        offset: u64,
        data: &[u8],
    ) -> DeviceResult<()> {
        let buffer = lookup(&self.uniform_buffers, handle, "uniform buffer")?;
        self.fill_buffer(buffer, offset, data)
    }

    /// Write a plain-data value into a uniform buffer
    pub fn update_uniform_buffer_with<T: bytemuck::Pod>(
        &mut self,
        handle: UniformBufferHandle,
        offset: u64,
        value: &T,
    ) -> DeviceResult<()> {
        self.update_uniform_buffer(handle, offset, bytemuck::bytes_of(value))
    }

    // Textures

    /// Create a texture, optionally uploading mip 0 of every layer
    ///
    /// With data the remaining mips are generated. Sampled and storage
    /// textures end up in their shader-visible layout either way.
    pub fn create_texture(&mut self, desc: TextureDescription, data: Option<&[u8]>) -> DeviceResult<TextureHandle> {
        self.check_alive()?;
        let texture = Texture::create(&self.native, desc)?;

        let prepared = match data {
            Some(bytes) => self.upload_texture(&texture, bytes),
            None if texture
                .desc
                .usage
                .intersects(TextureUsage::SAMPLED | TextureUsage::STORAGE) =>
            {
                self.transition_to_resting(&texture)
            }
            None => Ok(()),
        };
        if let Err(e) = prepared {
            texture.destroy(&self.native);
            return Err(e);
        }
        Ok(self.textures.insert(texture))
    }

    /// Destroy a texture with its sampler and views
    pub fn destroy_texture(&mut self, handle: TextureHandle) -> DeviceResult<()> {
        let texture = self.textures.remove(handle).ok_or_else(|| stale("texture"))?;
        texture.destroy(&self.native);
        Ok(())
    }

    /// Description a texture was created with
    pub fn texture_description(&self, handle: TextureHandle) -> Option<&TextureDescription> {
        self.textures.get(handle).map(|texture| &texture.desc)
    }

    // Bind sets

    /// Create an empty bind set
    pub fn create_bind_set(&mut self) -> DeviceResult<BindSetHandle> {
        self.check_alive()?;
        Ok(self.bind_sets.insert(BindSet::new()))
    }

    /// Destroy a bind set and return its descriptor set to the pool
    pub fn destroy_bind_set(&mut self, handle: BindSetHandle) -> DeviceResult<()> {
        let mut set = self.bind_sets.remove(handle).ok_or_else(|| stale("bind set"))?;
        set.release(&self.native, self.descriptor_pool);
        Ok(())
    }

    /// Read access to a bind set
    pub fn bind_set(&self, handle: BindSetHandle) -> Option<&BindSet> {
        self.bind_sets.get(handle)
    }

    /// Bind `size` bytes of `buffer` starting at `offset` to `slot`
    pub fn bind_uniform_buffer(
        &mut self,
        set: BindSetHandle,
        slot: u32,
        buffer: UniformBufferHandle,
        offset: u64,
        size: u64,
    ) -> DeviceResult<()> {
        let ubo = lookup(&self.uniform_buffers, buffer, "uniform buffer")?;
        let alignment = self.native.limits().min_uniform_buffer_offset_alignment.max(1);
        if offset % alignment != 0 {
            log::error!("Uniform offset {} is not aligned to {}", offset, alignment);
            return Err(DeviceError::invalid_operation(format!(
                "uniform offset {} not aligned to {}",
                offset, alignment
            )));
        }
        if size == 0 || offset.checked_add(size).map_or(true, |end| end > ubo.size) {
            log::error!("Uniform range {}+{} outside buffer of {} bytes", offset, size, ubo.size);
            return Err(DeviceError::OutOfBounds {
                reason: format!("uniform range {}+{} in {} bytes", offset, size, ubo.size),
            });
        }
        let resource = BoundResource::UniformBuffer {
            buffer: ubo.buffer,
            offset,
            range: size,
        };
        lookup_mut(&mut self.bind_sets, set, "bind set")?.bind(
            slot,
            BindingType::UniformBuffer,
            resource,
            ResourceRef::UniformBuffer(buffer),
        )
    }

    /// Bind a sampled texture with its own sampler to `slot`
    pub fn bind_texture(&mut self, set: BindSetHandle, slot: u32, texture: TextureHandle) -> DeviceResult<()> {
        let record = lookup_mut(&mut self.textures, texture, "texture")?;
        if !record.desc.usage.contains(TextureUsage::SAMPLED) {
            log::error!("Texture {:?} was not created for sampling", texture);
            return Err(DeviceError::invalid_operation("texture lacks SAMPLED usage"));
        }
        let resource = BoundResource::Image {
            view: record.sampled_view(&self.native)?,
            sampler: record.sampler,
            layout: record.resting_layout().to_vk(),
        };
        lookup_mut(&mut self.bind_sets, set, "bind set")?.bind(
            slot,
            BindingType::SampledTexture,
            resource,
            ResourceRef::Texture(texture),
        )
    }

    /// Bind mip `mip` of a storage texture to `slot`
    pub fn bind_storage_image(
        &mut self,
        set: BindSetHandle,
        slot: u32,
        texture: TextureHandle,
        mip: u32,
    ) -> DeviceResult<()> {
        let record = lookup_mut(&mut self.textures, texture, "texture")?;
        if !record.desc.usage.contains(TextureUsage::STORAGE) {
            log::error!("Texture {:?} was not created as a storage image", texture);
            return Err(DeviceError::invalid_operation("texture lacks STORAGE usage"));
        }
        let resource = BoundResource::Image {
            view: record.storage_view(&self.native, mip)?,
            sampler: vk::Sampler::null(),
            layout: ImageLayout::General.to_vk(),
        };
        lookup_mut(&mut self.bind_sets, set, "bind set")?.bind(
            slot,
            BindingType::StorageImage,
            resource,
            ResourceRef::Texture(texture),
        )
    }

    /// Bind a top-level acceleration structure built elsewhere
    pub fn bind_top_level_acceleration_structure(
        &mut self,
        set: BindSetHandle,
        slot: u32,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> DeviceResult<()> {
        if !self.native.limits().ray_tracing {
            log::error!("Acceleration structures need a ray-tracing capable device");
            return Err(DeviceError::invalid_operation("ray tracing is not enabled"));
        }
        if acceleration_structure == vk::AccelerationStructureKHR::null() {
            log::error!("Null acceleration structure bound to slot {}", slot);
            return Err(DeviceError::invalid_operation("null acceleration structure"));
        }
        lookup_mut(&mut self.bind_sets, set, "bind set")?.bind(
            slot,
            BindingType::AccelerationStructure,
            BoundResource::AccelerationStructure(acceleration_structure),
            ResourceRef::External,
        )
    }

    /// Remove whatever is bound to `slot`
    pub fn unbind(&mut self, set: BindSetHandle, slot: u32) -> DeviceResult<()> {
        lookup_mut(&mut self.bind_sets, set, "bind set")?.unbind(slot)
    }

    /// Restrict the shader stages that see `slot`
    pub fn set_binding_visibility(&mut self, set: BindSetHandle, slot: u32, stages: ShaderStages) -> DeviceResult<()> {
        lookup_mut(&mut self.bind_sets, set, "bind set")?.set_visibility(slot, stages)
    }

    /// Fail if a used slot of `set` points at a destroyed texture or buffer
    pub(super) fn check_bind_set_sources(&self, handle: BindSetHandle, set: &BindSet) -> DeviceResult<()> {
        for (slot, source) in set.sources() {
            let alive = match source {
                ResourceRef::Texture(texture) => self.textures.contains_key(texture),
                ResourceRef::UniformBuffer(buffer) => self.uniform_buffers.contains_key(buffer),
                ResourceRef::None | ResourceRef::External => true,
            };
            if !alive {
                log::error!("Bind set {:?} slot {} references a destroyed {:?}", handle, slot, source);
                return Err(DeviceError::InvalidHandle {
                    kind: match source {
                        ResourceRef::Texture(_) => "texture",
                        _ => "uniform buffer",
                    },
                });
            }
        }
        Ok(())
    }

    // Pipelines

    /// Create a graphics pipeline with default state
    pub fn create_graphics_pipeline(&mut self) -> DeviceResult<PipelineHandle> {
        self.check_alive()?;
        Ok(self.pipelines.insert(GraphicsPipeline::new()))
    }

    /// Destroy a graphics pipeline; the native objects stay cached
    pub fn destroy_graphics_pipeline(&mut self, handle: PipelineHandle) -> DeviceResult<()> {
        self.pipelines
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| stale("graphics pipeline"))
    }

    /// Read access to a pipeline
    pub fn graphics_pipeline(&self, handle: PipelineHandle) -> Option<&GraphicsPipeline> {
        self.pipelines.get(handle)
    }

    /// Mutable access to a pipeline's state setters
    pub fn graphics_pipeline_mut(&mut self, handle: PipelineHandle) -> Option<&mut GraphicsPipeline> {
        self.pipelines.get_mut(handle)
    }

    /// Create an empty ray-trace pipeline
    ///
    /// Fails when the device was brought up without ray tracing.
    pub fn create_ray_trace_pipeline(&mut self) -> DeviceResult<RayTracePipelineHandle> {
        self.check_alive()?;
        if !self.native.limits().ray_tracing {
            log::error!("Ray-trace pipeline requested on a device without ray tracing");
            return Err(DeviceError::invalid_operation("ray tracing is not enabled"));
        }
        Ok(self.ray_trace_pipelines.insert(RayTracePipeline::new()))
    }

    /// Destroy a ray-trace pipeline; the native pipeline and its binding table stay cached
    pub fn destroy_ray_trace_pipeline(&mut self, handle: RayTracePipelineHandle) -> DeviceResult<()> {
        self.ray_trace_pipelines
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| stale("ray-trace pipeline"))
    }

    /// Read access to a ray-trace pipeline
    pub fn ray_trace_pipeline(&self, handle: RayTracePipelineHandle) -> Option<&RayTracePipeline> {
        self.ray_trace_pipelines.get(handle)
    }

    /// Mutable access to a ray-trace pipeline's setters
    pub fn ray_trace_pipeline_mut(&mut self, handle: RayTracePipelineHandle) -> Option<&mut RayTracePipeline> {
        self.ray_trace_pipelines.get_mut(handle)
    }

    // Render passes and frame buffers

    /// Create a render pass; equal descriptions share one native pass
    pub fn create_render_pass(&mut self, desc: RenderPassDescription) -> DeviceResult<RenderPassHandle> {
        self.check_alive()?;
        let native = self.render_pass_cache.fetch(&self.native, &desc).map_err(|e| {
            log::error!("Render pass rejected: {}", e);
            e
        })?;
        let compat = desc.compat();
        Ok(self.render_passes.insert(RenderPass { desc, native, compat }))
    }

    /// Destroy a render pass record
    pub fn destroy_render_pass(&mut self, handle: RenderPassHandle) -> DeviceResult<()> {
        self.render_passes
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| stale("render pass"))
    }

    /// Describe a frame buffer; native objects are created on first use with a pass
    pub fn create_frame_buffer(&mut self, desc: FrameBufferDescription) -> DeviceResult<FrameBufferHandle> {
        self.check_alive()?;
        if desc.width == 0 || desc.height == 0 || desc.attachments.is_empty() {
            log::error!(
                "Frame buffer {}x{} with {} attachments rejected",
                desc.width,
                desc.height,
                desc.attachments.len()
            );
            return Err(DeviceError::invalid_operation("frame buffer needs an extent and attachments"));
        }
        for attachment in &desc.attachments {
            if let FrameBufferAttachment::Texture { texture, mip, layer } = *attachment {
                let record = lookup(&self.textures, texture, "texture")?;
                if mip >= record.desc.mips || layer >= record.desc.layers {
                    log::error!(
                        "Attachment mip {} layer {} outside {} mips x {} layers",
                        mip,
                        layer,
                        record.desc.mips,
                        record.desc.layers
                    );
                    return Err(DeviceError::OutOfBounds {
                        reason: format!("attachment mip {} layer {}", mip, layer),
                    });
                }
                let (width, height) = record.mip_extent(mip);
                if width < desc.width || height < desc.height {
                    log::error!(
                        "Attachment mip {} ({}x{}) cannot back a {}x{} frame buffer",
                        mip,
                        width,
                        height,
                        desc.width,
                        desc.height
                    );
                    return Err(DeviceError::OutOfBounds {
                        reason: format!("attachment mip {} is {}x{}", mip, width, height),
                    });
                }
            }
        }
        Ok(self.frame_buffers.insert(FrameBuffer::new(desc)))
    }

    /// Destroy a frame buffer and every native object built for it
    pub fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle) -> DeviceResult<()> {
        let mut framebuffer = self.frame_buffers.remove(handle).ok_or_else(|| stale("frame buffer"))?;
        framebuffer.destroy(&self.native);
        Ok(())
    }
}

fn stale(kind: &'static str) -> DeviceError {
    log::error!("Destroying stale or unknown {} handle", kind);
    DeviceError::InvalidHandle { kind }
}
