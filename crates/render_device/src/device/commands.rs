//! Command recording, draw-time pipeline resolution and submission

use ash::vk;

use super::{lookup, lookup_mut, Device};
use crate::builders::{HitGroup, PipelineLayoutDesc, RayTracePipelineDesc};
use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::resources::{
    ActivePass, BindSetHandle, CommandBuffer, CommandBufferHandle, CommandBufferState, FrameBufferAttachment,
    FrameBufferHandle, IndexBufferHandle, PipelineHandle, RayTracePipelineHandle, RenderPassHandle, ShaderHandle,
    SwapChainHandle, VertexBufferHandle,
};
use crate::types::{ClearValue, ShaderStage, Viewport};

/// Index buffer and counts of an indexed draw
struct Indexed {
    buffer: IndexBufferHandle,
    index_count: u32,
}

impl<N: NativeDevice> Device<N> {
    /// Allocate a command buffer in the `Initial` state
    pub fn create_command_buffer(&mut self) -> DeviceResult<CommandBufferHandle> {
        self.check_alive()?;
        let cb = CommandBuffer::create(&self.native, self.command_pool)?;
        Ok(self.command_buffers.insert(cb))
    }

    /// Free a command buffer; waits for its last submission first
    pub fn destroy_command_buffer(&mut self, handle: CommandBufferHandle) -> DeviceResult<()> {
        let cb = lookup(&self.command_buffers, handle, "command buffer")?;
        if cb.state == CommandBufferState::Submitted {
            self.native
                .wait_for_fences(&[cb.fence], self.config.fence_timeout_ns)
                .map_err(|e| {
                    log::error!("Command buffer {:?} still executing: {}", handle, e);
                    e
                })?;
        }
        if let Some(cb) = self.command_buffers.remove(handle) {
            cb.destroy(&self.native, self.command_pool);
        }
        Ok(())
    }

    /// Current state; a finished submission reads as `Executable`
    pub fn command_buffer_state(&mut self, handle: CommandBufferHandle) -> DeviceResult<CommandBufferState> {
        lookup_mut(&mut self.command_buffers, handle, "command buffer")?.refresh_state(&self.native)
    }

    /// Return a command buffer to `Initial`
    ///
    /// Fails while its last submission has not finished.
    pub fn reset_command_buffer(&mut self, handle: CommandBufferHandle) -> DeviceResult<()> {
        let cb = lookup_mut(&mut self.command_buffers, handle, "command buffer")?;
        if cb.refresh_state(&self.native)? == CommandBufferState::Submitted {
            log::error!("Reset of command buffer {:?} before its fence signaled", handle);
            return Err(DeviceError::invalid_state("command buffer is still pending"));
        }
        self.native.reset_command_buffer(cb.buffer)?;
        cb.recycle_finished(&self.native)?;
        cb.state = CommandBufferState::Initial;
        cb.active_pass = None;
        cb.bound_pipeline = None;
        Ok(())
    }

    /// Start recording
    pub fn begin_command_buffer(&mut self, handle: CommandBufferHandle) -> DeviceResult<()> {
        let cb = lookup_mut(&mut self.command_buffers, handle, "command buffer")?;
        cb.refresh_state(&self.native)?;
        cb.expect_state(CommandBufferState::Initial, "begin_command_buffer")?;
        self.native
            .begin_command_buffer(cb.buffer, vk::CommandBufferUsageFlags::empty())
            .map_err(|e| {
                log::error!("Failed to begin command buffer {:?}: {}", handle, e);
                e
            })?;
        cb.state = CommandBufferState::Recording;
        cb.bound_pipeline = None;
        Ok(())
    }

    /// Finish recording
    pub fn end_command_buffer(&mut self, handle: CommandBufferHandle) -> DeviceResult<()> {
        let cb = lookup_mut(&mut self.command_buffers, handle, "command buffer")?;
        cb.expect_state(CommandBufferState::Recording, "end_command_buffer")?;
        if cb.active_pass.is_some() {
            log::error!("end_command_buffer inside a render pass");
            return Err(DeviceError::invalid_state("render pass still active"));
        }
        self.native.end_command_buffer(cb.buffer).map_err(|e| {
            log::error!("Failed to end command buffer {:?}: {}", handle, e);
            e
        })?;
        cb.state = CommandBufferState::Executable;
        Ok(())
    }

    /// Begin `render_pass` on `frame_buffer`
    ///
    /// Missing clear values default to black and depth 1.0.
    pub fn begin_render_pass(
        &mut self,
        cb: CommandBufferHandle,
        render_pass: RenderPassHandle,
        frame_buffer: FrameBufferHandle,
        clear_values: &[ClearValue],
    ) -> DeviceResult<()> {
        {
            let record = lookup(&self.command_buffers, cb, "command buffer")?;
            record.expect_state(CommandBufferState::Recording, "begin_render_pass")?;
            if record.active_pass.is_some() {
                log::error!("begin_render_pass while another pass is active");
                return Err(DeviceError::invalid_state("render pass already active"));
            }
        }

        let pass = lookup(&self.render_passes, render_pass, "render pass")?;
        let (pass_native, compat) = (pass.native, pass.compat.clone());
        let attachment_count = pass.desc.attachments.len();
        let depth_formats: Vec<bool> = pass.desc.attachments.iter().map(|a| a.format.is_depth()).collect();

        let fb = lookup(&self.frame_buffers, frame_buffer, "frame buffer")?;
        if fb.desc.attachments.len() != attachment_count {
            log::error!(
                "Frame buffer has {} attachments, render pass expects {}",
                fb.desc.attachments.len(),
                attachment_count
            );
            return Err(DeviceError::invalid_operation("frame buffer does not match render pass"));
        }
        let attachments = fb.desc.attachments.clone();
        let extent = vk::Extent2D {
            width: fb.desc.width,
            height: fb.desc.height,
        };

        // resolve every texture attachment so a destroyed one is caught even
        // when the native frame buffer already exists
        let mut views = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            views.push(match attachment {
                FrameBufferAttachment::Texture { texture, mip, layer } => {
                    lookup_mut(&mut self.textures, texture, "texture")?.attachment_view(&self.native, mip, layer)?
                }
                FrameBufferAttachment::External(view) => view,
            });
        }

        let fb = lookup_mut(&mut self.frame_buffers, frame_buffer, "frame buffer")?;
        let framebuffer = match fb.native_for(pass_native) {
            Some(framebuffer) => framebuffer,
            None => fb.create_native(&self.native, pass_native, &views)?,
        };

        let clears: Vec<vk::ClearValue> = depth_formats
            .iter()
            .enumerate()
            .map(|(i, &is_depth)| match clear_values.get(i) {
                Some(value) => value.to_vk(),
                None if is_depth => ClearValue::DepthStencil { depth: 1.0, stencil: 0 }.to_vk(),
                None => ClearValue::Color([0.0; 4]).to_vk(),
            })
            .collect();

        let record = lookup_mut(&mut self.command_buffers, cb, "command buffer")?;
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(pass_native)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .clear_values(&clears);
        self.native.cmd_begin_render_pass(record.buffer, &info);

        record.active_pass = Some(ActivePass {
            render_pass,
            native: pass_native,
            compat,
            extent,
        });
        record.bound_pipeline = None;
        Ok(())
    }

    /// End the active render pass
    pub fn end_render_pass(&mut self, cb: CommandBufferHandle) -> DeviceResult<()> {
        let record = lookup_mut(&mut self.command_buffers, cb, "command buffer")?;
        record.expect_pass("end_render_pass")?;
        self.native.cmd_end_render_pass(record.buffer);
        record.active_pass = None;
        record.bound_pipeline = None;
        Ok(())
    }

    /// Clear the color outputs and/or depth of the active pass over its whole extent
    pub fn clear(&mut self, cb: CommandBufferHandle, color: Option<[f32; 4]>, depth: Option<f32>) -> DeviceResult<()> {
        let record = lookup(&self.command_buffers, cb, "command buffer")?;
        let pass = record.expect_pass("clear")?;

        let mut attachments = Vec::new();
        if let Some(float32) = color {
            attachments.extend((0..pass.compat.colors.len() as u32).map(|i| vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: i,
                clear_value: vk::ClearValue {
                    color: vk::ClearColorValue { float32 },
                },
            }));
        }
        if let (Some(depth), Some((format, _))) = (depth, pass.compat.depth) {
            attachments.push(vk::ClearAttachment {
                aspect_mask: format.aspect(),
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
                },
            });
        }
        if attachments.is_empty() {
            return Ok(());
        }

        let rect = vk::ClearRect {
            rect: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: pass.extent,
            },
            base_array_layer: 0,
            layer_count: 1,
        };
        self.native.cmd_clear_attachments(record.buffer, &attachments, &[rect]);
        Ok(())
    }

    /// Non-indexed draw with `pipeline`
    pub fn draw(
        &mut self,
        cb: CommandBufferHandle,
        pipeline: PipelineHandle,
        vertex_buffers: &[VertexBufferHandle],
        vertex_count: u32,
        instance_count: u32,
    ) -> DeviceResult<()> {
        let buffer = self.prepare_draw(cb, pipeline, vertex_buffers, None)?;
        self.native.cmd_draw(buffer, vertex_count, instance_count, 0, 0);
        Ok(())
    }

    /// Indexed draw with `pipeline`
    pub fn draw_indexed(
        &mut self,
        cb: CommandBufferHandle,
        pipeline: PipelineHandle,
        vertex_buffers: &[VertexBufferHandle],
        index_buffer: IndexBufferHandle,
        index_count: u32,
        instance_count: u32,
    ) -> DeviceResult<()> {
        let indexed = Indexed {
            buffer: index_buffer,
            index_count,
        };
        let buffer = self.prepare_draw(cb, pipeline, vertex_buffers, Some(&indexed))?;
        self.native.cmd_draw_indexed(buffer, index_count, instance_count, 0, 0, 0);
        Ok(())
    }

    /// Flush bind sets, resolve layout and pipeline, then record every bind a draw needs
    fn prepare_draw(
        &mut self,
        cb: CommandBufferHandle,
        pipeline: PipelineHandle,
        vertex_buffers: &[VertexBufferHandle],
        indexed: Option<&Indexed>,
    ) -> DeviceResult<vk::CommandBuffer> {
        let record = lookup(&self.command_buffers, cb, "command buffer")?;
        let pass = record.expect_pass("draw")?.clone();
        let buffer = record.buffer;
        let bound = record.bound_pipeline;

        // geometry is resolved before anything is recorded
        let state = lookup(&self.pipelines, pipeline, "graphics pipeline")?;
        let expected_streams = state.vertex_stream_count();
        let set_handles = state.bind_sets().to_vec();
        if vertex_buffers.len() < expected_streams {
            log::error!(
                "Pipeline {:?} reads {} vertex streams, {} buffers given",
                pipeline,
                expected_streams,
                vertex_buffers.len()
            );
            return Err(DeviceError::invalid_operation("missing vertex buffers"));
        }
        let vertex_natives = vertex_buffers
            .iter()
            .map(|&h| lookup(&self.vertex_buffers, h, "vertex buffer").map(|b| b.buffer))
            .collect::<DeviceResult<Vec<_>>>()?;
        let index_binding = match indexed {
            Some(indexed) => {
                let index_buffer = lookup(&self.index_buffers, indexed.buffer, "index buffer")?;
                if indexed.index_count > index_buffer.index_count() {
                    log::error!(
                        "Draw of {} indices from a buffer holding {}",
                        indexed.index_count,
                        index_buffer.index_count()
                    );
                    return Err(DeviceError::OutOfBounds {
                        reason: format!("{} indices > {}", indexed.index_count, index_buffer.index_count()),
                    });
                }
                Some((index_buffer.buffer.buffer, index_buffer.format.to_vk()))
            }
            None => None,
        };

        let (set_layouts, descriptor_sets) = self.flush_bind_sets(&set_handles)?;

        // layout: re-fetched only when the shape changed
        let state = lookup_mut(&mut self.pipelines, pipeline, "graphics pipeline")?;
        let (push_data, push_stages) = state.push_constants();
        let layout_desc = PipelineLayoutDesc {
            set_layouts,
            push_constant_size: push_data.len() as u32,
            push_constant_stages: push_stages,
        };
        if state.layout_desc.as_ref() != Some(&layout_desc) {
            let layout = self.pipeline_layouts.fetch(&self.native, &layout_desc)?;
            if layout != state.native_layout {
                state.native_pipeline = vk::Pipeline::null();
                state.built_for = None;
            }
            state.native_layout = layout;
            state.layout_desc = Some(layout_desc);
        }

        // pipeline: rebuilt when invalidated or used with an incompatible pass
        if state.native_pipeline == vk::Pipeline::null() || state.built_for.as_ref() != Some(&pass.compat) {
            let mut stages = Vec::new();
            for (stage, handle) in state.shader_stages() {
                let shader = lookup(&self.shaders, handle, "shader")?;
                if shader.stage != stage {
                    log::error!("{:?} shader bound to the {:?} stage", shader.stage, stage);
                    return Err(DeviceError::invalid_operation("shader stage mismatch"));
                }
                stages.push((stage, shader.module));
            }
            if !stages.iter().any(|(stage, _)| *stage == ShaderStage::Vertex) {
                log::error!("Pipeline {:?} has no vertex shader", pipeline);
                return Err(DeviceError::invalid_state("graphics pipeline needs a vertex shader"));
            }
            let desc = state.desc(stages, state.native_layout, pass.compat.clone());
            state.native_pipeline = self.pipeline_cache.fetch(&self.native, &desc, pass.native)?;
            state.built_for = Some(pass.compat.clone());
        }

        let native = &self.native;
        if bound != Some((pipeline, state.native_pipeline)) {
            native.cmd_bind_pipeline(buffer, vk::PipelineBindPoint::GRAPHICS, state.native_pipeline);
        }
        bind_descriptor_runs(
            native,
            buffer,
            vk::PipelineBindPoint::GRAPHICS,
            state.native_layout,
            &descriptor_sets,
        );

        let (push_data, push_stages) = state.push_constants();
        if !push_data.is_empty() {
            native.cmd_push_constants(buffer, state.native_layout, push_stages.to_vk(), 0, push_data);
        }

        let viewport = state
            .viewport()
            .unwrap_or_else(|| Viewport::full(pass.extent.width, pass.extent.height));
        native.cmd_set_viewport(buffer, viewport.to_vk());
        let scissor = state.scissor().map_or(
            vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: pass.extent,
            },
            |rect| rect.to_vk(),
        );
        native.cmd_set_scissor(buffer, scissor);

        let native_pipeline = state.native_pipeline;
        if !vertex_natives.is_empty() {
            let offsets = vec![0; vertex_natives.len()];
            native.cmd_bind_vertex_buffers(buffer, 0, &vertex_natives, &offsets);
        }
        if let Some((index_buffer, index_type)) = index_binding {
            native.cmd_bind_index_buffer(buffer, index_buffer, 0, index_type);
        }

        if let Some(record) = self.command_buffers.get_mut(cb) {
            record.bound_pipeline = Some((pipeline, native_pipeline));
        }
        Ok(buffer)
    }

    /// Flush each bind set; returns the set layout and native set per index
    ///
    /// Gaps get the empty set layout and no native set.
    fn flush_bind_sets(
        &mut self,
        set_handles: &[Option<BindSetHandle>],
    ) -> DeviceResult<(Vec<vk::DescriptorSetLayout>, Vec<Option<vk::DescriptorSet>>)> {
        let mut set_layouts = Vec::with_capacity(set_handles.len());
        let mut descriptor_sets = Vec::with_capacity(set_handles.len());
        for (index, handle) in set_handles.iter().enumerate() {
            match *handle {
                Some(handle) => {
                    if cfg!(debug_assertions) {
                        let set = lookup(&self.bind_sets, handle, "bind set")?;
                        self.check_bind_set_sources(handle, set)?;
                    }
                    let set = lookup_mut(&mut self.bind_sets, handle, "bind set")?;
                    let native_set = set.flush(&self.native, &mut self.set_layouts, self.descriptor_pool)?;
                    set_layouts.push(set.native_layout());
                    descriptor_sets.push(Some(native_set));
                }
                None => {
                    log::trace!("No bind set at index {}", index);
                    let empty = self.set_layouts.fetch(&self.native, &Default::default())?;
                    set_layouts.push(empty);
                    descriptor_sets.push(None);
                }
            }
        }
        Ok((set_layouts, descriptor_sets))
    }

    /// Module of `handle`, which must have been created for `stage`
    fn shader_module(&self, handle: ShaderHandle, stage: ShaderStage) -> DeviceResult<vk::ShaderModule> {
        let shader = lookup(&self.shaders, handle, "shader")?;
        if shader.stage != stage {
            log::error!("{:?} shader bound to the {:?} stage", shader.stage, stage);
            return Err(DeviceError::invalid_operation("shader stage mismatch"));
        }
        Ok(shader.module)
    }

    /// Trace a `width × height × depth` grid of rays with `pipeline`
    ///
    /// Recorded outside render passes. Bind sets are flushed the same way a
    /// draw flushes them. The native pipeline and its binding table are
    /// fetched again only after a setter invalidated them.
    pub fn trace_rays(
        &mut self,
        cb: CommandBufferHandle,
        pipeline: RayTracePipelineHandle,
        width: u32,
        height: u32,
        depth: u32,
    ) -> DeviceResult<()> {
        let record = lookup(&self.command_buffers, cb, "command buffer")?;
        record.expect_state(CommandBufferState::Recording, "trace_rays")?;
        if record.active_pass.is_some() {
            log::error!("trace_rays inside a render pass");
            return Err(DeviceError::invalid_state("rays cannot be traced inside a render pass"));
        }
        let buffer = record.buffer;

        // shaders are resolved before anything is recorded
        let state = lookup(&self.ray_trace_pipelines, pipeline, "ray-trace pipeline")?;
        let set_handles = state.bind_sets().to_vec();
        let raygen = match state.raygen() {
            Some(handle) => self.shader_module(handle, ShaderStage::RayGen)?,
            None => {
                log::error!("Ray-trace pipeline {:?} has no ray-generation shader", pipeline);
                return Err(DeviceError::invalid_state("ray-trace pipeline needs a ray-generation shader"));
            }
        };
        let miss = state
            .miss()
            .iter()
            .map(|&handle| self.shader_module(handle, ShaderStage::Miss))
            .collect::<DeviceResult<Vec<_>>>()?;
        let hit_groups = state
            .hit_groups()
            .iter()
            .map(|group| -> DeviceResult<HitGroup> {
                Ok(HitGroup {
                    closest_hit: self.shader_module(group.closest_hit, ShaderStage::ClosestHit)?,
                    any_hit: group
                        .any_hit
                        .map(|handle| self.shader_module(handle, ShaderStage::AnyHit))
                        .transpose()?,
                })
            })
            .collect::<DeviceResult<Vec<_>>>()?;
        let max_recursion_depth = state.max_recursion_depth();

        let (set_layouts, descriptor_sets) = self.flush_bind_sets(&set_handles)?;

        let state = lookup_mut(&mut self.ray_trace_pipelines, pipeline, "ray-trace pipeline")?;
        let (push_data, push_stages) = state.push_constants();
        let layout_desc = PipelineLayoutDesc {
            set_layouts,
            push_constant_size: push_data.len() as u32,
            push_constant_stages: push_stages,
        };
        if state.layout_desc.as_ref() != Some(&layout_desc) {
            let layout = self.pipeline_layouts.fetch(&self.native, &layout_desc)?;
            if layout != state.native_layout {
                state.native_pipeline = vk::Pipeline::null();
            }
            state.native_layout = layout;
            state.layout_desc = Some(layout_desc);
        }

        if state.native_pipeline == vk::Pipeline::null() {
            let desc = RayTracePipelineDesc {
                raygen,
                miss,
                hit_groups,
                max_recursion_depth,
                layout: state.native_layout,
            };
            let table = self.ray_trace_cache.fetch(&self.native, &self.native.limits(), &desc)?;
            state.native_pipeline = table.pipeline;
            state.regions = table.regions;
        }

        let native = &self.native;
        native.cmd_bind_pipeline(buffer, vk::PipelineBindPoint::RAY_TRACING_KHR, state.native_pipeline);
        bind_descriptor_runs(
            native,
            buffer,
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            state.native_layout,
            &descriptor_sets,
        );
        let (push_data, push_stages) = state.push_constants();
        if !push_data.is_empty() {
            native.cmd_push_constants(buffer, state.native_layout, push_stages.to_vk(), 0, push_data);
        }
        native.cmd_trace_rays(buffer, &state.regions, width, height, depth);
        Ok(())
    }

    /// Submit without extra synchronization
    ///
    /// Signals only the fence; nothing can wait on this submission on the GPU.
    pub fn submit(&mut self, cb: CommandBufferHandle) -> DeviceResult<()> {
        self.submit_with(cb, None, &[], false)
    }

    /// Submit `cb` after the swap chain's acquired image and `wait_on` finished
    ///
    /// Always signals `cb`'s finished semaphore for a later submission or
    /// present. The acquired image is waited on by the first submission after
    /// `acquire` only.
    pub fn submit_synced(
        &mut self,
        cb: CommandBufferHandle,
        swap_chain: Option<SwapChainHandle>,
        wait_on: &[CommandBufferHandle],
    ) -> DeviceResult<()> {
        self.submit_with(cb, swap_chain, wait_on, true)
    }

    fn submit_with(
        &mut self,
        cb: CommandBufferHandle,
        swap_chain: Option<SwapChainHandle>,
        wait_on: &[CommandBufferHandle],
        signal: bool,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        let record = lookup(&self.command_buffers, cb, "command buffer")?;
        record.expect_state(CommandBufferState::Executable, "submit")?;
        let buffer = record.buffer;
        if wait_on.contains(&cb) {
            log::error!("Command buffer {:?} waits on itself", cb);
            return Err(DeviceError::invalid_operation("submission waits on itself"));
        }

        let mut wait_semaphores = Vec::new();
        let mut wait_stages = Vec::new();
        for &other in wait_on {
            let dependency = lookup(&self.command_buffers, other, "command buffer")?;
            if !dependency.signal_pending {
                log::error!(
                    "Submission waits on command buffer {:?} in {:?}; it must be submitted with a signal first",
                    other,
                    dependency.state
                );
                return Err(DeviceError::invalid_state("waited command buffer signals nothing"));
            }
            wait_semaphores.push(dependency.finished);
            wait_stages.push(vk::PipelineStageFlags::ALL_COMMANDS);
        }

        let mut waits_acquire = false;
        if let Some(handle) = swap_chain {
            let sc = lookup(&self.swap_chains, handle, "swap chain")?;
            if sc.current_image.is_none() {
                log::error!("Submission synced to swap chain {:?} without an acquired image", handle);
                return Err(DeviceError::invalid_state("no swap-chain image acquired"));
            }
            if !sc.acquire_consumed {
                wait_semaphores.push(sc.ring.current());
                wait_stages.push(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
                waits_acquire = true;
            }
        }

        let record = lookup_mut(&mut self.command_buffers, cb, "command buffer")?;
        let mut signals = Vec::new();
        if signal {
            record.recycle_finished(&self.native)?;
            signals.push(record.finished);
        }
        let fence = record.fence;

        self.native.reset_fences(&[fence])?;
        let buffers = [buffer];
        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signals)
            .build();
        if let Err(e) = self.native.queue_submit(&[submit], fence) {
            log::error!("Queue submit of {:?} failed: {}", cb, e);
            if let Err(restore) = record.restore_fence(&self.native) {
                log::error!("Fence of {:?} left unsignaled: {}", cb, restore);
            }
            return Err(e);
        }

        record.state = CommandBufferState::Submitted;
        record.signal_pending = signal;
        for &other in wait_on {
            if let Some(dependency) = self.command_buffers.get_mut(other) {
                dependency.signal_pending = false;
            }
        }
        if waits_acquire {
            if let Some(sc) = swap_chain.and_then(|handle| self.swap_chains.get_mut(handle)) {
                sc.acquire_consumed = true;
            }
        }
        Ok(())
    }
}

/// Bind contiguous runs of present sets; gaps are left unbound
fn bind_descriptor_runs<N: NativeDevice>(
    native: &N,
    buffer: vk::CommandBuffer,
    bind_point: vk::PipelineBindPoint,
    layout: vk::PipelineLayout,
    sets: &[Option<vk::DescriptorSet>],
) {
    let mut first = 0;
    while first < sets.len() {
        let run: Vec<vk::DescriptorSet> = sets[first..].iter().map_while(|s| *s).collect();
        if run.is_empty() {
            first += 1;
            continue;
        }
        native.cmd_bind_descriptor_sets(buffer, bind_point, layout, first as u32, &run);
        first += run.len();
    }
}
