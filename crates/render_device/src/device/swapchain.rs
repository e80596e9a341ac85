//! Swap-chain creation, the acquire/present loop and resize handling

use ash::vk;

use super::{lookup, lookup_mut, Device};
use crate::builders::{AttachmentDesc, RenderPassDescription};
use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::resources::{
    CommandBufferHandle, CommandBufferState, FrameBufferAttachment, FrameBufferDescription, FrameBufferHandle,
    RenderPassHandle, SwapChainHandle, TextureDescription, TextureHandle,
};
use crate::swapchain::{is_stale, FrameRing, NativeSwapChain, SurfaceChoice, SwapChain};
use crate::types::{Format, ImageLayout, LoadOp, SampleCount, StoreOp, TextureUsage};

/// Scratch attachments and per-image frame buffers of one swap chain
struct SwapTargets {
    depth: Option<TextureHandle>,
    msaa_color: Option<TextureHandle>,
    frame_buffers: Vec<FrameBufferHandle>,
}

/// Render pass drawing straight into swap-chain images
///
/// Multisampled chains render into a scratch color target resolved into the
/// swap image, which is then the last attachment.
fn swap_chain_pass(format: Format, depth_format: Option<Format>, samples: SampleCount) -> RenderPassDescription {
    let mut desc = RenderPassDescription::default();
    let presented = AttachmentDesc::color(format, SampleCount::X1, LoadOp::Clear).with_final_layout(ImageLayout::Present);

    if samples == SampleCount::X1 {
        desc.attachments.push(presented);
    } else {
        desc.attachments.push(
            AttachmentDesc::color(format, samples, LoadOp::Clear)
                .with_store_op(StoreOp::DontCare)
                .with_final_layout(ImageLayout::ColorAttachment),
        );
    }
    desc.color.push(0);

    if let Some(depth_format) = depth_format {
        desc.depth = Some(desc.attachments.len() as u32);
        desc.attachments.push(
            AttachmentDesc::depth(depth_format, samples, LoadOp::Clear)
                .with_store_op(StoreOp::DontCare)
                .with_final_layout(ImageLayout::DepthStencilAttachment),
        );
    }

    if samples != SampleCount::X1 {
        desc.resolve.push(desc.attachments.len() as u32);
        desc.attachments.push(AttachmentDesc {
            load_op: LoadOp::DontCare,
            ..presented
        });
    }
    desc
}

impl<N: NativeDevice> Device<N> {
    /// Create a swap chain on the device's surface
    ///
    /// The size is a request; surfaces with a fixed extent override it.
    pub fn create_swap_chain(&mut self, width: u32, height: u32) -> DeviceResult<SwapChainHandle> {
        self.check_alive()?;
        let config = self.config.swap_chain.clone();
        let choice = self.surface_choice(width, height)?;

        let mut native = NativeSwapChain::create(&self.native, &choice, vk::SwapchainKHR::null())?;
        let render_pass = match self.create_render_pass(swap_chain_pass(choice.format, config.depth_format, config.samples)) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                native.destroy(&self.native);
                return Err(e);
            }
        };
        let targets = match self.create_swap_targets(&native.views, native.extent, render_pass, choice.format) {
            Ok(targets) => targets,
            Err(e) => {
                let _ = self.destroy_render_pass(render_pass);
                native.destroy(&self.native);
                return Err(e);
            }
        };
        let ring = match FrameRing::create(&self.native, native.images.len()) {
            Ok(ring) => ring,
            Err(e) => {
                self.destroy_swap_targets(targets);
                let _ = self.destroy_render_pass(render_pass);
                native.destroy(&self.native);
                return Err(e);
            }
        };

        Ok(self.swap_chains.insert(SwapChain {
            native,
            samples: config.samples,
            depth_format: config.depth_format,
            render_pass,
            frame_buffers: targets.frame_buffers,
            depth: targets.depth,
            msaa_color: targets.msaa_color,
            ring,
            current_image: None,
            acquire_consumed: false,
        }))
    }

    fn surface_choice(&self, width: u32, height: u32) -> DeviceResult<SurfaceChoice> {
        if width == 0 || height == 0 {
            log::error!("Swap chain requested with zero extent {}x{}", width, height);
            return Err(DeviceError::invalid_state("swap chain extent is zero"));
        }
        let choice = SurfaceChoice::query(&self.native, &self.config.swap_chain, width, height)?;
        if choice.extent.width == 0 || choice.extent.height == 0 {
            log::warn!("Surface has zero extent; window is probably minimized");
            return Err(DeviceError::invalid_state("surface extent is zero"));
        }
        Ok(choice)
    }

    fn create_swap_targets(
        &mut self,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
        render_pass: RenderPassHandle,
        format: Format,
    ) -> DeviceResult<SwapTargets> {
        let mut targets = SwapTargets {
            depth: None,
            msaa_color: None,
            frame_buffers: Vec::with_capacity(views.len()),
        };

        let result = self.fill_swap_targets(&mut targets, views, extent, format);
        match result {
            Ok(()) => {
                log::debug!(
                    "Swap-chain targets for {:?}: {} frame buffers, depth {:?}, msaa {:?}",
                    render_pass,
                    targets.frame_buffers.len(),
                    targets.depth.is_some(),
                    targets.msaa_color.is_some()
                );
                Ok(targets)
            }
            Err(e) => {
                self.destroy_swap_targets(targets);
                Err(e)
            }
        }
    }

    fn fill_swap_targets(
        &mut self,
        targets: &mut SwapTargets,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
        format: Format,
    ) -> DeviceResult<()> {
        let (samples, depth_format) = (self.config.swap_chain.samples, self.config.swap_chain.depth_format);
        if let Some(depth_format) = depth_format {
            let desc = TextureDescription {
                samples,
                usage: TextureUsage::DEPTH_STENCIL_ATTACHMENT,
                ..TextureDescription::new_2d(extent.width, extent.height, depth_format)
            };
            targets.depth = Some(self.create_texture(desc, None)?);
        }
        if samples != SampleCount::X1 {
            let desc = TextureDescription {
                samples,
                usage: TextureUsage::COLOR_ATTACHMENT,
                ..TextureDescription::new_2d(extent.width, extent.height, format)
            };
            targets.msaa_color = Some(self.create_texture(desc, None)?);
        }

        for &view in views {
            let mut attachments = Vec::with_capacity(3);
            match targets.msaa_color {
                Some(msaa) => attachments.push(FrameBufferAttachment::texture(msaa)),
                None => attachments.push(FrameBufferAttachment::External(view)),
            }
            if let Some(depth) = targets.depth {
                attachments.push(FrameBufferAttachment::texture(depth));
            }
            if targets.msaa_color.is_some() {
                attachments.push(FrameBufferAttachment::External(view));
            }
            let framebuffer = self.create_frame_buffer(FrameBufferDescription {
                attachments,
                width: extent.width,
                height: extent.height,
            })?;
            targets.frame_buffers.push(framebuffer);
        }
        Ok(())
    }

    fn destroy_swap_targets(&mut self, targets: SwapTargets) {
        for framebuffer in targets.frame_buffers {
            let _ = self.destroy_frame_buffer(framebuffer);
        }
        for texture in targets.depth.into_iter().chain(targets.msaa_color) {
            let _ = self.destroy_texture(texture);
        }
    }

    /// Destroy a swap chain after the GPU went idle
    pub fn destroy_swap_chain(&mut self, handle: SwapChainHandle) -> DeviceResult<()> {
        lookup(&self.swap_chains, handle, "swap chain")?;
        self.wait_idle()?;
        if let Some(mut sc) = self.swap_chains.remove(handle) {
            self.destroy_swap_targets(SwapTargets {
                depth: sc.depth,
                msaa_color: sc.msaa_color,
                frame_buffers: std::mem::take(&mut sc.frame_buffers),
            });
            let _ = self.destroy_render_pass(sc.render_pass);
            sc.ring.destroy(&self.native);
            sc.native.destroy(&self.native);
        }
        Ok(())
    }

    /// Acquire the next image
    ///
    /// Returns `Ok(false)` when the swap chain is stale; call [`Self::reinit`]
    /// and skip the frame.
    pub fn acquire(&mut self, handle: SwapChainHandle) -> DeviceResult<bool> {
        self.check_alive()?;
        let timeout = self.config.fence_timeout_ns;
        let sc = lookup_mut(&mut self.swap_chains, handle, "swap chain")?;
        let semaphore = sc.ring.advance();

        match self.native.acquire_next_image(sc.native.handle, semaphore, timeout) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::warn!("Swap chain {:?} is suboptimal; consider reinit", handle);
                }
                sc.current_image = Some(index);
                sc.acquire_consumed = false;
                Ok(true)
            }
            Err(DeviceError::Api(result)) if is_stale(result) => {
                log::warn!("Acquire on swap chain {:?} reported {:?}", handle, result);
                sc.current_image = None;
                Ok(false)
            }
            Err(e) => {
                log::error!("Acquire on swap chain {:?} failed: {}", handle, e);
                sc.current_image = None;
                Err(e)
            }
        }
    }

    /// Present the acquired image once `wait_on` finished rendering
    ///
    /// Returns `Ok(false)` when the swap chain is stale or suboptimal.
    pub fn present(&mut self, handle: SwapChainHandle, wait_on: &[CommandBufferHandle]) -> DeviceResult<bool> {
        self.check_alive()?;
        let mut wait_semaphores = Vec::with_capacity(wait_on.len() + 1);
        for &cb in wait_on {
            let record = lookup(&self.command_buffers, cb, "command buffer")?;
            if !record.signal_pending {
                log::error!("Present waits on command buffer {:?} in {:?} that signals nothing", cb, record.state);
                return Err(DeviceError::invalid_state("present waits on a command buffer without a pending signal"));
            }
            wait_semaphores.push(record.finished);
        }

        let sc = lookup_mut(&mut self.swap_chains, handle, "swap chain")?;
        let image = sc.current_image.take().ok_or_else(|| {
            log::error!("Present on swap chain {:?} without an acquired image", handle);
            DeviceError::invalid_state("no swap-chain image acquired")
        })?;
        if !sc.acquire_consumed {
            // nothing rendered to the image; wait for the acquire itself
            wait_semaphores.push(sc.ring.current());
        }

        let swapchains = [sc.native.handle];
        let indices = [image];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let presented = match self.native.queue_present(&info) {
            Ok(false) => true,
            Ok(true) => {
                log::warn!("Present on swap chain {:?} is suboptimal", handle);
                false
            }
            Err(DeviceError::Api(result)) if is_stale(result) => {
                log::warn!("Present on swap chain {:?} reported {:?}", handle, result);
                false
            }
            Err(e) => {
                log::error!("Present on swap chain {:?} failed: {}", handle, e);
                return Err(e);
            }
        };

        // the queue consumed every wait, stale or not
        sc.acquire_consumed = true;
        for &cb in wait_on {
            if let Some(record) = self.command_buffers.get_mut(cb) {
                record.signal_pending = false;
            }
        }
        Ok(presented)
    }

    /// Rebuild the resolution-dependent parts of a swap chain
    ///
    /// The render pass is kept unless the surface format changed; the image
    /// ring only grows or shrinks when the image count changed.
    pub fn reinit(&mut self, handle: SwapChainHandle, width: u32, height: u32) -> DeviceResult<()> {
        self.check_alive()?;
        lookup(&self.swap_chains, handle, "swap chain")?;
        self.wait_idle()?;
        let choice = self.surface_choice(width, height)?;

        let sc = lookup_mut(&mut self.swap_chains, handle, "swap chain")?;
        let rebuilt = NativeSwapChain::create(&self.native, &choice, sc.native.handle)?;
        let mut retired = std::mem::replace(&mut sc.native, rebuilt);
        retired.destroy(&self.native);

        let old_targets = SwapTargets {
            depth: sc.depth.take(),
            msaa_color: sc.msaa_color.take(),
            frame_buffers: std::mem::take(&mut sc.frame_buffers),
        };
        let old_pass = sc.render_pass;
        let views = sc.native.views.clone();
        let extent = sc.native.extent;
        let image_count = sc.native.images.len();
        let format_changed = retired.format != choice.format;
        sc.current_image = None;
        sc.acquire_consumed = false;

        self.destroy_swap_targets(old_targets);

        let render_pass = if format_changed {
            log::info!("Surface format changed to {:?}; rebuilding render pass", choice.format);
            let (depth_format, samples) = (self.config.swap_chain.depth_format, self.config.swap_chain.samples);
            let pass = self.create_render_pass(swap_chain_pass(choice.format, depth_format, samples))?;
            let _ = self.destroy_render_pass(old_pass);
            pass
        } else {
            old_pass
        };

        let targets = self.create_swap_targets(&views, extent, render_pass, choice.format)?;

        let sc = lookup_mut(&mut self.swap_chains, handle, "swap chain")?;
        sc.render_pass = render_pass;
        sc.depth = targets.depth;
        sc.msaa_color = targets.msaa_color;
        sc.frame_buffers = targets.frame_buffers;
        if sc.ring.len() != image_count {
            sc.ring.resize(&self.native, image_count)?;
        }

        log::info!(
            "Swap chain {:?} reinitialized at {}x{} ({} images)",
            handle,
            extent.width,
            extent.height,
            image_count
        );
        Ok(())
    }

    /// Render pass that draws into the swap-chain images
    pub fn swap_chain_render_pass(&self, handle: SwapChainHandle) -> DeviceResult<RenderPassHandle> {
        Ok(lookup(&self.swap_chains, handle, "swap chain")?.render_pass)
    }

    /// Frame buffer of the currently acquired image
    pub fn swap_chain_frame_buffer(&self, handle: SwapChainHandle) -> DeviceResult<FrameBufferHandle> {
        lookup(&self.swap_chains, handle, "swap chain")?.current_frame_buffer()
    }

    /// Extent of the swap-chain images
    pub fn swap_chain_extent(&self, handle: SwapChainHandle) -> DeviceResult<(u32, u32)> {
        let extent = lookup(&self.swap_chains, handle, "swap chain")?.native.extent;
        Ok((extent.width, extent.height))
    }

    /// Number of swap-chain images
    pub fn swap_chain_image_count(&self, handle: SwapChainHandle) -> DeviceResult<u32> {
        Ok(lookup(&self.swap_chains, handle, "swap chain")?.native.images.len() as u32)
    }

    /// Position of the image-available ring cursor
    pub fn swap_chain_frame_index(&self, handle: SwapChainHandle) -> DeviceResult<usize> {
        Ok(lookup(&self.swap_chains, handle, "swap chain")?.ring.cursor())
    }

    /// Format of the swap-chain images
    pub fn swap_chain_format(&self, handle: SwapChainHandle) -> DeviceResult<Format> {
        Ok(lookup(&self.swap_chains, handle, "swap chain")?.native.format)
    }

    /// Sample count and depth format the swap chain renders with
    pub fn swap_chain_attachments(&self, handle: SwapChainHandle) -> DeviceResult<(SampleCount, Option<Format>)> {
        let sc = lookup(&self.swap_chains, handle, "swap chain")?;
        Ok((sc.samples, sc.depth_format))
    }
}
