//! Render pass and frame buffer records

use ash::vk;

use super::TextureHandle;
use crate::builders::{RenderPassCompat, RenderPassDescription};
use crate::error::DeviceResult;
use crate::native::NativeDevice;

/// Render pass: the description and its cached native object
///
/// The native pass is owned by the render-pass cache; destroying the record
/// does not destroy it.
pub(crate) struct RenderPass {
    pub desc: RenderPassDescription,
    pub native: vk::RenderPass,
    pub compat: RenderPassCompat,
}

/// Image bound to one frame-buffer attachment slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBufferAttachment {
    /// One mip of one layer of a device texture
    Texture {
        /// Texture handle
        texture: TextureHandle,
        /// Mip level
        mip: u32,
        /// Array layer
        layer: u32,
    },
    /// View owned elsewhere, e.g. a swap-chain image
    External(vk::ImageView),
}

impl FrameBufferAttachment {
    /// Mip 0, layer 0 of `texture`
    pub fn texture(texture: TextureHandle) -> Self {
        Self::Texture { texture, mip: 0, layer: 0 }
    }
}

/// Concrete attachments, in the order of the render pass attachment table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBufferDescription {
    /// Attachments by render-pass attachment index
    pub attachments: Vec<FrameBufferAttachment>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Frame buffer with one native object per render pass it was used with
pub(crate) struct FrameBuffer {
    pub desc: FrameBufferDescription,
    natives: Vec<(vk::RenderPass, vk::Framebuffer)>,
}

impl FrameBuffer {
    pub fn new(desc: FrameBufferDescription) -> Self {
        Self {
            desc,
            natives: Vec::new(),
        }
    }

    /// Native frame buffer for `render_pass`, if one was built
    pub fn native_for(&self, render_pass: vk::RenderPass) -> Option<vk::Framebuffer> {
        self.natives
            .iter()
            .find(|(pass, _)| *pass == render_pass)
            .map(|&(_, framebuffer)| framebuffer)
    }

    /// Build the native frame buffer for `render_pass` from resolved `views`
    pub fn create_native<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
    ) -> DeviceResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(views)
            .width(self.desc.width)
            .height(self.desc.height)
            .layers(1);

        let framebuffer = native.create_framebuffer(&info).map_err(|e| {
            log::error!(
                "Failed to create {}x{} framebuffer with {} attachments: {}",
                self.desc.width,
                self.desc.height,
                views.len(),
                e
            );
            e
        })?;
        log::debug!("Framebuffer {:?} created for render pass {:?}", framebuffer, render_pass);
        self.natives.push((render_pass, framebuffer));
        Ok(framebuffer)
    }

    /// Number of native frame buffers built so far
    pub fn native_count(&self) -> usize {
        self.natives.len()
    }

    /// Destroy every native frame buffer
    pub fn destroy<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        for (_, framebuffer) in self.natives.drain(..) {
            native.destroy_framebuffer(framebuffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::RecordingDevice;
    use ash::vk::Handle;

    #[test]
    fn test_native_built_once_per_render_pass() {
        let native = RecordingDevice::new();
        let mut framebuffer = FrameBuffer::new(FrameBufferDescription {
            attachments: vec![FrameBufferAttachment::External(vk::ImageView::from_raw(5))],
            width: 640,
            height: 480,
        });
        let pass = vk::RenderPass::from_raw(9);

        assert_eq!(framebuffer.native_for(pass), None);
        let built = framebuffer
            .create_native(&native, pass, &[vk::ImageView::from_raw(5)])
            .unwrap();
        assert_eq!(framebuffer.native_for(pass), Some(built));
        assert_eq!(framebuffer.native_count(), 1);

        framebuffer.destroy(&native);
        assert_eq!(native.calls("destroy_framebuffer"), 1);
        assert_eq!(framebuffer.native_for(pass), None);
    }
}
