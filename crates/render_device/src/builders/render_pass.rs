//! Render pass descriptions and builder

use ash::vk;

use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::types::{Format, ImageLayout, LoadOp, SampleCount, StoreOp};

/// One attachment of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    /// Texel format
    pub format: Format,
    /// Sample count
    pub samples: SampleCount,
    /// Load behaviour for color/depth
    pub load_op: LoadOp,
    /// Store behaviour for color/depth
    pub store_op: StoreOp,
    /// Load behaviour for stencil
    pub stencil_load_op: LoadOp,
    /// Store behaviour for stencil
    pub stencil_store_op: StoreOp,
    /// Layout the image is in when the pass begins
    pub initial_layout: ImageLayout,
    /// Layout the image is left in when the pass ends
    pub final_layout: ImageLayout,
}

impl AttachmentDesc {
    /// Color attachment that ends up sampled by a later pass
    pub fn color(format: Format, samples: SampleCount, load_op: LoadOp) -> Self {
        Self {
            format,
            samples,
            load_op,
            store_op: StoreOp::Store,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            initial_layout: if load_op == LoadOp::Load {
                ImageLayout::ShaderReadOnly
            } else {
                ImageLayout::Undefined
            },
            final_layout: ImageLayout::ShaderReadOnly,
        }
    }

    /// Depth attachment, stored so it can be sampled afterwards
    pub fn depth(format: Format, samples: SampleCount, load_op: LoadOp) -> Self {
        Self {
            format,
            samples,
            load_op,
            store_op: StoreOp::Store,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            initial_layout: if load_op == LoadOp::Load {
                ImageLayout::DepthStencilReadOnly
            } else {
                ImageLayout::Undefined
            },
            final_layout: ImageLayout::DepthStencilReadOnly,
        }
    }

    /// Override the final layout
    pub fn with_final_layout(mut self, layout: ImageLayout) -> Self {
        self.final_layout = layout;
        self
    }

    /// Override the store op
    pub fn with_store_op(mut self, store_op: StoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    fn to_vk(self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::builder()
            .format(self.format.to_vk())
            .samples(self.samples.to_vk())
            .load_op(self.load_op.to_vk())
            .store_op(self.store_op.to_vk())
            .stencil_load_op(self.stencil_load_op.to_vk())
            .stencil_store_op(self.stencil_store_op.to_vk())
            .initial_layout(self.initial_layout.to_vk())
            .final_layout(self.final_layout.to_vk())
            .build()
    }
}

/// Immutable single-subpass render pass description
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassDescription {
    /// Attachment table
    pub attachments: Vec<AttachmentDesc>,
    /// Indices into `attachments` used as color outputs, in location order
    pub color: Vec<u32>,
    /// Index used as depth/stencil
    pub depth: Option<u32>,
    /// Resolve targets, one per color output when multisampling
    pub resolve: Vec<u32>,
}

/// What makes two render passes compatible for pipeline use
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassCompat {
    /// Format and samples of each color output
    pub colors: Vec<(Format, SampleCount)>,
    /// Format and samples of the depth attachment
    pub depth: Option<(Format, SampleCount)>,
    /// Formats of the resolve targets
    pub resolves: Vec<Format>,
}

impl RenderPassDescription {
    /// Check the references against the attachment table
    pub fn validate(&self) -> DeviceResult<()> {
        let count = self.attachments.len() as u32;
        let out_of_range = self
            .color
            .iter()
            .chain(self.depth.iter())
            .chain(self.resolve.iter())
            .find(|&&index| index >= count);
        if let Some(index) = out_of_range {
            return Err(DeviceError::OutOfBounds {
                reason: format!("attachment reference {} but only {} attachments", index, count),
            });
        }

        if !self.resolve.is_empty() && self.resolve.len() != self.color.len() {
            return Err(DeviceError::invalid_operation(
                "resolve references must match color references one to one",
            ));
        }

        if let Some(depth) = self.depth {
            if !self.attachments[depth as usize].format.is_depth() {
                return Err(DeviceError::invalid_operation("depth reference is not a depth format"));
            }
        }
        Ok(())
    }

    /// Sample count of the subpass
    pub fn samples(&self) -> SampleCount {
        self.color
            .iter()
            .chain(self.depth.iter())
            .map(|&i| self.attachments[i as usize].samples)
            .next()
            .unwrap_or_default()
    }

    /// Number of color outputs
    pub fn color_count(&self) -> u32 {
        self.color.len() as u32
    }

    /// Compatibility key
    pub fn compat(&self) -> RenderPassCompat {
        let attachment = |i: &u32| self.attachments[*i as usize];
        RenderPassCompat {
            colors: self
                .color
                .iter()
                .map(|i| {
                    let a = attachment(i);
                    (a.format, a.samples)
                })
                .collect(),
            depth: self.depth.as_ref().map(|i| {
                let a = attachment(i);
                (a.format, a.samples)
            }),
            resolves: self.resolve.iter().map(|i| attachment(i).format).collect(),
        }
    }
}

/// Render pass builder
#[derive(Default)]
pub struct RenderPassBuilder {
    attachments: Vec<vk::AttachmentDescription>,
    color_refs: Vec<vk::AttachmentReference>,
    depth_ref: Option<vk::AttachmentReference>,
    resolve_refs: Vec<vk::AttachmentReference>,
}

impl RenderPassBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attachment
    pub fn add_attachment(mut self, attachment: AttachmentDesc) -> Self {
        self.attachments.push(attachment.to_vk());
        self
    }

    /// Use attachment `index` as the next color output
    pub fn add_color_reference(mut self, index: u32) -> Self {
        self.color_refs.push(vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
        self
    }

    /// Use attachment `index` as depth/stencil
    pub fn depth_reference(mut self, index: u32) -> Self {
        self.depth_ref = Some(vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        self
    }

    /// Use attachment `index` as the resolve target of the next color output
    pub fn add_resolve_reference(mut self, index: u32) -> Self {
        self.resolve_refs.push(vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
        self
    }

    /// Populate from a description
    pub fn from_desc(desc: &RenderPassDescription) -> Self {
        let mut builder = desc
            .attachments
            .iter()
            .fold(Self::new(), |b, &a| b.add_attachment(a));
        builder = desc.color.iter().fold(builder, |b, &i| b.add_color_reference(i));
        builder = desc.resolve.iter().fold(builder, |b, &i| b.add_resolve_reference(i));
        if let Some(depth) = desc.depth {
            builder = builder.depth_reference(depth);
        }
        builder
    }

    /// Create the native render pass
    pub fn build<N: NativeDevice + ?Sized>(self, native: &N) -> DeviceResult<vk::RenderPass> {
        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&self.color_refs);
        if !self.resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&self.resolve_refs);
        }
        if let Some(depth_ref) = self.depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass.build()];

        let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let attachment_writes =
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

        // previous readers finish before we write, and later passes see our writes
        let dependencies = [
            vk::SubpassDependency::builder()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(attachment_stages | vk::PipelineStageFlags::FRAGMENT_SHADER)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(attachment_stages)
                .dst_access_mask(attachment_writes)
                .build(),
            vk::SubpassDependency::builder()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(attachment_stages)
                .src_access_mask(attachment_writes)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .build(),
        ];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&self.attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        native.create_render_pass(&info).map_err(|e| {
            log::error!(
                "Failed to create render pass with {} attachments: {}",
                self.attachments.len(),
                e
            );
            e
        })
    }
}
