//! Graphics pipeline state and builder
//!
//! [`GraphicsPipelineDesc`] is the full fixed-function and shader configuration
//! that identifies a native pipeline. Viewport and scissor are dynamic state
//! and intentionally absent.

use std::hash::{Hash, Hasher};

use ash::vk;

use super::entry_point;
use super::render_pass::RenderPassCompat;
use crate::error::DeviceResult;
use crate::hash::float_bits;
use crate::native::NativeDevice;
use crate::types::{
    BlendFactor, BlendOp, ColorMask, CompareOp, CullMode, FrontFace, PolygonMode, PrimitiveTopology,
    SampleCount, ShaderStage, StencilOp, VertexFormat,
};

/// One attribute read from a vertex stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Attribute format
    pub format: VertexFormat,
    /// Byte offset inside one element
    pub offset: u32,
}

/// One vertex buffer binding and the attributes it feeds
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexStream {
    /// Bytes between consecutive elements
    pub stride: u32,
    /// Advance per instance instead of per vertex
    pub per_instance: bool,
    /// Attributes sourced from this stream
    pub attributes: Vec<VertexAttribute>,
}

impl VertexStream {
    /// Tightly packed per-vertex stream; offsets follow attribute order
    pub fn packed(first_location: u32, formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .zip(first_location..)
            .map(|(&format, location)| {
                let attribute = VertexAttribute { location, format, offset };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            stride: offset,
            per_instance: false,
            attributes,
        }
    }
}

/// Constant and slope-scaled depth bias
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    /// Constant factor
    pub constant: f32,
    /// Slope factor
    pub slope: f32,
    /// Maximum bias, `0.0` for unclamped
    pub clamp: f32,
}

impl Eq for DepthBias {}

impl Hash for DepthBias {
    fn hash<H: Hasher>(&self, state: &mut H) {
        float_bits(self.constant).hash(state);
        float_bits(self.slope).hash(state);
        float_bits(self.clamp).hash(state);
    }
}

/// Rasterizer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterState {
    /// Face culling
    pub cull_mode: CullMode,
    /// Front-face winding
    pub front_face: FrontFace,
    /// Fill mode
    pub polygon_mode: PolygonMode,
    /// Optional depth bias
    pub depth_bias: Option<DepthBias>,
}

/// Depth test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// Enable depth testing
    pub test: bool,
    /// Enable depth writes
    pub write: bool,
    /// Comparison used by the test
    pub compare: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare: CompareOp::Less,
        }
    }
}

/// Stencil behaviour for one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    /// Stencil test failed
    pub fail: StencilOp,
    /// Both tests passed
    pub pass: StencilOp,
    /// Stencil passed, depth failed
    pub depth_fail: StencilOp,
    /// Stencil comparison
    pub compare: CompareOp,
    /// Bits read by the comparison
    pub compare_mask: u32,
    /// Bits written
    pub write_mask: u32,
    /// Reference value
    pub reference: u32,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            fail: StencilOp::Keep,
            pass: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            compare: CompareOp::Always,
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

impl StencilFaceState {
    fn to_vk(self) -> vk::StencilOpState {
        vk::StencilOpState {
            fail_op: self.fail.to_vk(),
            pass_op: self.pass.to_vk(),
            depth_fail_op: self.depth_fail.to_vk(),
            compare_op: self.compare.to_vk(),
            compare_mask: self.compare_mask,
            write_mask: self.write_mask,
            reference: self.reference,
        }
    }
}

/// Stencil test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilState {
    /// Enable stencil testing
    pub enabled: bool,
    /// Front faces
    pub front: StencilFaceState,
    /// Back faces
    pub back: StencilFaceState,
}

/// Blending for one color output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Enable blending
    pub enabled: bool,
    /// Source color factor
    pub src_color: BlendFactor,
    /// Destination color factor
    pub dst_color: BlendFactor,
    /// Color equation
    pub color_op: BlendOp,
    /// Source alpha factor
    pub src_alpha: BlendFactor,
    /// Destination alpha factor
    pub dst_alpha: BlendFactor,
    /// Alpha equation
    pub alpha_op: BlendOp,
    /// Channels written
    pub write_mask: ColorMask,
}

impl BlendState {
    /// Overwrite the target
    pub const REPLACE: Self = Self {
        enabled: false,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::Zero,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
        alpha_op: BlendOp::Add,
        write_mask: ColorMask::ALL,
    };

    /// Standard non-premultiplied alpha blending
    pub const ALPHA: Self = Self {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::OneMinusSrcAlpha,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        alpha_op: BlendOp::Add,
        write_mask: ColorMask::ALL,
    };

    /// Additive accumulation
    pub const ADDITIVE: Self = Self {
        enabled: true,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::One,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::One,
        alpha_op: BlendOp::Add,
        write_mask: ColorMask::ALL,
    };

    fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(self.enabled)
            .src_color_blend_factor(self.src_color.to_vk())
            .dst_color_blend_factor(self.dst_color.to_vk())
            .color_blend_op(self.color_op.to_vk())
            .src_alpha_blend_factor(self.src_alpha.to_vk())
            .dst_alpha_blend_factor(self.dst_alpha.to_vk())
            .alpha_blend_op(self.alpha_op.to_vk())
            .color_write_mask(self.write_mask.to_vk())
            .build()
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::REPLACE
    }
}

/// Everything that identifies a native graphics pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDesc {
    /// Shader module per stage, in pipeline order
    pub stages: Vec<(ShaderStage, vk::ShaderModule)>,
    /// Vertex streams, index is the binding number
    pub vertex_streams: Vec<VertexStream>,
    /// Primitive assembly
    pub topology: PrimitiveTopology,
    /// Rasterizer state
    pub raster: RasterState,
    /// Depth test state
    pub depth: DepthState,
    /// Stencil test state
    pub stencil: StencilState,
    /// Blend state per color output; the last entry repeats for the rest
    pub blend: Vec<BlendState>,
    /// Pipeline layout, itself content-cached
    pub layout: vk::PipelineLayout,
    /// Render pass the pipeline must be compatible with
    pub pass: RenderPassCompat,
}

impl GraphicsPipelineDesc {
    /// Sample count implied by the target pass
    pub fn samples(&self) -> SampleCount {
        self.pass
            .colors
            .first()
            .map(|&(_, samples)| samples)
            .or(self.pass.depth.map(|(_, samples)| samples))
            .unwrap_or_default()
    }
}

/// Graphics pipeline builder
pub struct GraphicsPipelineBuilder {
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,
    raster: RasterState,
    samples: vk::SampleCountFlags,
    depth: DepthState,
    stencil: StencilState,
    has_depth_attachment: bool,
    blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
}

impl GraphicsPipelineBuilder {
    /// Start a pipeline for `layout`, compatible with `render_pass`
    pub fn new(layout: vk::PipelineLayout, render_pass: vk::RenderPass) -> Self {
        Self {
            layout,
            render_pass,
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            raster: RasterState::default(),
            samples: vk::SampleCountFlags::TYPE_1,
            depth: DepthState::default(),
            stencil: StencilState::default(),
            has_depth_attachment: true,
            blend_attachments: Vec::new(),
        }
    }

    /// Add a shader stage with entry point `main`
    pub fn add_shader_stage(mut self, stage: ShaderStage, module: vk::ShaderModule) -> Self {
        self.stages.push((stage.to_vk(), module));
        self
    }

    /// Add a vertex stream at binding `binding`
    pub fn add_vertex_stream(mut self, binding: u32, stream: &VertexStream) -> Self {
        let input_rate = if stream.per_instance {
            vk::VertexInputRate::INSTANCE
        } else {
            vk::VertexInputRate::VERTEX
        };
        self.vertex_bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride: stream.stride,
            input_rate,
        });
        self.vertex_attributes
            .extend(stream.attributes.iter().map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding,
                format: a.format.to_vk(),
                offset: a.offset,
            }));
        self
    }

    /// Primitive topology
    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology.to_vk();
        self
    }

    /// Rasterizer state
    pub fn rasterization(mut self, raster: RasterState) -> Self {
        self.raster = raster;
        self
    }

    /// Rasterization sample count
    pub fn multisample(mut self, samples: SampleCount) -> Self {
        self.samples = samples.to_vk();
        self
    }

    /// Depth and stencil state; `has_attachment == false` disables both
    pub fn depth_stencil(mut self, depth: DepthState, stencil: StencilState, has_attachment: bool) -> Self {
        self.depth = depth;
        self.stencil = stencil;
        self.has_depth_attachment = has_attachment;
        self
    }

    /// Blend state of the next color output
    pub fn add_blend_attachment(mut self, blend: BlendState) -> Self {
        self.blend_attachments.push(blend.to_vk());
        self
    }

    /// Populate from a description; `render_pass` must be compatible with `desc.pass`
    pub fn from_desc(desc: &GraphicsPipelineDesc, render_pass: vk::RenderPass) -> Self {
        let mut builder = Self::new(desc.layout, render_pass);
        for &(stage, module) in &desc.stages {
            builder = builder.add_shader_stage(stage, module);
        }
        for (binding, stream) in desc.vertex_streams.iter().enumerate() {
            builder = builder.add_vertex_stream(binding as u32, stream);
        }
        builder = builder
            .topology(desc.topology)
            .rasterization(desc.raster)
            .multisample(desc.samples())
            .depth_stencil(desc.depth, desc.stencil, desc.pass.depth.is_some());

        let last = desc.blend.last().copied().unwrap_or_default();
        for index in 0..desc.pass.colors.len() {
            builder = builder.add_blend_attachment(desc.blend.get(index).copied().unwrap_or(last));
        }
        builder
    }

    /// Create the native pipeline
    pub fn build<N: NativeDevice + ?Sized>(self, native: &N) -> DeviceResult<vk::Pipeline> {
        let entry = entry_point()?;
        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = self
            .stages
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage)
                    .module(module)
                    .name(entry)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false);

        // viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let bias = self.raster.depth_bias;
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.raster.polygon_mode.to_vk())
            .line_width(1.0)
            .cull_mode(self.raster.cull_mode.to_vk())
            .front_face(self.raster.front_face.to_vk())
            .depth_bias_enable(bias.is_some())
            .depth_bias_constant_factor(bias.map_or(0.0, |b| b.constant))
            .depth_bias_slope_factor(bias.map_or(0.0, |b| b.slope))
            .depth_bias_clamp(bias.map_or(0.0, |b| b.clamp));

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(self.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.has_depth_attachment && self.depth.test)
            .depth_write_enable(self.has_depth_attachment && self.depth.write)
            .depth_compare_op(self.depth.compare.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(self.has_depth_attachment && self.stencil.enabled)
            .front(self.stencil.front.to_vk())
            .back(self.stencil.back.to_vk());

        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&self.blend_attachments);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(self.render_pass)
            .subpass(0);

        native.create_graphics_pipeline(&info).map_err(|e| {
            log::error!(
                "Failed to create graphics pipeline ({} stages, {} streams): {}",
                self.stages.len(),
                self.vertex_bindings.len(),
                e
            );
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_stream_offsets() {
        let stream = VertexStream::packed(0, &[VertexFormat::Float3, VertexFormat::Float3, VertexFormat::Float2]);
        let offsets: Vec<u32> = stream.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(stream.stride, 32);
        assert_eq!(stream.attributes[2].location, 2);
    }

    #[test]
    fn test_depth_bias_hash_ignores_zero_sign() {
        let a = DepthBias { constant: 0.0, slope: 1.5, clamp: 0.0 };
        let b = DepthBias { constant: -0.0, slope: 1.5, clamp: 0.0 };
        assert_eq!(crate::hash::content_hash(&a), crate::hash::content_hash(&b));
    }
}
