//! Object-description builders
//!
//! Single-use accumulators: chained `add_*` calls collect the pieces of a
//! native create-info structure and `build` performs exactly one native
//! creation call. Builders hold no state across `build` calls.

use std::ffi::CStr;

use crate::error::{DeviceError, DeviceResult};

mod descriptor_set_layout;
mod graphics_pipeline;
mod pipeline_layout;
mod ray_trace_pipeline;
mod render_pass;

pub use descriptor_set_layout::{DescriptorSetLayoutBuilder, DescriptorSetLayoutDesc, LayoutBinding};
pub use graphics_pipeline::{
    BlendState, DepthBias, DepthState, GraphicsPipelineBuilder, GraphicsPipelineDesc, RasterState,
    StencilFaceState, StencilState, VertexAttribute, VertexStream,
};
pub use pipeline_layout::{PipelineLayoutBuilder, PipelineLayoutDesc};
pub use ray_trace_pipeline::{HitGroup, RayTracePipelineBuilder, RayTracePipelineDesc};
pub use render_pass::{AttachmentDesc, RenderPassBuilder, RenderPassCompat, RenderPassDescription};

const ENTRY_POINT: &[u8] = b"main\0";

/// Shader entry point every stage is compiled with
pub(crate) fn entry_point() -> DeviceResult<&'static CStr> {
    CStr::from_bytes_with_nul(ENTRY_POINT).map_err(|e| {
        log::error!("Shader entry point is not a C string: {}", e);
        DeviceError::invalid_operation("malformed shader entry point")
    })
}
