//! Device-owned resource records and their public handles
//!
//! Handles are generation-checked `slotmap` keys. A handle whose resource was
//! destroyed no longer resolves, so stale use is reported instead of reaching
//! freed native memory.

mod bind_set;
mod buffer;
mod command_buffer;
mod pipeline;
mod ray_trace_pipeline;
mod render_pass;
mod shader;
mod texture;

pub use bind_set::{BindSet, MAX_BINDINGS};
pub use buffer::BufferUsage;
pub use command_buffer::CommandBufferState;
pub use pipeline::GraphicsPipeline;
pub use ray_trace_pipeline::{HitShaders, RayTracePipeline};
pub use render_pass::{FrameBufferAttachment, FrameBufferDescription};
pub use texture::{SamplerDesc, TextureDescription};

pub(crate) use bind_set::{BoundResource, ResourceRef};
pub(crate) use buffer::{Buffer, IndexBuffer};
pub(crate) use command_buffer::{ActivePass, CommandBuffer};
pub(crate) use render_pass::{FrameBuffer, RenderPass};
pub(crate) use shader::{spirv_words, Shader};
pub(crate) use texture::Texture;

use slotmap::new_key_type;

new_key_type! {
    /// Texture handle
    pub struct TextureHandle;
    /// Vertex buffer handle
    pub struct VertexBufferHandle;
    /// Index buffer handle
    pub struct IndexBufferHandle;
    /// Uniform buffer handle
    pub struct UniformBufferHandle;
    /// Shader module handle
    pub struct ShaderHandle;
    /// Bind set handle
    pub struct BindSetHandle;
    /// Graphics pipeline handle
    pub struct PipelineHandle;
    /// Ray-trace pipeline handle
    pub struct RayTracePipelineHandle;
    /// Render pass handle
    pub struct RenderPassHandle;
    /// Frame buffer handle
    pub struct FrameBufferHandle;
    /// Command buffer handle
    pub struct CommandBufferHandle;
    /// Swap chain handle
    pub struct SwapChainHandle;
}
