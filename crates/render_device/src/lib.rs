//! # Render Device
//!
//! A handle-based Vulkan device layer. Applications describe resources and
//! pipeline state; the device turns them into native objects on demand and
//! deduplicates everything that is content-addressable.
//!
//! ## Features
//!
//! - **Handles**: generation-checked resource handles, stale use is an error
//! - **Caches**: set layouts, pipeline layouts, pipelines and render passes
//!   are created once per distinct description
//! - **Bind sets**: per-slot dirty tracking, only changed slots are rewritten
//! - **Lazy pipelines**: native pipelines are (re)built at draw time
//! - **Ray tracing**: ray-trace pipelines with cached shader binding tables
//! - **Swap chain**: frame ring of image-available semaphores, stale
//!   surfaces reported instead of treated as fatal
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_device::prelude::*;
//!
//! fn frame(device: &mut Device, swap_chain: SwapChainHandle, cb: CommandBufferHandle) -> DeviceResult<()> {
//!     if !device.acquire(swap_chain)? {
//!         return device.reinit(swap_chain, 1280, 720);
//!     }
//!     device.reset_command_buffer(cb)?;
//!     device.begin_command_buffer(cb)?;
//!     let pass = device.swap_chain_render_pass(swap_chain)?;
//!     let frame_buffer = device.swap_chain_frame_buffer(swap_chain)?;
//!     device.begin_render_pass(cb, pass, frame_buffer, &[ClearValue::Color([0.0, 0.0, 0.0, 1.0])])?;
//!     device.end_render_pass(cb)?;
//!     device.end_command_buffer(cb)?;
//!     device.submit_synced(cb, Some(swap_chain), &[])?;
//!     device.present(swap_chain, &[cb])?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod builders;
pub mod cache;
pub mod config;
pub mod hash;
pub mod logging;
pub mod native;
pub mod types;

mod device;
mod error;
mod resources;
mod swapchain;

pub use config::{Config, ConfigError, DescriptorPoolConfig, DeviceConfig, PresentMode, SwapChainConfig};
pub use device::{Device, DeviceCacheStats};
pub use error::{DeviceError, DeviceResult};
pub use native::{DeviceLimits, NativeDevice, RawWindowSurface, ShaderBindingRegions, SurfaceSource, VulkanDevice};
pub use resources::{
    BindSet, BindSetHandle, BufferUsage, CommandBufferHandle, CommandBufferState, FrameBufferAttachment,
    FrameBufferDescription, FrameBufferHandle, GraphicsPipeline, HitShaders, IndexBufferHandle, PipelineHandle,
    RayTracePipeline, RayTracePipelineHandle, RenderPassHandle, SamplerDesc, ShaderHandle, SwapChainHandle,
    TextureDescription, TextureHandle, UniformBufferHandle, VertexBufferHandle, MAX_BINDINGS,
};

/// Common imports for device users
pub mod prelude {
    pub use crate::{
        builders::{AttachmentDesc, BlendState, DepthState, RenderPassDescription, VertexStream},
        types::{
            ClearValue, CullMode, Filter, Format, IndexFormat, LoadOp, SampleCount, ShaderIl, ShaderStage,
            ShaderStages, StoreOp, TextureUsage, VertexFormat, Viewport,
        },
        BindSetHandle, BufferUsage, CommandBufferHandle, Device, DeviceConfig, DeviceError, DeviceResult,
        FrameBufferAttachment, FrameBufferDescription, FrameBufferHandle, HitShaders, IndexBufferHandle,
        PipelineHandle, RayTracePipelineHandle, RenderPassHandle, SamplerDesc, ShaderHandle, SurfaceSource,
        SwapChainHandle, TextureDescription, TextureHandle, UniformBufferHandle, VertexBufferHandle,
    };
}
