//! Two-pass forward renderer
//!
//! The cube is lit into an RGBA16F target, then a full-screen triangle
//! tonemaps that target into the swap chain. One command buffer, uniform
//! buffer and bind set exist per swap-chain image so a frame never touches
//! data the GPU is still reading.

use std::path::Path;

use render_device::builders::DepthState;
use render_device::prelude::*;
use render_device::types::CompareOp;
use render_device::CommandBufferState;
use thiserror::Error;

use crate::config::SandboxConfig;
use crate::scene::{self, OrbitCamera, SceneUniforms, Vertex};

const HDR_FORMAT: Format = Format::Rgba16Float;
const DEPTH_FORMAT: Format = Format::D32Float;
const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to load texture: {0}")]
    Image(#[from] image::ImageError),
}

pub type RendererResult<T> = Result<T, RendererError>;

struct Shaders {
    scene_vs: ShaderHandle,
    scene_fs: ShaderHandle,
    fullscreen_vs: ShaderHandle,
    tonemap_fs: ShaderHandle,
}

struct Mesh {
    vertices: VertexBufferHandle,
    indices: IndexBufferHandle,
    index_count: u32,
}

/// Offscreen targets sized to the window
struct HdrTargets {
    color: TextureHandle,
    depth: TextureHandle,
    frame_buffer: FrameBufferHandle,
}

/// Everything one in-flight frame writes
struct FrameResources {
    cb: CommandBufferHandle,
    uniforms: UniformBufferHandle,
    scene_set: BindSetHandle,
    scene_pipeline: PipelineHandle,
}

pub struct Renderer {
    device: Device,
    swap_chain: SwapChainHandle,
    shaders: Shaders,
    cube: Mesh,
    albedo: TextureHandle,
    hdr_pass: RenderPassHandle,
    targets: HdrTargets,
    frames: Vec<FrameResources>,
    tonemap_set: BindSetHandle,
    tonemap_pipeline: PipelineHandle,
    camera: OrbitCamera,
    exposure: f32,
    extent: (u32, u32),
    needs_reinit: bool,
}

impl Renderer {
    pub fn new(config: &SandboxConfig, surface: &dyn SurfaceSource) -> RendererResult<Self> {
        let extent = surface.framebuffer_extent();
        let mut device = Device::new(config.device.clone(), surface)?;
        let swap_chain = device.create_swap_chain(extent.0, extent.1)?;
        let extent = device.swap_chain_extent(swap_chain)?;

        let shaders = Shaders {
            scene_vs: load_shader(&mut device, &config.shader_dir, "scene.vert", ShaderStage::Vertex)?,
            scene_fs: load_shader(&mut device, &config.shader_dir, "scene.frag", ShaderStage::Fragment)?,
            fullscreen_vs: load_shader(&mut device, &config.shader_dir, "fullscreen.vert", ShaderStage::Vertex)?,
            tonemap_fs: load_shader(&mut device, &config.shader_dir, "tonemap.frag", ShaderStage::Fragment)?,
        };

        let (vertices, indices) = scene::cube();
        let cube = Mesh {
            vertices: device.create_vertex_buffer(
                BufferUsage::Static,
                std::mem::size_of_val(vertices.as_slice()) as u64,
                Some(bytemuck::cast_slice(&vertices)),
            )?,
            indices: device.create_index_buffer(
                BufferUsage::Static,
                IndexFormat::U16,
                std::mem::size_of_val(indices.as_slice()) as u64,
                Some(bytemuck::cast_slice(&indices)),
            )?,
            index_count: indices.len() as u32,
        };

        let albedo = load_albedo(&mut device, config.texture_path.as_deref())?;

        let hdr_pass = device.create_render_pass(RenderPassDescription {
            attachments: vec![
                AttachmentDesc::color(HDR_FORMAT, SampleCount::X1, LoadOp::Clear),
                AttachmentDesc::depth(DEPTH_FORMAT, SampleCount::X1, LoadOp::Clear)
                    .with_store_op(StoreOp::DontCare)
                    .with_final_layout(render_device::types::ImageLayout::DepthStencilAttachment),
            ],
            color: vec![0],
            depth: Some(1),
            resolve: Vec::new(),
        })?;
        let targets = create_targets(&mut device, extent)?;

        let tonemap_set = device.create_bind_set()?;
        device.bind_texture(tonemap_set, 0, targets.color)?;
        let tonemap_pipeline = device.create_graphics_pipeline()?;
        if let Some(state) = device.graphics_pipeline_mut(tonemap_pipeline) {
            state.set_shader(ShaderStage::Vertex, shaders.fullscreen_vs);
            state.set_shader(ShaderStage::Fragment, shaders.tonemap_fs);
            state.set_bind_set(0, tonemap_set);
            state.set_cull_mode(CullMode::None);
            state.set_depth_state(DepthState {
                test: false,
                write: false,
                compare: CompareOp::Always,
            });
            state.set_push_constants(ShaderStages::FRAGMENT, bytemuck::bytes_of(&config.exposure));
        }

        let mut renderer = Self {
            device,
            swap_chain,
            shaders,
            cube,
            albedo,
            hdr_pass,
            targets,
            frames: Vec::new(),
            tonemap_set,
            tonemap_pipeline,
            camera: OrbitCamera::default(),
            exposure: config.exposure,
            extent,
            needs_reinit: false,
        };
        renderer.sync_frames()?;

        let stats = renderer.device.cache_stats();
        log::info!(
            "Renderer ready: {}x{}, {} frames in flight, {} render passes cached",
            extent.0,
            extent.1,
            renderer.frames.len(),
            stats.render_passes.entries
        );
        Ok(renderer)
    }

    /// Mark the swap chain for rebuilding before the next frame
    pub fn request_reinit(&mut self) {
        self.needs_reinit = true;
    }

    /// Record, submit and present one frame
    pub fn render_frame(&mut self, window_extent: (u32, u32), time: f32) -> RendererResult<()> {
        if self.needs_reinit {
            if window_extent.0 == 0 || window_extent.1 == 0 {
                return Ok(());
            }
            self.reinit(window_extent)?;
        }

        if !self.device.acquire(self.swap_chain)? {
            self.needs_reinit = true;
            return Ok(());
        }

        let index = self.device.swap_chain_frame_index(self.swap_chain)? % self.frames.len();
        let (cb, uniforms, scene_pipeline) = {
            let frame = &self.frames[index];
            (frame.cb, frame.uniforms, frame.scene_pipeline)
        };
        if self.device.command_buffer_state(cb)? == CommandBufferState::Submitted {
            self.device.wait_for(&[cb])?;
        }

        let aspect = self.extent.0 as f32 / self.extent.1.max(1) as f32;
        let values: SceneUniforms = self.camera.uniforms(time, aspect);
        self.device.update_uniform_buffer_with(uniforms, 0, &values)?;

        self.device.reset_command_buffer(cb)?;
        self.device.begin_command_buffer(cb)?;

        // lighting pass into the HDR target
        self.device.begin_render_pass(
            cb,
            self.hdr_pass,
            self.targets.frame_buffer,
            &[
                ClearValue::Color(CLEAR_COLOR),
                ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
            ],
        )?;
        self.device.draw_indexed(
            cb,
            scene_pipeline,
            &[self.cube.vertices],
            self.cube.indices,
            self.cube.index_count,
            1,
        )?;
        self.device.end_render_pass(cb)?;

        // tonemap into the swap image
        let pass = self.device.swap_chain_render_pass(self.swap_chain)?;
        let frame_buffer = self.device.swap_chain_frame_buffer(self.swap_chain)?;
        self.device
            .begin_render_pass(cb, pass, frame_buffer, &[ClearValue::Color([0.0, 0.0, 0.0, 1.0])])?;
        if let Some(state) = self.device.graphics_pipeline_mut(self.tonemap_pipeline) {
            state.set_push_constants(ShaderStages::FRAGMENT, bytemuck::bytes_of(&self.exposure));
        }
        self.device.draw(cb, self.tonemap_pipeline, &[], 3, 1)?;
        self.device.end_render_pass(cb)?;
        self.device.end_command_buffer(cb)?;

        self.device.submit_synced(cb, Some(self.swap_chain), &[])?;
        if !self.device.present(self.swap_chain, &[cb])? {
            self.needs_reinit = true;
        }
        Ok(())
    }

    fn reinit(&mut self, window_extent: (u32, u32)) -> RendererResult<()> {
        self.device.reinit(self.swap_chain, window_extent.0, window_extent.1)?;
        self.extent = self.device.swap_chain_extent(self.swap_chain)?;

        // reinit waited for the device, nothing reads the old targets any more
        self.destroy_targets()?;
        self.targets = create_targets(&mut self.device, self.extent)?;
        self.device.bind_texture(self.tonemap_set, 0, self.targets.color)?;

        self.sync_frames()?;
        self.needs_reinit = false;
        log::info!("Swap chain rebuilt at {}x{}", self.extent.0, self.extent.1);
        Ok(())
    }

    /// One set of frame resources per swap-chain image
    fn sync_frames(&mut self) -> RendererResult<()> {
        let wanted = self.device.swap_chain_image_count(self.swap_chain)? as usize;
        while self.frames.len() > wanted {
            if let Some(frame) = self.frames.pop() {
                self.device.wait_for(&[frame.cb])?;
                self.device.destroy_command_buffer(frame.cb)?;
                self.device.destroy_graphics_pipeline(frame.scene_pipeline)?;
                self.device.destroy_bind_set(frame.scene_set)?;
                self.device.destroy_uniform_buffer(frame.uniforms)?;
            }
        }
        while self.frames.len() < wanted {
            let frame = self.create_frame()?;
            self.frames.push(frame);
        }
        Ok(())
    }

    fn create_frame(&mut self) -> RendererResult<FrameResources> {
        let size = std::mem::size_of::<SceneUniforms>() as u64;
        let uniforms = self.device.create_uniform_buffer(BufferUsage::Dynamic, size, None)?;

        let scene_set = self.device.create_bind_set()?;
        self.device.bind_uniform_buffer(scene_set, 0, uniforms, 0, size)?;
        self.device.bind_texture(scene_set, 1, self.albedo)?;

        let scene_pipeline = self.device.create_graphics_pipeline()?;
        if let Some(state) = self.device.graphics_pipeline_mut(scene_pipeline) {
            state.set_shader(ShaderStage::Vertex, self.shaders.scene_vs);
            state.set_shader(ShaderStage::Fragment, self.shaders.scene_fs);
            state.set_vertex_stream(0, VertexStream::packed(0, &Vertex::FORMATS));
            state.set_bind_set(0, scene_set);
            state.set_cull_mode(CullMode::None);
        }

        Ok(FrameResources {
            cb: self.device.create_command_buffer()?,
            uniforms,
            scene_set,
            scene_pipeline,
        })
    }

    fn destroy_targets(&mut self) -> RendererResult<()> {
        self.device.destroy_frame_buffer(self.targets.frame_buffer)?;
        self.device.destroy_texture(self.targets.color)?;
        self.device.destroy_texture(self.targets.depth)?;
        Ok(())
    }

    /// Wait for in-flight frames and log cache statistics
    pub fn finish(&mut self) -> RendererResult<()> {
        self.device.wait_idle()?;
        let stats = self.device.cache_stats();
        log::info!(
            "Cache statistics: pipelines {}/{} hits, pipeline layouts {} entries, set layouts {} entries",
            stats.pipelines.hits,
            stats.pipelines.hits + stats.pipelines.misses,
            stats.pipeline_layouts.entries,
            stats.set_layouts.entries
        );
        Ok(())
    }
}

fn create_targets(device: &mut Device, extent: (u32, u32)) -> RendererResult<HdrTargets> {
    let color = device.create_texture(
        TextureDescription::render_target(extent.0, extent.1, HDR_FORMAT, SampleCount::X1),
        None,
    )?;
    let depth = device.create_texture(
        TextureDescription::new_2d(extent.0, extent.1, DEPTH_FORMAT).with_usage(TextureUsage::DEPTH_STENCIL_ATTACHMENT),
        None,
    )?;
    let frame_buffer = device.create_frame_buffer(FrameBufferDescription {
        attachments: vec![FrameBufferAttachment::texture(color), FrameBufferAttachment::texture(depth)],
        width: extent.0,
        height: extent.1,
    })?;
    Ok(HdrTargets {
        color,
        depth,
        frame_buffer,
    })
}

fn load_shader(device: &mut Device, dir: &str, name: &str, stage: ShaderStage) -> RendererResult<ShaderHandle> {
    let path = Path::new(dir).join(format!("{}.spv", name.replace('.', "_")));
    let bytes = std::fs::read(&path).map_err(|source| {
        log::error!("Missing shader {:?}; build with VULKAN_SDK set to compile shaders", path);
        RendererError::Io {
            path: path.display().to_string(),
            source,
        }
    })?;
    Ok(device.create_shader_from_il(stage, ShaderIl::SpirV, &bytes)?)
}

fn load_albedo(device: &mut Device, path: Option<&str>) -> RendererResult<TextureHandle> {
    let (width, height, texels) = match path {
        Some(path) => {
            let image = image::open(path)?.to_rgba8();
            log::info!("Loaded albedo {} ({}x{})", path, image.width(), image.height());
            (image.width(), image.height(), image.into_raw())
        }
        None => (256, 256, scene::checkerboard(256, 8)),
    };

    let desc = TextureDescription::new_2d(width, height, Format::Rgba8Srgb)
        .full_mip_chain()
        .with_sampler(SamplerDesc {
            anisotropy: 16.0,
            ..SamplerDesc::default()
        });
    Ok(device.create_texture(desc, Some(&texels))?)
}
