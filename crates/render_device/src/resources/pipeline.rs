//! Mutable graphics pipeline state
//!
//! Setters only edit the description and drop the cached native handles they
//! affect. Native objects are fetched again from the caches on the next draw.

use ash::vk;

use super::{BindSetHandle, ShaderHandle};
use crate::builders::{
    BlendState, DepthBias, DepthState, GraphicsPipelineDesc, PipelineLayoutDesc, RasterState, RenderPassCompat,
    StencilState, VertexStream,
};
use crate::types::{CullMode, FrontFace, PolygonMode, PrimitiveTopology, Rect, ShaderStage, ShaderStages, Viewport};

const GRAPHICS_STAGES: usize = ShaderStage::GRAPHICS.len();

/// Graphics pipeline description with lazily rebuilt native objects
pub struct GraphicsPipeline {
    shaders: [Option<ShaderHandle>; GRAPHICS_STAGES],
    vertex_streams: Vec<VertexStream>,
    topology: PrimitiveTopology,
    raster: RasterState,
    depth: DepthState,
    stencil: StencilState,
    blend: Vec<BlendState>,
    viewport: Option<Viewport>,
    scissor: Option<Rect>,
    push_constants: Vec<u8>,
    push_constant_stages: ShaderStages,
    bind_sets: Vec<Option<BindSetHandle>>,

    pub(crate) native_pipeline: vk::Pipeline,
    pub(crate) native_layout: vk::PipelineLayout,
    pub(crate) layout_desc: Option<PipelineLayoutDesc>,
    pub(crate) built_for: Option<RenderPassCompat>,
}

impl GraphicsPipeline {
    pub(crate) fn new() -> Self {
        Self {
            shaders: [None; GRAPHICS_STAGES],
            vertex_streams: Vec::new(),
            topology: PrimitiveTopology::default(),
            raster: RasterState::default(),
            depth: DepthState::default(),
            stencil: StencilState::default(),
            blend: vec![BlendState::default()],
            viewport: None,
            scissor: None,
            push_constants: Vec::new(),
            push_constant_stages: ShaderStages::ALL_GRAPHICS,
            bind_sets: Vec::new(),
            native_pipeline: vk::Pipeline::null(),
            native_layout: vk::PipelineLayout::null(),
            layout_desc: None,
            built_for: None,
        }
    }

    fn invalidate_pipeline(&mut self) {
        self.native_pipeline = vk::Pipeline::null();
        self.built_for = None;
    }

    fn invalidate_layout(&mut self) {
        self.native_layout = vk::PipelineLayout::null();
        self.layout_desc = None;
        self.invalidate_pipeline();
    }

    /// Use `shader` for `stage`; non-graphics stages are ignored with an error log
    pub fn set_shader(&mut self, stage: ShaderStage, shader: ShaderHandle) {
        if !stage.is_graphics() {
            log::error!("{:?} shaders cannot be part of a graphics pipeline", stage);
            return;
        }
        let entry = &mut self.shaders[stage.index()];
        if *entry != Some(shader) {
            *entry = Some(shader);
            self.invalidate_pipeline();
        }
    }

    /// Remove the shader of `stage`
    pub fn clear_shader(&mut self, stage: ShaderStage) {
        if let Some(entry) = self.shaders.get_mut(stage.index()) {
            if entry.take().is_some() {
                self.invalidate_pipeline();
            }
        }
    }

    /// Bind `set` at descriptor-set index `index`
    pub fn set_bind_set(&mut self, index: u32, set: BindSetHandle) {
        let index = index as usize;
        if self.bind_sets.len() <= index {
            self.bind_sets.resize(index + 1, None);
        }
        if self.bind_sets[index] != Some(set) {
            self.bind_sets[index] = Some(set);
            self.invalidate_layout();
        }
    }

    /// Remove the bind set at `index`
    pub fn clear_bind_set(&mut self, index: u32) {
        let index = index as usize;
        if index < self.bind_sets.len() && self.bind_sets[index].take().is_some() {
            while self.bind_sets.last() == Some(&None) {
                self.bind_sets.pop();
            }
            self.invalidate_layout();
        }
    }

    /// Describe vertex buffer binding `binding`
    pub fn set_vertex_stream(&mut self, binding: u32, stream: VertexStream) {
        let binding = binding as usize;
        if self.vertex_streams.len() <= binding {
            self.vertex_streams.resize(binding + 1, VertexStream::default());
        }
        if self.vertex_streams[binding] != stream {
            self.vertex_streams[binding] = stream;
            self.invalidate_pipeline();
        }
    }

    /// Primitive assembly topology
    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        if self.topology != topology {
            self.topology = topology;
            self.invalidate_pipeline();
        }
    }

    /// Face culling
    pub fn set_cull_mode(&mut self, cull_mode: CullMode) {
        if self.raster.cull_mode != cull_mode {
            self.raster.cull_mode = cull_mode;
            self.invalidate_pipeline();
        }
    }

    /// Front-face winding
    pub fn set_front_face(&mut self, front_face: FrontFace) {
        if self.raster.front_face != front_face {
            self.raster.front_face = front_face;
            self.invalidate_pipeline();
        }
    }

    /// Fill mode
    pub fn set_polygon_mode(&mut self, polygon_mode: PolygonMode) {
        if self.raster.polygon_mode != polygon_mode {
            self.raster.polygon_mode = polygon_mode;
            self.invalidate_pipeline();
        }
    }

    /// Depth bias, `None` disables it
    pub fn set_depth_bias(&mut self, bias: Option<DepthBias>) {
        if self.raster.depth_bias != bias {
            self.raster.depth_bias = bias;
            self.invalidate_pipeline();
        }
    }

    /// Depth test and write
    pub fn set_depth_state(&mut self, depth: DepthState) {
        if self.depth != depth {
            self.depth = depth;
            self.invalidate_pipeline();
        }
    }

    /// Stencil test
    pub fn set_stencil_state(&mut self, stencil: StencilState) {
        if self.stencil != stencil {
            self.stencil = stencil;
            self.invalidate_pipeline();
        }
    }

    /// Blending of color output `attachment`
    ///
    /// Outputs without an explicit state reuse the highest one set.
    pub fn set_blending(&mut self, attachment: u32, blend: BlendState) {
        let attachment = attachment as usize;
        if self.blend.len() <= attachment {
            let last = self.blend.last().copied().unwrap_or_default();
            self.blend.resize(attachment + 1, last);
        } else if self.blend[attachment] == blend {
            return;
        }
        self.blend[attachment] = blend;
        self.invalidate_pipeline();
    }

    /// Viewport, `None` covers the whole frame buffer; dynamic state
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        self.viewport = viewport;
    }

    /// Scissor, `None` covers the whole frame buffer; dynamic state
    pub fn set_scissor(&mut self, scissor: Option<Rect>) {
        self.scissor = scissor;
    }

    /// Push-constant bytes uploaded before every draw
    ///
    /// Changing the size or the stages changes the pipeline layout.
    pub fn set_push_constants(&mut self, stages: ShaderStages, data: &[u8]) {
        let reshaped = data.len() != self.push_constants.len() || stages != self.push_constant_stages;
        self.push_constants.clear();
        self.push_constants.extend_from_slice(data);
        self.push_constant_stages = stages;
        if reshaped {
            self.invalidate_layout();
        }
    }

    /// Whether a native pipeline is cached for the current state
    pub fn has_native_pipeline(&self) -> bool {
        self.native_pipeline != vk::Pipeline::null()
    }

    /// Whether a native layout is cached for the current bind sets
    pub fn has_native_layout(&self) -> bool {
        self.native_layout != vk::PipelineLayout::null()
    }

    /// Bind set at `index`
    pub fn bind_set(&self, index: u32) -> Option<BindSetHandle> {
        self.bind_sets.get(index as usize).copied().flatten()
    }

    /// Bind-set table; gaps are `None`
    pub fn bind_sets(&self) -> &[Option<BindSetHandle>] {
        &self.bind_sets
    }

    /// Shader of `stage`
    pub fn shader(&self, stage: ShaderStage) -> Option<ShaderHandle> {
        self.shaders.get(stage.index()).copied().flatten()
    }

    /// Number of vertex streams
    pub fn vertex_stream_count(&self) -> usize {
        self.vertex_streams.len()
    }

    pub(crate) fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub(crate) fn scissor(&self) -> Option<Rect> {
        self.scissor
    }

    pub(crate) fn push_constants(&self) -> (&[u8], ShaderStages) {
        (&self.push_constants, self.push_constant_stages)
    }

    /// Graphics stages with a shader, in pipeline order
    pub(crate) fn shader_stages(&self) -> impl Iterator<Item = (ShaderStage, ShaderHandle)> + '_ {
        ShaderStage::GRAPHICS
            .iter()
            .zip(self.shaders.iter())
            .filter_map(|(&stage, shader)| shader.map(|s| (stage, s)))
    }

    /// Full native description for the given modules, layout and target pass
    pub(crate) fn desc(
        &self,
        stages: Vec<(ShaderStage, vk::ShaderModule)>,
        layout: vk::PipelineLayout,
        pass: RenderPassCompat,
    ) -> GraphicsPipelineDesc {
        GraphicsPipelineDesc {
            stages,
            vertex_streams: self.vertex_streams.clone(),
            topology: self.topology,
            raster: self.raster,
            depth: self.depth,
            stencil: self.stencil,
            blend: self.blend.clone(),
            layout,
            pass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VertexFormat;
    use ash::vk::Handle;
    use slotmap::SlotMap;

    fn built() -> GraphicsPipeline {
        let mut pipeline = GraphicsPipeline::new();
        pipeline.native_pipeline = vk::Pipeline::from_raw(1);
        pipeline.native_layout = vk::PipelineLayout::from_raw(2);
        pipeline
    }

    #[test]
    fn test_state_setter_drops_only_pipeline() {
        let mut pipeline = built();
        pipeline.set_cull_mode(CullMode::None);

        assert!(!pipeline.has_native_pipeline());
        assert!(pipeline.has_native_layout());
    }

    #[test]
    fn test_unchanged_value_keeps_native_objects() {
        let mut pipeline = built();
        pipeline.set_cull_mode(CullMode::default());
        pipeline.set_vertex_stream(0, VertexStream::default());
        pipeline.set_viewport(Some(Viewport::full(64, 64)));

        assert!(pipeline.has_native_pipeline());
    }

    #[test]
    fn test_bind_set_change_drops_layout() {
        let mut handles: SlotMap<BindSetHandle, ()> = SlotMap::with_key();
        let x = handles.insert(());
        let y = handles.insert(());

        let mut pipeline = built();
        pipeline.set_bind_set(1, x);
        assert!(!pipeline.has_native_layout());
        assert_eq!(pipeline.bind_sets(), &[None, Some(x)]);

        pipeline.native_pipeline = vk::Pipeline::from_raw(1);
        pipeline.native_layout = vk::PipelineLayout::from_raw(2);
        pipeline.set_bind_set(1, x);
        assert!(pipeline.has_native_layout());

        pipeline.set_bind_set(1, y);
        assert!(!pipeline.has_native_pipeline());

        pipeline.clear_bind_set(1);
        assert!(pipeline.bind_sets().is_empty());
    }

    #[test]
    fn test_push_constant_size_change_drops_layout() {
        let mut pipeline = built();
        pipeline.set_push_constants(ShaderStages::ALL_GRAPHICS, &[0; 16]);
        assert!(!pipeline.has_native_layout());

        pipeline.native_pipeline = vk::Pipeline::from_raw(1);
        pipeline.native_layout = vk::PipelineLayout::from_raw(2);
        pipeline.set_push_constants(ShaderStages::ALL_GRAPHICS, &[1; 16]);
        assert!(pipeline.has_native_layout());
        assert!(pipeline.has_native_pipeline());
        assert_eq!(pipeline.push_constants().0, &[1; 16]);
    }

    #[test]
    fn test_blend_states_extend_with_last() {
        let mut pipeline = GraphicsPipeline::new();
        pipeline.set_blending(0, BlendState::ALPHA);
        pipeline.set_blending(2, BlendState::ADDITIVE);

        let desc = pipeline.desc(Vec::new(), vk::PipelineLayout::null(), RenderPassCompat::default());
        assert_eq!(desc.blend, vec![BlendState::ALPHA, BlendState::ALPHA, BlendState::ADDITIVE]);
    }

    #[test]
    fn test_stages_in_pipeline_order() {
        let mut shaders: SlotMap<ShaderHandle, ()> = SlotMap::with_key();
        let vs = shaders.insert(());
        let fs = shaders.insert(());

        let mut pipeline = GraphicsPipeline::new();
        pipeline.set_shader(ShaderStage::Fragment, fs);
        pipeline.set_shader(ShaderStage::Vertex, vs);
        pipeline.set_shader(ShaderStage::Compute, vs);
        pipeline.set_shader(ShaderStage::RayGen, vs);
        pipeline.set_vertex_stream(0, VertexStream::packed(0, &[VertexFormat::Float3]));

        let stages: Vec<_> = pipeline.shader_stages().collect();
        assert_eq!(stages, vec![(ShaderStage::Vertex, vs), (ShaderStage::Fragment, fs)]);
        assert_eq!(pipeline.vertex_stream_count(), 1);
    }
}
