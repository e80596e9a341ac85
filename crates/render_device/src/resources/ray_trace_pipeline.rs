//! Mutable ray-trace pipeline state
//!
//! Like graphics pipelines, setters only drop cached native handles. The
//! pipeline and its shader binding table are fetched together from the
//! ray-trace pipeline cache at trace time.

use ash::vk;

use super::{BindSetHandle, ShaderHandle};
use crate::builders::PipelineLayoutDesc;
use crate::native::ShaderBindingRegions;
use crate::types::ShaderStages;

/// Shaders of one triangle hit group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HitShaders {
    /// Closest-hit shader
    pub closest_hit: ShaderHandle,
    /// Optional any-hit shader
    pub any_hit: Option<ShaderHandle>,
}

/// Ray-trace pipeline description with lazily rebuilt native objects
pub struct RayTracePipeline {
    raygen: Option<ShaderHandle>,
    miss: Vec<ShaderHandle>,
    hit_groups: Vec<HitShaders>,
    max_recursion_depth: u32,
    push_constants: Vec<u8>,
    push_constant_stages: ShaderStages,
    bind_sets: Vec<Option<BindSetHandle>>,

    pub(crate) native_pipeline: vk::Pipeline,
    pub(crate) native_layout: vk::PipelineLayout,
    pub(crate) layout_desc: Option<PipelineLayoutDesc>,
    pub(crate) regions: ShaderBindingRegions,
}

impl RayTracePipeline {
    pub(crate) fn new() -> Self {
        Self {
            raygen: None,
            miss: Vec::new(),
            hit_groups: Vec::new(),
            max_recursion_depth: 1,
            push_constants: Vec::new(),
            push_constant_stages: ShaderStages::ALL_RAY_TRACING,
            bind_sets: Vec::new(),
            native_pipeline: vk::Pipeline::null(),
            native_layout: vk::PipelineLayout::null(),
            layout_desc: None,
            regions: ShaderBindingRegions::default(),
        }
    }

    fn invalidate_pipeline(&mut self) {
        self.native_pipeline = vk::Pipeline::null();
    }

    fn invalidate_layout(&mut self) {
        self.native_layout = vk::PipelineLayout::null();
        self.layout_desc = None;
        self.invalidate_pipeline();
    }

    /// Ray-generation shader
    pub fn set_raygen_shader(&mut self, shader: ShaderHandle) {
        if self.raygen != Some(shader) {
            self.raygen = Some(shader);
            self.invalidate_pipeline();
        }
    }

    /// Miss shaders, indexed by the miss index passed to `traceRayEXT`
    pub fn set_miss_shaders(&mut self, shaders: &[ShaderHandle]) {
        if self.miss != shaders {
            self.miss = shaders.to_vec();
            self.invalidate_pipeline();
        }
    }

    /// Hit groups, indexed by the instance's hit-group offset
    pub fn set_hit_groups(&mut self, groups: &[HitShaders]) {
        if self.hit_groups != groups {
            self.hit_groups = groups.to_vec();
            self.invalidate_pipeline();
        }
    }

    /// Deepest ray recursion the shaders perform
    pub fn set_max_recursion_depth(&mut self, depth: u32) {
        let depth = depth.max(1);
        if self.max_recursion_depth != depth {
            self.max_recursion_depth = depth;
            self.invalidate_pipeline();
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

    /// Push-constant bytes uploaded before every trace
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

    /// Bind-set table; gaps are `None`
    pub fn bind_sets(&self) -> &[Option<BindSetHandle>] {
        &self.bind_sets
    }

    pub(crate) fn raygen(&self) -> Option<ShaderHandle> {
        self.raygen
    }

    pub(crate) fn miss(&self) -> &[ShaderHandle] {
        &self.miss
    }

    pub(crate) fn hit_groups(&self) -> &[HitShaders] {
        &self.hit_groups
    }

    pub(crate) fn max_recursion_depth(&self) -> u32 {
        self.max_recursion_depth
    }

    pub(crate) fn push_constants(&self) -> (&[u8], ShaderStages) {
        (&self.push_constants, self.push_constant_stages)
    }
}
