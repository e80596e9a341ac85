//! Pipeline layout builder

use ash::vk;

use crate::error::DeviceResult;
use crate::native::NativeDevice;
use crate::types::ShaderStages;

/// Shape of a pipeline layout
///
/// Set layouts are themselves content-cached, so equal shapes share handles
/// and comparing handles is comparing shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutDesc {
    /// One layout per bind-set index
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Size of the push-constant block in bytes, `0` for none
    pub push_constant_size: u32,
    /// Stages the push-constant block is visible to
    pub push_constant_stages: ShaderStages,
}

/// Pipeline layout builder
#[derive(Default)]
pub struct PipelineLayoutBuilder {
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor set layout at the next set index
    pub fn add_set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    /// Add a push-constant range starting at offset 0
    pub fn add_push_constant_range(mut self, stages: ShaderStages, size: u32) -> Self {
        if size > 0 {
            self.push_constant_ranges.push(
                vk::PushConstantRange::builder()
                    .stage_flags(stages.to_vk())
                    .offset(0)
                    .size(size)
                    .build(),
            );
        }
        self
    }

    /// Populate from a description
    pub fn from_desc(desc: &PipelineLayoutDesc) -> Self {
        desc.set_layouts
            .iter()
            .fold(Self::new(), |builder, &layout| builder.add_set_layout(layout))
            .add_push_constant_range(desc.push_constant_stages, desc.push_constant_size)
    }

    /// Create the native layout
    pub fn build<N: NativeDevice + ?Sized>(self, native: &N) -> DeviceResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);

        native.create_pipeline_layout(&info).map_err(|e| {
            log::error!(
                "Failed to create pipeline layout ({} sets, {} push ranges): {}",
                self.set_layouts.len(),
                self.push_constant_ranges.len(),
                e
            );
            e
        })
    }
}
