//! Ray-trace pipeline description and builder
//!
//! Shader groups are laid out in binding-table order: the ray-generation
//! group first, then every miss group, then every hit group.

use ash::vk;

use super::entry_point;
use crate::error::DeviceResult;
use crate::native::NativeDevice;

/// Triangle hit group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HitGroup {
    /// Closest-hit module
    pub closest_hit: vk::ShaderModule,
    /// Optional any-hit module
    pub any_hit: Option<vk::ShaderModule>,
}

/// Full ray-trace pipeline state
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RayTracePipelineDesc {
    /// Ray-generation module
    pub raygen: vk::ShaderModule,
    /// Miss modules in binding-table order
    pub miss: Vec<vk::ShaderModule>,
    /// Hit groups in binding-table order
    pub hit_groups: Vec<HitGroup>,
    /// Deepest `traceRayEXT` nesting the shaders perform
    pub max_recursion_depth: u32,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
}

impl RayTracePipelineDesc {
    /// Number of shader groups
    pub fn group_count(&self) -> u32 {
        (1 + self.miss.len() + self.hit_groups.len()) as u32
    }
}

/// Ray-trace pipeline builder
pub struct RayTracePipelineBuilder {
    stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    groups: Vec<vk::RayTracingShaderGroupCreateInfoKHR>,
    max_recursion_depth: u32,
    layout: vk::PipelineLayout,
}

impl RayTracePipelineBuilder {
    /// Empty builder for `layout`
    pub fn new(layout: vk::PipelineLayout) -> Self {
        Self {
            stages: Vec::new(),
            groups: Vec::new(),
            max_recursion_depth: 1,
            layout,
        }
    }

    fn add_stage(&mut self, stage: vk::ShaderStageFlags, module: vk::ShaderModule) -> u32 {
        self.stages.push((stage, module));
        (self.stages.len() - 1) as u32
    }

    fn add_general(mut self, stage: vk::ShaderStageFlags, module: vk::ShaderModule) -> Self {
        let index = self.add_stage(stage, module);
        self.groups.push(
            vk::RayTracingShaderGroupCreateInfoKHR::builder()
                .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
                .general_shader(index)
                .closest_hit_shader(vk::SHADER_UNUSED_KHR)
                .any_hit_shader(vk::SHADER_UNUSED_KHR)
                .intersection_shader(vk::SHADER_UNUSED_KHR)
                .build(),
        );
        self
    }

    /// Append a ray-generation group
    pub fn add_raygen(self, module: vk::ShaderModule) -> Self {
        self.add_general(vk::ShaderStageFlags::RAYGEN_KHR, module)
    }

    /// Append a miss group
    pub fn add_miss(self, module: vk::ShaderModule) -> Self {
        self.add_general(vk::ShaderStageFlags::MISS_KHR, module)
    }

    /// Append a triangle hit group
    pub fn add_hit_group(mut self, group: HitGroup) -> Self {
        let closest = self.add_stage(vk::ShaderStageFlags::CLOSEST_HIT_KHR, group.closest_hit);
        let any = group.any_hit.map_or(vk::SHADER_UNUSED_KHR, |module| {
            self.add_stage(vk::ShaderStageFlags::ANY_HIT_KHR, module)
        });
        self.groups.push(
            vk::RayTracingShaderGroupCreateInfoKHR::builder()
                .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
                .general_shader(vk::SHADER_UNUSED_KHR)
                .closest_hit_shader(closest)
                .any_hit_shader(any)
                .intersection_shader(vk::SHADER_UNUSED_KHR)
                .build(),
        );
        self
    }

    /// Maximum recursion depth, at least 1
    pub fn max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth.max(1);
        self
    }

    /// Populate from a description
    pub fn from_desc(desc: &RayTracePipelineDesc) -> Self {
        let builder = desc
            .miss
            .iter()
            .fold(Self::new(desc.layout).add_raygen(desc.raygen), |builder, &module| {
                builder.add_miss(module)
            });
        desc.hit_groups
            .iter()
            .fold(builder, |builder, &group| builder.add_hit_group(group))
            .max_recursion_depth(desc.max_recursion_depth)
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

        let info = vk::RayTracingPipelineCreateInfoKHR::builder()
            .stages(&stage_infos)
            .groups(&self.groups)
            .max_pipeline_ray_recursion_depth(self.max_recursion_depth)
            .layout(self.layout);

        native.create_ray_tracing_pipeline(&info).map_err(|e| {
            log::error!(
                "Failed to create ray-trace pipeline ({} stages, {} groups): {}",
                self.stages.len(),
                self.groups.len(),
                e
            );
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_groups_follow_binding_table_order() {
        let module = |raw| vk::ShaderModule::from_raw(raw);
        let desc = RayTracePipelineDesc {
            raygen: module(1),
            miss: vec![module(2), module(3)],
            hit_groups: vec![HitGroup {
                closest_hit: module(4),
                any_hit: Some(module(5)),
            }],
            max_recursion_depth: 0,
            layout: vk::PipelineLayout::from_raw(9),
        };
        let builder = RayTracePipelineBuilder::from_desc(&desc);

        assert_eq!(desc.group_count(), 4);
        assert_eq!(builder.groups.len(), 4);
        assert_eq!(builder.stages.len(), 5);
        assert_eq!(builder.max_recursion_depth, 1);

        let hit = builder.groups[3];
        assert_eq!(hit.ty, vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP);
        assert_eq!((hit.closest_hit_shader, hit.any_hit_shader), (3, 4));
        assert_eq!(builder.groups[1].general_shader, 1);
        assert_eq!(builder.groups[0].closest_hit_shader, vk::SHADER_UNUSED_KHR);
    }
}
