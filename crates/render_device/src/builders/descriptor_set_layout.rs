//! Descriptor set layout builder

use ash::vk;

use crate::error::DeviceResult;
use crate::native::NativeDevice;
use crate::types::{BindingType, ShaderStages};

/// One binding of a layout description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutBinding {
    /// Binding slot
    pub slot: u32,
    /// Resource kind
    pub ty: BindingType,
    /// Stages that can see the binding
    pub stages: ShaderStages,
}

/// Shape of a bind set: the used slots in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutDesc {
    /// Used bindings sorted by slot
    pub bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayoutDesc {
    /// Whether the layout has no bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Descriptor set layout builder
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one single-descriptor binding
    pub fn add_binding(mut self, slot: u32, ty: BindingType, stages: ShaderStages) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(slot)
                .descriptor_type(ty.to_vk())
                .descriptor_count(1)
                .stage_flags(stages.to_vk())
                .build(),
        );
        self
    }

    /// Add every binding of `desc`
    pub fn add_bindings(self, desc: &DescriptorSetLayoutDesc) -> Self {
        desc.bindings
            .iter()
            .fold(self, |builder, b| builder.add_binding(b.slot, b.ty, b.stages))
    }

    /// Create the native layout
    pub fn build<N: NativeDevice + ?Sized>(self, native: &N) -> DeviceResult<vk::DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        native.create_descriptor_set_layout(&info).map_err(|e| {
            log::error!(
                "Failed to create descriptor set layout with {} bindings: {}",
                self.bindings.len(),
                e
            );
            e
        })
    }
}
