//! Bind sets: dirty-tracked descriptor tables
//!
//! Binding a resource only records it. The native descriptor set is touched at
//! [`BindSet::flush`], which runs right before the set is used: it reallocates
//! the set when the shape (used slots, types, visibility) changed and writes
//! only the slots that changed since the last flush.

use std::ffi::c_void;

use ash::vk;

use super::{TextureHandle, UniformBufferHandle};
use crate::builders::{DescriptorSetLayoutDesc, LayoutBinding};
use crate::cache::DescriptorSetLayoutCache;
use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::types::{BindingType, ShaderStages};

/// Number of slots in every bind set
pub const MAX_BINDINGS: usize = 16;

/// Native references a slot points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundResource {
    Empty,
    UniformBuffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Image {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
    AccelerationStructure(vk::AccelerationStructureKHR),
}

/// Device handle the slot's native references came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceRef {
    None,
    Texture(TextureHandle),
    UniformBuffer(UniformBufferHandle),
    /// Owned outside the device (acceleration structures)
    External,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    ty: BindingType,
    used: bool,
    dirty: bool,
    resource: BoundResource,
    source: ResourceRef,
    stages: ShaderStages,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            ty: BindingType::UniformBuffer,
            used: false,
            dirty: false,
            resource: BoundResource::Empty,
            source: ResourceRef::None,
            stages: ShaderStages::default(),
        }
    }
}

/// Up to [`MAX_BINDINGS`] resources presented to shaders as one descriptor set
pub struct BindSet {
    slots: [Slot; MAX_BINDINGS],
    layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
}

impl BindSet {
    pub(crate) fn new() -> Self {
        Self {
            slots: [Slot::default(); MAX_BINDINGS],
            layout: vk::DescriptorSetLayout::null(),
            set: vk::DescriptorSet::null(),
        }
    }

    fn slot_index(slot: u32) -> DeviceResult<usize> {
        let index = slot as usize;
        if index >= MAX_BINDINGS {
            log::error!("Bind slot {} out of range (max {})", slot, MAX_BINDINGS);
            return Err(DeviceError::OutOfBounds {
                reason: format!("bind slot {} >= {}", slot, MAX_BINDINGS),
            });
        }
        Ok(index)
    }

    /// Record `resource` in `slot`; the slot only becomes dirty if something changed
    pub(crate) fn bind(
        &mut self,
        slot: u32,
        ty: BindingType,
        resource: BoundResource,
        source: ResourceRef,
    ) -> DeviceResult<()> {
        let entry = &mut self.slots[Self::slot_index(slot)?];
        if !entry.used || entry.ty != ty || entry.resource != resource {
            entry.dirty = true;
        }
        entry.used = true;
        entry.ty = ty;
        entry.resource = resource;
        entry.source = source;
        Ok(())
    }

    /// Clear `slot`, shrinking the layout on next flush
    pub(crate) fn unbind(&mut self, slot: u32) -> DeviceResult<()> {
        let entry = &mut self.slots[Self::slot_index(slot)?];
        *entry = Slot {
            stages: entry.stages,
            ..Slot::default()
        };
        Ok(())
    }

    /// Restrict which stages see `slot`; takes effect as a layout change
    pub(crate) fn set_visibility(&mut self, slot: u32, stages: ShaderStages) -> DeviceResult<()> {
        self.slots[Self::slot_index(slot)?].stages = stages;
        Ok(())
    }

    /// Whether `slot` holds a resource
    pub fn is_used(&self, slot: u32) -> bool {
        self.slots.get(slot as usize).map_or(false, |s| s.used)
    }

    /// Whether `slot` changed since the last flush
    pub fn is_dirty(&self, slot: u32) -> bool {
        self.slots.get(slot as usize).map_or(false, |s| s.used && s.dirty)
    }

    /// Type of the resource in `slot`, if any
    pub fn binding_type(&self, slot: u32) -> Option<BindingType> {
        self.slots.get(slot as usize).filter(|s| s.used).map(|s| s.ty)
    }

    /// Shape of the set: used slots in ascending order
    pub fn layout_desc(&self) -> DescriptorSetLayoutDesc {
        DescriptorSetLayoutDesc {
            bindings: self
                .slots
                .iter()
                .zip(0u32..)
                .filter(|(slot, _)| slot.used)
                .map(|(slot, index)| LayoutBinding {
                    slot: index,
                    ty: slot.ty,
                    stages: slot.stages,
                })
                .collect(),
        }
    }

    /// Layout used by the last flush, null before the first one
    pub fn native_layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Native descriptor set, null before the first flush
    pub fn native_set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Device resources referenced by used slots
    pub(crate) fn sources(&self) -> impl Iterator<Item = (u32, ResourceRef)> + '_ {
        self.slots
            .iter()
            .zip(0u32..)
            .filter(|(slot, _)| slot.used)
            .map(|(slot, index)| (index, slot.source))
    }

    /// Bring the native descriptor set up to date and return it
    pub(crate) fn flush<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        layouts: &mut DescriptorSetLayoutCache,
        pool: vk::DescriptorPool,
    ) -> DeviceResult<vk::DescriptorSet> {
        let layout = layouts.fetch(native, &self.layout_desc())?;

        if layout != self.layout || self.set == vk::DescriptorSet::null() {
            let set = native.allocate_descriptor_set(pool, layout).map_err(|e| {
                log::error!("Failed to allocate descriptor set: {}", e);
                e
            })?;
            if self.set != vk::DescriptorSet::null() {
                native.free_descriptor_set(pool, self.set)?;
            }
            log::debug!("Bind set reallocated for layout {:?}", layout);
            self.layout = layout;
            self.set = set;
            for slot in self.slots.iter_mut().filter(|s| s.used) {
                slot.dirty = true;
            }
        }

        self.write_dirty(native);
        Ok(self.set)
    }

    fn write_dirty<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        let dirty: Vec<(u32, Slot)> = self
            .slots
            .iter()
            .zip(0u32..)
            .filter(|(slot, _)| slot.used && slot.dirty)
            .map(|(slot, index)| (index, *slot))
            .collect();
        if dirty.is_empty() {
            return;
        }

        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        let mut accel_handles = Vec::new();
        for (_, slot) in &dirty {
            match slot.resource {
                BoundResource::UniformBuffer { buffer, offset, range } => {
                    buffer_infos.push(vk::DescriptorBufferInfo { buffer, offset, range });
                }
                BoundResource::Image { view, sampler, layout } => image_infos.push(vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                }),
                BoundResource::AccelerationStructure(handle) => accel_handles.push(handle),
                BoundResource::Empty => {}
            }
        }
        let accel_writes: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> = accel_handles
            .iter()
            .map(|handle| vk::WriteDescriptorSetAccelerationStructureKHR {
                acceleration_structure_count: 1,
                p_acceleration_structures: handle,
                ..Default::default()
            })
            .collect();

        // info vectors are complete; pointers into them stay valid until the update
        let (mut next_buffer, mut next_image, mut next_accel) = (0, 0, 0);
        let mut writes = Vec::with_capacity(dirty.len());
        for (index, slot) in &dirty {
            let mut write = vk::WriteDescriptorSet {
                dst_set: self.set,
                dst_binding: *index,
                dst_array_element: 0,
                descriptor_count: 1,
                descriptor_type: slot.ty.to_vk(),
                ..Default::default()
            };
            match slot.resource {
                BoundResource::UniformBuffer { .. } => {
                    write.p_buffer_info = &buffer_infos[next_buffer];
                    next_buffer += 1;
                }
                BoundResource::Image { .. } => {
                    write.p_image_info = &image_infos[next_image];
                    next_image += 1;
                }
                BoundResource::AccelerationStructure(_) => {
                    write.p_next = (&accel_writes[next_accel] as *const vk::WriteDescriptorSetAccelerationStructureKHR)
                        .cast::<c_void>();
                    next_accel += 1;
                }
                BoundResource::Empty => continue,
            }
            log::trace!("Descriptor write set {:?} binding {} ({:?})", self.set, index, slot.ty);
            writes.push(write);
        }

        native.update_descriptor_sets(&writes);
        for slot in &mut self.slots {
            slot.dirty = false;
        }
    }

    /// Return the native set to `pool`
    pub(crate) fn release<N: NativeDevice + ?Sized>(&mut self, native: &N, pool: vk::DescriptorPool) {
        if self.set != vk::DescriptorSet::null() {
            if let Err(e) = native.free_descriptor_set(pool, self.set) {
                log::error!("Failed to free descriptor set {:?}: {}", self.set, e);
            }
            self.set = vk::DescriptorSet::null();
        }
    }
}
