//! Ray-trace pipeline cache
//!
//! Each entry owns the native pipeline and the shader binding table filled
//! from its group handles, so a table lives exactly as long as its pipeline
//! and never has to be rebuilt under a pending submission.

use ash::vk;

use super::{CacheStats, ContentCache};
use crate::builders::{RayTracePipelineBuilder, RayTracePipelineDesc};
use crate::error::{DeviceError, DeviceResult};
use crate::native::{DeviceLimits, NativeDevice, ShaderBindingRegions};
use crate::resources::{Buffer, BufferUsage};

/// Native ray-trace pipeline plus its shader binding table
///
/// The table is a host-visible buffer with one record per shader group.
/// Regions start on the base alignment; the ray-generation region holds a
/// single record whose size equals its stride.
#[derive(Debug, Clone, Copy)]
pub struct ShaderBindingTable {
    /// Native pipeline the group handles were read from
    pub pipeline: vk::Pipeline,
    /// Table buffer
    pub buffer: vk::Buffer,
    /// Table memory
    pub memory: vk::DeviceMemory,
    /// Regions passed to `vkCmdTraceRaysKHR`
    pub regions: ShaderBindingRegions,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

impl ShaderBindingTable {
    /// Read the group handles of `pipeline` and lay them out
    fn create<N: NativeDevice + ?Sized>(
        native: &N,
        limits: &DeviceLimits,
        pipeline: vk::Pipeline,
        miss_count: usize,
        hit_count: usize,
    ) -> DeviceResult<Self> {
        let handle_size = u64::from(limits.shader_group_handle_size);
        if handle_size == 0 {
            log::error!("Device reports no shader group handle size");
            return Err(DeviceError::invalid_operation("ray-trace pipelines are not supported"));
        }
        let stride = align_up(handle_size, u64::from(limits.shader_group_handle_alignment));
        let base = u64::from(limits.shader_group_base_alignment);
        let raygen_size = align_up(stride, base);
        let miss_size = align_up(miss_count as u64 * stride, base);
        let hit_size = align_up(hit_count as u64 * stride, base);

        let group_count = (1 + miss_count + hit_count) as u32;
        let handles = native.ray_tracing_shader_group_handles(pipeline, group_count)?;
        if handles.len() as u64 != u64::from(group_count) * handle_size {
            log::error!(
                "Expected {} bytes of shader group handles, got {}",
                u64::from(group_count) * handle_size,
                handles.len()
            );
            return Err(DeviceError::invalid_state("shader group handles have the wrong size"));
        }

        let mut records = vec![0u8; (raygen_size + miss_size + hit_size) as usize];
        let starts = std::iter::once(0)
            .chain((0..miss_count as u64).map(|i| raygen_size + i * stride))
            .chain((0..hit_count as u64).map(|i| raygen_size + miss_size + i * stride));
        for (handle, start) in handles.chunks_exact(handle_size as usize).zip(starts) {
            let start = start as usize;
            records[start..start + handle.len()].copy_from_slice(handle);
        }

        let buffer = Buffer::create(
            native,
            records.len() as u64,
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            BufferUsage::Dynamic,
        )?;
        if let Err(e) = buffer.write(native, 0, &records) {
            buffer.destroy(native);
            return Err(e);
        }

        let address = native.buffer_device_address(buffer.buffer);
        let region = |offset: u64, stride: u64, size: u64| {
            if size == 0 {
                vk::StridedDeviceAddressRegionKHR::default()
            } else {
                vk::StridedDeviceAddressRegionKHR {
                    device_address: address + offset,
                    stride,
                    size,
                }
            }
        };
        log::debug!(
            "Shader binding table for {:?}: {} groups in {} bytes",
            pipeline,
            group_count,
            records.len()
        );

        Ok(Self {
            pipeline,
            buffer: buffer.buffer,
            memory: buffer.memory,
            regions: ShaderBindingRegions {
                raygen: region(0, raygen_size, raygen_size),
                miss: region(raygen_size, stride, miss_size),
                hit: region(raygen_size + miss_size, stride, hit_size),
                callable: vk::StridedDeviceAddressRegionKHR::default(),
            },
        })
    }

    fn destroy<N: NativeDevice + ?Sized>(self, native: &N) {
        native.destroy_buffer(self.buffer);
        native.free_memory(self.memory);
        native.destroy_pipeline(self.pipeline);
    }
}

/// One native ray-trace pipeline per distinct shader-group set and layout
pub struct RayTracePipelineCache {
    cache: ContentCache<RayTracePipelineDesc, ShaderBindingTable>,
}

impl RayTracePipelineCache {
    /// Empty cache
    pub fn new() -> Self {
        Self {
            cache: ContentCache::new("Ray-trace pipeline"),
        }
    }

    /// Pipeline and binding table for `desc`
    pub fn fetch<N: NativeDevice + ?Sized>(
        &mut self,
        native: &N,
        limits: &DeviceLimits,
        desc: &RayTracePipelineDesc,
    ) -> DeviceResult<ShaderBindingTable> {
        self.cache.fetch_or_create(desc, |desc| {
            let pipeline = RayTracePipelineBuilder::from_desc(desc).build(native)?;
            ShaderBindingTable::create(native, limits, pipeline, desc.miss.len(), desc.hit_groups.len()).map_err(
                |e| {
                    native.destroy_pipeline(pipeline);
                    e
                },
            )
        })
    }

    /// Number of distinct pipelines
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no pipeline was created yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Destroy every pipeline and its binding table
    pub fn clear<N: NativeDevice + ?Sized>(&mut self, native: &N) {
        self.cache.clear_with(|table| table.destroy(native));
    }
}

impl Default for RayTracePipelineCache {
    fn default() -> Self {
        Self::new()
    }
}
