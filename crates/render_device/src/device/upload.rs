//! Blocking transfers: staging copies, layout transitions and mip generation

use ash::vk;

use super::Device;
use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::resources::{Buffer, Texture};
use crate::types::{ImageLayout, SampleCount, TextureUsage};

/// Access mask matching a resting layout
fn resting_access(layout: ImageLayout) -> vk::AccessFlags {
    match layout {
        ImageLayout::General => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        _ => vk::AccessFlags::SHADER_READ,
    }
}

fn image_barrier(
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build()
}

fn mip_offset(width: u32, height: u32, depth: u32, mip: u32) -> vk::Offset3D {
    vk::Offset3D {
        x: (width >> mip).max(1) as i32,
        y: (height >> mip).max(1) as i32,
        z: (depth >> mip).max(1) as i32,
    }
}

impl<N: NativeDevice> Device<N> {
    /// Record with `record` into a temporary command buffer, submit and wait
    pub(super) fn one_time_submit<F>(&self, record: F) -> DeviceResult<()>
    where
        F: FnOnce(&N, vk::CommandBuffer),
    {
        let native = &self.native;
        let cb = native.allocate_command_buffer(self.command_pool).map_err(|e| {
            log::error!("Failed to allocate transfer command buffer: {}", e);
            e
        })?;

        let result = native
            .begin_command_buffer(cb, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .and_then(|()| {
                record(native, cb);
                native.end_command_buffer(cb)
            })
            .and_then(|()| {
                let fence = native.create_fence(false)?;
                let buffers = [cb];
                let submit = vk::SubmitInfo::builder().command_buffers(&buffers).build();
                let waited = native
                    .queue_submit(&[submit], fence)
                    .and_then(|()| native.wait_for_fences(&[fence], self.config.fence_timeout_ns));
                native.destroy_fence(fence);
                waited
            });

        native.free_command_buffer(self.command_pool, cb);
        result.map_err(|e| {
            log::error!("Transfer submission failed: {}", e);
            e
        })
    }

    /// Copy `data` into a device-local buffer at `offset` through a staging buffer
    pub(super) fn upload_buffer(&self, dst: &Buffer, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let len = data.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > dst.size) {
            log::error!("Upload of {} bytes at {} exceeds buffer size {}", len, offset, dst.size);
            return Err(DeviceError::OutOfBounds {
                reason: format!("{}..{} outside 0..{}", offset, offset + len, dst.size),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let staging = Buffer::create_staging(&self.native, len)?;
        let result = staging.write(&self.native, 0, data).and_then(|()| {
            self.one_time_submit(|native, cb| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: offset,
                    size: len,
                };
                native.cmd_copy_buffer(cb, staging.buffer, dst.buffer, &[region]);

                let barrier = vk::BufferMemoryBarrier::builder()
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(
                        vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                            | vk::AccessFlags::INDEX_READ
                            | vk::AccessFlags::UNIFORM_READ,
                    )
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(dst.buffer)
                    .offset(offset)
                    .size(len)
                    .build();
                native.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::VERTEX_INPUT
                        | vk::PipelineStageFlags::VERTEX_SHADER
                        | vk::PipelineStageFlags::FRAGMENT_SHADER,
                    &[barrier],
                    &[],
                );
            })
        });
        staging.destroy(&self.native);
        result
    }

    /// Fill mip 0 of every layer, generate the remaining mips and leave the
    /// texture in its resting layout
    ///
    /// `data` holds the layers back to back, each tightly packed.
    pub(super) fn upload_texture(&self, texture: &Texture, data: &[u8]) -> DeviceResult<()> {
        let desc = &texture.desc;
        let expected = desc.layer_size() * u64::from(desc.layers);
        if data.len() as u64 != expected {
            log::error!(
                "Texture data is {} bytes, {}x{}x{} {:?} with {} layers needs {}",
                data.len(),
                desc.width,
                desc.height,
                desc.depth,
                desc.format,
                desc.layers,
                expected
            );
            return Err(DeviceError::invalid_operation(format!(
                "texture data size {} != {}",
                data.len(),
                expected
            )));
        }
        let sampled_single = desc.usage.contains(TextureUsage::SAMPLED) && desc.samples == SampleCount::X1;
        if !sampled_single && !desc.usage.contains(TextureUsage::TRANSFER_DST) {
            log::error!("Texture usage {:?} does not allow uploads", desc.usage);
            return Err(DeviceError::invalid_operation("texture is not a transfer destination"));
        }

        let features = self.native.format_features(desc.format.to_vk());
        let can_blit = !desc.format.is_depth()
            && features.contains(
                vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                    | vk::FormatFeatureFlags::BLIT_SRC
                    | vk::FormatFeatureFlags::BLIT_DST,
            );
        let generate_mips = desc.mips > 1 && can_blit;
        if desc.mips > 1 && !can_blit {
            log::warn!(
                "{:?} does not support linear blits; mips 1..{} left uninitialized",
                desc.format,
                desc.mips
            );
        }

        let staging = Buffer::create_staging(&self.native, expected)?;
        let result = staging.write(&self.native, 0, data).and_then(|()| {
            self.one_time_submit(|native, cb| {
                let image = texture.image;
                let aspect = desc.format.aspect();
                let full = texture.full_range();
                let resting = texture.resting_layout();
                let resting_vk = resting.to_vk();

                native.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    &[],
                    &[image_barrier(
                        image,
                        full,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::AccessFlags::empty(),
                        vk::AccessFlags::TRANSFER_WRITE,
                    )],
                );

                let copy = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: desc.layers,
                    },
                    image_offset: vk::Offset3D::default(),
                    image_extent: vk::Extent3D {
                        width: desc.width,
                        height: desc.height,
                        depth: desc.depth,
                    },
                };
                native.cmd_copy_buffer_to_image(cb, staging.buffer, image, &[copy]);

                if !generate_mips {
                    native.cmd_pipeline_barrier(
                        cb,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
                        &[],
                        &[image_barrier(
                            image,
                            full,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            resting_vk,
                            vk::AccessFlags::TRANSFER_WRITE,
                            resting_access(resting),
                        )],
                    );
                    return;
                }

                let level = |mip: u32| vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: mip,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: desc.layers,
                };
                let layers = |mip: u32| vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: mip,
                    base_array_layer: 0,
                    layer_count: desc.layers,
                };

                for mip in 1..desc.mips {
                    let src = mip - 1;
                    native.cmd_pipeline_barrier(
                        cb,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::TRANSFER,
                        &[],
                        &[image_barrier(
                            image,
                            level(src),
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            vk::AccessFlags::TRANSFER_WRITE,
                            vk::AccessFlags::TRANSFER_READ,
                        )],
                    );

                    let blit = vk::ImageBlit {
                        src_subresource: layers(src),
                        src_offsets: [
                            vk::Offset3D::default(),
                            mip_offset(desc.width, desc.height, desc.depth, src),
                        ],
                        dst_subresource: layers(mip),
                        dst_offsets: [
                            vk::Offset3D::default(),
                            mip_offset(desc.width, desc.height, desc.depth, mip),
                        ],
                    };
                    native.cmd_blit_image(cb, image, image, &blit, vk::Filter::LINEAR);

                    native.cmd_pipeline_barrier(
                        cb,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
                        &[],
                        &[image_barrier(
                            image,
                            level(src),
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            resting_vk,
                            vk::AccessFlags::TRANSFER_READ,
                            resting_access(resting),
                        )],
                    );
                }

                native.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
                    &[],
                    &[image_barrier(
                        image,
                        level(desc.mips - 1),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        resting_vk,
                        vk::AccessFlags::TRANSFER_WRITE,
                        resting_access(resting),
                    )],
                );
            })
        });
        staging.destroy(&self.native);

        if result.is_ok() {
            log::debug!(
                "Uploaded {} bytes to {:?} texture ({} mips generated)",
                expected,
                desc.format,
                if generate_mips { desc.mips - 1 } else { 0 }
            );
        }
        result
    }

    /// Move a texture without initial data from `UNDEFINED` to its resting layout
    pub(super) fn transition_to_resting(&self, texture: &Texture) -> DeviceResult<()> {
        let resting = texture.resting_layout();
        self.one_time_submit(|native, cb| {
            native.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
                &[],
                &[image_barrier(
                    texture.image,
                    texture.full_range(),
                    vk::ImageLayout::UNDEFINED,
                    resting.to_vk(),
                    vk::AccessFlags::empty(),
                    resting_access(resting),
                )],
            );
        })
    }
}
