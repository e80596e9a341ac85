use ash::vk::{self, Handle};

use super::*;
use crate::builders::{AttachmentDesc, RenderPassDescription, VertexStream};
use crate::native::recording::RecordingDevice;
use crate::resources::{
    BufferUsage, FrameBufferAttachment, FrameBufferDescription, HitShaders, TextureDescription, MAX_BINDINGS,
};
use crate::types::{
    BindingType, ClearValue, CullMode, Format, IndexFormat, LoadOp, SampleCount, ShaderIl, ShaderStage,
    ShaderStages, TextureUsage, VertexFormat,
};

fn device() -> Device<RecordingDevice> {
    crate::logging::init();
    Device::with_native(RecordingDevice::new(), DeviceConfig::new("device tests")).unwrap()
}

fn spirv() -> Vec<u8> {
    [0x0723_0203u32, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}

fn color_pass(device: &mut Device<RecordingDevice>, format: Format, load_op: LoadOp) -> RenderPassHandle {
    device
        .create_render_pass(RenderPassDescription {
            attachments: vec![AttachmentDesc::color(format, SampleCount::X1, load_op)],
            color: vec![0],
            depth: None,
            resolve: Vec::new(),
        })
        .unwrap()
}

fn offscreen(device: &mut Device<RecordingDevice>, format: Format) -> (RenderPassHandle, FrameBufferHandle) {
    let pass = color_pass(device, format, LoadOp::Clear);
    let target = device
        .create_texture(TextureDescription::render_target(64, 64, format, SampleCount::X1), None)
        .unwrap();
    let framebuffer = device
        .create_frame_buffer(FrameBufferDescription {
            attachments: vec![FrameBufferAttachment::texture(target)],
            width: 64,
            height: 64,
        })
        .unwrap();
    (pass, framebuffer)
}

fn pipeline(device: &mut Device<RecordingDevice>) -> PipelineHandle {
    let vs = device
        .create_shader_from_il(ShaderStage::Vertex, ShaderIl::SpirV, &spirv())
        .unwrap();
    let fs = device
        .create_shader_from_il(ShaderStage::Fragment, ShaderIl::SpirV, &spirv())
        .unwrap();
    let handle = device.create_graphics_pipeline().unwrap();
    let state = device.graphics_pipeline_mut(handle).unwrap();
    state.set_shader(ShaderStage::Vertex, vs);
    state.set_shader(ShaderStage::Fragment, fs);
    state.set_vertex_stream(0, VertexStream::packed(0, &[VertexFormat::Float3]));
    handle
}

fn vertices(device: &mut Device<RecordingDevice>) -> VertexBufferHandle {
    device.create_vertex_buffer(BufferUsage::Dynamic, 36, None).unwrap()
}

/// Command buffer recording inside `pass`
fn in_pass(device: &mut Device<RecordingDevice>, pass: RenderPassHandle, fb: FrameBufferHandle) -> CommandBufferHandle {
    let cb = device.create_command_buffer().unwrap();
    device.begin_command_buffer(cb).unwrap();
    device.begin_render_pass(cb, pass, fb, &[]).unwrap();
    cb
}

fn ubo_set(device: &mut Device<RecordingDevice>, slots: u32) -> (BindSetHandle, UniformBufferHandle) {
    let ubo = device
        .create_uniform_buffer(BufferUsage::Dynamic, 256 * u64::from(slots.max(1)), None)
        .unwrap();
    let set = device.create_bind_set().unwrap();
    for slot in 0..slots {
        device
            .bind_uniform_buffer(set, slot, ubo, 256 * u64::from(slot), 256)
            .unwrap();
    }
    (set, ubo)
}

#[test]
fn test_same_bind_set_keeps_layout_and_new_shape_adds_one() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let (a, _) = ubo_set(&mut device, 1);
    let (x, _) = ubo_set(&mut device, 1);
    let (y, _) = ubo_set(&mut device, 2);

    device.graphics_pipeline_mut(p).unwrap().set_bind_set(0, a);
    device.graphics_pipeline_mut(p).unwrap().set_bind_set(1, x);
    let cb = in_pass(&mut device, pass, fb);
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    let layouts = device.cache_stats().pipeline_layouts.entries;
    let pipelines_built = device.native().calls("create_graphics_pipeline");

    device.graphics_pipeline_mut(p).unwrap().set_bind_set(1, x);
    assert_eq!(device.cache_stats().pipeline_layouts.entries, layouts);
    assert!(device.graphics_pipeline(p).unwrap().has_native_pipeline());
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    assert_eq!(device.cache_stats().pipeline_layouts.entries, layouts);
    assert_eq!(device.native().calls("create_graphics_pipeline"), pipelines_built);

    device.graphics_pipeline_mut(p).unwrap().set_bind_set(1, y);
    assert!(!device.graphics_pipeline(p).unwrap().has_native_pipeline());
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    assert_eq!(device.cache_stats().pipeline_layouts.entries, layouts + 1);
    assert!(device.graphics_pipeline(p).unwrap().has_native_pipeline());
}

#[test]
fn test_many_draws_build_and_bind_pipeline_once() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let cb = in_pass(&mut device, pass, fb);

    device.graphics_pipeline_mut(p).unwrap().set_cull_mode(CullMode::Front);
    for _ in 0..5 {
        device.draw(cb, p, &[vb], 3, 1).unwrap();
    }

    assert_eq!(device.native().calls("create_graphics_pipeline"), 1);
    assert_eq!(device.native().calls("cmd_bind_pipeline"), 1);
    assert_eq!(device.native().calls("cmd_draw"), 5);
}

#[test]
fn test_rebinding_same_texture_writes_descriptors_once() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let texture = device
        .create_texture(TextureDescription::new_2d(4, 4, Format::Rgba8Unorm), None)
        .unwrap();
    let set = device.create_bind_set().unwrap();
    device.graphics_pipeline_mut(p).unwrap().set_bind_set(0, set);
    let cb = in_pass(&mut device, pass, fb);

    device.bind_texture(set, 0, texture).unwrap();
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    device.bind_texture(set, 0, texture).unwrap();
    assert!(!device.bind_set(set).unwrap().is_dirty(0));
    device.draw(cb, p, &[vb], 3, 1).unwrap();

    assert_eq!(device.native().calls("update_descriptor_sets"), 1);
    assert_eq!(device.bind_set(set).unwrap().binding_type(0), Some(BindingType::SampledTexture));
}

#[test]
fn test_single_slot_change_updates_only_that_slot() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let (set, ubo) = ubo_set(&mut device, 5);
    device.graphics_pipeline_mut(p).unwrap().set_bind_set(0, set);
    let cb = in_pass(&mut device, pass, fb);
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    device.native().clear_descriptor_updates();

    device.bind_uniform_buffer(set, 3, ubo, 0, 256).unwrap();
    device.draw(cb, p, &[vb], 3, 1).unwrap();

    assert_eq!(device.native().descriptor_updates(), vec![vec![3]]);
}

#[test]
fn test_added_binding_rewrites_every_slot() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let (set, ubo) = ubo_set(&mut device, 2);
    device.graphics_pipeline_mut(p).unwrap().set_bind_set(0, set);
    let cb = in_pass(&mut device, pass, fb);
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    device.native().clear_descriptor_updates();

    device.bind_uniform_buffer(set, 4, ubo, 0, 256).unwrap();
    device.draw(cb, p, &[vb], 3, 1).unwrap();

    assert_eq!(device.native().descriptor_updates(), vec![vec![0, 1, 4]]);
    assert_eq!(device.native().calls("free_descriptor_set"), 1);
    assert_eq!(device.native().calls("create_graphics_pipeline"), 2);
}

#[test]
fn test_visibility_change_is_a_layout_change() {
    let mut device = device();
    let (set, _) = ubo_set(&mut device, 1);
    let before = device.bind_set(set).unwrap().layout_desc();

    device
        .set_binding_visibility(set, 0, ShaderStages::FRAGMENT)
        .unwrap();

    assert_ne!(device.bind_set(set).unwrap().layout_desc(), before);
    device.unbind(set, 0).unwrap();
    assert!(!device.bind_set(set).unwrap().is_used(0));
}

#[test]
fn test_uniform_binding_checks_alignment_and_range() {
    let mut device = device();
    let (set, ubo) = ubo_set(&mut device, 1);

    assert!(matches!(
        device.bind_uniform_buffer(set, 1, ubo, 4, 16),
        Err(DeviceError::InvalidOperation { .. })
    ));
    assert!(matches!(
        device.bind_uniform_buffer(set, 1, ubo, 0, 512),
        Err(DeviceError::OutOfBounds { .. })
    ));
    assert!(matches!(
        device.bind_uniform_buffer(set, MAX_BINDINGS as u32, ubo, 0, 16),
        Err(DeviceError::OutOfBounds { .. })
    ));
}

#[test]
fn test_acceleration_structure_binding() {
    let mut device = device();
    let set = device.create_bind_set().unwrap();

    device
        .bind_top_level_acceleration_structure(set, 2, vk::AccelerationStructureKHR::from_raw(77))
        .unwrap();
    assert_eq!(
        device.bind_set(set).unwrap().binding_type(2),
        Some(BindingType::AccelerationStructure)
    );
    assert!(device
        .bind_top_level_acceleration_structure(set, 3, vk::AccelerationStructureKHR::null())
        .is_err());
}

fn ray_trace_pipeline(device: &mut Device<RecordingDevice>) -> RayTracePipelineHandle {
    let [raygen, miss, shadow, hit] =
        [ShaderStage::RayGen, ShaderStage::Miss, ShaderStage::Miss, ShaderStage::ClosestHit]
            .map(|stage| device.create_shader_from_il(stage, ShaderIl::SpirV, &spirv()).unwrap());
    let handle = device.create_ray_trace_pipeline().unwrap();
    let state = device.ray_trace_pipeline_mut(handle).unwrap();
    state.set_raygen_shader(raygen);
    state.set_miss_shaders(&[miss, shadow]);
    state.set_hit_groups(&[HitShaders {
        closest_hit: hit,
        any_hit: None,
    }]);
    handle
}

fn recording(device: &mut Device<RecordingDevice>) -> CommandBufferHandle {
    let cb = device.create_command_buffer().unwrap();
    device.begin_command_buffer(cb).unwrap();
    cb
}

#[test]
fn test_trace_rays_flushes_bind_sets_and_builds_once() {
    let mut device = device();
    let rt = ray_trace_pipeline(&mut device);
    let set = device.create_bind_set().unwrap();
    device
        .bind_top_level_acceleration_structure(set, 0, vk::AccelerationStructureKHR::from_raw(77))
        .unwrap();
    device
        .set_binding_visibility(set, 0, ShaderStages::ALL_RAY_TRACING)
        .unwrap();
    device.ray_trace_pipeline_mut(rt).unwrap().set_bind_set(0, set);

    let cb = recording(&mut device);
    for _ in 0..3 {
        device.trace_rays(cb, rt, 64, 64, 1).unwrap();
    }

    let native = device.native();
    assert_eq!(native.calls("create_ray_tracing_pipeline"), 1);
    assert_eq!(native.calls("update_descriptor_sets"), 1);
    assert_eq!(native.calls("cmd_bind_descriptor_sets"), 3);
    assert_eq!(native.calls("cmd_trace_rays"), 3);
    // ray-trace binds leave the graphics bind point alone
    assert_eq!(native.calls("cmd_bind_pipeline"), 3);
    assert!(native.bound_pipelines().is_empty());
    assert_eq!(device.cache_stats().ray_trace_pipelines.entries, 1);

    let regions = native.traces()[2];
    assert_eq!((regions.raygen.stride, regions.raygen.size), (64, 64));
    assert_eq!((regions.miss.stride, regions.miss.size), (32, 64));
    assert_eq!((regions.hit.stride, regions.hit.size), (32, 64));
    assert_eq!(regions.miss.device_address, regions.raygen.device_address + 64);
}

#[test]
fn test_group_change_rebuilds_pipeline_and_keeps_layout() {
    let mut device = device();
    let rt = ray_trace_pipeline(&mut device);
    let cb = recording(&mut device);
    device.trace_rays(cb, rt, 8, 8, 1).unwrap();
    let layouts = device.cache_stats().pipeline_layouts.entries;

    device.ray_trace_pipeline_mut(rt).unwrap().set_hit_groups(&[]);
    assert!(!device.ray_trace_pipeline(rt).unwrap().has_native_pipeline());
    device.trace_rays(cb, rt, 8, 8, 1).unwrap();

    assert_eq!(device.native().calls("create_ray_tracing_pipeline"), 2);
    assert_eq!(device.cache_stats().pipeline_layouts.entries, layouts);
    assert_eq!(device.native().traces()[1].hit.size, 0);

    // destroying the record keeps the cached pipeline until shutdown
    device.destroy_ray_trace_pipeline(rt).unwrap();
    assert!(device.trace_rays(cb, rt, 8, 8, 1).is_err());
    assert_eq!(device.native().calls("destroy_pipeline"), 0);
    device.shutdown();
    assert_eq!(device.native().calls("destroy_pipeline"), 2);
    assert_eq!(
        device.native().calls("destroy_buffer"),
        device.native().calls("create_buffer")
    );
}

#[test]
fn test_trace_rays_rejects_bad_state_before_recording() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let rt = ray_trace_pipeline(&mut device);

    let in_render_pass = in_pass(&mut device, pass, fb);
    assert!(device.trace_rays(in_render_pass, rt, 8, 8, 1).is_err());
    let idle = device.create_command_buffer().unwrap();
    assert!(device.trace_rays(idle, rt, 8, 8, 1).is_err());

    let cb = recording(&mut device);
    let empty = device.create_ray_trace_pipeline().unwrap();
    assert!(matches!(
        device.trace_rays(cb, empty, 8, 8, 1),
        Err(DeviceError::InvalidState { .. })
    ));

    let miss = device
        .create_shader_from_il(ShaderStage::Miss, ShaderIl::SpirV, &spirv())
        .unwrap();
    device.ray_trace_pipeline_mut(empty).unwrap().set_raygen_shader(miss);
    assert!(matches!(
        device.trace_rays(cb, empty, 8, 8, 1),
        Err(DeviceError::InvalidOperation { .. })
    ));

    let native = device.native();
    assert_eq!(native.calls("create_ray_tracing_pipeline"), 0);
    assert_eq!(native.calls("cmd_bind_pipeline"), 0);
    assert_eq!(native.calls("cmd_trace_rays"), 0);
}

#[test]
fn test_pipeline_reused_by_compatible_pass_and_rebuilt_for_other_format() {
    let mut device = device();
    let (clear_pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let load_pass = color_pass(&mut device, Format::Rgba8Unorm, LoadOp::Load);
    let (hdr_pass, hdr_fb) = offscreen(&mut device, Format::Rgba16Float);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);

    let cb = device.create_command_buffer().unwrap();
    device.begin_command_buffer(cb).unwrap();
    for pass in [clear_pass, load_pass] {
        device.begin_render_pass(cb, pass, fb, &[]).unwrap();
        device.draw(cb, p, &[vb], 3, 1).unwrap();
        device.end_render_pass(cb).unwrap();
    }
    assert_eq!(device.native().calls("create_graphics_pipeline"), 1);

    device.begin_render_pass(cb, hdr_pass, hdr_fb, &[]).unwrap();
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    device.end_render_pass(cb).unwrap();
    assert_eq!(device.native().calls("create_graphics_pipeline"), 2);
    assert_eq!(device.cache_stats().pipelines.entries, 2);
}

#[test]
fn test_frame_buffer_native_built_per_render_pass() {
    let mut device = device();
    let (clear_pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let load_pass = color_pass(&mut device, Format::Rgba8Unorm, LoadOp::Load);

    let cb = device.create_command_buffer().unwrap();
    device.begin_command_buffer(cb).unwrap();
    for pass in [clear_pass, load_pass, clear_pass] {
        device.begin_render_pass(cb, pass, fb, &[]).unwrap();
        device.end_render_pass(cb).unwrap();
    }

    assert_eq!(device.native().calls("create_framebuffer"), 2);
    assert_eq!(device.native().calls("cmd_begin_render_pass"), 3);
}

#[test]
fn test_frame_buffer_rejects_missing_subresources() {
    let mut device = device();
    let target = device
        .create_texture(TextureDescription::render_target(64, 64, Format::Rgba8Unorm, SampleCount::X1), None)
        .unwrap();
    let attach = |mip, layer| FrameBufferDescription {
        attachments: vec![FrameBufferAttachment::Texture { texture: target, mip, layer }],
        width: 64,
        height: 64,
    };

    for (mip, layer) in [(40, 0), (1, 0), (0, 3)] {
        assert!(matches!(
            device.create_frame_buffer(attach(mip, layer)),
            Err(DeviceError::OutOfBounds { .. })
        ));
    }
    device.create_frame_buffer(attach(0, 0)).unwrap();
}

#[test]
fn test_draw_without_vertex_shader_fails() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = device.create_graphics_pipeline().unwrap();
    let cb = in_pass(&mut device, pass, fb);

    assert!(matches!(device.draw(cb, p, &[], 3, 1), Err(DeviceError::InvalidState { .. })));
    assert_eq!(device.native().calls("create_graphics_pipeline"), 0);
}

#[test]
fn test_rejected_draw_records_nothing() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let ib = device
        .create_index_buffer(BufferUsage::Dynamic, IndexFormat::U16, 12, None)
        .unwrap();
    let cb = in_pass(&mut device, pass, fb);

    assert!(matches!(
        device.draw(cb, p, &[], 3, 1),
        Err(DeviceError::InvalidOperation { .. })
    ));
    assert!(matches!(
        device.draw_indexed(cb, p, &[vb], ib, 7, 1),
        Err(DeviceError::OutOfBounds { .. })
    ));

    let native = device.native();
    for method in ["cmd_bind_pipeline", "cmd_set_viewport", "cmd_set_scissor", "cmd_bind_vertex_buffers"] {
        assert_eq!(native.calls(method), 0, "{}", method);
    }
    assert_eq!(native.calls("create_graphics_pipeline"), 0);
}

#[test]
fn test_indexed_draw_checks_index_count() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let ib = device
        .create_index_buffer(BufferUsage::Dynamic, IndexFormat::U16, 12, None)
        .unwrap();
    let cb = in_pass(&mut device, pass, fb);

    device.draw_indexed(cb, p, &[vb], ib, 6, 1).unwrap();
    assert!(device.draw_indexed(cb, p, &[vb], ib, 7, 1).is_err());
    assert_eq!(device.native().calls("cmd_draw_indexed"), 1);
    assert!(device
        .create_index_buffer(BufferUsage::Dynamic, IndexFormat::U32, 6, None)
        .is_err());
}

#[test]
fn test_begin_requires_initial_state() {
    let mut device = device();
    let cb = device.create_command_buffer().unwrap();

    device.begin_command_buffer(cb).unwrap();
    assert!(matches!(
        device.begin_command_buffer(cb),
        Err(DeviceError::InvalidState { .. })
    ));
    assert_eq!(device.native().calls("begin_command_buffer"), 1);

    device.end_command_buffer(cb).unwrap();
    assert_eq!(device.command_buffer_state(cb).unwrap(), CommandBufferState::Executable);
    assert!(device.begin_command_buffer(cb).is_err());
}

#[test]
fn test_render_pass_and_draw_need_the_right_state() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let cb = device.create_command_buffer().unwrap();

    assert!(device.begin_render_pass(cb, pass, fb, &[]).is_err());
    device.begin_command_buffer(cb).unwrap();
    assert!(device.draw(cb, p, &[vb], 3, 1).is_err());
    assert!(device.clear(cb, Some([0.0; 4]), None).is_err());

    device.begin_render_pass(cb, pass, fb, &[]).unwrap();
    assert!(device.begin_render_pass(cb, pass, fb, &[]).is_err());
    assert!(device.end_command_buffer(cb).is_err());
    device.clear(cb, Some([0.0, 0.0, 0.0, 1.0]), Some(1.0)).unwrap();
    device.end_render_pass(cb).unwrap();
    device.end_command_buffer(cb).unwrap();

    assert_eq!(device.native().calls("cmd_draw"), 0);
    assert_eq!(device.native().calls("cmd_clear_attachments"), 1);
}

#[test]
fn test_reset_before_fence_signals_fails() {
    let mut device = device();
    let cb = device.create_command_buffer().unwrap();
    device.begin_command_buffer(cb).unwrap();
    device.end_command_buffer(cb).unwrap();

    device.native().hold_fences(true);
    device.submit(cb).unwrap();
    assert_eq!(device.command_buffer_state(cb).unwrap(), CommandBufferState::Submitted);
    assert!(matches!(
        device.reset_command_buffer(cb),
        Err(DeviceError::InvalidState { .. })
    ));
    assert!(device.wait_for(&[cb]).is_err());

    device.native().complete_all();
    device.wait_for(&[cb]).unwrap();
    device.reset_command_buffer(cb).unwrap();
    assert_eq!(device.command_buffer_state(cb).unwrap(), CommandBufferState::Initial);
}

#[test]
fn test_submit_requires_executable_and_submitted_dependencies() {
    let mut device = device();
    let first = device.create_command_buffer().unwrap();
    let second = device.create_command_buffer().unwrap();

    assert!(device.submit(first).is_err());
    for cb in [first, second] {
        device.begin_command_buffer(cb).unwrap();
        device.end_command_buffer(cb).unwrap();
    }

    assert!(device.submit_synced(second, None, &[first]).is_err());
    // a plain submission signals nothing to wait on
    device.submit(first).unwrap();
    assert!(matches!(
        device.submit_synced(second, None, &[first]),
        Err(DeviceError::InvalidState { .. })
    ));
    device.wait_idle().unwrap();
    device.submit_synced(first, None, &[]).unwrap();
    device.submit_synced(second, None, &[first]).unwrap();
    assert_eq!(device.native().calls("queue_submit"), 3);

    // executable again once finished, so it can be resubmitted
    device.wait_idle().unwrap();
    device.submit(first).unwrap();
    assert_eq!(device.native().semaphore_misuse(), 0);
}

#[test]
fn test_resubmission_never_signals_a_signaled_semaphore() {
    let mut device = device();
    let cb = device.create_command_buffer().unwrap();

    for synced in [false, false, true, true] {
        device.begin_command_buffer(cb).unwrap();
        device.end_command_buffer(cb).unwrap();
        if synced {
            device.submit_synced(cb, None, &[]).unwrap();
        } else {
            device.submit(cb).unwrap();
        }
        device.wait_for(&[cb]).unwrap();
        device.reset_command_buffer(cb).unwrap();
    }

    // resubmitted without a reset, nobody waited in between
    device.begin_command_buffer(cb).unwrap();
    device.end_command_buffer(cb).unwrap();
    device.submit_synced(cb, None, &[]).unwrap();
    device.wait_for(&[cb]).unwrap();
    device.submit_synced(cb, None, &[]).unwrap();

    assert_eq!(device.native().calls("queue_submit"), 6);
    assert_eq!(device.native().semaphore_misuse(), 0);
}

#[test]
fn test_failed_submit_leaves_acquire_for_present() {
    let mut device = device();
    let sc = swap_chain(&mut device);
    let cb = device.create_command_buffer().unwrap();
    device.begin_command_buffer(cb).unwrap();
    device.end_command_buffer(cb).unwrap();
    assert!(device.acquire(sc).unwrap());

    device.native().fail_next("queue_submit");
    assert!(device.submit_synced(cb, Some(sc), &[]).is_err());
    assert_eq!(device.command_buffer_state(cb).unwrap(), CommandBufferState::Executable);
    // the fence is signaled again, so waiting does not time out
    device.wait_for(&[cb]).unwrap();
    assert!(device.present(sc, &[cb]).is_err());

    // the image still waits on its acquire
    assert!(device.present(sc, &[]).unwrap());
    assert_eq!(device.native().present_waits().len(), 1);
    assert_eq!(device.native().semaphore_misuse(), 0);
}

fn swap_chain(device: &mut Device<RecordingDevice>) -> SwapChainHandle {
    device.create_swap_chain(800, 600).unwrap()
}

#[test]
fn test_swap_chain_setup() {
    let mut device = device();
    let sc = swap_chain(&mut device);

    assert_eq!(device.swap_chain_image_count(sc).unwrap(), 3);
    assert_eq!(device.swap_chain_extent(sc).unwrap(), (800, 600));
    assert_eq!(device.swap_chain_format(sc).unwrap(), Format::Bgra8Srgb);
    assert_eq!(
        device.swap_chain_attachments(sc).unwrap(),
        (SampleCount::X1, Some(Format::D32Float))
    );
    assert!(device.swap_chain_frame_buffer(sc).is_err());
    // one image-available semaphore per image
    assert_eq!(device.native().calls("create_semaphore"), 3);
}

#[test]
fn test_frame_ring_returns_to_start_after_image_count_acquires() {
    let mut device = device();
    let sc = swap_chain(&mut device);
    let count = device.swap_chain_image_count(sc).unwrap() as usize;
    let start = device.swap_chain_frame_index(sc).unwrap();

    let mut seen = Vec::new();
    for _ in 0..count {
        assert!(device.acquire(sc).unwrap());
        seen.push(device.swap_chain_frame_index(sc).unwrap());
    }

    assert_eq!(device.swap_chain_frame_index(sc).unwrap(), start);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), count);
}

#[test]
fn test_full_frame_presents() {
    let mut device = device();
    let sc = swap_chain(&mut device);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let cb = device.create_command_buffer().unwrap();

    for _ in 0..4 {
        assert!(device.acquire(sc).unwrap());
        device.reset_command_buffer(cb).unwrap();
        device.begin_command_buffer(cb).unwrap();
        let pass = device.swap_chain_render_pass(sc).unwrap();
        let fb = device.swap_chain_frame_buffer(sc).unwrap();
        device
            .begin_render_pass(cb, pass, fb, &[ClearValue::Color([0.1, 0.1, 0.1, 1.0])])
            .unwrap();
        device.draw(cb, p, &[vb], 3, 1).unwrap();
        device.end_render_pass(cb).unwrap();
        device.end_command_buffer(cb).unwrap();
        device.submit_synced(cb, Some(sc), &[]).unwrap();
        assert!(device.present(sc, &[cb]).unwrap());
    }

    assert_eq!(device.native().calls("queue_present"), 4);
    assert_eq!(device.native().calls("create_graphics_pipeline"), 1);
    // one native frame buffer per swap image
    assert_eq!(device.native().calls("create_framebuffer"), 3);
    assert!(device.present(sc, &[cb]).is_err());
}

#[test]
fn test_stale_swap_chain_reports_false_until_reinit() {
    let mut device = device();
    let sc = swap_chain(&mut device);
    let pass = device.swap_chain_render_pass(sc).unwrap();

    device
        .native()
        .set_acquire_error(Some(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(!device.acquire(sc).unwrap());
    assert!(device.swap_chain_frame_buffer(sc).is_err());

    device.reinit(sc, 1024, 768).unwrap();
    device.native().set_acquire_error(None);
    assert!(device.acquire(sc).unwrap());
    assert_eq!(device.swap_chain_extent(sc).unwrap(), (1024, 768));
    assert_eq!(device.swap_chain_render_pass(sc).unwrap(), pass);
    assert_eq!(device.native().calls("create_swapchain"), 2);
    assert_eq!(device.native().calls("destroy_swapchain"), 1);

    device
        .native()
        .set_present_error(Some(vk::Result::SUBOPTIMAL_KHR));
    assert!(!device.present(sc, &[]).unwrap());

    device
        .native()
        .set_acquire_error(Some(vk::Result::ERROR_DEVICE_LOST));
    assert!(matches!(
        device.acquire(sc),
        Err(DeviceError::Api(vk::Result::ERROR_DEVICE_LOST))
    ));
}

#[test]
fn test_reinit_rejects_zero_extent() {
    let mut device = device();
    let sc = swap_chain(&mut device);

    assert!(matches!(device.reinit(sc, 0, 600), Err(DeviceError::InvalidState { .. })));
    assert_eq!(device.swap_chain_extent(sc).unwrap(), (800, 600));
}

#[test]
fn test_static_buffers_upload_through_staging_and_cannot_map() {
    let mut device = device();
    let data = [7u8; 64];
    let vb = device
        .create_vertex_buffer(BufferUsage::Static, 64, Some(&data))
        .unwrap();

    assert_eq!(device.native().calls("cmd_copy_buffer"), 1);
    assert_eq!(device.native().calls("queue_submit"), 1);
    assert!(matches!(
        device.map_vertex_buffer(vb),
        Err(DeviceError::InvalidOperation { .. })
    ));
    assert!(device.unmap_vertex_buffer(vb).is_err());

    device.update_vertex_buffer(vb, 32, &data[..32]).unwrap();
    assert_eq!(device.native().calls("cmd_copy_buffer"), 2);
    assert!(device.update_vertex_buffer(vb, 48, &data[..32]).is_err());
}

#[test]
fn test_dynamic_buffers_map_once_and_update_in_place() {
    let mut device = device();
    let ubo = device.create_uniform_buffer(BufferUsage::Dynamic, 16, None).unwrap();

    device.map_uniform_buffer(ubo).unwrap();
    assert!(matches!(device.map_uniform_buffer(ubo), Err(DeviceError::InvalidState { .. })));
    assert!(device.update_uniform_buffer(ubo, 0, &[1, 2]).is_err());
    device.unmap_uniform_buffer(ubo).unwrap();

    device.update_uniform_buffer_with(ubo, 4, &[1.0f32, 2.0]).unwrap();
    let memory = device.uniform_buffers[ubo].memory;
    let contents = device.native().memory_contents(memory);
    assert_eq!(&contents[4..12], bytemuck::bytes_of(&[1.0f32, 2.0]));
    assert_eq!(device.native().calls("queue_submit"), 0);
}

#[test]
fn test_cube_textures_are_cube_compatible() {
    let mut device = device();
    let cube = device
        .create_texture(TextureDescription::cube(32, Format::Rgba16Float), None)
        .unwrap();
    let flat = device
        .create_texture(TextureDescription::new_2d(32, 32, Format::Rgba16Float), None)
        .unwrap();

    let cube_image = device.textures[cube].image;
    let flat_image = device.textures[flat].image;
    assert!(device
        .native()
        .image_flags(cube_image)
        .contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
    assert!(!device
        .native()
        .image_flags(flat_image)
        .contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
}

#[test]
fn test_texture_upload_generates_mip_chain() {
    let mut device = device();
    let desc = TextureDescription::new_2d(64, 64, Format::Rgba8Unorm).full_mip_chain();
    let data = vec![0u8; 64 * 64 * 4];

    let texture = device.create_texture(desc, Some(&data)).unwrap();

    assert_eq!(device.texture_description(texture).unwrap().mips, 7);
    assert_eq!(device.native().calls("cmd_copy_buffer_to_image"), 1);
    assert_eq!(device.native().calls("cmd_blit_image"), 6);

    assert!(device.create_texture(desc, Some(&data[..100])).is_err());
    assert_eq!(device.native().calls("destroy_image"), 1);
}

#[test]
fn test_storage_texture_binding() {
    let mut device = device();
    let storage = device
        .create_texture(
            TextureDescription::new_2d(16, 16, Format::Rgba16Float).with_usage(TextureUsage::STORAGE),
            None,
        )
        .unwrap();
    let sampled = device
        .create_texture(TextureDescription::new_2d(16, 16, Format::Rgba16Float), None)
        .unwrap();
    let set = device.create_bind_set().unwrap();

    device.bind_storage_image(set, 0, storage, 0).unwrap();
    assert!(device.bind_storage_image(set, 1, sampled, 0).is_err());
    assert!(device.bind_storage_image(set, 1, storage, 3).is_err());
    assert!(device.bind_texture(set, 1, storage).is_err());
    assert_eq!(device.bind_set(set).unwrap().binding_type(0), Some(BindingType::StorageImage));
}

#[cfg(debug_assertions)]
#[test]
fn test_destroyed_texture_in_bind_set_is_reported() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let texture = device
        .create_texture(TextureDescription::new_2d(4, 4, Format::Rgba8Unorm), None)
        .unwrap();
    let set = device.create_bind_set().unwrap();
    device.bind_texture(set, 0, texture).unwrap();
    device.graphics_pipeline_mut(p).unwrap().set_bind_set(0, set);
    let cb = in_pass(&mut device, pass, fb);

    device.destroy_texture(texture).unwrap();

    assert_eq!(
        device.draw(cb, p, &[vb], 3, 1),
        Err(DeviceError::InvalidHandle { kind: "texture" })
    );
    assert_eq!(device.native().calls("update_descriptor_sets"), 0);
}

#[test]
fn test_stale_handles_are_rejected() {
    let mut device = device();
    let texture = device
        .create_texture(TextureDescription::new_2d(4, 4, Format::Rgba8Unorm), None)
        .unwrap();
    device.destroy_texture(texture).unwrap();
    let reused = device
        .create_texture(TextureDescription::new_2d(4, 4, Format::Rgba8Unorm), None)
        .unwrap();

    assert_ne!(texture, reused);
    assert_eq!(device.destroy_texture(texture), Err(DeviceError::InvalidHandle { kind: "texture" }));
    assert!(device.texture_description(texture).is_none());
    assert!(device.texture_description(reused).is_some());
}

#[test]
fn test_shader_blob_must_be_spirv() {
    let mut device = device();
    assert!(device
        .create_shader_from_il(ShaderStage::Vertex, ShaderIl::SpirV, &[1, 2, 3, 4])
        .is_err());
    assert_eq!(device.native().calls("create_shader_module"), 0);
}

#[test]
fn test_shutdown_releases_pools_and_rejects_new_work() {
    let mut device = device();
    let (pass, fb) = offscreen(&mut device, Format::Rgba8Unorm);
    let p = pipeline(&mut device);
    let vb = vertices(&mut device);
    let cb = in_pass(&mut device, pass, fb);
    device.draw(cb, p, &[vb], 3, 1).unwrap();
    let _sc = swap_chain(&mut device);

    device.shutdown();
    device.shutdown();

    let native = device.native();
    assert_eq!(native.calls("destroy_command_pool"), 1);
    assert_eq!(native.calls("destroy_descriptor_pool"), 1);
    assert_eq!(native.calls("destroy_pipeline"), 1);
    assert_eq!(native.calls("destroy_swapchain"), 1);
    assert_eq!(native.calls("destroy_render_pass"), 2);
    assert_eq!(native.calls("destroy_image"), native.calls("create_image"));
    assert!(device.create_command_buffer().is_err());
    assert!(device.create_bind_set().is_err());
    assert!(device.create_graphics_pipeline().is_err());
}
