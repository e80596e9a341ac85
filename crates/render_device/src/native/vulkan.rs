//! Vulkan implementation of the native seam
//!
//! Owns the instance (with validation layers and a debug messenger in debug
//! builds), the window surface, the selected physical device and the logical
//! device with its queues and extension loaders.

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{
    AccelerationStructure, DeferredHostOperations, RayTracingPipeline, Surface, Swapchain as SwapchainLoader,
};
use ash::{vk, Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};

use super::{DeviceLimits, NativeDevice, ShaderBindingRegions, SurfaceSource};
use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};

/// Vulkan instance wrapper with RAII cleanup
pub(crate) struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    #[cfg(debug_assertions)]
    debug_utils: Option<DebugUtils>,
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    fn new(config: &DeviceConfig, window: &dyn SurfaceSource) -> DeviceResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            log::error!("Failed to load Vulkan: {:?}", e);
            DeviceError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| DeviceError::Config("Application name contains a NUL byte".to_string()))?;
        let engine_name = CString::new("render_device").unwrap_or_default();
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let required_extensions = window.required_instance_extensions()?;
        #[allow(unused_mut)]
        let mut extensions: Vec<*const c_char> =
            required_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let enable_validation = cfg!(debug_assertions) && config.validation_enabled();

        #[cfg(debug_assertions)]
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let validation_layer = CString::new("VK_LAYER_KHRONOS_validation").unwrap_or_default();
        let layer_names: Vec<*const c_char> = if enable_validation {
            vec![validation_layer.as_ptr()]
        } else {
            Vec::new()
        };

        let enabled_features = [vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION];
        let mut validation_features =
            vk::ValidationFeaturesEXT::builder().enabled_validation_features(&enabled_features);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if enable_validation {
            create_info = create_info.push_next(&mut validation_features);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
            log::error!("vkCreateInstance failed: {:?}", e);
            DeviceError::Api(e)
        })?;

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        log::info!(
            "Created Vulkan instance for '{}' (validation: {})",
            config.application_name,
            enable_validation
        );

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> DeviceResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(DeviceError::Api)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation-layer messages through `log`
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Selected GPU and its capabilities
struct PhysicalDeviceInfo {
    device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_family: u32,
    present_family: u32,
    ray_tracing: bool,
    /// `(handle size, handle alignment, base alignment)` of shader groups
    shader_groups: (u32, u32, u32),
}

impl PhysicalDeviceInfo {
    fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        want_ray_tracing: bool,
    ) -> DeviceResult<Self> {
        let mut devices = unsafe { instance.enumerate_physical_devices() }.map_err(DeviceError::Api)?;

        // discrete GPUs first
        devices.sort_by_key(|&device| {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
        });

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader, want_ray_tracing) {
                Ok(info) => {
                    log::info!("Selected GPU: {}", unsafe {
                        CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
                    });
                    return Ok(info);
                }
                Err(e) => log::debug!("Skipping physical device: {}", e),
            }
        }

        log::error!("No suitable GPU found");
        Err(DeviceError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        want_ray_tracing: bool,
    ) -> DeviceResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            }
            .map_err(DeviceError::Api)?;

            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| DeviceError::InitializationFailed("No graphics queue family found".to_string()))?;
        let present_family = present_family
            .ok_or_else(|| DeviceError::InitializationFailed("No present queue family found".to_string()))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(DeviceError::Api)?;
        let supports = |required: &CStr| {
            extensions.iter().any(|available| {
                let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                name == required
            })
        };

        if !supports(SwapchainLoader::name()) {
            return Err(DeviceError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        let ray_tracing = want_ray_tracing
            && supports(AccelerationStructure::name())
            && supports(DeferredHostOperations::name())
            && supports(RayTracingPipeline::name());
        if want_ray_tracing && !ray_tracing {
            log::warn!("Ray tracing requested but acceleration structures or ray-trace pipelines are not supported");
        }
        let shader_groups = if ray_tracing {
            let rt = unsafe { RayTracingPipeline::get_properties(instance, device) };
            (
                rt.shader_group_handle_size,
                rt.shader_group_handle_alignment,
                rt.shader_group_base_alignment,
            )
        } else {
            (0, 0, 0)
        };

        Ok(Self {
            device,
            properties,
            features,
            memory_properties,
            graphics_family,
            present_family,
            ray_tracing,
            shader_groups,
        })
    }

    fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> DeviceResult<u32> {
        let memory = &self.memory_properties;
        for i in 0..memory.memory_type_count {
            if (type_filter & (1 << i)) != 0
                && memory.memory_types[i as usize].property_flags.contains(properties)
            {
                return Ok(i);
            }
        }

        log::error!("No memory type matches filter {:#b} with {:?}", type_filter, properties);
        Err(DeviceError::NoSuitableMemoryType)
    }
}

/// Logical device wrapper with RAII cleanup
struct LogicalDevice {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: SwapchainLoader,
    ray_tracing_loader: Option<RayTracingPipeline>,
}

impl LogicalDevice {
    fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> DeviceResult<Self> {
        let unique_families: HashSet<u32> =
            [physical.graphics_family, physical.present_family].into_iter().collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let mut extensions = vec![SwapchainLoader::name().as_ptr()];
        if physical.ray_tracing {
            extensions.push(AccelerationStructure::name().as_ptr());
            extensions.push(DeferredHostOperations::name().as_ptr());
            extensions.push(RayTracingPipeline::name().as_ptr());
        }

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical.features.sampler_anisotropy == vk::TRUE)
            .build();

        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::builder().buffer_device_address(true);
        let mut acceleration = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::builder()
            .acceleration_structure(true);
        let mut ray_pipelines =
            vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::builder().ray_tracing_pipeline(true);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&device_features);
        if physical.ray_tracing {
            create_info = create_info
                .push_next(&mut vulkan12)
                .push_next(&mut acceleration)
                .push_next(&mut ray_pipelines);
        }

        let device = unsafe { instance.create_device(physical.device, &create_info, None) }.map_err(|e| {
            log::error!("vkCreateDevice failed: {:?}", e);
            DeviceError::Api(e)
        })?;

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);
        let ray_tracing_loader = physical
            .ray_tracing
            .then(|| RayTracingPipeline::new(instance, &device));

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            ray_tracing_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Production [`NativeDevice`] backed by `ash`
pub struct VulkanDevice {
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical: PhysicalDeviceInfo,
    // field order is drop order: the logical device goes before the instance
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl VulkanDevice {
    /// Bring up instance, surface and logical device for `window`
    pub fn new(config: &DeviceConfig, window: &dyn SurfaceSource) -> DeviceResult<Self> {
        let instance = VulkanInstance::new(config, window)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_surface(&instance.entry, &instance.instance)?;

        let physical = match PhysicalDeviceInfo::select_suitable_device(
            &instance.instance,
            surface,
            &surface_loader,
            config.enable_ray_tracing,
        ) {
            Ok(physical) => physical,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let device = match LogicalDevice::new(&instance.instance, &physical) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        Ok(Self {
            surface,
            surface_loader,
            physical,
            device,
            instance,
        })
    }

    /// The `ash` entry points
    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    /// The `ash` instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// The `ash` logical device
    pub fn raw_device(&self) -> &Device {
        &self.device.device
    }

    fn raw(&self) -> &Device {
        &self.device.device
    }

    fn ray_tracing(&self) -> DeviceResult<&RayTracingPipeline> {
        self.device.ray_tracing_loader.as_ref().ok_or_else(|| {
            log::error!("Ray-trace pipelines are not enabled on this device");
            DeviceError::invalid_operation("ray tracing is not enabled")
        })
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

fn api_error(what: &str, result: vk::Result) -> DeviceError {
    log::error!("{} failed: {:?}", what, result);
    DeviceError::Api(result)
}

impl NativeDevice for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        let limits = &self.physical.properties.limits;
        DeviceLimits {
            max_sampler_anisotropy: if self.physical.features.sampler_anisotropy == vk::TRUE {
                limits.max_sampler_anisotropy
            } else {
                1.0
            },
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            ray_tracing: self.physical.ray_tracing,
            shader_group_handle_size: self.physical.shader_groups.0,
            shader_group_handle_alignment: self.physical.shader_groups.1,
            shader_group_base_alignment: self.physical.shader_groups.2,
        }
    }

    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        let properties = unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical.device, format)
        };
        properties.optimal_tiling_features
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> DeviceResult<vk::DescriptorSetLayout> {
        unsafe { self.raw().create_descriptor_set_layout(info, None) }
            .map_err(|e| api_error("vkCreateDescriptorSetLayout", e))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.raw().destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo) -> DeviceResult<vk::PipelineLayout> {
        unsafe { self.raw().create_pipeline_layout(info, None) }
            .map_err(|e| api_error("vkCreatePipelineLayout", e))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.raw().destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo) -> DeviceResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
        }
        .map_err(|(_, e)| api_error("vkCreateGraphicsPipelines", e))?;

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| api_error("vkCreateGraphicsPipelines", vk::Result::ERROR_UNKNOWN))
    }

    fn create_ray_tracing_pipeline(
        &self,
        info: &vk::RayTracingPipelineCreateInfoKHR,
    ) -> DeviceResult<vk::Pipeline> {
        let loader = self.ray_tracing()?;
        let pipelines = unsafe {
            loader.create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                std::slice::from_ref(info),
                None,
            )
        }
        .map_err(|e| api_error("vkCreateRayTracingPipelinesKHR", e))?;

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| api_error("vkCreateRayTracingPipelinesKHR", vk::Result::ERROR_UNKNOWN))
    }

    fn ray_tracing_shader_group_handles(&self, pipeline: vk::Pipeline, group_count: u32) -> DeviceResult<Vec<u8>> {
        let loader = self.ray_tracing()?;
        let size = group_count as usize * self.physical.shader_groups.0 as usize;
        unsafe { loader.get_ray_tracing_shader_group_handles(pipeline, 0, group_count, size) }
            .map_err(|e| api_error("vkGetRayTracingShaderGroupHandlesKHR", e))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.raw().destroy_pipeline(pipeline, None) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> DeviceResult<vk::RenderPass> {
        unsafe { self.raw().create_render_pass(info, None) }.map_err(|e| api_error("vkCreateRenderPass", e))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.raw().destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> DeviceResult<vk::Framebuffer> {
        unsafe { self.raw().create_framebuffer(info, None) }.map_err(|e| api_error("vkCreateFramebuffer", e))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.raw().destroy_framebuffer(framebuffer, None) }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> DeviceResult<vk::Image> {
        unsafe { self.raw().create_image(info, None) }.map_err(|e| api_error("vkCreateImage", e))
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.raw().destroy_image(image, None) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> DeviceResult<vk::ImageView> {
        unsafe { self.raw().create_image_view(info, None) }.map_err(|e| api_error("vkCreateImageView", e))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.raw().destroy_image_view(view, None) }
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> DeviceResult<vk::Sampler> {
        unsafe { self.raw().create_sampler(info, None) }.map_err(|e| api_error("vkCreateSampler", e))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.raw().destroy_sampler(sampler, None) }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> DeviceResult<vk::Buffer> {
        unsafe { self.raw().create_buffer(info, None) }.map_err(|e| api_error("vkCreateBuffer", e))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.raw().destroy_buffer(buffer, None) }
    }

    fn allocate_image_memory(
        &self,
        image: vk::Image,
        properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<vk::DeviceMemory> {
        let requirements = unsafe { self.raw().get_image_memory_requirements(image) };
        let memory_type = self.physical.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = unsafe { self.raw().allocate_memory(&alloc_info, None) }
            .map_err(|e| api_error("vkAllocateMemory", e))?;

        if let Err(e) = unsafe { self.raw().bind_image_memory(image, memory, 0) } {
            unsafe { self.raw().free_memory(memory, None) };
            return Err(api_error("vkBindImageMemory", e));
        }

        Ok(memory)
    }

    fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<vk::DeviceMemory> {
        let requirements = unsafe { self.raw().get_buffer_memory_requirements(buffer) };
        let memory_type = self.physical.find_memory_type(requirements.memory_type_bits, properties)?;

        // shader binding tables are read through their device address
        let mut flags_info =
            vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        if self.physical.ray_tracing {
            alloc_info = alloc_info.push_next(&mut flags_info);
        }

        let memory = unsafe { self.raw().allocate_memory(&alloc_info, None) }
            .map_err(|e| api_error("vkAllocateMemory", e))?;

        if let Err(e) = unsafe { self.raw().bind_buffer_memory(buffer, memory, 0) } {
            unsafe { self.raw().free_memory(memory, None) };
            return Err(api_error("vkBindBufferMemory", e));
        }

        Ok(memory)
    }

    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::builder().buffer(buffer);
        unsafe { self.raw().get_buffer_device_address(&info) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.raw().free_memory(memory, None) }
    }

    fn map_memory(&self, memory: vk::DeviceMemory, offset: u64, size: u64) -> DeviceResult<*mut u8> {
        unsafe { self.raw().map_memory(memory, offset, size, vk::MemoryMapFlags::empty()) }
            .map(|ptr| ptr.cast::<u8>())
            .map_err(|e| api_error("vkMapMemory", e))
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.raw().unmap_memory(memory) }
    }

    fn create_shader_module(&self, code: &[u32]) -> DeviceResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.raw().create_shader_module(&info, None) }.map_err(|e| api_error("vkCreateShaderModule", e))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.raw().destroy_shader_module(module, None) }
    }

    fn create_semaphore(&self) -> DeviceResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.raw().create_semaphore(&info, None) }.map_err(|e| api_error("vkCreateSemaphore", e))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.raw().destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> DeviceResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.raw().create_fence(&info, None) }.map_err(|e| api_error("vkCreateFence", e))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.raw().destroy_fence(fence, None) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> DeviceResult<()> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.raw().wait_for_fences(fences, true, timeout_ns) }
            .map_err(|e| api_error("vkWaitForFences", e))
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> DeviceResult<()> {
        unsafe { self.raw().reset_fences(fences) }.map_err(|e| api_error("vkResetFences", e))
    }

    fn fence_signaled(&self, fence: vk::Fence) -> DeviceResult<bool> {
        unsafe { self.raw().get_fence_status(fence) }.map_err(|e| api_error("vkGetFenceStatus", e))
    }

    fn wait_idle(&self) -> DeviceResult<()> {
        unsafe { self.raw().device_wait_idle() }.map_err(|e| api_error("vkDeviceWaitIdle", e))
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> DeviceResult<vk::DescriptorPool> {
        unsafe { self.raw().create_descriptor_pool(info, None) }
            .map_err(|e| api_error("vkCreateDescriptorPool", e))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.raw().destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> DeviceResult<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.raw().allocate_descriptor_sets(&info) }
            .map_err(|e| api_error("vkAllocateDescriptorSets", e))?;
        sets.into_iter()
            .next()
            .ok_or_else(|| api_error("vkAllocateDescriptorSets", vk::Result::ERROR_UNKNOWN))
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> DeviceResult<()> {
        unsafe { self.raw().free_descriptor_sets(pool, &[set]) }
            .map_err(|e| api_error("vkFreeDescriptorSets", e))
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.raw().update_descriptor_sets(writes, &[]) }
    }

    fn create_command_pool(&self) -> DeviceResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.physical.graphics_family);
        unsafe { self.raw().create_command_pool(&info, None) }.map_err(|e| api_error("vkCreateCommandPool", e))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.raw().destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> DeviceResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.raw().allocate_command_buffers(&info) }
            .map_err(|e| api_error("vkAllocateCommandBuffers", e))?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| api_error("vkAllocateCommandBuffers", vk::Result::ERROR_UNKNOWN))
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, buffer: vk::CommandBuffer) {
        unsafe { self.raw().free_command_buffers(pool, &[buffer]) }
    }

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> DeviceResult<()> {
        let info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.raw().begin_command_buffer(buffer, &info) }
            .map_err(|e| api_error("vkBeginCommandBuffer", e))
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> DeviceResult<()> {
        unsafe { self.raw().end_command_buffer(buffer) }.map_err(|e| api_error("vkEndCommandBuffer", e))
    }

    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> DeviceResult<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| api_error("vkResetCommandBuffer", e))
    }

    fn cmd_begin_render_pass(&self, buffer: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.raw()
                .cmd_begin_render_pass(buffer, info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer) {
        unsafe { self.raw().cmd_end_render_pass(buffer) }
    }

    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.raw().cmd_bind_pipeline(buffer, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                buffer,
                bind_point,
                layout,
                first_set,
                sets,
                &[],
            )
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(buffer, first_binding, buffers, offsets)
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        buffer: vk::CommandBuffer,
        index_buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(buffer, index_buffer, offset, index_type)
        }
    }

    fn cmd_push_constants(
        &self,
        buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.raw().cmd_push_constants(buffer, layout, stages, offset, data) }
    }

    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.raw().cmd_set_viewport(buffer, 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.raw().cmd_set_scissor(buffer, 0, &[scissor]) }
    }

    fn cmd_draw(
        &self,
        buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.raw()
                .cmd_draw(buffer, vertex_count, instance_count, first_vertex, first_instance)
        }
    }

    fn cmd_draw_indexed(
        &self,
        buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.raw().cmd_draw_indexed(
                buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn cmd_trace_rays(
        &self,
        buffer: vk::CommandBuffer,
        regions: &ShaderBindingRegions,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        match &self.device.ray_tracing_loader {
            Some(loader) => unsafe {
                loader.cmd_trace_rays(
                    buffer,
                    &regions.raygen,
                    &regions.miss,
                    &regions.hit,
                    &regions.callable,
                    width,
                    height,
                    depth,
                );
            },
            None => log::error!("Trace rays recorded on a device without ray-trace pipelines"),
        }
    }

    fn cmd_clear_attachments(
        &self,
        buffer: vk::CommandBuffer,
        attachments: &[vk::ClearAttachment],
        rects: &[vk::ClearRect],
    ) {
        unsafe { self.raw().cmd_clear_attachments(buffer, attachments, rects) }
    }

    fn cmd_pipeline_barrier(
        &self,
        buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                buffer_barriers,
                image_barriers,
            )
        }
    }

    fn cmd_copy_buffer(
        &self,
        buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe { self.raw().cmd_copy_buffer(buffer, src, dst, regions) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.raw().cmd_copy_buffer_to_image(
                buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            )
        }
    }

    fn cmd_blit_image(
        &self,
        buffer: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        region: &vk::ImageBlit,
        filter: vk::Filter,
    ) {
        unsafe {
            self.raw().cmd_blit_image(
                buffer,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(region),
                filter,
            )
        }
    }

    fn queue_submit(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> DeviceResult<()> {
        unsafe { self.raw().queue_submit(self.device.graphics_queue, submits, fence) }
            .map_err(|e| api_error("vkQueueSubmit", e))
    }

    fn queue_family_indices(&self) -> (u32, u32) {
        (self.physical.graphics_family, self.physical.present_family)
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn surface_capabilities(&self) -> DeviceResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical.device, self.surface)
        }
        .map_err(|e| api_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))
    }

    fn surface_formats(&self) -> DeviceResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical.device, self.surface)
        }
        .map_err(|e| api_error("vkGetPhysicalDeviceSurfaceFormatsKHR", e))
    }

    fn surface_present_modes(&self) -> DeviceResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical.device, self.surface)
        }
        .map_err(|e| api_error("vkGetPhysicalDeviceSurfacePresentModesKHR", e))
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> DeviceResult<vk::SwapchainKHR> {
        unsafe { self.device.swapchain_loader.create_swapchain(info, None) }
            .map_err(|e| api_error("vkCreateSwapchainKHR", e))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.device.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> DeviceResult<Vec<vk::Image>> {
        unsafe { self.device.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| api_error("vkGetSwapchainImagesKHR", e))
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> DeviceResult<(u32, bool)> {
        // stale results are routine, the caller decides what to log
        unsafe {
            self.device
                .swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
        }
        .map_err(DeviceError::Api)
    }

    fn queue_present(&self, info: &vk::PresentInfoKHR) -> DeviceResult<bool> {
        unsafe {
            self.device
                .swapchain_loader
                .queue_present(self.device.present_queue, info)
        }
        .map_err(DeviceError::Api)
    }
}
