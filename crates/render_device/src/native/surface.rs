//! Window surface sources
//!
//! The device layer knows nothing about windowing; it only needs the instance
//! extensions a window system requires and a way to create a `VkSurfaceKHR`.

use std::ffi::{CStr, CString};

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::error::{DeviceError, DeviceResult};

/// A window that can host a Vulkan surface
pub trait SurfaceSource {
    /// Instance extensions the window system requires
    fn required_instance_extensions(&self) -> DeviceResult<Vec<CString>>;

    /// Create a surface for this window on `instance`
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> DeviceResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> (u32, u32);
}

/// Surface source for any `raw-window-handle` window, via `ash-window`
pub struct RawWindowSurface<'a, W> {
    window: &'a W,
    extent: (u32, u32),
}

impl<'a, W> RawWindowSurface<'a, W>
where
    W: HasRawWindowHandle + HasRawDisplayHandle,
{
    /// Wrap `window`; `extent` is its framebuffer size in pixels
    pub fn new(window: &'a W, extent: (u32, u32)) -> Self {
        Self { window, extent }
    }
}

impl<'a, W> SurfaceSource for RawWindowSurface<'a, W>
where
    W: HasRawWindowHandle + HasRawDisplayHandle,
{
    fn required_instance_extensions(&self) -> DeviceResult<Vec<CString>> {
        let names = ash_window::enumerate_required_extensions(self.window.raw_display_handle())
            .map_err(|e| {
                log::error!("Failed to query window surface extensions: {:?}", e);
                DeviceError::InitializationFailed(format!("Surface extensions: {:?}", e))
            })?;

        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) }.to_owned())
            .collect())
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> DeviceResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.window.raw_display_handle(),
                self.window.raw_window_handle(),
                None,
            )
        }
        .map_err(|e| {
            log::error!("Failed to create window surface: {:?}", e);
            DeviceError::InitializationFailed(format!("Failed to create surface: {:?}", e))
        })
    }

    fn framebuffer_extent(&self) -> (u32, u32) {
        self.extent
    }
}
