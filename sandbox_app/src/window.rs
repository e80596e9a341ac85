//! Window management using GLFW
//!
//! The window is the device's surface source: it reports the instance
//! extensions GLFW needs and creates the Vulkan surface itself.

use std::ffi::CString;

use ash::vk;
use render_device::{DeviceError, DeviceResult, SurfaceSource};
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    #[error("GLFW initialization failed")]
    InitializationFailed,

    #[error("Window creation failed")]
    CreationFailed,
}

pub type WindowResult<T> = Result<T, WindowError>;

/// What happened since the last poll
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowEvents {
    pub resized: bool,
    pub close_requested: bool,
}

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        // Vulkan only, no OpenGL context
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self { glfw, window, events })
    }

    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Pump the event queue and fold it into [`WindowEvents`]
    pub fn poll(&mut self) -> WindowEvents {
        self.glfw.poll_events();
        let mut polled = WindowEvents::default();
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(..) => polled.resized = true,
                glfw::WindowEvent::Close
                | glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    polled.close_requested = true;
                }
                _ => {}
            }
        }
        if polled.close_requested {
            self.window.set_should_close(true);
        }
        polled
    }

    /// Block until the window has a drawable area again
    pub fn wait_while_minimized(&mut self) {
        while self.framebuffer_size().0 == 0 || self.framebuffer_size().1 == 0 {
            if self.window.should_close() {
                return;
            }
            self.glfw.wait_events();
        }
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }
}

impl SurfaceSource for Window {
    fn required_instance_extensions(&self) -> DeviceResult<Vec<CString>> {
        let names = self.glfw.get_required_instance_extensions().ok_or_else(|| {
            log::error!("GLFW reports no Vulkan support");
            DeviceError::InitializationFailed("GLFW has no Vulkan support".to_string())
        })?;

        names
            .into_iter()
            .map(|name| CString::new(name).map_err(|e| DeviceError::InitializationFailed(e.to_string())))
            .collect()
    }

    fn create_surface(&self, _entry: &ash::Entry, instance: &ash::Instance) -> DeviceResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            log::error!("Failed to create Vulkan surface: {:?}", result);
            Err(DeviceError::Api(result))
        }
    }

    fn framebuffer_extent(&self) -> (u32, u32) {
        self.framebuffer_size()
    }
}
