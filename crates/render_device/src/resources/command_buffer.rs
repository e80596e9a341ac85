//! Command buffer records and their lifecycle state

use ash::vk;

use super::{PipelineHandle, RenderPassHandle};
use crate::builders::RenderPassCompat;
use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;

/// Lifecycle of a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Freshly created or reset; ready to begin
    Initial,
    /// Between begin and end
    Recording,
    /// Recorded and ready for submission
    Executable,
    /// Submitted; becomes `Executable` again once its fence signals
    Submitted,
}

/// Render pass currently open on a command buffer
#[derive(Debug, Clone)]
pub(crate) struct ActivePass {
    pub render_pass: RenderPassHandle,
    pub native: vk::RenderPass,
    pub compat: RenderPassCompat,
    pub extent: vk::Extent2D,
}

/// Command buffer with its completion signals
pub(crate) struct CommandBuffer {
    pub buffer: vk::CommandBuffer,
    /// Signaled by the GPU when this buffer's work is done
    pub finished: vk::Semaphore,
    /// Signaled for the CPU when this buffer's work is done
    pub fence: vk::Fence,
    pub state: CommandBufferState,
    /// `finished` was signaled and no submission or present has waited on it yet
    pub signal_pending: bool,
    pub active_pass: Option<ActivePass>,
    pub bound_pipeline: Option<(PipelineHandle, vk::Pipeline)>,
}

impl CommandBuffer {
    /// Allocate the buffer, its semaphore and an already signaled fence
    pub fn create<N: NativeDevice + ?Sized>(native: &N, pool: vk::CommandPool) -> DeviceResult<Self> {
        let buffer = native.allocate_command_buffer(pool).map_err(|e| {
            log::error!("Failed to allocate command buffer: {}", e);
            e
        })?;
        let finished = match native.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                log::error!("Failed to create command buffer semaphore: {}", e);
                native.free_command_buffer(pool, buffer);
                return Err(e);
            }
        };
        let fence = match native.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                log::error!("Failed to create command buffer fence: {}", e);
                native.destroy_semaphore(finished);
                native.free_command_buffer(pool, buffer);
                return Err(e);
            }
        };

        Ok(Self {
            buffer,
            finished,
            fence,
            state: CommandBufferState::Initial,
            signal_pending: false,
            active_pass: None,
            bound_pipeline: None,
        })
    }

    /// Current state, retiring `Submitted` once the fence signaled
    pub fn refresh_state<N: NativeDevice + ?Sized>(&mut self, native: &N) -> DeviceResult<CommandBufferState> {
        if self.state == CommandBufferState::Submitted && native.fence_signaled(self.fence)? {
            self.state = CommandBufferState::Executable;
        }
        Ok(self.state)
    }

    /// Swap an unwaited `finished` semaphore for a fresh one
    ///
    /// A binary semaphore may not be signaled twice without a wait in between.
    /// Only valid once the last submission completed.
    pub fn recycle_finished<N: NativeDevice + ?Sized>(&mut self, native: &N) -> DeviceResult<()> {
        if !self.signal_pending {
            return Ok(());
        }
        let fresh = native.create_semaphore().map_err(|e| {
            log::error!("Failed to replace command buffer semaphore: {}", e);
            e
        })?;
        native.destroy_semaphore(std::mem::replace(&mut self.finished, fresh));
        self.signal_pending = false;
        Ok(())
    }

    /// Replace the fence with a signaled one after a submission that never reached the queue
    pub fn restore_fence<N: NativeDevice + ?Sized>(&mut self, native: &N) -> DeviceResult<()> {
        let fresh = native.create_fence(true)?;
        native.destroy_fence(std::mem::replace(&mut self.fence, fresh));
        Ok(())
    }

    /// Fail unless the buffer is in `expected`
    pub fn expect_state(&self, expected: CommandBufferState, operation: &str) -> DeviceResult<()> {
        if self.state != expected {
            log::error!(
                "{} requires a command buffer in {:?}, found {:?}",
                operation,
                expected,
                self.state
            );
            return Err(DeviceError::invalid_state(format!(
                "{} in {:?}, expected {:?}",
                operation, self.state, expected
            )));
        }
        Ok(())
    }

    /// Fail unless a render pass is open
    pub fn expect_pass(&self, operation: &str) -> DeviceResult<&ActivePass> {
        self.expect_state(CommandBufferState::Recording, operation)?;
        self.active_pass.as_ref().ok_or_else(|| {
            log::error!("{} requires an active render pass", operation);
            DeviceError::invalid_state(format!("{} outside a render pass", operation))
        })
    }

    /// Free the buffer and its signals
    pub fn destroy<N: NativeDevice + ?Sized>(self, native: &N, pool: vk::CommandPool) {
        native.destroy_fence(self.fence);
        native.destroy_semaphore(self.finished);
        native.free_command_buffer(pool, self.buffer);
    }
}
