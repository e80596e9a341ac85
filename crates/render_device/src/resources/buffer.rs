//! Vertex, index and uniform buffer records

use ash::vk;

use crate::error::{DeviceError, DeviceResult};
use crate::native::NativeDevice;
use crate::types::IndexFormat;

/// Where a buffer lives and how it is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Device-local, filled once through a staging copy
    Static,
    /// Host-visible, mapped and rewritten every frame
    Dynamic,
}

impl BufferUsage {
    pub(crate) fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            Self::Static => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            Self::Dynamic => vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        }
    }
}

/// Buffer with its dedicated memory allocation
#[derive(Debug)]
pub(crate) struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub usage: BufferUsage,
    pub mapped: bool,
}

impl Buffer {
    /// Create a buffer and bind fresh memory to it
    ///
    /// Static buffers also get `TRANSFER_DST` so they can be filled by a copy.
    pub fn create<N: NativeDevice + ?Sized>(
        native: &N,
        size: u64,
        flags: vk::BufferUsageFlags,
        usage: BufferUsage,
    ) -> DeviceResult<Self> {
        if size == 0 {
            return Err(DeviceError::invalid_operation("buffer size must be non-zero"));
        }

        let flags = match usage {
            BufferUsage::Static => flags | vk::BufferUsageFlags::TRANSFER_DST,
            BufferUsage::Dynamic => flags,
        };
        Self::create_raw(native, size, flags, usage.memory_properties()).map(|(buffer, memory)| Self {
            buffer,
            memory,
            size,
            usage,
            mapped: false,
        })
    }

    /// Create a host-visible transfer source, used for staging uploads
    pub fn create_staging<N: NativeDevice + ?Sized>(native: &N, size: u64) -> DeviceResult<Self> {
        let (buffer, memory) = Self::create_raw(
            native,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Dynamic.memory_properties(),
        )?;
        Ok(Self {
            buffer,
            memory,
            size,
            usage: BufferUsage::Dynamic,
            mapped: false,
        })
    }

    fn create_raw<N: NativeDevice + ?Sized>(
        native: &N,
        size: u64,
        flags: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<(vk::Buffer, vk::DeviceMemory)> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(flags)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = native.create_buffer(&info).map_err(|e| {
            log::error!("Failed to create {} byte buffer ({:?}): {}", size, flags, e);
            e
        })?;

        match native.allocate_buffer_memory(buffer, properties) {
            Ok(memory) => Ok((buffer, memory)),
            Err(e) => {
                log::error!("Failed to allocate {} bytes of {:?} memory: {}", size, properties, e);
                native.destroy_buffer(buffer);
                Err(e)
            }
        }
    }

    /// Map the whole buffer; only dynamic buffers may be mapped
    pub fn map<N: NativeDevice + ?Sized>(&mut self, native: &N) -> DeviceResult<*mut u8> {
        if self.usage != BufferUsage::Dynamic {
            log::error!("Attempted to map a static buffer");
            return Err(DeviceError::invalid_operation("only dynamic buffers can be mapped"));
        }
        if self.mapped {
            log::error!("Buffer {:?} is already mapped", self.buffer);
            return Err(DeviceError::invalid_state("buffer is already mapped"));
        }
        let ptr = native.map_memory(self.memory, 0, self.size)?;
        self.mapped = true;
        Ok(ptr)
    }

    /// Unmap a buffer mapped with [`Self::map`]
    pub fn unmap<N: NativeDevice + ?Sized>(&mut self, native: &N) -> DeviceResult<()> {
        if self.usage != BufferUsage::Dynamic {
            log::error!("Attempted to unmap a static buffer");
            return Err(DeviceError::invalid_operation("only dynamic buffers can be unmapped"));
        }
        if !self.mapped {
            log::error!("Buffer {:?} is not mapped", self.buffer);
            return Err(DeviceError::invalid_state("buffer is not mapped"));
        }
        native.unmap_memory(self.memory);
        self.mapped = false;
        Ok(())
    }

    /// Copy `data` to `offset` through a temporary mapping
    ///
    /// Works on any host-visible buffer, staging buffers included.
    pub fn write<N: NativeDevice + ?Sized>(&self, native: &N, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let len = data.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            log::error!(
                "Write of {} bytes at offset {} exceeds buffer size {}",
                len,
                offset,
                self.size
            );
            return Err(DeviceError::OutOfBounds {
                reason: format!("{}..{} outside 0..{}", offset, offset + len, self.size),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let ptr = native.map_memory(self.memory, offset, len)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        native.unmap_memory(self.memory);
        Ok(())
    }

    /// Release the buffer and its memory
    pub fn destroy<N: NativeDevice + ?Sized>(self, native: &N) {
        if self.mapped {
            native.unmap_memory(self.memory);
        }
        native.destroy_buffer(self.buffer);
        native.free_memory(self.memory);
    }
}

/// Index buffer: a buffer plus the width of its indices
#[derive(Debug)]
pub(crate) struct IndexBuffer {
    pub buffer: Buffer,
    pub format: IndexFormat,
}

impl IndexBuffer {
    /// Number of whole indices the buffer holds
    pub fn index_count(&self) -> u32 {
        (self.buffer.size / self.format.size()) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::RecordingDevice;

    #[test]
    fn test_static_buffers_cannot_be_mapped() {
        let native = RecordingDevice::new();
        let mut buffer = Buffer::create(&native, 64, vk::BufferUsageFlags::VERTEX_BUFFER, BufferUsage::Static).unwrap();

        assert!(matches!(buffer.map(&native), Err(DeviceError::InvalidOperation { .. })));
        assert!(matches!(buffer.unmap(&native), Err(DeviceError::InvalidOperation { .. })));
        assert_eq!(native.calls("map_memory"), 0);
        buffer.destroy(&native);
    }

    #[test]
    fn test_dynamic_map_unmap_pairs() {
        let native = RecordingDevice::new();
        let mut buffer = Buffer::create(&native, 64, vk::BufferUsageFlags::UNIFORM_BUFFER, BufferUsage::Dynamic).unwrap();

        assert!(buffer.unmap(&native).is_err());
        assert!(buffer.map(&native).is_ok());
        assert!(matches!(buffer.map(&native), Err(DeviceError::InvalidState { .. })));
        assert!(buffer.unmap(&native).is_ok());
        assert_eq!(native.calls("unmap_memory"), 1);
        buffer.destroy(&native);
    }

    #[test]
    fn test_write_lands_at_offset_and_checks_bounds() {
        let native = RecordingDevice::new();
        let buffer = Buffer::create(&native, 8, vk::BufferUsageFlags::UNIFORM_BUFFER, BufferUsage::Dynamic).unwrap();

        buffer.write(&native, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(native.memory_contents(buffer.memory), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(
            buffer.write(&native, 6, &[9, 9, 9]),
            Err(DeviceError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_memory_failure_releases_buffer() {
        let native = RecordingDevice::new();
        native.fail_next("allocate_buffer_memory");

        let result = Buffer::create(&native, 16, vk::BufferUsageFlags::VERTEX_BUFFER, BufferUsage::Dynamic);
        assert!(result.is_err());
        assert_eq!(native.calls("destroy_buffer"), 1);
    }

    #[test]
    fn test_index_count_uses_format_width() {
        let native = RecordingDevice::new();
        let buffer = Buffer::create(&native, 12, vk::BufferUsageFlags::INDEX_BUFFER, BufferUsage::Static).unwrap();
        let indices = IndexBuffer {
            buffer,
            format: IndexFormat::U16,
        };
        assert_eq!(indices.index_count(), 6);
    }
}
