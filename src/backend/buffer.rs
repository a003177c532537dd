// Host-visible buffers for vertex and uniform data.
//
// The examples are small enough that every buffer lives in host-visible,
// host-coherent memory and is filled once with a single map.

use ash::vk;
use std::sync::Arc;

use super::context::VulkanContext;
use crate::error::SetupError;

/// A buffer plus its backing memory, freed on drop.
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    ctx: Arc<VulkanContext>,
}

impl AllocatedBuffer {
    fn new(
        ctx: &Arc<VulkanContext>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        what: &'static str,
    ) -> Result<Self, SetupError> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { ctx.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            SetupError::ResourceAllocation { what, source: e }
        })?;

        let requirements = unsafe { ctx.device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = ctx.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            what,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { ctx.device.allocate_memory(&alloc_info, None) }.map_err(|e| {
            unsafe { ctx.device.destroy_buffer(buffer, None) };
            SetupError::ResourceAllocation { what, source: e }
        })?;

        unsafe { ctx.device.bind_buffer_memory(buffer, memory, 0) }.map_err(|e| {
            unsafe {
                ctx.device.destroy_buffer(buffer, None);
                ctx.device.free_memory(memory, None);
            }
            SetupError::ResourceAllocation { what, source: e }
        })?;

        Ok(Self {
            buffer,
            memory,
            size,
            ctx: Arc::clone(ctx),
        })
    }

    /// Create a vertex buffer pre-filled with `data`.
    pub fn vertex_with_data<T: Copy>(
        ctx: &Arc<VulkanContext>,
        data: &[T],
    ) -> Result<Self, SetupError> {
        let buffer = Self::new(
            ctx,
            std::mem::size_of_val(data) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "vertex buffer",
        )?;
        buffer.upload(data)?;
        Ok(buffer)
    }

    /// Create a uniform buffer pre-filled with one `data` value.
    pub fn uniform_with_data<T: Copy>(
        ctx: &Arc<VulkanContext>,
        data: &T,
    ) -> Result<Self, SetupError> {
        let buffer = Self::new(
            ctx,
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "uniform buffer",
        )?;
        buffer.upload(std::slice::from_ref(data))?;
        Ok(buffer)
    }

    fn upload<T: Copy>(&self, data: &[T]) -> Result<(), SetupError> {
        unsafe {
            let ptr = self
                .ctx
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(|e| SetupError::ResourceAllocation {
                    what: "buffer mapping",
                    source: e,
                })? as *mut T;

            ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
            self.ctx.device.unmap_memory(self.memory);
        }
        Ok(())
    }
}

impl Drop for AllocatedBuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
            self.ctx.device.free_memory(self.memory, None);
        }
    }
}
