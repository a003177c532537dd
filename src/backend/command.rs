// Command pool wrapper.

use ash::vk;
use std::sync::Arc;

use super::context::VulkanContext;
use crate::error::SetupError;

/// A command pool on the graphics queue family. Buffers allocated from it
/// are freed with the pool.
pub struct CommandPool {
    pub pool: vk::CommandPool,
    ctx: Arc<VulkanContext>,
}

impl CommandPool {
    pub fn new(ctx: &Arc<VulkanContext>) -> Result<Self, SetupError> {
        // RESET_COMMAND_BUFFER lets the shared-memory producer re-record the
        // same buffer every loop iteration.
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(ctx.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { ctx.device.create_command_pool(&info, None) }.map_err(|e| {
            SetupError::ResourceAllocation {
                what: "command pool",
                source: e,
            }
        })?;

        Ok(Self {
            pool,
            ctx: Arc::clone(ctx),
        })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>, SetupError> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.ctx.device.allocate_command_buffers(&info) }.map_err(|e| {
            SetupError::ResourceAllocation {
                what: "command buffers",
                source: e,
            }
        })
    }

    pub fn allocate_one(&self) -> Result<vk::CommandBuffer, SetupError> {
        Ok(self.allocate(1)?[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_command_pool(self.pool, None) };
    }
}
