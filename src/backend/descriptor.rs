// Descriptor set layout and pool wrappers.
//
// The examples bind at most one descriptor set each, written once during
// setup, so there is no free/reset machinery here.

use ash::vk;
use std::sync::Arc;

use super::context::VulkanContext;
use crate::error::SetupError;

pub struct DescriptorLayout {
    pub handle: vk::DescriptorSetLayout,
    ctx: Arc<VulkanContext>,
}

impl DescriptorLayout {
    pub fn new(
        ctx: &Arc<VulkanContext>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<Self, SetupError> {
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

        let handle = unsafe { ctx.device.create_descriptor_set_layout(&info, None) }.map_err(
            |e| SetupError::ResourceAllocation {
                what: "descriptor set layout",
                source: e,
            },
        )?;

        Ok(Self {
            handle,
            ctx: Arc::clone(ctx),
        })
    }
}

impl Drop for DescriptorLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx
                .device
                .destroy_descriptor_set_layout(self.handle, None)
        };
    }
}

pub struct DescriptorPool {
    pub pool: vk::DescriptorPool,
    ctx: Arc<VulkanContext>,
}

impl DescriptorPool {
    pub fn new(
        ctx: &Arc<VulkanContext>,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> Result<Self, SetupError> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(sizes)
            .max_sets(max_sets);

        let pool = unsafe { ctx.device.create_descriptor_pool(&info, None) }.map_err(|e| {
            SetupError::ResourceAllocation {
                what: "descriptor pool",
                source: e,
            }
        })?;

        Ok(Self {
            pool,
            ctx: Arc::clone(ctx),
        })
    }

    pub fn allocate(&self, layout: &DescriptorLayout) -> Result<vk::DescriptorSet, SetupError> {
        let layouts = [layout.handle];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.ctx.device.allocate_descriptor_sets(&info) }.map_err(|e| {
            SetupError::ResourceAllocation {
                what: "descriptor set",
                source: e,
            }
        })?;

        Ok(sets[0])
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_descriptor_pool(self.pool, None) };
    }
}
