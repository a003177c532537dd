// Per-frame synchronization primitives.

use ash::vk;
use std::sync::Arc;

use super::context::VulkanContext;
use crate::error::SetupError;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(ctx: &Arc<VulkanContext>) -> Result<Self, SetupError> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Starts signaled so the first frame's wait falls through.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let wrap = |e| SetupError::ResourceAllocation {
            what: "frame sync objects",
            source: e,
        };

        unsafe {
            Ok(Self {
                image_available: ctx
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(wrap)?,
                render_finished: ctx
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(wrap)?,
                in_flight_fence: ctx.device.create_fence(&fence_info, None).map_err(wrap)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
