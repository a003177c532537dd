// Frame driver - the acquire/submit/present loop state.
//
// Each frame slot owns its semaphores and fence; a separate table remembers
// which slot fence last touched each swapchain image, so an image handed
// out out of order still gets waited on before reuse.

use ash::vk;
use std::sync::Arc;

use crate::backend::context::VulkanContext;
use crate::backend::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use crate::backend::sync::FrameSync;
use crate::error::SetupError;

/// How one driven frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32, suboptimal: bool },
    /// The surface no longer matches the swapchain. The examples use
    /// fixed-size windows, so nobody recreates the swapchain.
    // TODO: recreate the swapchain here if a resizable example ever appears.
    SurfaceOutOfDate,
}

pub struct FrameDriver {
    frames: Vec<FrameSync>,
    /// Slot fence last submitted against each swapchain image, by index.
    image_fences: Vec<vk::Fence>,
    current: usize,
    /// Image index of the frame that most recently made it to present.
    last_presented: Option<u32>,
    ctx: Arc<VulkanContext>,
}

impl FrameDriver {
    pub fn new(
        ctx: &Arc<VulkanContext>,
        frames_in_flight: usize,
        image_count: usize,
    ) -> Result<Self, SetupError> {
        let mut frames = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            match FrameSync::new(ctx) {
                Ok(sync) => frames.push(sync),
                Err(e) => {
                    for sync in &frames {
                        sync.destroy(&ctx.device);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            frames,
            image_fences: vec![vk::Fence::null(); image_count],
            current: 0,
            last_presented: None,
            ctx: Arc::clone(ctx),
        })
    }

    /// Swapchain image index of the last presented frame, if any. Acquire
    /// hands out images in driver order, so the exit-time readback has to
    /// ask instead of assuming index 0.
    pub fn last_presented(&self) -> Option<u32> {
        self.last_presented
    }

    /// Drive one frame: wait for the slot, acquire an image, submit its
    /// prerecorded command buffer and present.
    ///
    /// `command_buffers` holds one buffer per swapchain image.
    pub fn draw_frame(
        &mut self,
        swapchain: &Swapchain,
        command_buffers: &[vk::CommandBuffer],
    ) -> Result<FrameOutcome, SetupError> {
        let device = &self.ctx.device;
        let sync = &self.frames[self.current];

        unsafe {
            device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)
                .map_err(SetupError::Submission)?;
        }

        let (image_index, suboptimal) =
            match swapchain.acquire_next_image(u64::MAX, sync.image_available)? {
                AcquireOutcome::Acquired { index, suboptimal } => (index, suboptimal),
                AcquireOutcome::OutOfDate => return Ok(FrameOutcome::SurfaceOutOfDate),
            };

        // The image may still be in flight under another slot's fence.
        let image_fence = self.image_fences[image_index as usize];
        if image_fence != vk::Fence::null() {
            unsafe {
                device
                    .wait_for_fences(&[image_fence], true, u64::MAX)
                    .map_err(SetupError::Submission)?;
            }
        }
        self.image_fences[image_index as usize] = sync.in_flight_fence;

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished];
        let buffers = [command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            device
                .reset_fences(&[sync.in_flight_fence])
                .map_err(SetupError::Submission)?;
            device
                .queue_submit(self.ctx.queue, &[submit_info], sync.in_flight_fence)
                .map_err(SetupError::Submission)?;
        }

        let outcome = match swapchain.present(self.ctx.queue, image_index, &signal_semaphores)? {
            PresentOutcome::Presented { suboptimal: p } => FrameOutcome::Presented {
                image_index,
                suboptimal: suboptimal || p,
            },
            PresentOutcome::OutOfDate => FrameOutcome::SurfaceOutOfDate,
        };
        remember(&mut self.last_presented, &outcome);

        self.current = advance(self.current, self.frames.len());
        Ok(outcome)
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        self.ctx.wait_idle();
        for sync in &self.frames {
            sync.destroy(&self.ctx.device);
        }
    }
}

fn advance(current: usize, slots: usize) -> usize {
    (current + 1) % slots
}

fn remember(last: &mut Option<u32>, outcome: &FrameOutcome) {
    if let FrameOutcome::Presented { image_index, .. } = *outcome {
        *last = Some(image_index);
    }
}

#[cfg(test)]
mod tests {
    use super::{advance, remember, FrameOutcome};

    #[test]
    fn slots_cycle_in_order() {
        assert_eq!(advance(0, 2), 1);
        assert_eq!(advance(1, 2), 0);
    }

    #[test]
    fn a_walk_visits_every_slot_evenly() {
        let mut counts = [0u32; 3];
        let mut slot = 0;
        for _ in 0..9 {
            counts[slot] += 1;
            slot = advance(slot, 3);
        }
        assert_eq!(counts, [3, 3, 3]);
    }

    #[test]
    fn only_presented_frames_update_the_dump_source() {
        let mut last = None;
        remember(&mut last, &FrameOutcome::SurfaceOutOfDate);
        assert_eq!(last, None);

        // The first acquire may hand out any image, not index 0.
        let outcome = FrameOutcome::Presented {
            image_index: 1,
            suboptimal: false,
        };
        remember(&mut last, &outcome);
        assert_eq!(last, Some(1));

        let outcome = FrameOutcome::Presented {
            image_index: 2,
            suboptimal: true,
        };
        remember(&mut last, &outcome);
        assert_eq!(last, Some(2));

        remember(&mut last, &FrameOutcome::SurfaceOutOfDate);
        assert_eq!(last, Some(2));
    }
}
