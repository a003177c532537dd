// Image readback through host-visible memory.
//
// A rendered optimal-tiling image is copied once into a linear image, then
// mapped and walked row by row honoring the driver's row pitch. Linear
// host-visible images (the compute example's) map directly.

use ash::vk;
use std::sync::Arc;

use crate::backend::command::CommandPool;
use crate::backend::context::VulkanContext;
use crate::backend::image::AllocatedImage;
use crate::error::SetupError;
use crate::ppm::PixelBuffer;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Copy an optimal-tiling image into host memory.
///
/// `current_layout` is the layout the image was left in by rendering; the
/// copy transitions it to TRANSFER_SRC_OPTIMAL and leaves it there.
pub fn download_image(
    ctx: &Arc<VulkanContext>,
    pool: &CommandPool,
    image: vk::Image,
    current_layout: vk::ImageLayout,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, SetupError> {
    let staging = AllocatedImage::linear_readback(ctx, width, height, vk::Format::R8G8B8A8_UNORM)?;

    let cmd = pool.allocate_one()?;

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        ctx.device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(SetupError::Recording)?;

        let to_transfer_dst = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(staging.image)
            .subresource_range(COLOR_RANGE)
            .build();

        let to_transfer_src = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
            .old_layout(current_layout)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_RANGE)
            .build();

        ctx.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer_dst, to_transfer_src],
        );

        let copy = vk::ImageCopy::builder()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .build();

        ctx.device.cmd_copy_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            staging.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy],
        );

        // Make the copy visible to the host before the fence wait returns.
        let to_host = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::GENERAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(staging.image)
            .subresource_range(COLOR_RANGE)
            .build();

        ctx.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_host],
        );

        ctx.device
            .end_command_buffer(cmd)
            .map_err(SetupError::Recording)?;
    }

    ctx.submit_and_wait(cmd)?;

    unsafe { ctx.device.free_command_buffers(pool.pool, &[cmd]) };

    map_pixels(ctx, &staging)
}

/// Map a linear host-visible image and copy its pixels out.
pub fn read_linear_image(
    ctx: &Arc<VulkanContext>,
    image: &AllocatedImage,
) -> Result<PixelBuffer, SetupError> {
    map_pixels(ctx, image)
}

fn map_pixels(
    ctx: &Arc<VulkanContext>,
    image: &AllocatedImage,
) -> Result<PixelBuffer, SetupError> {
    let layout = image.subresource_layout();
    let row_pitch = layout.row_pitch as usize;
    let height = image.extent.height as usize;

    let data = unsafe {
        let ptr = ctx
            .device
            .map_memory(image.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            .map_err(SetupError::Readback)? as *const u8;

        let pixels = ptr.add(layout.offset as usize);
        let data = std::slice::from_raw_parts(pixels, row_pitch * height).to_vec();
        ctx.device.unmap_memory(image.memory);
        data
    };

    Ok(PixelBuffer {
        width: image.extent.width,
        height: image.extent.height,
        row_pitch,
        data,
    })
}
