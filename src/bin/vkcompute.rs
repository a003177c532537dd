// vkcompute - box-blur a test pattern with a compute shader.
//
// Two linear host-visible storage images: the input is filled through a
// mapping with a checkered test pattern, one compute dispatch blurs it
// horizontally into the output. The input lands in src.ppm, the blurred
// result in the configured output path.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use vkdemos::backend::{
    AllocatedImage, CommandPool, ComputePipeline, DescriptorLayout, DescriptorPool, ShaderModule,
};
use vkdemos::{init_logging, ppm, readback, ContextOptions, DemoConfig, SetupError, VulkanContext};

const SIZE: u32 = 256;
const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const GROUP_SIZE: u32 = 16;

/// One pixel of the test pattern: 8px checker in red, coordinates in
/// green and blue, opaque alpha. Packed for R8G8B8A8 through a
/// little-endian u32 write.
fn pattern_pixel(x: u32, y: u32) -> u32 {
    let checker = ((x & 0x8) == 0) ^ ((y & 0x8) == 0);
    let red = u32::from(checker) * 255;
    red | (x << 8) | (y << 16) | (255 << 24)
}

fn main() -> Result<()> {
    init_logging();
    let config = DemoConfig::load();
    log::info!("Validation layers: {}", config.validation());

    let ctx = VulkanContext::new(ContextOptions::headless("vkcompute", config.validation()))?;

    let input = AllocatedImage::linear_storage(&ctx, SIZE, SIZE, FORMAT)?;
    let output = AllocatedImage::linear_storage(&ctx, SIZE, SIZE, FORMAT)?;

    fill_pattern(&ctx, &input)?;

    let layout = DescriptorLayout::new(
        &ctx,
        &[
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
                .build(),
        ],
    )?;

    let shader = ShaderModule::load(&ctx, "blur.comp")?;
    let pipeline = ComputePipeline::new(
        &ctx,
        &shader,
        &[layout.handle],
        std::mem::size_of::<[i32; 2]>() as u32,
    )?;

    let pool = DescriptorPool::new(
        &ctx,
        &[vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_IMAGE,
            descriptor_count: 2,
        }],
        1,
    )?;
    let set = pool.allocate(&layout)?;

    let input_info = [vk::DescriptorImageInfo {
        sampler: vk::Sampler::null(),
        image_view: input.view,
        image_layout: vk::ImageLayout::GENERAL,
    }];
    let output_info = [vk::DescriptorImageInfo {
        sampler: vk::Sampler::null(),
        image_view: output.view,
        image_layout: vk::ImageLayout::GENERAL,
    }];

    let writes = [
        vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .image_info(&input_info)
            .build(),
        vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(1)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .image_info(&output_info)
            .build(),
    ];
    unsafe { ctx.device.update_descriptor_sets(&writes, &[]) };

    let command_pool = CommandPool::new(&ctx)?;
    let cmd = command_pool.allocate_one()?;

    record(&ctx, cmd, &input, &output, &pipeline, set)?;
    ctx.submit_and_wait(cmd)?;

    let input_pixels = readback::read_linear_image(&ctx, &input)?;
    let output_pixels = readback::read_linear_image(&ctx, &output)?;

    ppm::write_ppm_file("src.ppm", &input_pixels).map_err(SetupError::Output)?;
    ppm::write_ppm_file(config.output(), &output_pixels).map_err(SetupError::Output)?;

    Ok(())
}

fn fill_pattern(ctx: &Arc<VulkanContext>, image: &AllocatedImage) -> Result<(), SetupError> {
    let layout = image.subresource_layout();
    let pitch_px = layout.row_pitch as usize / 4;

    unsafe {
        let ptr = ctx
            .device
            .map_memory(
                image.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )
            .map_err(SetupError::Readback)? as *mut u8;

        // x indexes the row here, as in the original pattern; the image is
        // its own transpose apart from the coordinate channels.
        let pixels = ptr.add(layout.offset as usize) as *mut u32;
        for x in 0..SIZE as usize {
            for y in 0..SIZE as usize {
                *pixels.add(x * pitch_px + y) = pattern_pixel(x as u32, y as u32);
            }
        }

        ctx.device.unmap_memory(image.memory);
    }

    Ok(())
}

fn record(
    ctx: &Arc<VulkanContext>,
    cmd: vk::CommandBuffer,
    input: &AllocatedImage,
    output: &AllocatedImage,
    pipeline: &ComputePipeline,
    set: vk::DescriptorSet,
) -> Result<(), SetupError> {
    let color_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        ctx.device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(SetupError::Recording)?;

        // PREINITIALIZED keeps the host-written pattern across this
        // transition; the output image has nothing worth keeping.
        let input_to_general = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::HOST_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .old_layout(vk::ImageLayout::PREINITIALIZED)
            .new_layout(vk::ImageLayout::GENERAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(input.image)
            .subresource_range(color_range)
            .build();

        let output_to_general = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::SHADER_WRITE)
            .old_layout(vk::ImageLayout::PREINITIALIZED)
            .new_layout(vk::ImageLayout::GENERAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(output.image)
            .subresource_range(color_range)
            .build();

        ctx.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::HOST,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[input_to_general, output_to_general],
        );

        ctx.device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
        ctx.device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            pipeline.layout,
            0,
            &[set],
            &[],
        );

        let direction: [i32; 2] = [1, 0];
        let bytes = std::slice::from_raw_parts(
            direction.as_ptr() as *const u8,
            std::mem::size_of_val(&direction),
        );
        ctx.device
            .cmd_push_constants(cmd, pipeline.layout, vk::ShaderStageFlags::COMPUTE, 0, bytes);

        ctx.device
            .cmd_dispatch(cmd, SIZE / GROUP_SIZE, SIZE / GROUP_SIZE, 1);

        // Blurred pixels must reach the host before the fence wait returns.
        let output_to_host = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .old_layout(vk::ImageLayout::GENERAL)
            .new_layout(vk::ImageLayout::GENERAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(output.image)
            .subresource_range(color_range)
            .build();

        ctx.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::HOST,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[output_to_host],
        );

        ctx.device
            .end_command_buffer(cmd)
            .map_err(SetupError::Recording)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::pattern_pixel;

    #[test]
    fn pattern_encodes_coordinates_in_green_and_blue() {
        let px = pattern_pixel(3, 200);
        assert_eq!((px >> 8) & 0xff, 3);
        assert_eq!((px >> 16) & 0xff, 200);
        assert_eq!(px >> 24, 255);
    }

    #[test]
    fn checker_flips_every_eight_pixels() {
        let a = pattern_pixel(0, 0) & 0xff;
        let b = pattern_pixel(8, 0) & 0xff;
        let c = pattern_pixel(8, 8) & 0xff;
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert!(a == 0 || a == 255);
    }

    #[test]
    fn checker_is_symmetric_in_x_and_y() {
        for (x, y) in [(1, 9), (12, 4), (100, 200)] {
            assert_eq!(pattern_pixel(x, y) & 0xff, pattern_pixel(y, x) & 0xff);
        }
    }
}
