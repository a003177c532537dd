// vktriangle_shared - two Vulkan devices sharing one image.
//
// A producer thread renders the triangle into an image whose memory is
// exported as an opaque fd. The main thread imports that fd on its own
// device, blits the shared image into a local one, dumps it as PPM and
// asks the producer to stop. The producer renders one frame before
// publishing, so the consumer always sees a finished triangle.

use anyhow::{anyhow, Result};
use ash::vk;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vkdemos::backend::{
    pipeline, AllocatedImage, CommandPool, Framebuffers, GraphicsPipeline, PipelineConfig,
    ShaderModule,
};
use vkdemos::handoff::{handoff, Producer};
use vkdemos::{init_logging, ppm, readback, ContextOptions, DemoConfig, SetupError, VulkanContext};

const SIZE: u32 = 256;
const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

fn external_memory_options(app_name: &'static str, validation: bool) -> ContextOptions {
    ContextOptions {
        app_name,
        validation,
        instance_extensions: Vec::new(),
        device_extensions: vec![ash::extensions::khr::ExternalMemoryFd::name()],
    }
}

fn main() -> Result<()> {
    init_logging();
    let config = DemoConfig::load();
    log::info!("Validation layers: {}", config.validation());

    let validation = config.validation();
    let (producer, consumer) = handoff();

    let worker = thread::spawn(move || producer_thread(producer, validation));

    let handle = consumer.wait_handle()?;
    log::info!("Received shared memory handle {:?}", handle);

    let ctx = VulkanContext::new(external_memory_options(
        "vktriangle_shared_consumer",
        validation,
    ))?;

    let imported = AllocatedImage::imported_target(&ctx, SIZE, SIZE, FORMAT, handle)?;
    let local = AllocatedImage::blit_target(&ctx, SIZE, SIZE, FORMAT)?;

    let pool = CommandPool::new(&ctx)?;
    let cmd = pool.allocate_one()?;
    record_blit(&ctx, cmd, &imported, &local)?;
    ctx.submit_and_wait(cmd)?;

    let pixels = readback::download_image(
        &ctx,
        &pool,
        local.image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        SIZE,
        SIZE,
    )?;
    ppm::write_ppm_file(config.output(), &pixels).map_err(SetupError::Output)?;

    consumer.shutdown();
    worker
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))??;

    Ok(())
}

fn producer_thread(producer: Producer, validation: bool) -> Result<()> {
    let ctx = VulkanContext::new(external_memory_options(
        "vktriangle_shared_producer",
        validation,
    ))?;

    let (target, handle) = AllocatedImage::exported_target(&ctx, SIZE, SIZE, FORMAT)?;
    let render_pass =
        pipeline::color_pass(&ctx, FORMAT, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;

    let vert = ShaderModule::load(&ctx, "triangle.vert")?;
    let frag = ShaderModule::load(&ctx, "passthrough.frag")?;

    let pipe = GraphicsPipeline::new(
        &ctx,
        &PipelineConfig {
            vert: &vert,
            frag: &frag,
            render_pass: render_pass.handle,
            subpass: 0,
            extent: target.extent,
            color_attachments: 1,
            vertex_bindings: &[],
            vertex_attributes: &[],
            set_layouts: &[],
        },
    )?;

    let framebuffers =
        Framebuffers::new(&ctx, render_pass.handle, &[&[target.view]], target.extent)?;

    let pool = CommandPool::new(&ctx)?;
    let cmd = pool.allocate_one()?;

    let render = || -> Result<(), SetupError> {
        record_triangle(
            &ctx,
            cmd,
            render_pass.handle,
            framebuffers.handles[0],
            target.extent,
            pipe.pipeline,
        )?;
        ctx.submit_and_wait(cmd)
    };

    // First frame lands before the handle goes out.
    render()?;
    let running = producer.publish(handle)?;
    log::info!("Producer published handle, rendering until shutdown");

    while !running.should_stop(Duration::from_secs(1)) {
        render()?;
    }

    ctx.wait_idle();
    log::info!("Producer stopping");
    Ok(())
}

fn record_triangle(
    ctx: &Arc<VulkanContext>,
    cmd: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    pipeline: vk::Pipeline,
) -> Result<(), SetupError> {
    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    }];

    let pass_begin = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(&clear_values);

    unsafe {
        ctx.device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(SetupError::Recording)?;
        ctx.device
            .cmd_begin_render_pass(cmd, &pass_begin, vk::SubpassContents::INLINE);
        ctx.device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        ctx.device.cmd_draw(cmd, 3, 1, 0, 0);
        ctx.device.cmd_end_render_pass(cmd);
        ctx.device
            .end_command_buffer(cmd)
            .map_err(SetupError::Recording)?;
    }

    Ok(())
}

fn record_blit(
    ctx: &Arc<VulkanContext>,
    cmd: vk::CommandBuffer,
    imported: &AllocatedImage,
    local: &AllocatedImage,
) -> Result<(), SetupError> {
    let color_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        ctx.device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(SetupError::Recording)?;

        let imported_to_src = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(imported.image)
            .subresource_range(color_range)
            .build();

        let local_to_dst = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(local.image)
            .subresource_range(color_range)
            .build();

        ctx.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[imported_to_src, local_to_dst],
        );

        let full = [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: SIZE as i32,
                y: SIZE as i32,
                z: 1,
            },
        ];

        // The blit does no swizzling; both sides were created with the same
        // format, so channel order matches.
        let blit = vk::ImageBlit::builder()
            .src_subresource(layers)
            .src_offsets(full)
            .dst_subresource(layers)
            .dst_offsets(full)
            .build();

        ctx.device.cmd_blit_image(
            cmd,
            imported.image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            local.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::NEAREST,
        );

        ctx.device
            .end_command_buffer(cmd)
            .map_err(SetupError::Recording)?;
    }

    Ok(())
}
