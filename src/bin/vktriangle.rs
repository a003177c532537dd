// vktriangle - render one triangle offscreen and dump it as a PPM file.
//
// The shortest path through Vulkan that produces pixels: no window, no
// swapchain, one submit, one readback.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use vkdemos::backend::{
    pipeline, AllocatedImage, CommandPool, Framebuffers, GraphicsPipeline, PipelineConfig,
    ShaderModule,
};
use vkdemos::{init_logging, ppm, readback, ContextOptions, DemoConfig, SetupError, VulkanContext};

const SIZE: u32 = 256;
const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

fn main() -> Result<()> {
    init_logging();
    let config = DemoConfig::load();
    log::info!("Validation layers: {}", config.validation());

    let ctx = VulkanContext::new(ContextOptions::headless("vktriangle", config.validation()))?;

    let target = AllocatedImage::color_target(&ctx, SIZE, SIZE, FORMAT)?;
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

    record(
        &ctx,
        cmd,
        render_pass.handle,
        framebuffers.handles[0],
        target.extent,
        pipe.pipeline,
    )?;
    ctx.submit_and_wait(cmd)?;

    let pixels = readback::download_image(
        &ctx,
        &pool,
        target.image,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        SIZE,
        SIZE,
    )?;
    ppm::write_ppm_file(config.output(), &pixels).map_err(SetupError::Output)?;

    Ok(())
}

fn record(
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
