// vktriangle_subpass - compose three tinted triangles with subpasses.
//
// Three subpasses in one render pass: the first draws two instanced
// triangles into two scratch attachments, the second draws a third into
// another while preserving the first two, and the last reads all three as
// input attachments and composes them over a checkerboard background.
// Offscreen, one submit, PPM out.

use anyhow::Result;
use ash::vk;
use glam::Vec2;
use std::sync::Arc;

use vkdemos::backend::{
    pipeline, AllocatedBuffer, AllocatedImage, CommandPool, DescriptorLayout, DescriptorPool,
    Framebuffers, GraphicsPipeline, PipelineConfig, ShaderModule,
};
use vkdemos::{init_logging, ppm, readback, ContextOptions, DemoConfig, SetupError, VulkanContext};

const SIZE: u32 = 512;
const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Per-instance tints and offsets, laid out for std140.
#[repr(C)]
#[derive(Clone, Copy)]
struct Instances {
    tint: [[f32; 4]; 3],
    offset: [[f32; 4]; 3],
}

const INSTANCES: Instances = Instances {
    tint: [
        [1.0, 0.0, 0.0, 1.0],
        [0.0, 1.0, 0.0, 1.0],
        [0.0, 0.0, 1.0, 1.0],
    ],
    offset: [
        [-0.25, -0.25, 0.0, 0.0],
        [0.25, -0.25, 0.0, 0.0],
        [0.0, 0.3, 0.0, 0.0],
    ],
};

fn main() -> Result<()> {
    init_logging();
    let config = DemoConfig::load();
    log::info!("Validation layers: {}", config.validation());

    let ctx = VulkanContext::new(ContextOptions::headless(
        "vktriangle_subpass",
        config.validation(),
    ))?;

    let target = AllocatedImage::color_target(&ctx, SIZE, SIZE, FORMAT)?;
    let scratch = [
        AllocatedImage::subpass_attachment(&ctx, SIZE, SIZE, FORMAT)?,
        AllocatedImage::subpass_attachment(&ctx, SIZE, SIZE, FORMAT)?,
        AllocatedImage::subpass_attachment(&ctx, SIZE, SIZE, FORMAT)?,
    ];

    let render_pass = pipeline::compose_pass(&ctx, FORMAT)?;

    let vertices = [
        Vec2::new(0.0, -0.4),
        Vec2::new(0.4, 0.4),
        Vec2::new(-0.4, 0.4),
    ];
    let vertex_buffer = AllocatedBuffer::vertex_with_data(&ctx, &vertices)?;
    let uniform_buffer = AllocatedBuffer::uniform_with_data(&ctx, &INSTANCES)?;

    // One set serves all three subpasses: the uniform block for the
    // colorizers, the input attachments for the composer.
    let layout = DescriptorLayout::new(
        &ctx,
        &[
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(2)
                .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(3)
                .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
        ],
    )?;

    let colorizer_vert = ShaderModule::load(&ctx, "colorizer.vert")?;
    let colorizer_frag = ShaderModule::load(&ctx, "colorizer.frag")?;
    let compose_vert = ShaderModule::load(&ctx, "compose.vert")?;
    let compose_frag = ShaderModule::load(&ctx, "compose.frag")?;

    let vertex_bindings = [vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(std::mem::size_of::<Vec2>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build()];
    let vertex_attributes = [vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32_SFLOAT)
        .offset(0)
        .build()];

    let extent = target.extent;
    let set_layouts = [layout.handle];

    let first_pipeline = GraphicsPipeline::new(
        &ctx,
        &PipelineConfig {
            vert: &colorizer_vert,
            frag: &colorizer_frag,
            render_pass: render_pass.handle,
            subpass: 0,
            extent,
            color_attachments: 2,
            vertex_bindings: &vertex_bindings,
            vertex_attributes: &vertex_attributes,
            set_layouts: &set_layouts,
        },
    )?;

    let second_pipeline = GraphicsPipeline::new(
        &ctx,
        &PipelineConfig {
            vert: &colorizer_vert,
            frag: &colorizer_frag,
            render_pass: render_pass.handle,
            subpass: 1,
            extent,
            color_attachments: 1,
            vertex_bindings: &vertex_bindings,
            vertex_attributes: &vertex_attributes,
            set_layouts: &set_layouts,
        },
    )?;

    let compose_pipeline = GraphicsPipeline::new(
        &ctx,
        &PipelineConfig {
            vert: &compose_vert,
            frag: &compose_frag,
            render_pass: render_pass.handle,
            subpass: 2,
            extent,
            color_attachments: 1,
            vertex_bindings: &[],
            vertex_attributes: &[],
            set_layouts: &set_layouts,
        },
    )?;

    let framebuffers = Framebuffers::new(
        &ctx,
        render_pass.handle,
        &[&[target.view, scratch[0].view, scratch[1].view, scratch[2].view]],
        extent,
    )?;

    let descriptor_pool = DescriptorPool::new(
        &ctx,
        &[
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::INPUT_ATTACHMENT,
                descriptor_count: 3,
            },
        ],
        1,
    )?;
    let set = descriptor_pool.allocate(&layout)?;
    write_descriptors(&ctx, set, &uniform_buffer, &scratch);

    let pool = CommandPool::new(&ctx)?;
    let cmd = pool.allocate_one()?;

    record(
        &ctx,
        cmd,
        render_pass.handle,
        framebuffers.handles[0],
        extent,
        &[&first_pipeline, &second_pipeline, &compose_pipeline],
        set,
        vertex_buffer.buffer,
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

fn write_descriptors(
    ctx: &Arc<VulkanContext>,
    set: vk::DescriptorSet,
    uniform_buffer: &AllocatedBuffer,
    scratch: &[AllocatedImage; 3],
) {
    let buffer_info = [vk::DescriptorBufferInfo {
        buffer: uniform_buffer.buffer,
        offset: 0,
        range: vk::WHOLE_SIZE,
    }];

    let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = scratch
        .iter()
        .map(|image| {
            [vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: image.view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }]
        })
        .collect();

    let mut writes = vec![vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&buffer_info)
        .build()];

    for (i, info) in image_infos.iter().enumerate() {
        writes.push(
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(1 + i as u32)
                .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                .image_info(info)
                .build(),
        );
    }

    unsafe { ctx.device.update_descriptor_sets(&writes, &[]) };
}

#[allow(clippy::too_many_arguments)]
fn record(
    ctx: &Arc<VulkanContext>,
    cmd: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    pipelines: &[&GraphicsPipeline; 3],
    set: vk::DescriptorSet,
    vertex_buffer: vk::Buffer,
) -> Result<(), SetupError> {
    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    let black = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    };
    let clear_values = [black; 4];

    let pass_begin = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(&clear_values);

    unsafe {
        let device = &ctx.device;

        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(SetupError::Recording)?;
        device.cmd_begin_render_pass(cmd, &pass_begin, vk::SubpassContents::INLINE);

        // Subpass 0: instances 0 and 1 into the first two scratch targets.
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines[0].pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            pipelines[0].layout,
            0,
            &[set],
            &[],
        );
        device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
        device.cmd_draw(cmd, 3, 1, 0, 0);
        device.cmd_draw(cmd, 3, 1, 0, 1);

        // Subpass 1: instance 2 into the third scratch target.
        device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines[1].pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            pipelines[1].layout,
            0,
            &[set],
            &[],
        );
        device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
        device.cmd_draw(cmd, 3, 1, 0, 2);

        // Subpass 2: fullscreen composition.
        device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines[2].pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            pipelines[2].layout,
            0,
            &[set],
            &[],
        );
        device.cmd_draw(cmd, 3, 1, 0, 0);

        device.cmd_end_render_pass(cmd);
        device
            .end_command_buffer(cmd)
            .map_err(SetupError::Recording)?;
    }

    Ok(())
}
