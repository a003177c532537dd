// Render passes, framebuffers and pipelines.
//
// Every pipeline here is fully baked: fixed viewport, no dynamic state.
// The examples rebuild nothing at runtime, so the wrappers only need to
// create and destroy.

use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::context::VulkanContext;
use super::shader::ShaderModule;
use crate::error::SetupError;

const SHADER_ENTRY: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

pub struct RenderPass {
    pub handle: vk::RenderPass,
    ctx: Arc<VulkanContext>,
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_render_pass(self.handle, None) };
    }
}

/// Single-subpass color pass: clear, draw, leave the image in `final_layout`.
pub fn color_pass(
    ctx: &Arc<VulkanContext>,
    format: vk::Format,
    final_layout: vk::ImageLayout,
) -> Result<RenderPass, SetupError> {
    let attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
        .build();

    let color_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_refs = [color_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .build();

    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = [attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];

    let info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let handle = unsafe { ctx.device.create_render_pass(&info, None) }.map_err(|e| {
        SetupError::Pipeline {
            what: "render pass",
            source: e,
        }
    })?;

    Ok(RenderPass {
        handle,
        ctx: Arc::clone(ctx),
    })
}

/// Three-subpass composition pass.
///
/// Attachment 0 is the final output; attachments 1..=3 are scratch color
/// targets that the last subpass reads back as input attachments.
///
/// - subpass 0 draws into attachments 1 and 2
/// - subpass 1 draws into attachment 3, preserving 1 and 2
/// - subpass 2 reads 1..=3 and writes the composed image into 0
pub fn compose_pass(ctx: &Arc<VulkanContext>, format: vk::Format) -> Result<RenderPass, SetupError> {
    let output_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    // Scratch attachments live only inside the pass.
    let scratch_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .build();

    let attachments = [
        output_attachment,
        scratch_attachment,
        scratch_attachment,
        scratch_attachment,
    ];

    let color_ref = |attachment| {
        vk::AttachmentReference::builder()
            .attachment(attachment)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()
    };
    let input_ref = |attachment| {
        vk::AttachmentReference::builder()
            .attachment(attachment)
            .layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .build()
    };

    let first_colors = [color_ref(1), color_ref(2)];
    let second_colors = [color_ref(3)];
    let second_preserve = [1u32, 2u32];
    let compose_inputs = [input_ref(1), input_ref(2), input_ref(3)];
    let compose_colors = [color_ref(0)];

    let subpasses = [
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&first_colors)
            .build(),
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&second_colors)
            .preserve_attachments(&second_preserve)
            .build(),
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .input_attachments(&compose_inputs)
            .color_attachments(&compose_colors)
            .build(),
    ];

    let dependencies = compose_dependencies();

    let info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let handle = unsafe { ctx.device.create_render_pass(&info, None) }.map_err(|e| {
        SetupError::Pipeline {
            what: "composition render pass",
            source: e,
        }
    })?;

    Ok(RenderPass {
        handle,
        ctx: Arc::clone(ctx),
    })
}

/// Dependencies for the composition pass. Each producing subpass must
/// finish its color writes before the compose subpass reads them as input
/// attachments, and anything that touched the output image earlier must
/// drain before the compose subpass writes it.
fn compose_dependencies() -> [vk::SubpassDependency; 3] {
    let produce_to_compose = |src| {
        vk::SubpassDependency::builder()
            .src_subpass(src)
            .dst_subpass(2)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build()
    };

    [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(2)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
        produce_to_compose(0),
        produce_to_compose(1),
    ]
}

/// One framebuffer per attachment set, all sharing a render pass.
pub struct Framebuffers {
    pub handles: Vec<vk::Framebuffer>,
    ctx: Arc<VulkanContext>,
}

impl Framebuffers {
    pub fn new(
        ctx: &Arc<VulkanContext>,
        render_pass: vk::RenderPass,
        attachment_sets: &[&[vk::ImageView]],
        extent: vk::Extent2D,
    ) -> Result<Self, SetupError> {
        let mut handles = Vec::with_capacity(attachment_sets.len());

        for attachments in attachment_sets {
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            match unsafe { ctx.device.create_framebuffer(&info, None) } {
                Ok(framebuffer) => handles.push(framebuffer),
                Err(e) => {
                    for &framebuffer in &handles {
                        unsafe { ctx.device.destroy_framebuffer(framebuffer, None) };
                    }
                    return Err(SetupError::Pipeline {
                        what: "framebuffer",
                        source: e,
                    });
                }
            }
        }

        Ok(Self {
            handles,
            ctx: Arc::clone(ctx),
        })
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.handles {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

/// Everything that varies between the example graphics pipelines.
pub struct PipelineConfig<'a> {
    pub vert: &'a ShaderModule,
    pub frag: &'a ShaderModule,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub extent: vk::Extent2D,
    /// Number of color attachments in this subpass.
    pub color_attachments: u32,
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub set_layouts: &'a [vk::DescriptorSetLayout],
}

pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    ctx: Arc<VulkanContext>,
}

impl GraphicsPipeline {
    pub fn new(ctx: &Arc<VulkanContext>, config: &PipelineConfig) -> Result<Self, SetupError> {
        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(config.vert.module)
            .name(SHADER_ENTRY)
            .build();

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(config.frag.module)
            .name(SHADER_ENTRY)
            .build();

        let shader_stages = [vert_stage, frag_stage];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(config.vertex_bindings)
            .vertex_attribute_descriptions(config.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(config.extent.width as f32)
            .height(config.extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build();

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(config.extent)
            .build();

        let viewports = [viewport];
        let scissors = [scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let blend_attachments = vec![blend_attachment; config.color_attachments as usize];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(config.set_layouts);

        let layout = unsafe { ctx.device.create_pipeline_layout(&layout_info, None) }.map_err(
            |e| SetupError::Pipeline {
                what: "pipeline layout",
                source: e,
            },
        )?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .build();

        let pipelines = unsafe {
            ctx.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| {
            unsafe { ctx.device.destroy_pipeline_layout(layout, None) };
            SetupError::Pipeline {
                what: "graphics pipeline",
                source: e,
            }
        })?;

        Ok(Self {
            pipeline: pipelines[0],
            layout,
            ctx: Arc::clone(ctx),
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    ctx: Arc<VulkanContext>,
}

impl ComputePipeline {
    pub fn new(
        ctx: &Arc<VulkanContext>,
        shader: &ShaderModule,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_size: u32,
    ) -> Result<Self, SetupError> {
        let mut layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);

        let push_constant_ranges;
        if push_constant_size > 0 {
            push_constant_ranges = [vk::PushConstantRange::builder()
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
                .offset(0)
                .size(push_constant_size)
                .build()];
            layout_info = layout_info.push_constant_ranges(&push_constant_ranges);
        }

        let layout = unsafe { ctx.device.create_pipeline_layout(&layout_info, None) }.map_err(
            |e| SetupError::Pipeline {
                what: "compute pipeline layout",
                source: e,
            },
        )?;

        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.module)
            .name(SHADER_ENTRY)
            .build();

        let pipeline_info = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(layout)
            .build();

        let pipelines = unsafe {
            ctx.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| {
            unsafe { ctx.device.destroy_pipeline_layout(layout, None) };
            SetupError::Pipeline {
                what: "compute pipeline",
                source: e,
            }
        })?;

        Ok(Self {
            pipeline: pipelines[0],
            layout,
            ctx: Arc::clone(ctx),
        })
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_dependencies_all_target_the_compose_subpass_by_region() {
        let deps = compose_dependencies();

        for dep in &deps {
            assert_eq!(dep.dst_subpass, 2);
            assert_eq!(dep.dependency_flags, vk::DependencyFlags::BY_REGION);
        }

        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[1].src_subpass, 0);
        assert_eq!(deps[2].src_subpass, 1);
        assert_eq!(
            deps[1].dst_access_mask,
            vk::AccessFlags::INPUT_ATTACHMENT_READ
        );
    }
}
