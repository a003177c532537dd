// vktriangle_window - the triangle in a window.
//
// Same triangle, but vertices come from a vertex buffer and frames go
// through a swapchain at vsync pace. Closing the window reads the last
// presented swapchain image back and dumps it as PPM before teardown.

use anyhow::Result;
use ash::vk;
use glam::Vec2;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

use vkdemos::backend::{
    pipeline, surface, AllocatedBuffer, CommandPool, Framebuffers, GraphicsPipeline,
    PipelineConfig, RenderPass, ShaderModule, Swapchain,
};
use vkdemos::frame::{FrameDriver, FrameOutcome};
use vkdemos::{init_logging, ppm, readback, ContextOptions, DemoConfig, SetupError, VulkanContext};

const WIDTH: u32 = 512;
const HEIGHT: u32 = 512;
const FRAMES_IN_FLIGHT: usize = 2;
// Rough pacing on top of vsync, like the other slow-loop examples.
const FRAME_PAUSE: Duration = Duration::from_millis(150);

fn main() -> Result<()> {
    init_logging();
    let config = DemoConfig::load();
    log::info!("Validation layers: {}", config.validation());

    let event_loop = EventLoop::new()?;
    let mut app = App {
        config,
        window: None,
        renderer: None,
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}

struct App {
    config: DemoConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
}

/// All Vulkan state behind the window. Field order is drop order.
struct Renderer {
    driver: FrameDriver,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    framebuffers: Framebuffers,
    pipeline: GraphicsPipeline,
    vertex_buffer: AllocatedBuffer,
    render_pass: RenderPass,
    // Option so Drop can destroy the swapchain before the surface.
    swapchain: Option<Swapchain>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::extensions::khr::Surface,
    ctx: Arc<VulkanContext>,
}

impl Renderer {
    fn new(window: &Window, validation: bool) -> Result<Self> {
        let display_handle = window.display_handle()?.as_raw();
        let window_handle = window.window_handle()?.as_raw();

        let ctx = VulkanContext::new(ContextOptions {
            app_name: "vktriangle_window",
            validation,
            instance_extensions: surface::required_instance_extensions(display_handle)?,
            device_extensions: vec![ash::extensions::khr::Swapchain::name()],
        })?;

        let surface_loader = ash::extensions::khr::Surface::new(ctx.entry(), &ctx.instance);
        let surface =
            surface::create_surface(ctx.entry(), &ctx.instance, display_handle, window_handle)?;

        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                ctx.physical_device,
                ctx.queue_family,
                surface,
            )
        }
        .unwrap_or(false);
        if !supported {
            unsafe { surface_loader.destroy_surface(surface, None) };
            anyhow::bail!("GPU cannot present to this surface");
        }

        let swapchain = Swapchain::new(Arc::clone(&ctx), surface, &surface_loader, WIDTH, HEIGHT)?;

        let render_pass =
            pipeline::color_pass(&ctx, swapchain.format, vk::ImageLayout::PRESENT_SRC_KHR)?;

        let vertices = [
            Vec2::new(0.0, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ];
        let vertex_buffer = AllocatedBuffer::vertex_with_data(&ctx, &vertices)?;

        let vert = ShaderModule::load(&ctx, "position.vert")?;
        let frag = ShaderModule::load(&ctx, "passthrough.frag")?;

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

        let pipeline = GraphicsPipeline::new(
            &ctx,
            &PipelineConfig {
                vert: &vert,
                frag: &frag,
                render_pass: render_pass.handle,
                subpass: 0,
                extent: swapchain.extent,
                color_attachments: 1,
                vertex_bindings: &vertex_bindings,
                vertex_attributes: &vertex_attributes,
                set_layouts: &[],
            },
        )?;

        let attachment_sets: Vec<&[vk::ImageView]> = swapchain
            .image_views
            .iter()
            .map(std::slice::from_ref)
            .collect();
        let framebuffers = Framebuffers::new(
            &ctx,
            render_pass.handle,
            &attachment_sets,
            swapchain.extent,
        )?;

        let command_pool = CommandPool::new(&ctx)?;
        let command_buffers = command_pool.allocate(swapchain.images.len() as u32)?;

        record_commands(
            &ctx,
            &command_buffers,
            render_pass.handle,
            &framebuffers.handles,
            swapchain.extent,
            pipeline.pipeline,
            vertex_buffer.buffer,
        )?;

        let driver = FrameDriver::new(&ctx, FRAMES_IN_FLIGHT, swapchain.images.len())?;

        Ok(Self {
            driver,
            command_buffers,
            command_pool,
            framebuffers,
            pipeline,
            vertex_buffer,
            render_pass,
            swapchain: Some(swapchain),
            surface,
            surface_loader,
            ctx,
        })
    }

    fn draw(&mut self) -> Result<FrameOutcome, SetupError> {
        let Some(swapchain) = self.swapchain.as_ref() else {
            return Ok(FrameOutcome::SurfaceOutOfDate);
        };
        self.driver.draw_frame(swapchain, &self.command_buffers)
    }

    /// Read the last presented swapchain image back and write it as PPM.
    /// Only presented images are in a known layout; an image the driver
    /// never handed out is still undefined and has nothing to dump.
    fn dump_image(&self, path: &std::path::Path) -> Result<(), SetupError> {
        let Some(image_index) = self.driver.last_presented() else {
            log::warn!("No frame was presented, skipping image dump");
            return Ok(());
        };
        let swapchain = match &self.swapchain {
            Some(swapchain) => swapchain,
            None => return Ok(()),
        };

        self.ctx.wait_idle();
        let pixels = readback::download_image(
            &self.ctx,
            &self.command_pool,
            swapchain.images[image_index as usize],
            vk::ImageLayout::PRESENT_SRC_KHR,
            swapchain.extent.width,
            swapchain.extent.height,
        )?;
        ppm::write_ppm_file(path, &pixels).map_err(SetupError::Output)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.ctx.wait_idle();
        // The swapchain has to go before its surface.
        self.swapchain = None;
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

fn record_commands(
    ctx: &Arc<VulkanContext>,
    command_buffers: &[vk::CommandBuffer],
    render_pass: vk::RenderPass,
    framebuffers: &[vk::Framebuffer],
    extent: vk::Extent2D,
    pipeline: vk::Pipeline,
    vertex_buffer: vk::Buffer,
) -> Result<(), SetupError> {
    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    }];

    for (&cmd, &framebuffer) in command_buffers.iter().zip(framebuffers) {
        // Re-submitted every frame, so not ONE_TIME_SUBMIT.
        let begin_info = vk::CommandBufferBeginInfo::builder();

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
            ctx.device
                .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
            ctx.device.cmd_draw(cmd, 3, 1, 0, 0);
            ctx.device.cmd_end_render_pass(cmd);
            ctx.device
                .end_command_buffer(cmd)
                .map_err(SetupError::Recording)?;
        }
    }

    Ok(())
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title("vktriangle_window")
            .with_inner_size(winit::dpi::PhysicalSize::new(WIDTH, HEIGHT))
            .with_resizable(false);

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, self.config.validation()) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, dumping last frame");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.dump_image(self.config.output()) {
                        log::error!("Image dump failed: {}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                let Some(ref mut renderer) = self.renderer else {
                    return;
                };
                match renderer.draw() {
                    Ok(FrameOutcome::Presented { suboptimal, .. }) => {
                        if suboptimal {
                            log::debug!("Swapchain suboptimal");
                        }
                        std::thread::sleep(FRAME_PAUSE);
                    }
                    Ok(FrameOutcome::SurfaceOutOfDate) => {
                        // Fixed-size window; treat this as a signal to quit
                        // rather than recreating the swapchain.
                        log::warn!("Surface out of date, exiting");
                        event_loop.exit();
                    }
                    Err(e) => {
                        log::error!("Render error: {}", e);
                        event_loop.exit();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, dumping last frame");
                    if let Some(ref renderer) = self.renderer {
                        if let Err(e) = renderer.dump_image(self.config.output()) {
                            log::error!("Image dump failed: {}", e);
                        }
                    }
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
