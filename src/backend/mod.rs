// Backend module - thin Vulkan wrappers over ash.
//
// Each wrapper owns its handles and destroys them on drop, so the example
// binaries unwind cleanly whichever setup step fails.

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::AllocatedBuffer;
pub use command::CommandPool;
pub use context::{ContextOptions, VulkanContext};
pub use descriptor::{DescriptorLayout, DescriptorPool};
pub use image::AllocatedImage;
pub use pipeline::{ComputePipeline, Framebuffers, GraphicsPipeline, PipelineConfig, RenderPass};
pub use shader::ShaderModule;
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
pub use sync::FrameSync;
