// vkdemos - didactic Vulkan example programs.
//
// Each binary under src/bin is a short, linear Vulkan program in the spirit
// of a single-file example. The modules here hold the setup plumbing the
// examples share: context creation, ownership-scoped resource wrappers,
// the swapchain frame driver, image readback and the PPM dump.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod handoff;
pub mod ppm;
pub mod readback;

pub use backend::context::{ContextOptions, VulkanContext};
pub use config::DemoConfig;
pub use error::{SetupError, SetupStage};

/// Initialize logging for an example binary.
pub fn init_logging() {
    use log::LevelFilter;

    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();
}
