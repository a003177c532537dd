// Typed errors, one kind per setup phase.
//
// The examples treat every failure as fatal, but a harness should be able
// to tell *which* phase failed without matching on message strings.

use std::io;
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// The setup phase an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Instance,
    DeviceSelection,
    DeviceCreation,
    ResourceAllocation,
    ShaderLoad,
    Pipeline,
    Recording,
    Submission,
    Readback,
    Output,
    Handoff,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to load Vulkan library: {0}")]
    Loader(#[source] ash::LoadingError),

    #[error("failed to create Vulkan instance: {0}")]
    Instance(#[source] vk::Result),

    #[error("invalid application name")]
    InvalidName,

    #[error("unsupported windowing platform: {0}")]
    UnsupportedPlatform(&'static str),

    #[error("no GPU with a graphics queue found")]
    DeviceSelection,

    #[error("failed to create logical device: {0}")]
    DeviceCreation(#[source] vk::Result),

    #[error("failed to allocate {what}: {source}")]
    ResourceAllocation {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("no suitable memory type for {0}")]
    NoMemoryType(&'static str),

    #[error("failed to load shader {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create shader module {path:?}: {source}")]
    ShaderModule {
        path: PathBuf,
        #[source]
        source: vk::Result,
    },

    #[error("failed to create {what}: {source}")]
    Pipeline {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("failed to record command buffer: {0}")]
    Recording(#[source] vk::Result),

    #[error("failed to submit or wait for command buffer: {0}")]
    Submission(#[source] vk::Result),

    #[error("failed to read back image: {0}")]
    Readback(#[source] vk::Result),

    #[error("failed to write image output: {0}")]
    Output(#[source] io::Error),

    #[error("render thread handoff failed: {0}")]
    Handoff(&'static str),
}

impl SetupError {
    pub fn stage(&self) -> SetupStage {
        match self {
            SetupError::Loader(_)
            | SetupError::Instance(_)
            | SetupError::InvalidName
            | SetupError::UnsupportedPlatform(_) => SetupStage::Instance,
            SetupError::DeviceSelection => SetupStage::DeviceSelection,
            SetupError::DeviceCreation(_) => SetupStage::DeviceCreation,
            SetupError::ResourceAllocation { .. } | SetupError::NoMemoryType(_) => {
                SetupStage::ResourceAllocation
            }
            SetupError::ShaderLoad { .. } | SetupError::ShaderModule { .. } => {
                SetupStage::ShaderLoad
            }
            SetupError::Pipeline { .. } => SetupStage::Pipeline,
            SetupError::Recording(_) => SetupStage::Recording,
            SetupError::Submission(_) => SetupStage::Submission,
            SetupError::Readback(_) => SetupStage::Readback,
            SetupError::Output(_) => SetupStage::Output,
            SetupError::Handoff(_) => SetupStage::Handoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_distinguishable_without_string_matching() {
        let err = SetupError::ResourceAllocation {
            what: "render target image",
            source: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        };
        assert_eq!(err.stage(), SetupStage::ResourceAllocation);

        let err = SetupError::ShaderLoad {
            path: PathBuf::from("triangle.vert.spv"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.stage(), SetupStage::ShaderLoad);

        assert_eq!(SetupError::DeviceSelection.stage(), SetupStage::DeviceSelection);
    }

    #[test]
    fn messages_name_the_failing_step() {
        let err = SetupError::Pipeline {
            what: "graphics pipeline",
            source: vk::Result::ERROR_INITIALIZATION_FAILED,
        };
        assert!(err.to_string().contains("graphics pipeline"));
    }
}
