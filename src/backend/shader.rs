// Shader module loading.
//
// The build script compiles the GLSL sources to SPIR-V next to the example
// binaries, so shaders load from the executable's directory at runtime.
// With the glsl-compile feature the GLSL is compiled on the fly instead,
// which is handy on systems without glslc.

#[cfg(not(feature = "glsl-compile"))]
use ash::util::read_spv;
use ash::vk;
#[cfg(not(feature = "glsl-compile"))]
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use super::context::VulkanContext;
use crate::error::SetupError;

pub struct ShaderModule {
    pub module: vk::ShaderModule,
    ctx: Arc<VulkanContext>,
}

impl ShaderModule {
    /// Load the shader named e.g. "triangle.vert", compiled as SPIR-V next
    /// to the running executable.
    pub fn load(ctx: &Arc<VulkanContext>, name: &str) -> Result<Self, SetupError> {
        let code = load_spirv(name)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { ctx.device.create_shader_module(&create_info, None) }.map_err(
            |e| SetupError::ShaderModule {
                path: PathBuf::from(name),
                source: e,
            },
        )?;

        Ok(Self {
            module,
            ctx: Arc::clone(ctx),
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_shader_module(self.module, None) };
    }
}

fn exe_dir() -> Result<PathBuf, SetupError> {
    let exe = std::env::current_exe().map_err(|e| SetupError::ShaderLoad {
        path: PathBuf::new(),
        source: e,
    })?;
    let dir = exe.parent().ok_or_else(|| SetupError::ShaderLoad {
        path: exe.clone(),
        source: io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"),
    })?;
    Ok(dir.to_path_buf())
}

#[cfg(not(feature = "glsl-compile"))]
fn load_spirv(name: &str) -> Result<Vec<u32>, SetupError> {
    let path = exe_dir()?.join(format!("{name}.spv"));

    let mut file = File::open(&path).map_err(|e| SetupError::ShaderLoad {
        path: path.clone(),
        source: e,
    })?;

    read_spv(&mut file).map_err(|e| SetupError::ShaderLoad { path, source: e })
}

#[cfg(feature = "glsl-compile")]
fn load_spirv(name: &str) -> Result<Vec<u32>, SetupError> {
    let path = exe_dir()?.join("shaders").join(name);

    let source = std::fs::read_to_string(&path).map_err(|e| SetupError::ShaderLoad {
        path: path.clone(),
        source: e,
    })?;

    let kind = match path.extension().and_then(|ext| ext.to_str()) {
        Some("vert") => shaderc::ShaderKind::Vertex,
        Some("frag") => shaderc::ShaderKind::Fragment,
        Some("comp") => shaderc::ShaderKind::Compute,
        _ => {
            return Err(SetupError::ShaderLoad {
                path,
                source: io::Error::new(io::ErrorKind::InvalidInput, "unknown shader extension"),
            })
        }
    };

    let compiler = shaderc::Compiler::new().ok_or_else(|| SetupError::ShaderLoad {
        path: path.clone(),
        source: io::Error::new(io::ErrorKind::Other, "shaderc compiler unavailable"),
    })?;

    let artifact = compiler
        .compile_into_spirv(&source, kind, name, "main", None)
        .map_err(|e| SetupError::ShaderLoad {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
        })?;

    Ok(artifact.as_binary().to_vec())
}
