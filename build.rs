// Build script to compile GLSL shaders to SPIR-V

use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: &[&str] = &[
    "shaders/triangle.vert",
    "shaders/passthrough.frag",
    "shaders/position.vert",
    "shaders/colorizer.vert",
    "shaders/colorizer.frag",
    "shaders/compose.vert",
    "shaders/compose.frag",
    "shaders/blur.comp",
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    // The binaries resolve "<name>.spv" next to the executable at runtime, so
    // the compiled shaders land in the target profile directory.
    let out = target_profile_dir();

    for shader in SHADERS {
        let input = Path::new(shader);
        let name = input.file_name().unwrap().to_str().unwrap();
        let output = out.join(format!("{name}.spv"));
        compile_shader(input, &output);
    }
}

// OUT_DIR is .../target/<profile>/build/<pkg>-<hash>/out; walk up to <profile>.
fn target_profile_dir() -> PathBuf {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    out_dir
        .ancestors()
        .nth(3)
        .expect("unexpected OUT_DIR layout")
        .to_path_buf()
}

fn compile_shader(input: &Path, output: &Path) {
    let result = Command::new("glslc").arg(input).arg("-o").arg(output).status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!(
                "failed to compile {}: exit code {:?}",
                input.display(),
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({e}), shaders not compiled");
            println!(
                "cargo:warning=compile manually: glslc {} -o {}",
                input.display(),
                output.display()
            );
        }
    }
}
