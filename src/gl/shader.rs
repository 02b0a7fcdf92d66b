//! Shader compile/link helpers.
//!
//! A program that fails to build is `None`, and every draw treats `None`
//! as a no-op. A broken shader therefore blanks its strategy instead of
//! killing the preview.

use glow::HasContext;
use tracing::{error, warn};

/// Compile and link a program. Returns `None` on any failure, with the
/// driver's info log reported.
pub unsafe fn build_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
    tag: &'static str,
) -> Option<glow::NativeProgram> {
    let vertex = compile_shader(gl, glow::VERTEX_SHADER, vertex_src, tag)?;
    let fragment = match compile_shader(gl, glow::FRAGMENT_SHADER, fragment_src, tag) {
        Some(s) => s,
        None => {
            gl.delete_shader(vertex);
            return None;
        }
    };

    let program = match gl.create_program() {
        Ok(p) => p,
        Err(e) => {
            error!(tag, "create_program failed: {e}");
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
            return None;
        }
    };
    gl.attach_shader(program, vertex);
    gl.attach_shader(program, fragment);
    gl.link_program(program);

    gl.detach_shader(program, vertex);
    gl.detach_shader(program, fragment);
    gl.delete_shader(vertex);
    gl.delete_shader(fragment);

    if !gl.get_program_link_status(program) {
        error!(tag, "link failed: {}", gl.get_program_info_log(program));
        gl.delete_program(program);
        return None;
    }
    Some(program)
}

unsafe fn compile_shader(
    gl: &glow::Context,
    kind: u32,
    src: &str,
    tag: &'static str,
) -> Option<glow::NativeShader> {
    let shader = match gl.create_shader(kind) {
        Ok(s) => s,
        Err(e) => {
            error!(tag, "create_shader failed: {e}");
            return None;
        }
    };
    gl.shader_source(shader, src);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        error!(
            tag,
            kind,
            "compile failed: {}",
            gl.get_shader_info_log(shader)
        );
        gl.delete_shader(shader);
        return None;
    }
    Some(shader)
}

/// Attribute lookup that logs a miss instead of failing; a draw with a
/// missing location silently skips that attribute, like the rest of the
/// degraded-shader path.
pub unsafe fn attrib_location(
    gl: &glow::Context,
    program: glow::NativeProgram,
    name: &str,
    tag: &'static str,
) -> Option<u32> {
    let loc = gl.get_attrib_location(program, name);
    if loc.is_none() {
        warn!(tag, name, "attribute not found in program");
    }
    loc
}

pub unsafe fn uniform_location(
    gl: &glow::Context,
    program: glow::NativeProgram,
    name: &str,
    tag: &'static str,
) -> Option<glow::NativeUniformLocation> {
    let loc = gl.get_uniform_location(program, name);
    if loc.is_none() {
        warn!(tag, name, "uniform not found in program");
    }
    loc
}
