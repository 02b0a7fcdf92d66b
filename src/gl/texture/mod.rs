//! Per-pixel-format draw strategies.
//!
//! Each strategy owns its program and texture objects and is created
//! lazily on the GL thread at first use. The registry keeps one instance
//! per format so the render loop never allocates.

pub mod external;
pub mod packed_yuv;
pub mod plain;
pub mod rgba;

use glam::Mat4;
use glow::HasContext;

use crate::error::GpuError;
use crate::gl::quad::Quad;
use crate::gl::shader;

pub use external::ExternalTexture;
pub use packed_yuv::PackedYuvTexture;
pub use plain::Plain2dTexture;
pub use rgba::RgbaTexture;

/// `GL_TEXTURE_EXTERNAL_OES`; glow has no constant for the extension.
pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

/// One draw call's worth of input.
pub struct DrawRequest<'a> {
    pub width: u32,
    pub height: u32,
    /// CPU payload for upload-based strategies; `None` for texture-backed
    /// frames.
    pub data: Option<&'a [u8]>,
    /// Raw GL texture name for texture-backed strategies; 0 when absent.
    pub texture: u32,
    pub mvp: Mat4,
}

pub trait DrawStrategy: Send {
    /// Draw into the currently bound framebuffer.
    unsafe fn draw(&mut self, gl: &glow::Context, req: &DrawRequest<'_>) -> Result<(), GpuError>;

    /// Render into an offscreen target and read the RGBA result back.
    unsafe fn draw_offscreen(
        &mut self,
        gl: &glow::Context,
        req: &DrawRequest<'_>,
        out: &mut [u8],
    ) -> Result<(), GpuError> {
        let _ = (gl, req, out);
        Err(GpuError::Unsupported("offscreen draw"))
    }

    unsafe fn destroy(&mut self, gl: &glow::Context);
}

pub(crate) const VERTEX_SRC: &str = r#"
attribute vec4 aPosition;
attribute vec2 aTexCoord;
uniform mat4 uMvp;
varying vec2 vTexCoord;
void main() {
    gl_Position = uMvp * aPosition;
    vTexCoord = aTexCoord;
}
"#;

/// Program, its standard locations and the shared quad. A gear whose
/// program failed to build draws nothing, on purpose.
pub(crate) struct ProgramGear {
    pub program: Option<glow::NativeProgram>,
    pub quad: Option<Quad>,
    pub a_position: Option<u32>,
    pub a_tex_coord: Option<u32>,
    pub u_mvp: Option<glow::NativeUniformLocation>,
}

impl ProgramGear {
    pub unsafe fn build(gl: &glow::Context, fragment_src: &str, tag: &'static str) -> Self {
        let program = shader::build_program(gl, VERTEX_SRC, fragment_src, tag);
        let quad = match Quad::create(gl) {
            Ok(q) => Some(q),
            Err(e) => {
                tracing::error!(tag, "quad creation failed: {e}");
                None
            }
        };
        let (a_position, a_tex_coord, u_mvp) = match program {
            Some(p) => (
                shader::attrib_location(gl, p, "aPosition", tag),
                shader::attrib_location(gl, p, "aTexCoord", tag),
                shader::uniform_location(gl, p, "uMvp", tag),
            ),
            None => (None, None, None),
        };
        Self {
            program,
            quad,
            a_position,
            a_tex_coord,
            u_mvp,
        }
    }

    /// Bind the program and MVP, run `bind_inputs`, then draw the quad.
    /// No-op when the program or quad is missing.
    pub unsafe fn run(
        &self,
        gl: &glow::Context,
        mvp: &Mat4,
        bind_inputs: impl FnOnce(&glow::Context, glow::NativeProgram),
    ) {
        let (Some(program), Some(quad)) = (self.program, self.quad.as_ref()) else {
            return;
        };
        gl.use_program(Some(program));
        gl.uniform_matrix_4_f32_slice(self.u_mvp.as_ref(), false, &mvp.to_cols_array());
        bind_inputs(gl, program);
        quad.draw(gl, self.a_position, self.a_tex_coord);
        gl.use_program(None);
    }

    pub unsafe fn destroy(&mut self, gl: &glow::Context) {
        if let Some(p) = self.program.take() {
            gl.delete_program(p);
        }
        if let Some(q) = self.quad.take() {
            q.destroy(gl);
        }
    }
}

/// All strategies, one instance each.
pub struct StrategyRegistry {
    pub external: ExternalTexture,
    pub packed_yuv: PackedYuvTexture,
    pub rgba: RgbaTexture,
    pub plain: Plain2dTexture,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            external: ExternalTexture::new(),
            packed_yuv: PackedYuvTexture::new(),
            rgba: RgbaTexture::new(),
            plain: Plain2dTexture::new(),
        }
    }

    pub unsafe fn destroy(&mut self, gl: &glow::Context) {
        self.external.destroy(gl);
        self.packed_yuv.destroy(gl);
        self.rgba.destroy(gl);
        self.plain.destroy(gl);
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate a 2-D texture with the sampling parameters every strategy
/// uses.
pub(crate) unsafe fn create_plain_texture(
    gl: &glow::Context,
    tag: &'static str,
) -> Result<glow::NativeTexture, GpuError> {
    let tex = gl
        .create_texture()
        .map_err(|e| GpuError::Create(format!("{tag} texture: {e}")))?;
    gl.bind_texture(glow::TEXTURE_2D, Some(tex));
    set_default_params(gl, glow::TEXTURE_2D);
    gl.bind_texture(glow::TEXTURE_2D, None);
    Ok(tex)
}

pub(crate) unsafe fn set_default_params(gl: &glow::Context, target: u32) {
    gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
    gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
}
