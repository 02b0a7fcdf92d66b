//! Draw strategy for CPU packed-YUV payloads.
//!
//! Two textures per frame: the luma plane as LUMINANCE at full size, the
//! interleaved VU plane as LUMINANCE_ALPHA at quarter size. The YUV to
//! RGB conversion happens in the fragment shader.

use glow::HasContext;
use tracing::warn;

use crate::error::GpuError;
use crate::gl::shader;
use crate::gl::texture::{create_plain_texture, DrawRequest, DrawStrategy, ProgramGear};

const FRAGMENT_SRC: &str = r#"
precision mediump float;
varying vec2 vTexCoord;
uniform sampler2D uLuma;
uniform sampler2D uChroma;
void main() {
    float y = texture2D(uLuma, vTexCoord).r;
    vec4 chroma = texture2D(uChroma, vTexCoord);
    float v = chroma.r - 0.5;
    float u = chroma.a - 0.5;
    gl_FragColor = vec4(
        y + 1.370705 * v,
        y - 0.337633 * u - 0.698001 * v,
        y + 1.732446 * u,
        1.0
    );
}
"#;

pub struct PackedYuvTexture {
    gear: Option<ProgramGear>,
    u_luma: Option<glow::NativeUniformLocation>,
    u_chroma: Option<glow::NativeUniformLocation>,
    luma: Option<glow::NativeTexture>,
    chroma: Option<glow::NativeTexture>,
}

impl PackedYuvTexture {
    pub fn new() -> Self {
        Self {
            gear: None,
            u_luma: None,
            u_chroma: None,
            luma: None,
            chroma: None,
        }
    }

    unsafe fn ensure(&mut self, gl: &glow::Context) -> Result<(), GpuError> {
        if self.gear.is_none() {
            let gear = ProgramGear::build(gl, FRAGMENT_SRC, "packed-yuv");
            if let Some(p) = gear.program {
                self.u_luma = shader::uniform_location(gl, p, "uLuma", "packed-yuv");
                self.u_chroma = shader::uniform_location(gl, p, "uChroma", "packed-yuv");
            }
            self.gear = Some(gear);
        }
        if self.luma.is_none() {
            self.luma = Some(create_plain_texture(gl, "luma")?);
        }
        if self.chroma.is_none() {
            self.chroma = Some(create_plain_texture(gl, "chroma")?);
        }
        Ok(())
    }
}

impl DrawStrategy for PackedYuvTexture {
    unsafe fn draw(&mut self, gl: &glow::Context, req: &DrawRequest<'_>) -> Result<(), GpuError> {
        let Some(data) = req.data else {
            return Ok(());
        };
        let (w, h) = (req.width as usize, req.height as usize);
        let luma_len = w * h;
        let expected = luma_len * 3 / 2;
        if data.len() < expected {
            warn!(
                len = data.len(),
                expected, "payload too short for packed YUV, skipping draw"
            );
            return Ok(());
        }
        self.ensure(gl)?;

        // Plane rows are tightly packed, including odd widths.
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);

        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, self.luma);
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::LUMINANCE as i32,
            req.width as i32,
            req.height as i32,
            0,
            glow::LUMINANCE,
            glow::UNSIGNED_BYTE,
            Some(&data[..luma_len]),
        );

        gl.active_texture(glow::TEXTURE1);
        gl.bind_texture(glow::TEXTURE_2D, self.chroma);
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::LUMINANCE_ALPHA as i32,
            (req.width / 2) as i32,
            (req.height / 2) as i32,
            0,
            glow::LUMINANCE_ALPHA,
            glow::UNSIGNED_BYTE,
            Some(&data[luma_len..expected]),
        );

        let (u_luma, u_chroma) = (self.u_luma.clone(), self.u_chroma.clone());
        let gear = self.gear.as_ref().unwrap();
        gear.run(gl, &req.mvp, |gl, _| {
            gl.uniform_1_i32(u_luma.as_ref(), 0);
            gl.uniform_1_i32(u_chroma.as_ref(), 1);
        });

        gl.active_texture(glow::TEXTURE1);
        gl.bind_texture(glow::TEXTURE_2D, None);
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(())
    }

    unsafe fn destroy(&mut self, gl: &glow::Context) {
        if let Some(mut gear) = self.gear.take() {
            gear.destroy(gl);
        }
        if let Some(t) = self.luma.take() {
            gl.delete_texture(t);
        }
        if let Some(t) = self.chroma.take() {
            gl.delete_texture(t);
        }
        self.u_luma = None;
        self.u_chroma = None;
    }
}

impl Default for PackedYuvTexture {
    fn default() -> Self {
        Self::new()
    }
}
