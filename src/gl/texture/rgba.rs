//! Draw strategy for RGBA payloads, used by overlay compositing. Alpha
//! blending is enabled only for the duration of the draw.

use glow::HasContext;
use tracing::warn;

use crate::error::GpuError;
use crate::gl::shader;
use crate::gl::texture::{create_plain_texture, DrawRequest, DrawStrategy, ProgramGear};

const FRAGMENT_SRC: &str = r#"
precision mediump float;
varying vec2 vTexCoord;
uniform sampler2D uTexture;
void main() {
    gl_FragColor = texture2D(uTexture, vTexCoord);
}
"#;

pub struct RgbaTexture {
    gear: Option<ProgramGear>,
    u_texture: Option<glow::NativeUniformLocation>,
    texture: Option<glow::NativeTexture>,
}

impl RgbaTexture {
    pub fn new() -> Self {
        Self {
            gear: None,
            u_texture: None,
            texture: None,
        }
    }

    unsafe fn ensure(&mut self, gl: &glow::Context) -> Result<(), GpuError> {
        if self.gear.is_none() {
            let gear = ProgramGear::build(gl, FRAGMENT_SRC, "rgba");
            self.u_texture = gear
                .program
                .and_then(|p| shader::uniform_location(gl, p, "uTexture", "rgba"));
            self.gear = Some(gear);
        }
        if self.texture.is_none() {
            self.texture = Some(create_plain_texture(gl, "rgba")?);
        }
        Ok(())
    }
}

impl DrawStrategy for RgbaTexture {
    unsafe fn draw(&mut self, gl: &glow::Context, req: &DrawRequest<'_>) -> Result<(), GpuError> {
        let Some(data) = req.data else {
            return Ok(());
        };
        let expected = req.width as usize * req.height as usize * 4;
        if data.len() < expected {
            warn!(
                len = data.len(),
                expected, "payload too short for RGBA, skipping draw"
            );
            return Ok(());
        }
        self.ensure(gl)?;

        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, self.texture);
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA as i32,
            req.width as i32,
            req.height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            Some(&data[..expected]),
        );

        gl.enable(glow::BLEND);
        gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);

        let u_texture = self.u_texture.clone();
        let gear = self.gear.as_ref().unwrap();
        gear.run(gl, &req.mvp, |gl, _| {
            gl.uniform_1_i32(u_texture.as_ref(), 0);
        });

        gl.disable(glow::BLEND);
        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(())
    }

    unsafe fn destroy(&mut self, gl: &glow::Context) {
        if let Some(mut gear) = self.gear.take() {
            gear.destroy(gl);
        }
        if let Some(t) = self.texture.take() {
            gl.delete_texture(t);
        }
        self.u_texture = None;
    }
}

impl Default for RgbaTexture {
    fn default() -> Self {
        Self::new()
    }
}
