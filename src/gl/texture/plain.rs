//! Draw strategy for ordinary 2-D textures, typically an effect
//! processor's output. Payload is ignored; the texture is already filled.

use glow::HasContext;

use crate::error::GpuError;
use crate::gl::texture::{DrawRequest, DrawStrategy, ProgramGear};
use crate::gl::{shader, texture_from_raw};

const FRAGMENT_SRC: &str = r#"
precision mediump float;
varying vec2 vTexCoord;
uniform sampler2D uTexture;
void main() {
    gl_FragColor = texture2D(uTexture, vTexCoord);
}
"#;

pub struct Plain2dTexture {
    gear: Option<ProgramGear>,
    u_texture: Option<glow::NativeUniformLocation>,
}

impl Plain2dTexture {
    pub fn new() -> Self {
        Self {
            gear: None,
            u_texture: None,
        }
    }
}

impl DrawStrategy for Plain2dTexture {
    unsafe fn draw(&mut self, gl: &glow::Context, req: &DrawRequest<'_>) -> Result<(), GpuError> {
        let Some(texture) = texture_from_raw(req.texture) else {
            return Ok(());
        };
        if self.gear.is_none() {
            let gear = ProgramGear::build(gl, FRAGMENT_SRC, "plain-2d");
            self.u_texture = gear
                .program
                .and_then(|p| shader::uniform_location(gl, p, "uTexture", "plain-2d"));
            self.gear = Some(gear);
        }

        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));

        let u_texture = self.u_texture.clone();
        let gear = self.gear.as_ref().unwrap();
        gear.run(gl, &req.mvp, |gl, _| {
            gl.uniform_1_i32(u_texture.as_ref(), 0);
        });

        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(())
    }

    unsafe fn destroy(&mut self, gl: &glow::Context) {
        if let Some(mut gear) = self.gear.take() {
            gear.destroy(gl);
        }
        self.u_texture = None;
    }
}

impl Default for Plain2dTexture {
    fn default() -> Self {
        Self::new()
    }
}
