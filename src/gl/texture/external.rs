//! Draw strategy for external (camera-owned) textures.
//!
//! The camera writes straight into a `GL_TEXTURE_EXTERNAL_OES` texture;
//! the payload in the frame is ignored here. The offscreen variant is the
//! snapshot path for preview sessions.

use glow::HasContext;
use tracing::error;

use crate::error::GpuError;
use crate::gl::texture::{
    create_plain_texture, set_default_params, DrawRequest, DrawStrategy, ProgramGear,
    TEXTURE_EXTERNAL_OES,
};
use crate::gl::{texture_from_raw, shader};

const FRAGMENT_SRC: &str = r#"
#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 vTexCoord;
uniform samplerExternalOES uTexture;
void main() {
    gl_FragColor = texture2D(uTexture, vTexCoord);
}
"#;

struct Offscreen {
    fbo: glow::NativeFramebuffer,
    color: glow::NativeTexture,
    width: u32,
    height: u32,
}

pub struct ExternalTexture {
    gear: Option<ProgramGear>,
    u_texture: Option<glow::NativeUniformLocation>,
    offscreen: Option<Offscreen>,
}

impl ExternalTexture {
    pub fn new() -> Self {
        Self {
            gear: None,
            u_texture: None,
            offscreen: None,
        }
    }

    unsafe fn gear(&mut self, gl: &glow::Context) -> &ProgramGear {
        if self.gear.is_none() {
            let gear = ProgramGear::build(gl, FRAGMENT_SRC, "external");
            self.u_texture = gear
                .program
                .and_then(|p| shader::uniform_location(gl, p, "uTexture", "external"));
            self.gear = Some(gear);
        }
        self.gear.as_ref().unwrap()
    }

    unsafe fn ensure_offscreen(
        &mut self,
        gl: &glow::Context,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError> {
        if let Some(off) = &self.offscreen {
            if off.width == width && off.height == height {
                return Ok(());
            }
            gl.delete_framebuffer(off.fbo);
            gl.delete_texture(off.color);
            self.offscreen = None;
        }

        let color = create_plain_texture(gl, "external-offscreen")?;
        gl.bind_texture(glow::TEXTURE_2D, Some(color));
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA as i32,
            width as i32,
            height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            None,
        );
        gl.bind_texture(glow::TEXTURE_2D, None);

        let fbo = gl
            .create_framebuffer()
            .map_err(|e| GpuError::Create(format!("offscreen fbo: {e}")))?;
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
        gl.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            glow::TEXTURE_2D,
            Some(color),
            0,
        );
        let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        if status != glow::FRAMEBUFFER_COMPLETE {
            gl.delete_framebuffer(fbo);
            gl.delete_texture(color);
            return Err(GpuError::IncompleteFramebuffer(status));
        }

        self.offscreen = Some(Offscreen {
            fbo,
            color,
            width,
            height,
        });
        Ok(())
    }
}

impl DrawStrategy for ExternalTexture {
    unsafe fn draw(&mut self, gl: &glow::Context, req: &DrawRequest<'_>) -> Result<(), GpuError> {
        let Some(texture) = texture_from_raw(req.texture) else {
            return Ok(());
        };
        self.gear(gl);
        let u_texture = self.u_texture.clone();
        let gear = self.gear.as_ref().unwrap();
        gear.run(gl, &req.mvp, |gl, _| {
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(TEXTURE_EXTERNAL_OES, Some(texture));
            set_default_params(gl, TEXTURE_EXTERNAL_OES);
            gl.uniform_1_i32(u_texture.as_ref(), 0);
        });
        gl.bind_texture(TEXTURE_EXTERNAL_OES, None);
        Ok(())
    }

    unsafe fn draw_offscreen(
        &mut self,
        gl: &glow::Context,
        req: &DrawRequest<'_>,
        out: &mut [u8],
    ) -> Result<(), GpuError> {
        let expected = req.width as usize * req.height as usize * 4;
        if out.len() != expected {
            return Err(GpuError::Create(format!(
                "readback buffer is {} bytes, expected {expected}",
                out.len()
            )));
        }
        self.ensure_offscreen(gl, req.width, req.height)?;
        let fbo = self.offscreen.as_ref().map(|o| o.fbo);

        gl.bind_framebuffer(glow::FRAMEBUFFER, fbo);
        gl.viewport(0, 0, req.width as i32, req.height as i32);
        gl.clear_color(0.0, 0.0, 0.0, 1.0);
        gl.clear(glow::COLOR_BUFFER_BIT);

        let result = self.draw(gl, req);
        if let Err(e) = &result {
            error!("offscreen draw failed: {e}");
        }
        gl.read_pixels(
            0,
            0,
            req.width as i32,
            req.height as i32,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            glow::PixelPackData::Slice(out),
        );
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        result
    }

    unsafe fn destroy(&mut self, gl: &glow::Context) {
        if let Some(mut gear) = self.gear.take() {
            gear.destroy(gl);
        }
        if let Some(off) = self.offscreen.take() {
            gl.delete_framebuffer(off.fbo);
            gl.delete_texture(off.color);
        }
        self.u_texture = None;
    }
}

impl Default for ExternalTexture {
    fn default() -> Self {
        Self::new()
    }
}
