//! Read an already-rendered 2-D texture back into an RGBA buffer.

use glow::HasContext;

use crate::error::GpuError;

/// Attach `texture` to a throwaway framebuffer and read a centered crop
/// window out of it.
///
/// The texture holds the unrotated image, so for 90/270 degree content
/// the crop window is transposed into texture space; the returned buffer
/// then has `crop_h` x `crop_w` pixels and the caller reports swapped
/// dimensions.
pub unsafe fn read_texture(
    gl: &glow::Context,
    texture: glow::NativeTexture,
    tex_w: u32,
    tex_h: u32,
    crop_w: u32,
    crop_h: u32,
    rotation: u32,
) -> Result<Vec<u8>, GpuError> {
    let (win_w, win_h) = if rotation == 90 || rotation == 270 {
        (crop_h.min(tex_w), crop_w.min(tex_h))
    } else {
        (crop_w.min(tex_w), crop_h.min(tex_h))
    };
    let pad_x = (tex_w - win_w) / 2;
    let pad_y = (tex_h - win_h) / 2;

    let fbo = gl
        .create_framebuffer()
        .map_err(|e| GpuError::Create(format!("readback fbo: {e}")))?;
    gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
    gl.framebuffer_texture_2d(
        glow::FRAMEBUFFER,
        glow::COLOR_ATTACHMENT0,
        glow::TEXTURE_2D,
        Some(texture),
        0,
    );
    let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
    if status != glow::FRAMEBUFFER_COMPLETE {
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        gl.delete_framebuffer(fbo);
        return Err(GpuError::IncompleteFramebuffer(status));
    }

    let mut out = vec![0u8; win_w as usize * win_h as usize * 4];
    gl.read_pixels(
        pad_x as i32,
        pad_y as i32,
        win_w as i32,
        win_h as i32,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        glow::PixelPackData::Slice(&mut out),
    );

    gl.bind_framebuffer(glow::FRAMEBUFFER, None);
    gl.delete_framebuffer(fbo);
    Ok(out)
}
