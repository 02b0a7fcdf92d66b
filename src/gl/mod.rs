//! GPU plumbing: EGL context ownership, the dedicated GL thread, shader
//! helpers and the per-format draw strategies.

pub mod context;
pub mod quad;
pub mod readback;
pub mod shader;
pub mod texture;
pub mod thread;

pub use context::{EglWindowContext, GpuContext, RenderTarget};
pub use thread::{CommandKind, GlAction, GlThread};

use std::num::NonZeroU32;

/// Texture ids travel through frame metadata as plain `u32`, with 0
/// meaning "no texture". These convert at the GL boundary.
pub fn texture_from_raw(id: u32) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id).map(glow::NativeTexture)
}

pub fn texture_to_raw(texture: glow::NativeTexture) -> u32 {
    texture.0.get()
}
