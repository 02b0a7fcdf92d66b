//! External effect engine seam. The engine itself is out of scope; the
//! pipeline only routes frames through it and composites its output.

use crate::frame::Frame;

/// Texture the effect rendered the frame into.
#[derive(Debug, Clone, Copy)]
pub struct EffectOutput {
    pub texture: u32,
    pub is_external: bool,
}

/// Implemented by the embedding application's effect engine. `render` is
/// called on the GL thread with the current context bound.
pub trait EffectProcessor: Send + Sync {
    /// Process one frame. Returning an output redirects compositing to
    /// that texture; `None` leaves the frame untouched.
    fn render(&self, frame: &Frame, input_texture: u32) -> Option<EffectOutput>;

    /// GL context is going away; drop context-bound resources.
    fn reset(&self);

    /// Final disposal.
    fn release(&self);
}
