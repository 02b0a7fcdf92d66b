//! Preview surface seam between the embedder's windowing and the
//! controller.

use std::sync::Arc;

use crate::gl::RenderTarget;

/// Window-lifecycle events the controller reacts to. Implementations
/// call these from the windowing thread.
pub trait SurfaceObserver: Send + Sync {
    /// The window exists and can be rendered into.
    fn on_surface_ready(&self, target: RenderTarget, width: u32, height: u32);

    fn on_surface_resized(&self, width: u32, height: u32);

    /// The window is going away; GPU work must stop.
    fn on_surface_destroyed(&self);
}

/// The embedder's preview view. It reports lifecycle to whatever
/// observer the controller installs.
pub trait PreviewSurface {
    fn set_observer(&self, observer: Arc<dyn SurfaceObserver>);
}
