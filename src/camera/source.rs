//! Camera backend seam.

use crate::error::SourceError;
use crate::frame::{Facing, RawImage};

/// Delivers raw camera buffers. Called on the source's own thread; the
/// buffer is only valid for the duration of the call.
pub type FrameSink = Box<dyn FnMut(RawImage<'_>) + Send>;

/// Called at most once, from any thread except the GL thread, when the
/// source wants to render through an external texture. Blocks until the
/// texture exists and returns its name, or `None` when rendering must
/// stay CPU-side.
pub type SurfaceProvider = Box<dyn FnOnce() -> Option<u32> + Send>;

pub struct BindRequest {
    pub facing: Facing,
    /// Logical capture size (width, height).
    pub image_size: (u32, u32),
    pub frames: FrameSink,
    /// Present when the session has a preview surface the source may
    /// attach to. Sources without external-texture support drop it.
    pub surface_provider: Option<SurfaceProvider>,
}

/// A camera backend. Implementations own their delivery threads.
pub trait CameraSource: Send + Sync {
    /// Invoke `ready` once the backing device is available. The callback
    /// may fire on any thread, including the calling one.
    fn subscribe_ready(&self, ready: Box<dyn FnOnce() + Send>);

    /// Attach the use-cases and start delivering frames. Replaces any
    /// previous binding.
    fn bind(&self, request: BindRequest) -> Result<(), SourceError>;

    /// Stop delivering frames and detach everything.
    fn unbind_all(&self);

    /// Keep the binding but stop forwarding frames.
    fn pause(&self);

    fn resume(&self);
}
