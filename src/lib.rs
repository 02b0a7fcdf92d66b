//! Real-time camera preview and capture pipeline.
//!
//! A camera backend pushes raw frames into a [`frame::FrameDispatcher`],
//! which normalizes them to packed YUV and fans them out to consumers.
//! The [`render::FrameRenderer`] owns a dedicated GL thread and uploads
//! or redirects each frame to the preview surface; snapshots are read
//! back from the current texture and persisted as JPEG with an EXIF
//! orientation tag. [`camera::CameraController`] ties the pieces
//! together behind a lifecycle state machine.

pub mod camera;
#[cfg(target_os = "linux")]
pub mod capture;
pub mod convert;
pub mod error;
pub mod frame;
pub mod gl;
pub mod render;

use serde::{Deserialize, Serialize};

pub use camera::{CameraController, HandoffSlot, PreviewSurface, SurfaceObserver};
pub use frame::{Facing, Frame, FrameDispatcher, FrameMeta, PixelFormat};

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capture resolution requested from the camera backend.
    pub image_width: u32,
    pub image_height: u32,
    /// Camera to prefer when binding.
    pub facing: Facing,
    /// How long a starting session waits for the previous session's
    /// GL teardown to finish.
    pub handoff_wait_ms: u64,
    /// Tick rate of the overlay clock in overlay-only mode.
    pub overlay_fps: u32,
    /// Bind the camera as soon as the surface is ready.
    pub auto_start: bool,
    /// Run without a camera, rendering only the stored overlay.
    pub overlay_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: 720,
            image_height: 1280,
            facing: Facing::Front,
            handoff_wait_ms: 3000,
            overlay_fps: 25,
            auto_start: true,
            overlay_only: false,
        }
    }
}

/// Route crate logs through the test harness. Safe to call from every
/// test; only the first call installs the subscriber.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
