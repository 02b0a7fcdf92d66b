//! Frame types shared across the pipeline.

pub mod dispatcher;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use dispatcher::FrameDispatcher;

/// Which way the camera looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Front,
    Back,
}

/// Pixel formats a dispatched frame can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar luma followed by interleaved VU chroma at quarter resolution.
    PackedYuv,
    Rgba,
}

/// Frame data with zero-copy semantics.
///
/// The payload is owned and immutable, so a `Frame` can be cloned and
/// handed to any number of consumers after the camera has already reused
/// its delivery buffer.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMeta>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMeta {
    /// Strictly increasing per dispatcher instance, starting at 0.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Clockwise correction in degrees: 0, 90, 180 or 270.
    pub rotation: u32,
    pub facing: Facing,
    pub format: PixelFormat,
    /// GL texture name the preview renders through; 0 when the frame is
    /// payload-only.
    pub texture: u32,
    /// The texture above is an external (camera-owned) texture.
    pub is_external: bool,
    /// Synthesized from the installed overlay instead of a camera buffer.
    pub is_overlay: bool,
}

/// Borrowed view of a camera delivery buffer. Valid only for the duration
/// of the callback; anything that outlives it must copy.
pub struct RawImage<'a> {
    pub width: u32,
    pub height: u32,
    pub rotation: u32,
    pub facing: Facing,
    pub layout: RawLayout<'a>,
}

/// Plane arrangement of a raw camera buffer.
pub enum RawLayout<'a> {
    /// Luma plane followed by interleaved chroma, already packed tight.
    SemiPlanar { data: &'a [u8] },
    /// Separate planes with per-plane strides.
    Planar {
        y: RawPlane<'a>,
        u: RawPlane<'a>,
        v: RawPlane<'a>,
    },
}

/// One plane of a planar buffer.
pub struct RawPlane<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}
