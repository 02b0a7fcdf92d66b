//! Typed errors, one enum per failure domain.

use thiserror::Error;

/// GPU context and GL object failures.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("EGL loader unavailable: {0}")]
    Loader(String),

    #[error("EGL call failed: {0}")]
    Egl(#[from] khronos_egl::Error),

    #[error("no EGL config matches the requested attributes")]
    NoConfig,

    #[error("GL object creation failed: {0}")]
    Create(String),

    #[error("offscreen framebuffer incomplete (status {0:#x})")]
    IncompleteFramebuffer(u32),

    #[error("operation not supported by this draw strategy: {0}")]
    Unsupported(&'static str),

    #[error("GL thread failed to start: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Pixel layout normalization failures. These are fatal for the
/// delivering session: the same device keeps producing the same layout.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
}

/// Camera backend failures.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("camera device unavailable: {0}")]
    Device(String),

    #[error("device does not support video capture")]
    NotACaptureDevice,

    #[error("capture format not supported: {0}")]
    Format(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Snapshot encoding and persistence failures.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("readback buffer does not match reported dimensions")]
    BadBuffer,

    #[error("JPEG encode failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
