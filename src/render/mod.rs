//! Per-frame orchestration on top of the GL thread.

pub mod renderer;
pub mod transform;

pub use renderer::{
    FrameRenderer, InitLatch, Readback, ReadbackCallback, RenderDelegate, RenderOutput,
};
