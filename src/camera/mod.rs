//! Camera controller, its lifecycle plumbing and the seams to the
//! embedding application.

pub mod controller;
pub mod effect;
pub mod handoff;
pub mod photo;
pub mod source;
pub mod surface;

pub use controller::{CameraController, FrameListenerFn, PhotoCallback};
pub use effect::{EffectOutput, EffectProcessor};
pub use handoff::{HandoffSlot, TeardownHandoff};
pub use source::{BindRequest, CameraSource, FrameSink, SurfaceProvider};
pub use surface::{PreviewSurface, SurfaceObserver};
