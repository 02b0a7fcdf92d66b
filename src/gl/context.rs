//! GPU context ownership.
//!
//! [`GpuContext`] is the seam between the GL thread and the windowing
//! system: the thread only ever needs "make current", "present" and a
//! `glow` handle. Production uses [`EglWindowContext`]; tests substitute
//! a stub so the thread machinery runs without a GPU.

use std::ffi::c_void;

use khronos_egl as egl;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, warn};

use crate::error::GpuError;

type Egl = egl::DynamicInstance<egl::EGL1_4>;

/// Raw handles of the window the preview composites into. The embedder
/// guarantees they outlive the controller session that received them.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

// The handles are only dereferenced by EGL on the GL thread.
unsafe impl Send for RenderTarget {}

/// Everything the GL thread needs from a context.
pub trait GpuContext: Send {
    fn make_current(&mut self) -> Result<(), GpuError>;
    fn present(&mut self) -> Result<(), GpuError>;
    /// GL function table. `None` when the context has no usable API,
    /// which callers must treat as "skip the GL work".
    fn api(&mut self) -> Option<&glow::Context>;
    /// Release context, surface and display. Must be idempotent.
    fn destroy(&mut self);
}

/// EGL window-surface context over dynamically loaded libEGL.
pub struct EglWindowContext {
    egl: Egl,
    display: egl::Display,
    context: egl::Context,
    surface: egl::Surface,
    gl: Option<glow::Context>,
    destroyed: bool,
}

// EGL objects are created here and used exclusively on the GL thread
// afterwards; EGL permits binding a context on a different thread than
// the one that created it.
unsafe impl Send for EglWindowContext {}

impl EglWindowContext {
    /// Initialize EGL against the target window with an ES2-class config.
    /// Failure here is fatal for the session.
    pub fn new(target: RenderTarget) -> Result<Self, GpuError> {
        let egl = unsafe { Egl::load_required() }
            .map_err(|e| GpuError::Loader(e.to_string()))?;

        let display = unsafe { egl.get_display(native_display(target.display)) }
            .ok_or_else(|| GpuError::Create("no EGL display for target".into()))?;
        let (major, minor) = egl.initialize(display)?;
        debug!(major, minor, "EGL initialized");

        #[rustfmt::skip]
        let attrs = [
            egl::SURFACE_TYPE, egl::WINDOW_BIT,
            egl::RENDERABLE_TYPE, egl::OPENGL_ES2_BIT,
            egl::RED_SIZE, 8,
            egl::GREEN_SIZE, 8,
            egl::BLUE_SIZE, 8,
            egl::ALPHA_SIZE, 8,
            egl::NONE,
        ];
        let config = egl
            .choose_first_config(display, &attrs)?
            .ok_or(GpuError::NoConfig)?;

        let context = egl.create_context(
            display,
            config,
            None,
            &[egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE],
        )?;

        let window = native_window(target.window)?;
        let surface = unsafe { egl.create_window_surface(display, config, window, None) }?;

        Ok(Self {
            egl,
            display,
            context,
            surface,
            gl: None,
            destroyed: false,
        })
    }
}

impl GpuContext for EglWindowContext {
    fn make_current(&mut self) -> Result<(), GpuError> {
        self.egl
            .make_current(
                self.display,
                Some(self.surface),
                Some(self.surface),
                Some(self.context),
            )
            .map_err(Into::into)
    }

    fn present(&mut self) -> Result<(), GpuError> {
        self.egl
            .swap_buffers(self.display, self.surface)
            .map_err(Into::into)
    }

    fn api(&mut self) -> Option<&glow::Context> {
        if self.destroyed {
            return None;
        }
        if self.gl.is_none() {
            let egl = &self.egl;
            let gl = unsafe {
                glow::Context::from_loader_function(|name| {
                    egl.get_proc_address(name)
                        .map_or(std::ptr::null(), |f| f as *const c_void)
                })
            };
            self.gl = Some(gl);
        }
        self.gl.as_ref()
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.gl = None;

        if let Err(e) = self.egl.make_current(self.display, None, None, None) {
            warn!("failed to unbind EGL context: {e}");
        }
        if let Err(e) = self.egl.destroy_surface(self.display, self.surface) {
            warn!("failed to destroy EGL surface: {e}");
        }
        if let Err(e) = self.egl.destroy_context(self.display, self.context) {
            warn!("failed to destroy EGL context: {e}");
        }
        if let Err(e) = self.egl.terminate(self.display) {
            warn!("failed to terminate EGL display: {e}");
        }
        debug!("EGL context destroyed");
    }
}

impl Drop for EglWindowContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn native_display(handle: RawDisplayHandle) -> egl::NativeDisplayType {
    match handle {
        RawDisplayHandle::Wayland(h) => h.display.as_ptr(),
        RawDisplayHandle::Xlib(h) => h
            .display
            .map_or(egl::DEFAULT_DISPLAY, |d| d.as_ptr()),
        _ => egl::DEFAULT_DISPLAY,
    }
}

fn native_window(handle: RawWindowHandle) -> Result<egl::NativeWindowType, GpuError> {
    match handle {
        RawWindowHandle::Wayland(h) => Ok(h.surface.as_ptr()),
        RawWindowHandle::Xlib(h) => Ok(h.window as egl::NativeWindowType),
        RawWindowHandle::AndroidNdk(h) => Ok(h.a_native_window.as_ptr()),
        other => Err(GpuError::Create(format!(
            "unsupported window handle: {other:?}"
        ))),
    }
}
