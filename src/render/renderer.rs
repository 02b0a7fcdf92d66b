//! Frame renderer: routes dispatched frames onto the GL thread, keeps the
//! composited state needed for snapshots, and owns the GL thread's
//! lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::Duration;

use glam::Mat4;
use glow::HasContext;
use tracing::{debug, error, trace, warn};

use crate::convert;
use crate::error::GpuError;
use crate::frame::{Facing, Frame, PixelFormat};
use crate::gl::readback;
use crate::gl::texture::{
    set_default_params, DrawRequest, DrawStrategy, StrategyRegistry, TEXTURE_EXTERNAL_OES,
};
use crate::gl::{texture_from_raw, texture_to_raw, CommandKind, GlThread, GpuContext};
use crate::render::transform;

/// Redirects rendering to a different texture, typically an effect
/// processor's output.
#[derive(Debug, Clone, Copy)]
pub struct RenderOutput {
    pub texture: u32,
    pub is_external: bool,
}

/// Hooks the controller installs around the render loop. Called on the
/// GL thread; implementations must not block on it.
pub trait RenderDelegate: Send + Sync {
    /// The external input texture exists; camera preview can attach.
    fn on_texture_created(&self, texture: u32) {
        let _ = texture;
    }

    /// Runs before each frame is drawn. Returning an output redirects the
    /// draw to that texture.
    fn on_pre_render(&self, frame: &Frame) -> Option<RenderOutput> {
        let _ = frame;
        None
    }
}

/// A snapshot read back from the GPU. `width`/`height` describe `data`
/// as the caller should interpret it (already swapped for rotated
/// content).
pub struct Readback {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Remaining rotation the consumer must apply; 0 when it was baked in.
    pub rotation: u32,
    pub facing: Facing,
}

pub type ReadbackCallback = Box<dyn FnOnce(Option<Readback>) + Send>;

/// One-shot latch the surface provider blocks on until the external
/// input texture exists.
pub struct InitLatch {
    slot: Mutex<Option<u32>>,
    cond: Condvar,
}

impl InitLatch {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// First set wins; later calls are ignored.
    pub fn set(&self, texture: u32) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            *slot = Some(texture);
            self.cond.notify_all();
        }
    }

    pub fn wait(&self, timeout: Duration) -> Option<u32> {
        let slot = self.slot.lock().unwrap();
        let (slot, _) = self
            .cond
            .wait_timeout_while(slot, timeout, |s| s.is_none())
            .unwrap();
        *slot
    }
}

impl Default for InitLatch {
    fn default() -> Self {
        Self::new()
    }
}

struct RenderState {
    strategies: StrategyRegistry,
    input_texture: u32,
    base_mvp: Mat4,
    view_w: u32,
    view_h: u32,
    image_w: u32,
    image_h: u32,
    rendered_texture: u32,
    rendered_external: bool,
    last_rotation: u32,
    last_facing: Facing,
    has_rendered: bool,
}

pub struct FrameRenderer {
    state: Arc<Mutex<RenderState>>,
    delegate: Arc<Mutex<Option<Arc<dyn RenderDelegate>>>>,
    thread: OnceLock<GlThread>,
    started: AtomicBool,
    destroyed: Arc<AtomicBool>,
    latch: Arc<InitLatch>,
}

impl FrameRenderer {
    /// `image_w`/`image_h` is the logical camera image size the
    /// center-crop projection is computed against.
    pub fn new(image_w: u32, image_h: u32, delegate: Arc<dyn RenderDelegate>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RenderState {
                strategies: StrategyRegistry::new(),
                input_texture: 0,
                base_mvp: Mat4::IDENTITY,
                view_w: 0,
                view_h: 0,
                image_w,
                image_h,
                rendered_texture: 0,
                rendered_external: false,
                last_rotation: 0,
                last_facing: Facing::Back,
                has_rendered: false,
            })),
            delegate: Arc::new(Mutex::new(Some(delegate))),
            thread: OnceLock::new(),
            started: AtomicBool::new(false),
            destroyed: Arc::new(AtomicBool::new(false)),
            latch: Arc::new(InitLatch::new()),
        }
    }

    /// Spawn the GL thread and configure the surface. One-shot: a second
    /// call is ignored.
    pub fn start(
        &self,
        context: Box<dyn GpuContext>,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("renderer already started");
            return Ok(());
        }
        let thread = GlThread::spawn(context)?;

        let state = self.state.clone();
        let delegate = self.delegate.clone();
        let latch = self.latch.clone();
        thread.submit(
            CommandKind::Configure,
            "setup",
            Box::new(move |gl| {
                let mut st = state.lock().unwrap();
                st.view_w = width;
                st.view_h = height;
                st.base_mvp = transform::center_crop(width, height, st.image_w, st.image_h);

                let Some(gl) = gl else { return };
                unsafe {
                    gl.viewport(0, 0, width as i32, height as i32);
                    match gl.create_texture() {
                        Ok(tex) => {
                            gl.bind_texture(TEXTURE_EXTERNAL_OES, Some(tex));
                            set_default_params(gl, TEXTURE_EXTERNAL_OES);
                            gl.bind_texture(TEXTURE_EXTERNAL_OES, None);
                            st.input_texture = texture_to_raw(tex);
                        }
                        Err(e) => error!("input texture creation failed: {e}"),
                    }
                }
                let tex = st.input_texture;
                drop(st);
                if tex != 0 {
                    debug!(texture = tex, "render surface configured");
                    latch.set(tex);
                    let d = delegate.lock().unwrap().clone();
                    if let Some(d) = d {
                        d.on_texture_created(tex);
                    }
                }
            }),
        );
        self.thread
            .set(thread)
            .unwrap_or_else(|_| unreachable!("start is guarded one-shot"));
        Ok(())
    }

    /// Block until the external input texture exists.
    pub fn wait_for_input_texture(&self, timeout: Duration) -> Option<u32> {
        self.latch.wait(timeout)
    }

    /// Track a surface resize.
    pub fn set_viewport(&self, width: u32, height: u32) {
        let Some(thread) = self.thread.get() else {
            return;
        };
        let state = self.state.clone();
        thread.submit(
            CommandKind::Configure,
            "viewport",
            Box::new(move |gl| {
                let mut st = state.lock().unwrap();
                st.view_w = width;
                st.view_h = height;
                st.base_mvp = transform::center_crop(width, height, st.image_w, st.image_h);
                if let Some(gl) = gl {
                    unsafe { gl.viewport(0, 0, width as i32, height as i32) };
                }
            }),
        );
    }

    /// Render one frame. Lossy under load: if the previous frame is still
    /// queued this one is dropped.
    pub fn draw_frame(&self, frame: &Frame) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        let Some(thread) = self.thread.get() else {
            trace!("frame before start, dropped");
            return;
        };

        let state = self.state.clone();
        let delegate = self.delegate.clone();
        let destroyed = self.destroyed.clone();
        let sequence = frame.meta.sequence;
        let frame = frame.clone();
        let accepted = thread.submit(
            CommandKind::Render,
            "draw_frame",
            Box::new(move |gl| {
                if destroyed.load(Ordering::Acquire) {
                    return;
                }
                let Some(gl) = gl else { return };
                let mut st = state.lock().unwrap();

                let mut texture = frame.meta.texture;
                let mut external = frame.meta.is_external;
                let d = delegate.lock().unwrap().clone();
                if let Some(d) = d {
                    if let Some(out) = d.on_pre_render(&frame) {
                        texture = out.texture;
                        external = out.is_external;
                    }
                }

                unsafe { gl.viewport(0, 0, st.view_w as i32, st.view_h as i32) };
                let mirror = frame.meta.facing == Facing::Front && !frame.meta.is_overlay;
                let mvp = transform::frame_transform(st.base_mvp, frame.meta.rotation, mirror);
                let req = DrawRequest {
                    width: frame.meta.width,
                    height: frame.meta.height,
                    data: Some(&frame.data),
                    texture,
                    mvp,
                };

                let st = &mut *st;
                let strategy: &mut dyn DrawStrategy = if frame.meta.is_overlay {
                    match frame.meta.format {
                        PixelFormat::Rgba => &mut st.strategies.rgba,
                        PixelFormat::PackedYuv => &mut st.strategies.packed_yuv,
                    }
                } else if external {
                    &mut st.strategies.external
                } else if texture != 0 {
                    &mut st.strategies.plain
                } else {
                    &mut st.strategies.packed_yuv
                };
                if let Err(e) = unsafe { strategy.draw(gl, &req) } {
                    error!(sequence = frame.meta.sequence, "draw failed: {e}");
                    return;
                }

                st.rendered_texture = texture;
                st.rendered_external = external;
                st.last_rotation = frame.meta.rotation;
                st.last_facing = frame.meta.facing;
                st.has_rendered = true;
            }),
        );
        if !accepted {
            trace!(sequence, "frame shed");
        }
    }

    /// Read back the most recently rendered content. The callback fires
    /// exactly once, on a worker thread, with `None` when nothing has
    /// been rendered or the read failed.
    pub fn get_current_frame(&self, callback: ReadbackCallback) {
        let thread = match self.thread.get() {
            Some(t) if !self.destroyed.load(Ordering::Acquire) => t,
            _ => {
                deliver(callback, None);
                return;
            }
        };

        let state = self.state.clone();
        let destroyed = self.destroyed.clone();
        // The guard answers `None` from its Drop when the command is shed
        // by the mailbox, so the callback fires exactly once either way.
        let mut guard = CallbackGuard {
            callback: Some(callback),
        };
        thread.submit(
            CommandKind::Compute,
            "read_frame",
            Box::new(move |gl| {
                let result = read_current(gl, &state, &destroyed);
                guard.fire(result);
            }),
        );
    }

    /// Tear down. GL resources are freed asynchronously on the GL thread;
    /// `on_complete` fires when they are gone. Idempotent, and
    /// `on_complete` fires on every call.
    pub fn destroy(&self, on_complete: Box<dyn FnOnce() + Send>) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            debug!("renderer already destroyed");
            on_complete();
            return;
        }
        self.delegate.lock().unwrap().take();

        let Some(thread) = self.thread.get() else {
            on_complete();
            return;
        };
        let state = self.state.clone();
        thread.release(Box::new(move |gl| {
            if let Some(gl) = gl {
                let mut st = state.lock().unwrap();
                unsafe {
                    st.strategies.destroy(gl);
                    if let Some(t) = texture_from_raw(st.input_texture) {
                        gl.delete_texture(t);
                    }
                }
                st.input_texture = 0;
            }
            on_complete();
        }));
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

fn read_current(
    gl: Option<&glow::Context>,
    state: &Mutex<RenderState>,
    destroyed: &AtomicBool,
) -> Option<Readback> {
    if destroyed.load(Ordering::Acquire) {
        return None;
    }
    let gl = gl?;
    let mut st = state.lock().unwrap();
    if !st.has_rendered {
        return None;
    }

    let ratio = st.view_w as f32 / st.view_h as f32;
    let (crop_w, crop_h) = convert::crop_to_ratio(st.image_w, st.image_h, ratio);

    if st.rendered_external {
        // Rotation and mirroring are baked into the offscreen pass, so
        // the result needs no further correction.
        let mvp = transform::frame_transform(
            Mat4::IDENTITY,
            st.last_rotation,
            st.last_facing == Facing::Front,
        );
        let mut buf = vec![0u8; crop_w as usize * crop_h as usize * 4];
        let req = DrawRequest {
            width: crop_w,
            height: crop_h,
            data: None,
            texture: st.rendered_texture,
            mvp,
        };
        let facing = st.last_facing;
        let st = &mut *st;
        match unsafe { st.strategies.external.draw_offscreen(gl, &req, &mut buf) } {
            Ok(()) => Some(Readback {
                data: buf,
                width: crop_w,
                height: crop_h,
                rotation: 0,
                facing,
            }),
            Err(e) => {
                error!("snapshot offscreen draw failed: {e}");
                None
            }
        }
    } else {
        let texture = texture_from_raw(st.rendered_texture)?;
        match unsafe {
            readback::read_texture(gl, texture, st.image_w, st.image_h, crop_w, crop_h, st.last_rotation)
        } {
            Ok(data) => {
                let (width, height) = if st.last_rotation == 90 || st.last_rotation == 270 {
                    (crop_h.min(st.image_w), crop_w.min(st.image_h))
                } else {
                    (crop_w, crop_h)
                };
                Some(Readback {
                    data,
                    width,
                    height,
                    rotation: st.last_rotation,
                    facing: st.last_facing,
                })
            }
            Err(e) => {
                error!("snapshot readback failed: {e}");
                None
            }
        }
    }
}

/// Hand the result to the callback off the GL thread.
fn deliver(callback: ReadbackCallback, result: Option<Readback>) {
    if let Err(e) = std::thread::Builder::new()
        .name("snapshot".into())
        .spawn(move || callback(result))
    {
        error!("snapshot callback thread failed to start: {e}");
    }
}

struct CallbackGuard {
    callback: Option<ReadbackCallback>,
}

impl CallbackGuard {
    fn fire(&mut self, result: Option<Readback>) {
        if let Some(cb) = self.callback.take() {
            deliver(cb, result);
        }
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Some(cb) = self.callback.take() {
            deliver(cb, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct StubContext;

    impl GpuContext for StubContext {
        fn make_current(&mut self) -> Result<(), GpuError> {
            Ok(())
        }
        fn present(&mut self) -> Result<(), GpuError> {
            Ok(())
        }
        fn api(&mut self) -> Option<&glow::Context> {
            None
        }
        fn destroy(&mut self) {}
    }

    struct NullDelegate;
    impl RenderDelegate for NullDelegate {}

    fn renderer() -> FrameRenderer {
        crate::init_test_tracing();
        FrameRenderer::new(1280, 720, Arc::new(NullDelegate))
    }

    fn test_frame() -> Frame {
        Frame {
            data: bytes::Bytes::from(vec![0u8; 6]),
            meta: Arc::new(crate::frame::FrameMeta {
                sequence: 0,
                width: 2,
                height: 2,
                rotation: 0,
                facing: Facing::Back,
                format: PixelFormat::PackedYuv,
                texture: 0,
                is_external: false,
                is_overlay: false,
            }),
            timestamp: std::time::Instant::now(),
        }
    }

    #[test]
    fn latch_is_one_shot() {
        let latch = InitLatch::new();
        latch.set(3);
        latch.set(9);
        assert_eq!(latch.wait(Duration::from_millis(10)), Some(3));
    }

    #[test]
    fn latch_times_out_when_never_set() {
        let latch = InitLatch::new();
        assert_eq!(latch.wait(Duration::from_millis(20)), None);
    }

    #[test]
    fn snapshot_before_start_answers_none_exactly_once() {
        let renderer = renderer();
        let (tx, rx) = flume::bounded(1);
        renderer.get_current_frame(Box::new(move |rb| {
            tx.send(rb.is_some()).unwrap();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), false);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn snapshot_without_render_answers_none() {
        let renderer = renderer();
        renderer.start(Box::new(StubContext), 720, 720).unwrap();
        let (tx, rx) = flume::bounded(1);
        renderer.get_current_frame(Box::new(move |rb| {
            tx.send(rb.is_none()).unwrap();
        }));
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }

    #[test]
    fn destroy_is_idempotent_and_always_completes() {
        let renderer = renderer();
        renderer.start(Box::new(StubContext), 720, 720).unwrap();

        let completions = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = completions.clone();
            let (tx, rx) = flume::bounded(1);
            renderer.destroy(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }));
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        assert_eq!(completions.load(Ordering::SeqCst), 2);
        assert!(renderer.is_destroyed());
    }

    #[test]
    fn frames_after_destroy_are_ignored() {
        let renderer = renderer();
        renderer.start(Box::new(StubContext), 720, 720).unwrap();
        let (tx, rx) = flume::bounded(1);
        renderer.destroy(Box::new(move || {
            let _ = tx.send(());
        }));
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        renderer.draw_frame(&test_frame()); // must not panic or submit
    }

    #[test]
    fn frames_shed_while_the_thread_is_busy_are_dropped_quietly() {
        let renderer = renderer();
        renderer.start(Box::new(StubContext), 720, 720).unwrap();
        // Let the setup command finish so the state lock is free.
        std::thread::sleep(Duration::from_millis(50));

        // Park the GL thread on the state lock, fill the mailbox, then
        // push one more frame so the drop-new-on-full path runs.
        let guard = renderer.state.lock().unwrap();
        renderer.set_viewport(360, 360);
        std::thread::sleep(Duration::from_millis(50));
        renderer.draw_frame(&test_frame());
        renderer.draw_frame(&test_frame());
        drop(guard);

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(renderer.state.lock().unwrap().view_w, 360);
    }
}
