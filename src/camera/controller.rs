//! Camera controller: session lifecycle, use-case binding and the public
//! capability surface.
//!
//! A controller is single-session. It starts `Uninitialized`, queueing
//! every request; when the camera backend reports ready it waits out any
//! previous instance's GPU teardown, flips to `Ready` and drains the
//! queue in order. Surface destruction or `stop` moves it to `Destroyed`
//! for good; the app builds a new controller for the next session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use image::RgbaImage;
use tracing::{debug, error, info, trace, warn};

use crate::camera::effect::EffectProcessor;
use crate::camera::handoff::{HandoffSlot, TeardownHandoff};
use crate::camera::photo;
use crate::camera::source::{BindRequest, CameraSource, FrameSink, SurfaceProvider};
use crate::camera::surface::{PreviewSurface, SurfaceObserver};
use crate::frame::{Facing, Frame, FrameDispatcher};
use crate::gl::{EglWindowContext, RenderTarget};
use crate::render::{FrameRenderer, RenderDelegate, RenderOutput};
use crate::PipelineConfig;

/// `(success, width, height)`; dimensions are 0 on failure. Fires exactly
/// once, never on the GL thread.
pub type PhotoCallback = Box<dyn FnOnce(bool, u32, u32) + Send>;

/// Listener receiving a clone of every processed frame.
pub type FrameListenerFn = dyn Fn(Frame) + Send + Sync;

type Action = Box<dyn FnOnce(&Arc<ControllerInner>) + Send>;

enum LifecycleState {
    Uninitialized { pending: Vec<(&'static str, Action)> },
    Ready,
    Destroyed,
}

struct Session {
    dispatcher: Arc<FrameDispatcher>,
    renderer: Arc<FrameRenderer>,
}

struct OverlayClock {
    stop: Arc<AtomicBool>,
}

impl OverlayClock {
    /// At least 1 ms, so absurd rates never degenerate into a busy loop.
    fn tick_period(fps: u32) -> Duration {
        Duration::from_millis((1000 / u64::from(fps.max(1))).max(1))
    }

    fn start(dispatcher: Arc<FrameDispatcher>, fps: u32) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let period = Self::tick_period(fps);
        if let Err(e) = std::thread::Builder::new()
            .name("overlay-clock".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    dispatcher.overlay_tick();
                    std::thread::sleep(period);
                }
            })
        {
            error!("overlay clock failed to start: {e}");
        }
        Self { stop }
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Fans processed frames out to the app's listener on its own thread so a
/// slow listener never stalls rendering.
struct FrameListenerHub {
    tx: flume::Sender<Frame>,
    listener: Arc<Mutex<Option<Arc<FrameListenerFn>>>>,
}

impl FrameListenerHub {
    fn new() -> Self {
        let (tx, rx) = flume::bounded::<Frame>(4);
        let listener: Arc<Mutex<Option<Arc<FrameListenerFn>>>> = Arc::new(Mutex::new(None));
        let slot = listener.clone();
        if let Err(e) = std::thread::Builder::new()
            .name("frame-listener".into())
            .spawn(move || {
                while let Ok(frame) = rx.recv() {
                    let current = slot.lock().unwrap().clone();
                    if let Some(l) = current {
                        l(frame);
                    }
                }
            })
        {
            error!("frame listener thread failed to start: {e}");
        }
        Self { tx, listener }
    }

    fn publish(&self, frame: &Frame) {
        if self.listener.lock().unwrap().is_none() {
            return;
        }
        if self.tx.try_send(frame.clone()).is_err() {
            trace!("listener backlog full, frame skipped");
        }
    }

    fn set(&self, listener: Option<Arc<FrameListenerFn>>) {
        *self.listener.lock().unwrap() = listener;
    }
}

struct ControllerInner {
    config: PipelineConfig,
    source: Arc<dyn CameraSource>,
    effect: Option<Arc<dyn EffectProcessor>>,
    effect_enabled: AtomicBool,
    state: Mutex<LifecycleState>,
    handoff_slot: HandoffSlot,
    armed_handoff: Mutex<Option<TeardownHandoff>>,
    session: Mutex<Option<Session>>,
    facing: Mutex<Facing>,
    overlay: Mutex<Option<RgbaImage>>,
    bound: AtomicBool,
    listener: FrameListenerHub,
    cached_frame: Mutex<Option<Frame>>,
    overlay_clock: Mutex<Option<OverlayClock>>,
    recycled: AtomicBool,
}

pub struct CameraController {
    inner: Arc<ControllerInner>,
}

impl CameraController {
    pub fn new(
        source: Arc<dyn CameraSource>,
        effect: Option<Arc<dyn EffectProcessor>>,
        config: PipelineConfig,
        handoff_slot: HandoffSlot,
    ) -> Self {
        let facing = config.facing;
        let inner = Arc::new(ControllerInner {
            config,
            source: source.clone(),
            effect,
            effect_enabled: AtomicBool::new(true),
            state: Mutex::new(LifecycleState::Uninitialized {
                pending: Vec::new(),
            }),
            handoff_slot,
            armed_handoff: Mutex::new(None),
            session: Mutex::new(None),
            facing: Mutex::new(facing),
            overlay: Mutex::new(None),
            bound: AtomicBool::new(false),
            listener: FrameListenerHub::new(),
            cached_frame: Mutex::new(None),
            overlay_clock: Mutex::new(None),
            recycled: AtomicBool::new(false),
        });

        let on_ready = inner.clone();
        source.subscribe_ready(Box::new(move || ControllerInner::on_ready(&on_ready)));
        Self { inner }
    }

    /// Install the controller as the surface's lifecycle observer. The
    /// GPU session begins when the surface reports ready.
    pub fn set_preview_surface(&self, surface: &dyn PreviewSurface) {
        surface.set_observer(Arc::new(PreviewObserver {
            inner: Arc::downgrade(&self.inner),
        }));
    }

    /// Switch cameras. Rebinds only when the facing actually changes.
    pub fn set_camera_facing(&self, facing: Facing) {
        ControllerInner::post(
            &self.inner,
            "set_camera_facing",
            Box::new(move |inner| {
                {
                    let mut current = inner.facing.lock().unwrap();
                    if *current == facing {
                        return;
                    }
                    *current = facing;
                }
                info!(?facing, "camera facing changed");
                if inner.bound.swap(false, Ordering::AcqRel) {
                    inner.source.unbind_all();
                    ControllerInner::bind_source(inner);
                }
            }),
        );
    }

    pub fn camera_facing(&self) -> Facing {
        *self.inner.facing.lock().unwrap()
    }

    pub fn enable_effect(&self, enabled: bool) {
        ControllerInner::post(
            &self.inner,
            "enable_effect",
            Box::new(move |inner| {
                inner.effect_enabled.store(enabled, Ordering::Release);
                debug!(enabled, "effect toggled");
            }),
        );
    }

    /// Install or remove the overlay that substitutes camera frames.
    pub fn set_overlay(&self, overlay: Option<RgbaImage>) {
        ControllerInner::post(
            &self.inner,
            "set_overlay",
            Box::new(move |inner| {
                *inner.overlay.lock().unwrap() = overlay.clone();
                let session = inner.session.lock().unwrap();
                let Some(session) = session.as_ref() else {
                    return;
                };
                session.dispatcher.set_overlay(overlay.as_ref());

                if inner.config.overlay_only {
                    let mut clock = inner.overlay_clock.lock().unwrap();
                    match (&overlay, clock.is_some()) {
                        (Some(_), false) => {
                            *clock = Some(OverlayClock::start(
                                session.dispatcher.clone(),
                                inner.config.overlay_fps,
                            ));
                        }
                        (None, true) => {
                            if let Some(c) = clock.take() {
                                c.stop();
                            }
                        }
                        _ => {}
                    }
                }
            }),
        );
    }

    /// Receive a clone of every processed frame, on a dedicated thread.
    pub fn set_frame_listener(&self, listener: Option<Arc<FrameListenerFn>>) {
        self.inner.listener.set(listener);
    }

    /// Capture the current preview into a JPEG at `path`. The callback
    /// fires exactly once; `(false, 0, 0)` when nothing has been rendered
    /// yet or the controller is already recycled.
    pub fn take_photo(&self, path: PathBuf, callback: PhotoCallback) {
        let reply = PhotoReply {
            callback: Some(callback),
        };
        ControllerInner::post(
            &self.inner,
            "take_photo",
            Box::new(move |inner| {
                let renderer = inner
                    .session
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|s| s.renderer.clone());
                let Some(renderer) = renderer else {
                    reply.fire(false, 0, 0);
                    return;
                };
                renderer.get_current_frame(Box::new(move |shot| match shot {
                    None => {
                        debug!("nothing rendered yet, photo failed");
                        reply.fire(false, 0, 0);
                    }
                    Some(shot) => match photo::save_jpeg(&path, &shot) {
                        Ok(()) => reply.fire(true, shot.width, shot.height),
                        Err(e) => {
                            error!("photo save failed: {e}");
                            reply.fire(false, 0, 0);
                        }
                    },
                }));
            }),
        );
    }

    /// Bind the camera when the session was created with `auto_start`
    /// off; otherwise resumes delivery.
    pub fn start(&self) {
        ControllerInner::post(
            &self.inner,
            "start",
            Box::new(|inner| {
                let has_session = inner.session.lock().unwrap().is_some();
                if has_session && !inner.bound.load(Ordering::Acquire) {
                    ControllerInner::bind_source(inner);
                } else {
                    inner.source.resume();
                }
            }),
        );
    }

    pub fn pause(&self) {
        ControllerInner::post(&self.inner, "pause", Box::new(|inner| inner.source.pause()));
    }

    pub fn resume(&self) {
        ControllerInner::post(
            &self.inner,
            "resume",
            Box::new(|inner| inner.source.resume()),
        );
    }

    /// Tear the session down. Terminal and idempotent.
    pub fn stop(&self) {
        ControllerInner::teardown(&self.inner);
    }

    /// The controller has been torn down and cannot be reused.
    pub fn is_recycled(&self) -> bool {
        self.inner.recycled.load(Ordering::Acquire)
    }

    /// Most recently processed frame, if any.
    pub fn current_frame(&self) -> Option<Frame> {
        self.inner.cached_frame.lock().unwrap().clone()
    }
}

impl ControllerInner {
    /// Run now, queue until ready, or discard after destruction.
    fn post(inner: &Arc<ControllerInner>, tag: &'static str, action: Action) {
        let run = {
            let mut state = inner.state.lock().unwrap();
            match &mut *state {
                LifecycleState::Uninitialized { pending } => {
                    debug!(tag, "queued until camera ready");
                    pending.push((tag, action));
                    return;
                }
                LifecycleState::Ready => Some(action),
                LifecycleState::Destroyed => {
                    warn!(tag, "discarded: controller recycled");
                    None
                }
            }
        };
        if let Some(action) = run {
            action(inner);
        }
    }

    /// Camera backend is available: wait out the previous instance's GPU
    /// teardown, then drain the queue in submission order.
    fn on_ready(inner: &Arc<ControllerInner>) {
        if let Some(previous) = inner.handoff_slot.take() {
            let wait = Duration::from_millis(inner.config.handoff_wait_ms);
            if !previous.wait_timeout(wait) {
                warn!(
                    wait_ms = inner.config.handoff_wait_ms,
                    "previous instance teardown timed out, proceeding"
                );
            }
        }

        let pending = {
            let mut state = inner.state.lock().unwrap();
            match std::mem::replace(&mut *state, LifecycleState::Ready) {
                LifecycleState::Uninitialized { pending } => pending,
                other => {
                    // Destroyed before ready stays destroyed.
                    *state = other;
                    return;
                }
            }
        };
        info!(queued = pending.len(), "camera ready");
        for (tag, action) in pending {
            trace!(tag, "running queued action");
            action(inner);
        }
    }

    /// The preview surface exists: spin up dispatcher, renderer and GL
    /// thread, then attach the camera.
    fn begin_session(inner: &Arc<ControllerInner>, target: RenderTarget, width: u32, height: u32) {
        if inner.session.lock().unwrap().is_some() {
            warn!("surface ready twice, session already active");
            return;
        }
        info!(width, height, "starting preview session");

        *inner.armed_handoff.lock().unwrap() = Some(inner.handoff_slot.arm());

        let dispatcher = Arc::new(FrameDispatcher::new());
        if let Some(overlay) = inner.overlay.lock().unwrap().as_ref() {
            dispatcher.set_overlay(Some(overlay));
        }

        let delegate = Arc::new(ControllerDelegate {
            inner: Arc::downgrade(inner),
        });
        let renderer = Arc::new(FrameRenderer::new(
            inner.config.image_width,
            inner.config.image_height,
            delegate,
        ));

        let context = match EglWindowContext::new(target) {
            Ok(c) => Box::new(c),
            Err(e) => {
                error!("GPU context creation failed, no preview: {e}");
                return;
            }
        };
        if let Err(e) = renderer.start(context, width, height) {
            error!("renderer failed to start: {e}");
            return;
        }

        let render_sink = renderer.clone();
        dispatcher.add_consumer(Arc::new(move |frame: &Frame| render_sink.draw_frame(frame)));

        *inner.session.lock().unwrap() = Some(Session {
            dispatcher: dispatcher.clone(),
            renderer,
        });

        if inner.config.overlay_only {
            if dispatcher.has_overlay() {
                *inner.overlay_clock.lock().unwrap() = Some(OverlayClock::start(
                    dispatcher,
                    inner.config.overlay_fps,
                ));
            }
        } else if inner.config.auto_start {
            Self::bind_source(inner);
        }
    }

    fn bind_source(inner: &Arc<ControllerInner>) {
        let (dispatcher, renderer) = {
            let session = inner.session.lock().unwrap();
            let Some(session) = session.as_ref() else {
                warn!("bind requested without a session");
                return;
            };
            (session.dispatcher.clone(), session.renderer.clone())
        };

        // The provider blocks its calling thread until the renderer's
        // input texture exists; sources call it off the GL thread.
        let provider_dispatcher = dispatcher.clone();
        let wait = Duration::from_millis(inner.config.handoff_wait_ms);
        let provider: SurfaceProvider = Box::new(move || {
            match renderer.wait_for_input_texture(wait) {
                Some(texture) => {
                    provider_dispatcher.set_preview_texture(texture);
                    Some(texture)
                }
                None => {
                    warn!("input texture not ready in time, CPU preview only");
                    None
                }
            }
        });

        let sink: FrameSink = Box::new(move |raw| {
            if let Err(e) = dispatcher.analyze(&raw) {
                error!("frame conversion failed: {e}");
            }
        });

        let request = BindRequest {
            facing: *inner.facing.lock().unwrap(),
            image_size: (inner.config.image_width, inner.config.image_height),
            frames: sink,
            surface_provider: Some(provider),
        };
        match inner.source.bind(request) {
            Ok(()) => {
                inner.bound.store(true, Ordering::Release);
                debug!("camera use-cases bound");
            }
            Err(e) => error!("camera bind failed: {e}"),
        }
    }

    fn teardown(inner: &Arc<ControllerInner>) {
        {
            let mut state = inner.state.lock().unwrap();
            if matches!(*state, LifecycleState::Destroyed) {
                debug!("teardown: already destroyed");
                return;
            }
            *state = LifecycleState::Destroyed;
        }
        info!("tearing down camera session");

        if inner.bound.swap(false, Ordering::AcqRel) {
            inner.source.unbind_all();
        }
        if let Some(clock) = inner.overlay_clock.lock().unwrap().take() {
            clock.stop();
        }
        if let Some(effect) = &inner.effect {
            effect.reset();
            effect.release();
        }

        let handoff = inner.armed_handoff.lock().unwrap().take();
        let session = inner.session.lock().unwrap().take();
        match session {
            Some(session) => {
                session.dispatcher.destroy();
                // GPU resources die on the GL thread; the next instance
                // waits on the handoff until they are gone.
                session.renderer.destroy(Box::new(move || {
                    if let Some(h) = handoff {
                        h.signal();
                    }
                }));
            }
            None => {
                if let Some(h) = handoff {
                    h.signal();
                }
            }
        }
        inner.recycled.store(true, Ordering::Release);
    }
}

/// Guarantees the photo callback fires exactly once even when the action
/// carrying it is discarded.
struct PhotoReply {
    callback: Option<PhotoCallback>,
}

impl PhotoReply {
    fn fire(mut self, success: bool, width: u32, height: u32) {
        if let Some(cb) = self.callback.take() {
            cb(success, width, height);
        }
    }
}

impl Drop for PhotoReply {
    fn drop(&mut self) {
        if let Some(cb) = self.callback.take() {
            cb(false, 0, 0);
        }
    }
}

struct PreviewObserver {
    inner: Weak<ControllerInner>,
}

impl SurfaceObserver for PreviewObserver {
    fn on_surface_ready(&self, target: RenderTarget, width: u32, height: u32) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        ControllerInner::post(
            &inner,
            "surface_ready",
            Box::new(move |inner| ControllerInner::begin_session(inner, target, width, height)),
        );
    }

    fn on_surface_resized(&self, width: u32, height: u32) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let session = inner.session.lock().unwrap();
        if let Some(session) = session.as_ref() {
            session.renderer.set_viewport(width, height);
        }
    }

    fn on_surface_destroyed(&self) {
        if let Some(inner) = self.inner.upgrade() {
            ControllerInner::teardown(&inner);
        }
    }
}

struct ControllerDelegate {
    inner: Weak<ControllerInner>,
}

impl RenderDelegate for ControllerDelegate {
    fn on_texture_created(&self, texture: u32) {
        debug!(texture, "external input texture ready");
    }

    fn on_pre_render(&self, frame: &Frame) -> Option<RenderOutput> {
        let inner = self.inner.upgrade()?;
        *inner.cached_frame.lock().unwrap() = Some(frame.clone());
        inner.listener.publish(frame);

        if frame.meta.is_overlay || !inner.effect_enabled.load(Ordering::Acquire) {
            return None;
        }
        let effect = inner.effect.as_ref()?;
        let out = effect.render(frame, frame.meta.texture)?;
        Some(RenderOutput {
            texture: out.texture,
            is_external: out.is_external,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct FakeSource {
        events: Mutex<Vec<&'static str>>,
        ready: Mutex<Option<Box<dyn FnOnce() + Send>>>,
        binds: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                ready: Mutex::new(None),
                binds: AtomicUsize::new(0),
            })
        }

        fn fire_ready(&self) {
            if let Some(cb) = self.ready.lock().unwrap().take() {
                cb();
            }
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl CameraSource for FakeSource {
        fn subscribe_ready(&self, ready: Box<dyn FnOnce() + Send>) {
            *self.ready.lock().unwrap() = Some(ready);
        }
        fn bind(&self, _request: BindRequest) -> Result<(), crate::error::SourceError> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push("bind");
            Ok(())
        }
        fn unbind_all(&self) {
            self.events.lock().unwrap().push("unbind");
        }
        fn pause(&self) {
            self.events.lock().unwrap().push("pause");
        }
        fn resume(&self) {
            self.events.lock().unwrap().push("resume");
        }
    }

    fn controller(source: &Arc<FakeSource>, slot: HandoffSlot) -> CameraController {
        crate::init_test_tracing();
        CameraController::new(
            source.clone() as Arc<dyn CameraSource>,
            None,
            PipelineConfig::default(),
            slot,
        )
    }

    #[test]
    fn requests_queue_until_ready_and_drain_in_order() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());

        controller.pause();
        controller.resume();
        controller.pause();
        assert!(source.events().is_empty(), "nothing runs before ready");

        source.fire_ready();
        assert_eq!(source.events(), vec!["pause", "resume", "pause"]);
    }

    #[test]
    fn requests_after_stop_are_discarded() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());
        source.fire_ready();

        controller.stop();
        assert!(controller.is_recycled());

        controller.pause();
        controller.resume();
        assert!(!source.events().contains(&"pause"));
        assert!(!source.events().contains(&"resume"));
    }

    #[test]
    fn stop_before_ready_drops_the_queue() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());

        controller.pause();
        controller.stop();
        source.fire_ready();
        assert!(!source.events().contains(&"pause"));
    }

    #[test]
    fn ready_waits_for_the_previous_instance() {
        let source = FakeSource::new();
        let slot = HandoffSlot::new();
        let previous = slot.arm();

        let mut config = PipelineConfig::default();
        config.handoff_wait_ms = 5_000;
        let controller = CameraController::new(
            source.clone() as Arc<dyn CameraSource>,
            None,
            config,
            slot,
        );
        controller.pause();

        let src = source.clone();
        let ready_thread = std::thread::spawn(move || src.fire_ready());
        std::thread::sleep(Duration::from_millis(50));
        assert!(
            source.events().is_empty(),
            "queue must not drain while the handoff is pending"
        );

        previous.signal();
        ready_thread.join().unwrap();
        assert_eq!(source.events(), vec!["pause"]);
    }

    #[test]
    fn ready_gives_up_on_a_silent_predecessor() {
        let source = FakeSource::new();
        let slot = HandoffSlot::new();
        let _previous = slot.arm(); // never signalled

        let mut config = PipelineConfig::default();
        config.handoff_wait_ms = 40;
        let controller = CameraController::new(
            source.clone() as Arc<dyn CameraSource>,
            None,
            config,
            slot,
        );
        controller.resume();

        let started = Instant::now();
        source.fire_ready();
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(source.events(), vec!["resume"]);
    }

    #[test]
    fn photo_without_a_session_fails_exactly_once() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());
        source.fire_ready();

        let (tx, rx) = flume::bounded(2);
        controller.take_photo(
            PathBuf::from("/tmp/never-written.jpg"),
            Box::new(move |ok, w, h| tx.send((ok, w, h)).unwrap()),
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            (false, 0, 0)
        );
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn photo_after_stop_still_answers() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());
        source.fire_ready();
        controller.stop();

        let (tx, rx) = flume::bounded(1);
        controller.take_photo(
            PathBuf::from("/tmp/never-written.jpg"),
            Box::new(move |ok, w, h| tx.send((ok, w, h)).unwrap()),
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            (false, 0, 0)
        );
    }

    #[test]
    fn facing_changes_without_a_binding_do_not_rebind() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());
        source.fire_ready();

        let initial = controller.camera_facing();
        let flipped = match initial {
            Facing::Front => Facing::Back,
            Facing::Back => Facing::Front,
        };
        controller.set_camera_facing(flipped);
        assert_eq!(controller.camera_facing(), flipped);
        assert_eq!(source.binds.load(Ordering::SeqCst), 0);

        // Same facing again is a no-op.
        controller.set_camera_facing(flipped);
        assert_eq!(controller.camera_facing(), flipped);
    }

    #[test]
    fn resize_without_a_session_is_ignored() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());
        source.fire_ready();

        let observer = PreviewObserver {
            inner: Arc::downgrade(&controller.inner),
        };
        observer.on_surface_resized(640, 480);
        assert!(!controller.is_recycled());
    }

    #[test]
    fn overlay_clock_period_never_degenerates() {
        assert_eq!(OverlayClock::tick_period(25), Duration::from_millis(40));
        assert_eq!(OverlayClock::tick_period(0), Duration::from_millis(1000));
        assert_eq!(
            OverlayClock::tick_period(10_000),
            Duration::from_millis(1),
            "sub-millisecond rates clamp instead of spinning"
        );
    }

    #[test]
    fn stop_is_idempotent() {
        let source = FakeSource::new();
        let controller = controller(&source, HandoffSlot::new());
        source.fire_ready();
        controller.stop();
        controller.stop();
        assert!(controller.is_recycled());
        let unbinds = source
            .events()
            .iter()
            .filter(|e| **e == "unbind")
            .count();
        assert!(unbinds <= 1);
    }
}
