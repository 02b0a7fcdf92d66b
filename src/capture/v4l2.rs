//! V4L2 camera backend with memory-mapped streaming.
//!
//! Delivers NV12 capture buffers through the planar raw-image view; it
//! has no external-texture support, so the surface provider is never
//! invoked and preview stays on the CPU upload path.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::camera::source::{BindRequest, CameraSource, FrameSink};
use crate::error::SourceError;
use crate::frame::{Facing, RawImage, RawLayout, RawPlane};

const BUFFER_COUNT: u32 = 4;

struct Binding {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

pub struct V4l2Source {
    paused: Arc<AtomicBool>,
    binding: Mutex<Option<Binding>>,
}

impl V4l2Source {
    pub fn new() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            binding: Mutex::new(None),
        }
    }

    /// Probe `/dev/video*` for the first node that can capture video.
    fn find_device() -> Result<(PathBuf, Device), SourceError> {
        for index in 0..10 {
            let path = PathBuf::from(format!("/dev/video{index}"));
            let Ok(device) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = device.query_caps() else {
                continue;
            };
            if caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
                info!(path = %path.display(), card = %caps.card, driver = %caps.driver, "capture device found");
                return Ok((path, device));
            }
        }
        Err(SourceError::Device(
            "no /dev/video* node supports capture".into(),
        ))
    }
}

impl CameraSource for V4l2Source {
    fn subscribe_ready(&self, ready: Box<dyn FnOnce() + Send>) {
        // Device presence is re-checked at bind; readiness only needs to
        // be asynchronous.
        if let Err(e) = std::thread::Builder::new()
            .name("v4l2-probe".into())
            .spawn(move || {
                match Self::find_device() {
                    Ok((path, _)) => debug!(path = %path.display(), "camera probe ok"),
                    Err(e) => warn!("camera probe failed: {e}"),
                }
                ready();
            })
        {
            error!("camera probe thread failed to start: {e}");
        }
    }

    fn bind(&self, request: BindRequest) -> Result<(), SourceError> {
        self.unbind_all();

        let (path, device) = Self::find_device()?;

        let mut fmt = device.format()?;
        fmt.width = request.image_size.0;
        fmt.height = request.image_size.1;
        fmt.fourcc = FourCC::new(b"NV12");
        let fmt = device.set_format(&fmt)?;
        if fmt.fourcc != FourCC::new(b"NV12") {
            return Err(SourceError::Format(fmt.fourcc.to_string()));
        }
        info!(
            path = %path.display(),
            width = fmt.width,
            height = fmt.height,
            "capture format negotiated"
        );

        // No external-texture support here; preview renders from the
        // CPU payload.
        drop(request.surface_provider);

        let stop = Arc::new(AtomicBool::new(false));
        let worker = spawn_capture_loop(
            device,
            fmt.width,
            fmt.height,
            request.facing,
            request.frames,
            stop.clone(),
            self.paused.clone(),
        )?;

        *self.binding.lock().unwrap() = Some(Binding { stop, worker });
        Ok(())
    }

    fn unbind_all(&self) {
        let binding = self.binding.lock().unwrap().take();
        if let Some(binding) = binding {
            binding.stop.store(true, Ordering::Release);
            if binding.worker.join().is_err() {
                error!("capture worker panicked");
            }
            debug!("capture unbound");
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }
}

impl Default for V4l2Source {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_capture_loop(
    device: Device,
    width: u32,
    height: u32,
    facing: Facing,
    mut frames: FrameSink,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, SourceError> {
    let handle = std::thread::Builder::new()
        .name("v4l2-capture".into())
        .spawn(move || {
            let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            {
                Ok(s) => s,
                Err(e) => {
                    error!("capture stream failed to start: {e}");
                    return;
                }
            };
            info!(buffers = BUFFER_COUNT, "capture stream started");

            let luma_len = width as usize * height as usize;
            let frame_len = luma_len * 3 / 2;
            loop {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                let (buf, _meta) = match stream.next() {
                    Ok(next) => next,
                    Err(e) => {
                        error!("capture dequeue failed: {e}");
                        break;
                    }
                };
                if paused.load(Ordering::Acquire) {
                    continue;
                }
                if buf.len() < frame_len {
                    warn!(len = buf.len(), expected = frame_len, "short capture buffer");
                    continue;
                }

                // NV12: tight luma plane, then interleaved UV. Expose it
                // through the planar view; the converter reorders chroma.
                let raw = RawImage {
                    width,
                    height,
                    rotation: 0,
                    facing,
                    layout: RawLayout::Planar {
                        y: RawPlane {
                            data: &buf[..luma_len],
                            row_stride: width as usize,
                            pixel_stride: 1,
                        },
                        u: RawPlane {
                            data: &buf[luma_len..frame_len],
                            row_stride: width as usize,
                            pixel_stride: 2,
                        },
                        v: RawPlane {
                            data: &buf[luma_len + 1..frame_len],
                            row_stride: width as usize,
                            pixel_stride: 2,
                        },
                    },
                };
                frames(raw);
            }
            debug!("capture loop exited");
        })?;
    Ok(handle)
}
