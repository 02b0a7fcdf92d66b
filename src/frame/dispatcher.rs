//! Fan-out point between the camera callback and everything downstream.
//!
//! The camera delivers borrowed buffers on its own thread; `analyze`
//! normalizes them into owned [`Frame`]s and hands a clone of the result
//! to every registered consumer. When an overlay is installed the camera
//! image is discarded and the pre-converted overlay is emitted instead.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use image::RgbaImage;
use tracing::{debug, trace};

use crate::convert::{self, OverlayImage};
use crate::error::ConvertError;
use crate::frame::{Facing, Frame, FrameMeta, PixelFormat, RawImage};

/// Receives every dispatched frame. Called on the delivering thread;
/// consumers that need to block must hand the frame off themselves.
pub type FrameConsumer = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Identifies a registered consumer for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerId(u64);

pub struct FrameDispatcher {
    consumers: ArcSwap<Vec<(ConsumerId, FrameConsumer)>>,
    next_id: AtomicU64,
    sequence: AtomicU64,
    overlay: Mutex<Option<OverlayImage>>,
    /// GL texture the preview renders through; 0 until a surface-backed
    /// camera session installs one.
    preview_texture: AtomicU32,
    destroyed: AtomicBool,
}

impl FrameDispatcher {
    pub fn new() -> Self {
        Self {
            consumers: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            overlay: Mutex::new(None),
            preview_texture: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Register a consumer. Safe while dispatch is in flight: the running
    /// dispatch keeps its own snapshot of the list.
    pub fn add_consumer(&self, consumer: FrameConsumer) -> ConsumerId {
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut list = self.consumers.load().as_ref().clone();
        list.push((id, consumer));
        self.consumers.store(Arc::new(list));
        id
    }

    /// Remove a consumer. A dispatch already in flight to it is not
    /// cancelled.
    pub fn remove_consumer(&self, id: ConsumerId) {
        let mut list = self.consumers.load().as_ref().clone();
        list.retain(|(cid, _)| *cid != id);
        self.consumers.store(Arc::new(list));
    }

    /// Install or remove the overlay. Conversion happens once, here.
    pub fn set_overlay(&self, image: Option<&RgbaImage>) {
        let converted = image.map(convert::rgba_to_packed_yuv);
        if let Some(ov) = &converted {
            debug!(width = ov.width, height = ov.height, "overlay installed");
        } else {
            debug!("overlay removed");
        }
        *self.overlay.lock().unwrap() = converted;
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.lock().unwrap().is_some()
    }

    /// Route preview frames through an external camera texture.
    pub fn set_preview_texture(&self, texture: u32) {
        self.preview_texture.store(texture, Ordering::Release);
    }

    /// Normalize one camera buffer and dispatch it. The buffer is copied;
    /// the camera may reuse it as soon as this returns.
    pub fn analyze(&self, raw: &RawImage<'_>) -> Result<(), ConvertError> {
        if self.destroyed.load(Ordering::Acquire) {
            debug_assert!(false, "analyze called after destroy");
            return Ok(());
        }

        let overlay = self.overlay.lock().unwrap().clone();
        let frame = match overlay {
            Some(ov) => self.overlay_frame(&ov, raw.facing),
            None => {
                let started = Instant::now();
                let data = convert::to_packed_yuv(raw)?;
                metrics::histogram!("convert_time_us")
                    .record(started.elapsed().as_micros() as f64);

                let texture = self.preview_texture.load(Ordering::Acquire);
                Frame {
                    data,
                    meta: Arc::new(FrameMeta {
                        sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                        width: raw.width,
                        height: raw.height,
                        rotation: raw.rotation,
                        facing: raw.facing,
                        format: PixelFormat::PackedYuv,
                        texture,
                        is_external: texture != 0,
                        is_overlay: false,
                    }),
                    timestamp: Instant::now(),
                }
            }
        };

        self.dispatch(frame);
        Ok(())
    }

    /// Emit one overlay frame without a camera buffer. Drives the
    /// overlay-only mode at the controller's pseudo-rate.
    pub fn overlay_tick(&self) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        let overlay = self.overlay.lock().unwrap().clone();
        if let Some(ov) = overlay {
            let frame = self.overlay_frame(&ov, Facing::Back);
            self.dispatch(frame);
        }
    }

    /// Drop consumers and overlay. Dispatching after this is a
    /// programmer error.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.consumers.store(Arc::new(Vec::new()));
        *self.overlay.lock().unwrap() = None;
        debug!("dispatcher destroyed");
    }

    fn overlay_frame(&self, ov: &OverlayImage, facing: Facing) -> Frame {
        Frame {
            data: ov.data.clone(),
            meta: Arc::new(FrameMeta {
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                width: ov.width,
                height: ov.height,
                rotation: 0,
                facing,
                format: PixelFormat::PackedYuv,
                texture: 0,
                is_external: false,
                is_overlay: true,
            }),
            timestamp: Instant::now(),
        }
    }

    fn dispatch(&self, frame: Frame) {
        let consumers = self.consumers.load();
        trace!(
            sequence = frame.meta.sequence,
            consumers = consumers.len(),
            "dispatching frame"
        );
        for (_, consumer) in consumers.iter() {
            consumer(&frame);
        }
    }
}

impl Default for FrameDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawLayout;

    fn raw(w: u32, h: u32, data: &[u8]) -> RawImage<'_> {
        RawImage {
            width: w,
            height: h,
            rotation: 90,
            facing: Facing::Front,
            layout: RawLayout::SemiPlanar { data },
        }
    }

    fn collecting_consumer() -> (FrameConsumer, Arc<Mutex<Vec<Frame>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer: FrameConsumer =
            Arc::new(move |f: &Frame| sink.lock().unwrap().push(f.clone()));
        (consumer, seen)
    }

    #[test]
    fn sequence_starts_at_zero_and_increments() {
        let dispatcher = FrameDispatcher::new();
        let (consumer, seen) = collecting_consumer();
        dispatcher.add_consumer(consumer);

        let data = vec![0u8; 4 * 4 * 3 / 2];
        for _ in 0..3 {
            dispatcher.analyze(&raw(4, 4, &data)).unwrap();
        }

        let seen = seen.lock().unwrap();
        let sequences: Vec<u64> = seen.iter().map(|f| f.meta.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn overlay_replaces_camera_frames() {
        let dispatcher = FrameDispatcher::new();
        let (consumer, seen) = collecting_consumer();
        dispatcher.add_consumer(consumer);

        let img = RgbaImage::from_pixel(8, 4, image::Rgba([10, 20, 30, 255]));
        dispatcher.set_overlay(Some(&img));

        let data = vec![0u8; 4 * 4 * 3 / 2];
        dispatcher.analyze(&raw(4, 4, &data)).unwrap();

        let seen = seen.lock().unwrap();
        let frame = &seen[0];
        assert!(frame.meta.is_overlay);
        assert_eq!(frame.meta.rotation, 0);
        assert_eq!(frame.meta.width, 8);
        assert_eq!(frame.meta.height, 4);
        assert_eq!(frame.meta.format, PixelFormat::PackedYuv);
    }

    #[test]
    fn overlay_tick_needs_an_overlay() {
        let dispatcher = FrameDispatcher::new();
        let (consumer, seen) = collecting_consumer();
        dispatcher.add_consumer(consumer);

        dispatcher.overlay_tick();
        assert!(seen.lock().unwrap().is_empty());

        let img = RgbaImage::from_pixel(8, 2, image::Rgba([0, 0, 0, 255]));
        dispatcher.set_overlay(Some(&img));
        dispatcher.overlay_tick();
        dispatcher.overlay_tick();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].meta.sequence, 1);
    }

    #[test]
    fn removed_consumer_stops_receiving() {
        let dispatcher = FrameDispatcher::new();
        let (first, seen_first) = collecting_consumer();
        let (second, seen_second) = collecting_consumer();
        let id = dispatcher.add_consumer(first);
        dispatcher.add_consumer(second);

        let data = vec![0u8; 4 * 4 * 3 / 2];
        dispatcher.analyze(&raw(4, 4, &data)).unwrap();
        dispatcher.remove_consumer(id);
        dispatcher.analyze(&raw(4, 4, &data)).unwrap();

        assert_eq!(seen_first.lock().unwrap().len(), 1);
        assert_eq!(seen_second.lock().unwrap().len(), 2);
    }

    #[test]
    fn preview_texture_marks_frames_external() {
        let dispatcher = FrameDispatcher::new();
        let (consumer, seen) = collecting_consumer();
        dispatcher.add_consumer(consumer);

        let data = vec![0u8; 4 * 4 * 3 / 2];
        dispatcher.analyze(&raw(4, 4, &data)).unwrap();
        dispatcher.set_preview_texture(7);
        dispatcher.analyze(&raw(4, 4, &data)).unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen[0].meta.is_external);
        assert_eq!(seen[0].meta.texture, 0);
        assert!(seen[1].meta.is_external);
        assert_eq!(seen[1].meta.texture, 7);
    }

    #[test]
    fn payload_is_a_defensive_copy() {
        let dispatcher = FrameDispatcher::new();
        let (consumer, seen) = collecting_consumer();
        dispatcher.add_consumer(consumer);

        let mut data = vec![1u8; 4 * 4 * 3 / 2];
        dispatcher.analyze(&raw(4, 4, &data)).unwrap();
        data.fill(9); // camera reuses its buffer

        let seen = seen.lock().unwrap();
        assert!(seen[0].data.iter().all(|&b| b == 1));
    }
}
