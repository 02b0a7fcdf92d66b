//! Pixel layout normalization.
//!
//! Everything downstream of the camera speaks one CPU format: a tightly
//! packed luma plane followed by interleaved VU chroma at quarter
//! resolution. Camera buffers and overlay bitmaps are normalized here,
//! exactly once, before they fan out.

use bytes::Bytes;
use image::RgbaImage;

use crate::error::ConvertError;
use crate::frame::{RawImage, RawLayout, RawPlane};

/// An overlay bitmap pre-converted to the packed YUV layout.
#[derive(Clone)]
pub struct OverlayImage {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// Normalize a camera buffer into the packed YUV layout.
///
/// Semi-planar input is already in the target arrangement and is copied
/// through (the camera reuses its buffer, so a copy is mandatory either
/// way). Planar input is de-interleaved honoring row and pixel strides.
pub fn to_packed_yuv(raw: &RawImage<'_>) -> Result<Bytes, ConvertError> {
    let w = raw.width as usize;
    let h = raw.height as usize;
    let expected = w * h * 3 / 2;

    match &raw.layout {
        RawLayout::SemiPlanar { data } => {
            if data.len() < expected {
                return Err(ConvertError::ShortBuffer {
                    expected,
                    actual: data.len(),
                });
            }
            Ok(Bytes::copy_from_slice(&data[..expected]))
        }
        RawLayout::Planar { y, u, v } => {
            check_plane(y, w, h, "luma")?;
            check_plane(u, w / 2, h / 2, "chroma-u")?;
            check_plane(v, w / 2, h / 2, "chroma-v")?;

            let mut out = Vec::with_capacity(expected);
            for row in 0..h {
                let base = row * y.row_stride;
                if y.pixel_stride == 1 {
                    out.extend_from_slice(&y.data[base..base + w]);
                } else {
                    for col in 0..w {
                        out.push(y.data[base + col * y.pixel_stride]);
                    }
                }
            }
            // Chroma comes out V first, then U, per 2x2 block.
            for row in 0..h / 2 {
                for col in 0..w / 2 {
                    out.push(v.data[row * v.row_stride + col * v.pixel_stride]);
                    out.push(u.data[row * u.row_stride + col * u.pixel_stride]);
                }
            }
            Ok(Bytes::from(out))
        }
    }
}

fn check_plane(
    plane: &RawPlane<'_>,
    cols: usize,
    rows: usize,
    name: &str,
) -> Result<(), ConvertError> {
    if plane.pixel_stride == 0 || plane.pixel_stride > 2 {
        return Err(ConvertError::UnsupportedLayout(format!(
            "{name} plane has pixel stride {}",
            plane.pixel_stride
        )));
    }
    if rows == 0 || cols == 0 {
        return Err(ConvertError::UnsupportedLayout(format!(
            "{name} plane is empty"
        )));
    }
    let needed = (rows - 1) * plane.row_stride + (cols - 1) * plane.pixel_stride + 1;
    if plane.data.len() < needed {
        return Err(ConvertError::ShortBuffer {
            expected: needed,
            actual: plane.data.len(),
        });
    }
    Ok(())
}

/// Convert an RGBA bitmap to the packed YUV layout, padding the width up
/// to the next multiple of 8 by repeating the rightmost column. Uses the
/// fixed-point BT.601 studio-swing matrix.
pub fn rgba_to_packed_yuv(img: &RgbaImage) -> OverlayImage {
    let w = img.width();
    let h = img.height();
    let padded = (w + 7) & !7;

    let mut out = Vec::with_capacity((padded * h + padded * h.div_ceil(2)) as usize);

    for row in 0..h {
        for col in 0..padded {
            let px = img.get_pixel(col.min(w - 1), row);
            let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);
            let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            out.push(y.clamp(0, 255) as u8);
        }
    }
    for row in (0..h).step_by(2) {
        for col in (0..padded).step_by(2) {
            let px = img.get_pixel(col.min(w - 1), row);
            let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);
            let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
            let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
            out.push(v.clamp(0, 255) as u8);
            out.push(u.clamp(0, 255) as u8);
        }
    }

    OverlayImage {
        width: padded,
        height: h,
        data: Bytes::from(out),
    }
}

/// Center-crop dimensions of a source image against a viewport aspect
/// ratio. The longer dimension is cropped, never letterboxed.
pub fn crop_to_ratio(src_w: u32, src_h: u32, target_ratio: f32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 || !target_ratio.is_finite() || target_ratio <= 0.0 {
        return (src_w, src_h);
    }
    let src_ratio = src_w as f32 / src_h as f32;
    if target_ratio > src_ratio {
        let h = (src_w as f32 / target_ratio).round() as u32;
        (src_w, h.clamp(1, src_h))
    } else {
        let w = (src_h as f32 * target_ratio).round() as u32;
        (w.clamp(1, src_w), src_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Facing;

    fn raw_semi(w: u32, h: u32, data: &[u8]) -> RawImage<'_> {
        RawImage {
            width: w,
            height: h,
            rotation: 0,
            facing: Facing::Back,
            layout: RawLayout::SemiPlanar { data },
        }
    }

    #[test]
    fn semi_planar_copies_exactly_one_frame() {
        let mut data = vec![7u8; 4 * 2 * 3 / 2];
        data.extend_from_slice(&[0xAA; 16]); // trailing driver padding
        let out = to_packed_yuv(&raw_semi(4, 2, &data)).unwrap();
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|&b| b == 7));
    }

    #[test]
    fn semi_planar_short_buffer_is_rejected() {
        let data = vec![0u8; 10];
        let err = to_packed_yuv(&raw_semi(4, 2, &data)).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::ShortBuffer {
                expected: 12,
                actual: 10
            }
        ));
    }

    #[test]
    fn planar_deinterleave_honors_strides() {
        // 4x2 image: luma rows padded to stride 6, chroma planes with
        // pixel stride 2 (every other byte belongs to the sibling plane).
        let y = [1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0];
        let u = [10, 0, 11, 0];
        let v = [20, 0, 21, 0];
        let raw = RawImage {
            width: 4,
            height: 2,
            rotation: 0,
            facing: Facing::Back,
            layout: RawLayout::Planar {
                y: RawPlane {
                    data: &y,
                    row_stride: 6,
                    pixel_stride: 1,
                },
                u: RawPlane {
                    data: &u,
                    row_stride: 4,
                    pixel_stride: 2,
                },
                v: RawPlane {
                    data: &v,
                    row_stride: 4,
                    pixel_stride: 2,
                },
            },
        };
        let out = to_packed_yuv(&raw).unwrap();
        assert_eq!(&out[..], &[1, 2, 3, 4, 5, 6, 7, 8, 20, 10, 21, 11]);
    }

    #[test]
    fn planar_weird_pixel_stride_is_fatal() {
        let data = vec![0u8; 64];
        let plane = |ps| RawPlane {
            data: &data,
            row_stride: 8,
            pixel_stride: ps,
        };
        let raw = RawImage {
            width: 4,
            height: 2,
            rotation: 0,
            facing: Facing::Back,
            layout: RawLayout::Planar {
                y: plane(1),
                u: plane(3),
                v: plane(3),
            },
        };
        assert!(matches!(
            to_packed_yuv(&raw).unwrap_err(),
            ConvertError::UnsupportedLayout(_)
        ));
    }

    #[test]
    fn overlay_width_pads_to_multiple_of_eight() {
        let img = RgbaImage::from_pixel(10, 4, image::Rgba([128, 128, 128, 255]));
        let ov = rgba_to_packed_yuv(&img);
        assert_eq!(ov.width, 16);
        assert_eq!(ov.height, 4);
        assert_eq!(ov.data.len(), (16 * 4 + 16 * 2) as usize);
    }

    #[test]
    fn overlay_round_trips_within_two() {
        // Uniform color so chroma subsampling is exact; mid-range values
        // so nothing clamps.
        for &(r, g, b) in &[(200u8, 40u8, 90u8), (30, 180, 60), (90, 90, 200)] {
            let img = RgbaImage::from_pixel(8, 2, image::Rgba([r, g, b, 255]));
            let ov = rgba_to_packed_yuv(&img);
            let y = ov.data[0] as f32;
            let v = ov.data[(ov.width * ov.height) as usize] as f32;
            let u = ov.data[(ov.width * ov.height) as usize + 1] as f32;

            let c = y - 16.0;
            let d = u - 128.0;
            let e = v - 128.0;
            let rr = 1.164 * c + 1.596 * e;
            let gg = 1.164 * c - 0.392 * d - 0.813 * e;
            let bb = 1.164 * c + 2.017 * d;
            assert!((rr - r as f32).abs() <= 2.0, "r: {rr} vs {r}");
            assert!((gg - g as f32).abs() <= 2.0, "g: {gg} vs {g}");
            assert!((bb - b as f32).abs() <= 2.0, "b: {bb} vs {b}");
        }
    }

    #[test]
    fn crop_narrows_the_longer_dimension() {
        // Wider viewport than source: height is cropped.
        assert_eq!(crop_to_ratio(720, 1280, 1.0), (720, 720));
        // Taller viewport than source: width is cropped.
        assert_eq!(crop_to_ratio(1280, 720, 1.0), (720, 720));
        // Matching ratio: untouched.
        assert_eq!(crop_to_ratio(1280, 720, 1280.0 / 720.0), (1280, 720));
        // 9:16 viewport over a landscape source.
        assert_eq!(crop_to_ratio(1280, 720, 9.0 / 16.0), (405, 720));
    }

    #[test]
    fn crop_degenerate_inputs_pass_through() {
        assert_eq!(crop_to_ratio(0, 720, 1.0), (0, 720));
        assert_eq!(crop_to_ratio(1280, 720, 0.0), (1280, 720));
        assert_eq!(crop_to_ratio(1280, 720, f32::NAN), (1280, 720));
    }
}
