//! Snapshot persistence: JPEG encoding plus the EXIF orientation tag.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::RgbaImage;
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use tracing::debug;

use crate::error::PhotoError;
use crate::frame::Facing;
use crate::render::Readback;

/// EXIF orientation values.
const NORMAL: u16 = 1;
const FLIP_VERTICAL: u16 = 4;
const TRANSPOSE: u16 = 5;
const ROTATE_90: u16 = 6;
const TRANSVERSE: u16 = 7;
const ROTATE_270: u16 = 8;

/// Map residual rotation and facing to the EXIF orientation a viewer
/// must apply. Front-facing content is mirrored on screen, which folds
/// into the transposed variants.
pub fn orientation_tag(rotation: u32, facing: Facing) -> u16 {
    match (rotation % 360, facing) {
        (90, Facing::Front) => TRANSPOSE,
        (90, Facing::Back) => ROTATE_90,
        (180, _) => FLIP_VERTICAL,
        (270, Facing::Front) => TRANSVERSE,
        (270, Facing::Back) => ROTATE_270,
        _ => NORMAL,
    }
}

/// Encode a readback as a quality-100 JPEG at `path`, then stamp the
/// orientation tag.
pub fn save_jpeg(path: &Path, shot: &Readback) -> Result<(), PhotoError> {
    let rgba = RgbaImage::from_raw(shot.width, shot.height, shot.data.clone())
        .ok_or(PhotoError::BadBuffer)?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, 100).encode_image(&rgb)?;
    std::fs::write(path, &encoded)?;

    let orientation = orientation_tag(shot.rotation, shot.facing);
    if orientation != NORMAL {
        let mut metadata = Metadata::new();
        metadata.set_tag(ExifTag::Orientation(vec![orientation]));
        metadata.write_to_file(path)?;
    }
    debug!(
        path = %path.display(),
        width = shot.width,
        height = shot.height,
        orientation,
        "snapshot saved"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_distinguishes_facing_for_quarter_turns() {
        assert_eq!(orientation_tag(90, Facing::Front), 5);
        assert_eq!(orientation_tag(90, Facing::Back), 6);
        assert_eq!(orientation_tag(270, Facing::Front), 7);
        assert_eq!(orientation_tag(270, Facing::Back), 8);
    }

    #[test]
    fn orientation_ignores_facing_for_half_turn_and_upright() {
        assert_eq!(orientation_tag(180, Facing::Front), 4);
        assert_eq!(orientation_tag(180, Facing::Back), 4);
        assert_eq!(orientation_tag(0, Facing::Front), 1);
        assert_eq!(orientation_tag(0, Facing::Back), 1);
        assert_eq!(orientation_tag(360, Facing::Back), 1);
    }

    #[test]
    fn save_writes_a_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        let shot = Readback {
            data: vec![200u8; 4 * 4 * 4],
            width: 4,
            height: 4,
            rotation: 90,
            facing: Facing::Back,
        };
        save_jpeg(&path, &shot).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 4);
    }

    #[test]
    fn save_rejects_a_mismatched_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jpg");
        let shot = Readback {
            data: vec![0u8; 7],
            width: 4,
            height: 4,
            rotation: 0,
            facing: Facing::Back,
        };
        assert!(matches!(
            save_jpeg(&path, &shot),
            Err(PhotoError::BadBuffer)
        ));
    }
}
