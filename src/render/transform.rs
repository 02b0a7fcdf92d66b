//! Model-view-projection composition for the preview quad.

use glam::{Mat4, Vec3};

/// Base projection that center-crops the image to the viewport: the
/// shorter-relative axis of the quad is stretched so the image always
/// fills the viewport and the excess is clipped.
pub fn center_crop(view_w: u32, view_h: u32, image_w: u32, image_h: u32) -> Mat4 {
    if view_w == 0 || view_h == 0 || image_w == 0 || image_h == 0 {
        return Mat4::IDENTITY;
    }
    let scale = (view_w as f32 * image_h as f32) / (view_h as f32 * image_w as f32);
    if scale > 1.0 {
        Mat4::from_scale(Vec3::new(1.0, scale, 1.0))
    } else {
        Mat4::from_scale(Vec3::new(1.0 / scale, 1.0, 1.0))
    }
}

/// Compose the per-frame transform: sensor rotation is undone by rotating
/// the quad the remaining way around Z, and front-facing content is
/// mirrored by flipping around X.
pub fn frame_transform(base: Mat4, rotation: u32, mirror: bool) -> Mat4 {
    let mut mvp = base;
    if rotation % 360 != 0 {
        let degrees = (360 - rotation % 360) as f32;
        mvp *= Mat4::from_rotation_z(degrees.to_radians());
    }
    if mirror {
        mvp *= Mat4::from_rotation_x(180f32.to_radians());
    }
    mvp
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn assert_close(a: Vec4, b: Vec4) {
        assert!((a - b).length() < 1e-4, "{a:?} vs {b:?}");
    }

    #[test]
    fn center_crop_stretches_the_cropped_axis() {
        // Landscape image in a square viewport: vertical crop, X stretch.
        let m = center_crop(720, 720, 1280, 720);
        let p = m * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!(p.x > 1.0);
        assert!((p.y - 1.0).abs() < 1e-4);

        // Portrait image in a landscape viewport: horizontal crop, Y stretch.
        let m = center_crop(1280, 720, 720, 1280);
        let p = m * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!(p.y > 1.0);
        assert!((p.x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn center_crop_matching_ratio_is_identity() {
        let m = center_crop(1280, 720, 1280, 720);
        assert_close(
            m * Vec4::new(0.5, -0.5, 0.0, 1.0),
            Vec4::new(0.5, -0.5, 0.0, 1.0),
        );
    }

    #[test]
    fn rotation_is_undone_the_remaining_way_around() {
        // 90 degree content is rotated a further 270: x,y -> y,-x.
        let m = frame_transform(Mat4::IDENTITY, 90, false);
        assert_close(
            m * Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(0.0, -1.0, 0.0, 1.0),
        );

        let m = frame_transform(Mat4::IDENTITY, 180, false);
        assert_close(
            m * Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(-1.0, 0.0, 0.0, 1.0),
        );

        let m = frame_transform(Mat4::IDENTITY, 0, false);
        assert_close(
            m * Vec4::new(1.0, 1.0, 0.0, 1.0),
            Vec4::new(1.0, 1.0, 0.0, 1.0),
        );
    }

    #[test]
    fn mirror_flips_around_x() {
        let m = frame_transform(Mat4::IDENTITY, 0, true);
        assert_close(
            m * Vec4::new(0.0, 1.0, 0.0, 1.0),
            Vec4::new(0.0, -1.0, 0.0, 1.0),
        );
    }
}
