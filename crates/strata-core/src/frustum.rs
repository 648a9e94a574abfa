//! View frustum visibility tests

use crate::bounds::Aabb;
use glam::{Mat4, Vec3, Vec4};

/// A visibility predicate for bounding boxes.
///
/// Implementations may be conservative (report a hidden box as visible) but must
/// never reject a box that is actually in view.
pub trait Frustum {
    fn is_box_visible(&self, aabb: &Aabb) -> bool;
}

impl<F> Frustum for F
where
    F: Fn(&Aabb) -> bool,
{
    fn is_box_visible(&self, aabb: &Aabb) -> bool {
        self(aabb)
    }
}

/// Accepts every box. Useful for shadow passes and tools.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCulling;

impl Frustum for NoCulling {
    fn is_box_visible(&self, _aabb: &Aabb) -> bool {
        true
    }
}

/// Six clip planes extracted from a view-projection matrix.
///
/// Planes face inward and are stored as `(normal, distance)` in a `Vec4`, so a point
/// `p` is inside a plane when `normal.dot(p) + distance >= 0`. Assumes a `[0, 1]`
/// clip-space depth range (wgpu, D3D, Vulkan).
#[derive(Clone, Copy, Debug)]
pub struct ViewFrustum {
    planes: [Vec4; 6],
}

impl ViewFrustum {
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ]
        .map(normalize_plane);

        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(p) + plane.w >= 0.0)
    }
}

impl Frustum for ViewFrustum {
    fn is_box_visible(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        for plane in &self.planes {
            let normal = plane.truncate();
            // Corner furthest along the plane normal
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            if normal.dot(positive) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 {
        plane / len
    } else {
        plane
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_looking_down_negative_z() -> ViewFrustum {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        ViewFrustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn box_in_front_is_visible() {
        let f = camera_looking_down_negative_z();
        let b = Aabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        assert!(f.is_box_visible(&b));
    }

    #[test]
    fn box_behind_is_culled() {
        let f = camera_looking_down_negative_z();
        let b = Aabb::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        assert!(!f.is_box_visible(&b));
    }

    #[test]
    fn box_beyond_far_plane_is_culled() {
        let f = camera_looking_down_negative_z();
        let b = Aabb::new(Vec3::new(-1.0, -1.0, -300.0), Vec3::new(1.0, 1.0, -200.0));
        assert!(!f.is_box_visible(&b));
    }

    #[test]
    fn box_far_to_the_side_is_culled() {
        let f = camera_looking_down_negative_z();
        let b = Aabb::new(Vec3::new(50.0, -1.0, -11.0), Vec3::new(52.0, 1.0, -9.0));
        assert!(!f.is_box_visible(&b));
    }

    #[test]
    fn box_straddling_the_camera_is_visible() {
        let f = camera_looking_down_negative_z();
        let b = Aabb::new(Vec3::splat(-5.0), Vec3::splat(5.0));
        assert!(f.is_box_visible(&b));
    }

    #[test]
    fn point_containment() {
        let f = camera_looking_down_negative_z();
        assert!(f.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn closures_act_as_frustums() {
        let only_positive_x = |b: &Aabb| b.max.x > 0.0;
        let left = Aabb::new(Vec3::splat(-2.0), Vec3::splat(-1.0));
        let right = Aabb::new(Vec3::splat(1.0), Vec3::splat(2.0));
        assert!(!only_positive_x.is_box_visible(&left));
        assert!(only_positive_x.is_box_visible(&right));
        assert!(NoCulling.is_box_visible(&left));
    }
}
