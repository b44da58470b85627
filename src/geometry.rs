//! Screen-space landmarks to camera/world space, and rest-pose layout.

use glam::{Affine3A, Vec3};
use serde::{Deserialize, Serialize};

use crate::landmarks::Landmark;

/// Assumed distance of the hand from the camera as a function of landmark z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthModel {
    pub base: f32,
    pub z_gain: f32,
}

impl Default for DepthModel {
    fn default() -> Self {
        Self {
            base: 0.8,
            z_gain: 0.4,
        }
    }
}

impl DepthModel {
    pub fn depth(&self, z: f32) -> f32 {
        self.base + z * self.z_gain
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn aspect(&self) -> f32 {
        if self.width > 0.0 && self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Perspective camera: vertical field of view, aspect and world placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub world: Affine3A,
}

impl CameraModel {
    pub fn new(fov_y_deg: f32, viewport: Viewport) -> Self {
        Self {
            fov_y_deg,
            aspect: viewport.aspect(),
            world: Affine3A::IDENTITY,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.aspect = viewport.aspect();
    }

    fn tan_half_fov(&self) -> f32 {
        (self.fov_y_deg.to_radians() / 2.0).tan()
    }

    /// Frustum-correct point at the assumed hand depth in front of the camera.
    pub fn landmark_to_local(&self, lm: &Landmark, depth: &DepthModel) -> Vec3 {
        let x = (lm.x - 0.5) * 2.0;
        let y = -(lm.y - 0.5) * 2.0;
        let d = depth.depth(lm.z);
        let h = self.tan_half_fov() * d;
        let w = h * self.aspect;
        Vec3::new(x * w, y * h, -d)
    }

    pub fn landmark_to_world(&self, lm: &Landmark, depth: &DepthModel) -> Vec3 {
        self.local_to_world(self.landmark_to_local(lm, depth))
    }

    pub fn local_to_world(&self, p: Vec3) -> Vec3 {
        self.world.transform_point3(p)
    }

    pub fn world_to_local(&self, p: Vec3) -> Vec3 {
        self.world.inverse().transform_point3(p)
    }

    /// Distance along the viewing axis.
    pub fn depth_of(&self, world: Vec3) -> f32 {
        self.world_to_local(world).z.abs()
    }
}

/// Uniformly scaled placement of the grabbed object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObjectTransform {
    pub position: Vec3,
    pub scale: f32,
}

impl ObjectTransform {
    pub fn new(position: Vec3, scale: f32) -> Self {
        Self { position, scale }
    }

    pub fn distance_to(&self, other: &ObjectTransform) -> f32 {
        self.position.distance(other.position)
    }
}

/// Vertical extents of the avatar group at scale 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelBounds {
    pub base_height: f32,
    pub center_y: f32,
    pub head_top_y: f32,
}

impl ModelBounds {
    pub fn from_extents(size_y: f32, center_y: f32) -> Self {
        Self {
            base_height: size_y.max(0.1),
            center_y,
            // some rigs report a zero-height origin; fall back to 40% of height
            head_top_y: (center_y + size_y / 2.0).max(size_y * 0.4),
        }
    }

    /// Vertical offset from the group origin to the top of the head.
    pub fn head_offset(&self, scale: f32) -> f32 {
        if self.head_top_y > 0.0 {
            self.head_top_y * scale
        } else {
            self.base_height * 0.5 * scale
        }
    }
}

impl Default for ModelBounds {
    fn default() -> Self {
        Self::from_extents(0.5, 0.25)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fraction of the view height the avatars should occupy at rest.
    pub target_screen_ratio: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            target_screen_ratio: 0.18,
            min_distance: 1.9,
            max_distance: 4.2,
            min_scale: 0.4,
            max_scale: 0.9,
        }
    }
}

/// Rest pose centered in front of the camera, sized to the viewport.
pub fn layout_rest_pose(
    camera: &CameraModel,
    bounds: &ModelBounds,
    layout: &LayoutConfig,
) -> ObjectTransform {
    let tan_half = camera.tan_half_fov();
    let base_height = bounds.base_height.max(0.1);

    let ideal = base_height / (2.0 * tan_half * layout.target_screen_ratio);
    let distance = ideal.clamp(layout.min_distance, layout.max_distance);

    let desired_height = 2.0 * distance * tan_half * layout.target_screen_ratio;
    let scale = (desired_height / base_height).clamp(layout.min_scale, layout.max_scale);

    let local = Vec3::new(0.0, -bounds.center_y * scale, -distance);
    ObjectTransform::new(camera.local_to_world(local), scale)
}

/// Scale at which the avatar appears as tall as the hand at `distance`.
pub fn scale_for_hand_size(
    hand_size: f32,
    distance: f32,
    camera: &CameraModel,
    bounds: &ModelBounds,
    fallback: f32,
    clamp: (f32, f32),
) -> f32 {
    if bounds.base_height <= 0.0 {
        return fallback;
    }
    let view_height = 2.0 * distance * camera.tan_half_fov();
    let desired = hand_size * view_height;
    (desired / bounds.base_height).clamp(clamp.0, clamp.1)
}
