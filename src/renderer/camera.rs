use ash::vk;
use glam::{Mat4, Vec3};
use crate::renderer::shader_data::UniformBufferObject;

/// Fixed camera looking at the origin from above one corner, with Z pointing up
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
    spin_deg_per_sec: f32,
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 45.0;

    pub fn new() -> Self {
        Self {
            position: Vec3::new(2.0, 2.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 10.0,
            spin_deg_per_sec: 90.0,
        }
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn get_proj_mat(&self, extent: vk::Extent2D) -> Mat4 {
        let aspect_ratio = extent.width.max(1) as f32 / extent.height.max(1) as f32;
        Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        )
    }

    /// Model spins around the Z axis as time passes
    pub fn get_model_mat(&self, elapsed_secs: f32) -> Mat4 {
        Mat4::from_rotation_z(elapsed_secs * self.spin_deg_per_sec.to_radians())
    }

    pub fn uniforms_at(&self, elapsed_secs: f32, extent: vk::Extent2D) -> UniformBufferObject {
        UniformBufferObject {
            model: self.get_model_mat(elapsed_secs),
            view: self.get_view_mat(),
            proj: self.get_proj_mat(extent),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_is_identity_at_start() {
        let camera = Camera::new();
        let ubo = camera.uniforms_at(0.0, vk::Extent2D { width: 800, height: 600 });
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn one_second_is_a_quarter_turn() {
        let camera = Camera::new();
        let rotated = camera.get_model_mat(1.0).transform_point3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn projection_follows_aspect_ratio() {
        let camera = Camera::new();
        let proj = camera.get_proj_mat(vk::Extent2D { width: 800, height: 600 });
        let aspect = proj.y_axis.y / proj.x_axis.x;
        assert!((aspect - 800.0 / 600.0).abs() < 1e-5);
    }

    #[test]
    fn zero_height_does_not_produce_nan() {
        let camera = Camera::new();
        let proj = camera.get_proj_mat(vk::Extent2D { width: 800, height: 0 });
        assert!(!proj.is_nan());
    }
}
