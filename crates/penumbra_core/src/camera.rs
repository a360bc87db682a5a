use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3};

bitflags! {
    /// Keys currently steering the camera, sampled once per frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MovementDirections: u8 {
        const FORWARD  = 1 << 0;
        const BACKWARD = 1 << 1;
        const LEFT     = 1 << 2;
        const RIGHT    = 1 << 3;
        const UP       = 1 << 4;
        const DOWN     = 1 << 5;
    }
}

pub const DEFAULT_MOVEMENT_SPEED: f32 = 5.0;
pub const TURBO_MOVEMENT_SPEED: f32 = 50.0;

// Radians per pixel of mouse travel
const MOUSE_SENSITIVITY: f32 = 0.0025;
const PITCH_LIMIT: f32 = 89.0f32.to_radians();

/// Free-flying perspective camera.
#[derive(Clone, Debug)]
pub struct Camera {
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    position: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
    movement_speed: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov: 45.0f32.to_radians(),
            aspect_ratio: 4.0 / 3.0, // 800x600 window
            near: 0.1,
            far: 1000.1,
            position: Vec3::ZERO,
            world_up: Vec3::Y,
            yaw: -std::f32::consts::FRAC_PI_2,
            pitch: 0.0,
            movement_speed: DEFAULT_MOVEMENT_SPEED,
        }
    }
}

impl Camera {
    /// Sets the perspective parameters. `fov_degrees` is the vertical field of view.
    pub fn set_projection(&mut self, fov_degrees: f32, aspect_ratio: f32, near: f32, far: f32) {
        self.fov = fov_degrees.to_radians();
        self.aspect_ratio = aspect_ratio;
        self.near = near;
        self.far = far;
    }

    /// Places the camera at `position` looking at `target`.
    pub fn set_transformation(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        let forward = (target - position).normalize_or(Vec3::NEG_Z);
        self.position = position;
        self.world_up = up.normalize_or(Vec3::Y);
        self.yaw = forward.z.atan2(forward.x);
        self.pitch = forward.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn set_movement_speed(&mut self, speed: f32) {
        self.movement_speed = speed;
    }

    pub fn movement_speed(&self) -> f32 {
        self.movement_speed
    }

    pub fn fov_degrees(&self) -> f32 {
        self.fov.to_degrees()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.pitch.cos() * self.yaw.cos(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.sin(),
        )
    }

    /// Applies one frame of fly movement. `mouse_delta` rotates the view (pixels),
    /// `directions` translates along the view axes scaled by `dt`.
    pub fn move_by(&mut self, directions: MovementDirections, mouse_delta: Vec2, dt: f32) {
        self.yaw += mouse_delta.x * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - mouse_delta.y * MOUSE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let forward = self.forward();
        let right = forward.cross(self.world_up).normalize_or(Vec3::X);

        let mut offset = Vec3::ZERO;
        if directions.contains(MovementDirections::FORWARD) {
            offset += forward;
        }
        if directions.contains(MovementDirections::BACKWARD) {
            offset -= forward;
        }
        if directions.contains(MovementDirections::RIGHT) {
            offset += right;
        }
        if directions.contains(MovementDirections::LEFT) {
            offset -= right;
        }
        if directions.contains(MovementDirections::UP) {
            offset += self.world_up;
        }
        if directions.contains(MovementDirections::DOWN) {
            offset -= self.world_up;
        }

        self.position += offset.normalize_or_zero() * self.movement_speed * dt;
    }

    pub fn world_to_view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.world_up)
    }

    pub fn view_to_world(&self) -> Mat4 {
        self.world_to_view().inverse()
    }

    /// Computes the "Projection Matrix" (View -> Clip)
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reset_camera() -> Camera {
        let mut camera = Camera::default();
        camera.set_projection(45.0, 800.0 / 600.0, 0.1, 1000.1);
        camera.set_transformation(Vec3::new(-3.0, 3.0, -5.0), Vec3::ZERO, Vec3::Y);
        camera
    }

    #[test]
    fn target_lands_on_negative_view_z() {
        let camera = reset_camera();
        let target_vs = camera.world_to_view().transform_point3(Vec3::ZERO);

        assert_relative_eq!(target_vs.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(target_vs.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(target_vs.z, -Vec3::new(-3.0, 3.0, -5.0).length(), epsilon = 1e-4);
    }

    #[test]
    fn view_to_world_recovers_position() {
        let camera = reset_camera();
        let eye = camera.view_to_world().w_axis.truncate();

        assert_relative_eq!(eye.x, -3.0, epsilon = 1e-4);
        assert_relative_eq!(eye.y, 3.0, epsilon = 1e-4);
        assert_relative_eq!(eye.z, -5.0, epsilon = 1e-4);
    }

    #[test]
    fn forward_movement_scales_with_speed() {
        let mut camera = reset_camera();
        let start = camera.position();
        camera.move_by(MovementDirections::FORWARD, Vec2::ZERO, 0.5);
        assert_relative_eq!((camera.position() - start).length(), DEFAULT_MOVEMENT_SPEED * 0.5, epsilon = 1e-4);

        camera.set_movement_speed(TURBO_MOVEMENT_SPEED);
        let start = camera.position();
        camera.move_by(MovementDirections::FORWARD, Vec2::ZERO, 0.1);
        assert_relative_eq!((camera.position() - start).length(), 5.0, epsilon = 1e-4);
    }

    #[test]
    fn opposite_directions_cancel() {
        let mut camera = reset_camera();
        let start = camera.position();
        camera.move_by(MovementDirections::LEFT | MovementDirections::RIGHT, Vec2::ZERO, 1.0);
        assert_relative_eq!(camera.position().distance(start), 0.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = reset_camera();
        camera.move_by(MovementDirections::empty(), Vec2::new(0.0, -100_000.0), 0.016);
        assert!(camera.forward().y < 1.0);
        assert!(camera.forward().y > 0.99);
    }

    #[test]
    fn fov_round_trips_through_degrees() {
        let camera = reset_camera();
        assert_relative_eq!(camera.fov_degrees(), 45.0, epsilon = 1e-4);
    }
}
