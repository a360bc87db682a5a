use glam::{Mat4, Vec3, Vec4};

/// Lissajous-style path every light follows.
pub fn lissajous(params: Vec4, t: f32) -> Vec3 {
    Vec3::new(
        (params.x * t).sin(),
        (params.y * t).cos(),
        (params.z * t).sin() * (params.w * t).cos(),
    )
}

pub const LIGHT_PATH_SCALE: Vec3 = Vec3::new(13.0, 2.0, 13.0);
pub const LIGHT_PATH_OFFSET: Vec3 = Vec3::new(0.0, 3.0, 0.0);

pub const SPOT_INNER_ANGLE: f32 = 12.5f32.to_radians();
pub const SPOT_OUTER_ANGLE: f32 = 17.5f32.to_radians();

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    /// rgb = intensity, w = ambient weight
    pub color: Vec4,
    pub movement: Vec4,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub color: Vec4,
    pub movement: Vec4,
    /// Unit vector towards the origin.
    pub direction: Vec3,
    pub inner_angle: f32,
    pub outer_angle: f32,
}

impl SpotLight {
    pub fn new(position: Vec3, color: Vec4, movement: Vec4) -> Self {
        let mut light = Self {
            position,
            color,
            movement,
            direction: Vec3::NEG_Y,
            inner_angle: SPOT_INNER_ANGLE,
            outer_angle: SPOT_OUTER_ANGLE,
        };
        light.aim_at_origin();
        light
    }

    pub fn aim_at_origin(&mut self) {
        self.direction = (-self.position).normalize_or(Vec3::NEG_Y);
    }
}

/// Which shadow map, if any, the lit program samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowLookup {
    None,
    Cube,
    Spot,
}

impl ShadowLookup {
    pub fn shader_code(self) -> f32 {
        match self {
            ShadowLookup::None => 0.0,
            ShadowLookup::Cube => 1.0,
            ShadowLookup::Spot => 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotCone {
    pub direction: Vec3,
    pub cos_inner: f32,
    pub cos_outer: f32,
}

/// Everything a pass needs to know about the light it is drawing for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec4,
    pub cone: Option<SpotCone>,
    pub shadow: ShadowLookup,
    /// Light view-projection for the spot shadow map lookup.
    pub light_view_proj: Mat4,
    pub shadow_far: f32,
}

impl LightParams {
    pub fn point(light: &PointLight) -> Self {
        Self {
            position: light.position,
            color: light.color,
            cone: None,
            shadow: ShadowLookup::None,
            light_view_proj: Mat4::IDENTITY,
            shadow_far: 1.0,
        }
    }

    pub fn spot(light: &SpotLight) -> Self {
        Self {
            position: light.position,
            color: light.color,
            cone: Some(SpotCone {
                direction: light.direction,
                cos_inner: light.inner_angle.cos(),
                cos_outer: light.outer_angle.cos(),
            }),
            shadow: ShadowLookup::None,
            light_view_proj: Mat4::IDENTITY,
            shadow_far: 1.0,
        }
    }

    pub fn with_shadow(mut self, shadow: ShadowLookup, light_view_proj: Mat4, far: f32) -> Self {
        self.shadow = shadow;
        self.light_view_proj = light_view_proj;
        self.shadow_far = far;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lissajous_at_zero() {
        let p = lissajous(Vec4::new(1.3, -0.4, 2.0, 0.7), 0.0);
        assert_eq!(p, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn lissajous_components() {
        let params = Vec4::new(1.0, 2.0, 0.5, 0.25);
        let t = 0.8;
        let p = lissajous(params, t);
        assert_relative_eq!(p.x, 0.8f32.sin());
        assert_relative_eq!(p.y, 1.6f32.cos());
        assert_relative_eq!(p.z, 0.4f32.sin() * 0.2f32.cos());
    }

    #[test]
    fn spot_light_points_at_origin() {
        let light = SpotLight::new(Vec3::new(4.0, 3.0, 0.0), Vec4::ONE, Vec4::ZERO);
        assert_relative_eq!(light.direction.x, -0.8);
        assert_relative_eq!(light.direction.y, -0.6);
        assert_relative_eq!(light.direction.length(), 1.0);
    }

    #[test]
    fn spot_params_carry_cone_cosines() {
        let light = SpotLight::new(Vec3::Y, Vec4::ONE, Vec4::ZERO);
        let params = LightParams::spot(&light);
        let cone = params.cone.unwrap();
        assert!(cone.cos_inner > cone.cos_outer);
        assert_relative_eq!(cone.cos_outer, 17.5f32.to_radians().cos());
        assert_eq!(params.shadow, ShadowLookup::None);
    }
}
