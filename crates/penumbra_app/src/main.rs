use std::sync::Arc;

use glam::{Vec2, Vec3};
use log::{error, info};
use penumbra_core::{
    Camera, DemoConfig, Input, KeyCode, MouseButton, MovementDirections, RenderMode, ShadowTechnique,
    camera::{DEFAULT_MOVEMENT_SPEED, TURBO_MOVEMENT_SPEED},
    config::CONFIG_FILE,
};
use penumbra_renderer::{FrameOrchestrator, MAX_INSTANCES, RenderError};
use penumbra_window::{EXIT_FAILURE, FrameControl, WindowSettings, run_penumbra_app};
use winit::window::Window;

const DEFAULT_FOV: f32 = 45.0;
const MIN_FOV: f32 = 5.0;
const MAX_FOV: f32 = 179.0;
const MSAA_SAMPLES: u32 = 4;

const RESET_POSITION: Vec3 = Vec3::new(-3.0, 3.0, -5.0);

const MOVEMENT_KEYS: [(KeyCode, MovementDirections); 6] = [
    (KeyCode::KeyW, MovementDirections::FORWARD),
    (KeyCode::KeyS, MovementDirections::BACKWARD),
    (KeyCode::KeyA, MovementDirections::LEFT),
    (KeyCode::KeyD, MovementDirections::RIGHT),
    (KeyCode::KeyR, MovementDirections::UP),
    (KeyCode::KeyF, MovementDirections::DOWN),
];

struct PenumbraApp {
    config: DemoConfig,
    camera: Camera,
    render_mode: RenderMode,
    animate: bool,
    carmack_reverse: bool,
    technique: ShadowTechnique,
    renderer: Option<FrameOrchestrator>,
}

impl PenumbraApp {
    fn new(config: DemoConfig) -> Self {
        let mut app = Self {
            camera: Camera::default(),
            render_mode: config.render_mode(),
            animate: config.animate,
            carmack_reverse: config.carmack_reverse,
            technique: config.technique,
            renderer: None,
            config,
        };
        app.reset_camera();
        app
    }

    fn reset_camera(&mut self) {
        let aspect = self.config.window_width as f32 / self.config.window_height.max(1) as f32;
        self.camera
            .set_projection(self.config.fov, aspect, self.config.near, self.config.far);
        self.camera.set_transformation(RESET_POSITION, Vec3::ZERO, Vec3::Y);
    }

    fn set_fov(&mut self, fov_degrees: f32) {
        let Camera {
            aspect_ratio, near, far, ..
        } = self.camera;
        self.camera
            .set_projection(fov_degrees.clamp(MIN_FOV, MAX_FOV), aspect_ratio, near, far);
    }

    fn handle_toggles(&mut self, input: &Input) {
        if input.just_pressed(KeyCode::F1) {
            let supported = self
                .renderer
                .as_ref()
                .is_some_and(|renderer| renderer.supports_msaa(MSAA_SAMPLES));
            if self.render_mode.msaa_level > 1 {
                self.render_mode.msaa_level = 1;
            } else if supported {
                self.render_mode.msaa_level = MSAA_SAMPLES;
            } else {
                info!("{MSAA_SAMPLES}x MSAA is not supported");
            }
        }
        if input.just_pressed(KeyCode::F2) {
            self.render_mode.wireframe = !self.render_mode.wireframe;
            info!("Wireframe: {}", self.render_mode.wireframe);
        }
        if input.just_pressed(KeyCode::F3) {
            self.render_mode.vsync = !self.render_mode.vsync;
        }
        if input.just_pressed(KeyCode::F4) {
            self.render_mode.tonemapping = !self.render_mode.tonemapping;
            info!("Tonemapping: {}", self.render_mode.tonemapping);
        }
        if input.just_pressed(KeyCode::F5) {
            self.animate = !self.animate;
        }
        if input.just_pressed(KeyCode::F6) {
            self.carmack_reverse = !self.carmack_reverse;
            info!("Carmack's reverse: {}", self.carmack_reverse);
        }
        if input.just_pressed(KeyCode::F7) {
            self.technique = self.technique.toggled();
            info!("Shadow technique: {:?}", self.technique);
        }

        let fov = self.camera.fov_degrees();
        if input.just_pressed(KeyCode::Equal) || input.just_pressed(KeyCode::NumpadAdd) {
            self.set_fov(fov.round() - 1.0);
        }
        if input.just_pressed(KeyCode::Minus) || input.just_pressed(KeyCode::NumpadSubtract) {
            self.set_fov(fov.round() + 1.0);
        }
        if input.just_pressed(KeyCode::Backspace) {
            self.set_fov(DEFAULT_FOV);
        }
        if input.just_pressed(KeyCode::Enter) {
            self.reset_camera();
        }
    }

    fn move_camera(&mut self, input: &Input, dt: f32) {
        let directions = MOVEMENT_KEYS
            .iter()
            .filter(|(key, _)| input.is_pressed(*key))
            .fold(MovementDirections::empty(), |acc, (_, dir)| acc | *dir);

        let speed = if input.is_pressed(KeyCode::ShiftLeft) {
            TURBO_MOVEMENT_SPEED
        } else {
            DEFAULT_MOVEMENT_SPEED
        };
        self.camera.set_movement_speed(speed);

        // Look only while the right button is held
        let look = if input.is_mouse_pressed(MouseButton::Right) {
            input.mouse_delta()
        } else {
            Vec2::ZERO
        };
        self.camera.move_by(directions, look, dt);
    }
}

impl penumbra_window::AppHandler for PenumbraApp {
    type Error = RenderError;

    fn init(&mut self, window: Arc<Window>) -> Result<(), Self::Error> {
        let size = window.inner_size();
        let renderer = FrameOrchestrator::new(window, &self.config)?;
        self.renderer = Some(renderer);
        self.resize(size.width, size.height);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.camera.aspect_ratio = width as f32 / height as f32;
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(width, height);
        }
    }

    fn frame(&mut self, input: &Input, dt: f32) -> Result<FrameControl, Self::Error> {
        if input.just_pressed(KeyCode::Escape) {
            return Ok(FrameControl::Exit);
        }

        self.handle_toggles(input);
        self.move_camera(input, dt);

        let Some(renderer) = &mut self.renderer else {
            return Ok(FrameControl::Continue);
        };
        renderer.update(dt, self.animate);
        renderer.render(&self.camera, &self.render_mode, self.carmack_reverse, self.technique)?;

        Ok(FrameControl::Continue)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DemoConfig::load_or_default(CONFIG_FILE).sanitized(MAX_INSTANCES);
    let settings = WindowSettings {
        title: "Penumbra".to_string(),
        width: config.window_width,
        height: config.window_height,
    };

    let code = match run_penumbra_app(PenumbraApp::new(config), settings) {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}
