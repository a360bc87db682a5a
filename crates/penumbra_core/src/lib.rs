pub mod camera;
pub mod config;
pub mod input;
pub mod time;

pub use camera::{Camera, MovementDirections};
pub use config::{ConfigError, DemoConfig, RenderMode, ShadowTechnique};
pub use input::*;
pub use time::Time;
