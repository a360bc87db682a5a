use std::sync::Arc;

use glam::Vec2;
use log::{error, info};
use penumbra_core::{Input, time::Time};
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

/// Exit code reported when the app fails to initialize.
pub const EXIT_FAILURE: i32 = -1;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

#[derive(Clone, Debug)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// What the runner should do after a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameControl {
    Continue,
    Exit,
}

/// The application driven by the event loop. All calls happen on the loop thread.
pub trait AppHandler {
    type Error: std::fmt::Display;

    /// Called once, after the window exists.
    fn init(&mut self, window: Arc<Window>) -> Result<(), Self::Error>;

    fn resize(&mut self, width: u32, height: u32);

    /// Runs one frame. Errors returned here are fatal.
    fn frame(&mut self, input: &Input, dt: f32) -> Result<FrameControl, Self::Error>;
}

// The State Machine that holds the App while waiting for the OS
struct PenumbraRunner<A: AppHandler> {
    app: A,
    settings: WindowSettings,
    window: Option<Arc<Window>>,
    input: Input,
    time: Time,
    exit_code: i32,
}

impl<A: AppHandler> PenumbraRunner<A> {
    fn new(app: A, settings: WindowSettings) -> Self {
        Self {
            app,
            settings,
            window: None,
            input: Input::default(),
            time: Time::default(),
            exit_code: 0,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, message: impl std::fmt::Display) {
        error!("{message}");
        self.exit_code = EXIT_FAILURE;
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.clone() else {
            return;
        };

        // 1. Tick the Clock manually
        self.time.update();
        let dt = self.time.delta_seconds();

        // 2. Run the frame
        match self.app.frame(&self.input, dt) {
            Ok(FrameControl::Continue) => {}
            Ok(FrameControl::Exit) => event_loop.exit(),
            Err(err) => self.fail(event_loop, format!("Frame failed: {err}")),
        }
        self.input.end_frame();

        // 3. Report frame time
        window.set_title(&format!("{} | {}", self.settings.title, self.time.frame_stats()));
    }
}

impl<A: AppHandler> ApplicationHandler for PenumbraRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(LogicalSize::new(self.settings.width, self.settings.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, format!("Failed to create window: {err}")),
        };

        if let Err(err) = self.app.init(window.clone()) {
            return self.fail(event_loop, format!("Initialization failed: {err}"));
        }
        self.window = Some(window);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: winit::keyboard::PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => match state {
                ElementState::Pressed => self.input.press(code),
                ElementState::Released => self.input.release(code),
            },
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.input.press_mouse(button),
                ElementState::Released => self.input.release_mouse(button),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.input.move_cursor(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::Resized(size) => self.app.resize(size.width, size.height),
            WindowEvent::CloseRequested => {
                info!("The close button was pressed; stopping");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => (),
        }
    }
}

/// Runs `app` until the window closes. Returns the process exit code.
pub fn run_penumbra_app<A: AppHandler>(app: A, settings: WindowSettings) -> Result<i32, WindowError> {
    let event_loop = EventLoop::new()?;

    // ControlFlow::Poll continuously runs the event loop, even if the OS hasn't
    // dispatched any events. This is ideal for games and similar applications.
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = PenumbraRunner::new(app, settings);
    event_loop.run_app(&mut runner)?;

    Ok(runner.exit_code)
}
