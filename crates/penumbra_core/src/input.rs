use std::collections::HashMap;

use glam::Vec2;
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ButtonPhase: u8 {
        const NONE     = 0;
        const PRESSED  = 1 << 0;
        const HELD     = 1 << 1;
        const RELEASED = 1 << 2;
    }
}

impl ButtonPhase {
    fn press(&mut self) {
        if !self.contains(ButtonPhase::HELD) {
            *self |= ButtonPhase::PRESSED | ButtonPhase::HELD;
        }
    }

    fn release(&mut self) {
        if self.contains(ButtonPhase::HELD) {
            *self &= !ButtonPhase::HELD;
            *self |= ButtonPhase::RELEASED;
        }
    }

    // Edge bits only live for one frame
    fn settle(&mut self) {
        *self &= ButtonPhase::HELD;
    }
}

/// Per-frame keyboard and mouse state fed by the window event loop.
#[derive(Default, Debug)]
pub struct Input {
    keys: HashMap<KeyCode, ButtonPhase>,
    mouse_buttons: HashMap<MouseButton, ButtonPhase>,
    cursor: Option<Vec2>,
    mouse_delta: Vec2,
}

impl Input {
    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.key_phase(key).contains(ButtonPhase::HELD)
    }

    /// True only on the frame the key went down.
    pub fn just_pressed(&self, key: KeyCode) -> bool {
        self.key_phase(key).contains(ButtonPhase::PRESSED)
    }

    pub fn key_phase(&self, key: KeyCode) -> ButtonPhase {
        self.keys.get(&key).copied().unwrap_or_default()
    }

    pub fn press(&mut self, key: KeyCode) {
        self.keys.entry(key).or_default().press();
    }

    pub fn release(&mut self, key: KeyCode) {
        self.keys.entry(key).or_default().release();
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons
            .get(&button)
            .is_some_and(|phase| phase.contains(ButtonPhase::HELD))
    }

    pub fn press_mouse(&mut self, button: MouseButton) {
        self.mouse_buttons.entry(button).or_default().press();
    }

    pub fn release_mouse(&mut self, button: MouseButton) {
        self.mouse_buttons.entry(button).or_default().release();
    }

    /// Records an absolute cursor position; the first sample yields no delta.
    pub fn move_cursor(&mut self, position: Vec2) {
        if let Some(previous) = self.cursor {
            self.mouse_delta += position - previous;
        }
        self.cursor = Some(position);
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Drops one-frame edges and the accumulated mouse delta.
    pub fn end_frame(&mut self) {
        self.keys.values_mut().for_each(ButtonPhase::settle);
        self.mouse_buttons.values_mut().for_each(ButtonPhase::settle);
        self.mouse_delta = Vec2::ZERO;
    }

    /// Forgets everything held, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.mouse_buttons.clear();
        self.cursor = None;
        self.mouse_delta = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_an_edge_hold_is_a_level() {
        let mut input = Input::default();
        input.press(KeyCode::F1);
        assert!(input.just_pressed(KeyCode::F1));
        assert!(input.is_pressed(KeyCode::F1));

        input.end_frame();
        // key repeat must not re-trigger the edge
        input.press(KeyCode::F1);
        assert!(!input.just_pressed(KeyCode::F1));
        assert!(input.is_pressed(KeyCode::F1));

        input.release(KeyCode::F1);
        assert!(!input.is_pressed(KeyCode::F1));
        assert!(input.key_phase(KeyCode::F1).contains(ButtonPhase::RELEASED));

        input.end_frame();
        assert_eq!(input.key_phase(KeyCode::F1), ButtonPhase::NONE);
    }

    #[test]
    fn mouse_delta_accumulates_until_frame_end() {
        let mut input = Input::default();
        input.move_cursor(Vec2::new(10.0, 10.0));
        assert_eq!(input.mouse_delta(), Vec2::ZERO);

        input.move_cursor(Vec2::new(12.0, 7.0));
        input.move_cursor(Vec2::new(15.0, 7.0));
        assert_eq!(input.mouse_delta(), Vec2::new(5.0, -3.0));

        input.end_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn mouse_buttons_track_held_state() {
        let mut input = Input::default();
        input.press_mouse(MouseButton::Right);
        input.end_frame();
        assert!(input.is_mouse_pressed(MouseButton::Right));
        input.release_mouse(MouseButton::Right);
        assert!(!input.is_mouse_pressed(MouseButton::Right));
    }
}
