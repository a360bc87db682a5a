use std::time::{Duration, Instant};

pub struct Time {
    startup: Instant,
    last_update: Instant,
    delta: Duration,
}

impl Default for Time {
    fn default() -> Self {
        Self {
            startup: Instant::now(),
            last_update: Instant::now(),
            delta: Duration::ZERO,
        }
    }
}

impl Time {
    /// Called by the event loop once per frame
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.last_update = now;
    }

    /// Returns time in seconds since last frame (e.g., 0.016 for 60fps)
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Returns total time since app started
    pub fn elapsed_seconds(&self) -> f32 {
        self.startup.elapsed().as_secs_f32()
    }

    /// Window title line, "dt = X.XXms, FPS = Y.Y".
    pub fn frame_stats(&self) -> String {
        frame_stats(self.delta_seconds())
    }
}

pub fn frame_stats(dt: f32) -> String {
    let fps = if dt > 0.0 { 1.0 / dt } else { 0.0 };
    format!("dt = {:.2}ms, FPS = {:.1}", dt * 1000.0, fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_stats_formatting() {
        assert_eq!(frame_stats(0.016), "dt = 16.00ms, FPS = 62.5");
        assert_eq!(frame_stats(0.0), "dt = 0.00ms, FPS = 0.0");
    }

    #[test]
    fn delta_is_measured_between_updates() {
        let mut time = Time::default();
        assert_eq!(time.delta_seconds(), 0.0);
        std::thread::sleep(Duration::from_millis(2));
        time.update();
        assert!(time.delta_seconds() > 0.0);
        assert!(time.elapsed_seconds() >= time.delta_seconds());
    }
}
