use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Caret opacity as a function of time since the caret last moved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorBlink {
    delay: f64,
    duration: f64,
    origin: Option<f64>,
}

impl CursorBlink {
    pub fn new(delay: f64, duration: f64) -> Self {
        CursorBlink { delay, duration, origin: None }
    }

    /// Hold full opacity again from the next frame on.
    pub fn restart(&mut self) {
        self.origin = None;
    }

    /// Fully opaque for `delay` ms, then alternate fading out and in over
    /// `duration` ms each.
    pub fn opacity(&mut self, now: f64) -> f64 {
        let origin = *self.origin.get_or_insert(now);
        let elapsed = now - origin;
        if elapsed < self.delay || self.duration <= 0.0 {
            return 1.0;
        }
        let phase = (elapsed - self.delay) % (2.0 * self.duration);
        if phase < self.duration {
            1.0 - phase / self.duration
        } else {
            (phase - self.duration) / self.duration
        }
    }
}

/// A `setInterval` registration, cleared on `stop` and on drop.
pub struct BlinkTimer {
    handle: Option<i32>,
    _callback: Closure<dyn FnMut()>,
}

impl BlinkTimer {
    pub fn start(interval_ms: i32, callback: impl FnMut() + 'static) -> Option<BlinkTimer> {
        let window = web_sys::window()?;
        let callback = Closure::<dyn FnMut()>::new(callback);
        let handle = window
            .set_interval_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), interval_ms)
            .map_err(|err| log::warn!("cursor blink timer failed to start: {:?}", err))
            .ok()?;
        Some(BlinkTimer { handle: Some(handle), _callback: callback })
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Some(window) = web_sys::window() {
                window.clear_interval_with_handle(handle);
            }
        }
    }
}

impl Drop for BlinkTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_then_fades() {
        let mut blink = CursorBlink::new(1000.0, 600.0);
        assert_eq!(blink.opacity(5000.0), 1.0);
        assert_eq!(blink.opacity(5999.0), 1.0);
        assert!((blink.opacity(6300.0) - 0.5).abs() < 1e-9);
        assert!(blink.opacity(6600.0).abs() < 1e-9);
        assert!((blink.opacity(6900.0) - 0.5).abs() < 1e-9);
        blink.restart();
        assert_eq!(blink.opacity(7000.0), 1.0);
    }
}
