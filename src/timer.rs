//! Performance measurement tools.

use std::{
    fmt,
    sync::Mutex,
    time::{Duration, Instant},
};

/// A timer that measures and averages the time an operation takes.
///
/// Collected timings are averaged and reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]). Timers can be shared between threads.
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    total: Duration,
    count: u32,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn stop(&self, start: Instant) {
        let elapsed = start.elapsed();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.total += elapsed;
        state.count += 1;
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *state)
        };
        if state.count == 0 {
            return write!(f, "{}: -", self.name);
        }

        let avg_ms = (state.total / state.count).as_secs_f32() * 1000.0;
        write!(f, "{}: {}x{:.01}ms", self.name, state.count, avg_ms)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS and the given timers if one second has
    /// passed.
    pub fn tick_with<'a, I: IntoIterator<Item = &'a Timer>>(&mut self, timers: I) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            let timers = timers
                .into_iter()
                .map(|timer| timer.to_string())
                .collect::<Vec<_>>();
            if timers.is_empty() {
                log::debug!("{}: {} FPS", self.name, self.frames);
            } else {
                log::debug!("{}: {} FPS ({})", self.name, self.frames, timers.join(", "));
            }

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_resets() {
        let timer = Timer::new("work");
        assert_eq!(timer.to_string(), "work: -");

        timer.time(|| ());
        drop(timer.start());
        assert!(timer.to_string().starts_with("work: 2x"));

        assert_eq!(timer.to_string(), "work: -");
    }

    #[test]
    fn time_returns_closure_result() {
        let timer = Timer::new("t");
        assert_eq!(timer.time(|| 42), 42);
    }
}
