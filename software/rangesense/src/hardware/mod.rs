//! Trait seams for the hardware consumed by the ranging driver.
//!
//! The driver never touches pins or clocks directly; it drives these
//! abstractions, which are implemented by the platform integration (or by
//! [`sim`] for software-defined operation and testing).

use std::time::Duration;

pub mod sim;

/// Digital output pin driving the ranger's trigger line.
pub trait TriggerLine: Send {
    /// Configure the pin as an output and drive it low.
    fn init(&mut self) -> Result<(), String>;

    /// Emit a fixed-width high pulse of `width_us` microseconds.
    fn pulse_us(&mut self, width_us: u64) -> Result<(), String>;
}

/// Digital input pin reporting the ranger's echo edges.
pub trait EchoLine: Send {
    /// Configure the pin as an input with rising+falling edge events enabled.
    fn init(&mut self) -> Result<(), String>;

    /// Block until an edge occurs or the timeout elapses.
    ///
    /// Returns `Ok(true)` iff an edge was observed before the timeout.
    fn poll_edge(&mut self, timeout: Duration) -> Result<bool, String>;
}

/// Monotonic time source and sleep primitive.
///
/// Abstracted so that the worker's interval enforcement and pulse-width
/// timing can run against simulated time in tests.
pub trait Clock: Send {
    /// Monotonic time in fractional seconds.
    fn now(&self) -> f64;

    /// Sleep for the given number of milliseconds.
    fn sleep_ms(&self, ms: u64);
}

/// System clock backed by `std::time`.
pub struct SystemClock {
    epoch: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
