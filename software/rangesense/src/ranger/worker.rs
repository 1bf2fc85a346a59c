//! Measurement worker: the sole owner of the ranging hardware.
//!
//! One instance runs per sensor on a dedicated thread. It is the only
//! writer of the shared estimate and the only party that touches the
//! trigger and echo pins, so all hardware I/O is strictly sequential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use super::{RangeEstimate, RangerConfig};
use crate::hardware::{Clock, EchoLine, TriggerLine};

pub(crate) struct RangeWorker {
    trigger: Box<dyn TriggerLine>,
    echo: Box<dyn EchoLine>,
    clock: Box<dyn Clock>,
    config: RangerConfig,
    shared: Arc<Mutex<RangeEstimate>>,
    running: Arc<AtomicBool>,

    /// Time of the most recent trigger; never exposed outside the worker.
    time_last_run: f64,

    /// Previous committed raw reading, for the outlier jump check.
    prev_raw: f64,
}

impl RangeWorker {
    pub(crate) fn new(
        trigger: Box<dyn TriggerLine>,
        echo: Box<dyn EchoLine>,
        clock: Box<dyn Clock>,
        config: RangerConfig,
        shared: Arc<Mutex<RangeEstimate>>,
        running: Arc<AtomicBool>,
        time_last_run: f64,
    ) -> Self {
        Self {
            trigger,
            echo,
            clock,
            config,
            shared,
            running,
            time_last_run,
            prev_raw: 0.0,
        }
    }

    /// Measure until shutdown is requested. The raw measurement step
    /// enforces the inter-trigger interval, so the loop needs no delay of
    /// its own.
    pub(crate) fn run(mut self) {
        while self.running.load(Ordering::Relaxed) {
            self.iterate();
        }
        debug!("Range worker exiting");
    }

    /// Take one measurement, apply the outlier policy, and commit the
    /// filtered result.
    fn iterate(&mut self) {
        let first_time = self.shared.lock().unwrap().first_time;

        let mut raw = self.measure_range();

        // A large jump from the previous reading or a near-zero value
        // (which is how a timed-out measurement presents) is dubious.
        // Measure once more and accept whatever comes back, keeping
        // latency bounded.
        let outlier = (!first_time && (raw - self.prev_raw).abs() > self.config.jump_threshold_m)
            || raw < self.config.floor_m;
        if outlier {
            debug!(raw, "Rejected outlier reading; retrying once");
            raw = self.measure_range();
        }
        self.prev_raw = raw;

        let mut estimate = self.shared.lock().unwrap();
        if estimate.first_time {
            // Prime the filter on the first reading to avoid a cold-start
            // transient climbing up from zero
            estimate.range = raw;
            estimate.first_time = false;
        } else {
            estimate.range += self.config.smoothing * (raw - estimate.range);
        }
        estimate.count += 1;
    }

    /// One blocking hardware round-trip: trigger pulse, rising edge,
    /// falling edge, time-of-flight conversion.
    ///
    /// Yields 0.0 on any edge timeout or pin fault; the caller treats that
    /// as an outlier. Worst case blocking time is the remainder of the
    /// inter-trigger interval plus two edge timeouts.
    fn measure_range(&mut self) -> f64 {
        // Sleep out the remainder of the minimum interval so echoes from
        // the previous pulse cannot contaminate this measurement
        let interval = self.clock.now() - self.time_last_run;
        if interval < self.config.min_interval_s {
            self.clock
                .sleep_ms((1000.0 * (self.config.min_interval_s - interval)) as u64);
        }
        self.time_last_run = self.clock.now();

        if let Err(e) = self.trigger.pulse_us(self.config.trigger_pulse_us) {
            warn!("Trigger pulse failed: {e}");
            return 0.0;
        }

        let timeout = Duration::from_millis(self.config.echo_timeout_ms);
        let rise = match self.echo.poll_edge(timeout) {
            Ok(true) => self.clock.now(),
            Ok(false) => {
                debug!("Timed out waiting for echo rising edge");
                return 0.0;
            }
            Err(e) => {
                warn!("Echo poll failed: {e}");
                return 0.0;
            }
        };
        let fall = match self.echo.poll_edge(timeout) {
            Ok(true) => self.clock.now(),
            Ok(false) => {
                debug!("Timed out waiting for echo falling edge");
                return 0.0;
            }
            Err(e) => {
                warn!("Echo poll failed: {e}");
                return 0.0;
            }
        };

        // Round trip at the speed of sound
        (fall - rise) * self.config.speed_of_sound / 2.0
    }
}
