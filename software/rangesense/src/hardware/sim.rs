//! Software-defined ranger for hardware-out-of-the-loop operation.
//!
//! A [`SimRanger`] owns a scripted sequence of echo returns and a simulated
//! clock, and hands out pin and clock handles that share that state. Sleeps
//! advance simulated time instantly, so a worker driven by these handles
//! runs through its script without real-time delays. When the script is
//! exhausted, polls fall back to waiting out their timeout in real time so
//! that shutdown latency stays bounded.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::{Clock, EchoLine, TriggerLine};

/// One scripted response to a trigger pulse.
#[derive(Debug, Clone, Copy)]
pub enum EchoEvent {
    /// Echo return with the given pulse width in seconds.
    Return(f64),
    /// No echo; both edge waits time out.
    Lost,
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    AwaitRise,
    AwaitFall(f64),
}

#[derive(Debug, Default)]
struct SimState {
    now_s: f64,
    script: VecDeque<EchoEvent>,
    pending: Option<Pending>,
    trigger_count: u64,
}

type Shared = Arc<(Mutex<SimState>, Condvar)>;

/// Script and clock state for a simulated ranging sensor.
pub struct SimRanger {
    shared: Shared,
}

impl SimRanger {
    pub fn new() -> Self {
        Self {
            shared: Arc::new((Mutex::new(SimState::default()), Condvar::new())),
        }
    }

    /// Append an event to the echo script and wake any poll waiting on it.
    pub fn push(&self, event: EchoEvent) {
        let (state, cvar) = &*self.shared;
        state.lock().unwrap().script.push_back(event);
        cvar.notify_all();
    }

    /// Number of trigger pulses emitted so far.
    ///
    /// Each raw measurement attempt emits exactly one pulse, so this counts
    /// measurement attempts including outlier retries.
    pub fn trigger_count(&self) -> u64 {
        self.shared.0.lock().unwrap().trigger_count
    }

    /// Current simulated time in seconds.
    pub fn now_s(&self) -> f64 {
        self.shared.0.lock().unwrap().now_s
    }

    pub fn trigger_pin(&self) -> SimTriggerPin {
        SimTriggerPin {
            shared: self.shared.clone(),
        }
    }

    pub fn echo_pin(&self) -> SimEchoPin {
        SimEchoPin {
            shared: self.shared.clone(),
        }
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            shared: self.shared.clone(),
        }
    }
}

impl Default for SimRanger {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger-line handle into a [`SimRanger`].
pub struct SimTriggerPin {
    shared: Shared,
}

impl TriggerLine for SimTriggerPin {
    fn init(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn pulse_us(&mut self, width_us: u64) -> Result<(), String> {
        let mut state = self.shared.0.lock().unwrap();
        state.now_s += width_us as f64 * 1e-6;
        state.trigger_count += 1;
        state.pending = Some(Pending::AwaitRise);
        Ok(())
    }
}

/// Echo-line handle into a [`SimRanger`].
pub struct SimEchoPin {
    shared: Shared,
}

impl EchoLine for SimEchoPin {
    fn init(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn poll_edge(&mut self, timeout: Duration) -> Result<bool, String> {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock().unwrap();

        let pending = state.pending;
        match pending {
            Some(Pending::AwaitFall(width_s)) => {
                state.now_s += width_s;
                state.pending = None;
                Ok(true)
            }
            Some(Pending::AwaitRise) => {
                if state.script.is_empty() {
                    // Give a late script push the chance to land, but never
                    // wait past the caller's timeout in real time.
                    let (guard, _) = cvar
                        .wait_timeout_while(state, timeout, |s| s.script.is_empty())
                        .unwrap();
                    state = guard;
                }
                match state.script.pop_front() {
                    Some(EchoEvent::Return(width_s)) => {
                        state.pending = Some(Pending::AwaitFall(width_s));
                        Ok(true)
                    }
                    Some(EchoEvent::Lost) | None => {
                        state.now_s += timeout.as_secs_f64();
                        state.pending = None;
                        Ok(false)
                    }
                }
            }
            // Poll with no trigger in flight: nothing can arrive.
            None => {
                state.now_s += timeout.as_secs_f64();
                Ok(false)
            }
        }
    }
}

/// Simulated monotonic clock; sleeps advance time without blocking.
pub struct SimClock {
    shared: Shared,
}

impl Clock for SimClock {
    fn now(&self) -> f64 {
        self.shared.0.lock().unwrap().now_s
    }

    fn sleep_ms(&self, ms: u64) {
        self.shared.0.lock().unwrap().now_s += ms as f64 * 1e-3;
    }
}
