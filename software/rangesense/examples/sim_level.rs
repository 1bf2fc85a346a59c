//! Run the ranging driver against a software-defined sensor and close the
//! loop with a PID controller, with no hardware in the loop.
//!
//! Demonstrated here:
//!   * Scripting echo returns on the simulated sensor
//!   * Waiting for the first measurement with `initialise`
//!   * Feeding the filtered range into a PID step at a fixed cadence

use std::{thread, time::Duration};

use rangesense::hardware::sim::{EchoEvent, SimRanger};
use rangesense::{PidControl, RangeSensor, RangerConfig};

use tracing::info;

fn main() {
    rangesense::logging::init_logging(std::path::Path::new("./"), "sim_level").unwrap();

    // Script a level that drifts up toward the sensor, with one dropout
    // and one spurious jump for the driver to reject
    let config = RangerConfig::default();
    let sim = SimRanger::new();
    let width_for = |range_m: f64| 2.0 * range_m / config.speed_of_sound;
    for i in 0..20 {
        let range_m = 0.20 - 0.002 * i as f64;
        sim.push(EchoEvent::Return(width_for(range_m)));
        if i == 7 {
            sim.push(EchoEvent::Lost);
        }
        if i == 13 {
            sim.push(EchoEvent::Return(width_for(1.5)));
        }
    }

    let sensor = RangeSensor::start(
        Box::new(sim.trigger_pin()),
        Box::new(sim.echo_pin()),
        Box::new(sim.clock()),
        config,
    )
    .unwrap();

    if !sensor.initialise() {
        info!("No measurement arrived in time; exiting");
        return;
    }

    // Drive toward a target water level of 0.12 m below the sensor
    let target_m = 0.12;
    let mut pid = PidControl::new();
    pid.set_pid_gains(8.0, 0.5, 2.0);
    pid.set_integrator_limits(-2.0, 2.0);

    for _ in 0..20 {
        let range = sensor.get_range();
        let error = target_m - range;
        let drive = pid.update(error, range);
        info!(range, error, drive, "Control step");
        thread::sleep(Duration::from_millis(20));
    }
}
