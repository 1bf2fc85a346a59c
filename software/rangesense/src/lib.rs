//! Background ultrasonic ranging and PID control primitives for
//! appliance control loops.

pub mod control;
pub mod hardware;
pub mod logging;
pub mod ranger;

pub use control::PidControl;
pub use ranger::{RangeSensor, RangerConfig};
