//! The control kernel: state machine, telemetry window, ports, and the serialized actor
//! that owns all mutable state for the climate control unit (§2-§5 of the system design).

pub mod config;
pub mod error;
pub mod kernel;
pub mod ports;
pub mod state_machine;
pub mod window;

pub use config::Config;
pub use error::Error;
pub use kernel::{dispatch_actuator_event, Kernel, KernelHandle};
pub use ports::{ActuatorPort, ChannelActuatorPort, ChannelSensorPort, SensorPort};
pub use window::{TelemetryWindow, WindowSnapshot};
