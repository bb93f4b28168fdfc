//! Outbound interfaces the kernel drives without knowing the concrete transport.
//!
//! Both ports are backed by a bounded `tokio::sync::mpsc` channel into a transport task.
//! The kernel's side of each channel only ever calls `try_send`: a full or disconnected
//! channel degrades to "log and drop" rather than blocking the kernel's single command loop,
//! which is the non-blocking guarantee §5 requires of every port.

use kernel_messages::ActuatorCommand;
use tokio::sync::mpsc;
use tracing::warn;

/// Outbound capability: drive the motorised window, mode indicator, display, and alarm
/// light on the actuator microcontroller. Repeating the same command is harmless.
pub trait ActuatorPort: Send + Sync {
    fn set_position(&self, opening: f64);
    fn announce_mode(&self, mode: kernel_messages::Mode);
    fn display_temperature(&self, celsius: f64);
    fn signal_alarm(&self, active: bool);
}

/// Outbound capability: request a new sampling period from the remote sensor.
pub trait SensorPort: Send + Sync {
    fn publish_period(&self, seconds: u64);
}

/// `ActuatorPort` realized as a channel into the actuator-link transport task.
pub struct ChannelActuatorPort {
    tx: mpsc::Sender<ActuatorCommand>,
}

impl ChannelActuatorPort {
    pub fn new(tx: mpsc::Sender<ActuatorCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: ActuatorCommand) {
        if self.tx.try_send(command).is_err() {
            warn!(?command, "actuator port unavailable, dropping command");
        }
    }
}

impl ActuatorPort for ChannelActuatorPort {
    fn set_position(&self, opening: f64) {
        let pct = (opening * 100.0).round().clamp(0.0, 100.0) as u8;
        self.send(ActuatorCommand::SetPosition(pct));
    }

    fn announce_mode(&self, mode: kernel_messages::Mode) {
        self.send(ActuatorCommand::Mode(mode));
    }

    fn display_temperature(&self, celsius: f64) {
        self.send(ActuatorCommand::Temperature(celsius));
    }

    fn signal_alarm(&self, active: bool) {
        self.send(ActuatorCommand::AlarmState(active));
    }
}

/// `SensorPort` realized as a channel into the sensor-link (MQTT) transport task.
pub struct ChannelSensorPort {
    tx: mpsc::Sender<u64>,
}

impl ChannelSensorPort {
    pub fn new(tx: mpsc::Sender<u64>) -> Self {
        Self { tx }
    }
}

impl SensorPort for ChannelSensorPort {
    fn publish_period(&self, seconds: u64) {
        if self.tx.try_send(seconds).is_err() {
            warn!(seconds, "sensor port unavailable, dropping frequency update");
        }
    }
}
