//! Wire-level message types shared between the control kernel and its transport adapters.
//!
//! Nothing in this crate touches `tokio`, MQTT, or serial I/O: it only describes the shapes
//! that cross a boundary (an MQTT payload, a device protocol line, an HTTP body) so the
//! adapters and `kernel-core` can agree on them without depending on each other's internals.

use serde::{Deserialize, Serialize};

/// Operating mode the kernel is authoritative over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Automatic,
    Manual,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Automatic => "AUTOMATIC",
            Mode::Manual => "MANUAL",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTOMATIC" => Ok(Mode::Automatic),
            "MANUAL" => Ok(Mode::Manual),
            _ => Err(()),
        }
    }
}

/// Thermal state of the system. `Alarm` is latched: see `kernel-core`'s state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThermalState {
    Normal,
    Hot,
    TooHot,
    Alarm,
}

impl ThermalState {
    pub fn as_str(self) -> &'static str {
        match self {
            ThermalState::Normal => "NORMAL",
            ThermalState::Hot => "HOT",
            ThermalState::TooHot => "TOO_HOT",
            ThermalState::Alarm => "ALARM",
        }
    }
}

/// Who issued a manual window command. The local knob has already moved the hardware;
/// the operator's command still needs to be relayed out to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOrigin {
    Operator,
    LocalKnob,
}

/// Sensor link health, as last reported by a status payload or inferred from link loss.
/// Forwarded verbatim when the payload carries a string this crate doesn't recognize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorHealth(pub String);

impl SensorHealth {
    pub const UNKNOWN: &'static str = "UNKNOWN";
    pub const ONLINE: &'static str = "ONLINE";
    pub const OFFLINE: &'static str = "OFFLINE";

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }
}

impl Default for SensorHealth {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Incoming MQTT payload on the temperature topic: `{"temperature": <number>}`.
/// Additional fields are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TemperaturePayload {
    pub temperature: f64,
}

/// Incoming MQTT payload on the status topic: `{"status": <string>, ...}`.
/// The raw JSON object is preserved verbatim for the kernel snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    #[serde(flatten)]
    pub raw: serde_json::Map<String, serde_json::Value>,
}

/// Outgoing MQTT payload on the frequency topic: `{"frequency": <integer seconds>}`.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencyPayload {
    pub frequency: u64,
}

/// A decoded line received from the actuator device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorEvent {
    ModeChanged(Mode),
    Pot(u8),
}

impl ActuatorEvent {
    /// Parse one newline-stripped ASCII line from the device. Unknown lines return `None`.
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(rest) = line.strip_prefix("MODE_CHANGED:") {
            return rest.parse::<Mode>().ok().map(ActuatorEvent::ModeChanged);
        }
        if let Some(rest) = line.strip_prefix("POT:") {
            return rest.trim().parse::<u8>().ok().map(ActuatorEvent::Pot);
        }
        None
    }
}

/// A command line to write out to the actuator device link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    SetPosition(u8),
    Mode(Mode),
    Temperature(f64),
    AlarmState(bool),
}

impl ActuatorCommand {
    /// Render as the ASCII line the device expects, without the trailing newline.
    pub fn to_line(self) -> String {
        match self {
            ActuatorCommand::SetPosition(pct) => format!("SET_POS:{pct}"),
            ActuatorCommand::Mode(mode) => format!("MODE:{}", mode.as_str()),
            ActuatorCommand::Temperature(t) => format!("TEMP:{t:.1}"),
            ActuatorCommand::AlarmState(active) => format!("ALARM_STATE:{}", active as u8),
        }
    }
}

/// `POST /api/window/set` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct SetWindowRequest {
    pub percentage: f64,
}

/// Generic `{"message": "..."}` response body used by the mode/alarm endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// `GET /api/status` response body: the kernel snapshot over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub esp_status: String,
    pub current_temperature: Option<f64>,
    pub last_n_temperatures: Vec<f64>,
    pub average_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub system_mode: Mode,
    pub system_state: ThermalState,
    pub window_opening_percentage: f64,
    pub alarm_active: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn actuator_event_parses_known_lines() {
        assert_eq!(ActuatorEvent::parse("MODE_CHANGED:MANUAL"), Some(ActuatorEvent::ModeChanged(Mode::Manual)));
        assert_eq!(ActuatorEvent::parse("MODE_CHANGED:AUTOMATIC"), Some(ActuatorEvent::ModeChanged(Mode::Automatic)));
        assert_eq!(ActuatorEvent::parse("POT:42"), Some(ActuatorEvent::Pot(42)));
    }

    #[test]
    fn actuator_event_rejects_unknown_lines() {
        assert_eq!(ActuatorEvent::parse("MODE_CHANGED:SLEEP"), None);
        assert_eq!(ActuatorEvent::parse("POT:abc"), None);
        assert_eq!(ActuatorEvent::parse("PING"), None);
        assert_eq!(ActuatorEvent::parse(""), None);
    }

    #[test]
    fn actuator_command_renders_device_protocol() {
        assert_eq!(ActuatorCommand::SetPosition(42).to_line(), "SET_POS:42");
        assert_eq!(ActuatorCommand::Mode(Mode::Manual).to_line(), "MODE:MANUAL");
        assert_eq!(ActuatorCommand::Temperature(23.456).to_line(), "TEMP:23.5");
        assert_eq!(ActuatorCommand::AlarmState(true).to_line(), "ALARM_STATE:1");
        assert_eq!(ActuatorCommand::AlarmState(false).to_line(), "ALARM_STATE:0");
    }

    #[test]
    fn temperature_payload_ignores_extra_fields() {
        let payload: TemperaturePayload = serde_json::from_str(r#"{"temperature": 23.5, "unit": "C"}"#).unwrap();
        assert_eq!(payload.temperature, 23.5);
    }

    #[test]
    fn status_payload_keeps_raw_fields() {
        let payload: StatusPayload = serde_json::from_str(r#"{"status": "ONLINE", "rssi": -42}"#).unwrap();
        assert_eq!(payload.status, "ONLINE");
        assert_eq!(payload.raw.get("rssi").and_then(|v| v.as_i64()), Some(-42));
    }
}
