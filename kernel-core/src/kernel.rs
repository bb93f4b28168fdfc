//! The control kernel: the single task that owns all mutable kernel state.
//!
//! All inputs (sensor samples, sensor health updates, operator commands, and shutdown)
//! are serialised through one `mpsc` channel into one task, so at most one command ever
//! mutates the kernel aggregate at a time (§5). Commands that need a result back carry a
//! `oneshot` reply sender; fire-and-forget commands (`OnSample`, `OnSensorHealth`) don't.

use std::sync::Arc;
use std::time::Instant;

use kernel_messages::{ActuatorEvent, Mode, StatusResponse, ThermalState, WindowOrigin};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::ports::{ActuatorPort, SensorPort};
use crate::state_machine::{self, Inputs};
use crate::window::TelemetryWindow;

/// Commands accepted on the kernel's single logical lane.
enum Command {
    OnSample(f64),
    OnSensorHealth { status: String, raw: serde_json::Map<String, serde_json::Value> },
    SetMode(Mode, oneshot::Sender<bool>),
    SetManualWindow(f64, WindowOrigin, oneshot::Sender<bool>),
    ResetAlarm(oneshot::Sender<bool>),
    Snapshot(oneshot::Sender<StatusResponse>),
}

/// A cheaply-cloneable handle to the kernel's command channel. This is what inbound
/// adapters (sensor, actuator, HTTP) hold; it is the only way to reach kernel state.
#[derive(Clone)]
pub struct KernelHandle {
    tx: mpsc::Sender<Command>,
}

impl KernelHandle {
    /// Feed a new sensor sample. Fire-and-forget: the kernel never signals failure upward
    /// for asynchronous inputs (§7).
    pub async fn on_sample(&self, temperature: f64) {
        let _ = self.tx.send(Command::OnSample(temperature)).await;
    }

    /// Record a sensor health/status update. No state-machine evaluation.
    pub async fn on_sensor_health(&self, status: String, raw: serde_json::Map<String, serde_json::Value>) {
        let _ = self.tx.send(Command::OnSensorHealth { status, raw }).await;
    }

    /// Request a mode change. Returns `false` if the system is in `ALARM` or the mode is
    /// already the current one would still return `true` (idempotent no-op counts as success).
    pub async fn set_mode(&self, mode: Mode) -> Result<bool, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Command::SetMode(mode, reply_tx)).await.map_err(|_| Error::KernelStopped)?;
        reply_rx.await.map_err(|_| Error::KernelStopped)
    }

    /// Request a manual window opening (`0..=100`). Returns `false` if not in `MANUAL` mode
    /// or the value is out of range.
    pub async fn set_manual_window(&self, percentage: f64, origin: WindowOrigin) -> Result<bool, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Command::SetManualWindow(percentage, origin, reply_tx)).await.map_err(|_| Error::KernelStopped)?;
        reply_rx.await.map_err(|_| Error::KernelStopped)
    }

    /// Reset a latched alarm. Returns `false` unless the system is currently in `ALARM`.
    pub async fn reset_alarm(&self) -> Result<bool, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Command::ResetAlarm(reply_tx)).await.map_err(|_| Error::KernelStopped)?;
        reply_rx.await.map_err(|_| Error::KernelStopped)
    }

    /// Read a consistent snapshot of kernel state for the dashboard.
    pub async fn snapshot(&self) -> Result<StatusResponse, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Command::Snapshot(reply_tx)).await.map_err(|_| Error::KernelStopped)?;
        reply_rx.await.map_err(|_| Error::KernelStopped)
    }
}

/// Translate a decoded actuator device-link event into the matching kernel command.
pub async fn dispatch_actuator_event(handle: &KernelHandle, event: ActuatorEvent) {
    match event {
        ActuatorEvent::ModeChanged(mode) => {
            let _ = handle.set_mode(mode).await;
        }
        ActuatorEvent::Pot(value) => {
            let _ = handle.set_manual_window(value as f64, WindowOrigin::LocalKnob).await;
        }
    }
}

/// Owner of all mutable kernel state. Constructed once, then consumed by [`Kernel::run`]
/// on its own task; [`Kernel::spawn`] is the usual entry point for callers that don't need
/// to control the task lifecycle themselves.
pub struct Kernel {
    config: Config,
    actuator: Arc<dyn ActuatorPort>,
    sensor: Arc<dyn SensorPort>,
    rx: mpsc::Receiver<Command>,

    mode: Mode,
    state: ThermalState,
    window_opening: f64,
    too_hot_start: Option<Instant>,
    current_temperature: Option<f64>,
    telemetry: TelemetryWindow,
    sensor_health: String,
    sensor_health_raw: serde_json::Map<String, serde_json::Value>,
    last_published_period: Option<u64>,
    last_commanded_window: Option<f64>,
}

/// Channel depth for the kernel's command lane. Generous enough to absorb a burst from
/// all three inbound adapters without back-pressuring them.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

impl Kernel {
    /// Construct the kernel and its command handle. The returned [`Kernel`] must be driven
    /// by calling [`Kernel::run`] (typically on its own `tokio::spawn`ed task).
    pub fn new(config: Config, actuator: Arc<dyn ActuatorPort>, sensor: Arc<dyn SensorPort>) -> (Self, KernelHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let telemetry = TelemetryWindow::new(config.n_last_measurements);

        let kernel = Self {
            config,
            actuator,
            sensor,
            rx,
            mode: Mode::Automatic,
            state: ThermalState::Normal,
            window_opening: Config::WINDOW_CLOSED,
            too_hot_start: None,
            current_temperature: None,
            telemetry,
            sensor_health: kernel_messages::SensorHealth::UNKNOWN.to_string(),
            sensor_health_raw: serde_json::Map::new(),
            last_published_period: None,
            last_commanded_window: None,
        };

        (kernel, KernelHandle { tx })
    }

    /// Drive the command loop until the channel is closed, i.e. every [`KernelHandle`] has
    /// been dropped, which is the kernel's shutdown mechanism, not a distinct command.
    /// Publishes the initial sampling period and window position before accepting its
    /// first command, mirroring the original system's startup announcement to both links.
    pub async fn run(mut self) {
        self.publish_period_if_changed(self.config.f1_secs);
        self.command_window(self.window_opening);

        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }

        info!("control kernel command loop stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::OnSample(t) => self.on_sample(t),
            Command::OnSensorHealth { status, raw } => self.on_sensor_health(status, raw),
            Command::SetMode(mode, reply) => {
                let ok = self.set_mode(mode);
                let _ = reply.send(ok);
            }
            Command::SetManualWindow(pct, origin, reply) => {
                let ok = self.set_manual_window(pct, origin);
                let _ = reply.send(ok);
            }
            Command::ResetAlarm(reply) => {
                let ok = self.reset_alarm();
                let _ = reply.send(ok);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn on_sample(&mut self, t: f64) {
        if !t.is_finite() {
            warn!(temperature = t, "discarding non-finite temperature sample");
            return;
        }

        self.telemetry.record(t);
        self.current_temperature = Some(t);

        let outputs = state_machine::evaluate(
            Inputs {
                temperature: t,
                now: Instant::now(),
                prior_state: self.state,
                too_hot_start: self.too_hot_start,
                mode: self.mode,
                manual_window_opening: self.window_opening,
            },
            &self.config,
        );

        let entered_alarm = outputs.state == ThermalState::Alarm && self.state != ThermalState::Alarm;
        if outputs.state != self.state {
            info!(from = self.state.as_str(), to = outputs.state.as_str(), "thermal state transition");
        }

        self.state = outputs.state;
        self.too_hot_start = outputs.too_hot_start;
        self.window_opening = outputs.window_opening;

        // Ordering is significant and tested: publish_period, set_position, display_temperature, signal_alarm.
        self.publish_period_if_changed(outputs.sampling_period_secs);
        self.command_window(outputs.window_opening);

        if self.mode == Mode::Manual {
            self.actuator.display_temperature(t);
        }

        if entered_alarm {
            self.actuator.signal_alarm(true);
        }
    }

    fn on_sensor_health(&mut self, status: String, raw: serde_json::Map<String, serde_json::Value>) {
        info!(%status, "sensor health updated");
        self.sensor_health = status;
        self.sensor_health_raw = raw;
    }

    fn set_mode(&mut self, mode: Mode) -> bool {
        if self.state == ThermalState::Alarm {
            return false;
        }
        if self.mode == mode {
            return true;
        }

        self.mode = mode;
        info!(mode = mode.as_str(), "mode changed");
        self.actuator.announce_mode(mode);

        match mode {
            Mode::Automatic => {
                if let Some(t) = self.current_temperature {
                    self.on_sample_reevaluate(t);
                }
            }
            Mode::Manual => {
                self.publish_period_if_changed(self.config.f1_secs);
                if let Some(t) = self.current_temperature {
                    self.actuator.display_temperature(t);
                }
            }
        }

        true
    }

    /// Re-run the state machine against the current temperature without re-recording it
    /// into the telemetry window (used by `SetMode(AUTOMATIC)` and `ResetAlarm`).
    fn on_sample_reevaluate(&mut self, t: f64) {
        let outputs = state_machine::evaluate(
            Inputs {
                temperature: t,
                now: Instant::now(),
                prior_state: self.state,
                too_hot_start: self.too_hot_start,
                mode: self.mode,
                manual_window_opening: self.window_opening,
            },
            &self.config,
        );

        self.state = outputs.state;
        self.too_hot_start = outputs.too_hot_start;
        self.window_opening = outputs.window_opening;

        self.publish_period_if_changed(outputs.sampling_period_secs);
        self.command_window(outputs.window_opening);
    }

    fn set_manual_window(&mut self, percentage: f64, origin: WindowOrigin) -> bool {
        if self.mode != Mode::Manual {
            return false;
        }
        if !(0.0..=100.0).contains(&percentage) {
            return false;
        }

        let opening = (percentage / 100.0).clamp(Config::WINDOW_CLOSED, Config::WINDOW_FULLY_OPEN);
        if (self.window_opening - opening).abs() > Config::WINDOW_EPSILON {
            self.window_opening = opening;
            info!(opening = opening * 100.0, "manual window opening set");
            if origin == WindowOrigin::Operator {
                self.command_window(opening);
            } else {
                // The hardware already moved; only the kernel's own bookkeeping changes.
                self.last_commanded_window = Some(opening);
            }
        }

        if let Some(t) = self.current_temperature {
            self.actuator.display_temperature(t);
        }

        true
    }

    fn reset_alarm(&mut self) -> bool {
        if self.state != ThermalState::Alarm {
            return false;
        }

        self.too_hot_start = None;
        self.state = ThermalState::Normal;
        info!("alarm reset by operator");
        self.actuator.signal_alarm(false);

        if self.mode == Mode::Automatic {
            if let Some(t) = self.current_temperature {
                self.on_sample_reevaluate(t);
            }
        }

        true
    }

    fn snapshot(&self) -> StatusResponse {
        let telemetry = self.telemetry.snapshot();
        StatusResponse {
            esp_status: self.sensor_health.clone(),
            current_temperature: self.current_temperature,
            last_n_temperatures: telemetry.readings,
            average_temperature: telemetry.average,
            min_temperature: telemetry.min,
            max_temperature: telemetry.max,
            system_mode: self.mode,
            system_state: self.state,
            window_opening_percentage: (self.window_opening * 1000.0).round() / 10.0,
            alarm_active: self.state == ThermalState::Alarm,
        }
    }

    fn publish_period_if_changed(&mut self, seconds: u64) {
        if self.last_published_period != Some(seconds) {
            self.sensor.publish_period(seconds);
            self.last_published_period = Some(seconds);
        }
    }

    fn command_window(&mut self, opening: f64) {
        let changed = match self.last_commanded_window {
            Some(last) => (last - opening).abs() > Config::WINDOW_EPSILON,
            None => true,
        };
        if changed {
            self.actuator.set_position(opening);
            self.last_commanded_window = Some(opening);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Emitted {
        PublishPeriod(u64),
        SetPosition(f64),
        AnnounceMode(Mode),
        DisplayTemperature(f64),
        SignalAlarm(bool),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Emitted>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Emitted> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ActuatorPort for Recorder {
        fn set_position(&self, opening: f64) {
            self.events.lock().unwrap().push(Emitted::SetPosition(opening));
        }
        fn announce_mode(&self, mode: Mode) {
            self.events.lock().unwrap().push(Emitted::AnnounceMode(mode));
        }
        fn display_temperature(&self, celsius: f64) {
            self.events.lock().unwrap().push(Emitted::DisplayTemperature(celsius));
        }
        fn signal_alarm(&self, active: bool) {
            self.events.lock().unwrap().push(Emitted::SignalAlarm(active));
        }
    }

    impl SensorPort for Recorder {
        fn publish_period(&self, seconds: u64) {
            self.events.lock().unwrap().push(Emitted::PublishPeriod(seconds));
        }
    }

    fn harness(config: Config) -> (KernelHandle, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let (kernel, handle) = Kernel::new(config, recorder.clone(), recorder.clone());
        tokio::spawn(kernel.run());
        (handle, recorder)
    }

    fn config() -> Config {
        Config { t1: 20.0, t2: 27.0, n_last_measurements: 10, alarm_duration_secs: 5, f1_secs: 60, f2_secs: 10 }
    }

    #[tokio::test]
    async fn scenario_1_cold_sample_stays_normal() {
        let (handle, recorder) = harness(config());
        recorder.events.lock().unwrap().clear(); // drop startup announcement

        handle.on_sample(18.0).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.system_state, ThermalState::Normal);
        assert_eq!(snap.window_opening_percentage, 0.0);
        assert!(recorder.events().contains(&Emitted::PublishPeriod(60)));
        assert!(!recorder.events().iter().any(|e| matches!(e, Emitted::SetPosition(_))));
    }

    #[tokio::test]
    async fn scenario_2_mid_band_commands_position() {
        let (handle, recorder) = harness(config());
        handle.on_sample(23.5).await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.system_state, ThermalState::Hot);
        assert!((snap.window_opening_percentage - 50.5).abs() < 0.1);
        assert!(recorder.events().iter().any(|e| matches!(e, Emitted::SetPosition(p) if (*p - 0.505).abs() < 1e-3)));
    }

    #[tokio::test]
    async fn scenario_4_alarm_reset_reevaluates_automatic() {
        // a zero-length alarm duration lets the second above-T2 sample latch immediately,
        // without the test needing to wait out a real multi-second timer
        let (handle, recorder) = harness(Config { alarm_duration_secs: 0, ..config() });
        handle.on_sample(30.0).await;
        handle.on_sample(30.0).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.system_state, ThermalState::Alarm);
        assert_eq!(snap.window_opening_percentage, 100.0);

        // temperature alone cannot exit ALARM
        handle.on_sample(10.0).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.system_state, ThermalState::Alarm);

        assert!(handle.reset_alarm().await.unwrap());
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.system_state, ThermalState::Normal);
        assert_eq!(snap.window_opening_percentage, 0.0);
        assert!(recorder.events().contains(&Emitted::SignalAlarm(false)));
    }

    #[tokio::test]
    async fn reset_alarm_rejected_when_not_in_alarm() {
        let (handle, _recorder) = harness(config());
        assert!(!handle.reset_alarm().await.unwrap());
    }

    #[tokio::test]
    async fn scenario_5_manual_mode_round_trip() {
        let (handle, recorder) = harness(config());
        handle.on_sample(23.5).await; // enters HOT, publishes F2 so the switch to MANUAL republishes F1
        recorder.events.lock().unwrap().clear();

        assert!(handle.set_mode(Mode::Manual).await.unwrap());
        assert!(recorder.events().contains(&Emitted::AnnounceMode(Mode::Manual)));
        assert!(recorder.events().contains(&Emitted::PublishPeriod(60)));

        assert!(handle.set_manual_window(42.0, WindowOrigin::Operator).await.unwrap());
        assert!(recorder.events().iter().any(|e| matches!(e, Emitted::SetPosition(p) if (*p - 0.42).abs() < 1e-6)));

        let before = recorder.events().len();
        assert!(handle.set_manual_window(42.0, WindowOrigin::Operator).await.unwrap());
        assert_eq!(recorder.events().len(), before, "repeating the same window command should not re-emit set_position");
    }

    #[tokio::test]
    async fn scenario_6_local_knob_does_not_emit_set_position() {
        let (handle, recorder) = harness(config());
        assert!(handle.set_mode(Mode::Manual).await.unwrap());
        recorder.events.lock().unwrap().clear();

        assert!(handle.set_manual_window(70.0, WindowOrigin::LocalKnob).await.unwrap());
        assert!(!recorder.events().iter().any(|e| matches!(e, Emitted::SetPosition(_))));
    }

    #[tokio::test]
    async fn set_manual_window_rejected_outside_manual_mode() {
        let (handle, _recorder) = harness(config());
        assert!(!handle.set_manual_window(50.0, WindowOrigin::Operator).await.unwrap());
    }

    #[tokio::test]
    async fn set_manual_window_rejected_out_of_range() {
        let (handle, _recorder) = harness(config());
        handle.set_mode(Mode::Manual).await.unwrap();
        assert!(!handle.set_manual_window(150.0, WindowOrigin::Operator).await.unwrap());
        assert!(!handle.set_manual_window(-1.0, WindowOrigin::Operator).await.unwrap());
    }

    #[tokio::test]
    async fn set_mode_rejected_in_alarm() {
        let (handle, _recorder) = harness(Config { alarm_duration_secs: 0, ..config() });
        handle.on_sample(30.0).await;
        handle.on_sample(30.0).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.system_state, ThermalState::Alarm);

        assert!(!handle.set_mode(Mode::Manual).await.unwrap());
    }

    #[tokio::test]
    async fn repeated_set_mode_automatic_emits_announce_at_most_once() {
        let (handle, recorder) = harness(config());
        handle.set_mode(Mode::Manual).await.unwrap();
        recorder.events.lock().unwrap().clear();

        assert!(handle.set_mode(Mode::Automatic).await.unwrap());
        assert!(handle.set_mode(Mode::Automatic).await.unwrap()); // already automatic now: no-op
        assert_eq!(recorder.events().iter().filter(|e| matches!(e, Emitted::AnnounceMode(Mode::Automatic))).count(), 1);
    }

    #[tokio::test]
    async fn ordering_publish_period_then_position_then_alarm_on_latching_sample() {
        let (handle, recorder) = harness(Config { alarm_duration_secs: 0, ..config() });
        handle.on_sample(30.0).await; // enters TOO_HOT
        recorder.events.lock().unwrap().clear();
        handle.on_sample(30.0).await; // latches into ALARM on this sample

        let events = recorder.events();
        let pp = events.iter().position(|e| matches!(e, Emitted::PublishPeriod(_))).unwrap();
        let sp = events.iter().position(|e| matches!(e, Emitted::SetPosition(_))).unwrap();
        let alarm = events.iter().position(|e| matches!(e, Emitted::SignalAlarm(true))).unwrap();
        assert!(pp < sp, "publish_period must be emitted before set_position");
        assert!(sp < alarm, "set_position must be emitted before signal_alarm");
    }

    #[tokio::test]
    async fn ordering_includes_display_temperature_in_manual_mode() {
        let (handle, recorder) = harness(config());
        handle.set_mode(Mode::Manual).await.unwrap();
        recorder.events.lock().unwrap().clear();

        handle.on_sample(23.0).await;

        let events = recorder.events();
        let pp = events.iter().position(|e| matches!(e, Emitted::PublishPeriod(_)));
        let disp = events.iter().position(|e| matches!(e, Emitted::DisplayTemperature(_))).unwrap();
        if let Some(pp) = pp {
            assert!(pp < disp, "publish_period, when emitted, precedes display_temperature");
        }
    }

    #[tokio::test]
    async fn non_finite_sample_is_discarded() {
        let (handle, recorder) = harness(config());
        recorder.events.lock().unwrap().clear();
        handle.on_sample(f64::NAN).await;
        handle.on_sample(f64::INFINITY).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current_temperature, None);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn sensor_health_update_does_not_affect_state_machine() {
        let (handle, _recorder) = harness(config());
        let mut raw = serde_json::Map::new();
        raw.insert("rssi".to_string(), serde_json::json!(-40));
        handle.on_sensor_health("OFFLINE".to_string(), raw).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.esp_status, "OFFLINE");
        assert_eq!(snap.system_state, ThermalState::Normal);
    }
}
