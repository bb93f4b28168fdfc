//! Process shell (§4.11): configuration, logging, component wiring, and shutdown for the
//! climate control unit binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actuator_link::ActuatorLinkConfig;
use anyhow::Context;
use clap::Parser;
use kernel_core::{ChannelActuatorPort, ChannelSensorPort, Config, Kernel};
use sensor_link::SensorLinkConfig;
use tokio::signal::unix::{self, SignalKind};
use tracing::{error, info, Level};

/// Tunables and process-level settings for the control unit, resolved once at startup
/// from CLI flags with environment-variable fallback (§4.1, §6.4).
#[derive(Debug, Parser)]
#[command(name = "control-unit", version)]
struct Cli {
    /// Lower temperature threshold (°C) of the HOT band
    #[arg(long, env = "CONTROL_T1", default_value_t = Config::DEFAULT_T1)]
    t1: f64,

    /// Upper temperature threshold (°C) of the HOT band
    #[arg(long, env = "CONTROL_T2", default_value_t = Config::DEFAULT_T2)]
    t2: f64,

    /// Telemetry window capacity (number of recent readings retained)
    #[arg(long, env = "CONTROL_N", default_value_t = Config::DEFAULT_N)]
    n_last_measurements: usize,

    /// Seconds TOO_HOT must persist before latching into ALARM
    #[arg(long, env = "CONTROL_ALARM_DURATION_SECS", default_value_t = Config::DEFAULT_ALARM_DURATION_SECS)]
    alarm_duration_secs: u64,

    /// Slow sampling period (seconds), used outside the hot band
    #[arg(long, env = "CONTROL_F1_SECS", default_value_t = Config::DEFAULT_F1_SECS)]
    f1_secs: u64,

    /// Fast sampling period (seconds), used inside the hot band
    #[arg(long, env = "CONTROL_F2_SECS", default_value_t = Config::DEFAULT_F2_SECS)]
    f2_secs: u64,

    /// HTTP bind address for the operator API
    #[arg(long, env = "CONTROL_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// MQTT broker host for the sensor link
    #[arg(long, env = "CONTROL_MQTT_HOST", default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port for the sensor link
    #[arg(long, env = "CONTROL_MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    /// Serial device path for the actuator link
    #[arg(long, env = "CONTROL_SERIAL_DEVICE", default_value = "/dev/ttyUSB0")]
    serial_device: String,

    /// Serial baud rate for the actuator link
    #[arg(long, env = "CONTROL_SERIAL_BAUD", default_value_t = 115_200)]
    serial_baud: u32,

    /// Logging verbosity
    #[arg(long, env = "CONTROL_LOG_LEVEL", default_value_t = Level::INFO)]
    log_level: Level,
}

impl Cli {
    /// Validate cross-field constraints that a plain `Parser` derive can't express, and
    /// reject conflicting tunables before any component starts (§4.1).
    fn validate(&self) -> anyhow::Result<()> {
        if !self.t1.is_finite() || !self.t2.is_finite() {
            anyhow::bail!("t1 and t2 must be finite numbers");
        }
        if self.n_last_measurements == 0 {
            anyhow::bail!("n_last_measurements must be at least 1");
        }
        if self.f1_secs == 0 || self.f2_secs == 0 {
            anyhow::bail!("f1_secs and f2_secs must be positive");
        }
        if self.f2_secs >= self.f1_secs {
            anyhow::bail!("f2_secs ({}) must be strictly less than f1_secs ({})", self.f2_secs, self.f1_secs);
        }
        Ok(())
    }

    fn kernel_config(&self) -> Config {
        Config {
            t1: self.t1,
            t2: self.t2,
            n_last_measurements: self.n_last_measurements,
            alarm_duration_secs: self.alarm_duration_secs,
            f1_secs: self.f1_secs,
            f2_secs: self.f2_secs,
        }
    }
}

/// Ceiling on how long shutdown waits for the actuator-link task to notice its channel
/// closed and exit cleanly (§5).
const ACTUATOR_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate().context("invalid configuration")?;

    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    if cli.t2 <= cli.t1 {
        tracing::warn!(t1 = cli.t1, t2 = cli.t2, "t2 <= t1: HOT band will use the degenerate binary fallback");
    }

    let (actuator_tx, actuator_rx) = tokio::sync::mpsc::channel(64);
    let (sensor_tx, sensor_rx) = tokio::sync::mpsc::channel(16);

    let actuator_port = Arc::new(ChannelActuatorPort::new(actuator_tx));
    let sensor_port = Arc::new(ChannelSensorPort::new(sensor_tx));

    let (kernel, handle) = Kernel::new(cli.kernel_config(), actuator_port, sensor_port);
    let kernel_task = tokio::spawn(kernel.run());

    let sensor_link_config =
        SensorLinkConfig { broker_host: cli.mqtt_host.clone(), broker_port: cli.mqtt_port, ..SensorLinkConfig::default() };
    let sensor_task = tokio::spawn(sensor_link::run(handle.clone(), sensor_link_config, sensor_rx));

    let actuator_link_config = ActuatorLinkConfig { device: cli.serial_device.clone(), baud_rate: cli.serial_baud };
    let actuator_task = tokio::spawn(actuator_link::run(handle.clone(), actuator_link_config, actuator_rx));

    let routes = http_api::routes(handle.clone());
    let (bound_addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(cli.bind, shutdown_signal())
        .with_context(|| format!("failed to bind HTTP API on {}", cli.bind))?;
    info!(address = %bound_addr, "control unit HTTP API listening");

    server.await;
    info!("shutdown signal received, stopping components");

    // Dropping the last kernel handle closes its command channel, which is the kernel's
    // shutdown mechanism; dropping the last sensor/actuator handle clones does the same
    // for those transport tasks' outbound channels.
    drop(handle);

    if tokio::time::timeout(ACTUATOR_JOIN_TIMEOUT, actuator_task).await.is_err() {
        error!("actuator link task did not shut down within the timeout, abandoning it");
    }
    sensor_task.abort();
    kernel_task.abort();

    info!("control unit stopped");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match unix::signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(err) => {
            error!(%err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let mut sigint = match unix::signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(err) => {
            error!(%err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}
